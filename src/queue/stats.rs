//! Command counters and queue statistics snapshots

use crate::command::CommandResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic command counters
///
/// Only [`CommandStatistics::reset`] ever lowers them.
#[derive(Debug, Default)]
pub struct CommandStatistics {
    total_commands: AtomicU64,
    successful_commands: AtomicU64,
    failed_commands: AtomicU64,
    queued_commands: AtomicU64,
    total_execution_micros: AtomicU64,
}

impl CommandStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an executed command
    pub fn record(&self, result: &CommandResult) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
        if result.success {
            self.successful_commands.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_commands.fetch_add(1, Ordering::Relaxed);
        }
        self.total_execution_micros
            .fetch_add(result.execution_time.as_micros() as u64, Ordering::Relaxed);
    }

    /// Count a command accepted into a device queue
    pub fn record_queued(&self) {
        self.queued_commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.total_commands.store(0, Ordering::Relaxed);
        self.successful_commands.store(0, Ordering::Relaxed);
        self.failed_commands.store(0, Ordering::Relaxed);
        self.queued_commands.store(0, Ordering::Relaxed);
        self.total_execution_micros.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CommandStatisticsSnapshot {
        let total = self.total_commands.load(Ordering::Relaxed);
        let successful = self.successful_commands.load(Ordering::Relaxed);
        let micros = self.total_execution_micros.load(Ordering::Relaxed);

        let (success_rate_percent, average_execution_time) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                successful as f64 / total as f64 * 100.0,
                Duration::from_micros(micros / total).as_secs_f64(),
            )
        };

        CommandStatisticsSnapshot {
            total_commands: total,
            successful_commands: successful,
            failed_commands: self.failed_commands.load(Ordering::Relaxed),
            queued_commands: self.queued_commands.load(Ordering::Relaxed),
            success_rate_percent,
            average_execution_time,
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandStatisticsSnapshot {
    pub total_commands: u64,
    pub successful_commands: u64,
    pub failed_commands: u64,
    pub queued_commands: u64,
    pub success_rate_percent: f64,
    /// Seconds
    pub average_execution_time: f64,
}

/// Live device queues
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub active_queues: usize,
    pub device_queue_depths: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatistics {
    pub command_statistics: CommandStatisticsSnapshot,
    pub queue_status: QueueStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let stats = CommandStatistics::new();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_commands, 0);
        assert_eq!(snapshot.success_rate_percent, 0.0);
        assert_eq!(snapshot.average_execution_time, 0.0);
    }

    #[test]
    fn test_rates_and_reset() {
        let stats = CommandStatistics::new();
        stats.record(&CommandResult::sent(Duration::from_millis(100)));
        stats.record(&CommandResult::sent(Duration::from_millis(300)));
        stats.record(&CommandResult::sent(Duration::from_millis(200)));
        stats.record(&CommandResult::failed("no ack", Duration::from_millis(200)));
        stats.record_queued();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_commands, 4);
        assert_eq!(snapshot.successful_commands, 3);
        assert_eq!(snapshot.failed_commands, 1);
        assert_eq!(snapshot.queued_commands, 1);
        assert_eq!(snapshot.success_rate_percent, 75.0);
        assert_eq!(snapshot.average_execution_time, 0.2);

        stats.reset();
        assert_eq!(stats.snapshot().total_commands, 0);
        assert_eq!(stats.snapshot().queued_commands, 0);
    }

    #[test]
    fn test_statistics_wire_names() {
        let stats = QueueStatistics {
            command_statistics: CommandStatistics::new().snapshot(),
            queue_status: QueueStatus {
                active_queues: 1,
                device_queue_depths: BTreeMap::from([("32:153289".to_string(), 2)]),
            },
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["command_statistics"]["success_rate_percent"], 0.0);
        assert_eq!(json["queue_status"]["active_queues"], 1);
        assert_eq!(json["queue_status"]["device_queue_depths"]["32:153289"], 2);
    }
}
