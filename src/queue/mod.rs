//! Per-device command queues
//!
//! This module handles:
//! - Immediate sends when a device is ready, FIFO queuing when it is not
//! - One lazily started, self-retiring worker per device
//! - Command counters and queue depth reporting

mod manager;
mod stats;
mod worker;

#[cfg(test)]
mod tests;

pub use manager::{CommandRequest, DeviceCommandManager, QueueEntry};
pub use stats::{CommandStatistics, CommandStatisticsSnapshot, QueueStatistics, QueueStatus};
