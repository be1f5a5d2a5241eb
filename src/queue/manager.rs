//! Device command manager - one rate-limited FIFO and worker per device

use super::stats::{CommandStatistics, QueueStatistics, QueueStatus};
use super::worker;
use crate::command::{CommandExecutor, CommandResult};
use crate::config::DispatchConfig;
use crate::transport::Transport;
use ramses_shared::{CommandDefinition, Priority};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// How often `wait_drained` re-checks queue depths
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A command addressed to one device
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub device_id: String,
    pub definition: CommandDefinition,
    /// Reserved: accepted but does not reorder the queue
    pub priority: Priority,
    /// Zero means the configured default
    pub timeout: Duration,
    /// Source address to transmit as
    pub from_id: Option<String>,
}

impl CommandRequest {
    pub fn new(device_id: impl Into<String>, definition: CommandDefinition) -> Self {
        Self {
            device_id: device_id.into(),
            definition,
            priority: Priority::Normal,
            timeout: Duration::ZERO,
            from_id: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_source(mut self, from_id: Option<String>) -> Self {
        self.from_id = from_id;
        self
    }
}

/// A command waiting in a device queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub definition: CommandDefinition,
    pub from_id: Option<String>,
    pub priority: Priority,
    pub timeout: Duration,
    pub enqueued_at: Instant,
}

pub(super) struct WorkerSlot {
    pub(super) tx: mpsc::UnboundedSender<QueueEntry>,
    pub(super) handle: JoinHandle<()>,
}

/// Per-device bookkeeping, created on the first command to a device
pub(super) struct DeviceState {
    /// Start of the most recent send, then its completion once it returns
    pub(super) last_sent: Option<Instant>,
    /// Queued plus in-progress commands
    pub(super) depth: usize,
    pub(super) worker: Option<WorkerSlot>,
    /// Held for the duration of every transport call to this device
    pub(super) send_gate: Arc<Mutex<()>>,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            last_sent: None,
            depth: 0,
            worker: None,
            send_gate: Arc::new(Mutex::new(())),
        }
    }
}

pub(super) struct Devices {
    pub(super) states: HashMap<String, DeviceState>,
    last_prune: Instant,
}

pub(super) struct Shared {
    pub(super) devices: Mutex<Devices>,
    pub(super) executor: CommandExecutor,
    pub(super) stats: Arc<CommandStatistics>,
    pub(super) config: DispatchConfig,
}

/// Sends commands to devices without ever putting two sends to the same
/// device closer than `min_interval` apart
///
/// Each device gets an independent FIFO served by its own worker task, so a
/// backlog on one device never delays another. Workers start on demand and
/// retire after `idle_timeout` with an empty queue.
pub struct DeviceCommandManager {
    pub(super) shared: Arc<Shared>,
}

impl DeviceCommandManager {
    /// Create a manager sending through `transport`
    pub fn new(transport: Arc<dyn Transport>, config: DispatchConfig) -> Self {
        Self::with_statistics(transport, config, Arc::new(CommandStatistics::new()))
    }

    /// Create a manager that counts into an existing statistics handle
    pub fn with_statistics(
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
        stats: Arc<CommandStatistics>,
    ) -> Self {
        info!(
            "[QUEUE] Command manager on {} (interval {:?}, idle timeout {:?})",
            transport.name(),
            config.min_interval,
            config.idle_timeout
        );

        Self {
            shared: Arc::new(Shared {
                devices: Mutex::new(Devices {
                    states: HashMap::new(),
                    last_prune: Instant::now(),
                }),
                executor: CommandExecutor::new(transport),
                stats,
                config,
            }),
        }
    }

    /// Shared statistics handle
    pub fn statistics(&self) -> Arc<CommandStatistics> {
        self.shared.stats.clone()
    }

    /// Zero the command counters
    pub fn reset_statistics(&self) {
        self.shared.stats.reset();
    }

    /// Send `definition` to `device_id` now, or queue it behind earlier ones
    pub async fn send_command_to_device(
        &self,
        device_id: &str,
        definition: CommandDefinition,
        priority: Priority,
        timeout: Duration,
    ) -> CommandResult {
        let request = CommandRequest::new(device_id, definition)
            .with_priority(priority)
            .with_timeout(timeout);
        self.submit(request).await
    }

    /// Send a request immediately when the device is ready, otherwise queue it
    ///
    /// The immediate path is only taken when the device's queue is empty, so
    /// a command can never overtake one submitted earlier.
    pub async fn submit(&self, request: CommandRequest) -> CommandResult {
        let shared = &self.shared;

        if let Err(e) = request.definition.validate() {
            warn!(
                "[QUEUE] Rejected {} {} for {}: {}",
                request.definition.verb, request.definition.code, request.device_id, e
            );
            return CommandResult::failed(format!("invalid command: {e}"), Duration::ZERO);
        }

        let now = Instant::now();
        let timeout = shared.config.effective_timeout(request.timeout);

        let mut devices = shared.devices.lock().await;
        prune_idle(&mut devices, &shared.config, now);

        let state = devices
            .states
            .entry(request.device_id.clone())
            .or_insert_with(DeviceState::new);

        let interval_elapsed = state
            .last_sent
            .map_or(true, |last| now.duration_since(last) >= shared.config.min_interval);

        // A busy gate means an earlier immediate send is still in flight
        let idle_gate = if interval_elapsed && state.depth == 0 {
            state.send_gate.clone().try_lock_owned().ok()
        } else {
            None
        };

        if let Some(_sending) = idle_gate {
            // Reserve the slot before releasing the lock
            state.last_sent = Some(now);
            drop(devices);

            let result = shared
                .executor
                .execute(
                    &request.device_id,
                    &request.definition,
                    request.from_id.as_deref(),
                    timeout,
                )
                .await;

            if let Some(state) = shared.devices.lock().await.states.get_mut(&request.device_id) {
                state.last_sent = Some(Instant::now());
            }
            shared.stats.record(&result);
            return result;
        }

        state.depth += 1;
        let depth = state.depth;
        let code = request.definition.code.clone();
        let entry = QueueEntry {
            definition: request.definition,
            from_id: request.from_id,
            priority: request.priority,
            timeout,
            enqueued_at: now,
        };

        // Hand to the running worker; start one if there is none (or it died)
        let unsent = match &state.worker {
            Some(slot) => slot.tx.send(entry).err().map(|e| e.0),
            None => Some(entry),
        };
        if let Some(entry) = unsent {
            let (tx, rx) = mpsc::unbounded_channel();
            // Receiver is alive, send cannot fail
            let _ = tx.send(entry);
            let handle = tokio::spawn(worker::run(
                self.shared.clone(),
                request.device_id.clone(),
                rx,
            ));
            state.worker = Some(WorkerSlot { tx, handle });
            debug!("[QUEUE] Started worker for {}", request.device_id);
        }

        shared.stats.record_queued();
        debug!(
            "[QUEUE] {} queued for {} (depth {}, priority {:?})",
            code, request.device_id, depth, request.priority
        );

        CommandResult::queued()
    }

    /// Commands queued or in progress for one device
    pub async fn queue_depth(&self, device_id: &str) -> usize {
        self.shared
            .devices
            .lock()
            .await
            .states
            .get(device_id)
            .map_or(0, |s| s.depth)
    }

    /// Number of devices with a running worker
    pub async fn active_queues(&self) -> usize {
        self.shared
            .devices
            .lock()
            .await
            .states
            .values()
            .filter(|s| s.worker.is_some())
            .count()
    }

    /// Counters plus per-device queue depths
    pub async fn get_queue_statistics(&self) -> QueueStatistics {
        let devices = self.shared.devices.lock().await;
        let device_queue_depths: BTreeMap<String, usize> = devices
            .states
            .iter()
            .filter(|(_, s)| s.worker.is_some())
            .map(|(id, s)| (id.clone(), s.depth))
            .collect();
        drop(devices);

        QueueStatistics {
            command_statistics: self.shared.stats.snapshot(),
            queue_status: QueueStatus {
                active_queues: device_queue_depths.len(),
                device_queue_depths,
            },
        }
    }

    /// Wait until every queued command has been executed
    pub async fn wait_drained(&self) {
        loop {
            let pending: usize = {
                let devices = self.shared.devices.lock().await;
                devices.states.values().map(|s| s.depth).sum()
            };
            if pending == 0 {
                return;
            }
            sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// Stop every worker, dropping whatever is still queued
    pub async fn shutdown(&self) {
        let mut devices = self.shared.devices.lock().await;
        let mut dropped = 0;

        for (_, state) in devices.states.drain() {
            if let Some(slot) = state.worker {
                slot.handle.abort();
            }
            dropped += state.depth;
        }

        if dropped > 0 {
            warn!("[QUEUE] Shutdown dropped {} queued commands", dropped);
        }
        info!("[QUEUE] Command manager stopped");
    }
}

/// Forget devices that only ever took the immediate path and have gone quiet
fn prune_idle(devices: &mut Devices, config: &DispatchConfig, now: Instant) {
    if now.duration_since(devices.last_prune) < config.idle_timeout {
        return;
    }
    devices.last_prune = now;

    // Never forget a send record that still constrains the next send
    let keep_for = config.idle_timeout.max(config.min_interval);
    let before = devices.states.len();
    devices.states.retain(|_, s| {
        s.worker.is_some()
            || s.depth > 0
            || s.send_gate.try_lock().is_err()
            || s.last_sent
                .map_or(false, |last| now.duration_since(last) < keep_for)
    });

    let pruned = before - devices.states.len();
    if pruned > 0 {
        debug!("[QUEUE] Pruned {} idle devices", pruned);
    }
}
