//! Per-device queue worker

use super::manager::{QueueEntry, Shared};
use std::sync::Arc;
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, warn};

/// Serve one device's queue until it stays empty for `idle_timeout`
pub(super) async fn run(
    shared: Arc<Shared>,
    device_id: String,
    mut rx: UnboundedReceiver<QueueEntry>,
) {
    debug!("[QUEUE] Worker for {} running", device_id);

    loop {
        let entry = match timeout(shared.config.idle_timeout, rx.recv()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(_) => match retire(&shared, &device_id, &mut rx).await {
                Some(entry) => entry,
                None => break,
            },
        };

        process(&shared, &device_id, entry).await;
    }

    debug!("[QUEUE] Worker for {} stopped", device_id);
}

/// Deregister this worker unless something was queued in the meantime
///
/// Producers enqueue under the same lock, so an empty channel here means
/// nothing can be lost by exiting.
async fn retire(
    shared: &Shared,
    device_id: &str,
    rx: &mut UnboundedReceiver<QueueEntry>,
) -> Option<QueueEntry> {
    let mut devices = shared.devices.lock().await;

    match rx.try_recv() {
        Ok(entry) => return Some(entry),
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
    }

    let now = Instant::now();
    let forgettable = match devices.states.get_mut(device_id) {
        Some(state) => {
            state.worker = None;
            // Keep the spacing record while an immediate send may still need it
            state.send_gate.try_lock().is_ok()
                && state.last_sent.map_or(true, |last| {
                    now.duration_since(last) >= shared.config.min_interval
                })
        }
        None => false,
    };
    if forgettable {
        devices.states.remove(device_id);
    }

    debug!("[QUEUE] Worker for {} retired after {:?} idle", device_id, shared.config.idle_timeout);
    None
}

/// Wait out the device's interval, send, and account for the result
async fn process(shared: &Shared, device_id: &str, entry: QueueEntry) {
    let gate = {
        let devices = shared.devices.lock().await;
        match devices.states.get(device_id) {
            Some(state) => state.send_gate.clone(),
            None => {
                warn!("[QUEUE] {} vanished with a queued command", device_id);
                return;
            }
        }
    };
    let _sending = gate.lock_owned().await;

    let last_sent = {
        let devices = shared.devices.lock().await;
        devices.states.get(device_id).and_then(|s| s.last_sent)
    };
    if let Some(last) = last_sent {
        match last.checked_add(shared.config.min_interval) {
            Some(ready) => sleep_until(ready).await,
            // Beyond the clock's range; tokio clamps this to its far future
            None => sleep(shared.config.min_interval).await,
        }
    }

    if let Some(state) = shared.devices.lock().await.states.get_mut(device_id) {
        state.last_sent = Some(Instant::now());
    }

    let waited = entry.enqueued_at.elapsed();
    let result = shared
        .executor
        .execute(device_id, &entry.definition, entry.from_id.as_deref(), entry.timeout)
        .await;

    {
        let mut devices = shared.devices.lock().await;
        if let Some(state) = devices.states.get_mut(device_id) {
            state.last_sent = Some(Instant::now());
            state.depth = state.depth.saturating_sub(1);
        }
    }
    shared.stats.record(&result);

    if result.success {
        debug!(
            "[QUEUE] {} {} sent to {} after {:?} in queue",
            entry.definition.verb, entry.definition.code, device_id, waited
        );
    } else {
        warn!(
            "[QUEUE] Queued {} to {} failed: {}",
            entry.definition.code,
            device_id,
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
}
