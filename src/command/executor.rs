//! Command executor - performs one transport send and reports the outcome

use super::CommandResult;
use crate::transport::Transport;
use futures::FutureExt;
use ramses_shared::CommandDefinition;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Sends command definitions through the transport
///
/// Every failure mode (transport error, panic, timeout) comes back as a
/// failed [`CommandResult`]; this never returns an error.
#[derive(Clone)]
pub struct CommandExecutor {
    transport: Arc<dyn Transport>,
}

impl CommandExecutor {
    /// Create a new command executor
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Name of the underlying transport
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Send one command and measure how long the transport took
    pub async fn execute(
        &self,
        device_id: &str,
        definition: &CommandDefinition,
        from_id: Option<&str>,
        timeout: Duration,
    ) -> CommandResult {
        let started = Instant::now();

        let send = self.transport.send_packet(
            device_id,
            definition.verb,
            &definition.code,
            &definition.payload,
            from_id,
        );
        let outcome = tokio::time::timeout(timeout, AssertUnwindSafe(send).catch_unwind()).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(Ok(()))) => {
                debug!(
                    "[EXEC] {} {} {} -> {} ({:?})",
                    definition.verb, definition.code, definition.payload, device_id, elapsed
                );
                CommandResult::sent(elapsed)
            }
            Ok(Ok(Err(e))) => {
                warn!("[EXEC] {} {} to {} failed: {:#}", definition.verb, definition.code, device_id, e);
                CommandResult::failed(format!("{e:#}"), elapsed)
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!("[EXEC] Transport panicked sending {} to {}: {}", definition.code, device_id, message);
                CommandResult::failed(format!("transport panicked: {message}"), elapsed)
            }
            Err(_) => {
                warn!("[EXEC] {} to {} timed out after {:?}", definition.code, device_id, timeout);
                CommandResult::failed(format!("timed out after {timeout:?}"), elapsed)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
