//! Command dispatcher - resolves names and companions, then hands off to the
//! device command manager

use crate::command::{catalog, CommandRegistry, CommandResult};
use crate::directory::DeviceDirectory;
use crate::queue::{CommandRequest, DeviceCommandManager, QueueStatistics};
use ramses_shared::{CommandDefinition, Priority};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Entry point for callers that address commands by name
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
    manager: Arc<DeviceCommandManager>,
    directory: Arc<dyn DeviceDirectory>,
}

impl CommandDispatcher {
    /// Create a new command dispatcher
    pub fn new(
        registry: Arc<CommandRegistry>,
        manager: Arc<DeviceCommandManager>,
        directory: Arc<dyn DeviceDirectory>,
    ) -> Self {
        Self {
            registry,
            manager,
            directory,
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<DeviceCommandManager> {
        &self.manager
    }

    /// Register the built-in fan table under its own feature
    pub async fn register_builtin_commands(&self) -> usize {
        self.registry
            .register_commands(catalog::BUILTIN_FEATURE, catalog::fan_commands())
            .await
    }

    /// Send a registered command by name
    ///
    /// An unknown name fails without touching the manager.
    pub async fn send_command(
        &self,
        device_id: &str,
        name: &str,
        priority: Priority,
        timeout: Duration,
    ) -> CommandResult {
        let Some(definition) = self.registry.get_command(name).await else {
            warn!("[DISPATCH] Unknown command {} for {}", name, device_id);
            return CommandResult::not_found(name);
        };

        debug!("[DISPATCH] {} -> {}", name, device_id);
        self.send_definition(device_id, definition, priority, timeout)
            .await
    }

    /// Send one of the built-in fan commands
    pub async fn send_fan_command(&self, device_id: &str, name: &str) -> CommandResult {
        let Some(definition) = catalog::fan_command(name) else {
            warn!("[DISPATCH] Unknown fan command {} for {}", name, device_id);
            return CommandResult::not_found(name);
        };

        self.send_definition(device_id, definition, Priority::Normal, Duration::ZERO)
            .await
    }

    /// Send a definition, transmitting as the device's bound companion if any
    pub async fn send_definition(
        &self,
        device_id: &str,
        definition: CommandDefinition,
        priority: Priority,
        timeout: Duration,
    ) -> CommandResult {
        let companion = self.directory.bound_device(device_id).await;
        if companion.is_none() {
            debug!("[DISPATCH] No companion bound to {}, sending as gateway", device_id);
        }

        let request = CommandRequest::new(device_id, definition)
            .with_priority(priority)
            .with_timeout(timeout)
            .with_source(companion);
        self.manager.submit(request).await
    }

    pub async fn get_queue_statistics(&self) -> QueueStatistics {
        self.manager.get_queue_statistics().await
    }
}
