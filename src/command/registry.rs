//! Catalog of named command definitions owned by features

use ramses_shared::CommandDefinition;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Commands for one device type, grouped by category
pub type DeviceCommandTable = HashMap<String, HashMap<String, CommandDefinition>>;

#[derive(Debug, Clone)]
struct Registration {
    definition: CommandDefinition,
    feature_id: String,
}

/// Named command definitions with feature ownership
///
/// Names are globally unique: the first registration wins and later
/// duplicates are dropped with a warning.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Registration>>,
    /// device_type -> category -> name -> definition
    device_commands: RwLock<HashMap<String, DeviceCommandTable>>,
}

impl CommandRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature's commands, returning how many names were stored
    ///
    /// The batch is applied under one write lock, so readers never observe a
    /// half-registered feature.
    pub async fn register_commands<I, K>(&self, feature_id: &str, commands: I) -> usize
    where
        I: IntoIterator<Item = (K, CommandDefinition)>,
        K: Into<String>,
    {
        let mut catalog = self.commands.write().await;
        let mut stored = 0;

        for (name, definition) in commands {
            let name = name.into();

            if let Err(e) = definition.validate() {
                warn!("[REGISTRY] {} from feature {} rejected: {}", name, feature_id, e);
                continue;
            }

            if let Some(existing) = catalog.get(&name) {
                if existing.feature_id == feature_id {
                    debug!("[REGISTRY] {} already registered by {}", name, feature_id);
                } else {
                    warn!(
                        "[REGISTRY] Conflict: {} already owned by {}, ignoring registration from {}",
                        name, existing.feature_id, feature_id
                    );
                }
                continue;
            }

            catalog.insert(
                name,
                Registration {
                    definition,
                    feature_id: feature_id.to_string(),
                },
            );
            stored += 1;
        }

        info!("[REGISTRY] Feature {} registered {} commands", feature_id, stored);
        stored
    }

    /// Register bulk definitions for a device type (no conflict checks)
    pub async fn register_device_commands<I, K>(&self, device_type: &str, category: &str, commands: I)
    where
        I: IntoIterator<Item = (K, CommandDefinition)>,
        K: Into<String>,
    {
        let mut tables = self.device_commands.write().await;
        let table = tables
            .entry(device_type.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default();

        for (name, definition) in commands {
            table.insert(name.into(), definition);
        }
    }

    /// Look up a command by name
    pub async fn get_command(&self, name: &str) -> Option<CommandDefinition> {
        self.commands
            .read()
            .await
            .get(name)
            .map(|r| r.definition.clone())
    }

    /// Feature that owns a command name
    pub async fn feature_of(&self, name: &str) -> Option<String> {
        self.commands
            .read()
            .await
            .get(name)
            .map(|r| r.feature_id.clone())
    }

    /// Names owned by a feature, sorted
    pub async fn list_commands_by_feature(&self, feature_id: &str) -> Vec<String> {
        let catalog = self.commands.read().await;
        let mut names: Vec<String> = catalog
            .iter()
            .filter(|(_, r)| r.feature_id == feature_id)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drop every command a feature owns (feature unload)
    pub async fn clear_feature_commands(&self, feature_id: &str) -> usize {
        let mut catalog = self.commands.write().await;
        let before = catalog.len();
        catalog.retain(|_, r| r.feature_id != feature_id);
        let removed = before - catalog.len();

        if removed > 0 {
            info!("[REGISTRY] Removed {} commands of feature {}", removed, feature_id);
        }
        removed
    }

    /// Device-type commands in one category
    pub async fn get_device_commands(
        &self,
        device_type: &str,
        category: &str,
    ) -> Option<HashMap<String, CommandDefinition>> {
        self.device_commands
            .read()
            .await
            .get(device_type)
            .and_then(|categories| categories.get(category))
            .cloned()
    }

    /// Device types with registered commands, sorted
    pub async fn device_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.device_commands.read().await.keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of named commands
    pub async fn len(&self) -> usize {
        self.commands.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.commands.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ramses_shared::Verb;

    fn fan_high() -> CommandDefinition {
        CommandDefinition::new("22F1", Verb::Info, "000307").with_description("Fan high")
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = CommandRegistry::new();
        let stored = registry
            .register_commands("fan", [("fan_high", fan_high())])
            .await;

        assert_eq!(stored, 1);
        assert_eq!(registry.get_command("fan_high").await, Some(fan_high()));
        assert_eq!(registry.feature_of("fan_high").await.as_deref(), Some("fan"));
        assert!(registry.get_command("fan_low").await.is_none());
    }

    #[tokio::test]
    async fn test_first_registration_wins() {
        let registry = CommandRegistry::new();
        let reset_a = CommandDefinition::new("10D0", Verb::Write, "00FF");
        let reset_b = CommandDefinition::new("10D0", Verb::Write, "0000");

        assert_eq!(registry.register_commands("filter", [("reset", reset_a.clone())]).await, 1);
        assert_eq!(registry.register_commands("service", [("reset", reset_b)]).await, 0);

        assert_eq!(registry.get_command("reset").await, Some(reset_a));
        assert_eq!(registry.list_commands_by_feature("filter").await, vec!["reset"]);
        assert!(registry.list_commands_by_feature("service").await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_definition_rejected() {
        let registry = CommandRegistry::new();
        let bad = CommandDefinition::new("22F", Verb::Info, "00");

        assert_eq!(registry.register_commands("fan", [("bad", bad)]).await, 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_feature_commands() {
        let registry = CommandRegistry::new();
        registry
            .register_commands(
                "fan",
                [
                    ("fan_high", fan_high()),
                    ("fan_low", CommandDefinition::new("22F1", Verb::Info, "000107")),
                ],
            )
            .await;
        registry
            .register_commands("filter", [("reset", CommandDefinition::new("10D0", Verb::Write, "00FF"))])
            .await;

        assert_eq!(registry.clear_feature_commands("fan").await, 2);
        assert_eq!(registry.clear_feature_commands("fan").await, 0);
        assert_eq!(registry.len().await, 1);

        // Names are free again once the owner unloads
        let stored = registry.register_commands("other", [("fan_high", fan_high())]).await;
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_device_commands_overwrite() {
        let registry = CommandRegistry::new();
        registry
            .register_device_commands("FAN", "speed", [("high", fan_high())])
            .await;
        registry
            .register_device_commands(
                "FAN",
                "speed",
                [("high", CommandDefinition::new("22F1", Verb::Info, "000407"))],
            )
            .await;

        let table = registry.get_device_commands("FAN", "speed").await.unwrap();
        assert_eq!(table["high"].payload, "000407");
        assert!(registry.get_device_commands("FAN", "timer").await.is_none());
        assert_eq!(registry.device_types().await, vec!["FAN"]);
        // Device tables do not populate the named catalog
        assert!(registry.get_command("high").await.is_none());
    }
}
