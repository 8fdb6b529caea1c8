//! Plugin registry and per-peer store lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{ExecStore, ShellStore, Store, StoreError};

/// Per-call timeout when a plugin definition sets none.
pub const DEFAULT_PLUGIN_TIMEOUT: Duration = Duration::from_secs(10);

fn default_timeout() -> Duration {
    DEFAULT_PLUGIN_TIMEOUT
}

/// One named plugin definition.
///
/// For `exec` plugins `command` is the program; for `shell` plugins it is the
/// script text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginConfig {
    /// Factory name (`exec`, `shell`, or a registered extension)
    #[serde(rename = "type")]
    pub kind: String,
    /// Program or script
    #[serde(default)]
    pub command: String,
    /// Extra program arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-call timeout
    #[serde(skip, default = "default_timeout")]
    pub timeout: Duration,
}

impl PluginConfig {
    /// Definition with the default timeout.
    pub fn new(kind: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            command: command.into(),
            args: Vec::new(),
            timeout: DEFAULT_PLUGIN_TIMEOUT,
        }
    }
}

/// Builds a store from a plugin definition.
pub type StoreFactory =
    Arc<dyn Fn(&PluginConfig) -> Result<Arc<dyn Store>, StoreError> + Send + Sync>;

/// Plugin type name → factory.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, StoreFactory>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn require_command(config: &PluginConfig) -> Result<(), StoreError> {
    if config.command.trim().is_empty() {
        return Err(StoreError::InvalidConfig(format!(
            "{} plugin needs a command",
            config.kind
        )));
    }
    Ok(())
}

impl PluginRegistry {
    /// Registry without any factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `exec` and `shell` factories.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            "exec",
            Arc::new(|config: &PluginConfig| -> Result<Arc<dyn Store>, StoreError> {
                require_command(config)?;
                let store = ExecStore::new(&config.command, config.args.clone(), config.timeout);
                Ok(Arc::new(store))
            }),
        );
        registry.register(
            "shell",
            Arc::new(|config: &PluginConfig| -> Result<Arc<dyn Store>, StoreError> {
                require_command(config)?;
                let store = ShellStore::new(&config.command, config.timeout);
                Ok(Arc::new(store))
            }),
        );
        registry
    }

    /// Add or replace the factory for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, factory: StoreFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Whether `kind` has a factory.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build a store for `config`.
    pub fn create(&self, config: &PluginConfig) -> Result<Arc<dyn Store>, StoreError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| StoreError::UnknownType(config.kind.clone()))?;
        factory(config)
    }
}

/// Named store instances, looked up by a peer's `plugin` field.
#[derive(Clone, Default)]
pub struct PluginManager {
    stores: BTreeMap<String, Arc<dyn Store>>,
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginManager {
    /// Manager without any plugin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate every definition through `registry`.
    pub fn from_configs<'a, I>(registry: &PluginRegistry, configs: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (&'a String, &'a PluginConfig)>,
    {
        let mut manager = Self::new();
        for (name, config) in configs {
            let store = registry.create(config).map_err(|e| match e {
                StoreError::InvalidConfig(detail) => {
                    StoreError::InvalidConfig(format!("plugin {name}: {detail}"))
                }
                other => other,
            })?;
            debug!(plugin = %name, kind = %config.kind, "plugin loaded");
            manager.insert(name.clone(), store);
        }
        Ok(manager)
    }

    /// Add or replace the store named `name`.
    pub fn insert(&mut self, name: impl Into<String>, store: Arc<dyn Store>) {
        self.stores.insert(name.into(), store);
    }

    /// Store named `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownPlugin(name.to_string()))
    }

    /// Plugin names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stores.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_builtins() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["exec", "shell"]);
        assert!(registry.contains("exec"));
        assert!(!registry.contains("redis"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = PluginRegistry::with_builtins();
        let err = registry.create(&PluginConfig::new("redis", "x")).err().unwrap();
        assert_eq!(err, StoreError::UnknownType("redis".into()));
    }

    #[test]
    fn test_empty_command_rejected() {
        let registry = PluginRegistry::with_builtins();
        let mut configs = BTreeMap::new();
        configs.insert("broken".to_string(), PluginConfig::new("exec", " "));
        let err = PluginManager::from_configs(&registry, &configs).err().unwrap();
        assert_eq!(
            err,
            StoreError::InvalidConfig("plugin broken: exec plugin needs a command".into())
        );
    }

    #[tokio::test]
    async fn test_custom_factory() {
        let shared = Arc::new(MemoryStore::new());
        let mut registry = PluginRegistry::new();
        let store = Arc::clone(&shared);
        registry.register(
            "memory",
            Arc::new(move |_: &PluginConfig| -> Result<Arc<dyn Store>, StoreError> {
                Ok(Arc::clone(&store) as Arc<dyn Store>)
            }),
        );

        let mut configs = BTreeMap::new();
        configs.insert("mem1".to_string(), PluginConfig::new("memory", ""));
        let manager = PluginManager::from_configs(&registry, &configs).unwrap();
        assert_eq!(manager.names(), vec!["mem1"]);

        manager.get("mem1").unwrap().set("k", "v").await.unwrap();
        assert_eq!(shared.peek("k").await.as_deref(), Some("v"));
    }

    #[test]
    fn test_unknown_plugin_name() {
        let manager = PluginManager::new();
        assert_eq!(
            manager.get("nope").err().unwrap(),
            StoreError::UnknownPlugin("nope".into())
        );
    }

    #[test]
    fn test_deserialize_definition() {
        let config: PluginConfig =
            serde_json::from_str(r#"{"type":"exec","command":"/bin/store","args":["-v"]}"#).unwrap();
        assert_eq!(config.kind, "exec");
        assert_eq!(config.args, vec!["-v"]);
        assert_eq!(config.timeout, DEFAULT_PLUGIN_TIMEOUT);
    }
}
