//! Database configuration records and process settings.

pub mod url;

use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    DEFAULT_DB_ALIAS,
    error::{Result, RouteError},
    registry::ConnectionRegistry,
};

/// Environment variables with this prefix each describe one database alias.
pub const ENV_PREFIX: &str = "SQLROUTE_DATABASE_";

/// Opaque key/value settings for a single database connection.
///
/// Recognised keys: `engine`, `name`, `read_only`, `busy_timeout_ms`.
/// Anything else is carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseConfig {
    settings: BTreeMap<String, Value>,
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sqlite(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self::new().with("engine", "sqlite").with("name", name)
    }

    pub fn from_url(url: &str) -> Result<Self> {
        url::parse(url)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn engine(&self) -> Option<&str> {
        self.get("engine").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    pub fn read_only(&self) -> Result<bool> {
        match self.get("read_only") {
            None => Ok(false),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(other) => Err(RouteError::InvalidSetting {
                key: "read_only".into(),
                reason: format!("expected a boolean, got {other}"),
            }),
        }
    }

    pub fn busy_timeout(&self) -> Result<Option<Duration>> {
        match self.get("busy_timeout_ms") {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(|ms| Some(Duration::from_millis(ms)))
                .ok_or_else(|| RouteError::InvalidSetting {
                    key: "busy_timeout_ms".into(),
                    reason: format!("expected a non-negative integer, got {value}"),
                }),
        }
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.settings.iter()
    }
}

impl FromIterator<(String, Value)> for DatabaseConfig {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            settings: iter.into_iter().collect(),
        }
    }
}

/// Every database alias known to the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Build settings from `SQLROUTE_DATABASE_<ALIAS>` pairs. Values are either
    /// a JSON object or a connection URL; aliases are lower-cased.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        for (key, value) in vars {
            let Some(alias) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if alias.is_empty() {
                continue;
            }

            let value = value.as_ref().trim();
            let config = if value.starts_with('{') {
                serde_json::from_str(value)?
            } else {
                DatabaseConfig::from_url(value)?
            };
            settings.databases.insert(alias.to_lowercase(), config);
        }
        Ok(settings)
    }

    /// Entries from `other` replace entries with the same alias.
    pub fn merge(&mut self, other: Settings) {
        self.databases.extend(other.databases);
    }

    pub fn install(&self, registry: &dyn ConnectionRegistry) -> Result<()> {
        if !self.databases.contains_key(DEFAULT_DB_ALIAS) {
            log::warn!("no '{DEFAULT_DB_ALIAS}' database configured; unrouted queries will fail");
        }
        for (alias, config) in &self.databases {
            registry.register(alias, config.clone())?;
        }
        log::info!("installed {} database alias(es)", self.databases.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Connections;

    #[test]
    fn sqlite_builder_sets_engine_and_name() {
        let config = DatabaseConfig::sqlite("app.db").with("busy_timeout_ms", 100);

        assert_eq!(config.engine(), Some("sqlite"));
        assert_eq!(config.name(), Some("app.db"));
        assert_eq!(config.busy_timeout().unwrap(), Some(Duration::from_millis(100)));
        assert!(!config.read_only().unwrap());
    }

    #[test]
    fn wrong_setting_types_are_rejected() {
        let config = DatabaseConfig::sqlite("x.db")
            .with("read_only", "yes")
            .with("busy_timeout_ms", -1);

        assert!(matches!(config.read_only(), Err(RouteError::InvalidSetting { .. })));
        assert!(matches!(config.busy_timeout(), Err(RouteError::InvalidSetting { .. })));
    }

    #[test]
    fn settings_from_json() {
        let settings = Settings::from_json_str(
            r#"{
                "databases": {
                    "default": { "engine": "sqlite", "name": ":memory:" },
                    "test": { "engine": "sqlite", "name": "test.db", "read_only": true }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.databases.len(), 2);
        assert!(settings.databases["test"].read_only().unwrap());
    }

    #[test]
    fn settings_from_vars_accepts_json_and_urls() {
        let settings = Settings::from_vars([
            ("SQLROUTE_DATABASE_DEFAULT", "sqlite::memory:"),
            ("SQLROUTE_DATABASE_TEST", r#"{"engine": "sqlite", "name": "t.db"}"#),
            ("PATH", "/usr/bin"),
        ])
        .unwrap();

        assert_eq!(settings.databases.len(), 2);
        assert_eq!(settings.databases["default"].name(), Some(":memory:"));
        assert_eq!(settings.databases["test"].name(), Some("t.db"));
    }

    #[test]
    fn settings_from_vars_propagates_bad_values() {
        let result = Settings::from_vars([("SQLROUTE_DATABASE_BROKEN", "mysql://x")]);
        assert!(matches!(result, Err(RouteError::InvalidUrl { .. })));
    }

    #[test]
    fn merge_prefers_newer_entries() {
        let mut base = Settings::from_vars([("SQLROUTE_DATABASE_DEFAULT", "sqlite://a.db")]).unwrap();
        let overlay = Settings::from_vars([("SQLROUTE_DATABASE_DEFAULT", "sqlite://b.db")]).unwrap();

        base.merge(overlay);

        assert_eq!(base.databases["default"].name(), Some("b.db"));
    }

    #[test]
    fn install_registers_every_alias() {
        let registry = Connections::new();
        let settings = Settings::from_vars([
            ("SQLROUTE_DATABASE_DEFAULT", "sqlite::memory:"),
            ("SQLROUTE_DATABASE_TEST", "sqlite::memory:"),
        ])
        .unwrap();

        settings.install(&registry).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("default"));
        assert!(registry.contains("test"));
    }
}
