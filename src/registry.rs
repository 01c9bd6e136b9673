//! Named database connections.
//!
//! The routing core only mints, inserts and removes its own aliases; every
//! other entry belongs to whoever installed it.

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, OpenFlags};

use crate::{
    config::{DatabaseConfig, Settings},
    error::{Result, RouteError},
};

pub type ConnectionHandle = Arc<Mutex<Connection>>;

/// Table of database aliases. Insert and remove must be atomic per key.
pub trait ConnectionRegistry: Send + Sync {
    /// Fails with [`RouteError::DuplicateAlias`] if `alias` is taken.
    fn register(&self, alias: &str, config: DatabaseConfig) -> Result<()>;

    /// Remove `alias`, dropping any live connection it still holds.
    fn deregister(&self, alias: &str) -> Option<DatabaseConfig>;

    fn config(&self, alias: &str) -> Option<DatabaseConfig>;

    fn contains(&self, alias: &str) -> bool {
        self.config(alias).is_some()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn aliases(&self) -> Vec<String>;

    /// Live connection for `alias`, opened on first use.
    fn get(&self, alias: &str) -> Result<ConnectionHandle>;

    /// Close the live connection for `alias`, if one is open. The entry stays.
    fn close(&self, alias: &str) -> Result<()>;
}

#[derive(Debug)]
struct Entry {
    config: DatabaseConfig,
    live: Option<ConnectionHandle>,
}

#[derive(Debug, Default)]
pub struct Connections {
    entries: RwLock<HashMap<String, Entry>>,
}

static CONNECTIONS: Lazy<Arc<Connections>> = Lazy::new(|| Arc::new(Connections::new()));

/// Process-wide registry used when a route is not given one explicitly.
pub fn connections() -> Arc<Connections> {
    CONNECTIONS.clone()
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let registry = Self::new();
        settings.install(&registry)?;
        Ok(registry)
    }
}

impl ConnectionRegistry for Connections {
    fn register(&self, alias: &str, config: DatabaseConfig) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(alias) {
            return Err(RouteError::DuplicateAlias(alias.to_string()));
        }
        entries.insert(alias.to_string(), Entry { config, live: None });
        log::debug!("registered database alias '{alias}'");
        Ok(())
    }

    fn deregister(&self, alias: &str) -> Option<DatabaseConfig> {
        let removed = self.entries.write().remove(alias)?;
        log::debug!("deregistered database alias '{alias}'");
        Some(removed.config)
    }

    fn config(&self, alias: &str) -> Option<DatabaseConfig> {
        self.entries.read().get(alias).map(|e| e.config.clone())
    }

    fn contains(&self, alias: &str) -> bool {
        self.entries.read().contains_key(alias)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<_> = self.entries.read().keys().cloned().collect();
        aliases.sort();
        aliases
    }

    fn get(&self, alias: &str) -> Result<ConnectionHandle> {
        // Fast path.
        {
            let entries = self.entries.read();
            match entries.get(alias) {
                None => return Err(RouteError::UnknownAlias(alias.to_string())),
                Some(Entry {
                    live: Some(handle), ..
                }) => return Ok(handle.clone()),
                Some(_) => {}
            }
        }

        // Slow path: open under the write lock, re-checking first.
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(alias)
            .ok_or_else(|| RouteError::UnknownAlias(alias.to_string()))?;
        if let Some(handle) = &entry.live {
            return Ok(handle.clone());
        }

        let handle = Arc::new(Mutex::new(open(alias, &entry.config)?));
        entry.live = Some(handle.clone());
        log::debug!("opened connection for '{alias}'");
        Ok(handle)
    }

    fn close(&self, alias: &str) -> Result<()> {
        let live = self
            .entries
            .write()
            .get_mut(alias)
            .ok_or_else(|| RouteError::UnknownAlias(alias.to_string()))?
            .live
            .take();

        let Some(handle) = live else {
            return Ok(());
        };

        match Arc::try_unwrap(handle) {
            Ok(conn) => conn
                .into_inner()
                .close()
                .map_err(|(_, source)| RouteError::CleanupFailure {
                    alias: alias.to_string(),
                    source,
                }),
            // Outstanding handles keep the connection alive until they drop.
            Err(_) => Err(RouteError::ConnectionBusy(alias.to_string())),
        }
    }
}

fn open(alias: &str, config: &DatabaseConfig) -> Result<Connection> {
    match config.engine() {
        Some("sqlite" | "sqlite3") => {}
        Some(other) => return Err(RouteError::UnsupportedEngine(other.to_string())),
        None => {
            return Err(RouteError::MissingSetting {
                alias: alias.to_string(),
                key: "engine",
            });
        }
    }

    let name = config.name().ok_or_else(|| RouteError::MissingSetting {
        alias: alias.to_string(),
        key: "name",
    })?;

    let conn = if name == ":memory:" {
        Connection::open_in_memory()?
    } else if config.read_only()? {
        Connection::open_with_flags(
            name,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?
    } else {
        Connection::open(name)?
    };

    if let Some(timeout) = config.busy_timeout()? {
        conn.busy_timeout(timeout)?;
    }

    Ok(conn)
}
