#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use rusqlite::Connection;
use sqlroute::{ConnectionRegistry, Connections, DatabaseConfig, Dispatch, Result};
use tempfile::TempDir;

pub const MODEL: &str = "test_model";

/// Two file-backed databases, "default" and "test", each with a `test_model` table.
pub struct Harness {
    pub dir: TempDir,
    pub registry: Arc<Connections>,
    pub dispatch: Dispatch,
}

impl Harness {
    pub fn new() -> Result<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        let dir = tempfile::tempdir()?;
        let registry = Arc::new(Connections::new());

        for alias in ["default", "test"] {
            let path = dir.path().join(format!("{alias}.db"));
            registry.register(alias, DatabaseConfig::sqlite(path.to_string_lossy()))?;
            create_table(&registry.get(alias)?.lock())?;
        }

        let dispatch = Dispatch::new(registry.clone());
        Ok(Self {
            dir,
            registry,
            dispatch,
        })
    }

    /// A database file outside the registry, ready for an inline config.
    pub fn scratch_db(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        let conn = Connection::open(&path)?;
        create_table(&conn)?;
        conn.close().map_err(|(_, e)| e)?;
        Ok(path)
    }

    pub fn create(&self, name: &str) -> Result<i64> {
        self.dispatch.write(MODEL, |conn| {
            conn.execute("INSERT INTO test_model (name) VALUES (?1)", [name])?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn count(&self) -> Result<i64> {
        self.dispatch
            .read(MODEL, |conn| conn.query_row("SELECT COUNT(*) FROM test_model", [], |r| r.get(0)))
    }

    /// Count rows in `alias` without going through the router.
    pub fn count_in(&self, alias: &str) -> Result<i64> {
        let handle = self.registry.get(alias)?;
        let count = handle
            .lock()
            .query_row("SELECT COUNT(*) FROM test_model", [], |r| r.get(0))?;
        Ok(count)
    }
}

pub fn create_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS test_model (
            id   INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );
        "#,
    )
}

pub fn count_file(path: &PathBuf) -> Result<i64> {
    let conn = Connection::open(path)?;
    let count = conn.query_row("SELECT COUNT(*) FROM test_model", [], |r| r.get(0))?;
    Ok(count)
}
