//! Runs statements on whichever connection the router chain picks.

use std::sync::Arc;

use rusqlite::Connection;

use crate::{
    error::Result,
    registry::{self, ConnectionRegistry},
    router::{RecordRef, RouterChain},
};

pub struct Dispatch {
    chain: RouterChain,
    registry: Arc<dyn ConnectionRegistry>,
}

impl Dispatch {
    /// Dynamic routing over `registry`.
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            chain: RouterChain::dynamic(),
            registry,
        }
    }

    /// Dynamic routing over the process-wide registry.
    pub fn global() -> Self {
        Self::new(registry::connections())
    }

    pub fn with_chain(mut self, chain: RouterChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn chain(&self) -> &RouterChain {
        &self.chain
    }

    pub fn registry(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.registry
    }

    pub fn read<R>(
        &self,
        model: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R> {
        let alias = self.chain.db_for_read(model);
        self.run_on(&alias, f)
    }

    pub fn write<R>(
        &self,
        model: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R> {
        let alias = self.chain.db_for_write(model);
        self.run_on(&alias, f)
    }

    /// Schema change on `db`; `Ok(None)` when a router vetoed it.
    pub fn migrate<R>(
        &self,
        db: &str,
        model: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<Option<R>> {
        if !self.chain.allow_migrate(db, model) {
            log::debug!("migration of '{model}' on '{db}' skipped by router");
            return Ok(None);
        }
        self.run_on(db, f).map(Some)
    }

    pub fn allow_relation(&self, left: RecordRef<'_>, right: RecordRef<'_>) -> bool {
        self.chain.allow_relation(left, right)
    }

    fn run_on<R>(
        &self,
        alias: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R> {
        let handle = self.registry.get(alias)?;
        let conn = handle.lock();
        Ok(f(&*conn)?)
    }
}
