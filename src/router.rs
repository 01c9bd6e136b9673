//! Routing decisions consulted by the dispatch layer on every operation.

use std::sync::Arc;

use crate::{DEFAULT_DB_ALIAS, context};

/// Alias reads should use right now.
pub fn resolve_read() -> String {
    context::read_override().unwrap_or_else(|| DEFAULT_DB_ALIAS.to_string())
}

/// Alias writes should use right now.
pub fn resolve_write() -> String {
    context::write_override().unwrap_or_else(|| DEFAULT_DB_ALIAS.to_string())
}

/// A stored record: its model label and the alias it was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef<'a> {
    pub model: &'a str,
    pub db: &'a str,
}

impl<'a> RecordRef<'a> {
    pub fn new(model: &'a str, db: &'a str) -> Self {
        Self { model, db }
    }
}

/// Routing policy. `None` means "no opinion, ask the next router".
pub trait DatabaseRouter: Send + Sync {
    fn db_for_read(&self, _model: &str) -> Option<String> {
        None
    }

    fn db_for_write(&self, _model: &str) -> Option<String> {
        None
    }

    fn allow_relation(&self, _left: RecordRef<'_>, _right: RecordRef<'_>) -> Option<bool> {
        None
    }

    fn allow_migrate(&self, _db: &str, _model: &str) -> Option<bool> {
        None
    }
}

/// Routes by the current context's overrides. Without an override it has no
/// opinion, so the chain's default alias applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicRouter;

impl DynamicRouter {
    pub fn allow_syncdb(&self, db: &str, model: &str) -> Option<bool> {
        self.allow_migrate(db, model)
    }
}

impl DatabaseRouter for DynamicRouter {
    fn db_for_read(&self, _model: &str) -> Option<String> {
        context::read_override()
    }

    fn db_for_write(&self, _model: &str) -> Option<String> {
        context::write_override()
    }

    // Routing is advisory; records may relate across databases.
    fn allow_relation(&self, _left: RecordRef<'_>, _right: RecordRef<'_>) -> Option<bool> {
        Some(true)
    }

    fn allow_migrate(&self, _db: &str, _model: &str) -> Option<bool> {
        None
    }
}

/// Ordered list of routers; the first opinion wins.
#[derive(Clone)]
pub struct RouterChain {
    routers: Vec<Arc<dyn DatabaseRouter>>,
    default_alias: String,
}

impl Default for RouterChain {
    fn default() -> Self {
        Self::dynamic()
    }
}

impl RouterChain {
    /// A chain with no routers: everything goes to the default alias.
    pub fn new() -> Self {
        Self {
            routers: Vec::new(),
            default_alias: DEFAULT_DB_ALIAS.to_string(),
        }
    }

    pub fn dynamic() -> Self {
        Self::new().with_router(DynamicRouter)
    }

    pub fn with_router(mut self, router: impl DatabaseRouter + 'static) -> Self {
        self.routers.push(Arc::new(router));
        self
    }

    pub fn default_alias(mut self, alias: impl Into<String>) -> Self {
        self.default_alias = alias.into();
        self
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    pub fn db_for_read(&self, model: &str) -> String {
        self.routers
            .iter()
            .find_map(|r| r.db_for_read(model))
            .unwrap_or_else(|| self.default_alias.clone())
    }

    pub fn db_for_write(&self, model: &str) -> String {
        self.routers
            .iter()
            .find_map(|r| r.db_for_write(model))
            .unwrap_or_else(|| self.default_alias.clone())
    }

    /// Without an opinion, only records from the same database may relate.
    pub fn allow_relation(&self, left: RecordRef<'_>, right: RecordRef<'_>) -> bool {
        self.routers
            .iter()
            .find_map(|r| r.allow_relation(left, right))
            .unwrap_or(left.db == right.db)
    }

    pub fn allow_migrate(&self, db: &str, model: &str) -> bool {
        self.routers
            .iter()
            .find_map(|r| r.allow_migrate(db, model))
            .unwrap_or(true)
    }
}
