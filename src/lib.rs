//! Scoped, context-local routing of database reads and writes.
//!
//! A [`ScopedRoute`] says "for this block, call or future, send reads and/or
//! writes to database X". While it is entered, [`router::resolve_read`] and
//! [`router::resolve_write`] (and therefore [`Dispatch`]) answer with X on
//! the current thread or task only. A route built from an inline
//! [`DatabaseConfig`] registers that configuration under a minted alias and
//! removes it again on exit.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod router;
pub mod scope;

pub use config::{DatabaseConfig, Settings};
pub use dispatch::Dispatch;
pub use error::{Result, RouteError};
pub use registry::{ConnectionHandle, ConnectionRegistry, Connections, connections};
pub use router::{DatabaseRouter, DynamicRouter, RecordRef, RouterChain, resolve_read, resolve_write};
pub use scope::{RouteBuilder, RouteGuard, Routed, ScopedRoute, Target};

/// Alias used whenever no override is active.
pub const DEFAULT_DB_ALIAS: &str = "default";

/// Start building a route to `target`; shorthand for [`ScopedRoute::builder`].
pub fn in_database<T>(target: T) -> RouteBuilder
where
    T: TryInto<Target, Error = RouteError>,
{
    ScopedRoute::builder(target)
}
