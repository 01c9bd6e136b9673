//! Scoped routing: send reads and/or writes to one database for the
//! duration of a block, a single call, or a future.
//!
//! ```rust,ignore
//! let route = ScopedRoute::builder("replica").build()?;
//! {
//!     let _guard = route.enter();
//!     dispatch.read("account", |conn| /* runs on "replica" */)?;
//! }
//!
//! // An inline config gets a minted alias that disappears after exit.
//! let route = ScopedRoute::builder(DatabaseConfig::sqlite("/tmp/scratch.db"))
//!     .write(true)
//!     .build()?;
//! route.try_run(|| dispatch.write("account", |conn| conn.execute("...", [])))??;
//! ```
//!
//! Exiting a scope always resets both overrides to "none"; an enclosing
//! scope's overrides are not restored.

use std::{
    any,
    fmt,
    future::Future,
    marker::PhantomData,
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use serde_json::Value;
use uuid::Uuid;

use crate::{
    config::DatabaseConfig,
    context,
    error::{Result, RouteError},
    registry::{self, ConnectionRegistry},
};

/// What a route points at: an existing alias or a configuration to register.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Alias(String),
    Config(DatabaseConfig),
}

impl TryFrom<String> for Target {
    type Error = RouteError;

    fn try_from(alias: String) -> Result<Self> {
        if alias.trim().is_empty() {
            return Err(RouteError::InvalidTarget(
                "database alias must not be empty".into(),
            ));
        }
        Ok(Target::Alias(alias))
    }
}

impl TryFrom<&str> for Target {
    type Error = RouteError;

    fn try_from(alias: &str) -> Result<Self> {
        Self::try_from(alias.to_string())
    }
}

impl TryFrom<DatabaseConfig> for Target {
    type Error = RouteError;

    fn try_from(config: DatabaseConfig) -> Result<Self> {
        Ok(Target::Config(config))
    }
}

impl TryFrom<Value> for Target {
    type Error = RouteError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(alias) => Self::try_from(alias),
            Value::Object(settings) => Ok(Target::Config(settings.into_iter().collect())),
            other => Err(RouteError::InvalidTarget(format!(
                "expected an alias or a configuration record, got {other}"
            ))),
        }
    }
}

/// A registry entry minted by a route; released exactly once.
struct Registration {
    alias: String,
    registry: Arc<dyn ConnectionRegistry>,
    released: AtomicBool,
}

impl Registration {
    fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let closed = match self.registry.close(&self.alias) {
            Err(RouteError::UnknownAlias(_)) => Ok(()),
            other => other,
        };
        // Deregister even when closing failed.
        self.registry.deregister(&self.alias);
        log::debug!("released minted database alias '{}'", self.alias);
        closed
    }
}

fn default_registry() -> Arc<dyn ConnectionRegistry> {
    registry::connections()
}

#[must_use = "call build() to create the route"]
pub struct RouteBuilder {
    target: Result<Target>,
    read: bool,
    write: bool,
    registry: Option<Arc<dyn ConnectionRegistry>>,
}

impl RouteBuilder {
    /// Route reads through the target. Defaults to `true`.
    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Route writes to the target. Defaults to `false`.
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Registry for inline configurations. Defaults to [`registry::connections`].
    pub fn registry(mut self, registry: Arc<dyn ConnectionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate the target and, for inline configurations, register them
    /// under a freshly minted alias.
    pub fn build(self) -> Result<ScopedRoute> {
        let (alias, owned) = match self.target? {
            Target::Alias(alias) => (alias, None),
            Target::Config(config) => {
                let registry = self.registry.unwrap_or_else(default_registry);
                let alias = Uuid::new_v4().to_string();
                registry.register(&alias, config)?;
                log::debug!("minted database alias '{alias}'");

                let owned = Registration {
                    alias: alias.clone(),
                    registry,
                    released: AtomicBool::new(false),
                };
                (alias, Some(owned))
            }
        };

        Ok(ScopedRoute {
            alias,
            read: self.read,
            write: self.write,
            owned,
        })
    }
}

/// Routes reads and/or writes to one database while entered.
pub struct ScopedRoute {
    alias: String,
    read: bool,
    write: bool,
    owned: Option<Registration>,
}

impl fmt::Debug for ScopedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedRoute")
            .field("alias", &self.alias)
            .field("read", &self.read)
            .field("write", &self.write)
            .field("owns_connection", &self.owns_connection())
            .finish()
    }
}

impl ScopedRoute {
    /// Route reads (not writes) to `target`, using the global registry.
    pub fn new<T>(target: T) -> Result<Self>
    where
        T: TryInto<Target, Error = RouteError>,
    {
        Self::builder(target).build()
    }

    pub fn builder<T>(target: T) -> RouteBuilder
    where
        T: TryInto<Target, Error = RouteError>,
    {
        RouteBuilder {
            target: target.try_into(),
            read: true,
            write: false,
            registry: None,
        }
    }

    /// Effective alias: the one given, or the minted one for inline configs.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn reads(&self) -> bool {
        self.read
    }

    pub fn writes(&self) -> bool {
        self.write
    }

    pub fn owns_connection(&self) -> bool {
        self.owned.is_some()
    }

    pub fn minted_alias(&self) -> Option<&str> {
        self.owned.as_ref().map(|r| r.alias.as_str())
    }

    /// True once a minted registration has been torn down.
    pub fn is_released(&self) -> bool {
        self.owned
            .as_ref()
            .is_some_and(|r| r.released.load(Ordering::Acquire))
    }

    /// Publish this route's overrides on the current context.
    ///
    /// Outside a [`run_async`](Self::run_async) scope the overrides live on the
    /// current thread, so the guard must not be held across an `.await`:
    /// other futures polled on the same thread (`join!`, `spawn_local`, a
    /// current-thread runtime) would observe them. Async code uses `run_async`.
    pub fn enter(&self) -> RouteGuard<'_> {
        context::publish(&self.alias, self.read, self.write);
        RouteGuard {
            route: self,
            exited: false,
            _not_send: PhantomData,
        }
    }

    /// Run `f` inside the route. Cleanup failures are logged.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// Run `f` inside the route and report cleanup failures.
    pub fn try_run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let guard = self.enter();
        let output = f();
        guard.exit()?;
        Ok(output)
    }

    /// Drive `fut` inside the route with task-local overrides, so they follow
    /// the task across `.await` points and never leak onto other tasks.
    ///
    /// A minted registration is released when the future completes or is
    /// dropped early. Nested inside another `run_async`, the enclosing task's
    /// overrides are cleared on exit; a plain thread's cell is never touched.
    pub async fn run_async<F: Future>(&self, fut: F) -> F::Output {
        let _release = ReleaseOnDrop(self);

        let nested = context::in_task_scope();
        let mut overrides = if nested {
            context::current()
        } else {
            context::Overrides::default()
        };
        overrides.publish(&self.alias, self.read, self.write);
        let output = context::scope_task(overrides, fut).await;

        if nested {
            context::clear();
        }
        output
    }

    /// Turn this route into a wrapper that enters it around every call of `func`.
    ///
    /// Every call shares this one route. For an inline configuration the
    /// minted alias is released when the first call exits, including while
    /// concurrent callers of a cloned wrapper are still inside their scope,
    /// so later or overlapping calls see [`RouteError::UnknownAlias`].
    pub fn wrap<F>(self, func: F) -> Routed<F> {
        Routed::new(Arc::new(self), func)
    }

    /// Clear overrides first so a failed release cannot leave them stale.
    fn finish(&self) -> Result<()> {
        context::clear();
        self.release()
    }

    fn release(&self) -> Result<()> {
        match &self.owned {
            Some(registration) => registration.release(),
            None => Ok(()),
        }
    }
}

impl Drop for ScopedRoute {
    // Covers routes that were built but never entered.
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("failed to release database alias '{}': {e}", self.alias);
        }
    }
}

struct ReleaseOnDrop<'a>(&'a ScopedRoute);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.release() {
            log::error!("failed to release database alias '{}': {e}", self.0.alias);
        }
    }
}

/// Active route on the current thread. Dropping it exits the route.
///
/// Never hold a guard across an `.await`; see [`ScopedRoute::enter`].
#[must_use = "the route is exited as soon as the guard is dropped"]
pub struct RouteGuard<'a> {
    route: &'a ScopedRoute,
    exited: bool,
    // Overrides live on the entering thread; exit must happen there too.
    _not_send: PhantomData<*const ()>,
}

impl RouteGuard<'_> {
    /// Exit now, surfacing a failure to close a minted connection.
    /// Overrides are cleared and the alias deregistered either way.
    pub fn exit(mut self) -> Result<()> {
        self.exited = true;
        self.route.finish()
    }
}

impl Deref for RouteGuard<'_> {
    type Target = ScopedRoute;

    fn deref(&self) -> &ScopedRoute {
        self.route
    }
}

impl Drop for RouteGuard<'_> {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;
        if let Err(e) = self.route.finish() {
            log::error!("scoped route cleanup failed for '{}': {e}", self.route.alias);
        }
    }
}

/// A callable bound to a route; every call runs inside its own scope.
pub struct Routed<F> {
    route: Arc<ScopedRoute>,
    func: F,
}

impl<F> Routed<F> {
    pub fn new(route: Arc<ScopedRoute>, func: F) -> Self {
        Self { route, func }
    }

    pub fn call<A, R>(&self, args: A) -> R
    where
        F: Fn(A) -> R,
    {
        self.route.run(|| (self.func)(args))
    }

    pub fn invoke<R>(&self) -> R
    where
        F: Fn() -> R,
    {
        self.route.run(|| (self.func)())
    }

    /// Type name of the wrapped callable.
    pub fn name(&self) -> &'static str {
        any::type_name::<F>()
    }

    pub fn route(&self) -> &ScopedRoute {
        &self.route
    }

    pub fn inner(&self) -> &F {
        &self.func
    }
}

impl<F: Clone> Clone for Routed<F> {
    fn clone(&self) -> Self {
        Self {
            route: self.route.clone(),
            func: self.func.clone(),
        }
    }
}

impl<F> fmt::Debug for Routed<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routed")
            .field("name", &self.name())
            .field("route", &self.route)
            .finish()
    }
}
