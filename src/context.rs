//! Context-local routing overrides.
//!
//! Plain threads use a thread-local cell. Async code running under
//! [`scope_task`] gets a task-local cell instead, which follows the task
//! across `.await` points and worker threads.

pub mod overrides;

use std::{cell::RefCell, future::Future};

pub use overrides::Overrides;

thread_local! {
    static THREAD_OVERRIDES: RefCell<Overrides> = RefCell::new(Overrides::default());
}

tokio::task_local! {
    static TASK_OVERRIDES: RefCell<Overrides>;
}

/// Run `f` against the cell of the current execution context.
fn with_current<R>(f: impl FnOnce(&RefCell<Overrides>) -> R) -> R {
    if in_task_scope() {
        TASK_OVERRIDES.with(f)
    } else {
        THREAD_OVERRIDES.with(f)
    }
}

/// True when the caller runs inside a [`scope_task`] future.
pub fn in_task_scope() -> bool {
    TASK_OVERRIDES.try_with(|_| ()).is_ok()
}

/// Snapshot of the current context's overrides.
pub fn current() -> Overrides {
    with_current(|cell| cell.borrow().clone())
}

pub fn read_override() -> Option<String> {
    with_current(|cell| cell.borrow().read.clone())
}

pub fn write_override() -> Option<String> {
    with_current(|cell| cell.borrow().write.clone())
}

pub fn publish(alias: &str, read: bool, write: bool) {
    log::debug!("routing override published: alias={alias} read={read} write={write}");
    with_current(|cell| cell.borrow_mut().publish(alias, read, write));
}

/// Reset both overrides to "none". Outer values are not restored.
pub fn clear() {
    with_current(|cell| cell.borrow_mut().clear());
    log::debug!("routing overrides cleared");
}

/// Drive `fut` with its own task-local overrides, seeded from `initial`.
pub async fn scope_task<F: Future>(initial: Overrides, fut: F) -> F::Output {
    TASK_OVERRIDES.scope(RefCell::new(initial), fut).await
}
