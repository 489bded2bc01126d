//! Runtime configuration and diagnostics.
//!
//! Each thread owns one reactive world: its own scheduler queue, next-tick
//! queue, evaluation-target stack and [`Config`]. Configuration is read and
//! written through [`Runtime`].
//!
//! # Warnings
//!
//! Developer-misuse conditions (mutating a prop, adding a root-level
//! reactive key, duplicate keys...) go through [`warn`]. A warning never
//! changes control flow. With `Config::silent` set they are dropped.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::instance::{arena, ComponentId};

/// Receives errors that reached the top of the error chain.
pub type ErrorHandler = Arc<dyn Fn(&Error, Option<ComponentId>) + Send + Sync>;

/// Receives warnings instead of the log. The second argument is the
/// formatted component trace (empty when no component is involved).
pub type WarnHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Default cap on how often one watcher may run within a single flush.
pub const DEFAULT_MAX_UPDATE_COUNT: usize = 100;

/// Per-thread runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Suppress all warnings.
    pub silent: bool,
    /// Batch watcher runs into a flush on the next tick. When false, queued
    /// watchers flush synchronously.
    pub async_batching: bool,
    /// Runs of one watcher per flush before reporting an infinite loop.
    pub max_update_count: usize,
    /// Global error handler. Errors are logged when unset.
    pub error_handler: Option<ErrorHandler>,
    /// Global warning handler. Warnings are logged when unset.
    pub warn_handler: Option<WarnHandler>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            silent: false,
            async_batching: true,
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
            error_handler: None,
            warn_handler: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("silent", &self.silent)
            .field("async_batching", &self.async_batching)
            .field("max_update_count", &self.max_update_count)
            .field("error_handler", &self.error_handler.is_some())
            .field("warn_handler", &self.warn_handler.is_some())
            .finish()
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Access point for the current thread's configuration.
pub struct Runtime;

impl Runtime {
    /// Snapshot of the current configuration.
    pub fn config() -> Config {
        CONFIG.with(|config| config.borrow().clone())
    }

    /// Mutate the current configuration.
    pub fn configure(f: impl FnOnce(&mut Config)) {
        CONFIG.with(|config| f(&mut config.borrow_mut()));
    }

    /// Restore the default configuration.
    pub fn reset() {
        CONFIG.with(|config| *config.borrow_mut() = Config::default());
    }

    /// Fast path for the hot check in `Dep::notify` and the scheduler.
    pub fn async_batching() -> bool {
        CONFIG.with(|config| config.borrow().async_batching)
    }
}

/// Emit a developer warning, optionally attributed to a component.
pub fn warn(msg: impl AsRef<str>, vm: Option<ComponentId>) {
    let (silent, handler) = CONFIG.with(|config| {
        let config = config.borrow();
        (config.silent, config.warn_handler.clone())
    });
    if silent {
        return;
    }

    let msg = msg.as_ref();
    let trace = vm.map(component_trace).unwrap_or_default();
    match handler {
        Some(handler) => handler(msg, &trace),
        None if trace.is_empty() => tracing::warn!("{msg}"),
        None => tracing::warn!(component = %trace, "{msg}"),
    }
}

/// Display name of a component: `<Root>`, `<Name>` or `<Anonymous>`.
pub fn format_component_name(id: ComponentId) -> String {
    match arena::get(id) {
        Some(vm) if vm.parent().is_none() && !vm.has_placeholder() => "<Root>".to_string(),
        Some(vm) => match vm.name() {
            Some(name) => format!("<{}>", classify(&name)),
            None => "<Anonymous>".to_string(),
        },
        None => "<Destroyed>".to_string(),
    }
}

/// The component's ancestry, innermost first, e.g. `<Child> <- <Root>`.
pub fn component_trace(id: ComponentId) -> String {
    let mut names = vec![format_component_name(id)];
    let mut current = arena::get(id).and_then(|vm| vm.parent());
    while let Some(vm) = current {
        names.push(format_component_name(vm.id()));
        current = vm.parent();
    }
    names.join(" <- ")
}

/// `my-comp` / `my_comp` -> `MyComp`.
fn classify(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn config_defaults() {
        let config = Runtime::config();
        assert!(!config.silent);
        assert!(config.async_batching);
        assert_eq!(config.max_update_count, DEFAULT_MAX_UPDATE_COUNT);
    }

    #[test]
    fn configure_and_reset() {
        Runtime::configure(|config| {
            config.async_batching = false;
            config.max_update_count = 5;
        });
        assert!(!Runtime::async_batching());
        assert_eq!(Runtime::config().max_update_count, 5);

        Runtime::reset();
        assert!(Runtime::async_batching());
    }

    #[test]
    fn warn_goes_to_handler_unless_silent() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = seen.clone();
        Runtime::configure(|config| {
            config.warn_handler = Some(Arc::new(move |msg: &str, _trace: &str| sink.lock().push(msg.to_string())));
        });

        warn("first", None);
        Runtime::configure(|config| config.silent = true);
        warn("second", None);

        assert_eq!(*seen.lock(), vec!["first".to_string()]);
        Runtime::reset();
    }

    #[test]
    fn classify_names() {
        assert_eq!(classify("my-comp"), "MyComp");
        assert_eq!(classify("todo_item"), "TodoItem");
        assert_eq!(classify("Panel"), "Panel");
    }
}
