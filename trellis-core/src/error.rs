//! Error types and the error choke point.
//!
//! User callbacks (render functions, hooks, watcher callbacks, event
//! handlers) return `Result<_, BoxError>`. Every failure is funnelled through
//! [`handle_error`], which walks the failing component's ancestors and gives
//! each `error_captured` hook a chance to stop propagation before the global
//! handler (or the log) sees it.

use std::fmt;

use thiserror::Error;

use crate::instance::{arena, ComponentId};
use crate::reactive::ReactiveContext;
use crate::runtime::Runtime;

/// Boxed error returned by user-supplied callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by the framework.
#[derive(Debug, Error)]
pub enum Error {
    /// A user callback failed. `info` names the call site.
    #[error("error in {info}: {source}")]
    User {
        info: String,
        #[source]
        source: BoxError,
    },

    /// A watcher kept re-queueing itself within one flush.
    #[error("you may have an infinite update loop in {expression} (ran more than {limit} times in one flush)")]
    InfiniteUpdateLoop { expression: String, limit: usize },

    /// `Vm::call` was asked for a method the component does not define.
    #[error("method \"{0}\" is not defined on the component")]
    UnknownMethod(String),

    /// The instance was destroyed or never registered.
    #[error("component instance {0} is not alive")]
    InstanceGone(ComponentId),
}

impl Error {
    /// Wrap a user error with the call site it came from.
    pub fn user(info: impl fmt::Display, source: BoxError) -> Self {
        Error::User {
            info: info.to_string(),
            source,
        }
    }

    /// The call-site description, when there is one.
    pub fn info(&self) -> Option<&str> {
        match self {
            Error::User { info, .. } => Some(info),
            _ => None,
        }
    }
}

/// Report an error raised on behalf of `vm`.
///
/// Ancestors' `error_captured` hooks run first, innermost parent first. A hook
/// returning `Ok(false)` stops propagation. A hook that itself fails is
/// reported to the global handler and propagation continues.
pub fn handle_error(err: &Error, vm: Option<ComponentId>) {
    // Reading reactive state from an error hook must not subscribe whatever
    // watcher happened to be evaluating.
    let _ctx = ReactiveContext::suspend();

    if let Some(origin) = vm {
        let mut current = arena::get(origin).and_then(|vm| vm.parent());
        while let Some(ancestor) = current {
            for hook in ancestor.def().error_captured_hooks() {
                match hook(&ancestor, err, origin) {
                    Ok(false) => return,
                    Ok(true) => {}
                    Err(source) => {
                        let hook_err = Error::user("errorCaptured hook", source);
                        global_handle_error(&hook_err, Some(ancestor.id()));
                    }
                }
            }
            current = ancestor.parent();
        }
    }

    global_handle_error(err, vm);
}

fn global_handle_error(err: &Error, vm: Option<ComponentId>) {
    match Runtime::config().error_handler {
        Some(handler) => handler(err, vm),
        None => log_error(err, vm),
    }
}

fn log_error(err: &Error, vm: Option<ComponentId>) {
    let trace = vm.map(crate::runtime::component_trace).unwrap_or_default();
    tracing::error!(error = %err, component = %trace, "unhandled error");
}

/// Run a user callback and route its failure through [`handle_error`].
///
/// Returns `None` when the callback failed.
pub fn invoke_with_error_handling<T>(
    f: impl FnOnce() -> Result<T, BoxError>,
    vm: Option<ComponentId>,
    info: impl fmt::Display,
) -> Option<T> {
    match f() {
        Ok(value) => Some(value),
        Err(source) => {
            handle_error(&Error::user(info, source), vm);
            None
        }
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn user_error_display_includes_info() {
        let err = Error::user("render", "boom".into());
        assert_eq!(err.to_string(), "error in render: boom");
        assert_eq!(err.info(), Some("render"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invoke_routes_failures_to_global_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        Runtime::configure(|config| {
            config.error_handler = Some(Arc::new(move |err: &Error, _vm: Option<ComponentId>| sink.lock().push(err.to_string())));
        });

        let ok = invoke_with_error_handling(|| Ok::<_, BoxError>(3), None, "callback");
        let failed = invoke_with_error_handling(|| Err::<i32, BoxError>("nope".into()), None, "callback");

        assert_eq!(ok, Some(3));
        assert_eq!(failed, None);
        assert_eq!(*seen.lock(), vec!["error in callback: nope".to_string()]);
        Runtime::reset();
    }

    #[test]
    fn infinite_loop_message_names_expression() {
        let err = Error::InfiniteUpdateLoop {
            expression: "render".into(),
            limit: 100,
        };
        assert!(err.to_string().contains("infinite update loop in render"));
        assert_eq!(err.info(), None);
    }
}
