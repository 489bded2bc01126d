//! Provide / inject.
//!
//! Injections resolve before state (so data may use them) by walking up the
//! parent chain to the nearest provider; provided values resolve after state
//! (so they may reference it).

use std::sync::Arc;

use super::props::PropDefault;
use super::Vm;
use crate::error::invoke_with_error_handling;
use crate::reactive::{define_reactive, ReactiveContext, Value};
use crate::runtime::warn;

pub(crate) fn init_injections(vm: &Vm) {
    let def = vm.def().clone();
    if def.options().inject.is_empty() {
        return;
    }
    let _ctx = ReactiveContext::suspend();

    for (key, inject) in &def.options().inject {
        let from = inject.from.as_deref().unwrap_or(key);
        let value = match resolve_provided(vm, from) {
            Some(value) => value,
            None => match &inject.default {
                Some(PropDefault::Value(value)) => value.clone(),
                Some(PropDefault::Factory(factory)) => factory(vm),
                None => {
                    warn(format!("Injection \"{key}\" not found"), Some(vm.id()));
                    continue;
                }
            },
        };

        let id = vm.id();
        let hook = Arc::new(move |key: &str| {
            warn(
                format!(
                    "Avoid mutating an injected value directly since the changes will be overwritten whenever the provided component re-renders. Injection being mutated: \"{key}\""
                ),
                Some(id),
            );
        });
        define_reactive(vm.injected(), key.clone(), value, Some(hook));
    }
}

fn resolve_provided(vm: &Vm, key: &str) -> Option<Value> {
    let mut source = vm.parent();
    while let Some(ancestor) = source {
        if let Some(value) = ancestor.provided(key) {
            return Some(value);
        }
        source = ancestor.parent();
    }
    None
}

pub(crate) fn init_provide(vm: &Vm) {
    let providers = vm.def().options().provide.clone();
    for provide in providers {
        let provided = invoke_with_error_handling(|| provide(vm), Some(vm.id()), "provide()");
        if let Some(values) = provided {
            vm.inner.provided.write().extend(values);
        }
    }
}
