//! Props: declaration, extraction from placeholder data, and validation.

use std::sync::Arc;

use indexmap::IndexMap;

use super::lifecycle::is_updating_child_component;
use super::Vm;
use crate::reactive::{define_reactive, SetterHook, Value};
use crate::runtime::warn;
use crate::vdom::VNodeData;

pub type ValidatorFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type DefaultFn = Arc<dyn Fn(&Vm) -> Value + Send + Sync>;

const RESERVED_ATTRS: [&str; 4] = ["key", "ref", "slot", "is"];

/// Accepted prop value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl PropType {
    fn name(self) -> &'static str {
        match self {
            PropType::String => "String",
            PropType::Number => "Number",
            PropType::Boolean => "Boolean",
            PropType::Object => "Object",
            PropType::Array => "Array",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (PropType::String, Value::Str(_))
                | (PropType::Number, Value::Number(_))
                | (PropType::Boolean, Value::Bool(_))
                | (PropType::Object, Value::Object(_))
                | (PropType::Array, Value::Array(_))
        )
    }
}

/// Default for an absent prop or injection.
#[derive(Clone)]
pub enum PropDefault {
    Value(Value),
    /// Evaluated per instance. Required for object and array defaults so
    /// instances do not share one container.
    Factory(DefaultFn),
}

/// A declared prop.
#[derive(Clone, Default)]
pub struct PropDef {
    /// Empty accepts any type.
    pub types: Vec<PropType>,
    pub required: bool,
    pub default: Option<PropDefault>,
    pub validator: Option<ValidatorFn>,
}

impl PropDef {
    /// A prop of any type.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(ty: PropType) -> Self {
        Self {
            types: vec![ty],
            ..Self::default()
        }
    }

    /// Accept another type as well.
    pub fn or(mut self, ty: PropType) -> Self {
        self.types.push(ty);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(PropDefault::Value(value.into()));
        self
    }

    pub fn default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Vm) -> Value + Send + Sync + 'static,
    {
        self.default = Some(PropDefault::Factory(Arc::new(factory)));
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    fn type_index(&self, ty: PropType) -> Option<usize> {
        self.types.iter().position(|t| *t == ty)
    }
}

/// `fooBar` to `foo-bar`.
pub fn hyphenate(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Pull declared props out of placeholder data.
///
/// `props` entries are kept; matching `attrs` entries are consumed so they
/// are not also rendered as attributes. Both the declared and the hyphenated
/// name are accepted.
pub(crate) fn extract_props(props: &IndexMap<String, PropDef>, data: &mut VNodeData) -> IndexMap<String, Value> {
    let mut out = IndexMap::new();
    for key in props.keys() {
        let alt = hyphenate(key);
        let from_props = data.props.get(key).or_else(|| data.props.get(&alt)).cloned();
        if let Some(value) = from_props {
            out.insert(key.clone(), value);
            continue;
        }
        let from_attrs = data
            .attrs
            .shift_remove(key)
            .or_else(|| data.attrs.shift_remove(&alt));
        if let Some(value) = from_attrs {
            out.insert(key.clone(), value);
        }
    }
    out
}

/// Resolve the value of prop `key`: boolean casting, defaults, then
/// assertions.
pub(crate) fn validate_prop(key: &str, def: &PropDef, props_data: &IndexMap<String, Value>, vm: &Vm) -> Value {
    let absent = !props_data.contains_key(key);
    let mut value = props_data.get(key).cloned();

    if let Some(boolean_index) = def.type_index(PropType::Boolean) {
        if absent && def.default.is_none() {
            value = Some(Value::Bool(false));
        } else if let Some(Value::Str(s)) = &value {
            if s.is_empty() || &**s == hyphenate(key).as_str() {
                let string_first = def
                    .type_index(PropType::String)
                    .is_some_and(|string_index| string_index < boolean_index);
                if !string_first {
                    value = Some(Value::Bool(true));
                }
            }
        }
    }

    let value = match value {
        Some(value) => value,
        None => default_value(key, def, vm),
    };

    assert_prop(key, def, &value, absent, vm);
    value
}

fn default_value(key: &str, def: &PropDef, vm: &Vm) -> Value {
    let Some(default) = &def.default else {
        return Value::Null;
    };

    // Keep the value a factory produced last time while the parent still
    // leaves the prop out, so dependents are not retriggered.
    if vm.is_mounted() && !vm.raw_props_data().contains_key(key) {
        let current = vm.props().get_untracked(key);
        if !current.is_null() {
            return current;
        }
    }

    match default {
        PropDefault::Value(value) => {
            if value.is_container() {
                warn(
                    format!(
                        "Invalid default value for prop \"{key}\": props with type Object/Array must use a factory function to return the default value."
                    ),
                    Some(vm.id()),
                );
            }
            value.clone()
        }
        PropDefault::Factory(factory) => factory(vm),
    }
}

fn assert_prop(key: &str, def: &PropDef, value: &Value, absent: bool, vm: &Vm) {
    if def.required && absent {
        warn(format!("Missing required prop: \"{key}\""), Some(vm.id()));
        return;
    }
    if value.is_null() && !def.required {
        return;
    }

    if !def.types.is_empty() && !def.types.iter().any(|t| t.accepts(value)) {
        let expected = def.types.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ");
        warn(
            format!(
                "Invalid prop: type check failed for prop \"{key}\". Expected {expected}, got {}",
                value.type_name()
            ),
            Some(vm.id()),
        );
        return;
    }

    if let Some(validator) = &def.validator {
        if !validator(value) {
            warn(
                format!("Invalid prop: custom validator check failed for prop \"{key}\"."),
                Some(vm.id()),
            );
        }
    }
}

/// Define every declared prop on the instance's props object.
pub(crate) fn init_props(vm: &Vm) {
    let def = vm.def().clone();
    let props_data = vm.raw_props_data();
    let props = vm.props();

    for (key, prop) in &def.options().props {
        if RESERVED_ATTRS.contains(&hyphenate(key).as_str()) {
            warn(
                format!("\"{key}\" is a reserved attribute and cannot be used as component prop."),
                Some(vm.id()),
            );
        }
        let value = validate_prop(key, prop, &props_data, vm);
        define_reactive(&props, key.clone(), value, Some(prop_mutation_hook(vm)));
    }
}

/// Warn when a child writes to its own prop outside a parent update.
fn prop_mutation_hook(vm: &Vm) -> SetterHook {
    let id = vm.id();
    let is_root = vm.parent().is_none() && !vm.has_placeholder();
    Arc::new(move |key: &str| {
        if !is_root && !is_updating_child_component() {
            warn(
                format!(
                    "Avoid mutating a prop directly since the value will be overwritten whenever the parent component re-renders. Instead, use a data or computed property based on the prop's value. Prop being mutated: \"{key}\""
                ),
                Some(id),
            );
        }
    })
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphenates_camel_case() {
        assert_eq!(hyphenate("fooBarBaz"), "foo-bar-baz");
        assert_eq!(hyphenate("plain"), "plain");
    }

    #[test]
    fn extraction_consumes_attrs_but_keeps_props() {
        let mut defs = IndexMap::new();
        defs.insert("userName".to_string(), PropDef::of(PropType::String));
        defs.insert("count".to_string(), PropDef::of(PropType::Number));

        let mut data = VNodeData::new()
            .attr("user-name", "ada")
            .attr("title", "kept")
            .prop("count", 3);

        let extracted = extract_props(&defs, &mut data);

        assert_eq!(extracted["userName"].as_str(), Some("ada"));
        assert_eq!(extracted["count"].as_f64(), Some(3.0));
        assert!(!data.attrs.contains_key("user-name"));
        assert!(data.attrs.contains_key("title"));
        assert!(data.props.contains_key("count"));
    }

    #[test]
    fn type_acceptance() {
        assert!(PropType::String.accepts(&Value::from("x")));
        assert!(!PropType::String.accepts(&Value::from(1)));
        assert!(PropType::Boolean.accepts(&Value::from(true)));
    }
}
