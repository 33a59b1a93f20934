//! Filter predicates over cached entities

use crate::types::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One predicate on a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    /// Field to test
    pub param_name: String,
    /// Expected value, or values to look for when `should_include` is set
    pub param_value: Value,
    /// Treat the field as a collection that must contain `param_value`
    #[serde(default)]
    pub should_include: bool,
}

impl FilterRule {
    /// Field must equal `value`
    pub fn equals(param_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            param_name: param_name.into(),
            param_value: value.into(),
            should_include: false,
        }
    }

    /// Field must be a collection containing `value` (or every element of it)
    pub fn includes(param_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            param_name: param_name.into(),
            param_value: value.into(),
            should_include: true,
        }
    }
}

/// Rules combined with AND, or with OR when `or_check` is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Predicates to apply
    pub rules: Vec<FilterRule>,
    /// Keep entities matching at least one rule instead of all of them
    #[serde(default)]
    pub or_check: bool,
}

impl Filter {
    /// Every rule must match
    pub fn all(rules: Vec<FilterRule>) -> Self {
        Self { rules, or_check: false }
    }

    /// At least one rule must match
    pub fn any(rules: Vec<FilterRule>) -> Self {
        Self { rules, or_check: true }
    }

    /// Evaluate the filter on one entity
    pub fn matches(&self, entity: &Entity) -> bool {
        if self.or_check {
            self.rules.iter().any(|rule| matches_filter(entity, rule))
        } else {
            self.rules.iter().all(|rule| matches_filter(entity, rule))
        }
    }
}

/// Whether `entity` satisfies `rule`
pub fn matches_filter(entity: &Entity, rule: &FilterRule) -> bool {
    let field = entity.get(&rule.param_name);

    if !rule.should_include {
        return field.is_some_and(|field| same_value(field, &rule.param_value));
    }

    let Some(Value::Array(collection)) = field else {
        return false;
    };
    let contains = |wanted: &Value| collection.iter().any(|item| same_value(item, wanted));

    match &rule.param_value {
        Value::Array(wanted) => wanted.iter().all(contains),
        value => contains(value),
    }
}

/// JSON equality where numbers compare by value, so `4` equals `4.0`
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Keep the entities that satisfy `filter`
pub fn apply_filter(entities: Vec<Entity>, filter: &Filter) -> Vec<Entity> {
    entities.into_iter().filter(|entity| filter.matches(entity)).collect()
}
