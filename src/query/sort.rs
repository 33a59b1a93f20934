//! Case-insensitive ordering of cached entities

use crate::types::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort key with optional fallback field and direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sorting {
    /// Primary field
    pub param_name: String,
    /// Field used when the primary one is absent
    #[serde(default)]
    pub fallback_param_name: Option<String>,
    /// Descending order
    #[serde(default)]
    pub reverse: bool,
}

impl Sorting {
    /// Ascending order on one field
    pub fn by(param_name: impl Into<String>) -> Self {
        Self {
            param_name: param_name.into(),
            fallback_param_name: None,
            reverse: false,
        }
    }

    /// Use `fallback` when the primary field is missing
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback_param_name = Some(fallback.into());
        self
    }

    /// Flip the order
    pub fn reversed(mut self) -> Self {
        self.reverse = !self.reverse;
        self
    }

    /// Case-folded sort key; entities missing both fields sort as ""
    fn key(&self, entity: &Entity) -> String {
        let value = entity
            .get(&self.param_name)
            .filter(|value| !value.is_null())
            .or_else(|| {
                self.fallback_param_name
                    .as_deref()
                    .and_then(|fallback| entity.get(fallback))
            });

        match value {
            Some(Value::String(s)) => s.to_lowercase(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string().to_lowercase(),
        }
    }

    /// Compare two entities under this sorting
    pub fn compare(&self, a: &Entity, b: &Entity) -> Ordering {
        let ordering = self.key(a).cmp(&self.key(b));
        if self.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Sort `entities` in place; ties keep their relative order
pub fn apply_sort(entities: &mut [Entity], sorting: &Sorting) {
    entities.sort_by(|a, b| sorting.compare(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<Entity> {
        vec![
            Entity::with_id("1").set("username", "bob"),
            Entity::with_id("2").set("fullName", "Alice"),
            Entity::with_id("3").set("username", "Carl"),
            Entity::with_id("4").set("username", "adam"),
        ]
    }

    fn ids(entities: &[Entity]) -> Vec<&str> {
        entities.iter().filter_map(Entity::id).collect()
    }

    #[test]
    fn case_insensitive_with_fallback() {
        let mut list = users();
        apply_sort(&mut list, &Sorting::by("username").with_fallback("fullName"));
        assert_eq!(ids(&list), vec!["4", "2", "1", "3"]);
    }

    #[test]
    fn reverse_flips_order() {
        let mut list = users();
        apply_sort(&mut list, &Sorting::by("username").with_fallback("fullName").reversed());
        assert_eq!(ids(&list), vec!["3", "1", "2", "4"]);
    }

    #[test]
    fn missing_fields_sort_first() {
        let mut list = users();
        apply_sort(&mut list, &Sorting::by("username"));
        assert_eq!(ids(&list)[0], "2");
    }

    #[test]
    fn compare_matches_sort() {
        let sorting = Sorting::by("username");
        let list = users();
        assert_eq!(sorting.compare(&list[0], &list[2]), Ordering::Less);
        assert_eq!(sorting.clone().reversed().compare(&list[0], &list[2]), Ordering::Greater);
    }
}
