//! Handle over a single query option
//!
//! Supports primitive get/set, array push/remove/at, and dotted-path
//! access into the object part of composite values (used by `$expand`
//! nested options such as `Trips.select`).

use super::expressions::Renderable;
use super::names::QueryOptionName;
use super::options::{OptionValue, QueryOptions, is_empty_value};
use serde_json::{Map, Value};

/// Mutable view on one option of a [`QueryOptions`]
pub struct OptionHandle<'a> {
    options: &'a mut QueryOptions,
    name: QueryOptionName,
}

impl<'a> OptionHandle<'a> {
    pub(crate) fn new(options: &'a mut QueryOptions, name: QueryOptionName) -> Self {
        Self { options, name }
    }

    pub fn name(&self) -> QueryOptionName {
        self.name
    }

    /// Whether the option is absent or empty
    pub fn empty(&self) -> bool {
        !self.options.has(self.name)
    }

    /// Current value as JSON; expressions are rendered to their string form
    pub fn value(&self) -> Option<Value> {
        match self.options.get(self.name)? {
            OptionValue::Json(v) => Some(v.clone()),
            OptionValue::Expression(e) => Some(Value::String(e.to_query())),
        }
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.options.set(self.name, value);
    }

    pub fn clear(&mut self) {
        self.options.remove(&[self.name]);
    }

    fn take_array(&mut self) -> Vec<Value> {
        match self.value() {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        }
    }

    fn store_array(&mut self, mut items: Vec<Value>) {
        items.retain(|v| !is_empty_value(v));
        match items.len() {
            1 => {
                let single = items.remove(0);
                self.options.set(self.name, single);
            }
            _ => self.options.set(self.name, Value::Array(items)),
        }
    }

    /// Append to the option, turning a single value into an array
    pub fn push(&mut self, value: impl Into<Value>) {
        let mut items = self.take_array();
        items.push(value.into());
        self.options.set(self.name, Value::Array(items));
    }

    /// Remove a value; a single remaining item collapses back to a scalar
    pub fn remove(&mut self, value: &Value) {
        let items = self
            .take_array()
            .into_iter()
            .filter(|v| v != value)
            .collect();
        self.store_array(items);
    }

    pub fn at(&self, index: usize) -> Option<Value> {
        match self.value()? {
            Value::Array(items) => items.get(index).cloned(),
            other if index == 0 => Some(other),
            _ => None,
        }
    }

    fn with_object<R>(
        &mut self,
        create: bool,
        f: impl FnOnce(&mut Map<String, Value>) -> R,
    ) -> Option<R> {
        let current = self.value();
        let (mut items, object_index, was_object) = match current {
            Some(Value::Object(map)) => (vec![Value::Object(map)], Some(0), true),
            Some(Value::Array(items)) => {
                let index = items.iter().position(Value::is_object);
                (items, index, false)
            }
            Some(other) => (vec![other], None, false),
            None => (Vec::new(), None, false),
        };
        let index = match object_index {
            Some(index) => index,
            None if create => {
                items.push(Value::Object(Map::new()));
                items.len() - 1
            }
            None => return None,
        };
        let result = match items.get_mut(index) {
            Some(Value::Object(map)) => f(map),
            _ => return None,
        };
        if was_object {
            let single = items.remove(0);
            self.options.set(self.name, single);
        } else {
            self.store_array(items);
        }
        Some(result)
    }

    /// Set a dotted path inside the object part of the option
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let value = value.into();
        self.with_object(true, |map| set_path(map, path, value));
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        let map = match self.value()? {
            Value::Object(map) => map,
            Value::Array(items) => match items.into_iter().find(Value::is_object)? {
                Value::Object(map) => map,
                _ => return None,
            },
            _ => return None,
        };
        get_path(&map, path).cloned()
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn unset(&mut self, path: &str) {
        self.with_object(false, |map| unset_path(map, path));
    }

    /// Merge keys into the object part of the option
    pub fn assign(&mut self, values: Map<String, Value>) {
        self.with_object(true, |map| {
            for (k, v) in values {
                map.insert(k, v);
            }
        });
    }
}

/// Resolve a dotted path in a JSON object
pub(crate) fn get_path<'v>(map: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = map.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

pub(crate) fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

pub(crate) fn unset_path(map: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            map.remove(path);
        }
        Some((head, rest)) => {
            let mut emptied = false;
            if let Some(Value::Object(child)) = map.get_mut(head) {
                unset_path(child, rest);
                emptied = child.is_empty();
            }
            if emptied {
                map.remove(head);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_and_remove_collapse() {
        let mut options = QueryOptions::new();
        let mut select = options.option(QueryOptionName::Select);
        select.push("Name");
        select.push("Age");
        assert_eq!(select.value(), Some(json!(["Name", "Age"])));
        assert_eq!(select.at(1), Some(json!("Age")));
        select.remove(&json!("Age"));
        assert_eq!(select.value(), Some(json!("Name")));
        select.remove(&json!("Name"));
        assert!(select.empty());
    }

    #[test]
    fn test_nested_paths() {
        let mut options = QueryOptions::new();
        let mut expand = options.option(QueryOptionName::Expand);
        expand.push("Friends");
        expand.set("Trips.select", json!(["Name"]));
        assert!(expand.has("Trips.select"));
        assert_eq!(expand.get("Trips.select"), Some(json!(["Name"])));
        assert_eq!(
            expand.value(),
            Some(json!(["Friends", {"Trips": {"select": ["Name"]}}]))
        );
        expand.unset("Trips.select");
        assert_eq!(expand.value(), Some(json!("Friends")));
    }

    #[test]
    fn test_assign_on_object_value() {
        let mut options = QueryOptions::new();
        let mut expand = options.option(QueryOptionName::Expand);
        let mut values = Map::new();
        values.insert("Trips".into(), json!({"top": 1}));
        expand.assign(values);
        assert_eq!(expand.value(), Some(json!({"Trips": {"top": 1}})));
        assert_eq!(
            options.to_params(false).get("$expand"),
            Some("Trips($top=1)")
        );
    }
}
