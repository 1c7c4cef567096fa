//! Entity keys and their rendering

use crate::literal::{Literal, RenderContext, normalize};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

static GUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid guid regex")
});

/// Key of an addressed entity: a single literal or named parts
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKey {
    Single(Literal),
    Compound(Vec<(String, Literal)>),
}

impl EntityKey {
    pub fn single(value: impl Into<Literal>) -> Self {
        EntityKey::Single(value.into())
    }

    pub fn compound<I, K, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Literal>,
    {
        EntityKey::Compound(
            parts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a key from JSON: objects become compound keys
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Object(map) => Some(EntityKey::Compound(
                map.iter()
                    .map(|(k, v)| (k.clone(), Literal::from_json(v)))
                    .collect(),
            )),
            other => Some(EntityKey::Single(Literal::from_json(other))),
        }
    }

    /// JSON form, used when comparing identities
    pub fn to_json(&self) -> Value {
        match self {
            EntityKey::Single(lit) => lit.to_json(),
            EntityKey::Compound(parts) => {
                let mut map = Map::new();
                for (k, v) in parts {
                    map.insert(k.clone(), v.to_json());
                }
                Value::Object(map)
            }
        }
    }

    /// Render the part between parentheses
    ///
    /// A string shaped like a GUID is rendered unquoted. Other strings are
    /// always quoted; declare a `Literal::Guid` or `Literal::Raw` for any
    /// other unquoted form.
    pub fn render(&self, ctx: &mut RenderContext) -> String {
        match self {
            EntityKey::Single(lit) => render_key_literal(lit, ctx),
            EntityKey::Compound(parts) => parts
                .iter()
                .map(|(k, v)| format!("{}={}", k, render_key_literal(v, ctx)))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

fn render_key_literal(lit: &Literal, ctx: &mut RenderContext) -> String {
    match lit {
        Literal::String(s) if is_guid(s) => s.clone(),
        other => normalize(other, ctx),
    }
}

/// Whether a string has the canonical GUID shape
pub fn is_guid(value: &str) -> bool {
    GUID_REGEX.is_match(value)
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        EntityKey::Single(value.into())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        EntityKey::Single(value.into())
    }
}

impl From<i32> for EntityKey {
    fn from(value: i32) -> Self {
        EntityKey::Single(value.into())
    }
}

impl From<i64> for EntityKey {
    fn from(value: i64) -> Self {
        EntityKey::Single(value.into())
    }
}

impl From<Uuid> for EntityKey {
    fn from(value: Uuid) -> Self {
        EntityKey::Single(value.into())
    }
}

impl From<Literal> for EntityKey {
    fn from(value: Literal) -> Self {
        EntityKey::Single(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(key: EntityKey) -> String {
        key.render(&mut RenderContext::new())
    }

    #[test]
    fn test_single_keys() {
        assert_eq!(render("russellwhyte".into()), "'russellwhyte'");
        assert_eq!(render(42.into()), "42");
    }

    #[test]
    fn test_compound_key_keeps_order() {
        let parts = vec![("OrderID", Literal::from(1)), ("ProductID", "x".into())];
        let key = EntityKey::compound(parts);
        assert_eq!(render(key), "OrderID=1,ProductID='x'");
    }

    #[test]
    fn test_guid_shaped_string_is_unquoted() {
        let guid = "cd1bd5c3-1c4b-4c58-9a3a-6a8f3b4a2e11";
        assert_eq!(render(guid.into()), guid);
        assert_eq!(render("not-a-guid".into()), "'not-a-guid'");
    }

    #[test]
    fn test_from_json() {
        assert_eq!(EntityKey::from_json(&Value::Null), None);
        let key = EntityKey::from_json(&serde_json::json!({"A": 1, "B": "b"})).unwrap();
        assert_eq!(render(key), "A=1,B='b'");
    }
}
