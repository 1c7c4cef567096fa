//! Schema element definitions

use crate::constants::EDM_GUID;
use crate::literal::Literal;
use crate::path::EntityKey;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Strip `Collection(...)` from a type reference
pub fn parse_type_ref(type_ref: &str) -> (String, bool) {
    match type_ref
        .strip_prefix("Collection(")
        .and_then(|t| t.strip_suffix(')'))
    {
        Some(inner) => (inner.to_string(), true),
        None => (type_ref.to_string(), false),
    }
}

/// Field metadata for a structured type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
    pub max_length: Option<usize>,
    pub collection: bool,
    pub navigation: bool,
    pub default: Option<Value>,
}

impl FieldDef {
    /// Nullable scalar field; `Collection(T)` type references set `collection`
    pub fn new(name: impl Into<String>, type_ref: &str) -> Self {
        let (type_name, collection) = parse_type_ref(type_ref);
        Self {
            name: name.into(),
            type_name,
            nullable: true,
            max_length: None,
            collection,
            navigation: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }

    pub fn navigation(mut self) -> Self {
        self.navigation = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn is_edm(&self) -> bool {
        self.type_name.starts_with("Edm.")
    }
}

/// Entity or complex type with resolved base type chain
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredType {
    pub name: String,
    pub namespace: String,
    pub base: Option<String>,
    pub parent: Option<Arc<StructuredType>>,
    pub fields: Vec<FieldDef>,
    pub keys: Vec<String>,
    pub open: bool,
    pub is_complex: bool,
}

impl StructuredType {
    pub fn entity(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            base: None,
            parent: None,
            fields: Vec::new(),
            keys: Vec::new(),
            open: false,
            is_complex: false,
        }
    }

    pub fn complex(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_complex: true,
            ..Self::entity(namespace, name)
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.keys.push(name.into());
        self
    }

    pub fn base_type(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Fields of this type, parents first
    pub fn all_fields(&self) -> Vec<&FieldDef> {
        let mut fields = self
            .parent
            .as_ref()
            .map(|p| p.all_fields())
            .unwrap_or_default();
        fields.extend(self.fields.iter());
        fields
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.find_field(name)))
    }

    /// Key property names, inherited from the root of the type chain
    pub fn key_names(&self) -> Vec<String> {
        if !self.keys.is_empty() {
            return self.keys.clone();
        }
        self.parent
            .as_ref()
            .map(|p| p.key_names())
            .unwrap_or_default()
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.key_names().iter().any(|k| k == name)
    }

    /// Whether this type is `type_name` or derives from it
    pub fn is_sub_type_of(&self, type_name: &str) -> bool {
        self.qualified_name() == type_name
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.is_sub_type_of(type_name))
    }

    /// Build the key from entity attributes; `None` if any part is missing
    pub fn resolve_key(&self, attrs: &Map<String, Value>) -> Option<EntityKey> {
        let names = self.key_names();
        let mut parts = Vec::with_capacity(names.len());
        for name in &names {
            let value = attrs.get(name).filter(|v| !v.is_null())?;
            let literal = match (self.find_field(name), value) {
                (Some(field), Value::String(s)) if field.type_name == EDM_GUID => {
                    Uuid::parse_str(s)
                        .map(Literal::Guid)
                        .unwrap_or_else(|_| Literal::from_json(value))
                }
                _ => Literal::from_json(value),
            };
            parts.push((name.clone(), literal));
        }
        match parts.len() {
            0 => None,
            1 => parts.pop().map(|(_, lit)| EntityKey::Single(lit)),
            _ => Some(EntityKey::Compound(parts)),
        }
    }
}

/// Enum type with named members
#[derive(Debug, Clone, PartialEq)]
pub struct EnumTypeDef {
    pub name: String,
    pub namespace: String,
    pub flags: bool,
    pub members: Vec<(String, i64)>,
}

impl EnumTypeDef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            flags: false,
            members: Vec::new(),
        }
    }

    pub fn flags(mut self) -> Self {
        self.flags = true;
        self
    }

    pub fn member(mut self, name: impl Into<String>, value: i64) -> Self {
        self.members.push((name.into(), value));
        self
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// Entity set or singleton in the entity container
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySetDef {
    pub name: String,
    pub entity_type: String,
    pub singleton: bool,
}

impl EntitySetDef {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            singleton: false,
        }
    }

    pub fn singleton(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            singleton: true,
            ..Self::new(name, entity_type)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    Function,
    Action,
}

/// Function or action declaration
#[derive(Debug, Clone, PartialEq)]
pub struct CallableDef {
    pub name: String,
    pub namespace: String,
    pub kind: CallableKind,
    pub bound: bool,
    /// Parameters including the binding parameter when bound
    pub parameters: Vec<FieldDef>,
    pub return_type: Option<FieldDef>,
    pub entity_set_path: Option<String>,
}

impl CallableDef {
    pub fn function(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            kind: CallableKind::Function,
            bound: false,
            parameters: Vec::new(),
            return_type: None,
            entity_set_path: None,
        }
    }

    pub fn action(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: CallableKind::Action,
            ..Self::function(namespace, name)
        }
    }

    /// Bind to a type; the binding parameter becomes the first parameter
    pub fn bound_to(mut self, binding_type: &str) -> Self {
        self.bound = true;
        let binding = FieldDef::new("bindingParameter", binding_type);
        self.parameters.insert(0, binding);
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, type_ref: &str) -> Self {
        self.parameters.push(FieldDef::new(name, type_ref));
        self
    }

    pub fn returns(mut self, type_ref: &str) -> Self {
        self.return_type = Some(FieldDef::new("return", type_ref));
        self
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Type of the binding parameter
    pub fn binding_type(&self) -> Option<&str> {
        if self.bound {
            self.parameters.first().map(|p| p.type_name.as_str())
        } else {
            None
        }
    }

    /// Parameters the caller supplies
    pub fn call_parameters(&self) -> &[FieldDef] {
        if self.bound && !self.parameters.is_empty() {
            &self.parameters[1..]
        } else {
            &self.parameters
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> StructuredType {
        StructuredType::entity("Trip", "Person")
            .key("UserName")
            .field(FieldDef::new("UserName", "Edm.String").required())
            .field(FieldDef::new("Emails", "Collection(Edm.String)"))
    }

    #[test]
    fn test_collection_type_refs() {
        let field = FieldDef::new("Emails", "Collection(Edm.String)");
        assert!(field.collection);
        assert_eq!(field.type_name, "Edm.String");
    }

    #[test]
    fn test_inherited_keys_and_fields() {
        let parent = Arc::new(person());
        let mut employee = StructuredType::entity("Trip", "Employee")
            .base_type("Trip.Person")
            .field(FieldDef::new("Cost", "Edm.Int64"));
        employee.parent = Some(parent);
        assert_eq!(employee.key_names(), vec!["UserName".to_string()]);
        assert_eq!(employee.all_fields().len(), 3);
        assert!(employee.is_sub_type_of("Trip.Person"));
        assert!(!person().is_sub_type_of("Trip.Employee"));
    }

    #[test]
    fn test_resolve_key() {
        let attrs = json!({"UserName": "russellwhyte"});
        let key = person().resolve_key(attrs.as_object().unwrap());
        assert_eq!(key, Some(EntityKey::from("russellwhyte")));
        assert_eq!(person().resolve_key(&Map::new()), None);
    }

    #[test]
    fn test_guid_keys_resolve_typed() {
        let ty = StructuredType::entity("NS", "Doc")
            .key("Id")
            .field(FieldDef::new("Id", "Edm.Guid"));
        let attrs = json!({"Id": "cd1bd5c3-1c4b-4c58-9a3a-6a8f3b4a2e11"});
        match ty.resolve_key(attrs.as_object().unwrap()) {
            Some(EntityKey::Single(Literal::Guid(_))) => {}
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_bound_callable_parameters() {
        let callable = CallableDef::function("Trip", "GetInvolvedPeople")
            .bound_to("Trip.Trip")
            .parameter("limit", "Edm.Int32");
        assert_eq!(callable.binding_type(), Some("Trip.Trip"));
        assert_eq!(callable.call_parameters().len(), 1);
    }
}
