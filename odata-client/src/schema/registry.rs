//! In-memory schema built from declarations or a parsed `$metadata` document

use super::parsers::{CallableParser, EdmParser, EnumParser, Parser, StructuredParser};
use super::types::{CallableDef, EntitySetDef, EnumTypeDef, StructuredType};
use super::Schema;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct RegistryInner {
    aliases: HashMap<String, String>,
    structured: HashMap<String, Arc<StructuredType>>,
    enums: HashMap<String, Arc<EnumTypeDef>>,
    entity_sets: Vec<EntitySetDef>,
    callables: Vec<Arc<CallableDef>>,
}

/// Cheaply clonable schema registry
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    inner: Arc<RegistryInner>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Qualified name with namespace aliases expanded and `#` stripped
    pub fn resolve_name(&self, name: &str) -> String {
        resolve_alias(&self.inner.aliases, name)
    }

    pub fn entity_sets(&self) -> &[EntitySetDef] {
        &self.inner.entity_sets
    }

    pub fn callables(&self) -> impl Iterator<Item = &CallableDef> {
        self.inner.callables.iter().map(|c| c.as_ref())
    }

    pub fn structured_types(&self) -> impl Iterator<Item = &Arc<StructuredType>> {
        self.inner.structured.values()
    }

    fn callable_matches(def: &CallableDef, name: &str) -> bool {
        def.name == name || def.qualified_name() == name
    }
}

fn resolve_alias(aliases: &HashMap<String, String>, name: &str) -> String {
    let name = name.trim_start_matches('#');
    if let Some((prefix, rest)) = name.rsplit_once('.')
        && let Some(namespace) = aliases.get(prefix)
    {
        return format!("{}.{}", namespace, rest);
    }
    name.to_string()
}

impl Schema for SchemaRegistry {
    fn find_structured_type(&self, type_name: &str) -> Option<Arc<StructuredType>> {
        self.inner
            .structured
            .get(&self.resolve_name(type_name))
            .cloned()
    }

    fn find_enum_type(&self, type_name: &str) -> Option<Arc<EnumTypeDef>> {
        self.inner.enums.get(&self.resolve_name(type_name)).cloned()
    }

    fn find_entity_set(&self, name: &str) -> Option<EntitySetDef> {
        self.inner
            .entity_sets
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    fn find_entity_set_for_type(&self, type_name: &str) -> Option<EntitySetDef> {
        let type_name = self.resolve_name(type_name);
        let exact = self
            .inner
            .entity_sets
            .iter()
            .find(|s| !s.singleton && s.entity_type == type_name);
        if let Some(set) = exact {
            return Some(set.clone());
        }
        // Derived types live in the set of their base
        let ty = self.find_structured_type(&type_name)?;
        self.inner
            .entity_sets
            .iter()
            .find(|s| !s.singleton && ty.is_sub_type_of(&s.entity_type))
            .cloned()
    }

    fn find_callable(&self, name: &str, binding_type: Option<&str>) -> Option<Arc<CallableDef>> {
        let candidates = self
            .inner
            .callables
            .iter()
            .filter(|c| Self::callable_matches(c, name));
        let Some(binding_type) = binding_type else {
            return candidates
                .clone()
                .find(|c| !c.bound)
                .or_else(|| candidates.clone().next())
                .cloned();
        };
        let binding = self.resolve_name(binding_type);
        let ty = self.find_structured_type(&binding);
        candidates
            .clone()
            .find(|c| c.binding_type() == Some(binding.as_str()))
            .or_else(|| {
                candidates.clone().find(|c| match (c.binding_type(), &ty) {
                    (Some(bound), Some(ty)) => ty.is_sub_type_of(bound),
                    _ => false,
                })
            })
            .or_else(|| candidates.clone().find(|c| !c.bound))
            .cloned()
    }

    fn parser_for_type(&self, type_name: &str) -> Option<Arc<dyn Parser>> {
        let name = self.resolve_name(type_name);
        if name.starts_with("Edm.") {
            return Some(Arc::new(EdmParser::new(name)));
        }
        if let Some(def) = self.find_enum_type(&name) {
            return Some(Arc::new(EnumParser::new(def)));
        }
        let schema: Arc<dyn Schema> = Arc::new(self.clone());
        if let Some(ty) = self.find_structured_type(&name) {
            return Some(Arc::new(StructuredParser::new(ty, schema)));
        }
        self.inner
            .callables
            .iter()
            .find(|c| c.qualified_name() == name)
            .map(|def| Arc::new(CallableParser::new(def.clone(), schema)) as Arc<dyn Parser>)
    }
}

/// Collects declarations, then links base types on [`build`](Self::build)
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    aliases: HashMap<String, String>,
    structured: Vec<StructuredType>,
    enums: Vec<EnumTypeDef>,
    entity_sets: Vec<EntitySetDef>,
    callables: Vec<CallableDef>,
}

impl SchemaRegistryBuilder {
    pub fn alias(mut self, alias: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), namespace.into());
        self
    }

    pub fn structured_type(mut self, ty: StructuredType) -> Self {
        self.structured.push(ty);
        self
    }

    pub fn enum_type(mut self, def: EnumTypeDef) -> Self {
        self.enums.push(def);
        self
    }

    pub fn entity_set(mut self, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        self.entity_sets.push(EntitySetDef::new(name, entity_type));
        self
    }

    pub fn singleton(mut self, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let singleton = EntitySetDef::singleton(name, entity_type);
        self.entity_sets.push(singleton);
        self
    }

    pub fn callable(mut self, def: CallableDef) -> Self {
        self.callables.push(def);
        self
    }

    pub fn build(self) -> SchemaRegistry {
        let aliases = self.aliases;
        let unlinked: HashMap<String, StructuredType> = self
            .structured
            .into_iter()
            .map(|mut ty| {
                ty.base = ty.base.map(|b| resolve_alias(&aliases, &b));
                for field in &mut ty.fields {
                    field.type_name = resolve_alias(&aliases, &field.type_name);
                }
                (ty.qualified_name(), ty)
            })
            .collect();

        let mut linked = HashMap::new();
        let mut visiting = HashSet::new();
        for name in unlinked.keys() {
            link(name, &unlinked, &mut linked, &mut visiting);
        }

        let enums = self
            .enums
            .into_iter()
            .map(|e| (e.qualified_name(), Arc::new(e)))
            .collect();
        let entity_sets: Vec<EntitySetDef> = self
            .entity_sets
            .into_iter()
            .map(|mut s| {
                s.entity_type = resolve_alias(&aliases, &s.entity_type);
                s
            })
            .collect();
        let callables = self
            .callables
            .into_iter()
            .map(|mut c| {
                for param in c.parameters.iter_mut().chain(c.return_type.iter_mut()) {
                    param.type_name = resolve_alias(&aliases, &param.type_name);
                }
                Arc::new(c)
            })
            .collect();

        log::debug!(
            "built schema registry with {} structured types and {} entity sets",
            linked.len(),
            entity_sets.len()
        );

        SchemaRegistry {
            inner: Arc::new(RegistryInner {
                aliases,
                structured: linked,
                enums,
                entity_sets,
                callables,
            }),
        }
    }
}

/// Link a type to its already linked parent chain
fn link(
    name: &str,
    unlinked: &HashMap<String, StructuredType>,
    linked: &mut HashMap<String, Arc<StructuredType>>,
    visiting: &mut HashSet<String>,
) -> Option<Arc<StructuredType>> {
    if let Some(done) = linked.get(name) {
        return Some(done.clone());
    }
    let ty = unlinked.get(name)?;
    if !visiting.insert(name.to_string()) {
        log::warn!("cyclic base type chain at {}", name);
        return None;
    }
    let parent = ty
        .base
        .as_deref()
        .and_then(|base| link(base, unlinked, linked, visiting));
    let mut ty = ty.clone();
    ty.parent = parent;
    let ty = Arc::new(ty);
    linked.insert(name.to_string(), ty.clone());
    visiting.remove(name);
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::FieldDef;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .alias("Self", "Trip")
            .structured_type(
                StructuredType::entity("Trip", "Person")
                    .key("UserName")
                    .field(FieldDef::new("UserName", "Edm.String"))
                    .field(FieldDef::new("Gender", "Self.Gender"))
                    .field(FieldDef::new("Age", "Edm.Int64")),
            )
            .structured_type(
                StructuredType::entity("Trip", "Employee")
                    .base_type("Self.Person")
                    .field(FieldDef::new("Cost", "Edm.Int64")),
            )
            .enum_type(
                EnumTypeDef::new("Trip", "Gender")
                    .member("Male", 0)
                    .member("Female", 1),
            )
            .entity_set("People", "Trip.Person")
            .singleton("Me", "Trip.Person")
            .callable(CallableDef::function("Trip", "GetFavoriteAirline").bound_to("Trip.Person"))
            .callable(CallableDef::function("Trip", "GetNearestAirport"))
            .build()
    }

    #[test]
    fn test_base_types_link_through_aliases() {
        let employee = registry().find_structured_type("Trip.Employee").unwrap();
        assert_eq!(employee.key_names(), vec!["UserName".to_string()]);
        assert!(employee.is_sub_type_of("Trip.Person"));
    }

    #[test]
    fn test_entity_set_for_derived_type() {
        let registry = registry();
        let set = registry.find_entity_set_for_type("#Trip.Employee");
        assert_eq!(set.map(|s| s.name), Some("People".to_string()));
        assert!(registry.find_entity_set("Me").unwrap().singleton);
    }

    #[test]
    fn test_callable_lookup_respects_binding() {
        let registry = registry();
        let bound = registry.find_callable("GetFavoriteAirline", Some("Trip.Employee"));
        assert!(bound.is_some());
        let unbound = registry.find_callable("Trip.GetNearestAirport", None);
        assert!(unbound.is_some());
        assert!(registry.find_callable("Unknown", None).is_none());
    }

    #[test]
    fn test_structured_parser_delegates_per_field() {
        let registry = registry();
        let parser = registry.parser_for_type("Trip.Person").unwrap();
        let parsed = parser.deserialize(
            &json!({"UserName": "a", "Gender": "Female", "Age": "30", "@odata.etag": "W/\"1\""}),
            &Default::default(),
        );
        assert_eq!(
            parsed,
            json!({"UserName": "a", "Gender": 1, "Age": 30, "@odata.etag": "W/\"1\""})
        );
    }

    #[test]
    fn test_derived_payloads_use_derived_parser() {
        let registry = registry();
        let parser = registry.parser_for_type("Trip.Person").unwrap();
        let parsed = parser.deserialize(
            &json!({"@odata.type": "#Trip.Employee", "Cost": "1000"}),
            &Default::default(),
        );
        assert_eq!(parsed["Cost"], json!(1000));
    }
}
