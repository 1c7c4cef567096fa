//! Schema lookup and value parsing
//!
//! Resources and models only see the [`Schema`] trait. [`SchemaRegistry`]
//! is the bundled implementation, filled through its builder or from a
//! `$metadata` document via [`parse_metadata`].

pub mod csdl;
pub mod parsers;
pub mod registry;
pub mod types;

pub use csdl::parse_metadata;
pub use parsers::{
    CallableParser, EdmParser, EnumParser, Parser, ParserOptions, StructuredParser,
    encode_parameters, serialize_parameters,
};
pub use registry::{SchemaRegistry, SchemaRegistryBuilder};
pub use types::{
    CallableDef, CallableKind, EntitySetDef, EnumTypeDef, FieldDef, StructuredType,
    parse_type_ref,
};

use crate::path::EntityKey;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Read access to service metadata
pub trait Schema: Send + Sync {
    fn find_structured_type(&self, type_name: &str) -> Option<Arc<StructuredType>>;

    fn find_enum_type(&self, type_name: &str) -> Option<Arc<EnumTypeDef>>;

    /// Entity set or singleton by container name
    fn find_entity_set(&self, name: &str) -> Option<EntitySetDef>;

    /// Entity set holding entities of a type or one of its base types
    fn find_entity_set_for_type(&self, type_name: &str) -> Option<EntitySetDef>;

    /// Function or action by simple or qualified name, preferring one bound to `binding_type`
    fn find_callable(&self, name: &str, binding_type: Option<&str>) -> Option<Arc<CallableDef>>;

    fn parser_for_type(&self, type_name: &str) -> Option<Arc<dyn Parser>>;

    /// Key of an entity of the given type
    fn resolve_key(&self, type_name: &str, attrs: &Map<String, Value>) -> Option<EntityKey> {
        self.find_structured_type(type_name)?.resolve_key(attrs)
    }

    fn is_sub_type_of(&self, type_name: &str, base: &str) -> bool {
        self.find_structured_type(type_name)
            .is_some_and(|ty| ty.is_sub_type_of(base))
    }
}
