//! Singleton resource (`Me`)
//!
//! A singleton behaves like a keyed entity: fetch, update, modify,
//! navigation, properties and bound operations all apply.

use super::{EntityResource, Resource};
use crate::api::ODataApi;
use crate::path::{PathSegments, SegmentKind};
use crate::query::QueryOptions;

pub type SingletonResource = EntityResource;

impl EntityResource {
    /// Singleton by container name; the type comes from the schema
    pub fn singleton(api: ODataApi, name: &str) -> SingletonResource {
        let type_name = api.schema().find_entity_set(name).map(|s| s.entity_type);
        let mut segments = PathSegments::new();
        segments
            .add(SegmentKind::Singleton, name)
            .set_type_opt(type_name);
        EntityResource::from_resource(Resource::new(api, segments, QueryOptions::new()), true)
    }

    pub fn is_singleton(&self) -> bool {
        self.resource
            .segments()
            .first()
            .is_some_and(|s| s.kind() == SegmentKind::Singleton)
    }
}
