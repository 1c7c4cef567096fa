//! Function calls, bound (`People('a')/Trippin.GetFavoriteAirline()`) and
//! unbound (`GetNearestAirport(lat=33,lon=-118)`)

use super::{ODataResource, Resource, with_response_type};
use crate::api::{ODataApi, ODataCall};
use crate::error::ODataError;
use crate::literal::alias;
use crate::path::{PathSegments, SegmentKind};
use crate::query::QueryOptions;
use crate::request::{RequestOptions, ResponseType};
use crate::response::{EntitiesResult, EntityResult, ODataResponse, PropertyResult};
use crate::schema::{CallableDef, encode_parameters};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FunctionResource {
    pub(crate) resource: Resource,
    def: Option<Arc<CallableDef>>,
}

impl PartialEq for FunctionResource {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
    }
}

impl FunctionResource {
    /// Function import at the service root
    pub fn unbound(api: ODataApi, name: &str) -> Self {
        let def = api.schema().find_callable(name, None).filter(|d| !d.bound);
        let mut segments = PathSegments::new();
        let segment_name = def
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_else(|| name.to_string());
        let return_type = def
            .as_ref()
            .and_then(|d| d.return_type.as_ref())
            .map(|r| r.type_name.clone());
        segments
            .add(SegmentKind::Function, segment_name)
            .set_type_opt(return_type);
        Self {
            resource: Resource::new(api, segments, QueryOptions::new()),
            def,
        }
    }

    /// Function bound to `resource`, already positioned on the binding type
    pub(crate) fn bound(mut resource: Resource, def: Arc<CallableDef>) -> Self {
        resource
            .segments_mut()
            .add(SegmentKind::Function, def.qualified_name())
            .set_type_opt(def.return_type.as_ref().map(|r| r.type_name.clone()));
        Self {
            resource,
            def: Some(def),
        }
    }

    pub fn definition(&self) -> Option<&CallableDef> {
        self.def.as_deref()
    }

    /// Whether the function returns a collection
    pub fn returns_collection(&self) -> bool {
        self.def
            .as_ref()
            .and_then(|d| d.return_type.as_ref())
            .is_some_and(|r| r.collection)
    }

    /// Set call parameters, inline (`Name(a=1)`) or as aliases (`Name(a=@a)&@a=1`)
    pub fn parameters(&self, params: &Map<String, Value>, aliased: bool) -> Self {
        let schema = self.schema();
        let options = self.resource.api().parser_options();
        let encoded = match &self.def {
            Some(def) => encode_parameters(&*schema, def, params, &options),
            None => params
                .iter()
                .map(|(name, value)| (name.clone(), crate::literal::Literal::from_json(value)))
                .collect(),
        };
        let encoded = if aliased {
            encoded
                .into_iter()
                .map(|(name, literal)| {
                    let aliased = alias(literal, Some(&name));
                    (name, aliased)
                })
                .collect()
        } else {
            encoded
        };
        let mut next = self.clone();
        if let Some(handle) = next.resource.segments_mut().get_mut(SegmentKind::Function) {
            handle.set_parameters(encoded);
        }
        next
    }

    /// GET the function with the given parameters
    pub fn call(
        &self,
        params: &Map<String, Value>,
        aliased: bool,
        options: RequestOptions,
    ) -> ODataCall<ODataResponse> {
        self.parameters(params, aliased).resource.get(options)
    }

    pub fn call_property(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<PropertyResult> {
        let options = with_response_type(options, ResponseType::Property);
        self.call(params, false, options)
            .and_then(|response| response.property())
    }

    pub fn call_entity(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntityResult> {
        let options = with_response_type(options, ResponseType::Entity);
        self.call(params, false, options)
            .and_then(|response| response.entity())
    }

    pub fn call_entities(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntitiesResult> {
        if self.def.is_some() && !self.returns_collection() {
            return ODataCall::failed(ODataError::composition(format!(
                "{} does not return a collection",
                self.resource
            )));
        }
        let options = with_response_type(options, ResponseType::Entities);
        self.call(params, false, options)
            .and_then(|response| response.entities())
    }
}
