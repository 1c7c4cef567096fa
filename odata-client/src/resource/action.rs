//! Action calls; parameters always travel in the POST body

use super::{Resource, with_response_type};
use crate::api::{ODataApi, ODataCall};
use crate::error::ODataError;
use crate::path::{PathSegments, SegmentKind};
use crate::query::QueryOptions;
use crate::request::{RequestBody, RequestOptions, ResponseType};
use crate::response::{EntitiesResult, EntityResult, ODataResponse, PropertyResult};
use crate::schema::{CallableDef, serialize_parameters};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ActionResource {
    pub(crate) resource: Resource,
    def: Option<Arc<CallableDef>>,
}

impl PartialEq for ActionResource {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
    }
}

impl ActionResource {
    /// Action import at the service root
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
            .add(SegmentKind::Action, segment_name)
            .set_type_opt(return_type);
        Self {
            resource: Resource::new(api, segments, QueryOptions::new()),
            def,
        }
    }

    pub(crate) fn bound(mut resource: Resource, def: Arc<CallableDef>) -> Self {
        resource
            .segments_mut()
            .add(SegmentKind::Action, def.qualified_name())
            .set_type_opt(def.return_type.as_ref().map(|r| r.type_name.clone()));
        Self {
            resource,
            def: Some(def),
        }
    }

    pub fn definition(&self) -> Option<&CallableDef> {
        self.def.as_deref()
    }

    pub fn returns_collection(&self) -> bool {
        self.def
            .as_ref()
            .and_then(|d| d.return_type.as_ref())
            .is_some_and(|r| r.collection)
    }

    fn body(&self, params: &Map<String, Value>) -> Option<RequestBody> {
        let serialized = match &self.def {
            Some(def) => {
                let options = self.resource.api().parser_options();
                serialize_parameters(&*self.resource.schema(), def, params, &options)
            }
            None => params.clone(),
        };
        Some(RequestBody::Json(Value::Object(serialized)))
    }

    /// POST the action with `params` as the JSON body
    pub fn call(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<ODataResponse> {
        self.resource.post(self.body(params), options)
    }

    pub fn call_property(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<PropertyResult> {
        let options = with_response_type(options, ResponseType::Property);
        self.call(params, options)
            .and_then(|response| response.property())
    }

    pub fn call_entity(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntityResult> {
        let options = with_response_type(options, ResponseType::Entity);
        self.call(params, options)
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
        self.call(params, options)
            .and_then(|response| response.entities())
    }
}
