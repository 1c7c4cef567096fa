//! Relationship links (`People('a')/Friends/$ref`)

use super::{EntityResource, ODataResource, Resource, with_response_type};
use crate::api::ODataCall;
use crate::constants::{ID, ODATA_ID, REF};
use crate::error::{ODataError, ODataResult};
use crate::path::SegmentKind;
use crate::request::{RequestBody, RequestOptions, ResponseType};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceResource {
    pub(crate) resource: Resource,
    collection: bool,
}

impl ReferenceResource {
    pub fn factory(parent: &Resource, collection: bool) -> Self {
        let mut resource = parent.clone();
        resource.query_mut().clear();
        resource.segments_mut().add(SegmentKind::Reference, REF);
        Self {
            resource,
            collection,
        }
    }

    fn target_body(target: &EntityResource) -> ODataResult<Option<RequestBody>> {
        if !target.is_addressable() {
            return Err(ODataError::missing_key(format!("reference target {} has no key", target)));
        }
        let mut body = Map::new();
        body.insert(
            ODATA_ID.to_string(),
            Value::String(target.endpoint_url(false)),
        );
        Ok(Some(RequestBody::Json(Value::Object(body))))
    }

    /// Link `target` into a collection-valued navigation (POST)
    pub fn add(&self, target: &EntityResource, options: RequestOptions) -> ODataCall<()> {
        if !self.collection {
            return ODataCall::failed(ODataError::composition(format!(
                "{} is single valued, use set",
                self.resource
            )));
        }
        let body = match Self::target_body(target) {
            Ok(body) => body,
            Err(err) => return ODataCall::failed(err),
        };
        let options = with_response_type(options, ResponseType::None);
        self.resource.post(body, options).map(|_| ())
    }

    /// Point a single-valued navigation at `target` (PUT)
    pub fn set(&self, target: &EntityResource, options: RequestOptions) -> ODataCall<()> {
        if self.collection {
            return ODataCall::failed(ODataError::composition(format!(
                "{} is collection valued, use add",
                self.resource
            )));
        }
        let body = match Self::target_body(target) {
            Ok(body) => body,
            Err(err) => return ODataCall::failed(err),
        };
        let options = with_response_type(options, ResponseType::None);
        self.resource.put(body, options).map(|_| ())
    }

    /// Remove a link; collections name the member through `$id`
    pub fn remove(
        &self,
        target: Option<&EntityResource>,
        options: RequestOptions,
    ) -> ODataCall<()> {
        let options = match (self.collection, target) {
            (true, Some(target)) => options.param(ID, target.endpoint_url(false)),
            (true, None) => {
                return ODataCall::failed(ODataError::composition(format!(
                    "removing from {} needs a target",
                    self.resource
                )));
            }
            (false, _) => options,
        };
        let options = with_response_type(options, ResponseType::None);
        self.resource.delete(options).map(|_| ())
    }

    /// Clear a single-valued navigation
    pub fn unset(&self, options: RequestOptions) -> ODataCall<()> {
        self.remove(None, options)
    }
}
