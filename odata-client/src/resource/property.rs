//! Structural property resource (`People('a')/FirstName`, `People('a')/Emails`)

use super::{CountResource, ODataResource, Resource, ValueResource, fetch_all, with_response_type};
use crate::api::ODataCall;
use crate::error::ODataError;
use crate::path::SegmentKind;
use crate::request::{RequestBody, RequestOptions, ResponseType};
use crate::response::{CollectionAnnotations, PropertyResult};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyResource {
    pub(crate) resource: Resource,
    collection: bool,
}

impl PropertyResource {
    pub fn factory(parent: &Resource, name: &str) -> Self {
        let field = parent
            .type_name()
            .and_then(|t| parent.schema().find_structured_type(&t))
            .and_then(|ty| ty.find_field(name).cloned());
        let collection = field.as_ref().is_some_and(|f| f.collection);
        let mut resource = parent.clone();
        resource.query_mut().clear();
        resource
            .segments_mut()
            .add(SegmentKind::Property, name)
            .set_type_opt(field.map(|f| f.type_name));
        Self {
            resource,
            collection,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }

    /// Nested property of a complex value
    pub fn property(&self, name: &str) -> PropertyResource {
        PropertyResource::factory(&self.resource, name)
    }

    /// Raw value (`$value`) of a primitive property
    pub fn value(&self) -> ValueResource {
        ValueResource::factory(&self.resource)
    }

    pub fn count(&self) -> CountResource {
        CountResource::factory(&self.resource)
    }

    pub fn fetch(&self, options: RequestOptions) -> ODataCall<PropertyResult> {
        let options = with_response_type(options, ResponseType::Property);
        self.resource
            .get(options)
            .and_then(|response| response.property())
    }

    /// Every page of a collection-valued property
    pub fn fetch_all(
        &self,
        options: RequestOptions,
    ) -> ODataCall<(Vec<Value>, CollectionAnnotations)> {
        if !self.collection {
            return ODataCall::failed(ODataError::composition(format!(
                "{} is not collection valued",
                self.resource
            )));
        }
        let options = with_response_type(options, ResponseType::Property);
        fetch_all(self.resource.clone(), options, |response| {
            let page = response.property()?;
            let values = match page.value {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            Ok((values, page.annots))
        })
    }

    /// Replace the value; primitives travel wrapped as `{"value": ...}`
    pub fn update(&self, value: &Value, options: RequestOptions) -> ODataCall<PropertyResult> {
        let body = match self.serialize(value) {
            Value::Object(map) => Value::Object(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Value::Object(map)
            }
        };
        let options = with_response_type(options, ResponseType::Property);
        self.resource
            .put(Some(RequestBody::Json(body)), options)
            .and_then(|response| response.property())
    }

    /// Set the property to null (DELETE)
    pub fn destroy(&self, options: RequestOptions) -> ODataCall<()> {
        let options = with_response_type(options, ResponseType::None);
        self.resource.delete(options).map(|_| ())
    }
}
