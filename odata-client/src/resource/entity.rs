//! Single entity resource (`People('russellwhyte')`, `Me`, `People('a')/BestFriend`)

use super::{
    ActionResource, FunctionResource, MediaResource, NavigationPropertyResource, ODataResource,
    PropertyResource, Resource, with_response_type,
};
use crate::api::ODataCall;
use crate::error::{ODataError, ODataResult};
use crate::path::{EntityKey, SegmentKind};
use crate::request::{RequestBody, RequestOptions, ResponseType};
use crate::response::{EntityResult, ODataResponse};
use crate::schema::CallableKind;
use serde_json::{Map, Value};

/// An entity addressed by key, or a single-valued endpoint that needs none
#[derive(Debug, Clone, PartialEq)]
pub struct EntityResource {
    pub(crate) resource: Resource,
    /// Singleton or single-valued navigation
    single: bool,
}

impl EntityResource {
    pub(crate) fn from_resource(resource: Resource, single: bool) -> Self {
        Self { resource, single }
    }

    /// Key of the addressed entity
    pub fn key(&self) -> Option<EntityKey> {
        self.resource.segments().keys().pop().flatten()
    }

    /// Whether the resource addresses one existing entity
    pub fn is_addressable(&self) -> bool {
        self.single || self.key().is_some()
    }

    /// Same path with the last key replaced
    pub fn with_key(&self, key: impl Into<EntityKey>) -> Self {
        let mut resource = self.resource.clone();
        let mut keys = resource.segments().keys();
        if let Some(last) = keys.last_mut() {
            *last = Some(key.into());
        }
        resource.segments_mut().set_keys(keys);
        Self {
            resource,
            single: self.single,
        }
    }

    /// Same path with the last key dropped, the target for creation
    pub fn without_key(&self) -> Self {
        let mut resource = self.resource.clone();
        let mut keys = resource.segments().keys();
        if let Some(last) = keys.last_mut() {
            *last = None;
        }
        resource.segments_mut().set_keys(keys);
        Self {
            resource,
            single: false,
        }
    }

    fn require_key(&self, operation: &str) -> ODataResult<()> {
        if self.is_addressable() {
            Ok(())
        } else {
            Err(ODataError::missing_key(format!("{} on {} needs a key", operation, self.resource)))
        }
    }

    /// Cast to a derived type
    pub fn cast(&self, type_name: &str) -> EntityResource {
        let type_name = self
            .schema()
            .find_structured_type(type_name)
            .map(|t| t.qualified_name())
            .unwrap_or_else(|| type_name.to_string());
        let mut resource = self.resource.clone();
        resource
            .segments_mut()
            .add(SegmentKind::Type, type_name.clone())
            .set_type(type_name);
        Self {
            resource,
            single: self.single,
        }
    }

    /// Replace the type of the last typed segment, used when the service
    /// reports a more derived type than the one addressed
    pub(crate) fn retype(&self, type_name: &str) -> EntityResource {
        if self.type_name().as_deref() == Some(type_name) {
            return self.clone();
        }
        let mut resource = self.resource.clone();
        let last_typed = resource
            .segments()
            .iter()
            .filter(|s| s.type_name().is_some())
            .map(|s| s.kind())
            .last();
        if let Some(kind) = last_typed
            && let Some(handle) = resource.segments_mut().get_mut(kind)
        {
            handle.set_type(type_name);
        }
        Self {
            resource,
            single: self.single,
        }
    }

    pub fn navigation(&self, name: &str) -> NavigationPropertyResource {
        NavigationPropertyResource::factory(&self.resource, name)
    }

    pub fn property(&self, name: &str) -> PropertyResource {
        PropertyResource::factory(&self.resource, name)
    }

    /// Media stream (`$value`) of a media entity
    pub fn media(&self) -> MediaResource {
        MediaResource::factory(&self.resource)
    }

    pub fn function(&self, name: &str) -> ODataResult<FunctionResource> {
        let (resource, def) = self.resource.bind_callable(name, CallableKind::Function)?;
        Ok(FunctionResource::bound(resource, def))
    }

    pub fn action(&self, name: &str) -> ODataResult<ActionResource> {
        let (resource, def) = self.resource.bind_callable(name, CallableKind::Action)?;
        Ok(ActionResource::bound(resource, def))
    }

    fn body(&self, attrs: &Map<String, Value>) -> Option<RequestBody> {
        Some(RequestBody::Json(self.serialize(&Value::Object(attrs.clone()))))
    }

    fn entity_call(call: ODataCall<ODataResponse>) -> ODataCall<EntityResult> {
        call.and_then(|response| response.entity())
    }

    pub fn fetch(&self, options: RequestOptions) -> ODataCall<EntityResult> {
        if let Err(err) = self.require_key("fetch") {
            return ODataCall::failed(err);
        }
        let options = with_response_type(options, ResponseType::Entity);
        Self::entity_call(self.resource.get(options))
    }

    /// POST to the unkeyed target (entity set or collection navigation)
    pub fn create(
        &self,
        attrs: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntityResult> {
        if self.key().is_some() {
            return ODataCall::failed(ODataError::composition(format!(
                "{} already has a key, create needs the collection",
                self.resource
            )));
        }
        let options = with_response_type(options, ResponseType::Entity);
        Self::entity_call(self.resource.post(self.body(attrs), options))
    }

    /// Replace the entity (PUT)
    pub fn update(
        &self,
        attrs: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntityResult> {
        if let Err(err) = self.require_key("update") {
            return ODataCall::failed(err);
        }
        let options = with_response_type(options, ResponseType::Entity);
        Self::entity_call(self.resource.put(self.body(attrs), options))
    }

    /// Change some fields (PATCH)
    pub fn modify(
        &self,
        attrs: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntityResult> {
        if let Err(err) = self.require_key("modify") {
            return ODataCall::failed(err);
        }
        let options = with_response_type(options, ResponseType::Entity);
        Self::entity_call(self.resource.patch(self.body(attrs), options))
    }

    pub fn destroy(&self, options: RequestOptions) -> ODataCall<()> {
        if let Err(err) = self.require_key("destroy") {
            return ODataCall::failed(err);
        }
        let options = with_response_type(options, ResponseType::None);
        self.resource.delete(options).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, api_with};
    use crate::transport::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_requires_key() {
        let api = api_with(MockTransport::new());
        let unkeyed = api.entity_set("People").new_entity();
        let err = unkeyed.fetch(RequestOptions::new()).await.unwrap_err();
        assert!(matches!(err, ODataError::MissingKey(_)));
    }

    #[tokio::test]
    async fn test_modify_sends_if_match() {
        let transport = MockTransport::new();
        transport.respond(204, &[], "");
        let api = api_with(transport.clone());
        let attrs = json!({"FirstName": "Russell"});
        let result = api
            .entity_set("People")
            .key("russellwhyte")
            .modify(
                attrs.as_object().unwrap(),
                RequestOptions::new().etag("W/\"08D\""),
            )
            .await
            .unwrap();
        assert!(result.entity.is_none());

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Patch);
        assert_eq!(request.headers.get("If-Match"), Some("W/\"08D\""));
        assert_eq!(
            request.url,
            "https://services.example.com/trippin/People('russellwhyte')"
        );
    }

    #[tokio::test]
    async fn test_status_error_is_propagated() {
        let transport = MockTransport::new();
        transport.respond_json(404, json!({"error": {"message": "missing"}}));
        let api = api_with(transport);
        let err = api
            .entity_set("People")
            .key("nobody")
            .fetch(RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_navigation_and_property_paths() {
        let api = api_with(MockTransport::new());
        let person = api.entity_set("People").key("russellwhyte");
        let name = person.navigation("Trips").key(0).property("Name");
        assert_eq!(name.to_string(), "People('russellwhyte')/Trips(0)/Name");
        assert_eq!(person.media().to_string(), "People('russellwhyte')/$value");
    }

    #[test]
    fn test_bound_function_casts_to_derived_binding() {
        let api = api_with(MockTransport::new());
        let function = api
            .entity_set("People")
            .key("russellwhyte")
            .function("GetCost")
            .unwrap();
        assert_eq!(
            function.to_string(),
            "People('russellwhyte')/Trippin.Employee/Trippin.GetCost()"
        );
    }

    #[test]
    fn test_bound_action_rebinds_entity_set() {
        let api = api_with(MockTransport::new());
        let action = api
            .entity_set("Airports")
            .key("KSFO")
            .action("ShareTrip")
            .unwrap();
        let path = action.to_string();
        assert!(path.starts_with("People('KSFO')/Trippin.ShareTrip"));
    }

    #[test]
    fn test_with_key_replaces_last_key() {
        let api = api_with(MockTransport::new());
        let trip = api.entity_set("People").key("a").navigation("Trips").key(1);
        assert_eq!(trip.with_key(2).to_string(), "People('a')/Trips(2)");
        assert_eq!(trip.key(), Some(EntityKey::from(1)));
    }
}
