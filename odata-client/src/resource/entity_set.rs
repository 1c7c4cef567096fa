//! Entity set resource (`People`)

use super::{
    ActionResource, CountResource, EntityResource, FunctionResource, ODataResource, Resource,
    fetch_all_entities, paginate, with_response_type,
};
use crate::api::{ODataApi, ODataCall};
use crate::error::{ODataError, ODataResult};
use crate::path::{EntityKey, PathSegments, SegmentKind};
use crate::query::{QueryOptionName, QueryOptions};
use crate::request::{RequestBody, RequestOptions, ResponseType};
use crate::response::{EntitiesResult, EntityResult};
use crate::schema::CallableKind;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySetResource {
    pub(crate) resource: Resource,
}

impl EntitySetResource {
    /// Entity set by container name; the type comes from the schema
    pub fn factory(api: ODataApi, name: &str) -> Self {
        let type_name = api.schema().find_entity_set(name).map(|s| s.entity_type);
        let mut segments = PathSegments::new();
        segments
            .add(SegmentKind::EntitySet, name)
            .set_type_opt(type_name);
        Self {
            resource: Resource::new(api, segments, QueryOptions::new()),
        }
    }

    /// Address one entity of the set
    pub fn key(&self, key: impl Into<EntityKey>) -> EntityResource {
        let mut resource = self.resource.clone();
        if let Some(handle) = resource.segments_mut().get_mut(SegmentKind::EntitySet) {
            handle.set_key(key);
        }
        resource.query_mut().keep(&[
            QueryOptionName::Select,
            QueryOptionName::Expand,
            QueryOptionName::Format,
            QueryOptionName::Compute,
        ]);
        EntityResource::from_resource(resource, false)
    }

    /// Address the entity whose key fields appear in `attrs`
    pub fn entity(&self, attrs: &Map<String, Value>) -> ODataResult<EntityResource> {
        let type_name = self.type_name().unwrap_or_default();
        let key = self
            .schema()
            .resolve_key(&type_name, attrs)
            .ok_or_else(|| {
                ODataError::missing_key(format!("no key for {} in {:?}", type_name, attrs))
            })?;
        Ok(self.key(key))
    }

    /// Unkeyed entity target, used to create new entities
    pub fn new_entity(&self) -> EntityResource {
        let mut resource = self.resource.clone();
        resource.query_mut().clear();
        EntityResource::from_resource(resource, false)
    }

    /// Restrict the set to a derived type
    pub fn cast(&self, type_name: &str) -> EntitySetResource {
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
        Self { resource }
    }

    pub fn count(&self) -> CountResource {
        CountResource::factory(&self.resource)
    }

    /// Function bound to the collection type
    pub fn function(&self, name: &str) -> ODataResult<FunctionResource> {
        let (resource, def) = self.resource.bind_callable(name, CallableKind::Function)?;
        Ok(FunctionResource::bound(resource, def))
    }

    /// Action bound to the collection type
    pub fn action(&self, name: &str) -> ODataResult<ActionResource> {
        let (resource, def) = self.resource.bind_callable(name, CallableKind::Action)?;
        Ok(ActionResource::bound(resource, def))
    }

    /// One page of entities
    pub fn fetch(&self, options: RequestOptions) -> ODataCall<EntitiesResult> {
        let options = with_response_type(options, ResponseType::Entities);
        self.resource
            .get(options)
            .and_then(|response| response.entities())
    }

    /// First `top` entities
    pub fn fetch_many(&self, top: u64, options: RequestOptions) -> ODataCall<EntitiesResult> {
        self.top(top).fetch(options)
    }

    /// Every page, concatenated
    pub fn fetch_all(&self, options: RequestOptions) -> ODataCall<EntitiesResult> {
        fetch_all_entities(self.resource.clone(), options)
    }

    /// Pages as a stream; dropping it stops the pagination
    pub fn fetch_pages(
        &self,
        options: RequestOptions,
    ) -> BoxStream<'static, ODataResult<EntitiesResult>> {
        let options = with_response_type(options, ResponseType::Entities);
        paginate(self.resource.clone(), options, |response| {
            let page = response.entities()?;
            let annots = page.annots.clone();
            Ok((page, annots))
        })
        .map(|page| page.map(|(page, _)| page))
        .boxed()
    }

    /// POST a new entity
    pub fn create(
        &self,
        attrs: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntityResult> {
        let body = self.serialize(&Value::Object(attrs.clone()));
        let options = with_response_type(options, ResponseType::Entity);
        self.resource
            .post(Some(RequestBody::Json(body)), options)
            .and_then(|response| response.entity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, api_with};
    use crate::transport::Method;
    use serde_json::json;

    #[test]
    fn test_key_keeps_only_entity_options() {
        let api = api_with(MockTransport::new());
        let person = api
            .entity_set("People")
            .select(&["UserName"])
            .top(3)
            .key("russellwhyte");
        assert_eq!(
            person.to_string(),
            "People('russellwhyte')?$select=UserName"
        );
    }

    #[test]
    fn test_entity_resolves_key_from_attributes() {
        let api = api_with(MockTransport::new());
        let attrs = json!({"UserName": "scottketchum", "FirstName": "Scott"});
        let person = api
            .entity_set("People")
            .entity(attrs.as_object().unwrap())
            .unwrap();
        assert_eq!(person.to_string(), "People('scottketchum')");

        let missing = api.entity_set("People").entity(&Map::new());
        assert!(matches!(missing, Err(ODataError::MissingKey(_))));
    }

    #[test]
    fn test_cast_adds_type_segment() {
        let api = api_with(MockTransport::new());
        let employees = api.entity_set("People").cast("Trippin.Employee");
        assert_eq!(employees.to_string(), "People/Trippin.Employee");
        assert_eq!(employees.type_name().as_deref(), Some("Trippin.Employee"));
    }

    #[tokio::test]
    async fn test_fetch_all_follows_next_links() {
        let transport = MockTransport::new();
        transport.respond_json(
            200,
            json!({
                "value": [{"UserName": "a"}, {"UserName": "b"}],
                "@odata.nextLink": "People?%24skip=2"
            }),
        );
        transport.respond_json(
            200,
            json!({"value": [{"UserName": "c"}], "@odata.count": 3}),
        );
        let api = api_with(transport.clone());

        let people = api
            .entity_set("People")
            .top(2)
            .skip(4)
            .fetch_all(RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(people.entities.len(), 3);
        assert_eq!(people.entity_annots.len(), 3);
        assert_eq!(people.annots.count, Some(3));
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].url,
            "https://services.example.com/trippin/People"
        );
        assert!(requests[1].url.ends_with("People?$skip=2"));
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_entity_annotations() {
        let transport = MockTransport::new();
        transport.respond_json(
            200,
            json!({
                "value": [{"@odata.etag": "W/\"1\"", "UserName": "a"}],
                "@odata.nextLink": "People?$skiptoken=a"
            }),
        );
        transport.respond_json(
            200,
            json!({"value": [{"@odata.type": "#Trippin.Employee", "UserName": "b"}]}),
        );
        let api = api_with(transport);

        let people = api
            .entity_set("People")
            .fetch_all(RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(people.entity_annots[0].etag.as_deref(), Some("W/\"1\""));
        assert_eq!(
            people.entity_annots[1].type_name.as_deref(),
            Some("Trippin.Employee")
        );
    }

    #[tokio::test]
    async fn test_create_posts_serialized_body() {
        let transport = MockTransport::new();
        transport.respond_json(201, json!({"UserName": "lewisblack", "Age": "54"}));
        let api = api_with(transport.clone());
        let attrs = json!({"UserName": "lewisblack", "Age": 54});
        let created = api
            .entity_set("People")
            .select(&["UserName"])
            .create(attrs.as_object().unwrap(), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(created.entity.unwrap()["Age"], json!(54));

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request.url,
            "https://services.example.com/trippin/People?$select=UserName"
        );
        let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["UserName"], "lewisblack");
    }

    #[tokio::test]
    async fn test_bound_function_on_collection() {
        let transport = MockTransport::new();
        transport.respond_json(200, json!({"UserName": "a", "Age": "92"}));
        let api = api_with(transport.clone());
        let oldest = api
            .entity_set("People")
            .function("GetOldestPerson")
            .unwrap();
        assert_eq!(oldest.to_string(), "People/Trippin.GetOldestPerson()");

        let result = oldest
            .call_entity(&Map::new(), RequestOptions::new())
            .await
            .unwrap();
        let person = result.entity.unwrap();
        assert_eq!(person["UserName"], json!("a"));
        assert_eq!(person["Age"], json!(92));
        let url = transport.requests()[0].url.clone();
        assert!(url.ends_with("People/Trippin.GetOldestPerson()"));
    }
}
