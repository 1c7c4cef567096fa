//! Navigation property resource (`People('a')/Friends`, `People('a')/BestFriend`)

use super::{
    ActionResource, CountResource, EntityResource, FunctionResource, ODataResource,
    PropertyResource, ReferenceResource, Resource, fetch_all_entities, paginate, with_response_type,
};
use crate::api::ODataCall;
use crate::error::{ODataError, ODataResult};
use crate::path::{EntityKey, SegmentKind};
use crate::query::QueryOptionName;
use crate::request::{RequestBody, RequestOptions, ResponseType};
use crate::response::{EntitiesResult, EntityResult};
use crate::schema::CallableKind;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationPropertyResource {
    pub(crate) resource: Resource,
    collection: bool,
}

impl NavigationPropertyResource {
    /// Navigation `name` from the entity addressed by `parent`
    ///
    /// Cardinality and target type come from the parent type's field; an
    /// undeclared navigation is treated as a collection.
    pub fn factory(parent: &Resource, name: &str) -> Self {
        let field = parent
            .type_name()
            .and_then(|t| parent.schema().find_structured_type(&t))
            .and_then(|ty| ty.find_field(name).cloned());
        if field.is_none() {
            log::debug!(
                "navigation {} is not declared on {:?}",
                name,
                parent.type_name()
            );
        }
        let collection = field.as_ref().is_none_or(|f| f.collection);
        let mut resource = parent.clone();
        resource.query_mut().clear();
        resource
            .segments_mut()
            .add(SegmentKind::NavigationProperty, name)
            .set_type_opt(field.map(|f| f.type_name));
        Self {
            resource,
            collection,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }

    /// Member of a collection-valued navigation
    pub fn key(&self, key: impl Into<EntityKey>) -> EntityResource {
        let mut resource = self.resource.clone();
        if let Some(handle) = resource.segments_mut().last_mut() {
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

    /// Member whose key fields appear in `attrs`
    pub fn member(&self, attrs: &Map<String, Value>) -> ODataResult<EntityResource> {
        let type_name = self.type_name().unwrap_or_default();
        let key = self
            .schema()
            .resolve_key(&type_name, attrs)
            .ok_or_else(|| {
                ODataError::missing_key(format!("no key for {} in {:?}", type_name, attrs))
            })?;
        Ok(self.key(key))
    }

    /// The target of a single-valued navigation
    pub fn entity(&self) -> ODataResult<EntityResource> {
        if self.collection {
            return Err(ODataError::composition(format!(
                "{} is collection valued, address a member by key",
                self.resource
            )));
        }
        Ok(EntityResource::from_resource(self.resource.clone(), true))
    }

    /// Unkeyed target for creating members
    pub fn new_entity(&self) -> EntityResource {
        let mut resource = self.resource.clone();
        resource.query_mut().clear();
        EntityResource::from_resource(resource, false)
    }

    /// Relationship links (`$ref`) instead of the related entities
    pub fn reference(&self) -> ReferenceResource {
        ReferenceResource::factory(&self.resource, self.collection)
    }

    pub fn count(&self) -> CountResource {
        CountResource::factory(&self.resource)
    }

    pub fn cast(&self, type_name: &str) -> NavigationPropertyResource {
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
            collection: self.collection,
        }
    }

    /// Chain through a single-valued navigation
    pub fn navigation(&self, name: &str) -> ODataResult<NavigationPropertyResource> {
        Ok(self.entity()?.navigation(name))
    }

    /// Property of the single-valued target
    pub fn property(&self, name: &str) -> ODataResult<PropertyResource> {
        Ok(self.entity()?.property(name))
    }

    pub fn function(&self, name: &str) -> ODataResult<FunctionResource> {
        let (resource, def) = self.resource.bind_callable(name, CallableKind::Function)?;
        Ok(FunctionResource::bound(resource, def))
    }

    pub fn action(&self, name: &str) -> ODataResult<ActionResource> {
        let (resource, def) = self.resource.bind_callable(name, CallableKind::Action)?;
        Ok(ActionResource::bound(resource, def))
    }

    /// Related entities of a collection-valued navigation, one page
    pub fn fetch_entities(&self, options: RequestOptions) -> ODataCall<EntitiesResult> {
        let options = with_response_type(options, ResponseType::Entities);
        self.resource
            .get(options)
            .and_then(|response| response.entities())
    }

    /// Related entity of a single-valued navigation
    pub fn fetch_entity(&self, options: RequestOptions) -> ODataCall<EntityResult> {
        match self.entity() {
            Ok(entity) => entity.fetch(options),
            Err(err) => ODataCall::failed(err),
        }
    }

    pub fn fetch_many(&self, top: u64, options: RequestOptions) -> ODataCall<EntitiesResult> {
        self.top(top).fetch_entities(options)
    }

    /// Every page of related entities, concatenated
    pub fn fetch_all(&self, options: RequestOptions) -> ODataCall<EntitiesResult> {
        fetch_all_entities(self.resource.clone(), options)
    }

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

    /// POST a new related entity (deep insert into the navigation)
    pub fn create(
        &self,
        attrs: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntityResult> {
        if !self.collection {
            return ODataCall::failed(ODataError::composition(format!(
                "cannot create into single-valued {}",
                self.resource
            )));
        }
        let body = self.serialize(&Value::Object(attrs.clone()));
        let options = with_response_type(options, ResponseType::Entity);
        self.resource
            .post(Some(RequestBody::Json(body)), options)
            .and_then(|response| response.entity())
    }

    pub fn update(
        &self,
        attrs: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntityResult> {
        match self.entity() {
            Ok(entity) => entity.update(attrs, options),
            Err(err) => ODataCall::failed(err),
        }
    }

    pub fn modify(
        &self,
        attrs: &Map<String, Value>,
        options: RequestOptions,
    ) -> ODataCall<EntityResult> {
        match self.entity() {
            Ok(entity) => entity.modify(attrs, options),
            Err(err) => ODataCall::failed(err),
        }
    }

    pub fn destroy(&self, options: RequestOptions) -> ODataCall<()> {
        match self.entity() {
            Ok(entity) => entity.destroy(options),
            Err(err) => ODataCall::failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, api_with};
    use serde_json::json;

    #[test]
    fn test_cardinality_from_schema() {
        let api = api_with(MockTransport::new());
        let person = api.entity_set("People").key("a");
        assert!(person.navigation("Friends").is_collection());
        let best = person.navigation("BestFriend");
        assert!(!best.is_collection());
        assert_eq!(best.type_name().as_deref(), Some("Trippin.Person"));
        assert_eq!(
            best.navigation("Trips").unwrap().to_string(),
            "People('a')/BestFriend/Trips"
        );
        assert!(person.navigation("Friends").entity().is_err());
    }

    #[test]
    fn test_parent_query_does_not_leak() {
        let api = api_with(MockTransport::new());
        let trips = api
            .entity_set("People")
            .key("a")
            .select(&["UserName"])
            .navigation("Trips")
            .filter("Budget gt 1000");
        assert_eq!(
            trips.to_string(),
            "People('a')/Trips?$filter=Budget gt 1000"
        );
    }

    #[tokio::test]
    async fn test_fetch_entities_uses_target_type() {
        let transport = MockTransport::new();
        transport.respond_json(200, json!({"value": [{"TripId": 0, "Budget": "3000"}]}));
        let api = api_with(transport);
        let trips = api
            .entity_set("People")
            .key("a")
            .navigation("Trips")
            .fetch_entities(RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(trips.entities[0]["Budget"], json!(3000.0));
    }

    #[tokio::test]
    async fn test_single_valued_create_is_rejected() {
        let api = api_with(MockTransport::new());
        let err = api
            .entity_set("People")
            .key("a")
            .navigation("BestFriend")
            .create(&Map::new(), RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ODataError::Composition(_)));
    }
}
