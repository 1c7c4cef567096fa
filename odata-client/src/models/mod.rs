//! Tracked entities: [`Model`] and [`Collection`]
//!
//! Models and collections share their state between handles and live on a
//! single thread. Resources hand out wrapped results through the
//! `*_model` and `*_collection` shortcuts below.

pub mod collection;
pub mod events;
pub mod model;

pub use collection::{AssignOptions, Collection, CollectionItem, CollectionResource, EntryState};
pub use events::{
    AssignBuckets, EventEmitter, EventKind, ModelEvent, ParentLink, Subscription, ValidationErrors,
};
pub use model::{Model, ModelCall, ModelResource, Relation};

use crate::api::{ODataApi, ODataCall};
use crate::error::{ODataError, ODataResult};
use crate::request::RequestOptions;
use crate::resource::{
    ActionResource, EntityResource, EntitySetResource, FunctionResource, NavigationPropertyResource,
    ODataResource,
};
use crate::response::{EntitiesResult, EntityResult};
use futures::FutureExt;
use serde_json::{Map, Value};

impl EntityResource {
    /// Wrap already loaded data
    pub fn model(&self, entity: Map<String, Value>) -> Model {
        Model::with_resource(self.clone(), entity, Default::default())
    }

    pub fn fetch_model(&self, options: RequestOptions) -> ModelCall<Model> {
        let resource = self.clone();
        let call = self.fetch(options);
        async move { Ok(entity_model(resource, call.await?)) }.boxed_local()
    }
}

impl EntitySetResource {
    pub fn collection(&self) -> Collection {
        Collection::new(CollectionResource::EntitySet(self.clone()))
    }

    pub fn fetch_collection(&self, options: RequestOptions) -> ODataResult<ModelCall<Collection>> {
        fetch_into(self.collection(), options)
    }
}

impl NavigationPropertyResource {
    pub fn collection(&self) -> ODataResult<Collection> {
        if !self.is_collection() {
            return Err(ODataError::composition(format!("{} is single valued", self)));
        }
        Ok(Collection::new(CollectionResource::Navigation(self.clone())))
    }

    pub fn fetch_collection(&self, options: RequestOptions) -> ODataResult<ModelCall<Collection>> {
        fetch_into(self.collection()?, options)
    }

    /// Target of a single-valued navigation as a model
    pub fn fetch_model(&self, options: RequestOptions) -> ODataResult<ModelCall<Model>> {
        Ok(self.entity()?.fetch_model(options))
    }
}

impl FunctionResource {
    pub fn call_model(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ModelCall<Option<Model>> {
        returned_model(
            self.api().clone(),
            return_type(self.definition()),
            self.call_entity(params, options),
        )
    }

    pub fn call_collection(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ModelCall<Collection> {
        returned_collection(
            self.api().clone(),
            return_type(self.definition()),
            self.call_entities(params, options),
        )
    }
}

impl ActionResource {
    pub fn call_model(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ModelCall<Option<Model>> {
        returned_model(
            self.api().clone(),
            return_type(self.definition()),
            self.call_entity(params, options),
        )
    }

    pub fn call_collection(
        &self,
        params: &Map<String, Value>,
        options: RequestOptions,
    ) -> ModelCall<Collection> {
        returned_collection(
            self.api().clone(),
            return_type(self.definition()),
            self.call_entities(params, options),
        )
    }
}

fn entity_model(resource: EntityResource, result: EntityResult) -> Model {
    let resource = match &result.annots.type_name {
        Some(type_name) => resource.retype(type_name),
        None => resource,
    };
    Model::with_resource(resource, result.entity.unwrap_or_default(), result.annots)
}

fn fetch_into(
    collection: Collection,
    options: RequestOptions,
) -> ODataResult<ModelCall<Collection>> {
    let call = collection.fetch(options)?;
    Ok(async move {
        call.await?;
        Ok(collection)
    }
    .boxed_local())
}

fn return_type(def: Option<&crate::schema::CallableDef>) -> Option<String> {
    def.and_then(|d| d.return_type.as_ref())
        .map(|f| f.type_name.clone())
}

fn returned_model(
    api: ODataApi,
    type_name: Option<String>,
    call: ODataCall<EntityResult>,
) -> ModelCall<Option<Model>> {
    async move {
        let EntityResult { entity, annots } = call.await?;
        let Some(entity) = entity else {
            return Ok(None);
        };
        let type_name = annots.type_name.clone().or(type_name).unwrap_or_default();
        Ok(Some(Model::from_entity(&api, &type_name, entity, annots)))
    }
    .boxed_local()
}

fn returned_collection(
    api: ODataApi,
    type_name: Option<String>,
    call: ODataCall<EntitiesResult>,
) -> ModelCall<Collection> {
    async move {
        let EntitiesResult {
            entities,
            entity_annots,
            ..
        } = call.await?;
        let collection = match type_name {
            Some(type_name) => Collection::for_type(&api, &type_name),
            None => Collection::build(api, None, None),
        };
        let mut entity_annots = entity_annots.into_iter();
        let items = entities
            .into_iter()
            .map(|entity| CollectionItem::Attrs(entity, entity_annots.next().unwrap_or_default()))
            .collect();
        collection.assign(items, AssignOptions::reset(true));
        Ok(collection)
    }
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, api_with};
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_model_then_save() {
        let transport = MockTransport::new();
        transport.respond_json(
            200,
            json!({"@odata.etag": "W/\"5\"", "UserName": "russellwhyte", "FirstName": "Russell"}),
        );
        let api = api_with(transport.clone());
        let model = api
            .entity_set("People")
            .key("russellwhyte")
            .fetch_model(RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(model.get("FirstName").unwrap(), json!("Russell"));
        assert!(!model.has_changed());

        model.set("FirstName", json!("Russ")).unwrap();
        let call = model.save(false, RequestOptions::new()).unwrap();
        call.await.unwrap();
        let request = &transport.requests()[1];
        assert_eq!(request.headers.get("If-Match"), Some("W/\"5\""));
        let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["FirstName"], json!("Russ"));
        assert_eq!(body["UserName"], json!("russellwhyte"));
    }

    #[tokio::test]
    async fn test_function_wrapped_results() {
        let transport = MockTransport::new();
        transport.respond_json(
            200,
            json!({"value": [{"TripId": "1", "Name": "Honeymoon"}]}),
        );
        transport.respond_json(
            200,
            json!({"AirlineCode": "AA", "Name": "American Airlines"}),
        );
        let api = api_with(transport);
        let person = api.entity_set("People").key("russellwhyte");

        let params = json!({"userName": "ronaldmundy"});
        let trips = person
            .function("GetFriendsTrips")
            .unwrap()
            .call_collection(params.as_object().unwrap(), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips.get(0).unwrap().get("TripId").unwrap(), json!(1));
        assert_eq!(
            trips.get(0).unwrap().entity_resource().unwrap().to_string(),
            "Trips(1)"
        );

        let airline = person
            .function("GetFavoriteAirline")
            .unwrap()
            .call_model(&Map::new(), RequestOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(airline.type_name().as_deref(), Some("Trippin.Airline"));
        assert_eq!(
            airline.entity_resource().unwrap().to_string(),
            "Airlines('AA')"
        );
    }

    #[tokio::test]
    async fn test_navigation_collection_fetch() {
        let transport = MockTransport::new();
        transport.respond_json(200, json!({"value": [{"UserName": "scottketchum"}]}));
        let api = api_with(transport);
        let person = api.entity_set("People").key("russellwhyte");
        let nav = person.navigation("Friends");
        let call = nav.fetch_collection(RequestOptions::new()).unwrap();
        let friends = call.await.unwrap();
        let first = friends.get(0).unwrap();
        assert_eq!(
            first.entity_resource().unwrap().to_string(),
            "People('russellwhyte')/Friends('scottketchum')"
        );
        assert!(person.navigation("BestFriend").collection().is_err());
    }
}
