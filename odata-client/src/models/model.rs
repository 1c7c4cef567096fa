//! Entity wrapper with change tracking, lazy relations and persistence

use super::collection::{AssignOptions, Collection, CollectionItem, CollectionResource};
use super::events::{EventEmitter, EventKind, ModelEvent, ParentLink, ValidationErrors};
use crate::api::ODataApi;
use crate::constants::CID_FIELD;
use crate::error::{ODataError, ODataResult};
use crate::path::EntityKey;
use crate::request::RequestOptions;
use crate::resource::{EntityResource, ODataResource, PropertyResource, ReferenceResource};
use crate::response::{EntityAnnotations, EntityResult, is_annotation};
use crate::schema::{FieldDef, Schema, StructuredType};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// Future returned by model and collection persistence
///
/// Models live on one thread, so these futures are not `Send`.
pub type ModelCall<T = ()> = LocalBoxFuture<'static, ODataResult<T>>;

/// Where a model reads and writes its data
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResource {
    Entity(EntityResource),
    /// Complex value reached through a property path
    Property(PropertyResource),
}

impl ModelResource {
    fn type_name(&self) -> Option<String> {
        match self {
            ModelResource::Entity(r) => r.type_name(),
            ModelResource::Property(r) => r.type_name(),
        }
    }

    fn property(&self, name: &str) -> PropertyResource {
        match self {
            ModelResource::Entity(r) => r.property(name),
            ModelResource::Property(r) => r.property(name),
        }
    }
}

/// Materialized complex or navigation field
#[derive(Debug, Clone)]
pub enum Relation {
    Model(Model),
    Collection(Collection),
}

impl Relation {
    pub fn to_value(&self) -> Value {
        match self {
            Relation::Model(m) => Value::Object(m.to_entity()),
            Relation::Collection(c) => {
                Value::Array(c.to_entities().into_iter().map(Value::Object).collect())
            }
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Relation::Model(m) => Some(m),
            Relation::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Relation::Collection(c) => Some(c),
            Relation::Model(_) => None,
        }
    }
}

struct RelationEntry {
    relation: Relation,
    navigation: bool,
    _link: ParentLink,
}

struct ModelInner {
    api: ODataApi,
    type_name: Option<String>,
    entity: Map<String, Value>,
    original: Map<String, Value>,
    annots: EntityAnnotations,
    resource: Option<ModelResource>,
    cid: String,
    relations: BTreeMap<String, RelationEntry>,
}

/// One entity with change tracking
///
/// Handles are cheap clones sharing the same state. A model is not
/// `Send`; keep it on the task that owns it.
#[derive(Clone)]
pub struct Model {
    inner: Rc<RefCell<ModelInner>>,
    events: EventEmitter,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Model")
            .field("type_name", &inner.type_name)
            .field("cid", &inner.cid)
            .field("entity", &inner.entity)
            .finish()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Model {
    /// New, unsaved model; schema defaults fill missing fields
    pub fn new(api: &ODataApi, type_name: &str, attrs: Map<String, Value>) -> Self {
        let mut entity = Map::new();
        if let Some(ty) = api.schema().find_structured_type(type_name) {
            for field in ty.all_fields() {
                if let Some(default) = &field.default {
                    entity.insert(field.name.clone(), default.clone());
                }
            }
        }
        entity.extend(attrs);
        let resource = resolve_resource(api, type_name, &entity).map(ModelResource::Entity);
        Self::build(
            api.clone(),
            Some(type_name.to_string()),
            resource,
            entity,
            EntityAnnotations::default(),
            false,
        )
    }

    /// Model for data read from the service, bound to its entity set
    pub fn from_entity(
        api: &ODataApi,
        type_name: &str,
        entity: Map<String, Value>,
        annots: EntityAnnotations,
    ) -> Self {
        let type_name = annots
            .type_name
            .clone()
            .unwrap_or_else(|| type_name.to_string());
        let resource = resolve_resource(api, &type_name, &entity).map(ModelResource::Entity);
        Self::build(api.clone(), Some(type_name), resource, entity, annots, true)
    }

    /// Model for a typed value
    pub fn from_typed<T: Serialize>(
        api: &ODataApi,
        type_name: &str,
        value: &T,
    ) -> ODataResult<Self> {
        match serde_json::to_value(value)? {
            Value::Object(attrs) => Ok(Self::new(api, type_name, attrs)),
            other => Err(ODataError::composition(format!("{} is not an entity", other))),
        }
    }

    /// Model bound to an explicit resource
    pub fn with_resource(
        resource: EntityResource,
        entity: Map<String, Value>,
        annots: EntityAnnotations,
    ) -> Self {
        let api = resource.api().clone();
        let type_name = annots.type_name.clone().or_else(|| resource.type_name());
        Self::build(
            api,
            type_name,
            Some(ModelResource::Entity(resource)),
            entity,
            annots,
            true,
        )
    }

    pub(crate) fn build(
        api: ODataApi,
        type_name: Option<String>,
        resource: Option<ModelResource>,
        mut entity: Map<String, Value>,
        annots: EntityAnnotations,
        synced: bool,
    ) -> Self {
        let cid = match entity.remove(CID_FIELD) {
            Some(Value::String(cid)) => cid,
            _ => Uuid::new_v4().to_string(),
        };
        entity.retain(|k, _| !is_annotation(k));
        let original = if synced { entity.clone() } else { Map::new() };
        Self {
            inner: Rc::new(RefCell::new(ModelInner {
                api,
                type_name,
                entity,
                original,
                annots,
                resource,
                cid,
                relations: BTreeMap::new(),
            })),
            events: EventEmitter::new(),
        }
    }

    pub fn api(&self) -> ODataApi {
        self.inner.borrow().api.clone()
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn type_name(&self) -> Option<String> {
        self.inner.borrow().type_name.clone()
    }

    /// Client correlation id, stable for the life of the model
    pub fn cid(&self) -> String {
        self.inner.borrow().cid.clone()
    }

    pub fn annotations(&self) -> EntityAnnotations {
        self.inner.borrow().annots.clone()
    }

    pub fn resource(&self) -> Option<ModelResource> {
        self.inner.borrow().resource.clone()
    }

    pub fn entity_resource(&self) -> Option<EntityResource> {
        match self.resource() {
            Some(ModelResource::Entity(r)) => Some(r),
            _ => None,
        }
    }

    /// Whether both handles point at the same model
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address of the shared state, stable while any handle lives
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    fn schema(&self) -> Arc<dyn Schema> {
        self.inner.borrow().api.schema()
    }

    fn structured_type(&self) -> Option<Arc<StructuredType>> {
        let type_name = self.type_name()?;
        self.schema().find_structured_type(&type_name)
    }

    fn field(&self, name: &str) -> Option<FieldDef> {
        self.structured_type()?.find_field(name).cloned()
    }

    fn is_complex(&self, field: &FieldDef) -> bool {
        !field.navigation
            && self
                .schema()
                .find_structured_type(&field.type_name)
                .is_some_and(|t| t.is_complex)
    }

    /// Key resolved from the current data
    pub fn key(&self) -> Option<EntityKey> {
        let type_name = self.type_name()?;
        self.schema().resolve_key(&type_name, &self.to_entity())
    }

    /// No key yet and not a singleton
    pub fn is_new(&self) -> bool {
        self.key().is_none() && !self.entity_resource().is_some_and(|r| r.is_singleton())
    }

    /// Field value; complex and navigation fields reflect their materialized relation
    pub fn get(&self, name: &str) -> ODataResult<Value> {
        if self.field(name).is_some_and(|f| f.navigation) && self.is_new() {
            return Err(ODataError::composition(format!(
                "can't read navigation {} of an unsaved model",
                name
            )));
        }
        let inner = self.inner.borrow();
        if let Some(entry) = inner.relations.get(name) {
            return Ok(entry.relation.to_value());
        }
        Ok(inner.entity.get(name).cloned().unwrap_or(Value::Null))
    }

    /// Deserialize the current data into `T`
    pub fn get_typed<T: DeserializeOwned>(&self) -> ODataResult<T> {
        Ok(serde_json::from_value(Value::Object(self.to_entity()))?)
    }

    /// Write one field
    ///
    /// Navigation fields need a saved model and a keyed target; collection
    /// navigations are changed through [`Collection`] instead. Writing a key
    /// field re-keys the resource.
    pub fn set(&self, name: &str, value: Value) -> ODataResult<()> {
        let field = self.field(name);
        if let Some(field) = field.as_ref().filter(|f| f.navigation) {
            if self.is_new() {
                return Err(ODataError::composition(format!(
                    "can't set navigation {} of an unsaved model",
                    name
                )));
            }
            if field.collection {
                return Err(ODataError::composition(format!(
                    "{} is a collection navigation, add to it instead",
                    name
                )));
            }
            if let Value::Object(attrs) = &value
                && self.schema().resolve_key(&field.type_name, attrs).is_none()
            {
                return Err(ODataError::missing_key(format!(
                    "can't set {} to an entity without key",
                    name
                )));
            }
        }

        let previous = self.get(name).ok();
        if previous.as_ref() == Some(&value) {
            return Ok(());
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.relations.remove(name);
            inner.entity.insert(name.to_string(), value.clone());
        }
        if self.is_key_field(name) {
            self.rekey();
        }
        self.events.emit(&ModelEvent::change(name, value, previous));
        Ok(())
    }

    fn is_key_field(&self, name: &str) -> bool {
        self.structured_type().is_some_and(|t| t.is_key(name))
    }

    /// Merge attributes; existing complex relations merge in place
    pub fn assign(&self, attrs: &Map<String, Value>, silent: bool) {
        let mut events = Vec::new();
        let mut rekey = false;
        for (name, value) in attrs {
            if name == CID_FIELD {
                if let Value::String(cid) = value {
                    self.inner.borrow_mut().cid = cid.clone();
                }
                continue;
            }
            if is_annotation(name) {
                continue;
            }
            let relation = self
                .inner
                .borrow()
                .relations
                .get(name)
                .map(|e| e.relation.clone());
            match (relation, value) {
                (Some(Relation::Model(child)), Value::Object(child_attrs)) => {
                    child.assign(child_attrs, silent);
                }
                (Some(Relation::Collection(child)), Value::Array(items)) => {
                    let items = items
                        .iter()
                        .filter_map(|v| v.as_object().cloned())
                        .map(CollectionItem::from)
                        .collect();
                    child.assign(items, AssignOptions::reset(silent));
                }
                (relation, value) => {
                    let previous = match relation {
                        Some(r) => Some(r.to_value()),
                        None => self.inner.borrow().entity.get(name).cloned(),
                    };
                    if previous.as_ref() == Some(value) {
                        continue;
                    }
                    {
                        let mut inner = self.inner.borrow_mut();
                        inner.relations.remove(name);
                        inner.entity.insert(name.clone(), value.clone());
                    }
                    rekey |= self.is_key_field(name);
                    events.push(ModelEvent::change(name.clone(), value.clone(), previous));
                }
            }
        }
        if rekey {
            self.rekey();
        }
        if !silent {
            for event in &events {
                self.events.emit(event);
            }
        }
    }

    fn rekey(&self) {
        let Some(key) = self.key() else { return };
        let resource = match self.resource() {
            Some(ModelResource::Entity(r)) if !r.is_singleton() => r.with_key(key),
            _ => return,
        };
        self.set_resource(ModelResource::Entity(resource));
    }

    fn set_resource(&self, resource: ModelResource) {
        let children: Vec<(String, Relation, bool)> = {
            let mut inner = self.inner.borrow_mut();
            inner.resource = Some(resource.clone());
            inner
                .relations
                .iter()
                .map(|(name, e)| (name.clone(), e.relation.clone(), e.navigation))
                .collect()
        };
        for (name, relation, navigation) in children {
            if navigation {
                self.inner.borrow_mut().relations.remove(&name);
                continue;
            }
            let property = resource.property(&name);
            match relation {
                Relation::Model(m) => {
                    m.inner.borrow_mut().resource = Some(ModelResource::Property(property))
                }
                Relation::Collection(c) => c.attach(CollectionResource::Property(property)),
            }
        }
    }

    /// Bind to another resource of the same or a derived type
    pub fn attach(&self, resource: EntityResource) -> ODataResult<()> {
        if let (Some(current), Some(next)) = (
            self.resource().and_then(|r| r.type_name()),
            resource.type_name(),
        ) && current != next
            && !self.schema().is_sub_type_of(&next, &current)
        {
            return Err(ODataError::composition(format!("can't reattach {} to {}", next, current)));
        }
        if let Some(type_name) = resource.type_name() {
            self.inner.borrow_mut().type_name = Some(type_name);
        }
        self.set_resource(ModelResource::Entity(resource));
        Ok(())
    }

    /// Complex or navigation field as a model or collection, built on first use
    pub fn relation(&self, name: &str) -> ODataResult<Relation> {
        if let Some(entry) = self.inner.borrow().relations.get(name) {
            return Ok(entry.relation.clone());
        }
        let field = self
            .field(name)
            .ok_or_else(|| ODataError::composition(format!("unknown field {}", name)))?;
        if !field.navigation && !self.is_complex(&field) {
            return Err(ODataError::composition(format!("{} is not a relation", name)));
        }
        if field.navigation && self.is_new() {
            return Err(ODataError::composition(format!(
                "can't read navigation {} of an unsaved model",
                name
            )));
        }

        let api = self.api();
        let value = self
            .inner
            .borrow()
            .entity
            .get(name)
            .cloned()
            .unwrap_or(Value::Null);
        let relation = if field.navigation {
            let parent = self.entity_resource().ok_or_else(|| {
                ODataError::composition(format!("{} needs an entity resource", name))
            })?;
            let navigation = parent.navigation(name);
            if field.collection {
                let collection = Collection::build(
                    api,
                    Some(field.type_name.clone()),
                    Some(CollectionResource::Navigation(navigation)),
                );
                collection.assign(objects(&value), AssignOptions::reset(true));
                Relation::Collection(collection)
            } else {
                let entity = value.as_object().cloned().unwrap_or_default();
                let resource = navigation.entity()?;
                Relation::Model(Model::build(
                    api,
                    Some(field.type_name.clone()),
                    Some(ModelResource::Entity(resource)),
                    entity,
                    EntityAnnotations::default(),
                    true,
                ))
            }
        } else {
            let resource = self.resource().map(|r| r.property(name));
            if field.collection {
                let collection = Collection::build(
                    api,
                    Some(field.type_name.clone()),
                    resource.map(CollectionResource::Property),
                );
                collection.assign(objects(&value), AssignOptions::reset(true));
                Relation::Collection(collection)
            } else {
                Relation::Model(Model::build(
                    api,
                    Some(field.type_name.clone()),
                    resource.map(ModelResource::Property),
                    value.as_object().cloned().unwrap_or_default(),
                    EntityAnnotations::default(),
                    true,
                ))
            }
        };

        let emitter = match &relation {
            Relation::Model(m) => m.events.clone(),
            Relation::Collection(c) => c.events().clone(),
        };
        let link = ParentLink::bubble(&emitter, &self.events, name);
        self.inner.borrow_mut().relations.insert(
            name.to_string(),
            RelationEntry {
                relation: relation.clone(),
                navigation: field.navigation,
                _link: link,
            },
        );
        Ok(relation)
    }

    pub fn complex(&self, name: &str) -> ODataResult<Relation> {
        if self.field(name).is_some_and(|f| f.navigation) {
            return Err(ODataError::composition(format!("{} is a navigation", name)));
        }
        self.relation(name)
    }

    pub fn navigation(&self, name: &str) -> ODataResult<Relation> {
        if !self.field(name).is_some_and(|f| f.navigation) {
            return Err(ODataError::composition(format!("{} is not a navigation", name)));
        }
        self.relation(name)
    }

    /// Current data with materialized relations merged in
    pub fn to_entity(&self) -> Map<String, Value> {
        let inner = self.inner.borrow();
        let mut entity = inner.entity.clone();
        for (name, entry) in &inner.relations {
            entity.insert(name.clone(), entry.relation.to_value());
        }
        entity
    }

    /// Data sent to the service: everything but navigation fields
    fn payload(&self) -> Map<String, Value> {
        let mut entity = self.to_entity();
        if let Some(ty) = self.structured_type() {
            for field in ty.all_fields() {
                if field.navigation {
                    entity.remove(&field.name);
                }
            }
        }
        entity
    }

    /// Fields that differ from the last synced state
    pub fn changes(&self) -> Map<String, Value> {
        let original = self.inner.borrow().original.clone();
        self.payload()
            .into_iter()
            .filter(|(name, value)| original.get(name) != Some(value))
            .collect()
    }

    pub fn has_changed(&self) -> bool {
        !self.changes().is_empty()
    }

    /// Drop local changes
    pub fn reset(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.entity = inner.original.clone();
            inner.relations.clear();
        }
        self.events.emit(&ModelEvent::new(EventKind::Reset));
    }

    /// Independent copy sharing resource, annotations and cid
    pub fn clone_model(&self) -> Model {
        let entity = self.to_entity();
        let inner = self.inner.borrow();
        let copy = Model::build(
            inner.api.clone(),
            inner.type_name.clone(),
            inner.resource.clone(),
            entity,
            inner.annots.clone(),
            false,
        );
        {
            let mut copy_inner = copy.inner.borrow_mut();
            copy_inner.original = inner.original.clone();
            copy_inner.cid = inner.cid.clone();
        }
        copy
    }

    /// Field errors; complex fields report under dotted keys
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        let Some(ty) = self.structured_type() else {
            return errors;
        };
        let entity = self.to_entity();
        for field in ty.all_fields().into_iter().filter(|f| !f.navigation) {
            let value = entity.get(&field.name).unwrap_or(&Value::Null);
            if !field.nullable && value.is_null() {
                errors
                    .entry(field.name.clone())
                    .or_default()
                    .push("required".into());
            }
            if let (Some(max), Value::String(s)) = (field.max_length, value)
                && s.chars().count() > max
            {
                errors
                    .entry(field.name.clone())
                    .or_default()
                    .push("maxlength".into());
            }
            if self.is_complex(field) && !value.is_null() {
                match self.relation(&field.name) {
                    Ok(Relation::Model(child)) => {
                        for (key, messages) in child.validate() {
                            errors.insert(format!("{}.{}", field.name, key), messages);
                        }
                    }
                    Ok(Relation::Collection(child)) => {
                        for (index, model) in child.models().iter().enumerate() {
                            for (key, messages) in model.validate() {
                                let path = format!("{}[{}].{}", field.name, index, key);
                                errors.insert(path, messages);
                            }
                        }
                    }
                    Err(_) => {}
                }
            }
        }
        errors
    }

    /// Validate, emitting [`EventKind::Invalid`] on failure
    pub fn is_valid(&self) -> bool {
        let errors = self.validate();
        if errors.is_empty() {
            return true;
        }
        self.events.emit(&ModelEvent::invalid(errors));
        false
    }

    fn addressable(&self, operation: &str) -> ODataResult<EntityResource> {
        match self.entity_resource() {
            Some(r) if r.is_addressable() => Ok(r),
            Some(r) => Err(ODataError::missing_key(format!("{} on {} needs a key", operation, r))),
            None => Err(ODataError::composition(format!("{} needs an entity resource", operation))),
        }
    }

    fn etag_options(&self, options: RequestOptions) -> RequestOptions {
        if options.etag.is_some() {
            return options;
        }
        let etag = self.inner.borrow().annots.etag.clone();
        options.etag_opt(etag)
    }

    /// Re-read data and annotations from a response
    pub(crate) fn sync(&self, result: EntityResult, sent: Map<String, Value>) {
        let EntityResult { entity, annots } = result;
        let entity = entity.unwrap_or(sent);

        if let Some(type_name) = annots.type_name.clone()
            && self.type_name().as_deref() != Some(type_name.as_str())
        {
            if let Some(ModelResource::Entity(resource)) = self.resource() {
                let resource = ModelResource::Entity(resource.retype(&type_name));
                self.inner.borrow_mut().resource = Some(resource);
            }
            self.inner.borrow_mut().type_name = Some(type_name);
        }
        {
            let mut inner = self.inner.borrow_mut();
            let etag = annots.etag.clone().or_else(|| inner.annots.etag.clone());
            inner.annots = annots;
            inner.annots.etag = etag;
        }
        self.assign(&entity, false);
        let synced = self.to_entity();
        self.inner.borrow_mut().original = synced;
        self.rekey();
        self.events.emit(&ModelEvent::new(EventKind::Sync));
    }

    fn request_event(&self) {
        self.events.emit(&ModelEvent::new(EventKind::Request));
    }

    pub fn fetch(&self, options: RequestOptions) -> ODataResult<ModelCall> {
        let model = self.clone();
        match self.resource() {
            Some(ModelResource::Entity(_)) => {
                let call = self.addressable("fetch")?.fetch(options);
                self.request_event();
                Ok(async move {
                    let result = call.await?;
                    model.sync(result, Map::new());
                    Ok(())
                }
                .boxed_local())
            }
            Some(ModelResource::Property(resource)) => {
                let call = resource.fetch(options);
                self.request_event();
                Ok(async move {
                    let result = call.await?;
                    let entity = result.value.and_then(|v| v.as_object().cloned());
                    model.sync(
                        EntityResult {
                            entity,
                            annots: EntityAnnotations::default(),
                        },
                        Map::new(),
                    );
                    Ok(())
                }
                .boxed_local())
            }
            None => Err(ODataError::composition("fetch needs a resource")),
        }
    }

    /// POST the model to its collection
    pub fn create(&self, options: RequestOptions) -> ODataResult<ModelCall> {
        let resource = self
            .entity_resource()
            .ok_or_else(|| ODataError::composition("create needs an entity resource"))?;
        let attrs = self.payload();
        let call = resource.without_key().create(&attrs, options);
        self.request_event();
        let model = self.clone();
        Ok(async move {
            let result = call.await?;
            model.sync(result, attrs);
            Ok(())
        }
        .boxed_local())
    }

    /// Replace the entity (PUT), guarded by the model etag
    pub fn update(&self, options: RequestOptions) -> ODataResult<ModelCall> {
        let resource = self.addressable("update")?;
        let attrs = self.payload();
        let call = resource.update(&attrs, self.etag_options(options));
        self.request_event();
        let model = self.clone();
        Ok(async move {
            let result = call.await?;
            model.sync(result, attrs);
            Ok(())
        }
        .boxed_local())
    }

    /// Send only changed fields (PATCH)
    pub fn modify(&self, options: RequestOptions) -> ODataResult<ModelCall> {
        let resource = self.addressable("modify")?;
        let changes = self.changes();
        if changes.is_empty() {
            return Ok(async { Ok(()) }.boxed_local());
        }
        let call = resource.modify(&changes, self.etag_options(options));
        self.request_event();
        let model = self.clone();
        let sent = self.to_entity();
        Ok(async move {
            let result = call.await?;
            model.sync(result, sent);
            Ok(())
        }
        .boxed_local())
    }

    /// Create when new, otherwise update (or modify when `patch`)
    pub fn save(&self, patch: bool, options: RequestOptions) -> ODataResult<ModelCall> {
        if self.is_new() {
            self.create(options)
        } else if patch {
            self.modify(options)
        } else {
            self.update(options)
        }
    }

    /// DELETE the entity, then emit [`EventKind::Destroy`]
    pub fn destroy(&self, options: RequestOptions) -> ODataResult<ModelCall> {
        let resource = self.addressable("destroy")?;
        let call = resource.destroy(self.etag_options(options));
        self.request_event();
        let model = self.clone();
        Ok(async move {
            call.await?;
            model.events.emit(&ModelEvent::new(EventKind::Destroy));
            Ok(())
        }
        .boxed_local())
    }

    /// `$ref` of a navigation field
    pub fn get_reference(&self, name: &str) -> ODataResult<ReferenceResource> {
        if !self.field(name).is_some_and(|f| f.navigation) {
            return Err(ODataError::composition(format!("{} is not a navigation", name)));
        }
        Ok(self.addressable("reference")?.navigation(name).reference())
    }

    /// Point a single-valued navigation at `target`, or clear it
    pub fn set_reference(
        &self,
        name: &str,
        target: Option<&Model>,
        options: RequestOptions,
    ) -> ODataResult<ModelCall> {
        let field = self
            .field(name)
            .filter(|f| f.navigation)
            .ok_or_else(|| ODataError::composition(format!("{} is not a navigation", name)))?;
        if field.collection {
            return Err(ODataError::composition(format!(
                "{} is a collection, add to it instead",
                name
            )));
        }
        let reference = self.get_reference(name)?;
        let (call, value) = match target {
            Some(target) => {
                let resource = target.addressable("reference target")?;
                (reference.set(&resource, options), Value::Object(target.to_entity()))
            }
            None => (reference.unset(options), Value::Null),
        };
        let model = self.clone();
        let name = name.to_string();
        Ok(async move {
            call.await?;
            let previous = {
                let mut inner = model.inner.borrow_mut();
                inner.relations.remove(&name);
                inner.entity.insert(name.clone(), value.clone())
            };
            let event = ModelEvent::change(name, value, previous);
            model.events.emit(&event);
            Ok(())
        }
        .boxed_local())
    }
}

/// Entity resource for `type_name` data, keyed when the key is known
fn resolve_resource(
    api: &ODataApi,
    type_name: &str,
    entity: &Map<String, Value>,
) -> Option<EntityResource> {
    let schema = api.schema();
    let set = schema.find_entity_set_for_type(type_name)?;
    let mut resource = api.entity_set(&set.name);
    if set.entity_type != type_name {
        resource = resource.cast(type_name);
    }
    let keyed = resource.entity(entity);
    Some(keyed.unwrap_or_else(|_| resource.new_entity()))
}

fn objects(value: &Value) -> Vec<CollectionItem> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_object().cloned())
                .map(CollectionItem::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, api_with};
    use crate::transport::Method;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn person(api: &ODataApi) -> Model {
        Model::from_entity(
            api,
            "Trippin.Person",
            attrs(json!({
                "UserName": "russellwhyte",
                "FirstName": "Russell",
                "AddressInfo": [{"Address": "187 Suffolk Ln.", "City": {"Name": "Boise"}}],
                "HomeAddress": {"Address": "1 Main St", "City": {"Name": "Seattle"}}
            })),
            EntityAnnotations {
                etag: Some("W/\"1\"".into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_change_tracking_and_reset() {
        let api = api_with(MockTransport::new());
        let model = person(&api);
        assert!(!model.has_changed());

        model.set("FirstName", json!("Russ")).unwrap();
        assert_eq!(model.get("FirstName").unwrap(), json!("Russ"));
        assert_eq!(model.changes(), attrs(json!({"FirstName": "Russ"})));

        model.reset();
        assert_eq!(model.get("FirstName").unwrap(), json!("Russell"));
        assert!(!model.has_changed());
    }

    #[test]
    fn test_key_change_rekeys_resource() {
        let api = api_with(MockTransport::new());
        let model = Model::new(&api, "Trippin.Person", Map::new());
        assert!(model.is_new());
        assert_eq!(model.entity_resource().unwrap().to_string(), "People");

        model.set("UserName", json!("newbie")).unwrap();
        assert!(!model.is_new());
        assert_eq!(
            model.entity_resource().unwrap().to_string(),
            "People('newbie')"
        );
    }

    #[test]
    fn test_navigation_needs_key() {
        let api = api_with(MockTransport::new());
        let model = Model::new(&api, "Trippin.Person", Map::new());
        assert!(model.get("Friends").is_err());
        assert!(model.navigation("BestFriend").is_err());
        assert!(model.set("BestFriend", json!({"FirstName": "x"})).is_err());
    }

    #[test]
    fn test_complex_relation_bubbles_and_invalidates() {
        let api = api_with(MockTransport::new());
        let model = person(&api);
        let paths = Rc::new(RefCell::new(Vec::new()));
        let sink = paths.clone();
        let _sub = model
            .events()
            .subscribe(move |e| sink.borrow_mut().push(e.path.clone()));

        let home = model.complex("HomeAddress").unwrap();
        let home = home.as_model().unwrap().clone();
        home.set("Address", json!("2 Main St")).unwrap();
        assert_eq!(
            model.to_entity()["HomeAddress"]["Address"],
            json!("2 Main St")
        );
        assert!(model.has_changed());

        let addresses = model.complex("AddressInfo").unwrap();
        let first = addresses.as_collection().unwrap().get(0).unwrap();
        first.set("Address", json!("9 Elm St")).unwrap();

        let moved = json!({"Address": "3 Main St"});
        model.set("HomeAddress", moved).unwrap();
        home.set("Address", json!("ignored")).unwrap();

        assert_eq!(
            *paths.borrow(),
            vec![
                "HomeAddress.Address",
                "AddressInfo[0].Address",
                "HomeAddress",
            ]
        );
        assert_eq!(
            model.get("HomeAddress").unwrap(),
            json!({"Address": "3 Main St"})
        );
    }

    #[test]
    fn test_validation_aggregates_nested_errors() {
        let api = api_with(MockTransport::new());
        let model = Model::new(
            &api,
            "Trippin.Person",
            attrs(json!({
                "UserName": "averyveryveryverylongusername",
                "HomeAddress": {"City": {"Name": null}}
            })),
        );
        let errors = model.validate();
        assert_eq!(errors["UserName"], vec!["maxlength"]);
        assert_eq!(errors["FirstName"], vec!["required"]);
        assert!(errors.contains_key("HomeAddress.Address"));

        let invalid = Rc::new(RefCell::new(None));
        let sink = invalid.clone();
        let _sub = model.events().subscribe(move |e| {
            if e.kind == EventKind::Invalid {
                *sink.borrow_mut() = e.errors.clone();
            }
        });
        assert!(!model.is_valid());
        assert!(invalid.borrow().is_some());
    }

    #[tokio::test]
    async fn test_create_syncs_server_state() {
        let transport = MockTransport::new();
        transport.respond_json(
            201,
            json!({
                "@odata.etag": "W/\"2\"",
                "UserName": "newbie",
                "FirstName": "New",
                "Age": "33"
            }),
        );
        let api = api_with(transport.clone());
        let model = Model::new(
            &api,
            "Trippin.Person",
            attrs(json!({"UserName": "newbie", "FirstName": "New"})),
        );
        assert!(!model.is_new());

        model.create(RequestOptions::new()).unwrap().await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://services.example.com/trippin/People");
        assert_eq!(model.get("Age").unwrap(), json!(33));
        assert_eq!(model.annotations().etag.as_deref(), Some("W/\"2\""));
        assert!(!model.has_changed());
    }

    #[tokio::test]
    async fn test_modify_sends_changes_with_etag() {
        let transport = MockTransport::new();
        transport.respond(204, &[], "");
        let api = api_with(transport.clone());
        let model = person(&api);
        model.set("FirstName", json!("Russ")).unwrap();

        let call = model.save(true, RequestOptions::new()).unwrap();
        call.await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Patch);
        assert_eq!(request.headers.get("If-Match"), Some("W/\"1\""));
        let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"FirstName": "Russ"}));
        assert!(!model.has_changed());
    }

    #[tokio::test]
    async fn test_fetch_retypes_to_derived_type() {
        let transport = MockTransport::new();
        transport.respond_json(
            200,
            json!({"@odata.type": "#Trippin.Employee", "UserName": "russellwhyte", "Cost": "1000"}),
        );
        let api = api_with(transport);
        let model = person(&api);
        model.fetch(RequestOptions::new()).unwrap().await.unwrap();
        assert_eq!(model.type_name().as_deref(), Some("Trippin.Employee"));
        assert_eq!(model.get("Cost").unwrap(), json!(1000));
        assert_eq!(
            model.entity_resource().unwrap().type_name().as_deref(),
            Some("Trippin.Employee")
        );
    }

    #[tokio::test]
    async fn test_destroy_emits_terminal_event() {
        let transport = MockTransport::new();
        transport.respond(204, &[], "");
        let api = api_with(transport.clone());
        let model = person(&api);
        let destroyed = Rc::new(RefCell::new(false));
        let sink = destroyed.clone();
        let _sub = model.events().subscribe(move |e| {
            if e.kind == EventKind::Destroy {
                *sink.borrow_mut() = true;
            }
        });
        model.destroy(RequestOptions::new()).unwrap().await.unwrap();
        assert!(*destroyed.borrow());
        assert_eq!(transport.requests()[0].method, Method::Delete);
    }

    #[test]
    fn test_persistence_without_key_fails_synchronously() {
        let api = api_with(MockTransport::new());
        let model = Model::new(&api, "Trippin.Person", Map::new());
        let update = model.update(RequestOptions::new());
        assert!(matches!(update, Err(ODataError::MissingKey(_))));
        let destroy = model.destroy(RequestOptions::new());
        assert!(matches!(destroy, Err(ODataError::MissingKey(_))));
    }

    #[tokio::test]
    async fn test_set_reference_puts_ref() {
        let transport = MockTransport::new();
        transport.respond(204, &[], "");
        let api = api_with(transport.clone());
        let model = person(&api);
        let friend = Model::from_entity(
            &api,
            "Trippin.Person",
            attrs(json!({"UserName": "ronaldmundy"})),
            Default::default(),
        );

        model
            .set_reference("BestFriend", Some(&friend), RequestOptions::new())
            .unwrap()
            .await
            .unwrap();
        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Put);
        let target = "People('russellwhyte')/BestFriend/$ref";
        assert!(request.url.ends_with(target));
        assert_eq!(
            model.get("BestFriend").unwrap()["UserName"],
            json!("ronaldmundy")
        );
        let cleared = model.set_reference("Friends", None, RequestOptions::new());
        assert!(cleared.is_err());
    }

    #[test]
    fn test_typed_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        #[serde(rename_all = "PascalCase")]
        struct Person {
            user_name: String,
            first_name: String,
        }
        let api = api_with(MockTransport::new());
        let value = Person {
            user_name: "a".into(),
            first_name: "Alfred".into(),
        };
        let model = Model::from_typed(&api, "Trippin.Person", &value).unwrap();
        assert_eq!(model.get_typed::<Person>().unwrap(), value);
    }
}
