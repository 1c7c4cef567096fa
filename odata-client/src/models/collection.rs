//! Ordered, reconciling container of models

use super::events::{AssignBuckets, EventEmitter, EventKind, ModelEvent, ParentLink};
use super::model::{Model, ModelCall, ModelResource};
use crate::api::{ODataApi, ODataCall};
use crate::constants::CID_FIELD;
use crate::error::{ODataError, ODataResult};
use crate::path::EntityKey;
use crate::request::RequestOptions;
use crate::resource::{
    EntityResource, EntitySetResource, NavigationPropertyResource, ODataResource, PropertyResource,
};
use crate::response::{CollectionAnnotations, EntitiesResult, EntityAnnotations};
use futures::FutureExt;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Collection-shaped endpoint a [`Collection`] reads from and writes to
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionResource {
    EntitySet(EntitySetResource),
    Navigation(NavigationPropertyResource),
    /// Collection of complex values, saved through the owning model
    Property(PropertyResource),
}

impl CollectionResource {
    fn api(&self) -> &ODataApi {
        match self {
            CollectionResource::EntitySet(r) => r.api(),
            CollectionResource::Navigation(r) => r.api(),
            CollectionResource::Property(r) => r.api(),
        }
    }

    fn type_name(&self) -> Option<String> {
        match self {
            CollectionResource::EntitySet(r) => r.type_name(),
            CollectionResource::Navigation(r) => r.type_name(),
            CollectionResource::Property(r) => r.type_name(),
        }
    }

    /// Resource of one member, unkeyed when `attrs` carry no key
    fn member(&self, attrs: &Map<String, Value>) -> Option<EntityResource> {
        match self {
            CollectionResource::EntitySet(set) => {
                Some(set.entity(attrs).unwrap_or_else(|_| set.new_entity()))
            }
            CollectionResource::Navigation(nav) => {
                Some(nav.member(attrs).unwrap_or_else(|_| nav.new_entity()))
            }
            CollectionResource::Property(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Added,
    Unchanged,
    /// Kept until the next save or reset so the removal can be sent
    Removed,
}

struct Entry {
    model: Model,
    state: EntryState,
    /// Present for models the collection built itself
    _link: Option<ParentLink>,
}

/// Incoming item for [`Collection::assign`]
#[derive(Debug, Clone)]
pub enum CollectionItem {
    Model(Model),
    Attrs(Map<String, Value>, EntityAnnotations),
}

impl From<Model> for CollectionItem {
    fn from(model: Model) -> Self {
        CollectionItem::Model(model)
    }
}

impl From<Map<String, Value>> for CollectionItem {
    fn from(attrs: Map<String, Value>) -> Self {
        CollectionItem::Attrs(attrs, EntityAnnotations::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssignOptions {
    /// Splice unmatched entries out instead of flagging them removed
    pub reset: bool,
    /// Skip the assign event
    pub silent: bool,
}

impl AssignOptions {
    /// Replace the members outright, as a fetch does
    pub fn reset(silent: bool) -> Self {
        Self {
            reset: true,
            silent,
        }
    }
}

struct CollectionInner {
    api: ODataApi,
    type_name: Option<String>,
    resource: Option<CollectionResource>,
    entries: Vec<Entry>,
    annots: CollectionAnnotations,
}

#[derive(Clone)]
pub struct Collection {
    inner: Rc<RefCell<CollectionInner>>,
    events: EventEmitter,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Collection")
            .field("type_name", &inner.type_name)
            .field("entries", &inner.entries.len())
            .finish()
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Collection {
    pub fn new(resource: CollectionResource) -> Self {
        let api = resource.api().clone();
        let type_name = resource.type_name();
        Self::build(api, type_name, Some(resource))
    }

    /// Collection bound to the entity set holding `type_name`
    pub fn for_type(api: &ODataApi, type_name: &str) -> Self {
        let resource = api.schema().find_entity_set_for_type(type_name).map(|set| {
            let mut resource = api.entity_set(&set.name);
            if set.entity_type != type_name {
                resource = resource.cast(type_name);
            }
            CollectionResource::EntitySet(resource)
        });
        Self::build(api.clone(), Some(type_name.to_string()), resource)
    }

    pub(crate) fn build(
        api: ODataApi,
        type_name: Option<String>,
        resource: Option<CollectionResource>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CollectionInner {
                api,
                type_name,
                resource,
                entries: Vec::new(),
                annots: CollectionAnnotations::default(),
            })),
            events: EventEmitter::new(),
        }
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn type_name(&self) -> Option<String> {
        self.inner.borrow().type_name.clone()
    }

    pub fn resource(&self) -> Option<CollectionResource> {
        self.inner.borrow().resource.clone()
    }

    /// Annotations of the last fetched page
    pub fn annotations(&self) -> CollectionAnnotations {
        self.inner.borrow().annots.clone()
    }

    /// Rebind to another endpoint; entity members follow
    pub(crate) fn attach(&self, resource: CollectionResource) {
        self.inner.borrow_mut().resource = Some(resource.clone());
        for model in self.models() {
            if let Some(member) = resource.member(&model.to_entity())
                && let Err(err) = model.attach(member)
            {
                log::debug!("collection member kept its resource: {}", err);
            }
        }
    }

    fn make_model(
        &self,
        attrs: Map<String, Value>,
        annots: EntityAnnotations,
        synced: bool,
    ) -> Model {
        let (api, type_name, resource) = {
            let inner = self.inner.borrow();
            let type_name = annots.type_name.clone().or_else(|| inner.type_name.clone());
            (inner.api.clone(), type_name, inner.resource.clone())
        };
        let member = resource
            .and_then(|r| r.member(&attrs))
            .map(|member| match &annots.type_name {
                Some(t) => member.retype(t),
                None => member,
            })
            .map(ModelResource::Entity);
        Model::build(api, type_name, member, attrs, annots, synced)
    }

    /// Forward a member's events as `[index].path`
    fn link(&self, model: &Model) -> ParentLink {
        let id = model.identity();
        let inner = Rc::downgrade(&self.inner);
        let emitter = self.events.downgrade();
        let subscription = model.events().subscribe(move |event| {
            let (Some(inner), Some(emitter)) = (inner.upgrade(), emitter.upgrade()) else {
                return;
            };
            let index = match inner.try_borrow() {
                Ok(inner) => inner
                    .entries
                    .iter()
                    .filter(|e| e.state != EntryState::Removed)
                    .position(|e| e.model.identity() == id),
                Err(_) => None,
            };
            let Some(index) = index else { return };
            if event.kind == EventKind::Destroy {
                let removed = inner.try_borrow_mut().ok().and_then(|mut inner| {
                    let position = inner.entries.iter().position(|e| e.model.identity() == id)?;
                    Some(inner.entries.remove(position))
                });
                drop(removed);
            }
            emitter.emit(&event.nested(&format!("[{}]", index)));
        });
        ParentLink::from_subscription(format!("[{}]", self.len()), subscription)
    }

    /// Position among all entries of the one matching `item`
    fn find(&self, snapshot: &[(Model, EntryState)], item: &CollectionItem) -> Option<usize> {
        match item {
            CollectionItem::Model(model) => {
                let cid = model.cid();
                let by_key = |key: EntityKey| {
                    snapshot
                        .iter()
                        .position(|(m, _)| m.key().as_ref() == Some(&key))
                };
                snapshot
                    .iter()
                    .position(|(m, _)| m.ptr_eq(model))
                    .or_else(|| snapshot.iter().position(|(m, _)| m.cid() == cid))
                    .or_else(|| model.key().and_then(by_key))
            }
            CollectionItem::Attrs(attrs, annots) => {
                let by_cid = attrs
                    .get(CID_FIELD)
                    .and_then(Value::as_str)
                    .and_then(|cid| snapshot.iter().position(|(m, _)| m.cid() == cid));
                by_cid.or_else(|| {
                    let type_name = annots.type_name.clone().or_else(|| self.type_name())?;
                    let api = self.inner.borrow().api.clone();
                    let key = api.schema().resolve_key(&type_name, attrs)?;
                    snapshot
                        .iter()
                        .position(|(m, _)| m.key().as_ref() == Some(&key))
                })
            }
        }
    }

    /// Reconcile the collection with `items`
    ///
    /// Items matching an entry (same model, same cid, then same key) merge
    /// into it; others are added. Entries nothing matched are flagged
    /// removed, or spliced out under `reset` and when they were never saved.
    pub fn assign(&self, items: Vec<CollectionItem>, options: AssignOptions) -> AssignBuckets {
        let snapshot: Vec<(Model, EntryState)> = self
            .inner
            .borrow()
            .entries
            .iter()
            .map(|e| (e.model.clone(), e.state))
            .collect();
        let mut matched = vec![false; snapshot.len()];
        let mut buckets = AssignBuckets::default();
        let mut additions: Vec<(Model, bool)> = Vec::new();

        for item in items {
            match (self.find(&snapshot, &item), item) {
                (Some(index), item) => {
                    let existing = &snapshot[index].0;
                    match item {
                        CollectionItem::Model(model) if model.ptr_eq(existing) => {}
                        CollectionItem::Model(model) => {
                            existing.assign(&model.to_entity(), options.silent)
                        }
                        CollectionItem::Attrs(attrs, _) => existing.assign(&attrs, options.silent),
                    }
                    matched[index] = true;
                    buckets.merged.push(existing.clone());
                }
                (None, CollectionItem::Model(model)) => {
                    buckets.added.push(model.clone());
                    additions.push((model, false));
                }
                (None, CollectionItem::Attrs(attrs, annots)) => {
                    let model = self.make_model(attrs, annots, options.reset);
                    buckets.added.push(model.clone());
                    additions.push((model, true));
                }
            }
        }

        let state = if options.reset {
            EntryState::Unchanged
        } else {
            EntryState::Added
        };
        let links: Vec<Option<ParentLink>> = additions
            .iter()
            .map(|(model, owned)| (*owned).then(|| self.link(model)))
            .collect();
        let dropped = {
            let mut inner = self.inner.borrow_mut();
            let mut kept = Vec::with_capacity(inner.entries.len() + additions.len());
            let mut dropped = Vec::new();
            for (index, mut entry) in std::mem::take(&mut inner.entries).into_iter().enumerate() {
                if matched.get(index).copied().unwrap_or(false) {
                    if entry.state == EntryState::Removed {
                        entry.state = EntryState::Unchanged;
                    }
                    kept.push(entry);
                    continue;
                }
                if entry.state != EntryState::Removed {
                    buckets.removed.push(entry.model.clone());
                }
                if options.reset || entry.state == EntryState::Added {
                    dropped.push(entry);
                } else {
                    entry.state = EntryState::Removed;
                    kept.push(entry);
                }
            }
            for ((model, _), link) in additions.into_iter().zip(links) {
                kept.push(Entry {
                    model,
                    state,
                    _link: link,
                });
            }
            inner.entries = kept;
            dropped
        };
        drop(dropped);

        if !options.silent {
            self.events.emit(&ModelEvent::assign(buckets.clone()));
        }
        buckets
    }

    /// Append a model or raw entity; a member already present is returned as is
    pub fn add(&self, item: impl Into<CollectionItem>) -> Model {
        let item = item.into();
        let snapshot = self.snapshot();
        if let Some(index) = self.find(&snapshot, &item) {
            let model = snapshot[index].0.clone();
            if let Some(entry) = self.inner.borrow_mut().entries.get_mut(index)
                && entry.state == EntryState::Removed
            {
                entry.state = EntryState::Unchanged;
            }
            return model;
        }
        let (model, link) = match item {
            CollectionItem::Model(model) => (model, None),
            CollectionItem::Attrs(attrs, annots) => {
                let model = self.make_model(attrs, annots, false);
                let link = self.link(&model);
                (model, Some(link))
            }
        };
        let index = self.len();
        self.inner.borrow_mut().entries.push(Entry {
            model: model.clone(),
            state: EntryState::Added,
            _link: link,
        });
        self.events.emit(&ModelEvent {
            path: format!("[{}]", index),
            ..ModelEvent::new(EventKind::Add)
        });
        model
    }

    /// Drop a member; unsaved members go away, saved ones wait for [`save`](Self::save)
    pub fn remove(&self, model: &Model) -> bool {
        let Some(index) = self.position(model) else {
            return false;
        };
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let position = inner.entries.iter().position(|e| e.model.ptr_eq(model));
            match position {
                Some(p) if inner.entries[p].state == EntryState::Added => {
                    Some(inner.entries.remove(p))
                }
                Some(p) => {
                    inner.entries[p].state = EntryState::Removed;
                    None
                }
                None => None,
            }
        };
        drop(removed);
        self.events.emit(&ModelEvent {
            path: format!("[{}]", index),
            ..ModelEvent::new(EventKind::Remove)
        });
        true
    }

    fn snapshot(&self) -> Vec<(Model, EntryState)> {
        self.inner
            .borrow()
            .entries
            .iter()
            .map(|e| (e.model.clone(), e.state))
            .collect()
    }

    fn position(&self, model: &Model) -> Option<usize> {
        self.models().iter().position(|m| m.ptr_eq(model))
    }

    /// Visible members, in order
    pub fn models(&self) -> Vec<Model> {
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|e| e.state != EntryState::Removed)
            .map(|e| e.model.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Model> {
        self.models().into_iter()
    }

    pub fn get(&self, index: usize) -> Option<Model> {
        self.models().into_iter().nth(index)
    }

    pub fn find_by_key(&self, key: &EntityKey) -> Option<Model> {
        self.models()
            .into_iter()
            .find(|m| m.key().as_ref() == Some(key))
    }

    pub fn contains(&self, model: &Model) -> bool {
        self.position(model).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|e| e.state != EntryState::Removed)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry state of a member, removed ones included
    pub fn state(&self, model: &Model) -> Option<EntryState> {
        self.inner
            .borrow()
            .entries
            .iter()
            .find(|e| e.model.ptr_eq(model))
            .map(|e| e.state)
    }

    pub fn has_changed(&self) -> bool {
        self.snapshot()
            .iter()
            .any(|(model, state)| *state != EntryState::Unchanged || model.has_changed())
    }

    pub fn to_entities(&self) -> Vec<Map<String, Value>> {
        self.models().iter().map(Model::to_entity).collect()
    }

    /// Flag every member removed
    pub fn clear(&self) -> AssignBuckets {
        self.assign(Vec::new(), AssignOptions::default())
    }

    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&Model, &Model) -> Ordering,
    {
        let mut entries = std::mem::take(&mut self.inner.borrow_mut().entries);
        entries.sort_by(|a, b| compare(&a.model, &b.model));
        self.inner.borrow_mut().entries = entries;
    }

    fn require_resource(&self, operation: &str) -> ODataResult<CollectionResource> {
        self.resource().ok_or_else(|| {
            ODataError::composition(format!("{} needs a collection resource", operation))
        })
    }

    fn load(&self, call: ODataCall<EntitiesResult>) -> ModelCall<AssignBuckets> {
        let collection = self.clone();
        async move {
            let result = call.await?;
            let EntitiesResult {
                entities,
                entity_annots,
                annots,
            } = result;
            let mut entity_annots = entity_annots.into_iter();
            let items = entities
                .into_iter()
                .map(|entity| {
                    CollectionItem::Attrs(entity, entity_annots.next().unwrap_or_default())
                })
                .collect();
            collection.inner.borrow_mut().annots = annots;
            Ok(collection.assign(items, AssignOptions::reset(false)))
        }
        .boxed_local()
    }

    /// Replace the members with one page from the service
    pub fn fetch(&self, options: RequestOptions) -> ODataResult<ModelCall<AssignBuckets>> {
        let call = match self.require_resource("fetch")? {
            CollectionResource::EntitySet(set) => set.fetch(options),
            CollectionResource::Navigation(nav) => nav.fetch_entities(options),
            CollectionResource::Property(property) => {
                property.fetch(options).map(|result| EntitiesResult {
                    entities: objects(result.value),
                    annots: result.annots,
                    ..EntitiesResult::default()
                })
            }
        };
        Ok(self.load(call))
    }

    /// Replace the members with the first `top` entities
    pub fn fetch_many(
        &self,
        top: u64,
        options: RequestOptions,
    ) -> ODataResult<ModelCall<AssignBuckets>> {
        let call = match self.require_resource("fetch_many")? {
            CollectionResource::EntitySet(set) => set.fetch_many(top, options),
            CollectionResource::Navigation(nav) => nav.fetch_many(top, options),
            CollectionResource::Property(property) => {
                return Err(ODataError::composition(format!("{} can't be paged", property)));
            }
        };
        Ok(self.load(call))
    }

    /// Replace the members with every page from the service
    pub fn fetch_all(&self, options: RequestOptions) -> ODataResult<ModelCall<AssignBuckets>> {
        let call = match self.require_resource("fetch_all")? {
            CollectionResource::EntitySet(set) => set.fetch_all(options),
            CollectionResource::Navigation(nav) => nav.fetch_all(options),
            CollectionResource::Property(property) => {
                let call = property.fetch_all(options);
                call.map(|(values, annots)| EntitiesResult {
                    entities: objects(Some(Value::Array(values))),
                    annots,
                    ..EntitiesResult::default()
                })
            }
        };
        Ok(self.load(call))
    }

    /// Build, add and create a member
    pub fn create(
        &self,
        attrs: Map<String, Value>,
        options: RequestOptions,
    ) -> ODataResult<ModelCall<Model>> {
        if let CollectionResource::Property(property) = self.require_resource("create")? {
            return Err(ODataError::composition(format!(
                "members of {} are saved with their owner",
                property
            )));
        }
        let model = self.make_model(attrs, EntityAnnotations::default(), false);
        let call = model.create(options)?;
        let link = self.link(&model);
        self.inner.borrow_mut().entries.push(Entry {
            model: model.clone(),
            state: EntryState::Added,
            _link: Some(link),
        });
        let collection = self.clone();
        Ok(async move {
            call.await?;
            if let Some(entry) = collection
                .inner
                .borrow_mut()
                .entries
                .iter_mut()
                .find(|e| e.model.ptr_eq(&model))
            {
                entry.state = EntryState::Unchanged;
            }
            Ok(model)
        }
        .boxed_local())
    }

    /// Send removals, additions and changed members in parallel
    ///
    /// Navigation collections unlink removed members and link saved ones
    /// through `$ref` instead of deleting or creating them.
    pub fn save(&self, options: RequestOptions) -> ODataResult<ModelCall> {
        let resource = self.require_resource("save")?;
        if let CollectionResource::Property(property) = &resource {
            return Err(ODataError::composition(format!(
                "members of {} are saved with their owner",
                property
            )));
        }
        let mut calls: Vec<ModelCall> = Vec::new();
        for (model, state) in self.snapshot() {
            match (state, &resource) {
                (EntryState::Removed, CollectionResource::Navigation(nav)) => {
                    let target = member_resource(&model)?;
                    let call = nav.reference().remove(Some(&target), options.clone());
                    calls.push(call.boxed_local());
                }
                (EntryState::Removed, _) => calls.push(model.destroy(options.clone())?),
                (EntryState::Added, CollectionResource::Navigation(nav)) if !model.is_new() => {
                    let target = member_resource(&model)?;
                    let call = nav.reference().add(&target, options.clone());
                    calls.push(call.boxed_local());
                }
                (EntryState::Added, _) => calls.push(model.create(options.clone())?),
                (EntryState::Unchanged, _) if model.has_changed() => {
                    calls.push(model.save(true, options.clone())?)
                }
                _ => {}
            }
        }
        log::debug!("saving {} collection changes", calls.len());
        let collection = self.clone();
        Ok(async move {
            for result in join_all(calls).await {
                result?;
            }
            collection.collapse();
            Ok(())
        }
        .boxed_local())
    }

    /// Forget removed members, mark the rest unchanged
    fn collapse(&self) {
        let dropped: Vec<Entry> = {
            let mut inner = self.inner.borrow_mut();
            let (removed, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut inner.entries)
                .into_iter()
                .partition(|e| e.state == EntryState::Removed);
            inner.entries = kept;
            for entry in &mut inner.entries {
                entry.state = EntryState::Unchanged;
            }
            removed
        };
        drop(dropped);
    }
}

fn member_resource(model: &Model) -> ODataResult<EntityResource> {
    match model.entity_resource() {
        Some(resource) if resource.is_addressable() => Ok(resource),
        _ => Err(ODataError::missing_key(format!("{:?} has no key to reference", model))),
    }
}

fn objects(value: Option<Value>) -> Vec<Map<String, Value>> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
