//! Addressable OData endpoints
//!
//! Every resource kind wraps a [`Resource`]: the api handle, the path
//! segments and the query options. Mutators never touch the receiver; they
//! return a modified clone, so a base resource can be shared and
//! specialised freely.

pub mod action;
pub mod batch;
pub mod count;
pub mod entity;
pub mod entity_set;
pub mod function;
pub mod media;
pub mod metadata;
pub mod navigation;
pub mod property;
pub mod reference;
pub mod singleton;
pub mod value;

pub use action::ActionResource;
pub use batch::{BatchPart, BatchRequestBuilder, BatchRequester, BatchResource, BatchResponseParser};
pub use count::CountResource;
pub use entity::EntityResource;
pub use entity_set::EntitySetResource;
pub use function::FunctionResource;
pub use media::MediaResource;
pub use metadata::MetadataResource;
pub use navigation::NavigationPropertyResource;
pub use property::PropertyResource;
pub use reference::ReferenceResource;
pub use singleton::SingletonResource;
pub use value::ValueResource;

use crate::api::{ODataApi, ODataCall};
use crate::constants::VALUE;
use crate::error::{ODataError, ODataResult};
use crate::literal::Literal;
use crate::path::{PathSegments, SegmentKind};
use crate::query::{
    ComputeExpression, ExpandExpression, FieldProxy, FilterExpression, OrderByExpression, Params,
    QueryOptionName, QueryOptions, SearchExpression, SelectExpression,
};
use crate::request::{ODataRequest, RequestBody, RequestOptions, ResponseType};
use crate::response::{CollectionAnnotations, EntitiesResult, ODataResponse};
use crate::schema::{CallableDef, CallableKind, Parser, Schema};
use crate::transport::Method;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Path, query and api shared by every resource kind
#[derive(Clone)]
pub struct Resource {
    api: ODataApi,
    segments: PathSegments,
    query: QueryOptions,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.to_string())
            .finish()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments && self.query == other.query
    }
}

impl Resource {
    pub fn new(api: ODataApi, segments: PathSegments, query: QueryOptions) -> Self {
        Self {
            api,
            segments,
            query,
        }
    }

    pub fn api(&self) -> &ODataApi {
        &self.api
    }

    pub fn schema(&self) -> Arc<dyn Schema> {
        self.api.schema()
    }

    pub fn segments(&self) -> &PathSegments {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut PathSegments {
        &mut self.segments
    }

    pub fn query(&self) -> &QueryOptions {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryOptions {
        &mut self.query
    }

    /// Type of the last typed segment
    pub fn type_name(&self) -> Option<String> {
        self.segments.type_name().map(str::to_string)
    }

    /// Same resource routed through another api (a batch, usually)
    pub fn rebind(&self, api: &ODataApi) -> Self {
        Self {
            api: api.clone(),
            ..self.clone()
        }
    }

    /// Path relative to the service root and the query parameters
    ///
    /// Path literals are URL escaped; parameter values are left raw and
    /// escaped once when the query string is written.
    pub fn path_and_params(&self) -> (String, Params) {
        let non_parenthesis = self
            .api
            .settings()
            .non_parenthesis_for_empty_parameter_function;
        let (path, mut params) = self.segments.path_and_params(true, non_parenthesis);
        let options = self.query.to_params(false);
        params.extend(options.iter());
        (path, params)
    }

    /// Absolute URL, optionally with the query string
    pub fn endpoint_url(&self, with_params: bool) -> String {
        let (path, params) = self.path_and_params();
        let url = format!("{}{}", self.api.service_root_url(), path);
        if with_params && !params.is_empty() {
            format!("{}?{}", url, params.to_query_string())
        } else {
            url
        }
    }

    /// Field names of the current type, for expression builders
    pub fn fields(&self) -> FieldProxy {
        let names = self
            .type_name()
            .and_then(|t| self.schema().find_structured_type(&t))
            .map(|ty| {
                ty.all_fields()
                    .into_iter()
                    .map(|f| f.name.clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        FieldProxy::new(names)
    }

    pub fn parser(&self) -> Option<Arc<dyn Parser>> {
        self.type_name()
            .and_then(|t| self.schema().parser_for_type(&t))
    }

    pub fn serialize(&self, value: &Value) -> Value {
        match self.parser() {
            Some(parser) => parser.serialize(value, &self.api.parser_options()),
            None => value.clone(),
        }
    }

    pub fn deserialize(&self, value: &Value) -> Value {
        match self.parser() {
            Some(parser) => parser.deserialize(value, &self.api.parser_options()),
            None => value.clone(),
        }
    }

    pub fn encode(&self, value: &Value) -> Literal {
        match self.parser() {
            Some(parser) => parser.encode(value, &self.api.parser_options()),
            None => Literal::from_json(value),
        }
    }

    /// Build the request for a verb without dispatching it
    pub fn build_request(
        &self,
        method: Method,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> ODataRequest {
        let (path, params) = self.path_and_params();
        ODataRequest::build(method, path, params, body, options, self.api.settings())
    }

    /// Dispatch a verb and bind the answer to this resource's type
    ///
    /// The request is built and handed to the requester right away; the
    /// returned call resolves once the requester answers.
    pub fn request(
        &self,
        method: Method,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> ODataCall<ODataResponse> {
        let request = self.build_request(method, body, options);
        let url = request.url();
        let schema = self.schema();
        let type_name = self.type_name();
        let parser_options = self.api.parser_options();
        let version = self.api.settings().version.clone();
        self.api.request(request).and_then(move |response| {
            ODataResponse::new(response, url, schema, type_name, parser_options, version)
                .ensure_success()
        })
    }

    pub fn get(&self, options: RequestOptions) -> ODataCall<ODataResponse> {
        self.request(Method::Get, None, options)
    }

    pub fn post(
        &self,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> ODataCall<ODataResponse> {
        self.request(Method::Post, body, options)
    }

    pub fn put(
        &self,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> ODataCall<ODataResponse> {
        self.request(Method::Put, body, options)
    }

    pub fn patch(
        &self,
        body: Option<RequestBody>,
        options: RequestOptions,
    ) -> ODataCall<ODataResponse> {
        self.request(Method::Patch, body, options)
    }

    pub fn delete(&self, options: RequestOptions) -> ODataCall<ODataResponse> {
        self.request(Method::Delete, None, options)
    }

    /// Append a fixed segment (`$count`, `$value`, `$ref`) keeping the type
    pub(crate) fn with_fixed(&self, kind: SegmentKind, name: &str) -> Self {
        let mut resource = self.clone();
        let type_name = resource.type_name();
        resource.segments.add(kind, name).set_type_opt(type_name);
        resource
    }

    /// Clone with a trailing `$value` segment and no query options
    pub(crate) fn value_segment(&self) -> Self {
        let mut resource = self.with_fixed(SegmentKind::Value, VALUE);
        resource.query.clear();
        resource
    }

    /// Resolve a bound callable against the current type
    ///
    /// When the callable binds to a derived type a cast segment is added.
    /// When it binds to an unrelated type the entity set segment is
    /// switched to the set that holds the binding type.
    pub(crate) fn bind_callable(
        &self,
        name: &str,
        kind: CallableKind,
    ) -> ODataResult<(Self, Arc<CallableDef>)> {
        let schema = self.schema();
        let current = self.type_name();
        let def = schema
            .find_callable(name, current.as_deref())
            .filter(|d| d.bound)
            .or_else(|| schema.find_callable(name, None).filter(|d| d.bound))
            .ok_or_else(|| ODataError::composition(format!("no bound callable {}", name)))?;
        if def.kind != kind {
            return Err(ODataError::composition(format!(
                "{} is not a {}",
                name,
                match kind {
                    CallableKind::Function => "function",
                    CallableKind::Action => "action",
                }
            )));
        }

        let mut resource = self.clone();
        resource.query.clear();
        if let (Some(binding), Some(current)) = (def.binding_type(), current.as_deref())
            && binding != current
        {
            if schema.is_sub_type_of(binding, current) {
                resource
                    .segments
                    .add(SegmentKind::Type, binding)
                    .set_type(binding);
            } else if !schema.is_sub_type_of(current, binding) {
                let set = schema.find_entity_set_for_type(binding).ok_or_else(|| {
                    ODataError::composition(format!("no entity set holds {}", binding))
                })?;
                log::debug!(
                    "rebinding {} to entity set {}",
                    def.qualified_name(),
                    set.name
                );
                let handle = resource
                    .segments
                    .get_mut(SegmentKind::EntitySet)
                    .ok_or_else(|| {
                        ODataError::composition(format!("{} needs an entity set", name))
                    })?;
                handle.set_name(set.name).set_type(set.entity_type);
            }
        }
        Ok((resource, def))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let non_parenthesis = self
            .api
            .settings()
            .non_parenthesis_for_empty_parameter_function;
        let (path, mut params) = self.segments.path_and_params(false, non_parenthesis);
        params.extend(self.query.to_params(false).iter());
        if params.is_empty() {
            f.write_str(&path)
        } else {
            write!(f, "{}?{}", path, params.to_raw_string())
        }
    }
}

/// Behaviour shared by every resource kind
pub trait ODataResource: Clone + Sized {
    fn resource(&self) -> &Resource;

    fn resource_mut(&mut self) -> &mut Resource;

    fn api(&self) -> &ODataApi {
        self.resource().api()
    }

    fn schema(&self) -> Arc<dyn Schema> {
        self.resource().schema()
    }

    fn type_name(&self) -> Option<String> {
        self.resource().type_name()
    }

    fn path_and_params(&self) -> (String, Params) {
        self.resource().path_and_params()
    }

    fn endpoint_url(&self, with_params: bool) -> String {
        self.resource().endpoint_url(with_params)
    }

    fn serialize(&self, value: &Value) -> Value {
        self.resource().serialize(value)
    }

    fn deserialize(&self, value: &Value) -> Value {
        self.resource().deserialize(value)
    }

    fn encode(&self, value: &Value) -> Literal {
        self.resource().encode(value)
    }

    /// Clone routed through another api
    fn rebind(&self, api: &ODataApi) -> Self {
        let mut clone = self.clone();
        *clone.resource_mut() = self.resource().rebind(api);
        clone
    }

    /// Clone with edited query options
    fn query<F>(&self, f: F) -> Self
    where
        F: FnOnce(&mut QueryOptions),
    {
        let mut clone = self.clone();
        f(clone.resource_mut().query_mut());
        clone
    }

    /// Clone with edited path segments
    fn segment<F>(&self, f: F) -> Self
    where
        F: FnOnce(&mut PathSegments),
    {
        let mut clone = self.clone();
        f(clone.resource_mut().segments_mut());
        clone
    }

    /// `$select` from plain field names
    fn select(&self, fields: &[&str]) -> Self {
        self.query(|q| q.set(QueryOptionName::Select, fields.to_vec()))
    }

    fn select_with<F>(&self, builder: F) -> Self
    where
        F: FnOnce(SelectExpression) -> SelectExpression,
    {
        self.query(|q| q.select(builder))
    }

    /// `$expand` from a plain value (`"Trips"`, `["A", "B"]`, `{"Trips": {...}}`)
    fn expand(&self, value: impl Into<Value>) -> Self {
        self.query(|q| q.set(QueryOptionName::Expand, value))
    }

    fn expand_with<F>(&self, builder: F) -> Self
    where
        F: FnOnce(ExpandExpression) -> ExpandExpression,
    {
        self.query(|q| q.expand(builder))
    }

    /// `$filter` from a plain value (string or filter object)
    fn filter(&self, value: impl Into<Value>) -> Self {
        self.query(|q| q.set(QueryOptionName::Filter, value))
    }

    /// Build or extend `$filter` with typed fields of the current type
    fn filter_with<F>(&self, builder: F) -> Self
    where
        F: FnOnce(&FieldProxy, FilterExpression) -> FilterExpression,
    {
        let fields = self.resource().fields();
        self.query(|q| q.filter(&fields, builder))
    }

    fn orderby(&self, value: impl Into<Value>) -> Self {
        self.query(|q| q.set(QueryOptionName::OrderBy, value))
    }

    fn orderby_with<F>(&self, builder: F) -> Self
    where
        F: FnOnce(OrderByExpression) -> OrderByExpression,
    {
        self.query(|q| q.orderby(builder))
    }

    fn search(&self, value: impl Into<Value>) -> Self {
        self.query(|q| q.set(QueryOptionName::Search, value))
    }

    fn search_with<F>(&self, builder: F) -> Self
    where
        F: FnOnce(SearchExpression) -> SearchExpression,
    {
        self.query(|q| q.search(builder))
    }

    fn compute_with<F>(&self, builder: F) -> Self
    where
        F: FnOnce(ComputeExpression) -> ComputeExpression,
    {
        self.query(|q| q.compute(builder))
    }

    fn top(&self, top: u64) -> Self {
        self.query(|q| q.set(QueryOptionName::Top, top))
    }

    fn skip(&self, skip: u64) -> Self {
        self.query(|q| q.set(QueryOptionName::Skip, skip))
    }

    fn skiptoken(&self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.query(|q| q.set(QueryOptionName::SkipToken, token))
    }

    fn format(&self, format: impl Into<String>) -> Self {
        let format = format.into();
        self.query(|q| q.set(QueryOptionName::Format, format))
    }

    /// `$apply` passthrough
    fn apply(&self, transform: impl Into<String>) -> Self {
        let transform = transform.into();
        self.query(|q| q.set(QueryOptionName::Apply, transform))
    }
}

macro_rules! odata_resource {
    ($($kind:ty),* $(,)?) => {
        $(
            impl $crate::resource::ODataResource for $kind {
                fn resource(&self) -> &$crate::resource::Resource {
                    &self.resource
                }

                fn resource_mut(&mut self) -> &mut $crate::resource::Resource {
                    &mut self.resource
                }
            }

            impl std::fmt::Display for $kind {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    std::fmt::Display::fmt(&self.resource, f)
                }
            }
        )*
    };
}

odata_resource!(
    ActionResource,
    BatchResource,
    CountResource,
    EntityResource,
    EntitySetResource,
    FunctionResource,
    MediaResource,
    MetadataResource,
    NavigationPropertyResource,
    PropertyResource,
    ReferenceResource,
    ValueResource,
);

/// Pages of a collection, following `@odata.nextLink` until it stops
///
/// Paging options of the caller are dropped; the service decides the page
/// size. The next request is only sent when the consumer polls for it, so
/// dropping the stream stops the pagination.
pub(crate) fn paginate<T, F>(
    mut resource: Resource,
    options: RequestOptions,
    extract: F,
) -> BoxStream<'static, ODataResult<(T, CollectionAnnotations)>>
where
    T: Send + 'static,
    F: Fn(&ODataResponse) -> ODataResult<(T, CollectionAnnotations)> + Send + Sync + 'static,
{
    resource.query_mut().clear_paging();
    let extract = Arc::new(extract);
    stream::try_unfold(Some(resource), move |state| {
        let options = options.clone();
        let extract = extract.clone();
        async move {
            let Some(resource) = state else {
                return Ok(None);
            };
            let response = resource.get(options).await?;
            let (page, annots) = extract(&response)?;
            let next = if annots.has_more() {
                let skip = annots.skip();
                let skiptoken = annots.skiptoken();
                log::debug!(
                    "following next page of {} (skip {:?}, skiptoken {:?})",
                    resource,
                    skip,
                    skiptoken
                );
                let mut next = resource.clone();
                next.query_mut().paging(skip, skiptoken, None);
                Some(next)
            } else {
                None
            };
            Ok(Some(((page, annots), next)))
        }
    })
    .boxed()
}

/// Every page of a collection concatenated, with the last page's annotations
pub(crate) fn fetch_all<T, F>(
    resource: Resource,
    options: RequestOptions,
    extract: F,
) -> ODataCall<(Vec<T>, CollectionAnnotations)>
where
    T: Send + 'static,
    F: Fn(&ODataResponse) -> ODataResult<(Vec<T>, CollectionAnnotations)> + Send + Sync + 'static,
{
    let pages = paginate(resource, options, extract);
    ODataCall::new(async move {
        pages
            .try_fold(
                (Vec::new(), CollectionAnnotations::default()),
                |(mut all, _), (page, annots)| async move {
                    all.extend(page);
                    Ok((all, annots))
                },
            )
            .await
    })
}

/// Every page of entities concatenated, each entity keeping its annotations
pub(crate) fn fetch_all_entities(
    resource: Resource,
    options: RequestOptions,
) -> ODataCall<EntitiesResult> {
    let options = with_response_type(options, ResponseType::Entities);
    let pages = paginate(resource, options, |response| {
        let page = response.entities()?;
        let annots = page.annots.clone();
        Ok((page, annots))
    });
    ODataCall::new(async move {
        pages
            .try_fold(EntitiesResult::default(), |mut all, (page, annots)| async move {
                all.entities.extend(page.entities);
                all.entity_annots.extend(page.entity_annots);
                all.annots = annots;
                Ok(all)
            })
            .await
    })
}

/// Resolve a response type default into request options
pub(crate) fn with_response_type(
    options: RequestOptions,
    response_type: ResponseType,
) -> RequestOptions {
    match options.response_type {
        Some(_) => options,
        None => options.response_type(response_type),
    }
}
