//! Client entry point and request dispatch
//!
//! [`ODataApi`] bundles settings, schema, transport and the [`Requester`]
//! every resource sends through. Batches swap in their own requester by
//! cloning the api, so the shared instance is never mutated.

use crate::error::{ODataError, ODataResult};
use crate::request::ODataRequest;
use crate::resource::{
    ActionResource, BatchResource, EntityResource, EntitySetResource, FunctionResource,
    MetadataResource, SingletonResource,
};
use crate::schema::{ParserOptions, Schema, SchemaRegistry};
use crate::settings::{FetchPolicy, ODataSettings};
use crate::transport::{Method, ReqwestTransport, Transport, TransportResponse};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Named future returned by resource verbs
///
/// Nothing is sent until the call is polled (batched calls are queued
/// when created). Dropping it cancels the request.
#[must_use = "calls do nothing unless awaited"]
pub struct ODataCall<T> {
    inner: BoxFuture<'static, ODataResult<T>>,
}

impl<T: Send + 'static> ODataCall<T> {
    pub fn new(future: impl Future<Output = ODataResult<T>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(future),
        }
    }

    /// A call that fails without touching the transport
    pub fn failed(error: ODataError) -> Self {
        Self::new(async move { Err(error) })
    }

    pub fn map<U, F>(self, f: F) -> ODataCall<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        ODataCall::new(async move { self.inner.await.map(f) })
    }

    pub fn and_then<U, F>(self, f: F) -> ODataCall<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> ODataResult<U> + Send + 'static,
    {
        ODataCall::new(async move { self.inner.await.and_then(f) })
    }
}

impl<T> Future for ODataCall<T> {
    type Output = ODataResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.as_mut().poll(cx)
    }
}

/// Dispatches built requests
pub trait Requester: Send + Sync {
    /// Called synchronously when a resource verb is invoked
    fn request(&self, request: ODataRequest) -> BoxFuture<'static, ODataResult<TransportResponse>>;
}

/// Response cache consulted for GET requests
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<TransportResponse>;

    async fn put(&self, key: &str, response: &TransportResponse);

    /// Drop entries a mutation may have made stale
    async fn invalidate(&self, request: &ODataRequest);
}

/// Sends through the transport, applying the fetch policy
pub struct DirectRequester {
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn Cache>>,
}

impl DirectRequester {
    pub fn new(transport: Arc<dyn Transport>, cache: Option<Arc<dyn Cache>>) -> Self {
        Self { transport, cache }
    }

    async fn network(
        transport: &dyn Transport,
        request: &ODataRequest,
    ) -> ODataResult<TransportResponse> {
        log::debug!("{} {}", request.method, request.url());
        Ok(transport.send(request.to_transport()).await?)
    }

    async fn dispatch(
        transport: Arc<dyn Transport>,
        cache: Option<Arc<dyn Cache>>,
        request: ODataRequest,
    ) -> ODataResult<TransportResponse> {
        let Some(cache) = cache else {
            return Self::network(transport.as_ref(), &request).await;
        };
        if request.method != Method::Get {
            let response = Self::network(transport.as_ref(), &request).await?;
            cache.invalidate(&request).await;
            return Ok(response);
        }

        let key = request.cache_key();
        match request.fetch_policy {
            FetchPolicy::NoCache => Self::network(transport.as_ref(), &request).await,
            FetchPolicy::CacheOnly => cache.get(&key).await.ok_or_else(|| {
                ODataError::Transport(anyhow::anyhow!("no cached response for {}", key))
            }),
            FetchPolicy::CacheFirst => {
                if let Some(hit) = cache.get(&key).await {
                    log::trace!("cache hit {}", key);
                    return Ok(hit);
                }
                let response = Self::network(transport.as_ref(), &request).await?;
                cache.put(&key, &response).await;
                Ok(response)
            }
            FetchPolicy::NetworkOnly => {
                let response = Self::network(transport.as_ref(), &request).await?;
                cache.put(&key, &response).await;
                Ok(response)
            }
            // A single-valued call cannot emit twice: the network wins and
            // the cache only covers a failed round trip
            FetchPolicy::CacheAndNetwork => {
                let network = Self::network(transport.as_ref(), &request).await;
                match network {
                    Ok(response) => {
                        cache.put(&key, &response).await;
                        Ok(response)
                    }
                    Err(err) => match cache.get(&key).await {
                        Some(hit) => {
                            log::warn!("serving cached response for {} after {}", key, err);
                            Ok(hit)
                        }
                        None => Err(err),
                    },
                }
            }
        }
    }
}

impl Requester for DirectRequester {
    fn request(&self, request: ODataRequest) -> BoxFuture<'static, ODataResult<TransportResponse>> {
        let transport = self.transport.clone();
        let cache = self.cache.clone();
        Box::pin(Self::dispatch(transport, cache, request))
    }
}

struct ApiInner {
    settings: ODataSettings,
    schema: Arc<dyn Schema>,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn Cache>>,
    requester: Arc<dyn Requester>,
}

/// Handle on one OData service; cheap to clone
#[derive(Clone)]
pub struct ODataApi {
    inner: Arc<ApiInner>,
}

impl std::fmt::Debug for ODataApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ODataApi")
            .field("service_root_url", &self.inner.settings.service_root_url)
            .finish()
    }
}

impl ODataApi {
    pub fn builder(settings: ODataSettings) -> ODataApiBuilder {
        ODataApiBuilder::new(settings)
    }

    /// Api with the bundled `reqwest` transport
    pub fn new(settings: ODataSettings, schema: impl Schema + 'static) -> Self {
        Self::builder(settings).schema(schema).build()
    }

    pub fn settings(&self) -> &ODataSettings {
        &self.inner.settings
    }

    pub fn schema(&self) -> Arc<dyn Schema> {
        self.inner.schema.clone()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.inner.transport.clone()
    }

    pub fn requester(&self) -> Arc<dyn Requester> {
        self.inner.requester.clone()
    }

    pub fn service_root_url(&self) -> &str {
        &self.inner.settings.service_root_url
    }

    /// Parser switches derived from the settings
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            ieee754_compatible: self
                .inner
                .settings
                .accept
                .as_ref()
                .and_then(|a| a.ieee754_compatible)
                .unwrap_or(false),
            string_as_enum: self.inner.settings.string_as_enum,
        }
    }

    /// Same service, different dispatcher
    pub fn with_requester(&self, requester: Arc<dyn Requester>) -> Self {
        Self {
            inner: Arc::new(ApiInner {
                settings: self.inner.settings.clone(),
                schema: self.inner.schema.clone(),
                transport: self.inner.transport.clone(),
                cache: self.inner.cache.clone(),
                requester,
            }),
        }
    }

    /// Whether two handles share the same requester
    pub fn same_requester(&self, other: &ODataApi) -> bool {
        Arc::ptr_eq(&self.inner.requester, &other.inner.requester)
    }

    /// Send a built request through the current requester
    pub fn request(&self, request: ODataRequest) -> ODataCall<TransportResponse> {
        ODataCall::new(self.inner.requester.request(request))
    }

    pub fn entity_set(&self, name: &str) -> EntitySetResource {
        EntitySetResource::factory(self.clone(), name)
    }

    pub fn singleton(&self, name: &str) -> SingletonResource {
        EntityResource::singleton(self.clone(), name)
    }

    /// Unbound function (function import)
    pub fn function(&self, name: &str) -> FunctionResource {
        FunctionResource::unbound(self.clone(), name)
    }

    /// Unbound action (action import)
    pub fn action(&self, name: &str) -> ActionResource {
        ActionResource::unbound(self.clone(), name)
    }

    pub fn batch(&self) -> BatchResource {
        BatchResource::factory(self.clone())
    }

    pub fn metadata(&self) -> MetadataResource {
        MetadataResource::factory(self.clone())
    }
}

/// Builder for [`ODataApi`]
pub struct ODataApiBuilder {
    settings: ODataSettings,
    schema: Option<Arc<dyn Schema>>,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn Cache>>,
}

impl ODataApiBuilder {
    pub fn new(settings: ODataSettings) -> Self {
        Self {
            settings,
            schema: None,
            transport: None,
            cache: None,
        }
    }

    pub fn schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn shared_schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> ODataApi {
        let mut settings = self.settings;
        settings.normalize();
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let schema = self
            .schema
            .unwrap_or_else(|| Arc::new(SchemaRegistry::default()));
        let requester: Arc<dyn Requester> =
            Arc::new(DirectRequester::new(transport.clone(), self.cache.clone()));
        log::debug!("odata api for {}", settings.service_root_url);
        ODataApi {
            inner: Arc::new(ApiInner {
                settings,
                schema,
                transport,
                cache: self.cache,
                requester,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestOptions;
    use crate::testing::{MockTransport, api_with};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryCache {
        entries: Mutex<HashMap<String, TransportResponse>>,
        invalidations: Mutex<usize>,
    }

    #[async_trait]
    impl Cache for MemoryCache {
        async fn get(&self, key: &str) -> Option<TransportResponse> {
            self.entries.lock().unwrap().get(key).cloned()
        }

        async fn put(&self, key: &str, response: &TransportResponse) {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), response.clone());
        }

        async fn invalidate(&self, _request: &ODataRequest) {
            *self.invalidations.lock().unwrap() += 1;
            self.entries.lock().unwrap().clear();
        }
    }

    fn get(api: &ODataApi, policy: FetchPolicy) -> ODataRequest {
        ODataRequest::build(
            Method::Get,
            "People".into(),
            Default::default(),
            None,
            RequestOptions::new().fetch_policy(policy),
            api.settings(),
        )
    }

    #[tokio::test]
    async fn test_calls_are_lazy() {
        let transport = MockTransport::new();
        let api = api_with(transport.clone());
        let call = api.request(get(&api, FetchPolicy::NetworkOnly));
        assert_eq!(transport.requests().len(), 0);
        drop(call);
        assert_eq!(transport.requests().len(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_skips_network_on_hit() {
        let transport = MockTransport::new();
        transport.respond_json(200, json!({"value": []}));
        let cache = Arc::new(MemoryCache::default());
        let api = ODataApi::builder(ODataSettings::minimal("https://host/svc"))
            .transport(Arc::new(transport.clone()))
            .cache(cache.clone())
            .build();

        for _ in 0..2 {
            let call = api.request(get(&api, FetchPolicy::CacheFirst));
            call.await.unwrap();
        }
        assert_eq!(transport.requests().len(), 1);

        let missing = api.request(get(&api, FetchPolicy::CacheOnly).clone()).await;
        assert!(missing.is_ok());
    }

    #[tokio::test]
    async fn test_mutations_invalidate_cache() {
        let transport = MockTransport::new();
        let cache = Arc::new(MemoryCache::default());
        let api = ODataApi::builder(ODataSettings::minimal("https://host/svc"))
            .transport(Arc::new(transport.clone()))
            .cache(cache.clone())
            .build();
        let delete = ODataRequest::build(
            Method::Delete,
            "People('a')".into(),
            Default::default(),
            None,
            RequestOptions::new(),
            api.settings(),
        );
        api.request(delete).await.unwrap();
        assert_eq!(*cache.invalidations.lock().unwrap(), 1);
        let miss = api.request(get(&api, FetchPolicy::CacheOnly)).await;
        assert!(matches!(miss, Err(ODataError::Transport(_))));
    }

    #[tokio::test]
    async fn test_call_combinators() {
        let value = ODataCall::new(async { Ok(2) })
            .map(|v| v * 2)
            .and_then(|v| Ok(v + 1))
            .await
            .unwrap();
        assert_eq!(value, 5);
        let failed: ODataResult<u8> = ODataCall::failed(ODataError::Cancelled).await;
        assert!(matches!(failed, Err(ODataError::Cancelled)));
    }
}
