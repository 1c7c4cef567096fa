//! Translation of a resource call into an HTTP request
//!
//! Headers (conditional, Accept, Prefer), the parameters each verb
//! forwards and the `$query` rewrite for long GET requests are all decided
//! here, once, when the request is built.

use crate::constants::*;
use crate::query::{Params, QueryOptionName};
use crate::settings::{FetchPolicy, ODataSettings, PreferReturn};
use crate::transport::{Headers, Method, TransportRequest};
use serde_json::Value;

/// How the response body is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Entity,
    Entities,
    Property,
    /// Raw text such as `$count` or a primitive `$value`
    Value,
    Bytes,
    None,
}

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Text(String),
    Bytes { content_type: String, data: Vec<u8> },
}

/// Per-call request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub etag: Option<String>,
    pub headers: Headers,
    pub params: Params,
    pub response_type: Option<ResponseType>,
    pub fetch_policy: Option<FetchPolicy>,
    pub prefer_return: Option<PreferReturn>,
    pub with_count: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn etag_opt(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = Some(policy);
        self
    }

    pub fn prefer_return(mut self, prefer: PreferReturn) -> Self {
        self.prefer_return = Some(prefer);
        self
    }

    pub fn with_count(mut self) -> Self {
        self.with_count = true;
        self
    }
}

/// Options a GET on a single entity never forwards
const ENTITY_STRIPPED: [&str; 5] = ["$filter", "$orderby", "$count", "$skip", "$top"];

/// A request ready for a requester, relative to the service root
#[derive(Debug, Clone, PartialEq)]
pub struct ODataRequest {
    pub method: Method,
    pub path: String,
    pub params: Params,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    pub response_type: ResponseType,
    pub fetch_policy: FetchPolicy,
    pub service_root_url: String,
    pub with_credentials: bool,
}

impl ODataRequest {
    /// Build the final request for a rendered resource
    pub fn build(
        method: Method,
        path: String,
        resource_params: Params,
        body: Option<RequestBody>,
        options: RequestOptions,
        settings: &ODataSettings,
    ) -> Self {
        let response_type = options.response_type.unwrap_or(ResponseType::Entity);
        let headers = Self::build_headers(method, &body, &options, settings);
        let params = Self::build_params(method, resource_params, response_type, &options, settings);

        let mut request = Self {
            method,
            path,
            params,
            headers,
            body,
            response_type,
            fetch_policy: options.fetch_policy.unwrap_or(settings.fetch_policy),
            service_root_url: settings.service_root_url.clone(),
            with_credentials: settings.with_credentials,
        };
        request.apply_body_query(settings);
        request
    }

    fn build_headers(
        method: Method,
        body: &Option<RequestBody>,
        options: &RequestOptions,
        settings: &ODataSettings,
    ) -> Headers {
        let mut headers: Headers = settings.headers.iter().collect();

        if let Some(etag) = &options.etag {
            match method {
                Method::Put | Method::Patch | Method::Delete if settings.etag.if_match => {
                    headers.insert(IF_MATCH, etag.as_str());
                }
                Method::Get if settings.etag.if_none_match => {
                    headers.insert(IF_NONE_MATCH, etag.as_str());
                }
                _ => {}
            }
        }

        headers.insert(ACCEPT, Self::accept(settings));

        match body {
            Some(RequestBody::Json(_)) => {
                headers.insert(CONTENT_TYPE, Self::json_content_type(settings))
            }
            Some(RequestBody::Text(_)) => headers.insert(CONTENT_TYPE, TEXT_PLAIN),
            Some(RequestBody::Bytes { content_type, .. }) => {
                headers.insert(CONTENT_TYPE, content_type.as_str())
            }
            None => {}
        }

        if let Some(prefer) = Self::prefer(method, options, settings) {
            headers.insert(PREFER, prefer);
        }

        headers.extend(options.headers.iter());
        headers
    }

    fn json_content_type(settings: &ODataSettings) -> String {
        match settings.accept.as_ref().and_then(|a| a.ieee754_compatible) {
            Some(true) => format!("{};IEEE754Compatible=true", APPLICATION_JSON),
            _ => APPLICATION_JSON.to_string(),
        }
    }

    /// `application/json` with negotiated parameters, then text, then anything
    fn accept(settings: &ODataSettings) -> String {
        let mut json = APPLICATION_JSON.to_string();
        if let Some(accept) = &settings.accept {
            if let Some(metadata) = accept.metadata {
                json.push_str(&format!(";odata.metadata={}", metadata.as_str()));
            }
            if let Some(ieee) = accept.ieee754_compatible {
                json.push_str(&format!(";IEEE754Compatible={}", ieee));
            }
            if let Some(streaming) = accept.streaming {
                json.push_str(&format!(";odata.streaming={}", streaming));
            }
            if let Some(decimals) = accept.exponential_decimals {
                json.push_str(&format!(";ExponentialDecimals={}", decimals));
            }
        }
        [json.as_str(), TEXT_PLAIN, ANY].join(", ")
    }

    fn prefer(
        method: Method,
        options: &RequestOptions,
        settings: &ODataSettings,
    ) -> Option<String> {
        let defaults = settings.prefer.clone().unwrap_or_default();
        let mut prefer = Vec::new();
        let return_ = options.prefer_return.or(defaults.return_);
        if let (Some(return_), true) = (return_, method.has_body()) {
            prefer.push(format!("return={}", return_.as_str()));
        }
        if method == Method::Get {
            if let Some(max) = defaults.max_page_size {
                prefer.push(format!("odata.maxpagesize={}", max));
            }
            if let Some(annotations) = &defaults.include_annotations {
                prefer.push(format!("odata.include-annotations=\"{}\"", annotations));
            }
        }
        if method == Method::Post && defaults.continue_on_error {
            prefer.push("odata.continue-on-error".to_string());
        }
        (!prefer.is_empty()).then(|| prefer.join(","))
    }

    fn build_params(
        method: Method,
        resource_params: Params,
        response_type: ResponseType,
        options: &RequestOptions,
        settings: &ODataSettings,
    ) -> Params {
        let forwarded: &[&str] = match method {
            Method::Get => &[],
            Method::Post => &["$select", "$expand"],
            Method::Put | Method::Patch => &["$select"],
            Method::Delete => &[],
        };
        let mut params: Params = match method {
            Method::Get if response_type == ResponseType::Entity => {
                resource_params.without(&ENTITY_STRIPPED)
            }
            Method::Get => resource_params,
            Method::Delete => resource_params
                .iter()
                .filter(|(name, _)| name.starts_with('@'))
                .collect(),
            _ => resource_params
                .iter()
                .filter(|(name, _)| forwarded.contains(name) || name.starts_with('@'))
                .collect(),
        };
        if options.with_count && method == Method::Get {
            params.insert(QueryOptionName::Count.param(), "true");
        }
        params.extend(settings.params.iter());
        params.extend(options.params.iter());
        params
    }

    /// Move body-eligible options of a long GET into `POST path/$query`
    fn apply_body_query(&mut self, settings: &ODataSettings) {
        if self.method != Method::Get || settings.body_query_options.is_empty() {
            return;
        }
        let names: Vec<String> = settings
            .body_query_options
            .iter()
            .map(|n| n.param())
            .collect();
        if !names.iter().any(|n| self.params.contains(n)) {
            return;
        }
        if let Some(max) = settings.body_query_max_url_length
            && self.url().len() <= max
        {
            return;
        }
        let (rest, picked) = self.params.split(&names);
        log::debug!("rewriting GET {} into a $query request", self.path);
        self.method = Method::Post;
        self.path = format!("{}/{}", self.path.trim_end_matches('/'), QUERY);
        self.params = rest;
        self.body = Some(RequestBody::Text(picked.to_query_string()));
        self.headers.insert(CONTENT_TYPE, TEXT_PLAIN);
    }

    /// Absolute URL without the query string
    pub fn url_without_params(&self) -> String {
        if self.path.starts_with("http://") || self.path.starts_with("https://") {
            self.path.clone()
        } else {
            format!("{}{}", self.service_root_url, self.path)
        }
    }

    /// Absolute URL with the query string
    pub fn url(&self) -> String {
        let base = self.url_without_params();
        if self.params.is_empty() {
            base
        } else {
            let separator = if base.contains('?') { '&' } else { '?' };
            format!("{}{}{}", base, separator, self.params.to_query_string())
        }
    }

    /// Path and query relative to the service root, as used in batch parts
    pub fn path_with_params(&self) -> String {
        if self.params.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.params.to_query_string())
        }
    }

    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        match self.body.as_ref()? {
            RequestBody::Json(value) => Some(value.to_string().into_bytes()),
            RequestBody::Text(text) => Some(text.clone().into_bytes()),
            RequestBody::Bytes { data, .. } => Some(data.clone()),
        }
    }

    /// Key identifying a cacheable GET
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url())
    }

    pub fn to_transport(&self) -> TransportRequest {
        TransportRequest {
            method: self.method,
            url: self.url(),
            headers: self.headers.clone(),
            body: self.body_bytes(),
            with_credentials: self.with_credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{AcceptSettings, EtagSettings, MetadataLevel, PreferSettings};

    fn settings() -> ODataSettings {
        ODataSettings::minimal("https://services.example.com/trip/")
    }

    fn params() -> Params {
        [
            ("$select", "Name"),
            ("$filter", "Age gt 3"),
            ("$top", "5"),
            ("$expand", "Trips"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_get_forwards_every_param() {
        let request = ODataRequest::build(
            Method::Get,
            "People".into(),
            params(),
            None,
            RequestOptions::new().response_type(ResponseType::Entities),
            &settings(),
        );
        assert_eq!(request.params.len(), 4);
        assert_eq!(
            request.url(),
            "https://services.example.com/trip/People?$select=Name&$filter=Age%20gt%203&$top=5&$expand=Trips"
        );
    }

    #[test]
    fn test_entity_get_strips_collection_options() {
        let request = ODataRequest::build(
            Method::Get,
            "People('a')".into(),
            params(),
            None,
            RequestOptions::new(),
            &settings(),
        );
        assert_eq!(
            request.params.names().collect::<Vec<_>>(),
            vec!["$select", "$expand"]
        );
    }

    #[test]
    fn test_mutations_forward_select_and_expand() {
        let post = ODataRequest::build(
            Method::Post,
            "People".into(),
            params(),
            None,
            RequestOptions::new(),
            &settings(),
        );
        assert_eq!(
            post.params.names().collect::<Vec<_>>(),
            vec!["$select", "$expand"]
        );
        let patch = ODataRequest::build(
            Method::Patch,
            "People('a')".into(),
            params(),
            None,
            RequestOptions::new(),
            &settings(),
        );
        assert_eq!(patch.params.names().collect::<Vec<_>>(), vec!["$select"]);
    }

    #[test]
    fn test_etag_headers_follow_verb() {
        let mut settings = settings();
        settings.etag = EtagSettings {
            if_match: true,
            if_none_match: true,
        };
        let options = RequestOptions::new().etag("W/\"1\"");
        let put = ODataRequest::build(
            Method::Put,
            "People('a')".into(),
            Params::new(),
            None,
            options.clone(),
            &settings,
        );
        assert_eq!(put.headers.get(IF_MATCH), Some("W/\"1\""));
        assert!(!put.headers.contains(IF_NONE_MATCH));
        let get = ODataRequest::build(
            Method::Get,
            "People('a')".into(),
            Params::new(),
            None,
            options,
            &settings,
        );
        assert_eq!(get.headers.get(IF_NONE_MATCH), Some("W/\"1\""));
    }

    #[test]
    fn test_accept_and_prefer() {
        let mut settings = settings();
        settings.accept = Some(AcceptSettings {
            metadata: Some(MetadataLevel::Full),
            ieee754_compatible: Some(true),
            ..AcceptSettings::default()
        });
        settings.prefer = Some(PreferSettings {
            return_: Some(PreferReturn::Representation),
            max_page_size: Some(50),
            ..PreferSettings::default()
        });
        let get = ODataRequest::build(
            Method::Get,
            "People".into(),
            Params::new(),
            None,
            RequestOptions::new(),
            &settings,
        );
        assert_eq!(
            get.headers.get(ACCEPT),
            Some("application/json;odata.metadata=full;IEEE754Compatible=true, text/plain, */*")
        );
        assert_eq!(get.headers.get(PREFER), Some("odata.maxpagesize=50"));
        let post = ODataRequest::build(
            Method::Post,
            "People".into(),
            Params::new(),
            Some(RequestBody::Json(serde_json::json!({}))),
            RequestOptions::new(),
            &settings,
        );
        assert_eq!(post.headers.get(PREFER), Some("return=representation"));
        assert_eq!(
            post.headers.get(CONTENT_TYPE),
            Some("application/json;IEEE754Compatible=true")
        );
    }

    #[test]
    fn test_long_query_moves_into_body() {
        let mut settings = settings();
        settings.body_query_options = vec![QueryOptionName::Filter];
        let request = ODataRequest::build(
            Method::Get,
            "People".into(),
            params(),
            None,
            RequestOptions::new().response_type(ResponseType::Entities),
            &settings,
        );
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "People/$query");
        assert_eq!(request.headers.get(CONTENT_TYPE), Some(TEXT_PLAIN));
        assert_eq!(
            request.body,
            Some(RequestBody::Text("$filter=Age%20gt%203".into()))
        );
        assert!(!request.params.contains("$filter"));
        assert!(request.params.contains("$select"));
    }

    #[test]
    fn test_long_query_respects_threshold() {
        let mut settings = settings();
        settings.body_query_options = vec![QueryOptionName::Filter];
        settings.body_query_max_url_length = Some(2048);
        let request = ODataRequest::build(
            Method::Get,
            "People".into(),
            params(),
            None,
            RequestOptions::new().response_type(ResponseType::Entities),
            &settings,
        );
        assert_eq!(request.method, Method::Get);
        assert!(request.params.contains("$filter"));
    }

    #[test]
    fn test_settings_headers_and_params_merge() {
        let settings = ODataSettings::builder()
            .service_root_url("https://services.example.com/trip")
            .header("X-Tenant", "a")
            .param("sap-client", "100")
            .build();
        let request = ODataRequest::build(
            Method::Delete,
            "People('a')".into(),
            params(),
            None,
            RequestOptions::new(),
            &settings,
        );
        assert_eq!(request.headers.get("x-tenant"), Some("a"));
        assert_eq!(
            request.url(),
            "https://services.example.com/trip/People('a')?sap-client=100"
        );
    }
}
