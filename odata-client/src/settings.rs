//! Client configuration with builder pattern
//!
//! Settings drive header negotiation (Accept, Prefer, ETag), the long query
//! rewrite and a few rendering switches. They deserialize from TOML with
//! sane defaults for anything left out.

use crate::constants::DEFAULT_VERSION;
use crate::error::ODataResult;
use crate::query::QueryOptionName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Global configuration for an OData service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ODataSettings {
    /// Service root, always ending with a slash once normalized
    pub service_root_url: String,
    /// Protocol version announced by the service
    pub version: String,
    pub with_credentials: bool,
    pub fetch_policy: FetchPolicy,
    pub accept: Option<AcceptSettings>,
    pub etag: EtagSettings,
    pub prefer: Option<PreferSettings>,
    /// Options moved into a `$query` body when present on a GET
    pub body_query_options: Vec<QueryOptionName>,
    /// Only rewrite into `$query` once the URL is longer than this
    pub body_query_max_url_length: Option<usize>,
    /// Render `Fn` instead of `Fn()` for functions without parameters
    pub non_parenthesis_for_empty_parameter_function: bool,
    /// Render enum members as bare names instead of `NS.Type'Member'`
    pub string_as_enum: bool,
    /// Headers added to every request
    pub headers: BTreeMap<String, String>,
    /// Query parameters added to every request
    pub params: BTreeMap<String, String>,
}

/// Cache interaction for GET requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    CacheFirst,
    CacheAndNetwork,
    NetworkOnly,
    NoCache,
    CacheOnly,
}

/// `odata.metadata` level requested through the Accept header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataLevel {
    None,
    Minimal,
    Full,
}

impl MetadataLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataLevel::None => "none",
            MetadataLevel::Minimal => "minimal",
            MetadataLevel::Full => "full",
        }
    }
}

/// Accept header parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptSettings {
    pub metadata: Option<MetadataLevel>,
    pub ieee754_compatible: Option<bool>,
    pub streaming: Option<bool>,
    pub exponential_decimals: Option<bool>,
}

/// Which conditional headers an entity tag produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtagSettings {
    /// Send `If-Match` on PUT, PATCH and DELETE
    pub if_match: bool,
    /// Send `If-None-Match` on GET
    pub if_none_match: bool,
}

/// `return=` preference for mutating requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferReturn {
    Representation,
    Minimal,
}

impl PreferReturn {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferReturn::Representation => "representation",
            PreferReturn::Minimal => "minimal",
        }
    }
}

/// Prefer header parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferSettings {
    #[serde(rename = "return")]
    pub return_: Option<PreferReturn>,
    pub max_page_size: Option<u32>,
    pub include_annotations: Option<String>,
    pub continue_on_error: bool,
}

impl Default for EtagSettings {
    fn default() -> Self {
        Self {
            if_match: true,
            if_none_match: false,
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        FetchPolicy::NetworkOnly
    }
}

impl Default for ODataSettings {
    fn default() -> Self {
        Self {
            service_root_url: String::new(),
            version: DEFAULT_VERSION.to_string(),
            with_credentials: false,
            fetch_policy: FetchPolicy::default(),
            accept: None,
            etag: EtagSettings::default(),
            prefer: None,
            body_query_options: Vec::new(),
            body_query_max_url_length: None,
            non_parenthesis_for_empty_parameter_function: false,
            string_as_enum: false,
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
        }
    }
}

impl ODataSettings {
    /// Create a new builder for ODataSettings
    pub fn builder() -> ODataSettingsBuilder {
        ODataSettingsBuilder::new()
    }

    /// Plain settings for a service root, no negotiation headers
    pub fn minimal(service_root_url: impl Into<String>) -> Self {
        Self::builder().service_root_url(service_root_url).build()
    }

    /// Full metadata, IEEE754 numbers and long filters sent as `$query`
    pub fn full(service_root_url: impl Into<String>) -> Self {
        Self::builder()
            .service_root_url(service_root_url)
            .accept(AcceptSettings {
                metadata: Some(MetadataLevel::Full),
                ieee754_compatible: Some(true),
                streaming: None,
                exponential_decimals: None,
            })
            .prefer(PreferSettings {
                return_: Some(PreferReturn::Representation),
                ..Default::default()
            })
            .body_query_options(vec![QueryOptionName::Filter])
            .build()
    }

    /// Settings for a version 2 service (`d` envelopes)
    pub fn v2(service_root_url: impl Into<String>) -> Self {
        Self::builder()
            .service_root_url(service_root_url)
            .version(crate::constants::VERSION_2_0)
            .build()
    }

    /// Load settings from a TOML document
    pub fn from_toml_str(content: &str) -> ODataResult<Self> {
        let mut settings: ODataSettings = toml::from_str(content)?;
        settings.normalize();
        Ok(settings)
    }

    /// Load settings from a TOML file on disk
    pub fn from_toml_file(path: impl AsRef<Path>) -> ODataResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Service root with a guaranteed trailing slash
    pub fn normalize(&mut self) {
        if !self.service_root_url.is_empty() && !self.service_root_url.ends_with('/') {
            self.service_root_url.push('/');
        }
    }

    /// Whether the service speaks the version 2 wire format
    pub fn is_v2(&self) -> bool {
        self.version == crate::constants::VERSION_2_0
    }
}

/// Builder for ODataSettings
#[derive(Debug, Default)]
pub struct ODataSettingsBuilder {
    settings: ODataSettings,
}

impl ODataSettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: ODataSettings::default(),
        }
    }

    pub fn service_root_url(mut self, url: impl Into<String>) -> Self {
        self.settings.service_root_url = url.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.settings.version = version.into();
        self
    }

    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.settings.with_credentials = enabled;
        self
    }

    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.settings.fetch_policy = policy;
        self
    }

    pub fn accept(mut self, accept: AcceptSettings) -> Self {
        self.settings.accept = Some(accept);
        self
    }

    pub fn etag(mut self, etag: EtagSettings) -> Self {
        self.settings.etag = etag;
        self
    }

    pub fn prefer(mut self, prefer: PreferSettings) -> Self {
        self.settings.prefer = Some(prefer);
        self
    }

    pub fn body_query_options(mut self, names: Vec<QueryOptionName>) -> Self {
        self.settings.body_query_options = names;
        self
    }

    pub fn body_query_max_url_length(mut self, length: usize) -> Self {
        self.settings.body_query_max_url_length = Some(length);
        self
    }

    pub fn non_parenthesis_for_empty_parameter_function(mut self, enabled: bool) -> Self {
        self.settings.non_parenthesis_for_empty_parameter_function = enabled;
        self
    }

    pub fn string_as_enum(mut self, enabled: bool) -> Self {
        self.settings.string_as_enum = enabled;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.params.insert(name.into(), value.into());
        self
    }

    pub fn build(mut self) -> ODataSettings {
        self.settings.normalize();
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ODataSettings::default();
        assert_eq!(settings.version, "4.0");
        assert!(settings.etag.if_match);
        assert!(!settings.etag.if_none_match);
        assert_eq!(settings.fetch_policy, FetchPolicy::NetworkOnly);
        assert!(settings.body_query_options.is_empty());
    }

    #[test]
    fn test_builder_normalizes_root() {
        let settings = ODataSettings::builder()
            .service_root_url("https://services.odata.org/TripPinRESTierService")
            .header("X-Custom", "1")
            .build();
        assert_eq!(
            settings.service_root_url,
            "https://services.odata.org/TripPinRESTierService/"
        );
        assert_eq!(
            settings.headers.get("X-Custom").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_load_from_toml() {
        let content = r#"
            service_root_url = "http://localhost/odata"
            fetch_policy = "cache-first"
            body_query_options = ["filter", "orderby"]

            [accept]
            metadata = "minimal"
            ieee754_compatible = true

            [prefer]
            return = "representation"
            max_page_size = 50
        "#;
        let settings = ODataSettings::from_toml_str(content).unwrap();
        assert_eq!(settings.service_root_url, "http://localhost/odata/");
        assert_eq!(settings.fetch_policy, FetchPolicy::CacheFirst);
        assert_eq!(
            settings.body_query_options,
            vec![QueryOptionName::Filter, QueryOptionName::OrderBy]
        );
        let accept = settings.accept.unwrap();
        assert_eq!(accept.metadata, Some(MetadataLevel::Minimal));
        assert_eq!(accept.ieee754_compatible, Some(true));
        let prefer = settings.prefer.unwrap();
        assert_eq!(prefer.return_, Some(PreferReturn::Representation));
        assert_eq!(prefer.max_page_size, Some(50));
        assert!(settings.etag.if_match);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ODataSettings::from_toml_str("fetch_policy = 3").unwrap_err();
        assert!(matches!(err, crate::error::ODataError::Config(_)));
    }

    #[test]
    fn test_presets() {
        let full = ODataSettings::full("http://x/");
        assert_eq!(full.body_query_options, vec![QueryOptionName::Filter]);
        assert!(ODataSettings::v2("http://x").is_v2());
        assert!(!ODataSettings::minimal("http://x").is_v2());
    }
}
