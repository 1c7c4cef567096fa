//! `$metadata` document

use super::{Resource, with_response_type};
use crate::api::{ODataApi, ODataCall};
use crate::constants::METADATA;
use crate::path::{PathSegments, SegmentKind};
use crate::query::QueryOptions;
use crate::request::{RequestOptions, ResponseType};
use crate::schema::{SchemaRegistry, parse_metadata};

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataResource {
    pub(crate) resource: Resource,
}

impl MetadataResource {
    pub fn factory(api: ODataApi) -> Self {
        let mut segments = PathSegments::new();
        segments.add(SegmentKind::Metadata, METADATA);
        Self {
            resource: Resource::new(api, segments, QueryOptions::new()),
        }
    }

    /// Raw CSDL XML
    pub fn fetch(&self, options: RequestOptions) -> ODataCall<String> {
        let options = with_response_type(options, ResponseType::Value)
            .header(crate::constants::ACCEPT, "application/xml");
        self.resource.get(options).map(|response| response.text())
    }

    /// Fetch and read the document into a registry
    pub fn fetch_schema(&self, options: RequestOptions) -> ODataCall<SchemaRegistry> {
        self.fetch(options).and_then(|xml| parse_metadata(&xml))
    }
}
