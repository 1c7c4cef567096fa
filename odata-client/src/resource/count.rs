//! `$count` resource

use super::{Resource, with_response_type};
use crate::api::ODataCall;
use crate::constants::COUNT;
use crate::path::SegmentKind;
use crate::query::QueryOptionName;
use crate::request::{RequestOptions, ResponseType};

#[derive(Debug, Clone, PartialEq)]
pub struct CountResource {
    pub(crate) resource: Resource,
}

impl CountResource {
    /// Count of `parent`; only `$filter` and `$search` still apply
    pub fn factory(parent: &Resource) -> Self {
        let mut resource = parent.with_fixed(SegmentKind::Count, COUNT);
        resource
            .query_mut()
            .keep(&[QueryOptionName::Filter, QueryOptionName::Search]);
        Self { resource }
    }

    pub fn fetch(&self, options: RequestOptions) -> ODataCall<u64> {
        let options = with_response_type(options, ResponseType::Value);
        self.resource
            .get(options)
            .and_then(|response| response.count())
    }
}
