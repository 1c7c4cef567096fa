//! Media stream of a media entity (`Photos(1)/$value`)

use super::{Resource, with_response_type};
use crate::api::ODataCall;
use crate::request::{RequestBody, RequestOptions, ResponseType};

#[derive(Debug, Clone, PartialEq)]
pub struct MediaResource {
    pub(crate) resource: Resource,
}

impl MediaResource {
    pub fn factory(parent: &Resource) -> Self {
        Self {
            resource: parent.value_segment(),
        }
    }

    pub fn fetch(&self, options: RequestOptions) -> ODataCall<Vec<u8>> {
        let options = with_response_type(options, ResponseType::Bytes);
        self.resource.get(options).map(|response| response.body)
    }

    /// Replace the stream; pass the media etag to guard the write
    pub fn upload(
        &self,
        data: Vec<u8>,
        content_type: impl Into<String>,
        options: RequestOptions,
    ) -> ODataCall<()> {
        let body = RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        };
        let options = with_response_type(options, ResponseType::None);
        self.resource.put(Some(body), options).map(|_| ())
    }
}
