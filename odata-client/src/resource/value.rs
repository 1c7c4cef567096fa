//! `$value` of a primitive property

use super::{Resource, with_response_type};
use crate::api::ODataCall;
use crate::request::{RequestBody, RequestOptions, ResponseType};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ValueResource {
    pub(crate) resource: Resource,
}

impl ValueResource {
    pub fn factory(parent: &Resource) -> Self {
        Self {
            resource: parent.value_segment(),
        }
    }

    /// Text body converted with the property type
    pub fn fetch(&self, options: RequestOptions) -> ODataCall<Value> {
        let options = with_response_type(options, ResponseType::Value);
        self.resource.get(options).map(|response| response.value())
    }

    /// Replace the raw value with a plain text body
    pub fn update(&self, value: impl Into<String>, options: RequestOptions) -> ODataCall<()> {
        let options = with_response_type(options, ResponseType::None);
        self.resource
            .put(Some(RequestBody::Text(value.into())), options)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, api_with};
    use serde_json::json;

    #[tokio::test]
    async fn test_value_parsed_with_property_type() {
        let transport = MockTransport::new();
        transport.respond(200, &[("Content-Type", "text/plain")], "42");
        let api = api_with(transport.clone());
        let value = api.entity_set("People").key("a").property("Age").value();
        assert_eq!(value.fetch(RequestOptions::new()).await.unwrap(), json!(42));
        assert!(transport.requests()[0].url.ends_with("People('a')/Age/$value"));
    }

    #[tokio::test]
    async fn test_update_sends_text() {
        let transport = MockTransport::new();
        transport.respond(204, &[], "");
        let api = api_with(transport.clone());
        api.entity_set("People")
            .key("a")
            .property("FirstName")
            .value()
            .update("Alfred", RequestOptions::new())
            .await
            .unwrap();
        let request = &transport.requests()[0];
        assert_eq!(request.headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(request.body.as_deref(), Some(&b"Alfred"[..]));
    }
}
