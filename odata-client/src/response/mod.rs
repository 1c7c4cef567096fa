//! Interpretation of transport responses
//!
//! The protocol version announced by the service decides the envelope
//! (`value` for v4, `d`/`d.results` for v2). Entities are deserialized with
//! the parser of their annotated type, falling back to the resource type.

pub mod annotations;

pub use annotations::{
    CollectionAnnotations, EntityAnnotations, context_entity_set, is_annotation, split_annotations,
};

use crate::constants::*;
use crate::error::{ODataError, ODataResult};
use crate::schema::{Parser, ParserOptions, Schema};
use crate::transport::{Headers, TransportResponse};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A single entity and its annotations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityResult {
    pub entity: Option<Map<String, Value>>,
    pub annots: EntityAnnotations,
}

/// A page of entities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitiesResult {
    pub entities: Vec<Map<String, Value>>,
    pub entity_annots: Vec<EntityAnnotations>,
    pub annots: CollectionAnnotations,
}

/// A property value, possibly a paged collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyResult {
    pub value: Option<Value>,
    pub annots: CollectionAnnotations,
}

/// A transport response bound to the schema and type it answers
#[derive(Clone)]
pub struct ODataResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub url: String,
    schema: Arc<dyn Schema>,
    type_name: Option<String>,
    options: ParserOptions,
    default_version: String,
}

impl std::fmt::Debug for ODataResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ODataResponse")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl ODataResponse {
    pub fn new(
        response: TransportResponse,
        url: impl Into<String>,
        schema: Arc<dyn Schema>,
        type_name: Option<String>,
        options: ParserOptions,
        default_version: impl Into<String>,
    ) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            url: url.into(),
            schema,
            type_name,
            options,
            default_version: default_version.into(),
        }
    }

    /// Turn a status of 400 or more into [`ODataError::Status`]
    pub fn ensure_success(self) -> ODataResult<Self> {
        if self.status < 400 {
            return Ok(self);
        }
        let text = String::from_utf8_lossy(&self.body).into_owned();
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        log::debug!("{} answered {}", self.url, self.status);
        Err(ODataError::Status {
            status: self.status,
            url: self.url,
            body,
        })
    }

    /// Version from the response headers, else the configured one
    pub fn version(&self) -> String {
        self.headers
            .get_any(&ODATA_VERSION_HEADERS)
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| self.default_version.clone())
    }

    pub fn is_v2(&self) -> bool {
        self.version() == VERSION_2_0
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get(ETAG)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    fn json(&self) -> ODataResult<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(ODataError::from)
    }

    /// Payload with the v2 `d` envelope removed
    fn payload(&self) -> ODataResult<Value> {
        let json = self.json()?;
        if !self.is_v2() {
            return Ok(json);
        }
        match json {
            Value::Object(mut map) => Ok(map.remove(V2_ENVELOPE).unwrap_or(Value::Object(map))),
            other => Ok(other),
        }
    }

    fn parser(&self, map: &Map<String, Value>) -> Option<Arc<dyn Parser>> {
        let annotated = map
            .get(ODATA_TYPE)
            .and_then(Value::as_str)
            .or_else(|| {
                map.get(V2_METADATA)
                    .and_then(|m| m.get("type"))
                    .and_then(Value::as_str)
            });
        annotated
            .and_then(|t| self.schema.parser_for_type(t))
            .or_else(|| {
                self.type_name
                    .as_deref()
                    .and_then(|t| self.schema.parser_for_type(t))
            })
    }

    fn parse_entity(&self, map: &Map<String, Value>) -> (Map<String, Value>, EntityAnnotations) {
        let parsed = match self.parser(map) {
            Some(parser) => parser.deserialize(&Value::Object(map.clone()), &self.options),
            None => Value::Object(map.clone()),
        };
        let parsed = match parsed {
            Value::Object(parsed) => parsed,
            _ => map.clone(),
        };
        let (data, annots) = split_annotations(&parsed);
        (data, EntityAnnotations::from_map(&annots))
    }

    /// Interpret the body as a single entity
    pub fn entity(&self) -> ODataResult<EntityResult> {
        match self.payload()? {
            Value::Null => Ok(EntityResult::default()),
            Value::Object(map) => {
                let (entity, annots) = self.parse_entity(&map);
                Ok(EntityResult {
                    entity: Some(entity),
                    annots,
                })
            }
            other => Err(ODataError::parse(format!("expected an entity, got {}", other))),
        }
    }

    /// Interpret the body as a collection of entities
    pub fn entities(&self) -> ODataResult<EntitiesResult> {
        let (items, annots) = match self.payload()? {
            Value::Null => (Vec::new(), CollectionAnnotations::default()),
            Value::Array(items) => (items, CollectionAnnotations::default()),
            Value::Object(mut map) => {
                let annots = CollectionAnnotations::from_map(&map);
                let items = map
                    .remove("value")
                    .or_else(|| map.remove(V2_RESULTS))
                    .unwrap_or(Value::Array(Vec::new()));
                match items {
                    Value::Array(items) => (items, annots),
                    other => {
                        let message = format!("expected entities, got {}", other);
                        return Err(ODataError::parse(message));
                    }
                }
            }
            other => return Err(ODataError::parse(format!("expected entities, got {}", other))),
        };
        let mut result = EntitiesResult {
            annots,
            ..EntitiesResult::default()
        };
        for item in items {
            let Value::Object(map) = item else {
                return Err(ODataError::parse("collection member is not an object"));
            };
            let (entity, annots) = self.parse_entity(&map);
            result.entities.push(entity);
            result.entity_annots.push(annots);
        }
        Ok(result)
    }

    /// Interpret the body as a property value
    pub fn property(&self) -> ODataResult<PropertyResult> {
        let payload = self.payload()?;
        let mut annots = CollectionAnnotations::default();
        let raw = match payload {
            Value::Null => None,
            Value::Object(mut map) => {
                annots = CollectionAnnotations::from_map(&map);
                if let Some(value) = map.remove("value").or_else(|| map.remove(V2_RESULTS)) {
                    Some(value)
                } else {
                    let (data, _) = split_annotations(&map);
                    if self.is_v2() && data.len() == 1 {
                        data.into_iter().next().map(|(_, v)| v)
                    } else {
                        Some(Value::Object(data))
                    }
                }
            }
            other => Some(other),
        };
        let value = raw.map(|raw| {
            match self
                .type_name
                .as_deref()
                .and_then(|t| self.schema.parser_for_type(t))
            {
                Some(parser) => parser.deserialize(&raw, &self.options),
                None => raw,
            }
        });
        Ok(PropertyResult { value, annots })
    }

    /// Interpret a text body as an integer, as returned by `$count`
    pub fn count(&self) -> ODataResult<u64> {
        let text = self.text();
        text.trim()
            .parse()
            .map_err(|_| ODataError::parse(format!("invalid count {:?}", text)))
    }

    /// Text body deserialized with the resource type, as returned by `$value`
    pub fn value(&self) -> Value {
        let text = self.text();
        let raw = Value::String(text);
        match self
            .type_name
            .as_deref()
            .and_then(|t| self.schema.parser_for_type(t))
        {
            Some(parser) => parser.deserialize(&raw, &self.options),
            None => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trippin_schema;
    use serde_json::json;

    fn response(status: u16, headers: Headers, body: Value, type_name: &str) -> ODataResponse {
        ODataResponse::new(
            TransportResponse::new(status, headers, body.to_string().into_bytes()),
            "https://host/svc/People",
            Arc::new(trippin_schema()),
            Some(type_name.to_string()),
            ParserOptions::default(),
            VERSION_4_0,
        )
    }

    #[test]
    fn test_entities_with_annotations() {
        let body = json!({
            "@odata.context": "https://host/svc/$metadata#People",
            "@odata.count": 2,
            "@odata.nextLink": "https://host/svc/People?$skip=2",
            "value": [
                {"UserName": "a", "Age": "31", "@odata.etag": "W/\"1\""},
                {"@odata.type": "#Trippin.Employee", "UserName": "b", "Cost": "900"}
            ]
        });
        let result = response(200, Headers::new(), body, "Trippin.Person")
            .entities()
            .unwrap();
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[0]["Age"], json!(31));
        assert!(!result.entities[0].contains_key("@odata.etag"));
        assert_eq!(result.entity_annots[0].etag.as_deref(), Some("W/\"1\""));
        assert_eq!(result.entities[1]["Cost"], json!(900));
        assert_eq!(result.annots.count, Some(2));
        assert_eq!(result.annots.skip(), Some(2));
    }

    #[test]
    fn test_v2_envelope() {
        let headers: Headers = [("DataServiceVersion", "2.0;")].into_iter().collect();
        let body = json!({"d": {"results": [{"UserName": "a"}], "__count": "1"}});
        let result = response(200, headers, body, "Trippin.Person")
            .entities()
            .unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.annots.count, Some(1));
    }

    #[test]
    fn test_property_value() {
        let body = json!({"@odata.context": "x", "value": "russell"});
        let result = response(200, Headers::new(), body, "Edm.String")
            .property()
            .unwrap();
        assert_eq!(result.value, Some(json!("russell")));
    }

    #[test]
    fn test_status_errors_carry_body() {
        let body = json!({"error": {"code": "404", "message": "Not found"}});
        let err = response(404, Headers::new(), body, "Trippin.Person")
            .ensure_success()
            .unwrap_err();
        match err {
            ODataError::Status { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(body["error"]["message"], "Not found");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_entity_body() {
        let result = ODataResponse::new(
            TransportResponse::new(204, Headers::new(), Vec::new()),
            "u",
            Arc::new(trippin_schema()),
            None,
            ParserOptions::default(),
            VERSION_4_0,
        )
        .entity()
        .unwrap();
        assert!(result.entity.is_none());
    }
}
