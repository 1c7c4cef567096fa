//! `$batch`: queue requests, send them as one multipart body, hand every
//! caller its own part of the answer

use super::{EntityResource, Resource, with_response_type};
use crate::api::{ODataApi, ODataCall, Requester};
use crate::constants::{
    ACCEPT, APPLICATION_HTTP, APPLICATION_JSON, BATCH, BATCH_PREFIX, BINARY, BOUNDARY_PREFIX_SUFFIX,
    CHANGESET_PREFIX, CONTENT_ID, CONTENT_TRANSFER_ENCODING, CONTENT_TYPE, HTTP11, MULTIPART_MIXED,
    MULTIPART_MIXED_BOUNDARY, NEWLINE, ODATA_VERSION,
};
use crate::error::{ODataError, ODataResult};
use crate::path::{PathSegments, SegmentKind};
use crate::query::QueryOptions;
use crate::request::{ODataRequest, RequestBody, RequestOptions, ResponseType};
use crate::transport::{Headers, Method, TransportResponse};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use uuid::Uuid;

type Pending = (ODataRequest, oneshot::Sender<ODataResult<TransportResponse>>);

/// Requester that parks every request until the batch is sent
#[derive(Default)]
pub struct BatchRequester {
    queue: Mutex<Vec<Pending>>,
}

impl BatchRequester {
    fn queue(&self) -> MutexGuard<'_, Vec<Pending>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    fn drain(&self) -> Vec<Pending> {
        std::mem::take(&mut *self.queue())
    }
}

impl Requester for BatchRequester {
    fn request(&self, request: ODataRequest) -> BoxFuture<'static, ODataResult<TransportResponse>> {
        let (tx, rx) = oneshot::channel();
        log::trace!(
            "queued {} {} for batch",
            request.method,
            request.path_with_params()
        );
        self.queue().push((request, tx));
        Box::pin(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(ODataError::Batch("batch dropped before it was sent".into())),
            }
        })
    }
}

#[derive(Clone)]
pub struct BatchResource {
    pub(crate) resource: Resource,
    requester: Arc<BatchRequester>,
    batch_api: ODataApi,
}

impl std::fmt::Debug for BatchResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchResource")
            .field("resource", &self.resource)
            .field("pending", &self.requester.len())
            .finish()
    }
}

impl PartialEq for BatchResource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.requester, &other.requester)
    }
}

impl BatchResource {
    pub fn factory(api: ODataApi) -> Self {
        let requester = Arc::new(BatchRequester::default());
        let batch_api = api.with_requester(requester.clone());
        let mut segments = PathSegments::new();
        segments.add(SegmentKind::Batch, BATCH);
        Self {
            resource: Resource::new(api, segments, QueryOptions::new()),
            requester,
            batch_api,
        }
    }

    /// Handle whose verbs queue into this batch
    pub fn api(&self) -> &ODataApi {
        &self.batch_api
    }

    /// Number of queued requests
    pub fn pending(&self) -> usize {
        self.requester.len()
    }

    /// Entity created earlier in the same changeset, addressed as `$n`
    pub fn content_ref(&self, content_id: usize, type_name: Option<&str>) -> EntityResource {
        let mut segments = PathSegments::new();
        segments
            .add(SegmentKind::EntitySet, format!("${}", content_id))
            .set_type_opt(type_name.map(str::to_string));
        EntityResource::from_resource(
            Resource::new(self.batch_api.clone(), segments, QueryOptions::new()),
            true,
        )
    }

    /// Send everything queued so far in one round trip
    ///
    /// Each queued call resolves with its own part. When the batch as a
    /// whole fails every queued call fails with [`ODataError::Batch`].
    pub fn send(&self, options: RequestOptions) -> ODataCall<()> {
        let pending = self.requester.drain();
        if pending.is_empty() {
            return ODataCall::new(async { Ok(()) });
        }

        let mut builder = BatchRequestBuilder::new();
        for (request, _) in &pending {
            builder.push(request);
        }
        let content_type = builder.content_type();
        let data = builder.finish();
        log::debug!("sending batch of {} requests", pending.len());

        let version = self.resource.api().settings().version.clone();
        let options = with_response_type(options, ResponseType::None)
            .header(ODATA_VERSION, version)
            .header(ACCEPT, MULTIPART_MIXED);
        let call = self
            .resource
            .post(Some(RequestBody::Bytes { content_type, data }), options);

        ODataCall::new(async move {
            let response = match call.await {
                Ok(response) => response,
                Err(err) => {
                    fail_all(pending, &err);
                    return Err(err);
                }
            };
            let content_type = response
                .headers
                .get(CONTENT_TYPE)
                .unwrap_or_default()
                .to_string();
            match BatchResponseParser::parse(&content_type, &response.body) {
                Ok(parts) => {
                    dispatch(pending, parts);
                    Ok(())
                }
                Err(err) => {
                    fail_all(pending, &err);
                    Err(err)
                }
            }
        })
    }

    /// Queue what `f` issues against the batch handle, send, then await it
    ///
    /// `f` must issue its calls before returning (build them, then combine
    /// them with `futures::future::join`); an `async` block that issues
    /// them lazily would only queue after the batch is gone.
    pub async fn exec<F, Fut>(&self, f: F) -> ODataResult<Fut::Output>
    where
        F: FnOnce(&ODataApi) -> Fut,
        Fut: Future,
    {
        let queued = f(&self.batch_api);
        self.send(RequestOptions::new()).await?;
        Ok(queued.await)
    }
}

fn fail_all(pending: Vec<Pending>, err: &ODataError) {
    log::warn!("batch failed for {} requests: {}", pending.len(), err);
    for (_, tx) in pending {
        let _ = tx.send(Err(ODataError::Batch(err.to_string())));
    }
}

/// Match parts to requests by Content-ID, falling back to position
fn dispatch(pending: Vec<Pending>, mut parts: Vec<ODataResult<BatchPart>>) {
    for (index, (_, tx)) in pending.into_iter().enumerate() {
        let content_id = (index + 1).to_string();
        let by_id = parts.iter().position(|p| {
            p.as_ref()
                .is_ok_and(|p| p.content_id.as_deref() == Some(content_id.as_str()))
        });
        let positional = matches!(parts.get(index), Some(Ok(p)) if p.content_id.is_none());
        let result = match by_id {
            Some(found) => take(&mut parts, found),
            None if positional => take(&mut parts, index),
            None => match parts.get(index) {
                Some(Err(err)) => Err(ODataError::Batch(err.to_string())),
                _ => Err(ODataError::Batch(format!("no response for Content-ID {}", content_id))),
            },
        };
        let _ = tx.send(result.map(|part| part.response));
    }
}

fn take(parts: &mut [ODataResult<BatchPart>], index: usize) -> ODataResult<BatchPart> {
    let consumed = Err(ODataError::Batch("consumed".into()));
    std::mem::replace(&mut parts[index], consumed)
}

/// Serializes queued requests into a `multipart/mixed` batch body
///
/// Consecutive non-GET requests share one changeset; a GET closes it.
#[derive(Debug)]
pub struct BatchRequestBuilder {
    boundary: String,
    changeset: String,
    body: Vec<u8>,
    in_changeset: bool,
    next_id: usize,
}

impl Default for BatchRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchRequestBuilder {
    pub fn new() -> Self {
        Self::with_boundaries(
            format!("{}{}", BATCH_PREFIX, Uuid::new_v4()),
            format!("{}{}", CHANGESET_PREFIX, Uuid::new_v4()),
        )
    }

    pub fn with_boundaries(boundary: impl Into<String>, changeset: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            changeset: changeset.into(),
            body: Vec::new(),
            in_changeset: false,
            next_id: 1,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `Content-Type` of the whole batch request
    pub fn content_type(&self) -> String {
        format!("{}{}", MULTIPART_MIXED_BOUNDARY, self.boundary)
    }

    fn line(&mut self, line: &str) {
        self.body.extend_from_slice(line.as_bytes());
        self.body.extend_from_slice(NEWLINE.as_bytes());
    }

    fn delimiter(&mut self, boundary: &str, close: bool) {
        let suffix = if close { BOUNDARY_PREFIX_SUFFIX } else { "" };
        let line = format!("{}{}{}", BOUNDARY_PREFIX_SUFFIX, boundary, suffix);
        self.line(&line);
    }

    fn close_changeset(&mut self) {
        if self.in_changeset {
            let changeset = self.changeset.clone();
            self.delimiter(&changeset, true);
            self.in_changeset = false;
        }
    }

    /// Append one request, returning its Content-ID
    pub fn push(&mut self, request: &ODataRequest) -> usize {
        let boundary = self.boundary.clone();
        if request.method == Method::Get {
            self.close_changeset();
            self.delimiter(&boundary, false);
        } else {
            let changeset = self.changeset.clone();
            if !self.in_changeset {
                self.delimiter(&boundary, false);
                let header = format!("{}{}", MULTIPART_MIXED_BOUNDARY, changeset);
                self.line(&format!("{}: {}", CONTENT_TYPE, header));
                self.line("");
                self.in_changeset = true;
            }
            self.delimiter(&changeset, false);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.line(&format!("{}: {}", CONTENT_TYPE, APPLICATION_HTTP));
        self.line(&format!("{}: {}", CONTENT_TRANSFER_ENCODING, BINARY));
        self.line(&format!("{}: {}", CONTENT_ID, id));
        self.line("");

        let target = request.path_with_params();
        self.line(&format!("{} {} {}", request.method, target, HTTP11));
        let mut headers = request.headers.clone();
        if request.body.is_some() && !headers.contains(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, APPLICATION_JSON);
        }
        for (name, value) in headers.iter() {
            self.line(&format!("{}: {}", name, value));
        }
        self.line("");
        if let Some(body) = request.body_bytes() {
            self.body.extend_from_slice(&body);
            self.body.extend_from_slice(NEWLINE.as_bytes());
        }
        id
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.close_changeset();
        let boundary = self.boundary.clone();
        self.delimiter(&boundary, true);
        self.body
    }
}

/// One answered sub-request
#[derive(Debug, Clone)]
pub struct BatchPart {
    pub content_id: Option<String>,
    pub response: TransportResponse,
}

/// Splits a `multipart/mixed` batch response, descending into changesets
pub struct BatchResponseParser;

impl BatchResponseParser {
    /// Parts in wire order; a malformed part fails alone
    pub fn parse(content_type: &str, body: &[u8]) -> ODataResult<Vec<ODataResult<BatchPart>>> {
        let boundary = Self::boundary(content_type)
            .ok_or_else(|| ODataError::Batch(format!("no boundary in {:?}", content_type)))?;
        let text = String::from_utf8_lossy(body);
        let lines: Vec<&str> = text.lines().collect();
        Ok(Self::parse_lines(&boundary, &lines))
    }

    fn boundary(content_type: &str) -> Option<String> {
        content_type
            .split(';')
            .map(str::trim)
            .find_map(|p| p.strip_prefix("boundary="))
            .map(|b| b.trim_matches('"').to_string())
    }

    fn parse_lines(boundary: &str, lines: &[&str]) -> Vec<ODataResult<BatchPart>> {
        let open = format!("{}{}", BOUNDARY_PREFIX_SUFFIX, boundary);
        let close = format!("{}{}", open, BOUNDARY_PREFIX_SUFFIX);
        let mut parts = Vec::new();
        let mut current: Option<Vec<&str>> = None;
        for line in lines {
            let trimmed = line.trim_end();
            if trimmed == close {
                break;
            }
            if trimmed == open {
                if let Some(part) = current.take() {
                    parts.push(part);
                }
                current = Some(Vec::new());
            } else if let Some(part) = current.as_mut() {
                part.push(line);
            }
        }
        if let Some(part) = current.take() {
            parts.push(part);
        }
        parts
            .iter()
            .flat_map(|part| Self::parse_part(part))
            .collect()
    }

    fn parse_part(lines: &[&str]) -> Vec<ODataResult<BatchPart>> {
        let split = blank_line(lines);
        let mime = Headers::parse_lines(lines[..split].iter().copied());
        let rest = lines.get(split + 1..).unwrap_or_default();

        if let Some(content_type) = mime.get(CONTENT_TYPE)
            && content_type.starts_with(MULTIPART_MIXED)
        {
            return match Self::boundary(content_type) {
                Some(inner) => Self::parse_lines(&inner, rest),
                None => vec![Err(ODataError::Batch("changeset without boundary".into()))],
            };
        }
        vec![Self::parse_http(&mime, rest)]
    }

    fn parse_http(mime: &Headers, lines: &[&str]) -> ODataResult<BatchPart> {
        let mut lines = lines.iter().skip_while(|l| l.trim().is_empty());
        let status_line = lines
            .next()
            .ok_or_else(|| ODataError::Batch("empty batch part".into()))?;
        let status = status_line
            .split_whitespace()
            .nth(1)
            .filter(|_| status_line.starts_with("HTTP/"))
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| ODataError::Batch(format!("bad status line {:?}", status_line)))?;

        let rest: Vec<&str> = lines.copied().collect();
        let split = blank_line(&rest);
        let headers = Headers::parse_lines(rest[..split].iter().copied());
        let body = rest
            .get(split + 1..)
            .unwrap_or_default()
            .join(NEWLINE)
            .trim_end()
            .to_string();

        let content_id = mime
            .get(CONTENT_ID)
            .or_else(|| headers.get(CONTENT_ID))
            .map(str::to_string);
        Ok(BatchPart {
            content_id,
            response: TransportResponse::new(status, headers, body),
        })
    }
}

/// Index of the first blank line, or the length when there is none
fn blank_line(lines: &[&str]) -> usize {
    lines
        .iter()
        .position(|l| l.trim().is_empty())
        .unwrap_or(lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ODataResource;
    use crate::settings::ODataSettings;
    use crate::testing::{MockTransport, api_with};
    use serde_json::json;

    fn request(method: Method, path: &str, body: Option<RequestBody>) -> ODataRequest {
        let settings = ODataSettings::minimal("https://services.example.com/trippin/");
        ODataRequest::build(
            method,
            path.to_string(),
            Default::default(),
            body,
            RequestOptions::new(),
            &settings,
        )
    }

    #[test]
    fn test_changeset_wraps_only_mutations() {
        let mut builder = BatchRequestBuilder::with_boundaries("batch_b", "changeset_c");
        builder.push(&request(Method::Get, "People('a')", None));
        let create = RequestBody::Json(json!({"UserName": "x"}));
        builder.push(&request(Method::Post, "People", Some(create)));
        builder.push(&request(Method::Get, "Airlines", None));
        let body = String::from_utf8(builder.finish()).unwrap();

        let opened = "Content-Type: multipart/mixed;boundary=changeset_c";
        assert_eq!(body.matches(opened).count(), 1);
        assert_eq!(body.matches("--changeset_c\r\n").count(), 1);
        assert_eq!(body.matches("--changeset_c--").count(), 1);
        assert_eq!(body.matches("--batch_b\r\n").count(), 3);
        assert!(body.ends_with("--batch_b--\r\n"));

        let open = body.find("--changeset_c\r\n").unwrap();
        let post = body.find("POST People HTTP/1.1").unwrap();
        let close = body.find("--changeset_c--").unwrap();
        let last_get = body.find("GET Airlines HTTP/1.1").unwrap();
        assert!(open < post && post < close && close < last_get);
        assert!(body.contains("Content-ID: 2\r\n"));
    }

    #[test]
    fn test_parse_nested_changeset_and_malformed_part() {
        let body = [
            "--batchresponse_1",
            "Content-Type: application/http",
            "Content-ID: 1",
            "",
            "HTTP/1.1 200 OK",
            "Content-Type: application/json",
            "",
            "{\"UserName\":\"a\"}",
            "--batchresponse_1",
            "Content-Type: multipart/mixed; boundary=changesetresponse_1",
            "",
            "--changesetresponse_1",
            "Content-Type: application/http",
            "Content-ID: 2",
            "",
            "HTTP/1.1 201 Created",
            "",
            "{}",
            "--changesetresponse_1--",
            "--batchresponse_1",
            "Content-Type: application/http",
            "",
            "garbage",
            "--batchresponse_1--",
        ]
        .join("\r\n");
        let parts =
            BatchResponseParser::parse("multipart/mixed; boundary=batchresponse_1", body.as_bytes())
                .unwrap();
        assert_eq!(parts.len(), 3);
        let first = parts[0].as_ref().unwrap();
        assert_eq!(first.content_id.as_deref(), Some("1"));
        assert_eq!(first.response.status, 200);
        assert_eq!(first.response.text(), "{\"UserName\":\"a\"}");
        assert_eq!(parts[1].as_ref().unwrap().response.status, 201);
        assert!(matches!(parts[2], Err(ODataError::Batch(_))));
    }

    #[tokio::test]
    async fn test_exec_demultiplexes_by_content_id() {
        let transport = MockTransport::new();
        let body = [
            "--batchresponse_1",
            "Content-Type: multipart/mixed; boundary=changesetresponse_1",
            "",
            "--changesetresponse_1",
            "Content-Type: application/http",
            "Content-ID: 2",
            "",
            "HTTP/1.1 201 Created",
            "Content-Type: application/json",
            "",
            "{\"UserName\":\"newbie\",\"Age\":\"20\"}",
            "--changesetresponse_1--",
            "--batchresponse_1",
            "Content-Type: application/http",
            "Content-ID: 1",
            "",
            "HTTP/1.1 200 OK",
            "Content-Type: application/json",
            "",
            "{\"UserName\":\"russellwhyte\"}",
            "--batchresponse_1",
            "Content-Type: application/http",
            "Content-ID: 3",
            "",
            "HTTP/1.1 404 Not Found",
            "Content-Type: application/json",
            "",
            "{\"error\":{\"message\":\"no such airline\"}}",
            "--batchresponse_1--",
        ]
        .join("\r\n");
        transport.respond(
            200,
            &[("Content-Type", "multipart/mixed; boundary=batchresponse_1")],
            &body,
        );
        let api = api_with(transport.clone());
        let batch = api.batch();
        let attrs = json!({"UserName": "newbie"});

        let (person, created, airline) = batch
            .exec(|api| {
                let people = api.entity_set("People");
                let airlines = api.entity_set("Airlines");
                let person = people.key("russellwhyte").fetch(RequestOptions::new());
                let created = people.create(attrs.as_object().unwrap(), RequestOptions::new());
                let airline = airlines.key("XX").fetch(RequestOptions::new());
                futures::future::join3(person, created, airline)
            })
            .await
            .unwrap();

        assert_eq!(
            person.unwrap().entity.unwrap()["UserName"],
            json!("russellwhyte")
        );
        assert_eq!(created.unwrap().entity.unwrap()["Age"], json!(20));
        assert_eq!(airline.unwrap_err().status(), Some(404));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "https://services.example.com/trippin/$batch"
        );
        let content_type = requests[0].headers.get("Content-Type").unwrap();
        assert!(content_type.starts_with("multipart/mixed;boundary=batch_"));
        assert_eq!(requests[0].headers.get("Accept"), Some("multipart/mixed"));
        assert_eq!(batch.pending(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_fails_every_call() {
        let transport = MockTransport::new();
        transport.respond_json(500, json!({"error": {"message": "boom"}}));
        let api = api_with(transport);
        let batch = api.batch();
        let people = batch.api().entity_set("People");
        let first = people.key("a").fetch(RequestOptions::new());
        let second = people.key("b").fetch(RequestOptions::new());
        assert_eq!(batch.pending(), 2);

        assert!(batch.send(RequestOptions::new()).await.is_err());
        assert!(matches!(first.await, Err(ODataError::Batch(_))));
        assert!(matches!(second.await, Err(ODataError::Batch(_))));
    }

    #[tokio::test]
    async fn test_dropped_batch_cancels_queued_calls() {
        let api = api_with(MockTransport::new());
        let batch = api.batch();
        let call = {
            let people = batch.api().entity_set("People");
            people.key("a").fetch(RequestOptions::new())
        };
        drop(batch);
        assert!(matches!(call.await, Err(ODataError::Batch(_))));
    }

    #[test]
    fn test_content_ref_path() {
        let api = api_with(MockTransport::new());
        let batch = api.batch();
        let created = batch.content_ref(1, Some("Trippin.Person"));
        assert_eq!(created.navigation("Trips").to_string(), "$1/Trips");
        assert_eq!(created.type_name().as_deref(), Some("Trippin.Person"));
    }
}
