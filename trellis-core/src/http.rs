// HTTP request and response types

use crate::Extensions;
use crate::logging::{debug, warn};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// HTTP methods a controller action can be bound to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    /// Matches every verb
    ALL,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "PATCH" => Some(HttpMethod::PATCH),
            "DELETE" => Some(HttpMethod::DELETE),
            "HEAD" => Some(HttpMethod::HEAD),
            "ALL" => Some(HttpMethod::ALL),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::ALL => "ALL",
        }
    }

    /// Whether a request with the given verb is served by this method.
    pub fn matches(&self, method: &str) -> bool {
        *self == HttpMethod::ALL || self.as_str().eq_ignore_ascii_case(method)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw request data as received from the wire
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    /// Request path, optionally followed by `?query`
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Add a header. Names are stored lowercased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and the matching content type.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, crate::Error> {
        let body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }
}

/// Shared handle to an in-flight request.
///
/// Cloning is cheap; every clone observes the same route parameters and
/// extensions.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

struct RequestInner {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    cookies: HashMap<String, String>,
    raw_body: Vec<u8>,
    body: Value,
    params: RwLock<HashMap<String, String>>,
    extensions: RwLock<Extensions>,
}

impl Request {
    pub fn new(request: HttpRequest) -> Self {
        let (path, query) = match request.path.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query_string(query)),
            None => (request.path.clone(), HashMap::new()),
        };

        let headers: HashMap<String, String> = request
            .headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();

        let cookies = headers
            .get("cookie")
            .map(|raw| parse_cookies(raw))
            .unwrap_or_default();

        let body = parse_body(headers.get("content-type").map(String::as_str), &request.body);

        Self {
            inner: Arc::new(RequestInner {
                method: request.method.to_uppercase(),
                path,
                headers,
                query,
                cookies,
                raw_body: request.body,
                body,
                params: RwLock::new(HashMap::new()),
                extensions: RwLock::new(Extensions::new()),
            }),
        }
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    /// Path without the query string
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// All headers, names lowercased
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.inner.headers
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.inner.query
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.inner.cookies
    }

    /// Route parameters of the route currently being executed
    pub fn params(&self) -> HashMap<String, String> {
        self.inner.params.read().clone()
    }

    pub fn param(&self, name: &str) -> Option<String> {
        self.inner.params.read().get(name).cloned()
    }

    pub(crate) fn set_params(&self, params: HashMap<String, String>) {
        *self.inner.params.write() = params;
    }

    /// Parsed body
    pub fn body(&self) -> &Value {
        &self.inner.body
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.inner.raw_body
    }

    /// Parse the raw body as JSON into a typed value
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.inner.raw_body)
            .map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    pub fn extensions(&self) -> RwLockReadGuard<'_, Extensions> {
        self.inner.extensions.read()
    }

    pub fn extensions_mut(&self) -> RwLockWriteGuard<'_, Extensions> {
        self.inner.extensions.write()
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.inner.method)
            .field("path", &self.inner.path)
            .finish()
    }
}

/// Final response as it leaves the application
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Every value sent for a header name, in order
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }
}

/// Shared response sink.
///
/// Handlers write to it directly; the first `send` wins and later sends are
/// rejected, mirroring a socket that has already flushed its headers.
#[derive(Clone)]
pub struct Response {
    inner: Arc<Mutex<ResponseState>>,
}

#[derive(Debug)]
struct ResponseState {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    sent: bool,
}

impl Response {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResponseState {
                status: 200,
                headers: Vec::new(),
                body: Vec::new(),
                sent: false,
            })),
        }
    }

    /// Set the status code for the response
    pub fn status(&self, code: u16) -> &Self {
        self.inner.lock().status = code;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.inner.lock().status
    }

    /// Replace every value of a header
    pub fn set_header(&self, name: &str, value: impl Into<String>) -> &Self {
        let mut state = self.inner.lock();
        state.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        state.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Add a header value, keeping existing values
    pub fn append_header(&self, name: &str, value: impl Into<String>) -> &Self {
        self.inner
            .lock()
            .headers
            .push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    /// Send the body and finish the response
    pub fn send(&self, body: impl Into<Vec<u8>>) -> Result<(), crate::Error> {
        let mut state = self.inner.lock();
        if state.sent {
            return Err(crate::Error::Http(
                "Cannot send a response: headers already sent".to_string(),
            ));
        }
        state.body = body.into();
        state.sent = true;
        Ok(())
    }

    /// Send a plain value the way a raw handler return is sent: strings as
    /// HTML text, everything else as JSON.
    pub fn send_value(&self, value: &Value) -> Result<(), crate::Error> {
        match value {
            Value::String(text) => {
                if self.header("content-type").is_none() {
                    self.set_header("content-type", "text/html; charset=utf-8");
                }
                self.send(text.as_bytes().to_vec())
            }
            other => self.send_json(other),
        }
    }

    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), crate::Error> {
        let body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        if self.header("content-type").is_none() {
            self.set_header("content-type", "application/json");
        }
        self.send(body)
    }

    /// Set the status and finish the response with an empty body
    pub fn send_status(&self, code: u16) -> Result<(), crate::Error> {
        self.status(code);
        self.send(Vec::new())
    }

    pub fn headers_sent(&self) -> bool {
        self.inner.lock().sent
    }

    /// Snapshot of the response as it stands
    pub fn to_http_response(&self) -> HttpResponse {
        let state = self.inner.lock();
        HttpResponse {
            status: state.status,
            headers: state.headers.clone(),
            body: state.body.clone(),
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Response")
            .field("status", &state.status)
            .field("sent", &state.sent)
            .finish()
    }
}

/// Explicit continuation handed to every request-handling step.
///
/// A step continues the chain with [`Next::call`] or escalates with
/// [`Next::fail`]. A step that does neither ends the chain.
#[derive(Clone, Default)]
pub struct Next {
    signal: Arc<Mutex<Option<Signal>>>,
}

#[derive(Debug)]
pub(crate) enum Signal {
    Continue,
    Fail(crate::Error),
}

impl Next {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue with the next step of the chain
    pub fn call(&self) {
        self.signal(Signal::Continue);
    }

    /// Skip to the error path with the given error
    pub fn fail(&self, err: crate::Error) {
        self.signal(Signal::Fail(err));
    }

    /// Whether the step has signalled anything yet
    pub fn is_called(&self) -> bool {
        self.signal.lock().is_some()
    }

    fn signal(&self, signal: Signal) {
        let mut slot = self.signal.lock();
        if slot.is_some() {
            warn!(?signal, "next() invoked more than once for the same step, ignoring");
            return;
        }
        *slot = Some(signal);
    }

    pub(crate) fn take(&self) -> Option<Signal> {
        self.signal.lock().take()
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("called", &self.is_called())
            .finish()
    }
}

/// Parse a query string into a map of parameters
pub(crate) fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = decode_component(split.next()?);
            let value = decode_component(split.next().unwrap_or(""));
            Some((key, value))
        })
        .collect()
}

fn parse_cookies(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let value = value.trim().trim_matches('"');
            Some((name.trim().to_string(), decode_cookie_value(value)))
        })
        .collect()
}

/// Cookie values are percent-encoded only; `+` is literal.
fn decode_cookie_value(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(raw)
}

fn parse_body(content_type: Option<&str>, body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }

    let media_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match media_type.as_str() {
        "application/json" => serde_json::from_slice(body).unwrap_or_else(|err| {
            debug!(error = %err, "Request body is not valid JSON");
            Value::Null
        }),
        "application/x-www-form-urlencoded" => {
            match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
                Ok(pairs) => Value::Object(
                    pairs
                        .into_iter()
                        .map(|(key, value)| (key, Value::String(value)))
                        .collect::<Map<_, _>>(),
                ),
                Err(err) => {
                    debug!(error = %err, "Request body is not valid form data");
                    Value::Null
                }
            }
        }
        media if media.starts_with("text/") => {
            Value::String(String::from_utf8_lossy(body).into_owned())
        }
        _ => Value::Null,
    }
}
