//! Request and response handles carried by an execution context.

use crate::headers::HttpHeaders;
use crate::message::MessageFlow;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP primitives
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP method, covering the standard verbs used in REST and proxy scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
}

impl HttpMethod {
    /// Case-insensitive parse from a string slice.
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            "TRACE" => Some(HttpMethod::Trace),
            "CONNECT" => Some(HttpMethod::Connect),
            _ => None,
        }
    }

    /// Return the standard uppercase string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Inbound request as seen by the pipeline.
pub struct Request {
    /// Unique identifier generated when the request entered the gateway.
    pub id: String,
    /// Correlation id, set by the transaction processor.
    pub transaction_id: String,
    pub method: HttpMethod,
    pub scheme: String,
    pub host: String,
    /// Path and query string as received.
    pub uri: String,
    pub path: String,
    /// Context path of the API serving the request (empty until routed).
    pub context_path: String,
    /// `path` with `context_path` stripped.
    pub path_info: String,
    pub parameters: HashMap<String, Vec<String>>,
    pub headers: HttpHeaders,
    pub body: Bytes,
    pub remote_address: String,
    pub local_address: String,
    /// URL as the client originally addressed it, forwarding headers applied.
    pub original_url: String,
    /// Incoming messages (message APIs only).
    pub messages: Option<MessageFlow>,
}

impl Request {
    /// Build a request from a method and a `path?query` uri.
    pub fn new(id: impl Into<String>, method: HttpMethod, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query)),
            None => (uri.clone(), None),
        };
        let parameters = query.map(parse_query).unwrap_or_default();
        Self {
            id: id.into(),
            transaction_id: String::new(),
            method,
            scheme: "http".to_string(),
            host: String::new(),
            original_url: uri.clone(),
            path_info: path.clone(),
            path,
            uri,
            context_path: String::new(),
            parameters,
            headers: HttpHeaders::new(),
            body: Bytes::new(),
            remote_address: String::new(),
            local_address: String::new(),
            messages: None,
        }
    }

    /// Builder helper: attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Builder helper: set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = address.into();
        self
    }

    /// Bind the request to an API context path, recomputing `path_info`.
    pub fn bind_context_path(&mut self, context_path: &str) {
        let trimmed = context_path.trim_end_matches('/');
        self.context_path = trimmed.to_string();
        let rest = self.path.strip_prefix(trimmed).unwrap_or(&self.path);
        self.path_info = if rest.is_empty() {
            "/".to_string()
        } else {
            rest.to_string()
        };
    }

    /// First value of a query parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, q)| q)
    }

    /// JSON view exposed to expressions as `#request`.
    pub fn to_json(&self) -> Value {
        let params: Map<String, Value> = self
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        json!({
            "id": self.id,
            "transactionId": self.transaction_id,
            "method": self.method.as_str(),
            "scheme": self.scheme,
            "host": self.host,
            "uri": self.uri,
            "path": self.path,
            "contextPath": self.context_path,
            "pathInfo": self.path_info,
            "params": params,
            "headers": self.headers.to_json(),
            "remoteAddress": self.remote_address,
            "localAddress": self.local_address,
            "content": String::from_utf8_lossy(&self.body),
        })
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("context_path", &self.context_path)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("messages", &self.messages.is_some())
            .finish()
    }
}

fn parse_query(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        params
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }
    params
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// Response under construction.
pub struct Response {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: HttpHeaders,
    pub body: Bytes,
    /// Outgoing messages (message APIs only).
    pub messages: Option<MessageFlow>,
    ended: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            reason: None,
            headers: HttpHeaders::new(),
            body: Bytes::new(),
            messages: None,
            ended: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Mark the response complete; later chain steps must not rewrite it.
    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// JSON view exposed to expressions as `#response`.
    pub fn to_json(&self) -> Value {
        json!({
            "status": self.status,
            "reason": self.reason,
            "headers": self.headers.to_json(),
            "content": String::from_utf8_lossy(&self.body),
        })
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("messages", &self.messages.is_some())
            .field("ended", &self.ended)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parameters_are_parsed() {
        let req = Request::new("r1", HttpMethod::Get, "/echo/items?api-key=abc&tag=a&tag=b");
        assert_eq!(req.path, "/echo/items");
        assert_eq!(req.parameter("api-key"), Some("abc"));
        assert_eq!(req.parameters["tag"], vec!["a", "b"]);
        assert_eq!(req.query(), Some("api-key=abc&tag=a&tag=b"));
    }

    #[test]
    fn binding_context_path_computes_path_info() {
        let mut req = Request::new("r1", HttpMethod::Get, "/echo/items/1");
        req.bind_context_path("/echo/");
        assert_eq!(req.context_path, "/echo");
        assert_eq!(req.path_info, "/items/1");

        let mut root = Request::new("r2", HttpMethod::Get, "/echo");
        root.bind_context_path("/echo");
        assert_eq!(root.path_info, "/");
    }

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(HttpMethod::from_str_ci("patch"), Some(HttpMethod::Patch));
        assert_eq!(HttpMethod::from_str_ci("LINK"), None);
    }
}
