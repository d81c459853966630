//! Live request model consumed by the resolver.
//!
//! The transport decodes the body once; switches, templates and filters
//! read from this structure and never touch the wire format again.

use bytes::Bytes;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;

/// Decoded request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// `application/json`
    Json(Value),
    /// `application/x-www-form-urlencoded`
    Form(Map<String, Value>),
    /// Anything else (XML, plain text, undecodable JSON)
    Text(String),
}

impl RequestBody {
    /// Decode raw bytes according to the request content type.
    ///
    /// With `force_json` every non-empty body is tried as JSON first.
    pub fn decode(raw: &[u8], content_type: Option<&str>, force_json: bool) -> Self {
        if raw.is_empty() {
            return RequestBody::Empty;
        }
        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if force_json || media_type == "application/json" || media_type.ends_with("+json") {
            if let Ok(json) = serde_json::from_slice::<Value>(raw) {
                return RequestBody::Json(json);
            }
        }

        if media_type == "application/x-www-form-urlencoded" {
            let text = String::from_utf8_lossy(raw);
            let form = parse_query_string(&text)
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            return RequestBody::Form(form);
        }

        RequestBody::Text(String::from_utf8_lossy(raw).into_owned())
    }

    /// Top-level field of a JSON or form body.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            RequestBody::Json(Value::Object(map)) | RequestBody::Form(map) => map.get(name),
            _ => None,
        }
    }

    /// The body as a JSON document, if it is one.
    pub fn as_json(&self) -> Option<Cow<'_, Value>> {
        match self {
            RequestBody::Json(json) => Some(Cow::Borrowed(json)),
            RequestBody::Form(map) => Some(Cow::Owned(Value::Object(map.clone()))),
            RequestBody::Text(text) => serde_json::from_str(text).ok().map(Cow::Owned),
            RequestBody::Empty => None,
        }
    }

    /// The body as searchable text: raw text as-is, decoded bodies
    /// re-serialized as compact JSON.
    pub fn to_text(&self) -> String {
        match self {
            RequestBody::Text(text) => text.clone(),
            RequestBody::Json(json) => json.to_string(),
            RequestBody::Form(map) => Value::Object(map.clone()).to_string(),
            RequestBody::Empty => "{}".to_string(),
        }
    }
}

/// A request as seen by the resolution engine.
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    /// Upper-case HTTP method
    pub method: String,
    /// Request path, without query string or basepath
    pub path: String,
    /// Named parameters captured from the route pattern
    pub path_params: HashMap<String, String>,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    /// Headers keyed by lower-case name
    pub headers: HashMap<String, String>,
    /// Decoded body
    pub body: RequestBody,
    /// Body bytes as received
    pub raw_body: Bytes,
}

impl MockRequest {
    /// Create a request with no parameters, headers or body.
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    /// Set the query parameters from a raw query string.
    pub fn with_query_string(mut self, query: &str) -> Self {
        self.query = parse_query_string(query);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_path_param(mut self, name: &str, value: &str) -> Self {
        self.path_params.insert(name.to_string(), value.to_string());
        self
    }

    /// Set a JSON body (raw bytes are its serialization).
    pub fn with_json(mut self, json: Value) -> Self {
        self.raw_body = Bytes::from(json.to_string());
        self.body = RequestBody::Json(json);
        self
    }

    /// Set a raw body, decoded with the request's content type.
    pub fn with_raw_body(mut self, raw: impl Into<Bytes>, force_json: bool) -> Self {
        self.raw_body = raw.into();
        let content_type = self.header("content-type").map(str::to_owned);
        self.body = RequestBody::decode(&self.raw_body, content_type.as_deref(), force_json);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Look a name up in the body, path parameters, query string and
    /// headers, in that order. Empty values are skipped.
    pub fn param(&self, name: &str) -> Option<String> {
        self.body
            .field(name)
            .and_then(value_to_param)
            .or_else(|| non_empty(self.path_params.get(name)))
            .or_else(|| non_empty(self.query.get(name)))
            .or_else(|| non_empty(self.header(name).map(str::to_owned).as_ref()))
    }

    /// Raw body as text; falls back to the decoded body when the raw
    /// bytes were not retained.
    pub fn raw_body_text(&self) -> Cow<'_, str> {
        if self.raw_body.is_empty() {
            Cow::Owned(self.body.to_text())
        } else {
            String::from_utf8_lossy(&self.raw_body)
        }
    }
}

/// Render a JSON scalar the way it would appear in a URL.
pub fn value_to_param(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

/// Parse a query string into key-value pairs.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params.insert(decode_component(key), decode_component(value));
    }

    params
}

fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux&flag");
        assert_eq!(params.get("foo"), Some(&"bar".to_string()));
        assert_eq!(params.get("baz"), Some(&"qux".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));

        let params = parse_query_string("name=John%20Doe&city=New+York");
        assert_eq!(params.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(params.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_decode_json_body() {
        let body = RequestBody::decode(br#"{"a": 1}"#, Some("application/json; charset=utf-8"), false);
        assert_eq!(body, RequestBody::Json(json!({"a": 1})));
    }

    #[test]
    fn test_decode_forced_json_body() {
        let body = RequestBody::decode(br#"{"a": 1}"#, Some("text/plain"), true);
        assert_eq!(body, RequestBody::Json(json!({"a": 1})));

        let body = RequestBody::decode(br#"{"a": 1}"#, Some("text/plain"), false);
        assert!(matches!(body, RequestBody::Text(_)));
    }

    #[test]
    fn test_decode_invalid_json_falls_back_to_text() {
        let body = RequestBody::decode(b"\"carEnginePartBelt\": belt", Some("application/json"), false);
        assert_eq!(
            body,
            RequestBody::Text("\"carEnginePartBelt\": belt".to_string())
        );
    }

    #[test]
    fn test_decode_form_body() {
        let body = RequestBody::decode(
            b"verb=get&serviceUrl=third",
            Some("application/x-www-form-urlencoded"),
            false,
        );
        assert_eq!(body.field("verb"), Some(&json!("get")));
        assert_eq!(body.field("serviceUrl"), Some(&json!("third")));
    }

    #[test]
    fn test_param_priority() {
        let req = MockRequest::new("post", "/items/1")
            .with_json(json!({"id": "from-body"}))
            .with_path_param("id", "from-path")
            .with_query_string("id=from-query")
            .with_header("Id", "from-header");
        assert_eq!(req.param("id").as_deref(), Some("from-body"));

        let req = MockRequest::new("get", "/items/1")
            .with_path_param("id", "from-path")
            .with_query_string("id=from-query")
            .with_header("Id", "from-header");
        assert_eq!(req.param("id").as_deref(), Some("from-path"));

        let req = MockRequest::new("get", "/items")
            .with_query_string("id=from-query")
            .with_header("Id", "from-header");
        assert_eq!(req.param("id").as_deref(), Some("from-query"));

        let req = MockRequest::new("get", "/items").with_header("ID", "from-header");
        assert_eq!(req.param("id").as_deref(), Some("from-header"));
    }

    #[test]
    fn test_param_skips_empty_values() {
        let req = MockRequest::new("post", "/items")
            .with_json(json!({"id": ""}))
            .with_query_string("id=");
        assert_eq!(req.param("id"), None);

        let req = MockRequest::new("post", "/items")
            .with_json(json!({"id": null}))
            .with_query_string("id=7");
        assert_eq!(req.param("id").as_deref(), Some("7"));
    }

    #[test]
    fn test_numeric_body_field() {
        let req = MockRequest::new("post", "/").with_json(json!({"customerId": 1234}));
        assert_eq!(req.param("customerId").as_deref(), Some("1234"));
    }

    #[test]
    fn test_body_text_forms() {
        assert_eq!(RequestBody::Empty.to_text(), "{}");
        assert_eq!(RequestBody::Json(json!({"a":"b"})).to_text(), r#"{"a":"b"}"#);
        assert_eq!(RequestBody::Text("raw".to_string()).to_text(), "raw");
    }
}
