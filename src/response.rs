//! Resolved responses, independent of the HTTP stack.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Body of a resolved response.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanBody {
    Empty,
    /// Literal bytes (a templated mock body or file)
    Bytes(Vec<u8>),
    /// A mock file streamed as-is, relative to the mock directory
    File { path: String },
    /// A JSON value, serialized on flush
    Json(Value),
}

/// Everything the transport needs to answer a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePlan {
    pub status: u16,
    /// Extra headers, sorted by name
    pub headers: Vec<(String, String)>,
    /// Explicit content type, if the route declares one
    pub content_type: Option<String>,
    pub body: PlanBody,
    /// Delay before the response is written
    pub latency: Duration,
    /// Mock file the response came from, for the access log
    pub mock_file: Option<String>,
}

impl ResponsePlan {
    /// A response with a status and nothing else.
    pub fn status_only(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content_type: None,
            body: PlanBody::Empty,
            latency: Duration::ZERO,
            mock_file: None,
        }
    }

    pub fn with_headers(mut self, headers: &HashMap<String, String>) -> Self {
        let mut headers: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();
        self.headers = headers;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_body(mut self, body: PlanBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency = Duration::from_millis(latency_ms);
        self
    }

    pub fn with_mock_file(mut self, mock_file: Option<String>) -> Self {
        self.mock_file = mock_file;
        self
    }

    /// 204 and 304 never carry a body or content headers.
    pub fn suppresses_body(&self) -> bool {
        matches!(self.status, 204 | 304)
    }
}

/// Content type for a mock file served without an explicit one.
pub fn content_type_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "json" => "application/json; charset=UTF-8",
        "xml" => "application/xml",
        "html" | "htm" => "text/html; charset=UTF-8",
        "txt" => "text/plain; charset=UTF-8",
        "css" => "text/css; charset=UTF-8",
        "js" => "application/javascript; charset=UTF-8",
        "csv" => "text/csv; charset=UTF-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
