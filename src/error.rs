//! Error types for configuration loading and response resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or normalizing a configuration.
///
/// These are reported to the operator once at load time; a configuration
/// that fails here never reaches the route table.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("web service declared with an empty serviceUrl")]
    MissingServiceUrl,

    #[error("web service '{service_url}' declares no verbs")]
    MissingVerbs { service_url: String },

    #[error("web service '{service_url}' declares unknown verb '{verb}'")]
    UnknownVerb { service_url: String, verb: String },

    #[error("web service '{service_url}' has invalid httpStatus {status}")]
    InvalidStatus { service_url: String, status: u16 },

    #[error("web service '{service_url}' is malformed: {source}")]
    InvalidService {
        service_url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("web service '{service_url}' has invalid switch pattern '{pattern}': {source}")]
    InvalidSwitchPattern {
        service_url: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Back-end failures hit while materializing a response.
///
/// Never sent to the client: the resolver logs them and answers with the
/// route's configured status (or 404) and an empty body.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to read mock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mock file {path} is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSONPath expression '{expression}': {message}")]
    JsonPath { expression: String, message: String },
}
