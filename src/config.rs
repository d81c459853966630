//! Configuration for the mock server.
//!
//! Defines the server settings, the `webServices` route declarations and
//! the layered construction `defaults -> options -> config file`.

use crate::error::ConfigError;
use crate::routes::RouteTable;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding a cloud-platform-assigned port.
pub const PORT_ENV_VAR: &str = "VCAP_APP_PORT";

/// Effective configuration of a mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MockServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Directory mock files are resolved against
    pub mock_directory: PathBuf,

    /// Values for `Access-Control-Allow-Origin`
    pub allowed_domains: Vec<String>,

    /// Values for `Access-Control-Allow-Headers`
    pub allowed_headers: Vec<String>,

    /// Value for `Access-Control-Allow-Credentials`
    pub cors_credentials: Option<String>,

    /// Log the headers of every request
    pub log_request_headers: bool,

    /// Decode every request body as JSON, whatever its content type
    pub allow_avoid_pre_flight: bool,

    /// Only log errors
    pub quiet: bool,

    /// Default latency (ms) for routes that declare none
    pub latency: Option<u64>,

    /// Prefix all mocked routes are mounted under
    pub basepath: Option<String>,

    /// Upstream service receiving requests no route matches
    #[serde(rename = "proxyURL")]
    pub proxy_url: Option<String>,

    /// Directory served verbatim under `static_path`
    pub static_directory: Option<PathBuf>,

    /// URL prefix for `static_directory`
    pub static_path: Option<String>,

    /// Route declarations keyed by service URL, in file order
    pub web_services: Map<String, Value>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: 8888,
            mock_directory: PathBuf::from("./mocks/"),
            allowed_domains: vec!["*".to_string()],
            allowed_headers: vec!["Content-Type".to_string()],
            cors_credentials: None,
            log_request_headers: false,
            allow_avoid_pre_flight: false,
            quiet: false,
            latency: None,
            basepath: None,
            proxy_url: None,
            static_directory: None,
            static_path: None,
            web_services: Map::new(),
        }
    }
}

impl MockServerConfig {
    /// Build a configuration from defaults, then `options`, then `file`.
    ///
    /// Later layers win field by field. Neither layer is modified.
    pub fn from_layers(options: &ConfigLayer, file: &ConfigLayer) -> Self {
        Self::default().apply(options).apply(file)
    }

    /// Load a configuration file and layer it over `options`.
    pub fn load(path: &Path, options: &ConfigLayer) -> Result<Self, ConfigError> {
        let file = ConfigLayer::from_file(path)?;
        let config = Self::from_layers(options, &file).with_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides and expand `~` in directories.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(PORT_ENV_VAR).and_then(|p| p.trim().parse().ok()) {
            debug!(port, "Using port from {}", PORT_ENV_VAR);
            self.port = port;
        }
        if let Some(home) = lookup("HOME") {
            self.mock_directory = expand_home(&self.mock_directory, &home);
            self.static_directory = self
                .static_directory
                .map(|dir| expand_home(&dir, &home));
        }
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let routes = RouteTable::normalize(&self.web_services, self.latency)?;
        for route in &routes {
            route.validate()?;
        }
        Ok(())
    }

    fn apply(mut self, layer: &ConfigLayer) -> Self {
        let layer = layer.clone();
        if let Some(port) = layer.port {
            self.port = port;
        }
        if let Some(dir) = layer.mock_directory {
            self.mock_directory = dir;
        }
        if let Some(domains) = layer.allowed_domains {
            self.allowed_domains = domains;
        }
        if let Some(headers) = layer.allowed_headers {
            self.allowed_headers = headers;
        }
        if let Some(quiet) = layer.quiet {
            self.quiet = quiet;
        }
        if let Some(flag) = layer.log_request_headers {
            self.log_request_headers = flag;
        }
        if let Some(flag) = layer.allow_avoid_pre_flight {
            self.allow_avoid_pre_flight = flag;
        }
        if let Some(services) = layer.web_services {
            self.web_services = services;
        }
        self.cors_credentials = layer.cors_credentials.or(self.cors_credentials);
        self.latency = layer.latency.or(self.latency);
        self.basepath = layer.basepath.or(self.basepath);
        self.proxy_url = layer.proxy_url.or(self.proxy_url);
        self.static_directory = layer.static_directory.or(self.static_directory);
        self.static_path = layer.static_path.or(self.static_path);
        self
    }
}

/// One layer of settings. Every field is optional; unset fields fall
/// through to the layer below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigLayer {
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    pub mock_directory: Option<PathBuf>,
    pub allowed_domains: Option<Vec<String>>,
    pub allowed_headers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_loose_string")]
    pub cors_credentials: Option<String>,
    pub log_request_headers: Option<bool>,
    pub allow_avoid_pre_flight: Option<bool>,
    pub quiet: Option<bool>,
    pub latency: Option<u64>,
    pub basepath: Option<String>,
    #[serde(rename = "proxyURL")]
    pub proxy_url: Option<String>,
    pub static_directory: Option<PathBuf>,
    pub static_path: Option<String>,
    pub web_services: Option<Map<String, Value>>,
}

impl ConfigLayer {
    /// Read a layer from a JSON (`.json`) or YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// A `webServices` entry before verb expansion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDeclaration {
    /// Verbs this service answers to
    #[serde(default)]
    pub verbs: Vec<String>,

    /// Extra paths sharing this declaration
    #[serde(default)]
    pub alternate_paths: Vec<String>,

    /// Per-verb overrides merged over the declaration
    #[serde(default)]
    pub responses: HashMap<String, RouteOverride>,

    /// Fields shared by every verb
    #[serde(flatten)]
    pub route: RouteOverride,
}

/// A partial route definition.
///
/// Used for declarations, per-verb `responses`, `switchResponses` entries
/// and admin updates. Unset fields leave the target untouched on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch: Option<SwitchSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_responses: Option<HashMap<String, RouteOverride>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_switch: Option<SwitchSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_template: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_path_switch_response: Option<JsonPathSwitchResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bodies: Option<HashMap<String, Vec<BodyFilter>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_request_headers: Option<bool>,
}

/// A `switch` or `templateSwitch` field: one rule or an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SwitchSpec {
    Many(Vec<RawSwitchRule>),
    One(RawSwitchRule),
}

impl SwitchSpec {
    /// The rules in declaration order.
    pub fn rules(&self) -> &[RawSwitchRule] {
        match self {
            SwitchSpec::One(rule) => std::slice::from_ref(rule),
            SwitchSpec::Many(rules) => rules,
        }
    }
}

/// A switch rule as written in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSwitchRule {
    /// `"productId"`, `"/regex/"` or `"$.json.path"`
    Bare(String),
    /// `{ key, switch, type }`
    Explicit(ExplicitSwitchRule),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplicitSwitchRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Configuration of a JSONPath projection response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPathSwitchResponse {
    /// Expression, may contain `#param#` placeholders
    pub jsonpath: String,
    /// JSON document the expression is evaluated against
    pub mock_file: String,
    /// Answer with the first match instead of the match list
    #[serde(default)]
    pub force_first_object: bool,
}

/// Expected request body for a verb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodyFilter {
    /// Raw body must equal this text
    Raw(String),
    /// `{ "<algorithm>": "<hex digest>" }`
    Digest(HashMap<String, String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseScalar {
    Number(u64),
    Bool(bool),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<LooseScalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(LooseScalar::Number(n)) => u16::try_from(n)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(LooseScalar::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
        Some(LooseScalar::Bool(_)) => Err(serde::de::Error::custom("port must be a number")),
    }
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_port(deserializer)
}

fn deserialize_loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<LooseScalar>::deserialize(deserializer)?.map(|v| match v {
        LooseScalar::Number(n) => n.to_string(),
        LooseScalar::Bool(b) => b.to_string(),
        LooseScalar::Text(s) => s,
    }))
}

fn expand_home(path: &Path, home: &str) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => Path::new(home).join(rest),
        Err(_) => path.to_path_buf(),
    }
}
