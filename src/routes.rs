//! Route table.
//!
//! Expands `webServices` declarations into one [`RouteDefinition`] per
//! (path, verb) and answers transport lookups. The table is keyed by
//! service URL and is replaced wholesale, never edited in place, while
//! requests are being served.

use crate::config::{BodyFilter, JsonPathSwitchResponse, MockServerConfig, RouteOverride, ServiceDeclaration};
use crate::error::ConfigError;
use crate::matcher::PathPattern;
use crate::switch::{SwitchKind, SwitchRule};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// HTTP verbs a route can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    /// Any method
    All,
}

impl Verb {
    /// Parse a verb name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "get" => Some(Verb::Get),
            "post" => Some(Verb::Post),
            "put" => Some(Verb::Put),
            "delete" => Some(Verb::Delete),
            "patch" => Some(Verb::Patch),
            "all" => Some(Verb::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Post => "post",
            Verb::Put => "put",
            Verb::Delete => "delete",
            Verb::Patch => "patch",
            Verb::All => "all",
        }
    }

    /// Whether a request with this HTTP method is served by the verb.
    pub fn accepts(&self, method: &str) -> bool {
        match self {
            Verb::All => true,
            Verb::Get => method.eq_ignore_ascii_case("get") || method.eq_ignore_ascii_case("head"),
            _ => method.eq_ignore_ascii_case(self.as_str()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one (path, verb) pair responds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDefinition {
    pub service_url: String,
    pub verb: Verb,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub latency: u64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub switch: Vec<SwitchRule>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub switch_responses: HashMap<String, RouteOverride>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub template_switch: Vec<SwitchRule>,
    pub enable_template: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_path_switch_response: Option<JsonPathSwitchResponse>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub bodies: HashMap<String, Vec<BodyFilter>>,
    pub log_request_headers: bool,
}

impl RouteDefinition {
    /// An empty definition; leading slashes of the URL are dropped.
    pub fn new(service_url: &str, verb: Verb) -> Self {
        Self {
            service_url: canonical_url(service_url).to_string(),
            verb,
            mock_file: None,
            mock_body: None,
            content_type: None,
            http_status: None,
            latency: 0,
            headers: HashMap::new(),
            switch: Vec::new(),
            switch_responses: HashMap::new(),
            template_switch: Vec::new(),
            enable_template: false,
            json_path_switch_response: None,
            bodies: HashMap::new(),
            log_request_headers: false,
        }
    }

    /// Build a definition from a partial one.
    pub fn from_override(
        service_url: &str,
        verb: Verb,
        fields: &RouteOverride,
        default_latency: Option<u64>,
    ) -> Self {
        let mut route = Self::new(service_url, verb);
        route.latency = default_latency.unwrap_or(0);
        route.apply(fields);
        route
    }

    /// Shallow merge: every field set in `fields` replaces ours.
    pub fn apply(&mut self, fields: &RouteOverride) {
        if let Some(v) = &fields.mock_file {
            self.mock_file = Some(v.clone());
        }
        if let Some(v) = &fields.mock_body {
            self.mock_body = Some(v.clone());
        }
        if let Some(v) = &fields.content_type {
            self.content_type = Some(v.clone());
        }
        if let Some(v) = fields.http_status {
            self.http_status = Some(v);
        }
        if let Some(v) = fields.latency {
            self.latency = v;
        }
        if let Some(v) = &fields.headers {
            self.headers = v.clone();
        }
        if let Some(rules) = &fields.switch {
            self.switch = SwitchRule::normalize(rules, &self.service_url);
        }
        if let Some(v) = &fields.switch_responses {
            self.switch_responses = v.clone();
        }
        if let Some(rules) = &fields.template_switch {
            self.template_switch = SwitchRule::normalize(rules, &self.service_url);
        }
        if let Some(v) = fields.enable_template {
            self.enable_template = v;
        }
        if let Some(v) = &fields.json_path_switch_response {
            self.json_path_switch_response = Some(v.clone());
        }
        if let Some(v) = &fields.bodies {
            self.bodies = v
                .iter()
                .map(|(verb, filters)| (verb.to_ascii_lowercase(), filters.clone()))
                .collect();
        }
        if let Some(v) = fields.log_request_headers {
            self.log_request_headers = v;
        }
    }

    /// The configured status, or `fallback` when none is set.
    pub fn status_or(&self, fallback: u16) -> u16 {
        self.http_status.unwrap_or(fallback)
    }

    /// Validate status codes and regexp switch patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let statuses = std::iter::once(self.http_status)
            .chain(self.switch_responses.values().map(|o| o.http_status))
            .flatten();
        for status in statuses {
            if !(100..=599).contains(&status) {
                return Err(ConfigError::InvalidStatus {
                    service_url: self.service_url.clone(),
                    status,
                });
            }
        }

        let rules = self.switch.iter().chain(&self.template_switch);
        for rule in rules.filter(|r| r.kind == SwitchKind::Regexp) {
            if let Some(pattern) = rule.regex_pattern() {
                regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidSwitchPattern {
                    service_url: self.service_url.clone(),
                    pattern: pattern.to_string(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

/// A route matched by [`RouteTable::lookup`].
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteDefinition,
    /// Parameters captured from the service URL pattern
    pub path_params: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct ServiceRoutes {
    service_url: String,
    pattern: PathPattern,
    routes: Vec<RouteDefinition>,
}

/// Routes keyed by service URL, in registration order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    services: Vec<ServiceRoutes>,
}

impl RouteTable {
    /// Build the table for a configuration.
    pub fn from_config(config: &MockServerConfig) -> Result<Self, ConfigError> {
        let routes = Self::normalize(&config.web_services, config.latency)?;
        for route in &routes {
            route.validate()?;
        }
        Ok(Self::new(routes))
    }

    /// Expand declarations into one definition per (path, verb).
    ///
    /// Alternate paths are expanded after their primary path. Per-verb
    /// `responses` entries are merged over the shared fields.
    pub fn normalize(
        web_services: &Map<String, Value>,
        default_latency: Option<u64>,
    ) -> Result<Vec<RouteDefinition>, ConfigError> {
        let mut routes = Vec::new();

        for (service_url, raw) in web_services {
            if canonical_url(service_url).trim().is_empty() {
                return Err(ConfigError::MissingServiceUrl);
            }
            let decl: ServiceDeclaration =
                serde_json::from_value(raw.clone()).map_err(|source| {
                    ConfigError::InvalidService {
                        service_url: service_url.clone(),
                        source,
                    }
                })?;
            if decl.verbs.is_empty() {
                return Err(ConfigError::MissingVerbs {
                    service_url: service_url.clone(),
                });
            }

            let verbs = decl
                .verbs
                .iter()
                .map(|name| {
                    Verb::parse(name)
                        .map(|verb| (name, verb))
                        .ok_or_else(|| ConfigError::UnknownVerb {
                            service_url: service_url.clone(),
                            verb: name.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let paths = std::iter::once(service_url).chain(&decl.alternate_paths);
            for path in paths {
                for (name, verb) in &verbs {
                    let mut route =
                        RouteDefinition::from_override(path, *verb, &decl.route, default_latency);
                    let per_verb = decl
                        .responses
                        .get(name.as_str())
                        .or_else(|| decl.responses.get(verb.as_str()));
                    if let Some(fields) = per_verb {
                        route.apply(fields);
                    }
                    routes.push(route);
                }
            }
        }

        Ok(routes)
    }

    /// Build a table from normalized definitions.
    ///
    /// Definitions sharing a service URL are grouped; a repeated
    /// (URL, verb) pair keeps the later definition.
    pub fn new(routes: Vec<RouteDefinition>) -> Self {
        let mut table = Self::default();
        for route in routes {
            match table.position(&route.service_url) {
                Some(idx) => {
                    let entry = &mut table.services[idx];
                    match entry.routes.iter().position(|r| r.verb == route.verb) {
                        Some(existing) => entry.routes[existing] = route,
                        None => entry.routes.push(route),
                    }
                }
                None => table.services.push(ServiceRoutes::new(route)),
            }
        }
        table
    }

    /// Insert or replace the entry for a service URL.
    ///
    /// The previous entry, all verbs included, is dropped rather than
    /// merged. New URLs are appended.
    pub fn upsert(&mut self, route: RouteDefinition) {
        match self.position(&route.service_url) {
            Some(idx) => self.services[idx] = ServiceRoutes::new(route),
            None => self.services.push(ServiceRoutes::new(route)),
        }
    }

    /// Every definition, in registration order.
    pub fn registrations(&self) -> impl Iterator<Item = &RouteDefinition> {
        self.services.iter().flat_map(|s| s.routes.iter())
    }

    /// The definition registered for a service URL and verb.
    pub fn get(&self, service_url: &str, verb: Verb) -> Option<&RouteDefinition> {
        let idx = self.position(canonical_url(service_url))?;
        self.services[idx].routes.iter().find(|r| r.verb == verb)
    }

    /// Find the first route serving `method` on `path`.
    pub fn lookup(&self, method: &str, path: &str) -> Option<RouteMatch<'_>> {
        self.services.iter().find_map(|service| {
            let route = service.routes.iter().find(|r| r.verb.accepts(method))?;
            let path_params = service.pattern.matches(path)?;
            Some(RouteMatch { route, path_params })
        })
    }

    /// Number of (path, verb) registrations.
    pub fn len(&self) -> usize {
        self.services.iter().map(|s| s.routes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Log one line per registration.
    pub fn log_registrations(&self) {
        for route in self.registrations() {
            info!(
                verb = %route.verb.as_str().to_uppercase(),
                service_url = %route.service_url,
                mock_file = route.mock_file.as_deref().unwrap_or("<no mockFile>"),
                latency_ms = route.latency,
                "Set route"
            );
            if !route.switch.is_empty() {
                let switches: Vec<&str> = route.switch.iter().map(|r| r.switch.as_str()).collect();
                info!(service_url = %route.service_url, switch = ?switches, "With switch on param");
            }
        }
    }

    fn position(&self, service_url: &str) -> Option<usize> {
        self.services
            .iter()
            .position(|s| s.service_url == service_url)
    }
}

impl ServiceRoutes {
    fn new(route: RouteDefinition) -> Self {
        Self {
            service_url: route.service_url.clone(),
            pattern: PathPattern::parse(&route.service_url),
            routes: vec![route],
        }
    }
}

fn canonical_url(service_url: &str) -> &str {
    service_url.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn services(json: Value) -> Map<String, Value> {
        match json {
            Value::Object(map) => map,
            _ => panic!("Expected an object"),
        }
    }

    #[test]
    fn test_simple_service_expands_per_verb() {
        let web_services = services(json!({
            "first": {"mockFile": "king.json", "latency": 20, "verbs": ["get", "post"]}
        }));
        let routes = RouteTable::normalize(&web_services, None).unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].verb, Verb::Get);
        assert_eq!(routes[1].verb, Verb::Post);
        for route in &routes {
            assert_eq!(route.service_url, "first");
            assert_eq!(route.mock_file.as_deref(), Some("king.json"));
            assert_eq!(route.latency, 20);
            assert_eq!(route.http_status, None);
        }
    }

    #[test]
    fn test_per_verb_responses() {
        let web_services = services(json!({
            "second": {
                "verbs": ["delete", "post"],
                "responses": {
                    "delete": {"httpStatus": 204},
                    "post": {"contentType": "foobar", "mockFile": "king.json"}
                }
            }
        }));
        let routes = RouteTable::normalize(&web_services, None).unwrap();

        assert_eq!(routes[0].verb, Verb::Delete);
        assert_eq!(routes[0].http_status, Some(204));
        assert_eq!(routes[0].mock_file, None);
        assert_eq!(routes[0].latency, 0);

        assert_eq!(routes[1].verb, Verb::Post);
        assert_eq!(routes[1].content_type.as_deref(), Some("foobar"));
        assert_eq!(routes[1].mock_file.as_deref(), Some("king.json"));
    }

    #[test]
    fn test_default_latency() {
        let web_services = services(json!({
            "slow": {"verbs": ["get"], "mockFile": "a.json"},
            "fast": {"verbs": ["get"], "mockFile": "a.json", "latency": 0}
        }));
        let routes = RouteTable::normalize(&web_services, Some(50)).unwrap();
        assert_eq!(routes[0].latency, 50);
        assert_eq!(routes[1].latency, 0);
    }

    #[test]
    fn test_alternate_paths() {
        let web_services = services(json!({
            "first": {"mockFile": "king.json", "verbs": ["get"], "alternatePaths": ["1st"]}
        }));
        let table = RouteTable::new(RouteTable::normalize(&web_services, None).unwrap());

        assert_eq!(table.len(), 2);
        let alt = table.get("1st", Verb::Get).unwrap();
        assert_eq!(alt.mock_file.as_deref(), Some("king.json"));
        assert!(table.lookup("GET", "/1st").is_some());
    }

    #[test]
    fn test_missing_verbs_is_an_error() {
        let web_services = services(json!({"first": {"mockFile": "king.json"}}));
        assert!(matches!(
            RouteTable::normalize(&web_services, None),
            Err(ConfigError::MissingVerbs { .. })
        ));
    }

    #[test]
    fn test_unknown_verb_is_an_error() {
        let web_services = services(json!({"first": {"verbs": ["fetch"]}}));
        assert!(matches!(
            RouteTable::normalize(&web_services, None),
            Err(ConfigError::UnknownVerb { .. })
        ));
    }

    #[test]
    fn test_empty_service_url_is_an_error() {
        let web_services = services(json!({"/": {"verbs": ["get"]}}));
        assert!(matches!(
            RouteTable::normalize(&web_services, None),
            Err(ConfigError::MissingServiceUrl)
        ));
    }

    #[test]
    fn test_malformed_declaration_is_an_error() {
        let web_services = services(json!({"first": {"verbs": "get"}}));
        assert!(matches!(
            RouteTable::normalize(&web_services, None),
            Err(ConfigError::InvalidService { .. })
        ));
    }

    #[test]
    fn test_registration_order_follows_declarations() {
        let web_services = services(json!({
            "zeta": {"verbs": ["get"]},
            "alpha": {"verbs": ["get", "put"]},
            "mid": {"verbs": ["all"]}
        }));
        let table = RouteTable::new(RouteTable::normalize(&web_services, None).unwrap());
        let order: Vec<_> = table
            .registrations()
            .map(|r| format!("{} {}", r.verb, r.service_url))
            .collect();
        assert_eq!(order, vec!["get zeta", "get alpha", "put alpha", "all mid"]);
    }

    #[test]
    fn test_lookup_by_method_and_params() {
        let web_services = services(json!({
            "var/:id": {"mockFile": "xml/queen.xml", "verbs": ["get"]},
            "queen": {"mockFile": "xml/queen.xml", "verbs": ["all"]}
        }));
        let table = RouteTable::new(RouteTable::normalize(&web_services, None).unwrap());

        let found = table.lookup("GET", "/var/123").unwrap();
        assert_eq!(found.route.service_url, "var/:id");
        assert_eq!(found.path_params.get("id"), Some(&"123".to_string()));

        assert!(table.lookup("POST", "/var/123").is_none());
        assert!(table.lookup("DELETE", "/queen").is_some());
        assert!(table.lookup("GET", "/badurl").is_none());
    }

    #[test]
    fn test_upsert_replaces_whole_entry() {
        let web_services = services(json!({
            "third": {"mockFile": "ace.json", "verbs": ["get", "post"]}
        }));
        let mut table = RouteTable::new(RouteTable::normalize(&web_services, None).unwrap());

        let mut route = RouteDefinition::new("third", Verb::Post);
        route.mock_file = Some("king.json".to_string());
        route.http_status = Some(201);
        table.upsert(route.clone());

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("third", Verb::Post), Some(&route));
        assert!(table.get("third", Verb::Get).is_none());
    }

    #[test]
    fn test_upsert_appends_new_url() {
        let mut table = RouteTable::default();
        table.upsert(RouteDefinition::new("/fourth", Verb::Get));
        assert_eq!(table.len(), 1);
        assert!(table.get("fourth", Verb::Get).is_some());
        assert!(table.lookup("GET", "/fourth").is_some());
    }

    #[test]
    fn test_apply_is_shallow() {
        let mut route = RouteDefinition::new("login", Verb::Post);
        route.mock_file = Some("login.json".to_string());
        route.http_status = Some(401);
        route.headers.insert("x-a".to_string(), "1".to_string());

        let fields: RouteOverride = serde_json::from_value(json!({
            "httpStatus": 200,
            "headers": {"x-b": "2"}
        }))
        .unwrap();
        route.apply(&fields);

        assert_eq!(route.http_status, Some(200));
        assert_eq!(route.mock_file.as_deref(), Some("login.json"));
        assert_eq!(route.headers.len(), 1);
        assert_eq!(route.headers.get("x-b"), Some(&"2".to_string()));
    }

    #[test]
    fn test_validate_rejects_bad_regexp_switch() {
        let fields: RouteOverride =
            serde_json::from_value(json!({"switch": {"switch": "/([a-z/", "type": "regexp"}}))
                .unwrap();
        let route = RouteDefinition::from_override("bad", Verb::Post, &fields, None);
        assert!(matches!(
            route.validate(),
            Err(ConfigError::InvalidSwitchPattern { .. })
        ));
    }

    #[test]
    fn test_verb_accepts() {
        assert!(Verb::Get.accepts("GET"));
        assert!(Verb::Get.accepts("HEAD"));
        assert!(!Verb::Get.accepts("POST"));
        assert!(Verb::All.accepts("PATCH"));
        assert_eq!(Verb::parse("DELETE"), Some(Verb::Delete));
        assert_eq!(Verb::parse("fetch"), None);
    }
}
