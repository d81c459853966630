//! Switch rules.
//!
//! A switch extracts values from the live request (parameter lookup,
//! a regular expression over the raw body, or a JSONPath query over the
//! JSON body) and uses them to pick a response variant. The same rules
//! power `templateSwitch`, where the extracted values are substituted
//! into the response body instead.

use crate::config::{RawSwitchRule, SwitchSpec};
use crate::jsonpath;
use crate::request::{value_to_param, MockRequest};
use crate::routes::RouteDefinition;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

/// How a switch value is extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchKind {
    /// Request parameter lookup
    Default,
    /// First capture group of a `/regex/` over the body text
    Regexp,
    /// First match of a JSONPath query over the JSON body
    JsonPath,
}

impl SwitchKind {
    /// Infer the kind from the syntax of a bare switch string.
    pub fn infer(switch: &str) -> Self {
        if switch.len() > 2 && switch.starts_with('/') && switch.ends_with('/') {
            SwitchKind::Regexp
        } else if switch.starts_with('$') {
            SwitchKind::JsonPath
        } else {
            SwitchKind::Default
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "default" => Some(SwitchKind::Default),
            "regexp" => Some(SwitchKind::Regexp),
            "jsonpath" => Some(SwitchKind::JsonPath),
            _ => None,
        }
    }
}

/// A normalized switch rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchRule {
    /// Name used in the discriminator and as the template token
    pub key: String,
    /// Parameter name, `/regex/` or JSONPath expression
    pub switch: String,
    #[serde(rename = "type")]
    pub kind: SwitchKind,
    /// Written as a bare string; always tries a parameter lookup first
    #[serde(skip)]
    pub bare: bool,
    /// Resolved value, only set on per-request copies
    #[serde(skip)]
    pub value: Option<String>,
}

impl SwitchRule {
    /// Normalize one rule as written in the configuration.
    pub fn from_raw(raw: &RawSwitchRule) -> Result<Self, &'static str> {
        match raw {
            RawSwitchRule::Bare(switch) => {
                if switch.is_empty() {
                    return Err("empty switch");
                }
                Ok(Self {
                    key: switch.clone(),
                    switch: switch.clone(),
                    kind: SwitchKind::infer(switch),
                    bare: true,
                    value: None,
                })
            }
            RawSwitchRule::Explicit(rule) => {
                let switch = rule
                    .switch
                    .clone()
                    .filter(|s| !s.is_empty())
                    .ok_or("missing switch")?;
                let kind = match rule.kind.as_deref() {
                    Some(name) => SwitchKind::parse(name).ok_or("unknown switch type")?,
                    None => SwitchKind::infer(&switch),
                };
                let key = rule
                    .key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .unwrap_or_else(|| switch.clone());
                Ok(Self {
                    key,
                    switch,
                    kind,
                    bare: false,
                    value: None,
                })
            }
        }
    }

    /// Normalize a `switch` or `templateSwitch` field. Malformed rules are
    /// logged and dropped.
    pub fn normalize(field: &SwitchSpec, service_url: &str) -> Vec<Self> {
        field.rules()
            .iter()
            .filter_map(|raw| match Self::from_raw(raw) {
                Ok(rule) => Some(rule),
                Err(reason) => {
                    warn!(service_url, rule = ?raw, "Skipping switch rule: {}", reason);
                    None
                }
            })
            .collect()
    }

    /// The pattern between the first and last `/` of a regexp switch.
    pub fn regex_pattern(&self) -> Option<&str> {
        let start = self.switch.find('/')?;
        let end = self.switch.rfind('/')?;
        if end > start + 1 {
            Some(&self.switch[start + 1..end])
        } else {
            None
        }
    }

    /// Extract this rule's value from a request.
    ///
    /// The value is percent-encoded so it can be used in a file name.
    pub fn evaluate(&self, req: &MockRequest) -> Option<String> {
        let looked_up = if self.bare || self.kind == SwitchKind::Default {
            req.param(&self.switch)
        } else {
            None
        };

        let value = looked_up.or_else(|| match self.kind {
            SwitchKind::Regexp => self.capture(req),
            SwitchKind::JsonPath => self.query(req),
            SwitchKind::Default => None,
        })?;

        if value.is_empty() {
            None
        } else {
            Some(encode_component(&value))
        }
    }

    fn capture(&self, req: &MockRequest) -> Option<String> {
        let pattern = self.regex_pattern()?;
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(pattern, "Invalid switch regexp: {}", e);
                return None;
            }
        };
        let text = req.body.to_text();
        let captures = re.captures(&text)?;
        captures.get(1).map(|m| m.as_str().to_string())
    }

    fn query(&self, req: &MockRequest) -> Option<String> {
        let document = req.body.as_json()?;
        let found = jsonpath::first_match(&document, &self.switch)?;
        value_to_param(&found)
    }
}

/// Percent-encode a value, leaving `!'()*` as they are so switched file
/// names match the ones browsers and JavaScript tooling produce.
fn encode_component(value: &str) -> String {
    let encoded = urlencoding::encode(value);
    if !encoded.contains('%') {
        return encoded.into_owned();
    }
    encoded
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}

/// Concatenate `key + value` for every rule that resolves, in order.
///
/// Empty when no rule resolves.
pub fn discriminator(rules: &[SwitchRule], req: &MockRequest) -> String {
    rules
        .iter()
        .filter_map(|rule| rule.evaluate(req).map(|value| format!("{}{}", rule.key, value)))
        .collect()
}

/// What [`apply_switch`] did to a route.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOutcome {
    /// No rule resolved a value
    NoMatch,
    /// A `switchResponses` entry defining its own mock file was merged
    Pinned,
    /// A value resolved but there was no mock file to rename
    Matched,
    /// The mock file was renamed after the discriminator, after merging
    /// any `switchResponses` entry without a mock file of its own
    Rewritten {
        /// The mock file before renaming
        base: String,
    },
}

/// Resolve a route's `switch` against a request, updating `route` in place.
pub fn apply_switch(route: &mut RouteDefinition, req: &MockRequest) -> SwitchOutcome {
    let discriminator = discriminator(&route.switch, req);
    if discriminator.is_empty() {
        debug!(service_url = %route.service_url, "No switch value found");
        return SwitchOutcome::NoMatch;
    }

    if let Some(fields) = route.switch_responses.get(&discriminator).cloned() {
        debug!(service_url = %route.service_url, %discriminator, "Using switchResponses entry");
        route.apply(&fields);
        if fields.mock_file.is_some() {
            return SwitchOutcome::Pinned;
        }
    }

    match route.mock_file.take() {
        Some(base) => {
            route.mock_file = Some(rewrite_mock_file(&base, &discriminator));
            SwitchOutcome::Rewritten { base }
        }
        None => SwitchOutcome::Matched,
    }
}

/// `dir/name` becomes `dir/<discriminator>.name`.
pub fn rewrite_mock_file(mock_file: &str, discriminator: &str) -> String {
    match mock_file.rsplit_once('/') {
        Some((dir, name)) => format!("{}/{}.{}", dir, discriminator, name),
        None => format!("{}.{}", discriminator, mock_file),
    }
}

/// Resolve `templateSwitch` values for one request.
pub fn resolve_template_switch(rules: &mut [SwitchRule], req: &MockRequest) {
    for rule in rules.iter_mut() {
        rule.value = rule.evaluate(req);
        if rule.value.is_none() {
            warn!(key = %rule.key, switch = %rule.switch, "templateSwitch value not found");
        }
    }
}
