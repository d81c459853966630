//! Response body templating.
//!
//! Tokens are replaced literally: `"@@name"` (quotes included) first, so
//! a numeric value lands unquoted in JSON, then bare `@name`.

use crate::request::MockRequest;
use crate::routes::RouteDefinition;
use crate::switch::SwitchRule;
use std::collections::HashMap;
use tracing::debug;

/// Replace the tokens for one key.
pub fn fill(text: &str, key: &str, value: &str) -> String {
    text.replace(&format!("\"@@{}\"", key), value)
        .replace(&format!("@{}", key), value)
}

/// Replace tokens for every request path parameter.
///
/// Longer names go first so `@id` cannot eat the prefix of `@idType`.
pub fn fill_params(text: &str, params: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    keys.into_iter()
        .fold(text.to_string(), |acc, key| fill(&acc, key, &params[key]))
}

/// Replace tokens for every resolved `templateSwitch` rule, in order.
pub fn fill_switch_values(text: &str, rules: &[SwitchRule]) -> String {
    rules.iter().fold(text.to_string(), |acc, rule| match &rule.value {
        Some(value) => fill(&acc, &rule.key, value),
        None => acc,
    })
}

/// Apply the route's templating to a response body.
///
/// `templateSwitch` values are filled before path parameters.
pub fn apply(text: &str, route: &RouteDefinition, req: &MockRequest) -> String {
    let mut body = text.to_string();
    if !route.template_switch.is_empty() {
        debug!(service_url = %route.service_url, "Applying templateSwitch");
        body = fill_switch_values(&body, &route.template_switch);
    }
    if route.enable_template {
        body = fill_params(&body, &req.path_params);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteOverride;
    use crate::routes::Verb;
    use crate::switch::resolve_template_switch;
    use serde_json::json;

    #[test]
    fn test_quoted_token_becomes_raw_value() {
        let text = r#"{"number": "@@number", "label": "No. @number"}"#;
        assert_eq!(fill(text, "number", "4"), r#"{"number": 4, "label": "No. 4"}"#);
    }

    #[test]
    fn test_every_occurrence_is_replaced() {
        assert_eq!(fill("@a @a @a", "a", "x"), "x x x");
    }

    #[test]
    fn test_longer_params_first() {
        let params = HashMap::from([
            ("id".to_string(), "1".to_string()),
            ("idType".to_string(), "user".to_string()),
        ]);
        assert_eq!(fill_params("@idType:@id", &params), "user:1");
    }

    #[test]
    fn test_apply_respects_flags() {
        let fields: RouteOverride = serde_json::from_value(json!({
            "mockBody": "{\"name\": \"@name\"}",
        }))
        .unwrap();
        let mut route = RouteDefinition::from_override("template/:name", Verb::Get, &fields, None);
        let req = MockRequest::new("GET", "/template/john").with_path_param("name", "john");

        let body = route.mock_body.clone().unwrap();
        assert_eq!(apply(&body, &route, &req), body);

        route.enable_template = true;
        assert_eq!(apply(&body, &route, &req), "{\"name\": \"john\"}");
    }

    #[test]
    fn test_template_switch_then_params() {
        let fields: RouteOverride = serde_json::from_value(json!({
            "enableTemplate": true,
            "templateSwitch": [
                {"key": "appID", "switch": "appID"},
                {"key": "count", "switch": "$.count"}
            ]
        }))
        .unwrap();
        let mut route = RouteDefinition::from_override("tpl/:name", Verb::Post, &fields, None);
        let req = MockRequest::new("POST", "/tpl/ann")
            .with_json(json!({"appID": "abc", "count": 3}))
            .with_path_param("name", "ann");
        resolve_template_switch(&mut route.template_switch, &req);

        let text = r#"{"app": "@appID", "count": "@@count", "who": "@name"}"#;
        assert_eq!(
            apply(text, &route, &req),
            r#"{"app": "abc", "count": 3, "who": "ann"}"#
        );
    }
}
