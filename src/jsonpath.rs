//! JSONPath queries over request bodies and mock documents.

use crate::config::JsonPathSwitchResponse;
use crate::error::ResolveError;
use crate::request::MockRequest;
use crate::store::MockStore;
use jsonpath_rust::JsonPath;
use serde_json::Value;
use tracing::debug;

/// Evaluate an expression, returning every match in document order.
pub fn query(document: &Value, expression: &str) -> Result<Vec<Value>, ResolveError> {
    let path = JsonPath::try_from(expression).map_err(|e| ResolveError::JsonPath {
        expression: expression.to_string(),
        message: e.to_string(),
    })?;

    Ok(match path.find(document) {
        Value::Array(matches) => matches,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

/// The first match of an expression; invalid expressions match nothing.
pub fn first_match(document: &Value, expression: &str) -> Option<Value> {
    match query(document, expression) {
        Ok(matches) => matches.into_iter().find(|v| !v.is_null()),
        Err(e) => {
            debug!("{}", e);
            None
        }
    }
}

/// Replace every `#name#` in an expression with the route parameter
/// `name`. Unresolved placeholders are left in place.
pub fn fill_placeholders(expression: &str, req: &MockRequest) -> String {
    let mut filled = String::with_capacity(expression.len());
    let mut rest = expression;

    while let Some(start) = rest.find('#') {
        let after = &rest[start + 1..];
        let Some(len) = after.find('#') else {
            break;
        };
        let name = &after[..len];
        filled.push_str(&rest[..start]);
        match req.path_params.get(name).filter(|_| is_param_name(name)) {
            Some(value) => {
                filled.push_str(value);
                rest = &after[len + 1..];
            }
            None => {
                filled.push('#');
                rest = after;
            }
        }
    }

    filled.push_str(rest);
    filled
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Evaluate a JSONPath response against its mock document.
///
/// Returns the match list, or the first match when `forceFirstObject` is
/// set; `None` when first-object mode finds nothing.
pub async fn project(
    projection: &JsonPathSwitchResponse,
    req: &MockRequest,
    store: &dyn MockStore,
) -> Result<Option<Value>, ResolveError> {
    let expression = fill_placeholders(&projection.jsonpath, req);
    let document = match store.read(&projection.mock_file).await? {
        Some(bytes) => serde_json::from_slice::<Value>(&bytes).map_err(|source| {
            ResolveError::Json {
                path: projection.mock_file.clone(),
                source,
            }
        })?,
        None => {
            return Err(ResolveError::Io {
                path: store.root().join(&projection.mock_file),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock file not found"),
            })
        }
    };

    debug!(%expression, mock_file = %projection.mock_file, "Evaluating JSONPath response");
    let matches = query(&document, &expression)?;
    if projection.force_first_object {
        Ok(matches.into_iter().next())
    } else {
        Ok(Some(Value::Array(matches)))
    }
}
