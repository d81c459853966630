//! Response resolution.
//!
//! Turns a route definition and a live request into a [`ResponsePlan`].
//! The decision order is fixed and the first applicable step wins:
//!
//! 1. `httpStatus` 204 or 304: status only, without the route's headers
//! 2. `bodies` filters for the method: 404 unless one matches
//! 3. `switch` without `jsonPathSwitchResponse`: pick the variant, falling
//!    back to the base mock file when the renamed one does not exist
//! 4. `templateSwitch`: resolve template values
//! 5. `mockBody`: templated inline body
//! 6. no `mockFile`: configured status or 404
//! 7. `switch` with `jsonPathSwitchResponse`: JSONPath projection
//! 8. `mockFile`: templated when `contentType` is set, streamed otherwise
//!
//! The route passed in is never modified; all per-request state lives on
//! a working copy.

use crate::error::ResolveError;
use crate::filter;
use crate::jsonpath;
use crate::request::MockRequest;
use crate::response::{PlanBody, ResponsePlan};
use crate::routes::RouteDefinition;
use crate::store::MockStore;
use crate::switch::{apply_switch, resolve_template_switch, SwitchOutcome};
use crate::template;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Resolves routes against requests, reading mock files from a store.
#[derive(Clone)]
pub struct ResponseResolver {
    store: Arc<dyn MockStore>,
    log_request_headers: bool,
}

impl ResponseResolver {
    pub fn new(store: Arc<dyn MockStore>) -> Self {
        Self {
            store,
            log_request_headers: false,
        }
    }

    /// Log the headers of every resolved request.
    pub fn with_request_header_logging(mut self, enabled: bool) -> Self {
        self.log_request_headers = enabled;
        self
    }

    /// Store mock files are read from.
    pub fn store(&self) -> &Arc<dyn MockStore> {
        &self.store
    }

    /// Resolve a route for a request.
    pub async fn resolve(&self, route: &RouteDefinition, req: &MockRequest) -> ResponsePlan {
        if let Some(status @ (204 | 304)) = route.http_status {
            return ResponsePlan::status_only(status).with_latency(route.latency);
        }

        if let Some(filters) = route.bodies.get(&req.method.to_ascii_lowercase()) {
            if !filter::matches_any(filters, &req.raw_body_text()) {
                debug!(service_url = %route.service_url, "Request body matched no filter");
                return ResponsePlan::status_only(404).with_latency(route.latency);
            }
        }

        let mut working = route.clone();

        if !working.switch.is_empty() && working.json_path_switch_response.is_none() {
            if let SwitchOutcome::Rewritten { base } = apply_switch(&mut working, req) {
                let candidate = working.mock_file.clone().unwrap_or_default();
                match self.store.exists(&candidate).await {
                    Ok(true) => debug!(mock_file = %candidate, "Using switched mock file"),
                    Ok(false) => {
                        warn!(
                            mock_file = %candidate,
                            base = %base,
                            "No file found for switch, using base mock file"
                        );
                        working.mock_file = Some(base);
                    }
                    Err(e) => return self.failure(&working, e),
                }
            }
        }

        if !working.template_switch.is_empty() {
            resolve_template_switch(&mut working.template_switch, req);
        }

        if self.log_request_headers || working.log_request_headers {
            info!(method = %req.method, path = %req.path, headers = ?req.headers, "Request headers");
        }

        if let Some(mock_body) = &working.mock_body {
            let body = template::apply(mock_body, &working, req);
            return self
                .plan(&working, 200)
                .with_content_type(working.content_type.clone())
                .with_body(PlanBody::Bytes(body.into_bytes()));
        }

        let Some(mock_file) = working.mock_file.clone() else {
            return self.plan(&working, 404);
        };

        if !working.switch.is_empty() {
            if let Some(projection) = &working.json_path_switch_response {
                return match jsonpath::project(projection, req, self.store.as_ref()).await {
                    Ok(Some(value)) => self
                        .plan(&working, 200)
                        .with_body(PlanBody::Json(value))
                        .with_mock_file(Some(projection.mock_file.clone())),
                    Ok(None) => self
                        .plan(&working, 200)
                        .with_mock_file(Some(projection.mock_file.clone())),
                    Err(e) => self.failure(&working, e),
                };
            }
        }

        match &working.content_type {
            Some(content_type) => match self.store.read(&mock_file).await {
                Ok(Some(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let body = template::apply(&text, &working, req);
                    self.plan(&working, 200)
                        .with_content_type(Some(content_type.clone()))
                        .with_body(PlanBody::Bytes(body.into_bytes()))
                        .with_mock_file(Some(mock_file))
                }
                Ok(None) => self.missing(&working, &mock_file),
                Err(e) => self.failure(&working, e),
            },
            None => match self.store.exists(&mock_file).await {
                Ok(true) => self
                    .plan(&working, 200)
                    .with_body(PlanBody::File {
                        path: mock_file.clone(),
                    })
                    .with_mock_file(Some(mock_file)),
                Ok(false) => self.missing(&working, &mock_file),
                Err(e) => self.failure(&working, e),
            },
        }
    }

    /// A plan with the route's status (or `fallback`), headers and latency.
    fn plan(&self, route: &RouteDefinition, fallback: u16) -> ResponsePlan {
        ResponsePlan::status_only(route.status_or(fallback))
            .with_headers(&route.headers)
            .with_latency(route.latency)
    }

    fn missing(&self, route: &RouteDefinition, mock_file: &str) -> ResponsePlan {
        warn!(
            service_url = %route.service_url,
            mock_file,
            "Mock file not found in {}",
            self.store.root().display()
        );
        self.plan(route, 404)
    }

    fn failure(&self, route: &RouteDefinition, e: ResolveError) -> ResponsePlan {
        error!(service_url = %route.service_url, "Failed to resolve response: {}", e);
        ResponsePlan::status_only(route.status_or(404)).with_latency(route.latency)
    }
}
