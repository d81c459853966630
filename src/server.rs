//! HTTP front end of the mock server.
//!
//! Requests are dispatched in this order:
//!
//! 1. `basepath` is stripped; requests outside it skip to step 5
//! 2. `/admin/setMock` and `/admin/reload`
//! 3. the route table
//! 4. `staticDirectory` under `staticPath`
//! 5. `proxyURL`
//! 6. 404
//!
//! Every response carries the CORS headers and produces one access-log
//! line.

use crate::config::{ConfigLayer, MockServerConfig, RouteOverride};
use crate::error::ConfigError;
use crate::matcher::strip_basepath;
use crate::proxy::UpstreamProxy;
use crate::request::MockRequest;
use crate::resolver::ResponseResolver;
use crate::response::{content_type_for, PlanBody, ResponsePlan};
use crate::routes::{RouteDefinition, RouteTable, Verb};
use crate::store::{FsMockStore, MockStore};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Fields `/admin/setMock` reads from form or query parameters.
const ADMIN_FIELDS: [&str; 6] = [
    "serviceUrl",
    "verb",
    "mockFile",
    "latency",
    "contentType",
    "httpStatus",
];

/// A running mock server's state.
///
/// Each instance owns its configuration and route table, so several
/// servers can run in one process.
pub struct MockServer {
    config: MockServerConfig,
    config_path: Option<PathBuf>,
    options: ConfigLayer,
    routes: RwLock<Arc<RouteTable>>,
    resolver: ResponseResolver,
    static_files: Option<(String, FsMockStore)>,
    proxy: Option<UpstreamProxy>,
}

impl MockServer {
    /// Create a server for a loaded configuration.
    pub fn new(config: MockServerConfig) -> Result<Self, ConfigError> {
        let table = RouteTable::from_config(&config)?;
        table.log_registrations();

        let store = Arc::new(FsMockStore::new(&config.mock_directory));
        let resolver =
            ResponseResolver::new(store).with_request_header_logging(config.log_request_headers);

        let static_files = match (&config.static_directory, &config.static_path) {
            (Some(dir), Some(prefix)) => {
                info!(path = %prefix, directory = %dir.display(), "Serving static files");
                Some((prefix.clone(), FsMockStore::new(dir)))
            }
            _ => None,
        };

        let proxy = config.proxy_url.as_deref().map(|url| {
            info!(proxy_url = %url, "Proxying unmatched requests");
            UpstreamProxy::new(url)
        });

        info!(
            routes = table.len(),
            mock_directory = %config.mock_directory.display(),
            "Mock server initialized"
        );

        Ok(Self {
            config,
            config_path: None,
            options: ConfigLayer::default(),
            routes: RwLock::new(Arc::new(table)),
            resolver,
            static_files,
            proxy,
        })
    }

    /// Remember where the configuration came from, for `/admin/reload`.
    pub fn with_config_file(mut self, path: PathBuf, options: ConfigLayer) -> Self {
        self.config_path = Some(path);
        self.options = options;
        self
    }

    /// Snapshot of the current route table.
    pub async fn routes(&self) -> Arc<RouteTable> {
        self.routes.read().await.clone()
    }

    /// Insert or replace one service URL's route.
    ///
    /// The table is copied and swapped, so requests in flight keep the
    /// table they started with.
    pub async fn upsert(&self, route: RouteDefinition) {
        let mut current = self.routes.write().await;
        let mut table = RouteTable::clone(&current);
        table.upsert(route);
        *current = Arc::new(table);
    }

    /// Re-read the configuration file and swap in its routes.
    ///
    /// Only the route table is replaced; other settings keep the values
    /// the server started with.
    pub async fn reload(&self) -> Result<usize, ConfigError> {
        let Some(path) = &self.config_path else {
            return Ok(0);
        };
        info!(config = %path.display(), "Loading config file");
        let config = MockServerConfig::load(path, &self.options)?;
        let table = RouteTable::from_config(&config)?;
        table.log_registrations();

        let count = table.len();
        *self.routes.write().await = Arc::new(table);
        Ok(count)
    }

    /// Bind the configured port and serve until the task is dropped.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Mock server listening");
        self.serve(listener).await
    }

    /// Accept connections on `listener`, one task per connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, remote) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = Arc::clone(&self);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle(req).await) }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%remote, "Connection error: {}", e);
                }
            });
        }
    }

    /// Handle one request.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: fmt::Display,
    {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                Bytes::new()
            }
        };

        let (mut response, mock_file) = self.dispatch(&parts, body).await;
        self.add_cors_headers(response.headers_mut());

        let status = response.status().as_u16();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mock_file = mock_file.unwrap_or_default();
        if status >= 400 {
            error!(method = %parts.method, url = %parts.uri, status, mock_file = %mock_file, elapsed_ms, "Request");
        } else {
            info!(method = %parts.method, url = %parts.uri, status, mock_file = %mock_file, elapsed_ms, "Request");
        }
        response
    }

    async fn dispatch(&self, parts: &Parts, body: Bytes) -> (Response<Full<Bytes>>, Option<String>) {
        let full_path = parts.uri.path();
        let mounted = match self.config.basepath.as_deref() {
            Some(basepath) => strip_basepath(full_path, basepath),
            None => Some(full_path),
        };

        if let Some(path) = mounted {
            match path.trim_end_matches('/') {
                "/admin/setMock" => {
                    let req = self.request(parts, path, HashMap::new(), body);
                    return (self.admin_set_mock(&req).await, None);
                }
                "/admin/reload" => return (self.admin_reload().await, None),
                _ => {}
            }

            let table = self.routes().await;
            if let Some(found) = table.lookup(parts.method.as_str(), path) {
                let req = self.request(parts, path, found.path_params, body);
                let plan = self.resolver.resolve(found.route, &req).await;
                let mock_file = plan.mock_file.clone();
                return (self.flush(plan).await, mock_file);
            }
        }

        if let Some(response) = self.serve_static(parts).await {
            return (response, None);
        }
        if let Some(proxy) = &self.proxy {
            return (proxy.forward(parts, body).await, None);
        }
        (status_response(StatusCode::NOT_FOUND), None)
    }

    fn request(
        &self,
        parts: &Parts,
        path: &str,
        path_params: HashMap<String, String>,
        body: Bytes,
    ) -> MockRequest {
        let mut req = MockRequest::new(parts.method.as_str(), path);
        if let Some(query) = parts.uri.query() {
            req = req.with_query_string(query);
        }
        for (name, value) in parts.headers.iter() {
            if let Ok(value) = value.to_str() {
                req = req.with_header(name.as_str(), value);
            }
        }
        req.path_params = path_params;
        req.with_raw_body(body, self.config.allow_avoid_pre_flight)
    }

    /// Wait out the plan's latency, then build the response.
    async fn flush(&self, plan: ResponsePlan) -> Response<Full<Bytes>> {
        if !plan.latency.is_zero() {
            tokio::time::sleep(plan.latency).await;
        }

        let status = StatusCode::from_u16(plan.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut headers = HeaderMap::new();
        for (name, value) in &plan.headers {
            insert_header(&mut headers, name, value);
        }
        if plan.suppresses_body() {
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
            return build_response(status, headers, Bytes::new());
        }

        let body = match plan.body {
            PlanBody::Empty => Bytes::new(),
            PlanBody::Bytes(bytes) => {
                let content_type = plan
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream");
                insert_header(&mut headers, CONTENT_TYPE.as_str(), content_type);
                Bytes::from(bytes)
            }
            PlanBody::Json(value) => match serde_json::to_vec(&value) {
                Ok(bytes) => {
                    insert_header(&mut headers, CONTENT_TYPE.as_str(), "application/json; charset=utf-8");
                    Bytes::from(bytes)
                }
                Err(e) => {
                    error!("Failed to serialize JSON response: {}", e);
                    return status_response(StatusCode::INTERNAL_SERVER_ERROR);
                }
            },
            PlanBody::File { path } => match self.resolver.store().read(&path).await {
                Ok(Some(bytes)) => {
                    if !headers.contains_key(CONTENT_TYPE) {
                        insert_header(&mut headers, CONTENT_TYPE.as_str(), content_type_for(&path));
                    }
                    Bytes::from(bytes)
                }
                Ok(None) => {
                    warn!(mock_file = %path, "Mock file disappeared before it was sent");
                    return status_response(StatusCode::NOT_FOUND);
                }
                Err(e) => {
                    error!("{}", e);
                    return status_response(StatusCode::NOT_FOUND);
                }
            },
        };

        build_response(status, headers, body)
    }

    async fn admin_set_mock(&self, req: &MockRequest) -> Response<Full<Bytes>> {
        let route = match self.admin_route(req) {
            Ok(route) => route,
            Err(message) => {
                warn!("Rejected setMock request: {}", message);
                return json_response(StatusCode::BAD_REQUEST, &json!({ "error": message }));
            }
        };
        let echo = match serde_json::to_value(&route) {
            Ok(echo) => echo,
            Err(e) => {
                error!("Failed to serialize route: {}", e);
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        info!(
            verb = %route.verb.as_str().to_uppercase(),
            service_url = %route.service_url,
            mock_file = route.mock_file.as_deref().unwrap_or("<no mockFile>"),
            "Set route"
        );
        self.upsert(route).await;
        json_response(StatusCode::OK, &echo)
    }

    /// Build a route from a JSON body carrying `serviceUrl`, `verb` and
    /// `mockFile`, or else from individual request parameters.
    fn admin_route(&self, req: &MockRequest) -> Result<RouteDefinition, String> {
        let json = req.body.as_json();
        let fields: Map<String, Value> = match json.as_deref() {
            Some(Value::Object(map))
                if ["serviceUrl", "verb", "mockFile"]
                    .iter()
                    .all(|key| map.get(*key).is_some_and(|v| !v.is_null())) =>
            {
                map.clone()
            }
            _ => ADMIN_FIELDS
                .iter()
                .filter_map(|name| {
                    let value = req.param(name)?;
                    let value = match *name {
                        "latency" => value
                            .parse::<u64>()
                            .map(Value::from)
                            .unwrap_or(Value::String(value)),
                        _ => Value::String(value),
                    };
                    Some((name.to_string(), value))
                })
                .collect(),
        };

        let service_url = fields
            .get("serviceUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or("serviceUrl is required")?
            .to_string();
        let verb_name = fields
            .get("verb")
            .and_then(Value::as_str)
            .ok_or("verb is required")?;
        let verb = Verb::parse(verb_name).ok_or_else(|| format!("unknown verb '{}'", verb_name))?;

        let overrides: RouteOverride =
            serde_json::from_value(Value::Object(fields.clone())).map_err(|e| e.to_string())?;
        let route =
            RouteDefinition::from_override(&service_url, verb, &overrides, self.config.latency);
        route.validate().map_err(|e| e.to_string())?;
        Ok(route)
    }

    async fn admin_reload(&self) -> Response<Full<Bytes>> {
        let Some(path) = &self.config_path else {
            warn!("No config file path set.");
            return json_response(
                StatusCode::OK,
                &json!({"configFilePath": "", "reloaded": "false"}),
            );
        };

        match self.reload().await {
            Ok(routes) => {
                info!(config = %path.display(), routes, "Reloaded config");
                json_response(
                    StatusCode::OK,
                    &json!({"configFilePath": path.display().to_string(), "reloaded": "true"}),
                )
            }
            Err(e) => {
                error!(config = %path.display(), "Failed to reload config: {}", e);
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({"configFilePath": path.display().to_string(), "error": e.to_string()}),
                )
            }
        }
    }

    async fn serve_static(&self, parts: &Parts) -> Option<Response<Full<Bytes>>> {
        let (prefix, store) = self.static_files.as_ref()?;
        if parts.method != Method::GET && parts.method != Method::HEAD {
            return None;
        }
        let relative = strip_basepath(parts.uri.path(), prefix)?;
        let relative = urlencoding::decode(relative).ok()?;

        match store.read(&relative).await {
            Ok(Some(bytes)) => {
                let mut headers = HeaderMap::new();
                insert_header(&mut headers, CONTENT_TYPE.as_str(), content_type_for(&relative));
                Some(build_response(StatusCode::OK, headers, Bytes::from(bytes)))
            }
            Ok(None) => None,
            Err(e) => {
                debug!("Static file not served: {}", e);
                None
            }
        }
    }

    fn add_cors_headers(&self, headers: &mut HeaderMap) {
        let credentials = self.config.cors_credentials.as_deref().unwrap_or("");
        insert_header(
            headers,
            "access-control-allow-origin",
            &self.config.allowed_domains.join(","),
        );
        insert_header(headers, "access-control-allow-methods", "GET,PUT,POST,PATCH,DELETE");
        insert_header(
            headers,
            "access-control-allow-headers",
            &self.config.allowed_headers.join(","),
        );
        insert_header(headers, "access-control-allow-credentials", credentials);
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => warn!(header = %name, "Skipping invalid response header"),
    }
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    build_response(status, HeaderMap::new(), Bytes::new())
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    build_response(status, headers, Bytes::from(body.to_string()))
}
