//! Forwarding of unmatched requests to an upstream service.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONNECTION, HOST, TRANSFER_ENCODING};
use hyper::http::request::Parts;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, error};

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Forwards requests to `proxyURL` and relays the answer.
#[derive(Clone)]
pub struct UpstreamProxy {
    base_url: String,
    client: HttpClient,
}

impl UpstreamProxy {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Forward a request with its already-collected body.
    ///
    /// Upstream failures are answered with 502.
    pub async fn forward(&self, parts: &Parts, body: Bytes) -> Response<Full<Bytes>> {
        let path = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let full_uri = format!("{}{}", self.base_url, path);
        debug!(method = %parts.method, uri = %full_uri, "Proxying request");

        let mut builder = Request::builder().method(parts.method.clone()).uri(&full_uri);
        for (name, value) in parts.headers.iter() {
            if name != HOST {
                builder = builder.header(name, value);
            }
        }
        let upstream_req = match builder.body(Full::new(body)) {
            Ok(req) => req,
            Err(e) => {
                error!(uri = %full_uri, "Invalid upstream request: {}", e);
                return bad_gateway();
            }
        };

        match self.client.request(upstream_req).await {
            Ok(upstream_response) => {
                let (mut parts, body) = upstream_response.into_parts();
                let body = match body.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(e) => {
                        error!(uri = %full_uri, "Failed to read upstream response: {}", e);
                        return bad_gateway();
                    }
                };
                // The body is re-sent whole
                parts.headers.remove(TRANSFER_ENCODING);
                parts.headers.remove(CONNECTION);
                Response::from_parts(parts, Full::new(body))
            }
            Err(e) => {
                error!(uri = %full_uri, "Failed to forward request to upstream: {}", e);
                bad_gateway()
            }
        }
    }
}

fn bad_gateway() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(b"Bad Gateway")));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response
}
