//! Request logging layer.
//!
//! Logs every request that reaches the application at debug level: path,
//! full URI, connection metadata, all headers and the forwarded headers the
//! proxy setup depends on. The request and the response pass through
//! untouched.

use crate::web::Response;
use crate::web::proxy::ConnectionInfo;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::Poll;
use tower::{Layer, Service};
use tracing::{Instrument, Level, Span, debug_span};
use warp::http::Request;
use warp::hyper::Body;

/// Printed in place of a missing header.
pub const NOT_AVAILABLE: &str = "N/A";

const REDACTED: &str = "<redacted>";
const REDACTED_HEADERS: [&str; 3] = ["authorization", "proxy-authorization", "cookie"];

/// Headers reported explicitly, label first.
const CHECKED_HEADERS: [(&str, &str); 4] = [
    ("X-Forwarded-Host", "x-forwarded-host"),
    ("X-Forwarded-Proto", "x-forwarded-proto"),
    ("X-Forwarded-For", "x-forwarded-for"),
    ("Host", "host"),
];

#[derive(Clone, Copy, Debug, Default)]
pub struct RequestLoggingLayer;

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingMiddleware { inner }
    }
}

#[derive(Clone)]
pub struct RequestLoggingMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestLoggingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        if tracing::enabled!(Level::DEBUG) {
            log_request(&req);
        }

        let span = debug_span!(
            "http_request",
            http.method = %req.method(),
            http.url = %req.uri().path(),
            http.status_code = tracing::field::Empty,
        );

        let mut inner = self.inner.clone();
        let fut = async move {
            let response = inner.call(req).await?;
            Span::current().record("http.status_code", response.status().as_u16() as i64);
            Ok(response)
        }
        .instrument(span);

        Box::pin(fut)
    }
}

fn log_request(req: &Request<Body>) {
    tracing::debug!("{}", "-".repeat(50));
    tracing::debug!("Incoming request path: {}", req.uri().path());
    tracing::debug!("Incoming request URI: {}", req.uri());

    tracing::debug!("--- Request metadata ---");
    for (key, value) in request_metadata(req) {
        tracing::debug!("  {}: {}", key, value);
    }

    tracing::debug!("--- Forwarded headers ---");
    for (label, value) in checked_headers(req) {
        tracing::debug!("  {}: {}", label, value);
    }
    tracing::debug!("{}", "-".repeat(50));
}

/// Connection metadata followed by all request headers.
///
/// Credentials carried in headers are replaced by a placeholder.
pub fn request_metadata(req: &Request<Body>) -> Vec<(String, String)> {
    let mut metadata = Vec::with_capacity(req.headers().len() + 6);

    if let Some(info) = req.extensions().get::<ConnectionInfo>() {
        metadata.push(("remote_addr".to_owned(), info.remote_addr.to_string()));
        metadata.push(("server_name".to_owned(), info.server_name.clone()));
        metadata.push(("server_port".to_owned(), info.server_port.to_string()));
        metadata.push(("url_scheme".to_owned(), info.scheme.clone()));
    } else {
        metadata.push((
            "url_scheme".to_owned(),
            req.uri().scheme_str().unwrap_or("http").to_owned(),
        ));
    }

    metadata.push(("request_method".to_owned(), req.method().to_string()));
    metadata.push((
        "query_string".to_owned(),
        req.uri().query().unwrap_or_default().to_owned(),
    ));

    for (name, value) in req.headers() {
        let value = if REDACTED_HEADERS.contains(&name.as_str()) {
            REDACTED.to_owned()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        metadata.push((format!("header {}", name), value));
    }

    metadata
}

/// The forwarded headers and `Host`, with [`NOT_AVAILABLE`] for missing ones.
pub fn checked_headers(req: &Request<Body>) -> Vec<(&'static str, String)> {
    CHECKED_HEADERS
        .iter()
        .map(|(label, name)| {
            let value = req
                .headers()
                .get(*name)
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .unwrap_or_else(|| NOT_AVAILABLE.to_owned());
            (*label, value)
        })
        .collect()
}
