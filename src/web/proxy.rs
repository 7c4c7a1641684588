//! Trusted reverse proxy handling.
//!
//! The launcher sits behind a TLS terminating proxy. Forwarded headers are
//! only meaningful if that proxy set them, so for each connection we check
//! the peer against the trusted proxy network:
//!
//! - trusted peers: `X-Forwarded-For/-Host/-Proto/-Port` are applied to the
//!   [`ConnectionInfo`] and `Host` is replaced by the forwarded host
//! - untrusted peers: these headers are removed before the request reaches
//!   the pipeline

use crate::config::TrustedProxy;
use crate::web::Response;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use tower::Service;
use warp::http::header::HOST;
use warp::http::{HeaderMap, HeaderValue, Request};
use warp::hyper::Body;

/// Proxy trust configuration shared by all connections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyTrust {
    pub proxy: TrustedProxy,
    pub headers: Vec<&'static str>,
}

/// Connection level metadata attached to every request as an extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Client address, taken from `X-Forwarded-For` for trusted peers.
    pub remote_addr: IpAddr,
    /// The socket peer which actually connected to us.
    pub peer_addr: SocketAddr,
    pub server_name: String,
    pub server_port: u16,
    pub scheme: String,
    pub trusted_proxy: bool,
}

impl ConnectionInfo {
    /// Derives the connection info for a request and sanitizes its headers.
    pub fn resolve(
        trust: &ProxyTrust,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        headers: &mut HeaderMap,
    ) -> ConnectionInfo {
        let trusted_proxy = trust.proxy.contains(peer_addr.ip());

        if !trusted_proxy {
            for name in &trust.headers {
                if headers.remove(*name).is_some() {
                    tracing::debug!(
                        "Dropped '{}' header sent by untrusted peer {}",
                        name,
                        peer_addr
                    );
                }
            }
        }

        let honored = |name: &str| {
            if trusted_proxy && trust.headers.iter().any(|header| *header == name) {
                header_str(headers, name)
            } else {
                None
            }
        };

        let remote_addr = honored("x-forwarded-for")
            .and_then(|value| value.rsplit(',').next())
            .and_then(|client| client.trim().parse::<IpAddr>().ok())
            .unwrap_or(peer_addr.ip());
        let scheme = honored("x-forwarded-proto")
            .and_then(|value| value.split(',').next())
            .map(|scheme| scheme.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "http".to_owned());
        let forwarded_host = honored("x-forwarded-host")
            .and_then(|value| value.split(',').next())
            .map(|host| host.trim().to_owned());
        let forwarded_port = honored("x-forwarded-port")
            .and_then(|value| value.trim().parse::<u16>().ok());

        if let Some(host) = &forwarded_host
            && let Ok(value) = HeaderValue::from_str(host)
        {
            headers.insert(HOST, value);
        }

        let host = header_str(headers, HOST.as_str()).map(str::to_owned);
        let (server_name, host_port) = match &host {
            Some(host) => split_host_port(host),
            None => (local_addr.ip().to_string(), None),
        };

        let server_port = match (forwarded_port, &forwarded_host) {
            (Some(port), _) => port,
            (None, Some(_)) => host_port.unwrap_or_else(|| default_port(&scheme)),
            (None, None) => local_addr.port(),
        };

        ConnectionInfo {
            remote_addr,
            peer_addr,
            server_name,
            server_port,
            scheme,
            trusted_proxy,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn default_port(scheme: &str) -> u16 {
    if scheme == "https" { 443 } else { 80 }
}

fn split_host_port(host: &str) -> (String, Option<u16>) {
    if host.ends_with(']') {
        return (host.to_owned(), None);
    }

    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse::<u16>() {
            Ok(port) => (name.to_owned(), Some(port)),
            Err(_) => (host.to_owned(), None),
        },
        None => (host.to_owned(), None),
    }
}

/// Per connection service applying [`ConnectionInfo::resolve`] to each request.
#[derive(Clone)]
pub struct ProxyHeadersMiddleware<S> {
    inner: S,
    trust: Arc<ProxyTrust>,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl<S> ProxyHeadersMiddleware<S> {
    pub fn new(
        inner: S,
        trust: Arc<ProxyTrust>,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
    ) -> Self {
        ProxyHeadersMiddleware {
            inner,
            trust,
            peer_addr,
            local_addr,
        }
    }
}

impl<S> Service<Request<Body>> for ProxyHeadersMiddleware<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let info = ConnectionInfo::resolve(
            &self.trust,
            self.peer_addr,
            self.local_addr,
            req.headers_mut(),
        );
        req.extensions_mut().insert(info);

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionInfo, ProxyHeadersMiddleware, ProxyTrust};
    use crate::config::TrustedProxy;
    use crate::config::server::TRUSTED_PROXY_HEADERS;
    use crate::web::Response;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::str::FromStr;
    use std::sync::Arc;
    use tower::ServiceExt;
    use tower::service_fn;
    use warp::http::{HeaderMap, HeaderValue, Request};
    use warp::hyper::Body;

    fn trust(proxy: &str) -> ProxyTrust {
        ProxyTrust {
            proxy: TrustedProxy::from_str(proxy).unwrap(),
            headers: TRUSTED_PROXY_HEADERS.to_vec(),
        }
    }

    fn forwarded_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("127.0.0.1:9090"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.2"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("links.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers
    }

    fn addr(value: &str) -> SocketAddr {
        SocketAddr::from_str(value).unwrap()
    }

    #[test]
    fn trusted_peer_headers_are_applied() {
        let mut headers = forwarded_headers();

        let info = ConnectionInfo::resolve(
            &trust("127.0.0.1"),
            addr("127.0.0.1:50000"),
            addr("127.0.0.1:9090"),
            &mut headers,
        );

        assert!(info.trusted_proxy);
        assert_eq!(info.remote_addr.to_string(), "10.0.0.2");
        assert_eq!(info.scheme, "https");
        assert_eq!(info.server_name, "links.example.com");
        assert_eq!(info.server_port, 443);
        assert_eq!(headers["host"], "links.example.com");
        assert!(headers.contains_key("x-forwarded-proto"));
    }

    #[test]
    fn untrusted_peer_headers_are_removed() {
        let mut headers = forwarded_headers();

        let info = ConnectionInfo::resolve(
            &trust("127.0.0.1"),
            addr("192.0.2.10:50000"),
            addr("0.0.0.0:9090"),
            &mut headers,
        );

        assert!(!info.trusted_proxy);
        assert_eq!(info.remote_addr.to_string(), "192.0.2.10");
        assert_eq!(info.scheme, "http");
        assert_eq!(info.server_name, "127.0.0.1");
        assert_eq!(info.server_port, 9090);
        assert_eq!(headers["host"], "127.0.0.1:9090");
        assert!(!headers.contains_key("x-forwarded-for"));
        assert!(!headers.contains_key("x-forwarded-host"));
        assert!(!headers.contains_key("x-forwarded-proto"));
    }

    #[test]
    fn forwarded_port_wins() {
        let mut headers = forwarded_headers();
        headers.insert("x-forwarded-port", HeaderValue::from_static("9095"));

        let info = ConnectionInfo::resolve(
            &trust("*"),
            addr("10.1.1.1:1"),
            addr("127.0.0.1:9090"),
            &mut headers,
        );

        assert_eq!(info.server_port, 9095);
    }

    #[tokio::test]
    async fn middleware_attaches_connection_info() {
        let inner = service_fn(|req: Request<Body>| async move {
            let info = req.extensions().get::<ConnectionInfo>().cloned().unwrap();
            Ok::<Response, Infallible>(Response::new(Body::from(info.remote_addr.to_string())))
        });
        let service = ProxyHeadersMiddleware::new(
            inner,
            Arc::new(trust("127.0.0.1")),
            addr("127.0.0.1:50000"),
            addr("127.0.0.1:9090"),
        );
        let request = Request::get("/")
            .header("x-forwarded-for", "198.51.100.1")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();
        let body = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();

        assert_eq!(&body[..], b"198.51.100.1");
    }
}
