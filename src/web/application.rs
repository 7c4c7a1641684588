//! Built-in base application.
//!
//! The bookmark application proper runs elsewhere; this is the innermost
//! layer the launcher serves on its own. It exposes `GET /health`, rejects
//! requests whose host is not in `ALLOWED_HOSTS` and marks secure responses
//! with `Strict-Transport-Security`.

use crate::config::{SecurityPolicy, Settings};
use crate::web::Response;
use crate::web::error::ApiError;
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, LazyLock};
use warp::filters::BoxedFilter;
use warp::http::header::STRICT_TRANSPORT_SECURITY;
use warp::http::{HeaderMap, HeaderValue, StatusCode};
use warp::{Filter, Rejection, Reply};

static HOST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9.-]+|\[[a-f0-9]*:[a-f0-9.:]+\])(:[0-9]+)?$").expect("Invalid regex")
});

/// Assembles the base application for `settings`.
pub fn base_application(settings: &Settings) -> BoxedFilter<(Response,)> {
    let security = settings.security;
    let routes = with_allowed_host(
        Arc::new(settings.allowed_hosts.clone()),
        security.use_x_forwarded_host,
    )
    .and(get_health_route())
    .recover(handle_rejection)
    .unify();

    warp::header::headers_cloned()
        .and(routes)
        .map(move |headers: HeaderMap, response: Response| {
            apply_hsts(&security, &headers, response)
        })
        .boxed()
}

/// Creates the `/health` route reporting the launcher version.
pub fn get_health_route() -> BoxedFilter<(Response,)> {
    warp::path!("health")
        .and(warp::get())
        .and_then(handle_get_health)
        .boxed()
}

#[tracing::instrument(level = "debug", name = "GET /health", skip_all)]
async fn handle_get_health() -> Result<Response, Rejection> {
    Ok(warp::reply::json(&json!({
        "version": crate::APP_VERSION,
        "status": "healthy",
    }))
    .into_response())
}

async fn handle_rejection(err: Rejection) -> Result<Response, Rejection> {
    if let Some(api_error) = err.find::<ApiError>() {
        Ok(api_error.clone().into_response())
    } else if err.is_not_found() {
        Ok(ApiError::not_found().into_response())
    } else {
        Err(err)
    }
}

fn with_allowed_host(
    allowed_hosts: Arc<Vec<String>>,
    use_x_forwarded_host: bool,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-forwarded-host")
        .and(warp::header::optional::<String>("host"))
        .and_then(move |forwarded: Option<String>, host: Option<String>| {
            let allowed_hosts = allowed_hosts.clone();
            async move {
                let host = if use_x_forwarded_host {
                    forwarded.or(host)
                } else {
                    host
                };

                match host {
                    Some(host) if is_allowed_host(&host, &allowed_hosts) => Ok(()),
                    host => {
                        let host = host.unwrap_or_default();
                        tracing::warn!("Rejecting request for disallowed host '{}'", host);
                        Err(warp::reject::custom(ApiError::new(
                            StatusCode::BAD_REQUEST,
                            format!("Invalid HTTP_HOST header: '{}'", host),
                        )))
                    }
                }
            }
        })
        .untuple_one()
}

/// Checks `host` (optionally with port) against the allowed host patterns.
///
/// `*` matches everything, a leading dot matches the domain and all of its
/// subdomains, anything else must match exactly. Ports are ignored.
pub fn is_allowed_host(host: &str, allowed_hosts: &[String]) -> bool {
    let Some(domain) = split_domain(host) else {
        return false;
    };

    allowed_hosts.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        if pattern == "*" {
            true
        } else if let Some(parent) = pattern.strip_prefix('.') {
            domain == parent || domain.ends_with(&pattern)
        } else {
            domain == pattern
        }
    })
}

fn split_domain(host: &str) -> Option<String> {
    let host = host.to_ascii_lowercase();
    if !HOST_PATTERN.is_match(&host) {
        return None;
    }
    if host.ends_with(']') {
        return Some(host);
    }

    let domain = match host.rsplit_once(':') {
        Some((domain, _port)) => domain,
        None => host.as_str(),
    };
    let domain = domain.strip_suffix('.').unwrap_or(domain);

    Some(domain.to_owned())
}

fn is_secure(security: &SecurityPolicy, headers: &HeaderMap) -> bool {
    headers
        .get(security.proxy_ssl_header.header)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .is_some_and(|value| value.trim() == security.proxy_ssl_header.value)
}

fn apply_hsts(security: &SecurityPolicy, headers: &HeaderMap, mut response: Response) -> Response {
    if security.hsts.seconds > 0
        && is_secure(security, headers)
        && !response.headers().contains_key(STRICT_TRANSPORT_SECURITY)
        && let Ok(value) = HeaderValue::from_str(&security.hsts.header_value())
    {
        response.headers_mut().insert(STRICT_TRANSPORT_SECURITY, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::{base_application, is_allowed_host};
    use crate::config::{LaunchMode, Profile, Settings};
    use crate::environment::EnvSnapshot;
    use crate::web::into_service;
    use std::path::Path;
    use tower::ServiceExt;
    use warp::http::{Request, StatusCode};
    use warp::hyper::{self, Body};

    fn settings() -> Settings {
        let env = EnvSnapshot::from_pairs([
            ("LD_SECRET_KEY", "s3cr3t"),
            ("DJANGO_ALLOWED_HOSTS", "bookmarks.example.com,.internal"),
        ]);
        Settings::resolve(&env, Path::new("/srv/linkding"), Profile::Production, LaunchMode::Serve)
            .unwrap()
    }

    fn hosts(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|pattern| pattern.to_string()).collect()
    }

    #[test]
    fn host_matching_follows_allowed_host_rules() {
        let allowed = hosts(&["bookmarks.example.com", ".internal", "[::1]"]);

        assert!(is_allowed_host("bookmarks.example.com", &allowed));
        assert!(is_allowed_host("Bookmarks.Example.com:9095", &allowed));
        assert!(is_allowed_host("bookmarks.example.com.", &allowed));
        assert!(is_allowed_host("internal", &allowed));
        assert!(is_allowed_host("links.internal:8443", &allowed));
        assert!(is_allowed_host("[::1]", &allowed));
        assert!(!is_allowed_host("example.com", &allowed));
        assert!(!is_allowed_host("evil.com/bookmarks.example.com", &allowed));
        assert!(is_allowed_host("anything.at.all", &hosts(&["*"])));
    }

    #[test]
    fn hosts_with_ports_in_patterns_never_match() {
        assert!(!is_allowed_host("linkding.local:9095", &hosts(&["linkding.local:9095"])));
    }

    #[tokio::test]
    async fn health_reports_status() {
        let service = into_service(base_application(&settings()));
        let request = Request::get("/health")
            .header("host", "bookmarks.example.com")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn disallowed_host_is_rejected() {
        let service = into_service(base_application(&settings()));
        let request = Request::get("/health")
            .header("host", "evil.com")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forwarded_host_takes_precedence() {
        let service = into_service(base_application(&settings()));
        let request = Request::get("/health")
            .header("host", "127.0.0.1:9090")
            .header("x-forwarded-host", "links.internal")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let service = into_service(base_application(&settings()));
        let request = Request::get("/bookmarks")
            .header("host", "bookmarks.example.com")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn hsts_only_for_secure_requests() {
        let service = into_service(base_application(&settings()));
        let plain = Request::get("/health")
            .header("host", "bookmarks.example.com")
            .body(Body::empty())
            .unwrap();
        let secure = Request::get("/health")
            .header("host", "bookmarks.example.com")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();

        let plain = service.clone().oneshot(plain).await.unwrap();
        let secure = service.oneshot(secure).await.unwrap();

        assert!(plain.headers().get("strict-transport-security").is_none());
        assert_eq!(
            secure.headers()["strict-transport-security"],
            "max-age=31536000; includeSubDomains; preload"
        );
    }
}
