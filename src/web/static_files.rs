//! Static file layer.
//!
//! Serves collected static files from `STATIC_ROOT` for `GET` and `HEAD`
//! requests below the static URL prefix. Everything else, including files
//! which do not exist, is passed on to the wrapped service.

use crate::config::StaticFiles;
use crate::web::{HttpService, Response, into_service};
use regex::Regex;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::LazyLock;
use std::task::Poll;
use tower::{Layer, Service, ServiceExt};
use warp::http::header::CACHE_CONTROL;
use warp::http::{HeaderValue, Method, Request, StatusCode, Uri};
use warp::hyper::Body;
use warp::{Filter, Reply};

/// Matches names like `bookmarks.0a1b2c3d4e5f.css` written by the manifest storage.
static HASHED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[0-9a-f]{12}\.[^./]+$").expect("Invalid regex"));

const IMMUTABLE_CACHE: &str = "max-age=315360000, public, immutable";
const SHORT_CACHE: &str = "max-age=60, public";

#[derive(Clone)]
pub struct StaticFilesLayer {
    files: HttpService,
    prefix: String,
}

impl StaticFilesLayer {
    pub fn new(static_files: &StaticFiles) -> Self {
        let files = warp::fs::dir(static_files.root.clone())
            .map(|file: warp::filters::fs::File| file.into_response())
            .boxed();

        StaticFilesLayer {
            files: into_service(files),
            prefix: static_files.url.clone(),
        }
    }
}

impl<S> Layer<S> for StaticFilesLayer {
    type Service = StaticFilesMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StaticFilesMiddleware {
            inner,
            files: self.files.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

#[derive(Clone)]
pub struct StaticFilesMiddleware<S> {
    inner: S,
    files: HttpService,
    prefix: String,
}

impl<S> StaticFilesMiddleware<S> {
    /// Builds the request for the file service, or `None` if `req` is not a static file request.
    fn file_request(&self, req: &Request<Body>) -> Option<Request<Body>> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return None;
        }

        let relative = req.uri().path().strip_prefix(self.prefix.as_str())?;
        if relative.is_empty() {
            return None;
        }
        let uri = Uri::try_from(format!("/{}", relative)).ok()?;

        let mut file_req = Request::new(Body::empty());
        *file_req.method_mut() = req.method().clone();
        *file_req.uri_mut() = uri;
        *file_req.headers_mut() = req.headers().clone();

        Some(file_req)
    }
}

impl<S> Service<Request<Body>> for StaticFilesMiddleware<S>
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
        let mut inner = self.inner.clone();

        let Some(file_req) = self.file_request(&req) else {
            return Box::pin(async move { inner.call(req).await });
        };

        let files = self.files.clone();
        let path = req.uri().path().to_owned();

        Box::pin(async move {
            let response = files.oneshot(file_req).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return inner.call(req).await;
            }

            tracing::debug!("Served static file {} ({})", path, response.status());
            Ok(with_cache_control(&path, response))
        })
    }
}

fn with_cache_control(path: &str, mut response: Response) -> Response {
    if !response.status().is_success() || response.headers().contains_key(CACHE_CONTROL) {
        return response;
    }

    let policy = if HASHED_NAME.is_match(path) {
        IMMUTABLE_CACHE
    } else {
        SHORT_CACHE
    };
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(policy));

    response
}
