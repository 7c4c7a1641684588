//! HTTP side of the launcher.
//!
//! The request path is a stack of tower services around a warp filter:
//!
//! ```text
//! hyper connection
//!   └─ ProxyHeadersMiddleware    (per connection, trusted proxy handling)
//!       └─ StaticFilesMiddleware (only when debug is off)
//!           └─ RequestLoggingMiddleware
//!               └─ base application (warp filter)
//! ```
//!
//! [`pipeline::Pipeline`] assembles everything below the proxy layer,
//! [`server::run_webserver`] adds the proxy layer and serves it.

use std::convert::Infallible;
use tower::util::BoxCloneService;
use warp::filters::BoxedFilter;
use warp::http::Request;
use warp::hyper::Body;

pub mod application;
pub mod error;
pub mod pipeline;
pub mod proxy;
pub mod request_log;
pub mod server;
pub mod static_files;

/// Response type shared by all layers.
pub type Response = warp::reply::Response;

/// A type-erased, cloneable request handler.
pub type HttpService = BoxCloneService<Request<Body>, Response, Infallible>;

/// Turns a warp filter into a tower service.
///
/// Rejections the filter does not recover from are turned into warp's
/// default responses (e.g. `404` or `405`).
pub fn into_service(filter: BoxedFilter<(Response,)>) -> HttpService {
    BoxCloneService::new(warp::service(filter))
}
