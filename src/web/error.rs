//! Errors reported to HTTP clients.
//!
//! An [`ApiError`] carries the status code and a message. It is raised as a
//! warp rejection and rendered as `{"message": ...}` by
//! [`ApiError::into_response`].

use crate::web::Response;
use serde::Serialize;
use std::fmt::{Debug, Display, Formatter};
use warp::Reply;
use warp::http::StatusCode;
use warp::reject::Reject;

#[derive(Clone, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// HTTP status code for the response (not serialized).
    #[serde(skip)]
    pub status: StatusCode,
    pub message: String,
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Reject for ApiError {}

impl ApiError {
    pub fn new(status: StatusCode, message: impl ToString) -> Self {
        ApiError {
            status,
            message: message.to_string(),
        }
    }

    pub fn not_found() -> Self {
        ApiError::new(StatusCode::NOT_FOUND, "Not found")
    }

    pub fn into_response(self) -> Response {
        warp::reply::with_status(warp::reply::json(&self), self.status).into_response()
    }
}
