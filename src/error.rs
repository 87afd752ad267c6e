//! Handler-level failures.
//!
//! These are the only errors the cache layer lets through: a handler that fails
//! is neither retried nor cached, and its error is rendered here.

use serde::Serialize;
use thiserror::Error;

use crate::{Response, StatusCode};

/// Failure returned by an API handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status_code: u16,
    message: &'a str,
}

impl ApiError {
    /// `404` with `message`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// HTTP status the error renders with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NotFound,
            Self::BadRequest(_) => StatusCode::BadRequest,
            Self::Internal(_) => StatusCode::InternalServerError,
        }
    }

    /// Renders `{"statusCode": …, "message": …}` with the matching status.
    pub fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        Response::json(
            status,
            &ErrorBody {
                status_code: status.as_u16(),
                message: &message,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_renders_json() {
        let res = ApiError::not_found("user 9 not found").into_response();
        assert_eq!(res.status(), StatusCode::NotFound);
        let body: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(body["statusCode"], 404);
        assert_eq!(body["message"], "user 9 not found");
    }
}
