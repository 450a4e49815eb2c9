use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use kairos_core::Error;

/// API-boundary error: a status code plus the JSON error envelope.
///
/// Business-rule rejections keep their identity end to end so the client can
/// distinguish "you already have a trainer" from "this trainer is full".
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn unauthorized() -> Self {
        ApiError {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "authentication required".to_string(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::FORBIDDEN,
            code: "forbidden",
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Error::Capacity(_) => (StatusCode::UNPROCESSABLE_ENTITY, "capacity_exceeded"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Database(_) | Error::Pool(_) | Error::PubSub(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
        };

        let message = if err.is_transient() {
            // Infra details stay in the logs, not in responses.
            tracing::error!("Infrastructure error at API boundary: {}", err);
            "temporarily unavailable, please retry".to_string()
        } else {
            err.to_string()
        };

        ApiError {
            status,
            code,
            message,
        }
    }
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            ApiError::unauthorized()
        } else {
            ApiError {
                status,
                code: "error",
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_distinct_statuses() {
        let conflict = ApiError::from(Error::conflict("client already assigned"));
        let capacity = ApiError::from(Error::capacity("trainer at capacity"));
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert_eq!(capacity.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_ne!(conflict.code, capacity.code);
    }

    #[test]
    fn infra_errors_are_masked() {
        let err = ApiError::from(Error::Pool("deadpool timed out".to_string()));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.message.contains("deadpool"));
    }

    #[test]
    fn validation_and_not_found_keep_their_messages() {
        let err = ApiError::from(Error::validation("trainer is not accepting new clients"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("not accepting"));

        let err = ApiError::from(Error::not_found("trainer not found"));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
