use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::common::error::DomainError;
use serde::Serialize;

#[derive(Serialize)]
pub(crate) struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
pub(crate) struct ErrorDetail {
    /// Machine-readable error code (e.g. `RULE_NOT_FOUND`).
    code: &'static str,
    message: String,
}

/// Standard API error type.
///
/// All variants produce a JSON response matching:
/// `{"error":{"code":"SCREAMING_SNAKE","message":"human-readable"}}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound { code: &'static str, message: String },
    BadRequest { code: &'static str, message: String },
    Conflict { code: &'static str, message: String },
    Internal { message: String },
    ServiceUnavailable { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            Self::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            Self::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            Self::Internal { message } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
            }
            Self::ServiceUnavailable { message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                message,
            ),
        };

        (
            status,
            Json(ErrorBody {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::RuleNotFound(_) => Self::NotFound {
                code: "RULE_NOT_FOUND",
                message: err.to_string(),
            },
            DomainError::DuplicateRule(_) => Self::Conflict {
                code: "DUPLICATE_RULE",
                message: err.to_string(),
            },
            DomainError::InvalidRule(_) | DomainError::InvalidConfig(_) => Self::BadRequest {
                code: "VALIDATION_ERROR",
                message: err.to_string(),
            },
            DomainError::ResourceExhausted(_) => Self::ServiceUnavailable {
                message: err.to_string(),
            },
            DomainError::EngineError(_) => Self::Internal {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_body(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_produces_correct_json() {
        let err = ApiError::NotFound {
            code: "RULE_NOT_FOUND",
            message: "rule 999 not found".to_string(),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body = response_body(resp).await;
        assert_eq!(body["error"]["code"], "RULE_NOT_FOUND");
        assert_eq!(body["error"]["message"], "rule 999 not found");
    }

    #[tokio::test]
    async fn domain_duplicate_maps_to_409() {
        let err = ApiError::from(DomainError::DuplicateRule("20.20.20.1:80".to_string()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let body = response_body(resp).await;
        assert_eq!(body["error"]["code"], "DUPLICATE_RULE");
    }

    #[tokio::test]
    async fn domain_invalid_rule_maps_to_400() {
        let err = ApiError::from(DomainError::InvalidRule("weights exceed 100".to_string()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = response_body(resp).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn exhausted_id_pool_maps_to_503() {
        let err = ApiError::from(DomainError::ResourceExhausted("nat ids".to_string()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = response_body(resp).await;
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn engine_error_maps_to_500() {
        let err = ApiError::from(DomainError::EngineError("queue closed".to_string()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response_body(resp).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    }
}
