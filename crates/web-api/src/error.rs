use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn invalid_token() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "invalid token")
    }

    pub fn refresh_unavailable() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "REFRESH_UNAVAILABLE",
            "refresh expired / not found",
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;
        use domain::{DomainError, RepositoryError};

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            AppErr::Domain(DomainError::UserAlreadyExists) => {
                ApiError::new(StatusCode::CONFLICT, "USER_EXISTS", "user already exists")
            }
            AppErr::Domain(DomainError::UserNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "user not found")
            }
            AppErr::Domain(DomainError::OperationNotAllowed(reason)) => {
                ApiError::new(StatusCode::FORBIDDEN, "OPERATION_NOT_ALLOWED", reason)
            }
            AppErr::Repository(repo_err) => match repo_err {
                RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                RepositoryError::Conflict => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                RepositoryError::Storage { message, .. } => {
                    tracing::error!(error = %message, "repository failure");
                    ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "DATABASE_ERROR",
                        "database error",
                    )
                }
            },
            AppErr::Password(err) => {
                tracing::error!(error = %err, "password hashing failure");
                ApiError::internal_server_error("password error")
            }
            AppErr::Storage(message) => {
                tracing::error!(error = %message, "file storage failure");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "file storage error",
                )
            }
            AppErr::Infrastructure(message) => {
                tracing::error!(error = %message, "infrastructure failure");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INFRASTRUCTURE_ERROR",
                    "internal error",
                )
            }
            AppErr::InvalidCredentials => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "invalid username or password",
            ),
            AppErr::TokenExpired => {
                ApiError::new(StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "token expired")
            }
            AppErr::TokenMalformed | AppErr::AgentMismatch => ApiError::invalid_token(),
            AppErr::RefreshExpired => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "REFRESH_EXPIRED",
                "refresh token expired",
            ),
            AppErr::InvalidRefresh => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_REFRESH",
                "invalid refresh token",
            ),
            AppErr::InvalidRequest(message) => ApiError::bad_request(message),
            AppErr::FileAccessDenied => ApiError::new(
                StatusCode::FORBIDDEN,
                "FILE_ACCESS_DENIED",
                "file access denied",
            ),
            AppErr::FileNotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "FILE_NOT_FOUND", "file not found")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_collapse_to_invalid_token() {
        for error in [ApplicationError::TokenMalformed, ApplicationError::AgentMismatch] {
            let api = ApiError::from(error);
            assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(api.body.code, "INVALID_TOKEN");
        }
    }

    #[test]
    fn storage_details_are_not_exposed() {
        let api = ApiError::from(ApplicationError::Storage("disk /dev/sda1 full".into()));
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.body.message.contains("sda1"));
    }

    #[test]
    fn file_errors_map_to_forbidden_and_not_found() {
        assert_eq!(
            ApiError::from(ApplicationError::FileAccessDenied).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(ApplicationError::FileNotFound).status(),
            StatusCode::NOT_FOUND
        );
    }
}
