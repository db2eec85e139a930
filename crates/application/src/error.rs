use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;
use crate::storage::FileStoreError;
use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    #[error("invalid credentials")]
    InvalidCredentials,
    /// 可以通过刷新令牌恢复
    #[error("token expired")]
    TokenExpired,
    #[error("malformed token")]
    TokenMalformed,
    #[error("client agent mismatch")]
    AgentMismatch,
    /// 需要重新登录
    #[error("refresh token expired")]
    RefreshExpired,
    #[error("invalid refresh token")]
    InvalidRefresh,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("file access denied")]
    FileAccessDenied,
    #[error("file not found")]
    FileNotFound,
}

impl ApplicationError {
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        ApplicationError::InvalidRequest(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}

impl From<TokenError> for ApplicationError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Malformed => ApplicationError::TokenMalformed,
            TokenError::AgentMismatch => ApplicationError::AgentMismatch,
            TokenError::Expired { .. } => ApplicationError::TokenExpired,
            TokenError::Signing(message) => ApplicationError::Infrastructure(message),
        }
    }
}

impl From<FileStoreError> for ApplicationError {
    fn from(value: FileStoreError) -> Self {
        match value {
            FileStoreError::NotFound => ApplicationError::FileNotFound,
            FileStoreError::InvalidName(name) => {
                ApplicationError::InvalidRequest(format!("invalid file name: {name}"))
            }
            FileStoreError::Io(err) => ApplicationError::Storage(err.to_string()),
        }
    }
}
