//! 请求认证
//!
//! `auth_gate` 中间件对每个受保护路由执行认证闸门；处理函数通过
//! [`AuthenticatedUser`] 提取当前用户。

use std::convert::Infallible;

use application::{GateDecision, GateRejection};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use domain::Username;

use crate::{error::ApiError, state::AppState};

/// 访问令牌被透明续期时，新令牌通过该响应头返回
pub const NEW_ACCESS_TOKEN: HeaderName = HeaderName::from_static("new-access-token");

/// 通过认证闸门的用户
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Username);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("authentication required"))
    }
}

/// `User-Agent` 请求头，缺失时为空字符串
#[derive(Debug, Clone)]
pub struct ClientAgent(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientAgent {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientAgent(client_agent(&parts.headers)))
    }
}

pub(crate) fn client_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

/// 没有 `Bearer ` 前缀时整个头部值都被当作令牌，随后校验失败。
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value).trim())
}

pub async fn auth_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let agent = client_agent(request.headers());
    let bearer = bearer_token(request.headers()).map(str::to_owned);

    let decision = state.auth_gate.evaluate(bearer.as_deref(), &agent).await?;
    let renewed = match decision {
        GateDecision::Anonymous => None,
        GateDecision::Authenticated { username } => {
            request.extensions_mut().insert(AuthenticatedUser(username));
            None
        }
        GateDecision::Renewed {
            username,
            access_token,
        } => {
            request.extensions_mut().insert(AuthenticatedUser(username));
            Some(access_token)
        }
        GateDecision::Rejected(GateRejection::InvalidToken) => {
            return Err(ApiError::invalid_token())
        }
        GateDecision::Rejected(GateRejection::RefreshUnavailable) => {
            return Err(ApiError::refresh_unavailable())
        }
    };

    let mut response = next.run(request).await;
    if let Some(token) = renewed {
        match HeaderValue::from_str(&token) {
            Ok(value) => {
                response.headers_mut().insert(NEW_ACCESS_TOKEN, value);
            }
            Err(err) => tracing::error!(error = %err, "renewed token is not a valid header value"),
        }
    }
    Ok(response)
}
