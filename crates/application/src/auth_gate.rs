//! 请求级认证闸门
//!
//! 每个请求先经过 [`AuthGate::evaluate`]，得到一个 [`GateDecision`]。
//! 访问令牌过期时，闸门会借助会话登记表尝试透明续期。

use std::sync::Arc;

use domain::Username;

use crate::{
    error::ApplicationError,
    sessions::SessionRegistry,
    token::{TokenError, TokenIssuer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// 签名、结构或客户端指纹不合法，或会话已被注销
    InvalidToken,
    /// 访问令牌过期且无法续期
    RefreshUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Anonymous,
    Authenticated {
        username: Username,
    },
    /// 新的访问令牌需要通过响应头返回给客户端
    Renewed {
        username: Username,
        access_token: String,
    },
    Rejected(GateRejection),
}

impl GateDecision {
    pub fn username(&self) -> Option<&Username> {
        match self {
            GateDecision::Authenticated { username } | GateDecision::Renewed { username, .. } => {
                Some(username)
            }
            GateDecision::Anonymous | GateDecision::Rejected(_) => None,
        }
    }
}

pub struct AuthGate {
    token_issuer: Arc<TokenIssuer>,
    sessions: Arc<SessionRegistry>,
}

impl AuthGate {
    pub fn new(token_issuer: Arc<TokenIssuer>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            token_issuer,
            sessions,
        }
    }

    pub async fn evaluate(
        &self,
        bearer: Option<&str>,
        client_agent: &str,
    ) -> Result<GateDecision, ApplicationError> {
        let Some(token) = bearer else {
            return Ok(GateDecision::Anonymous);
        };

        match self.token_issuer.validate(token, client_agent) {
            Ok(username) => {
                if self
                    .sessions
                    .find_session_by_access_token(token)
                    .await?
                    .is_some()
                {
                    Ok(GateDecision::Authenticated { username })
                } else {
                    tracing::warn!(username = %username, "access token has no live session");
                    Ok(GateDecision::Rejected(GateRejection::InvalidToken))
                }
            }
            Err(TokenError::Expired { subject }) => {
                match self.sessions.renew_expired_access(token, client_agent).await? {
                    Some(renewed) => Ok(GateDecision::Renewed {
                        username: renewed.username,
                        access_token: renewed.access_token,
                    }),
                    None => {
                        tracing::warn!(username = %subject, "expired access token not renewable");
                        Ok(GateDecision::Rejected(GateRejection::RefreshUnavailable))
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "access token rejected");
                Ok(GateDecision::Rejected(GateRejection::InvalidToken))
            }
        }
    }
}
