//! 令牌签发与校验
//!
//! 访问令牌与刷新令牌都是 HS256 签名的 JWT，绑定到签发时客户端代理字符串的
//! SHA-256 指纹。过期判断使用注入的 [`Clock`]，不依赖 jsonwebtoken 的内置校验。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use data_encoding::HEXLOWER;
use domain::{TokenGrant, Username};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

/// JWT Claims 结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// 客户端代理指纹
    pub agt: String,
    pub cls: TokenClass,
    pub jti: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("client agent mismatch")]
    AgentMismatch,
    #[error("token expired")]
    Expired { subject: Username },
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// 客户端代理字符串的十六进制 SHA-256 指纹。
pub fn fingerprint(client_agent: &str) -> String {
    HEXLOWER.encode(digest(&SHA256, client_agent.as_bytes()).as_ref())
}

#[derive(Debug, Clone)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(10),
            refresh: Duration::days(10),
        }
    }
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetimes: TokenLifetimes,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], lifetimes: TokenLifetimes, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            lifetimes,
            clock,
        }
    }

    pub fn issue(
        &self,
        username: &Username,
        client_agent: &str,
        class: TokenClass,
    ) -> Result<TokenGrant, TokenError> {
        let issued_at = self.clock.now();
        let ttl = match class {
            TokenClass::Access => self.lifetimes.access,
            TokenClass::Refresh => self.lifetimes.refresh,
        };
        let expires_at = issued_at + ttl;

        let claims = TokenClaims {
            sub: username.as_str().to_owned(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            agt: fingerprint(client_agent),
            cls: class,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Signing(err.to_string()))?;

        Ok(TokenGrant {
            token,
            issued_at,
            expires_at,
        })
    }

    /// 依次检查签名、客户端指纹、过期时间，返回全部 claims。
    pub fn verify(&self, token: &str, client_agent: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.decode_claims(token)?;
        if claims.agt != fingerprint(client_agent) {
            tracing::debug!("token agent fingerprint mismatch");
            return Err(TokenError::AgentMismatch);
        }
        if self.clock.now().timestamp() > claims.exp {
            let subject = Username::parse(claims.sub).map_err(|_| TokenError::Malformed)?;
            return Err(TokenError::Expired { subject });
        }
        Ok(claims)
    }

    pub fn validate(&self, token: &str, client_agent: &str) -> Result<Username, TokenError> {
        let claims = self.verify(token, client_agent)?;
        Username::parse(claims.sub).map_err(|_| TokenError::Malformed)
    }

    /// 只看时间；无法解析的令牌视为已过期。
    pub fn is_expired(&self, token: &str) -> bool {
        match self.decode_claims(token) {
            Ok(claims) => self.clock.now().timestamp() > claims.exp,
            Err(_) => true,
        }
    }

    fn decode_claims(&self, token: &str) -> Result<TokenClaims, TokenError> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                TokenError::Malformed
            })
    }
}
