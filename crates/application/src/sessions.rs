use std::sync::Arc;

use domain::{Session, SessionId, Username};

use crate::{
    clock::Clock,
    error::ApplicationError,
    locks::KeyedLocks,
    repository::SessionRepository,
    token::{fingerprint, TokenClass, TokenIssuer},
};

/// 登录成功后返回给客户端的令牌对
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// 认证闸门续期成功的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewedAccess {
    pub username: Username,
    pub access_token: String,
}

pub struct SessionRegistryDependencies {
    pub session_repository: Arc<dyn SessionRepository>,
    pub token_issuer: Arc<TokenIssuer>,
    pub clock: Arc<dyn Clock>,
}

/// 会话登记表：每个用户同时存活的会话数不超过 `max_per_user`。
pub struct SessionRegistry {
    deps: SessionRegistryDependencies,
    max_per_user: usize,
    locks: KeyedLocks,
}

impl SessionRegistry {
    pub fn new(deps: SessionRegistryDependencies, max_per_user: usize) -> Self {
        Self {
            deps,
            max_per_user: max_per_user.max(1),
            locks: KeyedLocks::new(),
        }
    }

    pub async fn create_session(
        &self,
        username: &Username,
        client_agent: &str,
    ) -> Result<TokenPair, ApplicationError> {
        let _guard = self.locks.lock(username.as_str()).await;

        let issuer = &self.deps.token_issuer;
        let access = issuer.issue(username, client_agent, TokenClass::Access)?;
        let refresh = issuer.issue(username, client_agent, TokenClass::Refresh)?;

        let now = self.deps.clock.now();
        let mut live = self
            .deps
            .session_repository
            .find_live_by_user(username, now)
            .await?;
        live.sort_by_key(|session| session.created_at);

        // 为新会话腾出一个位置
        let excess = (live.len() + 1).saturating_sub(self.max_per_user);
        for evicted in live.iter().take(excess) {
            self.deps.session_repository.delete(evicted.id).await?;
            tracing::info!(
                username = %username,
                session_id = %evicted.id,
                "session evicted by concurrent login limit"
            );
        }

        let pair = TokenPair {
            access_token: access.token.clone(),
            refresh_token: refresh.token.clone(),
        };
        let session = Session::new(
            SessionId::generate(),
            username.clone(),
            access,
            refresh,
            fingerprint(client_agent),
        );
        let session_id = session.id;
        self.deps.session_repository.create(session).await?;

        tracing::info!(username = %username, session_id = %session_id, "session created");
        Ok(pair)
    }

    /// 用刷新令牌换取新的访问令牌，会话记录原地更新。
    pub async fn renew_access(
        &self,
        refresh_token: &str,
        client_agent: &str,
    ) -> Result<String, ApplicationError> {
        let claims = self
            .deps
            .token_issuer
            .verify(refresh_token, client_agent)
            .map_err(|err| {
                tracing::warn!(error = %err, "refresh token rejected");
                ApplicationError::InvalidRefresh
            })?;
        if claims.cls != TokenClass::Refresh {
            return Err(ApplicationError::InvalidRefresh);
        }

        let _guard = self.locks.lock(&claims.sub).await;

        let mut session = self
            .deps
            .session_repository
            .find_by_refresh_token(refresh_token)
            .await?
            .ok_or(ApplicationError::InvalidRefresh)?;
        if session.username.as_str() != claims.sub {
            return Err(ApplicationError::InvalidRefresh);
        }
        if !session.can_refresh(self.deps.clock.now()) {
            return Err(ApplicationError::RefreshExpired);
        }

        let access =
            self.deps
                .token_issuer
                .issue(&session.username, client_agent, TokenClass::Access)?;
        let token = access.token.clone();
        session.renew_access(access);
        self.deps.session_repository.update(session).await?;

        Ok(token)
    }

    pub async fn find_session_by_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<Session>, ApplicationError> {
        Ok(self
            .deps
            .session_repository
            .find_by_access_token(access_token)
            .await?)
    }

    /// 删除访问令牌所属的会话；会话不存在时什么也不做。
    pub async fn revoke(&self, access_token: &str) -> Result<(), ApplicationError> {
        if let Some(session) = self.find_session_by_access_token(access_token).await? {
            let _guard = self.locks.lock(session.username.as_str()).await;
            self.deps.session_repository.delete(session.id).await?;
            tracing::info!(username = %session.username, session_id = %session.id, "session revoked");
        }
        Ok(())
    }

    /// 访问令牌过期后由认证闸门调用；会话不存在或刷新期限已过时返回 `None`。
    pub async fn renew_expired_access(
        &self,
        expired_access_token: &str,
        client_agent: &str,
    ) -> Result<Option<RenewedAccess>, ApplicationError> {
        let Some(session) = self.find_session_by_access_token(expired_access_token).await? else {
            return Ok(None);
        };

        let _guard = self.locks.lock(session.username.as_str()).await;

        // 加锁后重新读取，并发续期可能已经替换了访问令牌
        let Some(mut session) = self
            .deps
            .session_repository
            .find_by_access_token(expired_access_token)
            .await?
        else {
            return Ok(None);
        };
        if !session.can_refresh(self.deps.clock.now()) {
            return Ok(None);
        }

        let access =
            self.deps
                .token_issuer
                .issue(&session.username, client_agent, TokenClass::Access)?;
        let renewed = RenewedAccess {
            username: session.username.clone(),
            access_token: access.token.clone(),
        };
        session.renew_access(access);
        self.deps.session_repository.update(session).await?;

        tracing::info!(username = %renewed.username, "access token renewed");
        Ok(Some(renewed))
    }
}
