use crate::value_objects::{SessionId, Timestamp, Username};

/// 一次签发得到的令牌及其有效期。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub token: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

/// 一个登录会话：一对访问令牌与刷新令牌，绑定到签发时的客户端指纹。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub username: Username,
    pub access_token: String,
    pub access_issued_at: Timestamp,
    pub access_expires_at: Timestamp,
    pub refresh_token: String,
    pub refresh_expires_at: Timestamp,
    pub agent_fingerprint: String,
    pub created_at: Timestamp,
}

impl Session {
    pub fn new(
        id: SessionId,
        username: Username,
        access: TokenGrant,
        refresh: TokenGrant,
        agent_fingerprint: String,
    ) -> Self {
        Self {
            id,
            username,
            access_issued_at: access.issued_at,
            access_expires_at: access.expires_at,
            created_at: access.issued_at,
            access_token: access.token,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
            agent_fingerprint,
        }
    }

    /// 访问令牌尚未过期的会话才参与并发会话上限的计数。
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.access_expires_at > now
    }

    pub fn can_refresh(&self, now: Timestamp) -> bool {
        self.refresh_expires_at > now
    }

    /// 替换访问令牌，刷新令牌保持不变。
    pub fn renew_access(&mut self, access: TokenGrant) {
        self.access_token = access.token;
        self.access_issued_at = access.issued_at;
        self.access_expires_at = access.expires_at;
    }
}
