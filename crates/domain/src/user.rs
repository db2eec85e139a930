use std::collections::BTreeSet;

use crate::errors::DomainError;
use crate::value_objects::{PasswordHash, Timestamp, Username};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub username: Username,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    /// 好友集合。好友关系是单向记录的：A 在 B 的集合中不代表 B 在 A 的集合中。
    pub friends: BTreeSet<Username>,
    /// 待处理的好友请求（发起者用户名）
    pub friend_requests: BTreeSet<Username>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn register(username: Username, password: PasswordHash, now: Timestamp) -> Self {
        Self {
            username,
            password,
            friends: BTreeSet::new(),
            friend_requests: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_friend(&self, other: &Username) -> bool {
        self.friends.contains(other)
    }

    pub fn has_request_from(&self, other: &Username) -> bool {
        self.friend_requests.contains(other)
    }

    /// 返回 `true` 表示集合发生了变化。
    pub fn add_friend(&mut self, other: Username, now: Timestamp) -> bool {
        let inserted = self.friends.insert(other);
        if inserted {
            self.updated_at = now;
        }
        inserted
    }

    /// 记录一条来自 `from` 的好友请求。
    pub fn receive_friend_request(
        &mut self,
        from: Username,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        if from == self.username {
            return Err(DomainError::not_allowed("cannot befriend yourself"));
        }
        let inserted = self.friend_requests.insert(from);
        if inserted {
            self.updated_at = now;
        }
        Ok(inserted)
    }

    /// 移除来自 `from` 的请求，请求不存在时返回 `false`。
    pub fn take_friend_request(&mut self, from: &Username, now: Timestamp) -> bool {
        let removed = self.friend_requests.remove(from);
        if removed {
            self.updated_at = now;
        }
        removed
    }
}
