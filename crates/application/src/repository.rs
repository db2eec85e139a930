use async_trait::async_trait;
use domain::{Message, MessageId, RepositoryError, Session, SessionId, Timestamp, User, Username};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 用户名已存在时返回 `RepositoryError::Conflict`
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn update(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: Session) -> Result<Session, RepositoryError>;
    async fn update(&self, session: Session) -> Result<Session, RepositoryError>;

    /// 访问令牌尚未过期的会话，按创建时间升序
    async fn find_live_by_user(
        &self,
        username: &Username,
        now: Timestamp,
    ) -> Result<Vec<Session>, RepositoryError>;

    async fn find_by_access_token(&self, token: &str) -> Result<Option<Session>, RepositoryError>;
    async fn find_by_refresh_token(&self, token: &str)
        -> Result<Option<Session>, RepositoryError>;

    /// 删除不存在的会话不视为错误
    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 按 id 写入或覆盖
    async fn save(&self, message: Message) -> Result<(), RepositoryError>;

    async fn find_undelivered_for(&self, receiver: &Username)
        -> Result<Vec<Message>, RepositoryError>;

    /// 发给该用户的全部消息（含已投递）
    async fn find_all_for(&self, receiver: &Username) -> Result<Vec<Message>, RepositoryError>;

    async fn mark_delivered(&self, ids: &[MessageId]) -> Result<(), RepositoryError>;

    /// 原子地取出并标记该用户全部未投递消息，返回的消息 `delivered` 已为 `true`，
    /// 按创建时间升序。并发的两次调用不会返回同一条消息。
    async fn drain_undelivered(&self, receiver: &Username)
        -> Result<Vec<Message>, RepositoryError>;
}
