//! 进程内存储，未配置数据库时使用，也用于集成测试。

use std::{collections::HashMap, sync::Arc};

use application::{MessageRepository, SessionRepository, UserRepository};
use async_trait::async_trait;
use domain::{Message, MessageId, RepositoryError, Session, SessionId, Timestamp, User, Username};
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::RwLock;

#[derive(Default, Clone)]
pub struct InMemoryUserRepository {
    data: Arc<RwLock<HashMap<Username, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut guard = self.data.write().await;
        if guard.contains_key(&user.username) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let mut guard = self.data.write().await;
        if !guard.contains_key(&user.username) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError> {
        let guard = self.data.read().await;
        Ok(guard.get(username).cloned())
    }
}

/// 会话按用户分片保存，令牌索引指向会话 id。
#[derive(Default, Clone)]
pub struct InMemorySessionRepository {
    by_user: Arc<DashMap<Username, Vec<Session>>>,
    owners: Arc<DashMap<SessionId, Username>>,
    access_index: Arc<DashMap<String, SessionId>>,
    refresh_index: Arc<DashMap<String, SessionId>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count_for(&self, username: &Username) -> usize {
        self.by_user.get(username).map_or(0, |sessions| sessions.len())
    }

    fn lookup(&self, id: Option<SessionId>) -> Option<Session> {
        let id = id?;
        let owner = self.owners.get(&id)?.clone();
        let sessions = self.by_user.get(&owner)?;
        sessions.iter().find(|s| s.id == id).cloned()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: Session) -> Result<Session, RepositoryError> {
        match self.owners.entry(session.id) {
            Entry::Occupied(_) => return Err(RepositoryError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(session.username.clone());
            }
        }
        self.access_index
            .insert(session.access_token.clone(), session.id);
        self.refresh_index
            .insert(session.refresh_token.clone(), session.id);
        self.by_user
            .entry(session.username.clone())
            .or_default()
            .push(session.clone());
        Ok(session)
    }

    async fn update(&self, session: Session) -> Result<Session, RepositoryError> {
        let mut sessions = self
            .by_user
            .get_mut(&session.username)
            .ok_or(RepositoryError::NotFound)?;
        let slot = sessions
            .iter_mut()
            .find(|s| s.id == session.id)
            .ok_or(RepositoryError::NotFound)?;

        if slot.access_token != session.access_token {
            self.access_index.remove(&slot.access_token);
            self.access_index
                .insert(session.access_token.clone(), session.id);
        }
        if slot.refresh_token != session.refresh_token {
            self.refresh_index.remove(&slot.refresh_token);
            self.refresh_index
                .insert(session.refresh_token.clone(), session.id);
        }
        *slot = session.clone();
        Ok(session)
    }

    async fn find_live_by_user(
        &self,
        username: &Username,
        now: Timestamp,
    ) -> Result<Vec<Session>, RepositoryError> {
        let mut live: Vec<Session> = self
            .by_user
            .get(username)
            .map(|sessions| sessions.iter().filter(|s| s.is_live(now)).cloned().collect())
            .unwrap_or_default();
        live.sort_by_key(|s| s.created_at);
        Ok(live)
    }

    async fn find_by_access_token(&self, token: &str) -> Result<Option<Session>, RepositoryError> {
        let id = self.access_index.get(token).map(|id| *id);
        Ok(self.lookup(id))
    }

    async fn find_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, RepositoryError> {
        let id = self.refresh_index.get(token).map(|id| *id);
        Ok(self.lookup(id))
    }

    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError> {
        let Some((_, owner)) = self.owners.remove(&id) else {
            return Ok(());
        };
        if let Some(mut sessions) = self.by_user.get_mut(&owner) {
            if let Some(pos) = sessions.iter().position(|s| s.id == id) {
                let removed = sessions.remove(pos);
                self.access_index.remove(&removed.access_token);
                self.refresh_index.remove(&removed.refresh_token);
            }
        }
        Ok(())
    }
}

/// 消息按接收方分片保存，取出操作只锁定该接收方的条目。
#[derive(Default, Clone)]
pub struct InMemoryMessageRepository {
    by_receiver: Arc<DashMap<Username, Vec<Message>>>,
    owners: Arc<DashMap<MessageId, Username>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Message> {
        self.by_receiver
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn save(&self, message: Message) -> Result<(), RepositoryError> {
        self.owners.insert(message.id, message.receiver.clone());
        let mut messages = self.by_receiver.entry(message.receiver.clone()).or_default();
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => messages.push(message),
        }
        Ok(())
    }

    async fn find_undelivered_for(
        &self,
        receiver: &Username,
    ) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .by_receiver
            .get(receiver)
            .map(|messages| messages.iter().filter(|m| !m.delivered).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_all_for(&self, receiver: &Username) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .by_receiver
            .get(receiver)
            .map(|messages| messages.clone())
            .unwrap_or_default())
    }

    async fn mark_delivered(&self, ids: &[MessageId]) -> Result<(), RepositoryError> {
        for id in ids {
            let Some(receiver) = self.owners.get(id).map(|owner| owner.clone()) else {
                continue;
            };
            if let Some(mut messages) = self.by_receiver.get_mut(&receiver) {
                if let Some(message) = messages.iter_mut().find(|m| &m.id == id) {
                    message.mark_delivered();
                }
            }
        }
        Ok(())
    }

    async fn drain_undelivered(
        &self,
        receiver: &Username,
    ) -> Result<Vec<Message>, RepositoryError> {
        // 查询与标记在同一个条目锁下完成
        let Some(mut messages) = self.by_receiver.get_mut(receiver) else {
            return Ok(Vec::new());
        };
        let mut drained: Vec<Message> = messages
            .iter_mut()
            .filter_map(|m| m.mark_delivered().then(|| m.clone()))
            .collect();
        drop(messages);
        drained.sort_by_key(|m| m.created_at);
        Ok(drained)
    }
}
