use std::sync::Arc;

use application::{MessageRepository, SessionRepository, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Message, MessageContent, MessageId, PasswordHash, RepositoryError, Session, SessionId,
    Timestamp, User, Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict;
        }
    }
    RepositoryError::storage_with_source("database operation failed", err)
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn parse_username(value: String) -> Result<Username, RepositoryError> {
    Username::parse(value).map_err(|err| invalid_data(err.to_string()))
}

#[derive(Debug, FromRow)]
struct UserRecord {
    username: String,
    password_hash: String,
    friends: Vec<String>,
    friend_requests: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let password =
            PasswordHash::new(value.password_hash).map_err(|err| invalid_data(err.to_string()))?;
        let friends = value
            .friends
            .into_iter()
            .map(parse_username)
            .collect::<Result<_, _>>()?;
        let friend_requests = value
            .friend_requests
            .into_iter()
            .map(parse_username)
            .collect::<Result<_, _>>()?;

        Ok(User {
            username: parse_username(value.username)?,
            password,
            friends,
            friend_requests,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

fn name_list<'a>(names: impl IntoIterator<Item = &'a Username>) -> Vec<String> {
    names.into_iter().map(|n| n.as_str().to_owned()).collect()
}

#[derive(Debug, FromRow)]
struct SessionRecord {
    id: Uuid,
    username: String,
    access_token: String,
    access_issued_at: DateTime<Utc>,
    access_expires_at: DateTime<Utc>,
    refresh_token: String,
    refresh_expires_at: DateTime<Utc>,
    agent_fingerprint: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SessionRecord> for Session {
    type Error = RepositoryError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Session {
            id: SessionId::from(value.id),
            username: parse_username(value.username)?,
            access_token: value.access_token,
            access_issued_at: value.access_issued_at,
            access_expires_at: value.access_expires_at,
            refresh_token: value.refresh_token,
            refresh_expires_at: value.refresh_expires_at,
            agent_fingerprint: value.agent_fingerprint,
            created_at: value.created_at,
        })
    }
}

const SESSION_COLUMNS: &str = "id, username, access_token, access_issued_at, access_expires_at, \
     refresh_token, refresh_expires_at, agent_fingerprint, created_at";

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    sender: String,
    receiver: String,
    content: String,
    is_file: bool,
    created_at: DateTime<Utc>,
    delivered: bool,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::from(value.id),
            sender: parse_username(value.sender)?,
            receiver: parse_username(value.receiver)?,
            content,
            is_file: value.is_file,
            created_at: value.created_at,
            delivered: value.delivered,
        })
    }
}

fn into_messages(records: Vec<MessageRecord>) -> Result<Vec<Message>, RepositoryError> {
    let mut messages = records
        .into_iter()
        .map(Message::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    messages.sort_by_key(|m| m.created_at);
    Ok(messages)
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, password_hash, friends, friend_requests, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING username, password_hash, friends, friend_requests, created_at, updated_at
            "#,
        )
        .bind(user.username.as_str())
        .bind(user.password.as_str())
        .bind(name_list(&user.friends))
        .bind(name_list(&user.friend_requests))
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users
            SET password_hash = $2, friends = $3, friend_requests = $4, updated_at = $5
            WHERE username = $1
            RETURNING username, password_hash, friends, friend_requests, created_at, updated_at
            "#,
        )
        .bind(user.username.as_str())
        .bind(user.password.as_str())
        .bind(name_list(&user.friends))
        .bind(name_list(&user.friend_requests))
        .bind(user.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        User::try_from(record)
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT username, password_hash, friends, friend_requests, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, token: &str) -> Result<Option<Session>, RepositoryError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE {column} = $1");
        let record = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(Session::try_from).transpose()
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, RepositoryError> {
        let sql = format!(
            "INSERT INTO sessions ({SESSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(Uuid::from(session.id))
            .bind(session.username.as_str())
            .bind(&session.access_token)
            .bind(session.access_issued_at)
            .bind(session.access_expires_at)
            .bind(&session.refresh_token)
            .bind(session.refresh_expires_at)
            .bind(&session.agent_fingerprint)
            .bind(session.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Session::try_from(record)
    }

    async fn update(&self, session: Session) -> Result<Session, RepositoryError> {
        let sql = format!(
            "UPDATE sessions \
             SET access_token = $2, access_issued_at = $3, access_expires_at = $4 \
             WHERE id = $1 \
             RETURNING {SESSION_COLUMNS}"
        );
        let record = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(Uuid::from(session.id))
            .bind(&session.access_token)
            .bind(session.access_issued_at)
            .bind(session.access_expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)?;

        Session::try_from(record)
    }

    async fn find_live_by_user(
        &self,
        username: &Username,
        now: Timestamp,
    ) -> Result<Vec<Session>, RepositoryError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE username = $1 AND access_expires_at > $2 \
             ORDER BY created_at ASC"
        );
        let records = sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(username.as_str())
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        records.into_iter().map(Session::try_from).collect()
    }

    async fn find_by_access_token(&self, token: &str) -> Result<Option<Session>, RepositoryError> {
        self.find_one("access_token", token).await
    }

    async fn find_by_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<Session>, RepositoryError> {
        self.find_one("refresh_token", token).await
    }

    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

const MESSAGE_COLUMNS: &str = "id, sender, receiver, content, is_file, created_at, delivered";

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn save(&self, message: Message) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender, receiver, content, is_file, created_at, delivered)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET delivered = EXCLUDED.delivered
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(message.sender.as_str())
        .bind(message.receiver.as_str())
        .bind(message.content.as_str())
        .bind(message.is_file)
        .bind(message.created_at)
        .bind(message.delivered)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_undelivered_for(
        &self,
        receiver: &Username,
    ) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE receiver = $1 AND delivered = FALSE \
             ORDER BY created_at ASC"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(receiver.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        into_messages(records)
    }

    async fn find_all_for(&self, receiver: &Username) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE receiver = $1 ORDER BY created_at ASC"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(receiver.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        into_messages(records)
    }

    async fn mark_delivered(&self, ids: &[MessageId]) -> Result<(), RepositoryError> {
        let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        sqlx::query("UPDATE messages SET delivered = TRUE WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn drain_undelivered(
        &self,
        receiver: &Username,
    ) -> Result<Vec<Message>, RepositoryError> {
        // 单条语句完成选取与标记；SKIP LOCKED 保证并发轮询不会拿到同一行
        let sql = format!(
            "UPDATE messages SET delivered = TRUE \
             WHERE id IN ( \
                 SELECT id FROM messages \
                 WHERE receiver = $1 AND delivered = FALSE \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(receiver.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        into_messages(records)
    }
}

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub session_repository: Arc<PgSessionRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            session_repository: Arc::new(PgSessionRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
