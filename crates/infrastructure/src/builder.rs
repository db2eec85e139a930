use std::path::PathBuf;
use std::sync::Arc;

use application::{FileStore, MessageRepository, PasswordHasher, SessionRepository, UserRepository};
use thiserror::Error;

use crate::{
    memory::{InMemoryMessageRepository, InMemorySessionRepository, InMemoryUserRepository},
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
    storage::LocalFileStore,
};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    /// 为空时使用进程内存储
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bcrypt_cost: Option<u32>,
    pub storage_root: PathBuf,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            bcrypt_cost: None,
            storage_root: PathBuf::from("storage"),
        }
    }
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 组装好的适配器集合，交给应用层服务使用。
#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub session_repository: Arc<dyn SessionRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub file_store: Arc<dyn FileStore>,
}

impl Infrastructure {
    /// 配置了数据库地址时连接 PostgreSQL 并执行迁移，否则退回进程内存储。
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let Some(database_url) = config.database_url.as_deref() else {
            tracing::warn!("no database configured, using in-memory stores");
            return Ok(Self::in_memory(&config));
        };

        let pool = create_pg_pool(database_url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!("database migrations applied");

        let storage = PgStorage::new(pool);
        Ok(Self {
            user_repository: storage.user_repository,
            session_repository: storage.session_repository,
            message_repository: storage.message_repository,
            password_hasher: Arc::new(BcryptPasswordHasher::new(config.bcrypt_cost)),
            file_store: Arc::new(LocalFileStore::new(config.storage_root.clone())),
        })
    }

    pub fn in_memory(config: &InfrastructureConfig) -> Self {
        Self {
            user_repository: Arc::new(InMemoryUserRepository::new()),
            session_repository: Arc::new(InMemorySessionRepository::new()),
            message_repository: Arc::new(InMemoryMessageRepository::new()),
            password_hasher: Arc::new(BcryptPasswordHasher::new(config.bcrypt_cost)),
            file_store: Arc::new(LocalFileStore::new(config.storage_root.clone())),
        }
    }
}
