//! 基础设施层实现。
//!
//! 提供数据库与进程内仓储、密码哈希、本地文件存储等适配器，实现应用层定义的接口。

pub mod builder;
pub mod memory;
pub mod migrations;
pub mod password;
pub mod repository;
pub mod storage;

pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use memory::{InMemoryMessageRepository, InMemorySessionRepository, InMemoryUserRepository};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgMessageRepository, PgSessionRepository, PgStorage, PgUserRepository,
};
pub use storage::LocalFileStore;
