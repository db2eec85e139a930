//! 消息系统核心领域模型
//!
//! 包含用户、消息、会话等核心实体，以及值对象和错误类型。

pub mod errors;
pub mod message;
pub mod session;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::{DomainError, RepositoryError};
pub use message::{file_locator, Message, FILE_LOCATOR_PREFIX};
pub use session::{Session, TokenGrant};
pub use user::User;
pub use value_objects::{MessageContent, MessageId, PasswordHash, SessionId, Timestamp, Username};
