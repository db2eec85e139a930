//! 应用层实现。
//!
//! 这里提供令牌与会话生命周期管理、认证闸门、在线目录与长轮询协调，
//! 以及对外部适配器（例如密码哈希、持久化、文件存储）的抽象。

pub mod auth_gate;
pub mod clock;
pub mod dto;
pub mod error;
pub mod locks;
pub mod password;
pub mod poll;
pub mod presence;
pub mod repository;
pub mod services;
pub mod sessions;
pub mod storage;
pub mod token;

pub use auth_gate::{AuthGate, GateDecision, GateRejection};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use locks::{KeyedGuard, KeyedLocks};
pub use password::{PasswordHasher, PasswordHasherError};
pub use poll::PollCoordinator;
pub use presence::{PresenceDirectory, Waiter};
pub use repository::{MessageRepository, SessionRepository, UserRepository};
pub use services::{
    AuthService, AuthServiceDependencies, DispatchOutcome, FileUpload, FriendRequestOutcome,
    FriendResponseOutcome, FriendService, FriendServiceDependencies, LoginRequest,
    MessageService, MessageServiceDependencies, RegisterUserRequest, SendMessageRequest,
};
pub use sessions::{RenewedAccess, SessionRegistry, SessionRegistryDependencies, TokenPair};
pub use storage::{FileHandle, FileStore, FileStoreError};
pub use token::{fingerprint, TokenClaims, TokenClass, TokenError, TokenIssuer, TokenLifetimes};
