mod auth_service;
mod friend_service;
mod message_service;

pub use auth_service::{AuthService, AuthServiceDependencies, LoginRequest, RegisterUserRequest};
pub use friend_service::{
    FriendRequestOutcome, FriendResponseOutcome, FriendService, FriendServiceDependencies,
};
pub use message_service::{
    DispatchOutcome, FileUpload, MessageService, MessageServiceDependencies, SendMessageRequest,
};
