use std::sync::Arc;
use std::time::Duration;

use domain::{file_locator, Message, MessageContent, MessageId, Username};
use tokio::sync::mpsc::error::TrySendError;

use crate::{
    clock::Clock,
    error::ApplicationError,
    poll::PollCoordinator,
    presence::PresenceDirectory,
    repository::{MessageRepository, UserRepository},
    storage::{FileHandle, FileStore},
};

#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender: Username,
    pub receiver: String,
    pub text: Option<String>,
    pub file: Option<FileUpload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 接收方正在轮询，已直接交付
    Delivered,
    /// 已持久化，等待接收方下一次轮询
    Queued,
    /// 发送方不在接收方的好友列表中
    Forbidden,
    ReceiverNotFound,
}

impl DispatchOutcome {
    pub fn code(self) -> u8 {
        match self {
            DispatchOutcome::Delivered => 1,
            DispatchOutcome::Queued => 2,
            DispatchOutcome::Forbidden => 3,
            DispatchOutcome::ReceiverNotFound => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Queued => "queued",
            DispatchOutcome::Forbidden => "forbidden",
            DispatchOutcome::ReceiverNotFound => "receiver_not_found",
        }
    }
}

pub struct MessageServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub file_store: Arc<dyn FileStore>,
    pub presence: PresenceDirectory,
    pub clock: Arc<dyn Clock>,
    pub poll_timeout: Duration,
}

/// 消息路由：校验好友关系，然后实时交付或持久化。
pub struct MessageService {
    user_repository: Arc<dyn UserRepository>,
    message_repository: Arc<dyn MessageRepository>,
    file_store: Arc<dyn FileStore>,
    presence: PresenceDirectory,
    clock: Arc<dyn Clock>,
    poller: PollCoordinator,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        let poller = PollCoordinator::new(
            deps.message_repository.clone(),
            deps.presence.clone(),
            deps.poll_timeout,
        );
        Self {
            user_repository: deps.user_repository,
            message_repository: deps.message_repository,
            file_store: deps.file_store,
            presence: deps.presence,
            clock: deps.clock,
            poller,
        }
    }

    pub async fn send(
        &self,
        request: SendMessageRequest,
    ) -> Result<DispatchOutcome, ApplicationError> {
        let SendMessageRequest {
            sender,
            receiver,
            text,
            file,
        } = request;

        let Ok(receiver) = Username::parse(receiver) else {
            return Ok(DispatchOutcome::ReceiverNotFound);
        };
        let Some(receiver_user) = self.user_repository.find_by_username(&receiver).await? else {
            return Ok(DispatchOutcome::ReceiverNotFound);
        };

        // 只检查接收方的好友列表
        if !receiver_user.is_friend(&sender) {
            tracing::warn!(sender = %sender, receiver = %receiver, "send forbidden");
            return Ok(DispatchOutcome::Forbidden);
        }

        let now = self.clock.now();
        let message = match (file, text) {
            (Some(upload), _) if !upload.bytes.is_empty() => {
                let original_name = if upload.file_name.trim().is_empty() {
                    "upload"
                } else {
                    upload.file_name.as_str()
                };
                let stored_name = self.file_store.store(original_name, upload.bytes).await?;
                let locator = MessageContent::new(file_locator(&stored_name))?;
                Message::file(MessageId::generate(), sender, receiver, locator, now)
            }
            (_, Some(text)) if !text.trim().is_empty() => {
                let content = MessageContent::new(text)?;
                Message::text(MessageId::generate(), sender, receiver, content, now)
            }
            _ => {
                return Err(ApplicationError::invalid_request(
                    "either a message or a file is required",
                ))
            }
        };

        self.dispatch(message).await
    }

    async fn dispatch(&self, message: Message) -> Result<DispatchOutcome, ApplicationError> {
        let message = match self.presence.lookup(&message.receiver) {
            Some(sender) => match sender.try_send(message) {
                Ok(()) => {
                    tracing::debug!("message handed to waiting poll");
                    return Ok(DispatchOutcome::Delivered);
                }
                Err(TrySendError::Full(message)) | Err(TrySendError::Closed(message)) => message,
            },
            None => message,
        };

        let message_id = message.id;
        let receiver = message.receiver.clone();
        self.message_repository.save(message).await?;
        tracing::info!(message_id = %message_id, receiver = %receiver, "message queued");
        Ok(DispatchOutcome::Queued)
    }

    pub async fn poll(&self, username: &Username) -> Result<Vec<Message>, ApplicationError> {
        self.poller.poll(username).await
    }

    /// 只有收到过引用该文件的消息的用户才能读取文件。
    pub async fn fetch_file(
        &self,
        username: &Username,
        stored_name: &str,
    ) -> Result<FileHandle, ApplicationError> {
        let locator = file_locator(stored_name);
        let authorized = self
            .message_repository
            .find_all_for(username)
            .await?
            .iter()
            .any(|message| message.references_file(&locator));
        if !authorized {
            tracing::warn!(username = %username, "file access denied");
            return Err(ApplicationError::FileAccessDenied);
        }

        Ok(self.file_store.open(stored_name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::repository::{MockMessageRepository, MockUserRepository};
    use crate::storage::{FileStoreError, MockFileStore};
    use chrono::Utc;
    use domain::{PasswordHash, User};

    fn name(value: &str) -> Username {
        Username::parse(value).unwrap()
    }

    fn user_with_friends(username: &str, friends: &[&str]) -> User {
        let mut user = User::register(
            name(username),
            PasswordHash::new("hash").unwrap(),
            Utc::now(),
        );
        for friend in friends {
            user.add_friend(name(friend), Utc::now());
        }
        user
    }

    struct Mocks {
        users: MockUserRepository,
        messages: MockMessageRepository,
        files: MockFileStore,
    }

    impl Mocks {
        fn new() -> Self {
            let mut users = MockUserRepository::new();
            users.expect_find_by_username().returning(|username| {
                Ok(match username.as_str() {
                    "alice" => Some(user_with_friends("alice", &["bob"])),
                    "bob" => Some(user_with_friends("bob", &[])),
                    _ => None,
                })
            });
            Self {
                users,
                messages: MockMessageRepository::new(),
                files: MockFileStore::new(),
            }
        }

        fn build(self, presence: PresenceDirectory) -> MessageService {
            MessageService::new(MessageServiceDependencies {
                user_repository: Arc::new(self.users),
                message_repository: Arc::new(self.messages),
                file_store: Arc::new(self.files),
                presence,
                clock: Arc::new(SystemClock),
                poll_timeout: Duration::from_millis(50),
            })
        }
    }

    fn text(from: &str, to: &str, body: Option<&str>) -> SendMessageRequest {
        SendMessageRequest {
            sender: name(from),
            receiver: to.into(),
            text: body.map(str::to_owned),
            file: None,
        }
    }

    #[tokio::test]
    async fn sender_missing_from_receiver_friends_is_forbidden() {
        let mut mocks = Mocks::new();
        mocks.messages.expect_save().never();
        let service = mocks.build(PresenceDirectory::new());

        // bob 的好友列表里没有 alice
        let outcome = service.send(text("alice", "bob", Some("hi"))).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Forbidden);
    }

    #[tokio::test]
    async fn forbidden_wins_over_invalid_content() {
        let mocks = Mocks::new();
        let service = mocks.build(PresenceDirectory::new());
        let outcome = service.send(text("alice", "bob", None)).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Forbidden);
    }

    #[tokio::test]
    async fn unknown_receiver_is_reported() {
        let mocks = Mocks::new();
        let service = mocks.build(PresenceDirectory::new());
        let outcome = service.send(text("bob", "carol", Some("hi"))).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::ReceiverNotFound);
    }

    #[tokio::test]
    async fn missing_content_is_invalid_request() {
        let mocks = Mocks::new();
        let service = mocks.build(PresenceDirectory::new());
        let err = service
            .send(text("bob", "alice", Some("   ")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn offline_receiver_gets_queued_message() {
        let mut mocks = Mocks::new();
        mocks
            .messages
            .expect_save()
            .withf(|message| !message.delivered && message.content.as_str() == "hi")
            .times(1)
            .returning(|_| Ok(()));
        let service = mocks.build(PresenceDirectory::new());

        let outcome = service.send(text("bob", "alice", Some("hi"))).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Queued);
    }

    #[tokio::test]
    async fn waiting_receiver_gets_message_live() {
        let mut mocks = Mocks::new();
        mocks.messages.expect_save().never();
        let presence = PresenceDirectory::new();
        let mut waiter = presence.register_waiter(&name("alice"));
        let service = mocks.build(presence);

        let outcome = service.send(text("bob", "alice", Some("hi"))).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Delivered);
        let received = waiter.recv_timeout(Duration::from_millis(50)).await.unwrap();
        assert_eq!(received.content.as_str(), "hi");
    }

    #[tokio::test]
    async fn full_slot_falls_back_to_queue() {
        let mut mocks = Mocks::new();
        mocks.messages.expect_save().times(1).returning(|_| Ok(()));
        let presence = PresenceDirectory::new();
        let _waiter = presence.register_waiter(&name("alice"));
        let service = mocks.build(presence);

        let first = service.send(text("bob", "alice", Some("one"))).await.unwrap();
        let second = service.send(text("bob", "alice", Some("two"))).await.unwrap();
        assert_eq!(first, DispatchOutcome::Delivered);
        assert_eq!(second, DispatchOutcome::Queued);
    }

    #[tokio::test]
    async fn file_takes_precedence_over_text() {
        let mut mocks = Mocks::new();
        mocks
            .files
            .expect_store()
            .withf(|name, bytes| name == "notes.txt" && bytes == b"data")
            .times(1)
            .returning(|_, _| Ok("abc_notes.txt".to_owned()));
        mocks
            .messages
            .expect_save()
            .withf(|message| message.is_file && message.content.as_str() == "/api/file/abc_notes.txt")
            .times(1)
            .returning(|_| Ok(()));
        let service = mocks.build(PresenceDirectory::new());

        let outcome = service
            .send(SendMessageRequest {
                file: Some(FileUpload {
                    file_name: "notes.txt".into(),
                    bytes: b"data".to_vec(),
                }),
                ..text("bob", "alice", Some("ignored"))
            })
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Queued);
    }

    #[tokio::test]
    async fn empty_file_falls_back_to_text() {
        let mut mocks = Mocks::new();
        mocks.files.expect_store().never();
        mocks
            .messages
            .expect_save()
            .withf(|message| !message.is_file)
            .returning(|_| Ok(()));
        let service = mocks.build(PresenceDirectory::new());

        let outcome = service
            .send(SendMessageRequest {
                file: Some(FileUpload {
                    file_name: "empty.txt".into(),
                    bytes: Vec::new(),
                }),
                ..text("bob", "alice", Some("hello"))
            })
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Queued);
    }

    #[tokio::test]
    async fn file_not_addressed_to_requester_is_denied() {
        let mut mocks = Mocks::new();
        mocks.messages.expect_find_all_for().returning(|_| {
            Ok(vec![Message::file(
                MessageId::generate(),
                name("bob"),
                name("alice"),
                MessageContent::new("/api/file/abc_other.txt").unwrap(),
                Utc::now(),
            )])
        });
        mocks.files.expect_open().never();
        let service = mocks.build(PresenceDirectory::new());

        let err = service
            .fetch_file(&name("alice"), "abc_secret.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::FileAccessDenied));
    }

    #[tokio::test]
    async fn authorized_but_missing_blob_is_not_found() {
        let mut mocks = Mocks::new();
        mocks.messages.expect_find_all_for().returning(|_| {
            Ok(vec![Message::file(
                MessageId::generate(),
                name("bob"),
                name("alice"),
                MessageContent::new("/api/file/abc_gone.txt").unwrap(),
                Utc::now(),
            )])
        });
        mocks
            .files
            .expect_open()
            .returning(|_| Err(FileStoreError::NotFound));
        let service = mocks.build(PresenceDirectory::new());

        let err = service
            .fetch_file(&name("alice"), "abc_gone.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::FileNotFound));
    }
}
