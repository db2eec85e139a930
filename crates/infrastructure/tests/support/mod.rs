#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::{
    AuthGate, AuthService, AuthServiceDependencies, Clock, FriendService,
    FriendServiceDependencies, LoginRequest, MessageService, MessageServiceDependencies,
    PresenceDirectory, RegisterUserRequest, SessionRegistry, SessionRegistryDependencies,
    TokenIssuer, TokenLifetimes, TokenPair,
};
use domain::{Timestamp, Username};
use infrastructure::{
    BcryptPasswordHasher, InMemoryMessageRepository, InMemorySessionRepository,
    InMemoryUserRepository, LocalFileStore,
};

pub const SECRET: &[u8] = b"integration-secret-0123456789abcdef";

/// 可拨动时钟
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

pub struct TestApp {
    pub clock: Arc<ManualClock>,
    pub users: Arc<InMemoryUserRepository>,
    pub sessions: Arc<InMemorySessionRepository>,
    pub messages: Arc<InMemoryMessageRepository>,
    pub storage_root: PathBuf,
    pub presence: PresenceDirectory,
    pub registry: Arc<SessionRegistry>,
    pub auth: AuthService,
    pub friends: FriendService,
    pub messaging: Arc<MessageService>,
    pub gate: AuthGate,
}

impl TestApp {
    pub fn new(poll_timeout: Duration) -> Self {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let users = Arc::new(InMemoryUserRepository::new());
        let sessions = Arc::new(InMemorySessionRepository::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let storage_root =
            std::env::temp_dir().join(format!("pollchat-it-{}", uuid::Uuid::new_v4()));
        let presence = PresenceDirectory::new();

        let issuer = Arc::new(TokenIssuer::new(
            SECRET,
            TokenLifetimes::default(),
            clock.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new(
            SessionRegistryDependencies {
                session_repository: sessions.clone(),
                token_issuer: issuer.clone(),
                clock: clock.clone(),
            },
            2,
        ));
        let auth = AuthService::new(AuthServiceDependencies {
            user_repository: users.clone(),
            password_hasher: Arc::new(BcryptPasswordHasher::new(Some(4))),
            sessions: registry.clone(),
            token_issuer: issuer.clone(),
            clock: clock.clone(),
        });
        let friends = FriendService::new(FriendServiceDependencies {
            user_repository: users.clone(),
            clock: clock.clone(),
        });
        let messaging = Arc::new(MessageService::new(MessageServiceDependencies {
            user_repository: users.clone(),
            message_repository: messages.clone(),
            file_store: Arc::new(LocalFileStore::new(storage_root.clone())),
            presence: presence.clone(),
            clock: clock.clone(),
            poll_timeout,
        }));
        let gate = AuthGate::new(issuer, registry.clone());

        Self {
            clock,
            users,
            sessions,
            messages,
            storage_root,
            presence,
            registry,
            auth,
            friends,
            messaging,
            gate,
        }
    }

    pub async fn register(&self, name: &str) -> Username {
        self.auth
            .register(RegisterUserRequest {
                username: name.to_owned(),
                password: format!("{name}-password"),
            })
            .await
            .expect("register")
            .username
    }

    pub async fn login(&self, name: &str, agent: &str) -> TokenPair {
        self.auth
            .login(
                LoginRequest {
                    username: name.to_owned(),
                    password: format!("{name}-password"),
                },
                agent,
            )
            .await
            .expect("login")
    }

    /// `receiver` 接受来自 `sender` 的好友请求，双方互为好友。
    pub async fn befriend(&self, sender: &Username, receiver: &Username) {
        self.friends
            .send_friend_request(sender, receiver.as_str())
            .await
            .expect("send request");
        self.friends
            .respond_to_friend_request(receiver, sender.as_str(), true)
            .await
            .expect("accept request");
    }

    /// 等待 `username` 的长轮询注册完成
    pub async fn wait_until_polling(&self, username: &Username) {
        for _ in 0..200 {
            if self.presence.is_waiting(username) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{username} never started polling");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.storage_root);
    }
}
