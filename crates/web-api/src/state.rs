use std::sync::Arc;

use application::{
    AuthGate, AuthService, AuthServiceDependencies, Clock, FriendService,
    FriendServiceDependencies, MessageService, MessageServiceDependencies, PresenceDirectory,
    SessionRegistry, SessionRegistryDependencies, SystemClock, TokenIssuer, TokenLifetimes,
};
use config::AppConfig;
use infrastructure::Infrastructure;

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub message_service: Arc<MessageService>,
    pub friend_service: Arc<FriendService>,
    pub auth_gate: Arc<AuthGate>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(infrastructure: Infrastructure, config: &AppConfig) -> Self {
        Self::with_clock(infrastructure, config, Arc::new(SystemClock))
    }

    /// 把基础设施适配器装配成用例服务
    pub fn with_clock(
        infrastructure: Infrastructure,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let lifetimes = TokenLifetimes {
            access: chrono::Duration::minutes(config.jwt.access_token_minutes),
            refresh: chrono::Duration::days(config.jwt.refresh_token_days),
        };
        let token_issuer = Arc::new(TokenIssuer::new(
            config.jwt.secret.as_bytes(),
            lifetimes,
            clock.clone(),
        ));

        let sessions = Arc::new(SessionRegistry::new(
            SessionRegistryDependencies {
                session_repository: infrastructure.session_repository.clone(),
                token_issuer: token_issuer.clone(),
                clock: clock.clone(),
            },
            config.session.max_per_user,
        ));

        let auth_service = AuthService::new(AuthServiceDependencies {
            user_repository: infrastructure.user_repository.clone(),
            password_hasher: infrastructure.password_hasher.clone(),
            sessions: sessions.clone(),
            token_issuer: token_issuer.clone(),
            clock: clock.clone(),
        });

        let message_service = MessageService::new(MessageServiceDependencies {
            user_repository: infrastructure.user_repository.clone(),
            message_repository: infrastructure.message_repository.clone(),
            file_store: infrastructure.file_store.clone(),
            presence: PresenceDirectory::new(),
            clock: clock.clone(),
            poll_timeout: config.poll_timeout(),
        });

        let friend_service = FriendService::new(FriendServiceDependencies {
            user_repository: infrastructure.user_repository,
            clock,
        });

        Self {
            auth_service: Arc::new(auth_service),
            message_service: Arc::new(message_service),
            friend_service: Arc::new(friend_service),
            auth_gate: Arc::new(AuthGate::new(token_issuer, sessions)),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}
