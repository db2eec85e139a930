use std::sync::Arc;

use domain::{DomainError, RepositoryError, User, Username};

use crate::{
    clock::Clock,
    error::ApplicationError,
    password::PasswordHasher,
    repository::UserRepository,
    sessions::{SessionRegistry, TokenPair},
    token::TokenIssuer,
};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub struct AuthServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub sessions: Arc<SessionRegistry>,
    pub token_issuer: Arc<TokenIssuer>,
    pub clock: Arc<dyn Clock>,
}

pub struct AuthService {
    deps: AuthServiceDependencies,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let username = Username::parse(request.username)?;
        if request.password.is_empty() {
            return Err(ApplicationError::invalid_request("password is required"));
        }

        if self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(ApplicationError::Domain(DomainError::UserAlreadyExists));
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let user = User::register(username, password_hash, self.deps.clock.now());

        let stored = match self.deps.user_repository.create(user).await {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => {
                return Err(ApplicationError::Domain(DomainError::UserAlreadyExists))
            }
            Err(err) => return Err(err.into()),
        };
        tracing::info!(username = %stored.username, "user registered");
        Ok(stored)
    }

    /// 未知用户与密码错误返回同一种错误。
    pub async fn login(
        &self,
        request: LoginRequest,
        client_agent: &str,
    ) -> Result<TokenPair, ApplicationError> {
        let username =
            Username::parse(request.username).map_err(|_| ApplicationError::InvalidCredentials)?;
        let user = self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or(ApplicationError::InvalidCredentials)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            tracing::warn!(username = %username, "login rejected");
            return Err(ApplicationError::InvalidCredentials);
        }

        let pair = self
            .deps
            .sessions
            .create_session(&user.username, client_agent)
            .await?;
        tracing::info!(username = %user.username, "user logged in");
        Ok(pair)
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_agent: &str,
    ) -> Result<String, ApplicationError> {
        self.deps
            .sessions
            .renew_access(refresh_token, client_agent)
            .await
    }

    /// 令牌必须仍然有效（未过期、指纹匹配），随后注销其所属会话。
    pub async fn logout(
        &self,
        access_token: &str,
        client_agent: &str,
    ) -> Result<Username, ApplicationError> {
        let username = self.deps.token_issuer.validate(access_token, client_agent)?;
        self.deps.sessions.revoke(access_token).await?;
        tracing::info!(username = %username, "user logged out");
        Ok(username)
    }

    pub fn whoami(&self, username: &Username) -> String {
        format!("Hello {username}")
    }
}
