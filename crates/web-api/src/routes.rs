use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use application::{
    dto::{AccessTokenDto, MessageDto, TokenPairDto},
    DispatchOutcome, FileUpload, LoginRequest, RegisterUserRequest, SendMessageRequest,
};

use crate::{
    auth::{self, bearer_token, AuthenticatedUser, ClientAgent},
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct FriendRequestPayload {
    username: String,
}

#[derive(Debug, Deserialize)]
struct FriendResponsePayload {
    username: String,
    accept: bool,
}

#[derive(Debug, Serialize)]
struct RegisteredUser {
    username: String,
}

#[derive(Debug, Serialize)]
struct LoggedOut {
    username: String,
}

#[derive(Debug, Serialize)]
struct SendResult {
    status: u8,
    outcome: &'static str,
}

#[derive(Debug, Serialize)]
struct FriendOutcome {
    outcome: &'static str,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .nest("/api", public_routes().merge(gated_routes(state.clone())))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register_user))
        .route("/login", post(login_user))
        .route("/refresh", post(refresh_access))
        .route("/logout", post(logout_user))
}

fn gated_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/protected", get(protected))
        .route("/send", post(send_message))
        .route("/messages", get(poll_messages))
        .route("/file/{filename}", get(download_file))
        .route("/friends", get(list_friends))
        .route("/friends/request", post(send_friend_request))
        .route("/friends/respond", post(respond_to_friend_request))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_gate))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let user = state
        .auth_service
        .register(RegisterUserRequest {
            username: payload.username,
            password: payload.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisteredUser {
            username: user.username.as_str().to_owned(),
        }),
    ))
}

async fn login_user(
    State(state): State<AppState>,
    ClientAgent(agent): ClientAgent,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<TokenPairDto>, ApiError> {
    let pair = state
        .auth_service
        .login(
            LoginRequest {
                username: payload.username,
                password: payload.password,
            },
            &agent,
        )
        .await?;

    Ok(Json(pair.into()))
}

async fn refresh_access(
    State(state): State<AppState>,
    ClientAgent(agent): ClientAgent,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<AccessTokenDto>, ApiError> {
    let access_token = state
        .auth_service
        .refresh(&payload.refresh_token, &agent)
        .await?;

    Ok(Json(AccessTokenDto { access_token }))
}

async fn logout_user(
    State(state): State<AppState>,
    ClientAgent(agent): ClientAgent,
    headers: HeaderMap,
) -> Result<Json<LoggedOut>, ApiError> {
    let token = bearer_token(&headers).ok_or_else(|| ApiError::unauthorized("missing token"))?;
    let username = state.auth_service.logout(token, &agent).await?;

    Ok(Json(LoggedOut {
        username: username.as_str().to_owned(),
    }))
}

async fn protected(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
) -> String {
    state.auth_service.whoami(&username)
}

/// multipart 字段：`username`（接收方）、`message`、`file`
async fn send_message(
    State(state): State<AppState>,
    AuthenticatedUser(sender): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SendResult>), ApiError> {
    let mut receiver: Option<String> = None;
    let mut text: Option<String> = None;
    let mut file: Option<FileUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("multipart error: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "username" => {
                receiver = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("read error: {e}")))?,
                );
            }
            "message" => {
                text = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("read error: {e}")))?,
                );
            }
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("read error: {e}")))?;
                file = Some(FileUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let receiver = receiver.ok_or_else(|| ApiError::bad_request("username is required"))?;
    let outcome = state
        .message_service
        .send(SendMessageRequest {
            sender,
            receiver,
            text,
            file,
        })
        .await?;

    let status = match outcome {
        DispatchOutcome::Delivered | DispatchOutcome::Queued => StatusCode::OK,
        DispatchOutcome::Forbidden => StatusCode::FORBIDDEN,
        DispatchOutcome::ReceiverNotFound => StatusCode::NOT_FOUND,
    };
    Ok((
        status,
        Json(SendResult {
            status: outcome.code(),
            outcome: outcome.as_str(),
        }),
    ))
}

async fn poll_messages(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let messages = state.message_service.poll(&username).await?;
    Ok(Json(messages.iter().map(MessageDto::from).collect()))
}

async fn download_file(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state
        .message_service
        .fetch_file(&username, &filename)
        .await?;

    // 存储名为 `<uuid>_<原文件名>`
    let display_name = handle
        .stored_name
        .split_once('_')
        .map(|(_, original)| original)
        .unwrap_or(handle.stored_name.as_str())
        .replace('"', "");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{display_name}\""),
        );
    if let Some(size) = handle.size {
        builder = builder.header(header::CONTENT_LENGTH, size);
    }

    builder
        .body(Body::from_stream(ReaderStream::new(handle.reader)))
        .map_err(|e| ApiError::internal_server_error(format!("response build failed: {e}")))
}

async fn list_friends(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.friend_service.friends(&username).await?))
}

async fn send_friend_request(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
    Json(payload): Json<FriendRequestPayload>,
) -> Result<Json<FriendOutcome>, ApiError> {
    let outcome = state
        .friend_service
        .send_friend_request(&username, &payload.username)
        .await?;
    Ok(Json(FriendOutcome {
        outcome: outcome.as_str(),
    }))
}

async fn respond_to_friend_request(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
    Json(payload): Json<FriendResponsePayload>,
) -> Result<Json<FriendOutcome>, ApiError> {
    let outcome = state
        .friend_service
        .respond_to_friend_request(&username, &payload.username, payload.accept)
        .await?;
    Ok(Json(FriendOutcome {
        outcome: outcome.as_str(),
    }))
}
