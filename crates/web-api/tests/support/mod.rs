#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use application::{Clock, SystemClock};
use config::AppConfig;
use domain::Timestamp;
use infrastructure::{Infrastructure, InfrastructureConfig};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot};
use web_api::{router, AppState};

/// 可拨动时钟
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(chrono::Utc::now()),
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

pub struct TestServer {
    pub base_url: String,
    storage_root: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// 进程内存储、最短轮询超时，监听随机端口
    pub async fn spawn() -> Self {
        Self::spawn_with_clock(Arc::new(SystemClock)).await
    }

    pub async fn spawn_with_clock(clock: Arc<dyn Clock>) -> Self {
        let storage_root =
            std::env::temp_dir().join(format!("pollchat-http-{}", uuid::Uuid::new_v4()));
        let infrastructure = Infrastructure::in_memory(&InfrastructureConfig {
            bcrypt_cost: Some(4),
            storage_root: storage_root.clone(),
            ..InfrastructureConfig::default()
        });

        let mut config = AppConfig::default();
        config.poll.timeout_seconds = 1;
        let app = router(AppState::with_clock(infrastructure, &config, clock));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr: SocketAddr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            base_url: format!("http://{addr}"),
            storage_root,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn register(&self, client: &Client, username: &str) -> Response {
        client
            .post(self.url("/api/register"))
            .json(&json!({ "username": username, "password": format!("{username}-pw") }))
            .send()
            .await
            .expect("register request")
    }

    /// 返回 (accessToken, refreshToken)
    pub async fn login(&self, client: &Client, username: &str, agent: &str) -> (String, String) {
        let body: Value = client
            .post(self.url("/api/login"))
            .header("User-Agent", agent)
            .json(&json!({ "username": username, "password": format!("{username}-pw") }))
            .send()
            .await
            .expect("login request")
            .json()
            .await
            .expect("login json");
        (
            body["accessToken"].as_str().expect("accessToken").to_owned(),
            body["refreshToken"].as_str().expect("refreshToken").to_owned(),
        )
    }

    /// 注册并登录，返回访问令牌
    pub async fn signed_up(&self, client: &Client, username: &str) -> String {
        assert_eq!(self.register(client, username).await.status(), 201);
        self.login(client, username, "").await.0
    }

    pub async fn befriend(&self, client: &Client, a: (&str, &str), b: (&str, &str)) {
        let (a_name, a_token) = a;
        let (b_name, b_token) = b;
        let sent: Value = client
            .post(self.url("/api/friends/request"))
            .bearer_auth(a_token)
            .json(&json!({ "username": b_name }))
            .send()
            .await
            .expect("friend request")
            .json()
            .await
            .expect("friend request json");
        assert_eq!(sent["outcome"], "sent");

        let accepted: Value = client
            .post(self.url("/api/friends/respond"))
            .bearer_auth(b_token)
            .json(&json!({ "username": a_name, "accept": true }))
            .send()
            .await
            .expect("friend respond")
            .json()
            .await
            .expect("friend respond json");
        assert_eq!(accepted["outcome"], "accepted");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = std::fs::remove_dir_all(&self.storage_root);
    }
}
