//! 长轮询协调
//!
//! 先取出持久化的未投递消息；没有时登记等待者并再取一次，然后在超时时间内
//! 等待一条实时消息。所有路径都会关闭通道并收回关闭前进入通道的消息。

use std::sync::Arc;
use std::time::Duration;

use domain::{Message, Username};

use crate::{
    error::ApplicationError,
    presence::{PresenceDirectory, Waiter},
    repository::MessageRepository,
};

pub struct PollCoordinator {
    message_repository: Arc<dyn MessageRepository>,
    presence: PresenceDirectory,
    timeout: Duration,
}

impl PollCoordinator {
    pub fn new(
        message_repository: Arc<dyn MessageRepository>,
        presence: PresenceDirectory,
        timeout: Duration,
    ) -> Self {
        Self {
            message_repository,
            presence,
            timeout,
        }
    }

    /// 超时返回空列表，不视为错误。
    pub async fn poll(&self, username: &Username) -> Result<Vec<Message>, ApplicationError> {
        let pending = self.message_repository.drain_undelivered(username).await?;
        if !pending.is_empty() {
            tracing::debug!(username = %username, count = pending.len(), "delivering queued messages");
            return Ok(pending);
        }

        let mut guard = PollGuard::new(
            self.presence.register_waiter(username),
            self.message_repository.clone(),
        );

        // 第一次查询与登记之间，发送方可能看不到等待者而选择持久化
        let mut pending = self.message_repository.drain_undelivered(username).await?;
        if !pending.is_empty() {
            let strays = guard.finish();
            pending.extend(self.persist_delivered(strays).await);
            return Ok(pending);
        }

        let mut live: Vec<Message> = guard.recv_timeout(self.timeout).await.into_iter().collect();
        live.extend(guard.finish());

        if live.is_empty() {
            tracing::debug!(username = %username, "poll timed out");
        }
        Ok(self.persist_delivered(live).await)
    }

    /// 实时交付的消息以已投递状态写入历史，供文件授权使用。
    async fn persist_delivered(&self, messages: Vec<Message>) -> Vec<Message> {
        let mut delivered = Vec::with_capacity(messages.len());
        for mut message in messages {
            message.mark_delivered();
            if let Err(err) = self.message_repository.save(message.clone()).await {
                tracing::error!(
                    error = %err,
                    message_id = %message.id,
                    "failed to record delivered message"
                );
            }
            tracing::info!(
                message_id = %message.id,
                receiver = %message.receiver,
                "message delivered live"
            );
            delivered.push(message);
        }
        delivered
    }
}

/// 轮询期间持有等待者。轮询 future 被丢弃时，把已进入通道的消息作为未投递消息保存。
struct PollGuard {
    waiter: Option<Waiter>,
    message_repository: Arc<dyn MessageRepository>,
}

impl PollGuard {
    fn new(waiter: Waiter, message_repository: Arc<dyn MessageRepository>) -> Self {
        Self {
            waiter: Some(waiter),
            message_repository,
        }
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        match self.waiter.as_mut() {
            Some(waiter) => waiter.recv_timeout(timeout).await,
            None => None,
        }
    }

    fn finish(mut self) -> Vec<Message> {
        self.waiter
            .take()
            .map(|mut waiter| waiter.close())
            .unwrap_or_default()
    }
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        let Some(mut waiter) = self.waiter.take() else {
            return;
        };
        let strays = waiter.close();
        if strays.is_empty() {
            return;
        }

        let username = waiter.username().clone();
        let repository = self.message_repository.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for message in strays {
                        if let Err(err) = repository.save(message).await {
                            tracing::error!(error = %err, "failed to requeue message from cancelled poll");
                        }
                    }
                });
                tracing::info!(username = %username, "cancelled poll requeued pending messages");
            }
            Err(_) => {
                tracing::error!(
                    username = %username,
                    lost = strays.len(),
                    "no runtime to requeue messages from cancelled poll"
                );
            }
        }
    }
}
