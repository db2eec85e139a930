//! 在线目录
//!
//! 只有正在长轮询的用户才会出现在目录中。每个等待者持有一个容量为 1 的
//! 通道接收端，发送方通过 [`PresenceDirectory::lookup`] 取得发送端后非阻塞投递。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use domain::{Message, Username};
use tokio::sync::mpsc;

struct Registration {
    ticket: u64,
    sender: mpsc::Sender<Message>,
}

#[derive(Default)]
struct DirectoryInner {
    waiters: DashMap<Username, Registration>,
    next_ticket: AtomicU64,
}

#[derive(Clone, Default)]
pub struct PresenceDirectory {
    inner: Arc<DirectoryInner>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为用户登记一个新的等待者。同一用户已有的等待者会被替换，
    /// 旧的接收端随即看到通道关闭。
    pub fn register_waiter(&self, username: &Username) -> Waiter {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(1);
        let replaced = self
            .inner
            .waiters
            .insert(username.clone(), Registration { ticket, sender });
        if replaced.is_some() {
            tracing::debug!(username = %username, "previous poll replaced");
        }

        Waiter {
            username: username.clone(),
            ticket,
            receiver,
            directory: self.clone(),
            released: false,
        }
    }

    pub fn lookup(&self, username: &Username) -> Option<mpsc::Sender<Message>> {
        self.inner
            .waiters
            .get(username)
            .map(|registration| registration.sender.clone())
    }

    pub fn is_waiting(&self, username: &Username) -> bool {
        self.inner.waiters.contains_key(username)
    }

    pub fn unregister(&self, username: &Username) {
        self.inner.waiters.remove(username);
    }

    fn release(&self, username: &Username, ticket: u64) {
        self.inner
            .waiters
            .remove_if(username, |_, registration| registration.ticket == ticket);
    }
}

/// 一次长轮询的接收端，丢弃时自动从目录中注销。
pub struct Waiter {
    username: Username,
    ticket: u64,
    receiver: mpsc::Receiver<Message>,
    directory: PresenceDirectory,
    released: bool,
}

impl Waiter {
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// 等待一条消息；超时或通道被替换时返回 `None`。
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// 注销并关闭通道，返回在关闭前已经进入通道的消息。
    pub fn close(&mut self) -> Vec<Message> {
        self.release();
        self.receiver.close();

        let mut strays = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            strays.push(message);
        }
        strays
    }

    fn release(&mut self) {
        if !self.released {
            self.directory.release(&self.username, self.ticket);
            self.released = true;
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.release();
    }
}
