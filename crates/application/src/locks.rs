use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// 按键划分的异步互斥锁表，不同键之间互不阻塞。
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Arc<LockTable>,
}

/// 释放时若没有其他持有者或等待者，则从表中移除该键。
#[derive(Debug)]
pub struct KeyedGuard {
    key: String,
    table: Arc<LockTable>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedGuard {
        // 先克隆 Arc 并释放分片锁，再等待互斥锁
        let mutex = self.locks.entry(key.to_owned()).or_default().clone();
        KeyedGuard {
            key: key.to_owned(),
            table: self.locks.clone(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// 同时锁定两个键，总是按字典序加锁以避免死锁。
    pub async fn lock_pair(
        &self,
        first: &str,
        second: &str,
    ) -> (KeyedGuard, Option<KeyedGuard>) {
        if first == second {
            return (self.lock(first).await, None);
        }
        let (low, high) = if first < second {
            (first, second)
        } else {
            (second, first)
        };
        let low_guard = self.lock(low).await;
        let high_guard = self.lock(high).await;
        (low_guard, Some(high_guard))
    }
}
