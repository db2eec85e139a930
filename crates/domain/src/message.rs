use crate::value_objects::{MessageContent, MessageId, Timestamp, Username};

/// 文件消息正文的固定前缀，完整定位符为 `/api/file/<stored-name>`。
pub const FILE_LOCATOR_PREFIX: &str = "/api/file/";

pub fn file_locator(stored_name: &str) -> String {
    format!("{FILE_LOCATOR_PREFIX}{stored_name}")
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Username,
    pub receiver: Username,
    /// 文本消息为原文，文件消息为文件定位符
    pub content: MessageContent,
    pub is_file: bool,
    pub created_at: Timestamp,
    pub delivered: bool,
}

impl Message {
    pub fn text(
        id: MessageId,
        sender: Username,
        receiver: Username,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            sender,
            receiver,
            content,
            is_file: false,
            created_at,
            delivered: false,
        }
    }

    pub fn file(
        id: MessageId,
        sender: Username,
        receiver: Username,
        locator: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            is_file: true,
            ..Self::text(id, sender, receiver, locator, created_at)
        }
    }

    /// 标记为已投递；已经投递过时返回 `false`。
    pub fn mark_delivered(&mut self) -> bool {
        !std::mem::replace(&mut self.delivered, true)
    }

    /// 文件消息的正文与定位符完全一致时才算引用该文件。
    pub fn references_file(&self, locator: &str) -> bool {
        self.is_file && self.content.as_str() == locator
    }
}
