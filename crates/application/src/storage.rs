use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("file not found")]
    NotFound,
    #[error("invalid file name: {0}")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 打开的文件内容，由调用方以流的方式读取。
pub struct FileHandle {
    pub stored_name: String,
    pub size: Option<u64>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl FileHandle {
    pub fn new(
        stored_name: impl Into<String>,
        size: Option<u64>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            stored_name: stored_name.into(),
            size,
            reader: Box::new(reader),
        }
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("stored_name", &self.stored_name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// 上传文件的存储。存储名称在进程内唯一，并且可以直接作为定位符的最后一段。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn store(&self, original_name: &str, bytes: Vec<u8>) -> Result<String, FileStoreError>;
    async fn open(&self, stored_name: &str) -> Result<FileHandle, FileStoreError>;
}
