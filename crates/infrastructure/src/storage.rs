use std::path::{Path, PathBuf};

use application::{FileHandle, FileStore, FileStoreError};
use async_trait::async_trait;
use uuid::Uuid;

/// 本地磁盘文件存储，存储名为 `<uuid>_<原文件名>`。
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, stored_name: &str) -> Result<PathBuf, FileStoreError> {
        if !is_plain_name(stored_name) {
            return Err(FileStoreError::InvalidName(stored_name.to_owned()));
        }
        Ok(self.root.join(stored_name))
    }
}

/// 只允许单段文件名，拒绝路径分隔符与上级目录引用。
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
        && !name.chars().any(char::is_control)
}

/// 去掉客户端提供的目录部分，只保留最后一段。
fn sanitize_original_name(original_name: &str) -> String {
    let last = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .replace("..", "_");
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    if cleaned.trim().is_empty() {
        "upload".to_owned()
    } else {
        cleaned
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, original_name: &str, bytes: Vec<u8>) -> Result<String, FileStoreError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let stored_name = format!("{}_{}", Uuid::new_v4(), sanitize_original_name(original_name));
        let path = self.path_for(&stored_name)?;
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(stored_name = %stored_name, "file stored");
        Ok(stored_name)
    }

    async fn open(&self, stored_name: &str) -> Result<FileHandle, FileStoreError> {
        let path = self.path_for(stored_name)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileStoreError::NotFound)
            }
            Err(err) => return Err(err.into()),
        };
        let size = file.metadata().await.ok().map(|meta| meta.len());
        Ok(FileHandle::new(stored_name, size, file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("pollchat-store-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn store_then_open() {
        let store = LocalFileStore::new(temp_root());
        let name = store.store("report.pdf", b"pdf-bytes".to_vec()).await.unwrap();
        assert!(name.ends_with("_report.pdf"));

        let mut handle = store.open(&name).await.unwrap();
        let mut contents = Vec::new();
        handle.reader.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"pdf-bytes");
        assert_eq!(handle.size, Some(9));

        let _ = tokio::fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let store = LocalFileStore::new(temp_root());
        assert!(matches!(
            store.open("nope.txt").await,
            Err(FileStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let store = LocalFileStore::new(temp_root());
        for name in ["../etc/passwd", "a/b", "a\\b", ""] {
            assert!(matches!(
                store.open(name).await,
                Err(FileStoreError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn client_directories_are_stripped() {
        assert_eq!(sanitize_original_name("../../evil.sh"), "evil.sh");
        assert_eq!(sanitize_original_name("C:\\docs\\a.txt"), "a.txt");
        assert_eq!(sanitize_original_name("dir/"), "upload");
    }
}
