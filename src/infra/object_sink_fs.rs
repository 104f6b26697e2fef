use crate::app::ports::ObjectSinkPort;
use async_trait::async_trait;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Object sink backed by a local directory; keys map to relative paths under `root`.
pub struct FsObjectSink {
    root: PathBuf,
}

impl FsObjectSink {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, String> {
        let rel = Path::new(key);
        if key.is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(format!("invalid object key '{}'", key));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectSinkPort for FsObjectSink {
    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        fs::write(&path, bytes).map_err(|e| e.to_string())
    }

    async fn exists(&self, key: &str) -> Result<bool, String> {
        Ok(self.path_for(key)?.is_file())
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(path).map(Some).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_overwrites_and_reads_back() {
        let dir = tempdir().unwrap();
        let sink = FsObjectSink::new(dir.path());

        assert!(!sink.exists("a/b/c.csv").await.unwrap());
        sink.upload("a/b/c.csv", b"one".to_vec(), "text/csv").await.unwrap();
        sink.upload("a/b/c.csv", b"two".to_vec(), "text/csv").await.unwrap();

        assert!(sink.exists("a/b/c.csv").await.unwrap());
        assert_eq!(sink.read("a/b/c.csv").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(sink.read("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let sink = FsObjectSink::new(dir.path());
        assert!(sink.upload("../outside", vec![], "text/plain").await.is_err());
        assert!(sink.exists("/etc/passwd").await.is_err());
    }
}
