use async_trait::async_trait;
use chrono::{DateTime, Utc};

// Ingest-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpGetResult, String>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Durable object sink the pipeline publishes into. Keys are `/`-separated
/// relative paths such as `processed/clickstream/ingest_date=2025-09-13/clickstream.csv`.
#[async_trait]
pub trait ObjectSinkPort: Send + Sync {
    /// Create or overwrite the object at `key`.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), String>;
    async fn exists(&self, key: &str) -> Result<bool, String>;
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, String>;
}

pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
