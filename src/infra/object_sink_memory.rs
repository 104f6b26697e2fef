use crate::app::ports::ObjectSinkPort;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-memory object sink for development and testing
#[derive(Clone, Default)]
pub struct MemoryObjectSink {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    uploads: Arc<Mutex<Vec<String>>>,
}

impl MemoryObjectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().map(|o| o.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok().and_then(|o| o.get(key).cloned())
    }

    /// Every key uploaded so far, in upload order, repeats included
    pub fn upload_history(&self) -> Vec<String> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ObjectSinkPort for MemoryObjectSink {
    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), String> {
        let mut objects = self.objects.lock().map_err(|e| e.to_string())?;
        objects.insert(key.to_string(), bytes);
        self.uploads
            .lock()
            .map_err(|e| e.to_string())?
            .push(key.to_string());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, String> {
        let objects = self.objects.lock().map_err(|e| e.to_string())?;
        Ok(objects.contains_key(key))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let objects = self.objects.lock().map_err(|e| e.to_string())?;
        Ok(objects.get(key).cloned())
    }
}
