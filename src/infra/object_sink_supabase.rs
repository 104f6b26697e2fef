use crate::app::ports::ObjectSinkPort;
use async_trait::async_trait;
use reqwest::StatusCode;

/// Object sink backed by Supabase Storage.
///
/// Objects live at `{url}/storage/v1/object/{bucket}/{prefix}/{key}` and are
/// written with upsert semantics, so re-running a day overwrites its outputs.
pub struct SupabaseObjectSink {
    client: reqwest::Client,
    url: String,
    bucket: String,
    service_key: String,
    prefix: Option<String>,
}

impl SupabaseObjectSink {
    pub fn new(
        url: impl Into<String>,
        bucket: impl Into<String>,
        service_key: impl Into<String>,
        prefix: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            bucket: bucket.into(),
            service_key: service_key.into(),
            prefix,
        }
    }

    fn object_url(&self, key: &str) -> String {
        let path = match self.prefix.as_deref().filter(|p| !p.is_empty()) {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        };
        format!(
            "{}/storage/v1/object/{}/{}",
            self.url.trim_end_matches('/'),
            self.bucket,
            path
        )
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", self.service_key.clone())
    }
}

fn is_not_found(status: StatusCode) -> bool {
    // Storage answers 400 with a "not_found" body for missing objects
    status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST
}

#[async_trait]
impl ObjectSinkPort for SupabaseObjectSink {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), String> {
        let resp = self
            .authorized(self.client.post(self.object_url(key)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("Supabase upload of '{}' failed: {} - {}", key, status, body));
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, String> {
        let resp = self
            .authorized(self.client.head(self.object_url(key)))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            s if is_not_found(s) => Ok(false),
            s => Err(format!("Supabase existence check of '{}' failed: {}", key, s)),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let resp = self
            .authorized(self.client.get(self.object_url(key)))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        if is_not_found(status) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(format!("Supabase read of '{}' failed: {}", key, status));
        }
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
        Ok(Some(bytes.to_vec()))
    }
}
