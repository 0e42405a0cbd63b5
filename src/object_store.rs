use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::ObjectStoreConfig;
use crate::errors::ServiceError;

/// Blob storage contract: opaque keys in, etags out.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores the blob under `key` and returns its etag.
    async fn put(&self, key: &str, data: Bytes) -> Result<String, ServiceError>;

    /// Fetches the blob stored under `key`.
    async fn get(&self, key: &str) -> Result<Bytes, ServiceError>;

    /// Removes the blob stored under `key`. Removing an absent key is not
    /// an error.
    async fn delete(&self, key: &str) -> Result<(), ServiceError>;
}

fn content_etag(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Process-wide in-memory store. Default backend and the test double.
#[derive(Default)]
pub struct InMemoryObjectStore {
    blobs: DashMap<String, Bytes>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<String, ServiceError> {
        let etag = content_etag(&data);
        self.blobs.insert(key.to_string(), data);
        debug!(key, etag = %etag, "blob stored");
        Ok(etag)
    }

    async fn get(&self, key: &str) -> Result<Bytes, ServiceError> {
        self.blobs
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("blob {key} not found")))
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// HTTP-backed store speaking a plain PUT/GET key-value protocol.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(client: reqwest::Client, base_url: String, access_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<String, ServiceError> {
        let etag = content_etag(&data);
        let response = self
            .authorize(self.client.put(self.url_for(key)).body(data))
            .send()
            .await
            .map_err(|e| ServiceError::StorageUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::StorageUnavailable(format!(
                "put {key} returned {}",
                response.status()
            )));
        }
        Ok(etag)
    }

    async fn get(&self, key: &str) -> Result<Bytes, ServiceError> {
        let response = self
            .authorize(self.client.get(self.url_for(key)))
            .send()
            .await
            .map_err(|e| ServiceError::StorageUnavailable(e.to_string()))?;

        if response.status() == http::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!("blob {key} not found")));
        }
        if !response.status().is_success() {
            return Err(ServiceError::StorageUnavailable(format!(
                "get {key} returned {}",
                response.status()
            )));
        }
        response
            .bytes()
            .await
            .map_err(|e| ServiceError::StorageUnavailable(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        let response = self
            .authorize(self.client.delete(self.url_for(key)))
            .send()
            .await
            .map_err(|e| ServiceError::StorageUnavailable(e.to_string()))?;

        if response.status().is_success() || response.status() == http::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(ServiceError::StorageUnavailable(format!(
            "delete {key} returned {}",
            response.status()
        )))
    }
}

/// Builds the configured store. The in-memory backend is process-wide so
/// request scopes can share it.
pub fn build_object_store(
    cfg: &ObjectStoreConfig,
    client: reqwest::Client,
) -> Result<std::sync::Arc<dyn ObjectStore>, ServiceError> {
    match cfg.backend.as_str() {
        "http" => {
            let base_url = cfg.base_url.clone().ok_or_else(|| {
                ServiceError::ValidationError(
                    "object_store.base_url is required for the http backend".into(),
                )
            })?;
            Ok(std::sync::Arc::new(HttpObjectStore::new(
                client,
                base_url,
                cfg.access_token.clone(),
            )))
        }
        _ => Ok(std::sync::Arc::new(InMemoryObjectStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryObjectStore::new();
        let etag = store.put("a/b/c.pdf", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(etag.len(), 64);
        let data = store.get("a/b/c.pdf").await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_the_blob_and_tolerates_absence() {
        let store = InMemoryObjectStore::new();
        store.put("a/b", Bytes::from_static(b"x")).await.unwrap();
        store.delete("a/b").await.unwrap();
        assert!(store.is_empty());
        store.delete("a/b").await.unwrap();
    }
}
