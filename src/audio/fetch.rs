// Fetching raw clip bytes from a source location
use async_trait::async_trait;

use crate::error::{Result, SoundError};

/// Loads the raw (still encoded) bytes of a clip
#[async_trait]
pub trait ClipFetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>>;
}

/// Default fetcher: `http(s)://` sources over the network, everything else
/// (plain paths and `file://` URLs) from the local filesystem.
#[derive(Clone, Default)]
pub struct SourceFetcher {
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch_http(&self, source: &str) -> Result<Vec<u8>> {
        let response = self.client
            .get(source)
            .send()
            .await
            .map_err(|e| SoundError::fetch(source, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SoundError::fetch(source, format!("HTTP {}", status)));
        }

        let bytes = response.bytes().await.map_err(|e| SoundError::fetch(source, e))?;
        Ok(bytes.to_vec())
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn local_path(source: &str) -> &str {
    source.strip_prefix("file://").unwrap_or(source)
}

#[async_trait]
impl ClipFetcher for SourceFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>> {
        if is_remote(source) {
            return self.fetch_http(source).await;
        }

        tokio::fs::read(local_path(source))
            .await
            .map_err(|e| SoundError::fetch(source, e))
    }
}
