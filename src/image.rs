// Generated image retrieval and the content reference stored in the metadata URI

use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{MintError, Result};
use crate::request::MAX_URI_LENGTH;

#[allow(async_fn_in_trait)]
pub trait ImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MintError::ImageFetch(e.to_string()))?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MintError::ImageFetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(MintError::ImageFetch(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MintError::ImageFetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Metadata URI for a fetched image: the URL with its SHA-256 digest as a
/// fragment, or the bare URL when the fragment would not fit.
pub fn content_reference(url: &str, bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(MintError::ImageFetch(format!("{} returned an empty body", url)));
    }
    let digest = sha256_hex(bytes);
    let reference = format!("{}#sha256={}", url, digest);
    if reference.len() <= MAX_URI_LENGTH {
        debug!("Image {} ({} bytes) digest {}", url, bytes.len(), digest);
        return Ok(reference);
    }
    warn!("Image URL too long for a digest fragment, using bare URL");
    Ok(url.to_string())
}

/// Fetch the image and produce its content reference.
pub async fn resolve<F: ImageFetcher>(fetcher: &F, url: &str) -> Result<String> {
    let bytes = fetcher.fetch(url).await?;
    content_reference(url, &bytes)
}
