use crate::backoff::{retry, RetryPolicy};
use crate::messages::VideoId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A catalog entry as served by the relay's library endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Video {
    #[serde(rename = "ID")]
    pub id: VideoId,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client for the video list and the server-side discovery scan.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    base_url: Url,
    http: reqwest::Client,
}

impl CatalogClient {
    pub fn new(base_url: Url) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn videos(&self) -> Result<Vec<Video>, CatalogError> {
        self.get_list("videos").await
    }

    /// Trigger a discovery pass on the server and return the refreshed list.
    pub async fn scan(&self) -> Result<Vec<Video>, CatalogError> {
        self.get_list("scan").await
    }

    pub async fn videos_retrying(&self, policy: &RetryPolicy) -> Result<Vec<Video>, CatalogError> {
        retry(policy, || self.videos()).await
    }

    pub async fn scan_retrying(&self, policy: &RetryPolicy) -> Result<Vec<Video>, CatalogError> {
        retry(policy, || self.scan()).await
    }

    /// Where the raw bytes of `id` are served from.
    pub fn video_url(&self, id: VideoId) -> Result<Url, CatalogError> {
        let mut url = self.base_url.join("videos")?;
        url.query_pairs_mut()
            .append_pair("videoID", &id.to_string());
        Ok(url)
    }

    async fn get_list(&self, path: &str) -> Result<Vec<Video>, CatalogError> {
        let url = self.base_url.join(path)?;
        debug!(%url, "fetching catalog");
        let videos = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(videos)
    }
}
