//! HTTP client for the fiction.live chunk API.
//!
//! Requests are paced: a shared timestamp enforces a minimum gap between
//! calls so a long story does not hammer the site. The client sits behind
//! [`ChunkSource`] so the assembly pipeline can be driven from canned data
//! in tests.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::model::StoryMetadata;
use crate::api::urls::{self, StoryRef};
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("questbind/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can produce story metadata and chunk ranges.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Metadata for one story.
    async fn story_metadata(&self, story: &StoryRef) -> Result<StoryMetadata>;

    /// Raw chunks with timestamps in `[start, end]`.
    async fn chapter_chunks(&self, story_id: &str, start: i64, end: i64) -> Result<Vec<Value>>;

    /// Raw chunks of one route chapter.
    async fn route_chunks(&self, route_id: &str) -> Result<Vec<Value>>;
}

/// Paced `reqwest` client against a fiction.live-compatible API root.
#[derive(Debug)]
pub struct FictionLiveClient {
    http: reqwest::Client,
    base_url: String,
    request_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl FictionLiveClient {
    /// Client against the live site.
    pub fn new(request_delay: Duration) -> Result<Self> {
        Self::with_base_url(urls::SITE, request_delay)
    }

    /// Client against an alternate API root. Tests point this at a mock
    /// server.
    pub fn with_base_url(base_url: impl Into<String>, request_delay: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            request_delay,
            last_request: Mutex::new(None),
        })
    }

    /// Waits out the remainder of the configured gap since the last request.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_text(&self, url: &str) -> Result<(reqwest::StatusCode, String)> {
        self.pace().await;
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// Fetches a chunk array, treating a null or empty body as no chunks.
    async fn fetch_chunks(&self, url: &str) -> Result<Vec<Value>> {
        let (status, body) = self.fetch_text(url).await?;
        if !status.is_success() {
            return Err(Error::api(status.as_u16(), body.trim()));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let chunks: Option<Vec<Value>> = serde_json::from_str(&body)?;
        Ok(chunks.unwrap_or_default())
    }
}

#[async_trait]
impl ChunkSource for FictionLiveClient {
    async fn story_metadata(&self, story: &StoryRef) -> Result<StoryMetadata> {
        let url = urls::metadata_url(&self.base_url, story.id());
        let (status, body) = self.fetch_text(&url).await?;
        if status == reqwest::StatusCode::NOT_FOUND || is_missing_story_body(&body) {
            return Err(Error::StoryNotFound {
                url: story.canonical_url(),
            });
        }
        if !status.is_success() {
            return Err(Error::api(status.as_u16(), body.trim()));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn chapter_chunks(&self, story_id: &str, start: i64, end: i64) -> Result<Vec<Value>> {
        let url = urls::chapter_range_url(&self.base_url, story_id, start, end);
        self.fetch_chunks(&url).await
    }

    async fn route_chunks(&self, route_id: &str) -> Result<Vec<Value>> {
        let url = urls::route_chapters_url(&self.base_url, route_id);
        self.fetch_chunks(&url).await
    }
}

/// The node endpoint answers unknown ids with an empty body, a literal
/// `null`, or an HTML "Cannot GET" page rather than a clean status.
fn is_missing_story_body(body: &str) -> bool {
    let trimmed = body.trim();
    trimmed.is_empty() || trimmed == "null" || trimmed.contains("Cannot GET")
}
