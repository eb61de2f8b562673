//! Story URL validation and API endpoint construction.
//!
//! A story URL looks like `https://fiction.live/stories/<slug>/<id>` where
//! the slug is optional (the site itself accepts a double slash) and the id
//! is a 17-character alphanumeric token. Everything the crate requests is
//! derived from that id.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Public site base, used for canonical links embedded in output.
pub const SITE: &str = "https://fiction.live";

static STORY_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://fiction\.live/stories/([-A-Za-z0-9]+)?/([A-Za-z0-9]{17})(/[-A-Za-z0-9]+/[A-Za-z0-9]+)?")
        .expect("story URL pattern")
});

/// A validated reference to a fiction.live story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRef {
    id: String,
}

impl StoryRef {
    /// Validates a user-supplied URL and extracts the story id.
    pub fn parse(url: &str) -> Result<Self> {
        let captures = STORY_URL
            .captures(url)
            .ok_or_else(|| Error::InvalidStoryUrl(url.to_string()))?;
        Ok(Self {
            id: captures[2].to_string(),
        })
    }

    /// The 17-character story id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Canonical story URL. The slug segment is left empty; the site
    /// redirects to the full form.
    #[must_use]
    pub fn canonical_url(&self) -> String {
        format!("{SITE}/stories//{}", self.id)
    }
}

/// Metadata endpoint for a story id.
#[must_use]
pub fn metadata_url(base: &str, story_id: &str) -> String {
    format!("{base}/api/node/{story_id}")
}

/// Chunk-range endpoint. Both bounds are inclusive millisecond timestamps.
#[must_use]
pub fn chapter_range_url(base: &str, story_id: &str, start: i64, end: i64) -> String {
    format!("{base}/api/anonkun/chapters/{story_id}/{start}/{end}/")
}

/// Chunk endpoint for a route chapter, addressed by route id.
#[must_use]
pub fn route_chapters_url(base: &str, route_id: &str) -> String {
    format!("{base}/api/anonkun/route/{route_id}/chapters")
}
