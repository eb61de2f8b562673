//! Error types for story download and EPUB assembly.
//!
//! A single crate-wide error enum keeps the pipeline uniform: network and
//! decode failures abort the story being built, while the caller decides
//! whether to continue with the next one.

use thiserror::Error;

/// Result type alias for questbind operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while downloading or binding a story.
#[derive(Debug, Error)]
pub enum Error {
    /// The metadata endpoint had nothing for this story.
    #[error("Story not found: {url}")]
    StoryNotFound {
        /// Canonical story URL that was requested.
        url: String,
    },

    /// A chunk arrived whose node type has no handler.
    #[error("Unknown chunk type ({chunk}) in fiction.live story")]
    UnrecognizedChunkType {
        /// The offending chunk, reserialized as JSON.
        chunk: String,
    },

    /// The given URL does not look like a fiction.live story.
    #[error("Invalid story URL: {0}")]
    InvalidStoryUrl(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message or body excerpt from the API.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// EPUB container (zip) error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML generation error.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// EPUB structure error (missing or malformed package parts).
    #[error("EPUB error: {0}")]
    Epub(String),
}

impl Error {
    /// Creates an API error from a status code and message.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates an EPUB structure error.
    #[must_use]
    pub fn epub(message: impl Into<String>) -> Self {
        Self::Epub(message.into())
    }

    /// Creates an unrecognized-chunk error carrying the raw chunk JSON.
    #[must_use]
    pub fn unrecognized_chunk(chunk: &serde_json::Value) -> Self {
        Self::UnrecognizedChunkType {
            chunk: chunk.to_string(),
        }
    }

    /// Returns true if this error means the story itself is absent,
    /// as opposed to a transient transport problem.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StoryNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::StoryNotFound {
            url: "https://fiction.live/stories//abc".to_string(),
        };
        assert!(err.to_string().contains("Story not found"));
        assert!(err.to_string().contains("//abc"));

        let err = Error::api(502, "Bad Gateway");
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn test_unrecognized_chunk_carries_payload() {
        let chunk = serde_json::json!({"nt": "poll", "b": "what"});
        let err = Error::unrecognized_chunk(&chunk);
        let text = err.to_string();
        assert!(text.contains("Unknown chunk type"));
        assert!(text.contains("\"poll\""));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::StoryNotFound { url: String::new() }.is_not_found());
        assert!(!Error::InvalidStoryUrl(String::new()).is_not_found());
    }
}
