//! Wire types for the anonkun JSON API.
//!
//! The API is sparse and almost everything is optional, so fields carry
//! explicit `Option`/default handling instead of trusting the payload.
//! Chunk payloads are dispatched on their `nt` (node type) tag into a closed
//! sum type; anything else is surfaced as
//! [`Error::UnrecognizedChunkType`](crate::error::Error::UnrecognizedChunkType).

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Story Metadata
// ============================================================================

/// Story metadata from `/api/node/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryMetadata {
    #[serde(rename = "_id")]
    pub id: String,

    /// Story title.
    #[serde(rename = "t")]
    pub title: Option<String>,

    /// Author list; the first entry is the story owner.
    #[serde(rename = "u", default)]
    pub authors: Vec<Author>,

    /// Creation time in epoch milliseconds. Chapter partitioning starts here.
    #[serde(rename = "ct")]
    pub created: i64,

    /// First publication time in epoch milliseconds.
    #[serde(rename = "rt")]
    pub published: Option<i64>,

    /// Timestamp of the most recent chunk, when the story has any.
    #[serde(rename = "cht")]
    pub latest_chunk: Option<i64>,

    #[serde(rename = "ta", default)]
    pub tags: Vec<String>,

    #[serde(rename = "spoilerTags", default)]
    pub spoiler_tags: Vec<String>,

    #[serde(rename = "contentRating")]
    pub content_rating: Option<String>,

    #[serde(rename = "storyStatus")]
    pub story_status: Option<String>,

    /// Site-reported word count.
    #[serde(rename = "w")]
    pub word_count: Option<i64>,

    /// Short blurb shown in listings.
    #[serde(rename = "b")]
    pub synopsis: Option<String>,

    /// Long description shown on the story page.
    #[serde(rename = "d")]
    pub description: Option<String>,

    /// Chapter bookmarks in story order.
    #[serde(rename = "bm", default)]
    pub bookmarks: Vec<Bookmark>,

    /// Route chapters, for stories that branch. Explicitly null for many
    /// stories, so this stays double-optional on the wire.
    #[serde(rename = "route_metadata", default)]
    pub route_metadata: Option<Vec<RouteMeta>>,

    /// Achievement definitions, nested one level down in the payload.
    /// Kept raw because the envelope shape varies between stories.
    #[serde(default)]
    pub achievements: Option<Value>,
}

impl StoryMetadata {
    /// Routes declared by the story, empty when the field is absent or null.
    #[must_use]
    pub fn routes(&self) -> &[RouteMeta] {
        self.route_metadata.as_deref().unwrap_or(&[])
    }

    /// Display name of the story owner.
    #[must_use]
    pub fn author_name(&self) -> &str {
        self.authors
            .first()
            .and_then(|a| a.name.as_deref())
            .unwrap_or("Anonymous")
    }

    /// Display title.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }

    /// Achievement definitions keyed by normalized id. Stories without the
    /// envelope, or with a malformed one, get an empty table.
    #[must_use]
    pub fn achievement_table(&self) -> AchievementTable {
        self.achievements
            .as_ref()
            .and_then(|v| v.get("achievements"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Tags with spoiler tags filtered out.
    #[must_use]
    pub fn visible_tags(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| !self.spoiler_tags.contains(t))
            .map(String::as_str)
            .collect()
    }
}

/// One entry of the story's author list.
#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    #[serde(rename = "n")]
    pub name: Option<String>,
}

/// A chapter bookmark. Titles starting with `#special` mark appendices.
#[derive(Debug, Clone, Deserialize)]
pub struct Bookmark {
    pub title: String,
    /// Timestamp of the first chunk of this chapter, epoch milliseconds.
    #[serde(rename = "ct")]
    pub started: i64,
}

impl Bookmark {
    /// Appendix bookmarks are flagged in-band through their title.
    #[must_use]
    pub fn is_appendix(&self) -> bool {
        self.title.starts_with("#special")
    }
}

/// Route chapter metadata for branching stories.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteMeta {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "t")]
    pub title: Option<String>,
}

/// Achievement definitions keyed by normalized achievement id.
pub type AchievementTable = HashMap<String, AchievementDef>;

/// A single achievement definition from story metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AchievementDef {
    #[serde(rename = "t")]
    pub title: Option<String>,
    #[serde(rename = "d")]
    pub description: Option<String>,
}

// ============================================================================
// Chunks
// ============================================================================

/// A story chunk, dispatched on the wire `nt` tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "nt")]
pub enum Chunk {
    /// Narrative body text.
    #[serde(rename = "chapter")]
    Chapter(ChapterChunk),
    /// A vote with selectable options.
    #[serde(rename = "choice")]
    Choice(ChoiceChunk),
    /// Reader write-ins and dice rolls.
    #[serde(rename = "readerPost")]
    ReaderPost(ReaderPostChunk),
}

/// Narrative chunk. The body is HTML as entered in the site editor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChapterChunk {
    #[serde(rename = "b")]
    pub body: Option<String>,
}

/// Vote chunk. Ballots are raw JSON values: the wire mixes single indices,
/// index lists, and occasional garbage, and the tally is expected to cope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceChunk {
    /// Question text shown above the vote table.
    #[serde(rename = "b")]
    pub question: Option<String>,

    #[serde(default)]
    pub choices: Vec<String>,

    /// All ballots, keyed by voter id. Ordered map so output is stable.
    #[serde(default)]
    pub votes: BTreeMap<String, Value>,

    /// Ballots from verified users only.
    #[serde(rename = "userVotes", default)]
    pub verified_votes: BTreeMap<String, Value>,

    /// False for single-select votes; ballots are then bare indices.
    pub multiple: Option<bool>,

    /// Choice index (as a string) to route id, for options that open routes.
    #[serde(default)]
    pub routes: HashMap<String, String>,

    /// Indices of choices the author crossed out.
    #[serde(rename = "xOut", default)]
    pub crossed_out: Vec<Value>,

    /// Censoring reasons keyed by choice index string.
    #[serde(rename = "xOutReasons", default)]
    pub crossed_out_reasons: HashMap<String, Value>,

    /// Present once voting has been closed.
    #[serde(default, deserialize_with = "present_flag")]
    pub closed: Option<Value>,
}

impl ChoiceChunk {
    /// Crossed-out choice indices. Entries arrive as numbers or number
    /// strings; anything else is ignored.
    #[must_use]
    pub fn crossed_out_indices(&self) -> HashSet<usize> {
        self.crossed_out
            .iter()
            .filter_map(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .filter(|i| *i >= 0)
            .map(|i| i as usize)
            .collect()
    }
}

/// Reader-post chunk. Posts live in `votes`, rolls in `dice`, matched by
/// voter id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReaderPostChunk {
    #[serde(rename = "b")]
    pub prompt: Option<String>,

    #[serde(default)]
    pub votes: BTreeMap<String, Value>,

    #[serde(default)]
    pub dice: BTreeMap<String, Value>,

    #[serde(default, deserialize_with = "present_flag")]
    pub closed: Option<Value>,
}

/// The `closed` flags carry meaning by presence alone and are a literal
/// `null` on plenty of stories; plain `Option` would fold that null into
/// "absent". Any present value, `null` included, lands as `Some`.
fn present_flag<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Decodes one chunk, rejecting node types outside the closed set.
///
/// A known `nt` with an otherwise malformed payload is a JSON error; a
/// missing or unknown `nt` is an [`Error::UnrecognizedChunkType`] carrying
/// the raw chunk for the report.
pub fn chunk_from_value(value: &Value) -> Result<Chunk> {
    match value.get("nt").and_then(Value::as_str) {
        Some("chapter" | "choice" | "readerPost") => {
            serde_json::from_value(value.clone()).map_err(Error::from)
        }
        _ => Err(Error::unrecognized_chunk(value)),
    }
}
