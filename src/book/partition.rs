//! Splits a story's timeline into chapter chunk ranges.
//!
//! The API has no chapter endpoint; chapters exist only as bookmarks, each
//! carrying the timestamp of its first chunk. Consecutive bookmark
//! timestamps bound each chapter's chunk range. Bookmarks titled
//! `#special…` are appendices: single-chunk sections pulled out of the main
//! flow.

use crate::api::model::StoryMetadata;

/// Stand-in for the newest chunk timestamp when metadata does not say.
const LATEST_CHUNK_FALLBACK: i64 = 9_999_999_999_999_998;

/// A section backed by an inclusive chunk-range, in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub start: i64,
    pub end: i64,
}

/// A route chapter, fetched by route id rather than time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSection {
    pub title: String,
    pub route_id: String,
}

/// The full plan of a book: main chapters, then appendices, then routes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMap {
    pub chapters: Vec<Section>,
    pub appendices: Vec<Section>,
    pub routes: Vec<RouteSection>,
}

/// Plans the sections of a story.
///
/// With `n` main-text bookmarks this yields `n + 1` chapters: the untitled
/// stretch from story creation to the first bookmark becomes "Home".
/// Chapter ranges tile the timeline with no gaps; the last one runs one
/// past the newest chunk so nothing is cut off.
#[must_use]
pub fn partition_story(story: &StoryMetadata) -> BookMap {
    let (appendix_marks, maintext): (Vec<_>, Vec<_>) =
        story.bookmarks.iter().partition(|b| b.is_appendix());

    let most_recent = story.latest_chunk.unwrap_or(LATEST_CHUNK_FALLBACK);

    let mut bounds = Vec::with_capacity(maintext.len() + 2);
    bounds.push(story.created);
    bounds.extend(maintext.iter().map(|b| b.started));
    bounds.push(most_recent + 2);

    let titles = std::iter::once("Home").chain(maintext.iter().map(|b| b.title.as_str()));
    let chapters = titles
        .zip(bounds.windows(2))
        .map(|(title, pair)| Section {
            title: title.to_string(),
            start: pair[0],
            end: pair[1] - 1,
        })
        .collect();

    let appendices = appendix_marks
        .iter()
        .map(|b| Section {
            // "#special " off the front, "Appendix: " on
            title: format!("Appendix: {}", b.title.chars().skip(9).collect::<String>()),
            start: b.started,
            end: b.started + 1,
        })
        .collect();

    let routes = story
        .routes()
        .iter()
        .map(|r| RouteSection {
            title: format!("Route: {}", r.title.as_deref().unwrap_or("")),
            route_id: r.id.clone(),
        })
        .collect();

    BookMap {
        chapters,
        appendices,
        routes,
    }
}
