//! The book's title page: story links, publication facts, tags.

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;

use crate::api::model::StoryMetadata;
use crate::api::urls;
use crate::book::partition::BookMap;
use crate::render::markup;

fn timestamp(millis: Option<i64>) -> String {
    millis
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Renders `EPUB/title.xhtml`.
///
/// Section counts come from the planned [`BookMap`], not from what survived
/// rendering, so the page reflects the story's own table of contents.
#[must_use]
pub fn render_title_page(
    story: &StoryMetadata,
    map: &BookMap,
    include_spoiler_tags: bool,
    packaged_at: DateTime<Utc>,
) -> String {
    let title = escape(story.display_title());
    let author = escape(story.author_name());
    let story_url = format!("{}/stories//{}", urls::SITE, story.id);
    let author_url = format!("{}/user/{}", urls::SITE, story.author_name());

    let mut rows = String::new();
    let mut row = |label: &str, value: &str| {
        rows.push_str("    <b>");
        rows.push_str(label);
        rows.push_str(":</b> ");
        rows.push_str(value);
        rows.push_str("<br />\n");
    };

    row(
        "Status",
        &escape(story.story_status.as_deref().unwrap_or("Unknown")),
    );
    row("Published", &timestamp(story.published));
    row("Updated", &timestamp(story.latest_chunk));
    row(
        "Packaged",
        &packaged_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    row(
        "Rating",
        &escape(story.content_rating.as_deref().unwrap_or("Unknown")),
    );
    if !map.chapters.is_empty() {
        row("Chapters", &map.chapters.len().to_string());
    }
    if !map.appendices.is_empty() {
        row("Appendices", &map.appendices.len().to_string());
    }
    if !map.routes.is_empty() {
        row("Routes", &map.routes.len().to_string());
    }
    row(
        "Words",
        &story
            .word_count
            .map(|w| w.to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
    );
    row("Publisher", "fiction.live");
    // Description and synopsis are site markup, so they get repaired rather
    // than escaped.
    if let Some(d) = story.description.as_deref().filter(|d| !d.is_empty()) {
        row("Description", &markup::normalize(d.trim()));
    }
    if let Some(b) = story.synopsis.as_deref().filter(|b| !b.is_empty()) {
        row("Synopsis", &markup::normalize(b.trim()));
    }
    let tags: Vec<String> = story
        .visible_tags()
        .into_iter()
        .map(|t| escape(t).into_owned())
        .collect();
    row("Tags", &tags.join(", "));
    if include_spoiler_tags && !story.spoiler_tags.is_empty() {
        let spoilers: Vec<String> = story
            .spoiler_tags
            .iter()
            .map(|t| escape(t.as_str()).into_owned())
            .collect();
        row("Spoiler Tags", &spoilers.join(", "));
    }

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <title>{title} by {author}</title>
  <link href="stylesheet.css" type="text/css" rel="stylesheet" />
</head>
<body class="fff_titlepage">
  <h3><a href="{story_url}">{title}</a> by <a class="authorlink" href="{author_url}">{author}</a></h3>
  <div>
{rows}  </div>
</body>
</html>
"#
    )
}
