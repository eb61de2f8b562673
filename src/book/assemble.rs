//! Fetches planned sections and renders them into content documents.

use serde_json::Value;
use tracing::debug;

use crate::api::client::ChunkSource;
use crate::api::model::{chunk_from_value, StoryMetadata};
use crate::book::partition::BookMap;
use crate::error::Result;
use crate::render::{markup, render_chunk, RenderContext};

/// What a section holds; decides file naming and bookmark-chunk handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Chapter,
    Appendix,
    Route,
}

impl SectionKind {
    /// File stem for content documents of this kind.
    #[must_use]
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Chapter => "chap",
            Self::Appendix => "appendix",
            Self::Route => "route",
        }
    }

    /// Singular display label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Chapter => "Chapter",
            Self::Appendix => "Appendix",
            Self::Route => "Route",
        }
    }
}

/// A finished content document.
#[derive(Debug, Clone)]
pub struct BookSection {
    pub kind: SectionKind,
    pub title: String,
    /// `chap_3.xhtml` and friends. Numbered by planned position, so a
    /// dropped section leaves a gap rather than renumbering its neighbors.
    pub file_name: String,
    pub body: String,
}

/// Download progress seam; the CLI hangs its progress bars on this.
pub trait ProgressSink: Send + Sync {
    fn begin_group(&self, kind: SectionKind, total: usize);
    fn section_done(&self, kind: SectionKind, position: usize, total: usize);
}

/// Silent sink for library use and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn begin_group(&self, _kind: SectionKind, _total: usize) {}
    fn section_done(&self, _kind: SectionKind, _position: usize, _total: usize) {}
}

/// Renders one fetched chunk list into a section body.
///
/// Returns `Ok(None)` when the section has nothing visible; such sections
/// stay out of the book and its tables of contents.
pub fn render_section(
    chunks: &[Value],
    kind: SectionKind,
    ctx: &RenderContext,
) -> Result<Option<String>> {
    if chunks.is_empty() {
        return Ok(None);
    }

    let mut text = String::new();
    for raw in chunks {
        // bookmark markers ride along inside chapter ranges; an appendix IS
        // its marker chunk, so there they render
        if kind != SectionKind::Appendix && is_special_marker(raw) {
            continue;
        }
        let chunk = chunk_from_value(raw)?;
        text.push_str("<div>");
        text.push_str(&render_chunk(&chunk, ctx));
        text.push_str("</div>\n");
    }

    let mut nodes = markup::strip_empty_tags(markup::parse_fragment(&text));
    if markup::is_effectively_empty(&nodes) {
        return Ok(None);
    }
    markup::rewrite_image_urls(&mut nodes);
    Ok(Some(markup::to_xhtml(&nodes)))
}

fn is_special_marker(raw: &Value) -> bool {
    raw.get("t")
        .and_then(Value::as_str)
        .is_some_and(|t| t.starts_with("#special"))
}

/// Downloads every planned section of a story, keeping the non-empty ones
/// in plan order: chapters, then appendices, then routes.
pub async fn download_sections<S>(
    source: &S,
    story: &StoryMetadata,
    map: &BookMap,
    ctx: &RenderContext,
    progress: &dyn ProgressSink,
) -> Result<Vec<BookSection>>
where
    S: ChunkSource + ?Sized,
{
    let mut sections = Vec::new();

    progress.begin_group(SectionKind::Chapter, map.chapters.len());
    for (index, section) in map.chapters.iter().enumerate() {
        let chunks = source
            .chapter_chunks(&story.id, section.start, section.end)
            .await?;
        push_rendered(
            &mut sections,
            SectionKind::Chapter,
            index,
            &section.title,
            &chunks,
            ctx,
        )?;
        progress.section_done(SectionKind::Chapter, index + 1, map.chapters.len());
    }

    if !map.appendices.is_empty() {
        progress.begin_group(SectionKind::Appendix, map.appendices.len());
        for (index, section) in map.appendices.iter().enumerate() {
            let chunks = source
                .chapter_chunks(&story.id, section.start, section.end)
                .await?;
            push_rendered(
                &mut sections,
                SectionKind::Appendix,
                index,
                &section.title,
                &chunks,
                ctx,
            )?;
            progress.section_done(SectionKind::Appendix, index + 1, map.appendices.len());
        }
    }

    if !map.routes.is_empty() {
        progress.begin_group(SectionKind::Route, map.routes.len());
        for (index, route) in map.routes.iter().enumerate() {
            let chunks = source.route_chunks(&route.route_id).await?;
            push_rendered(
                &mut sections,
                SectionKind::Route,
                index,
                &route.title,
                &chunks,
                ctx,
            )?;
            progress.section_done(SectionKind::Route, index + 1, map.routes.len());
        }
    }

    Ok(sections)
}

fn push_rendered(
    sections: &mut Vec<BookSection>,
    kind: SectionKind,
    planned_index: usize,
    title: &str,
    chunks: &[Value],
    ctx: &RenderContext,
) -> Result<()> {
    match render_section(chunks, kind, ctx)? {
        Some(body) => sections.push(BookSection {
            kind,
            title: title.to_string(),
            file_name: format!("{}_{}.xhtml", kind.file_stem(), planned_index + 1),
            body,
        }),
        None => debug!(title, "empty section dropped"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::urls::StoryRef;
    use crate::book::partition::partition_story;
    use crate::error::Error;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    fn ctx() -> RenderContext {
        RenderContext::default()
    }

    #[test]
    fn test_empty_chunk_list_is_dropped() {
        assert_eq!(render_section(&[], SectionKind::Chapter, &ctx()).unwrap(), None);
    }

    #[test]
    fn test_chunks_are_wrapped_in_divs() {
        let chunks = vec![
            json!({"nt": "chapter", "b": "<p>one</p>"}),
            json!({"nt": "chapter", "b": "<p>two</p>"}),
        ];
        let body = render_section(&chunks, SectionKind::Chapter, &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(body, "<div><p>one</p></div>\n<div><p>two</p></div>\n");
    }

    #[test]
    fn test_unknown_chunk_type_fails_the_section() {
        let chunks = vec![json!({"nt": "poll", "b": "?"})];
        let err = render_section(&chunks, SectionKind::Chapter, &ctx()).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedChunkType { .. }));
    }

    #[test]
    fn test_special_marker_skipped_in_chapters() {
        // the marker has an unrecognized node type, so reaching the decoder
        // would fail; skipping must happen first
        let chunks = vec![
            json!({"nt": "bookmark", "t": "#special Map"}),
            json!({"nt": "chapter", "b": "<p>story</p>"}),
        ];
        let body = render_section(&chunks, SectionKind::Chapter, &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(body, "<div><p>story</p></div>\n");
    }

    #[test]
    fn test_special_marker_renders_in_appendix() {
        let chunks = vec![json!({"nt": "chapter", "t": "#special Map", "b": "<p>the map</p>"})];
        let body = render_section(&chunks, SectionKind::Appendix, &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(body, "<div><p>the map</p></div>\n");
    }

    #[test]
    fn test_whitespace_only_section_is_dropped() {
        let chunks = vec![json!({"nt": "chapter", "b": "  \n "})];
        assert_eq!(
            render_section(&chunks, SectionKind::Chapter, &ctx()).unwrap(),
            None
        );
    }

    #[test]
    fn test_section_images_move_to_current_cdn() {
        let chunks = vec![json!({
            "nt": "chapter",
            "b": "<img src=\"https://cdn3.fiction.live/a.png\">"
        })];
        let body = render_section(&chunks, SectionKind::Chapter, &ctx())
            .unwrap()
            .unwrap();
        assert!(body.contains("https://cdn6.fiction.live/file/fictionlive/a.png"));
    }

    struct CannedSource {
        ranges: HashMap<(i64, i64), Vec<Value>>,
        routes: HashMap<String, Vec<Value>>,
    }

    #[async_trait]
    impl ChunkSource for CannedSource {
        async fn story_metadata(&self, _story: &StoryRef) -> Result<StoryMetadata> {
            unreachable!("metadata is not fetched through this stub")
        }

        async fn chapter_chunks(
            &self,
            _story_id: &str,
            start: i64,
            end: i64,
        ) -> Result<Vec<Value>> {
            Ok(self.ranges.get(&(start, end)).cloned().unwrap_or_default())
        }

        async fn route_chunks(&self, route_id: &str) -> Result<Vec<Value>> {
            Ok(self.routes.get(route_id).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_dropped_sections_leave_numbering_gaps() {
        let story: StoryMetadata = serde_json::from_value(json!({
            "_id": "story",
            "ct": 1000,
            "cht": 9000,
            "bm": [
                {"title": "Empty", "ct": 2000},
                {"title": "Finale", "ct": 4000}
            ],
            "route_metadata": [{"_id": "r1", "t": "Loop"}]
        }))
        .unwrap();
        let map = partition_story(&story);

        let mut ranges = HashMap::new();
        ranges.insert(
            (1000, 1999),
            vec![json!({"nt": "chapter", "b": "<p>home</p>"})],
        );
        ranges.insert((2000, 3999), Vec::new());
        ranges.insert(
            (4000, 9001),
            vec![json!({"nt": "chapter", "b": "<p>end</p>"})],
        );
        let mut routes = HashMap::new();
        routes.insert(
            "r1".to_string(),
            vec![json!({"nt": "chapter", "b": "<p>loop</p>"})],
        );
        let source = CannedSource { ranges, routes };

        let sections = download_sections(&source, &story, &map, &ctx(), &NoopProgress)
            .await
            .unwrap();
        let names: Vec<&str> = sections.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["chap_1.xhtml", "chap_3.xhtml", "route_1.xhtml"]);
        assert_eq!(sections[0].title, "Home");
        assert_eq!(sections[1].title, "Finale");
        assert_eq!(sections[2].kind, SectionKind::Route);
    }
}
