//! Turns story chunks into XHTML fragments.

pub mod achievements;
pub mod markup;
pub mod posts;
pub mod votes;

pub use votes::WinnerPolicy;

use crate::api::model::{AchievementTable, ChapterChunk, Chunk};
use markup::{Element, Node};

/// User-facing rendering knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Keep reader post bodies, not just their dice rolls.
    pub include_reader_posts: bool,
    pub winner_policy: WinnerPolicy,
}

/// Per-story rendering state: the achievement table plus options.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub achievements: AchievementTable,
    pub options: RenderOptions,
}

impl RenderContext {
    #[must_use]
    pub fn new(achievements: AchievementTable, options: RenderOptions) -> Self {
        Self {
            achievements,
            options,
        }
    }
}

/// Renders one chunk to an XHTML fragment.
#[must_use]
pub fn render_chunk(chunk: &Chunk, ctx: &RenderContext) -> String {
    match chunk {
        Chunk::Chapter(chapter) => render_chapter(chapter, ctx),
        Chunk::Choice(choice) => votes::render_choice(choice, ctx.options.winner_policy),
        Chunk::ReaderPost(post) => {
            posts::render_reader_posts(post, ctx.options.include_reader_posts)
        }
    }
}

/// Narrative chunk: repair the markup, restyle spoilers, annotate
/// achievements.
fn render_chapter(chunk: &ChapterChunk, ctx: &RenderContext) -> String {
    let mut nodes = markup::parse_fragment(chunk.body.as_deref().unwrap_or(""));
    apply_spoiler_legends(&mut nodes);
    achievements::annotate_achievements(&mut nodes, &ctx.achievements);
    markup::to_xhtml(&nodes)
}

/// Spoiler links toggle with a click on the site. A book has no script, so
/// they become fieldsets labeled with a legend instead.
fn apply_spoiler_legends(nodes: &mut [Node]) {
    markup::for_each_element_mut(nodes, &mut |el| {
        if el.name == "a" && el.has_class("tydai-spoiler") {
            el.name = "fieldset".to_string();
            el.children.insert(
                0,
                Node::Element(Element {
                    name: "legend".to_string(),
                    attrs: Vec::new(),
                    children: vec![Node::text("Spoiler")],
                }),
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::model::chunk_from_value;
    use serde_json::json;

    #[test]
    fn test_spoiler_links_become_fieldsets() {
        let chunk = chunk_from_value(&json!({
            "nt": "chapter",
            "b": r#"<p>Safe.</p><a class="tydai-spoiler">the twist</a>"#
        }))
        .unwrap();
        let html = render_chunk(&chunk, &RenderContext::default());
        assert_eq!(
            html,
            "<p>Safe.</p><fieldset class=\"tydai-spoiler\"><legend>Spoiler</legend>the twist</fieldset>"
        );
    }

    #[test]
    fn test_chapter_achievement_annotation() {
        let mut ctx = RenderContext::default();
        ctx.achievements.insert(
            "won".to_string(),
            crate::api::model::AchievementDef {
                title: Some("Won".to_string()),
                description: None,
            },
        );
        let chunk = chunk_from_value(&json!({
            "nt": "chapter",
            "b": r#"<a class="tydai-achievement" data-id="won">victory</a>"#
        }))
        .unwrap();
        let html = render_chunk(&chunk, &ctx);
        assert!(html.contains("&#x26A1;<u>victory</u>"));
        assert!(html.contains("Achievement obtained!"));
    }

    #[test]
    fn test_missing_body_renders_empty() {
        let chunk = chunk_from_value(&json!({"nt": "chapter"})).unwrap();
        assert_eq!(render_chunk(&chunk, &RenderContext::default()), "");
    }

    #[test]
    fn test_dispatch_covers_every_chunk_type() {
        let ctx = RenderContext::default();
        let choice = chunk_from_value(&json!({"nt": "choice", "choices": ["a"], "votes": {}}))
            .unwrap();
        assert!(render_chunk(&choice, &ctx).contains("voteblock"));

        let post = chunk_from_value(&json!({"nt": "readerPost", "votes": {}, "dice": {}}))
            .unwrap();
        assert!(render_chunk(&post, &ctx).contains("Posting Open"));
    }
}
