//! Reader post and dice roll rendering.
//!
//! A reader can attach a dice roll to their post; rolls and posts live in
//! separate maps keyed by the same voter id. Rolls render first, each with
//! its author's post when posts are kept, then the posts that had no roll.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::api::model::ReaderPostChunk;

/// Renders a reader-post chunk. The header is always emitted; `include_posts`
/// controls whether post bodies appear below it.
#[must_use]
pub fn render_reader_posts(chunk: &ReaderPostChunk, include_posts: bool) -> String {
    let closed = if chunk.closed.is_some() {
        "Closed"
    } else {
        "Open"
    };
    let post_count = if chunk.votes.is_empty() {
        "be the first to post.".to_string()
    } else {
        format!("{} posts", chunk.votes.len())
    };
    let title = chunk.prompt.as_deref().unwrap_or("Choices");

    let mut output = format!(
        "<h4><span>{title} — <small> Posting {closed} — {post_count}</small></span></h4>\n"
    );

    let mut posts: BTreeMap<&str, &Value> = chunk
        .votes
        .iter()
        .map(|(uid, post)| (uid.as_str(), post))
        .collect();

    for (uid, roll) in &chunk.dice {
        output.push_str("<div class=\"choiceitem\">");
        if let Some(roll_text) = scalar_text(roll) {
            output.push_str(&format!("<div class=\"dice\">{roll_text}</div>\n"));
        }
        // a post with a roll is merged into the roll's item; either way it
        // is spoken for and must not render again below
        if let Some(post) = posts.remove(uid.as_str()) {
            if include_posts {
                if let Some(post_text) = scalar_text(post) {
                    output.push_str(&post_text);
                }
            }
        }
        output.push_str("</div>");
    }

    if include_posts {
        for post in posts.values() {
            if let Some(post_text) = scalar_text(post) {
                output.push_str(&format!("<div class=\"choiceitem\">{post_text}</div>\n"));
            }
        }
    }

    output
}

/// Text form of a post or roll value; `None` for anything empty or zero.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("true".to_string()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}
