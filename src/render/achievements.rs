//! Achievement link annotation.
//!
//! Achievements appear in story text as `<a class="tydai-achievement">`
//! links; on the site, clicking one plays an animated popup. In a book the
//! link is restyled as a lightning bolt with underlined text, and each
//! earned achievement gets an announcement block at the end of the chunk.

use tracing::debug;

use crate::api::model::AchievementTable;
use crate::render::markup::{self, Element, Node};

/// Characters removed from achievement ids, hyphen excluded since it stands
/// in for spaces.
const STRIPPED_CHARS: &str = "\"\\,.!?+=/[](){}<>_'@#$%^&*~`;:|";

/// Rewrites achievement links in place and appends one announcement block
/// per earned achievement, in document order.
pub fn annotate_achievements(nodes: &mut Vec<Node>, table: &AchievementTable) {
    let mut achieved: Vec<String> = Vec::new();

    markup::for_each_element_mut(nodes, &mut |el| {
        if el.name != "a" || !el.has_class("tydai-achievement") {
            return;
        }
        let text = markup::plain_text(&el.children);
        el.children = vec![
            Node::raw("&#x26A1;"),
            Node::Element(Element {
                name: "u".into(),
                attrs: Vec::new(),
                children: vec![Node::Text(text)],
            }),
        ];
        if let Some(id) = el.attr("data-id") {
            achieved.push(normalize_id(id));
        }
    });

    if !achieved.is_empty() {
        debug!(ids = ?achieved, "achievements in chunk");
    }

    for id in achieved {
        let block = match table.get(&id) {
            Some(def) => {
                let title = def.title.clone().unwrap_or_else(|| title_case(&id));
                let description = def.description.as_deref().unwrap_or("");
                format!(
                    "<br />\n<fieldset><legend>&#x26A1; Achievement obtained!</legend>\n<h4>{title}</h4>\n{description}</fieldset>\n"
                )
            }
            None => {
                let title = title_case(&id);
                format!(
                    "<br />\n<fieldset><legend>Error: Achievement not found.</legend>Couldn't find '{title}'. Ask the story author to check if the achievment exists."
                )
            }
        };
        nodes.extend(markup::parse_fragment(&block));
    }
}

/// Normalizes an achievement id the way the site does: lowercased, spaces
/// as hyphens, punctuation dropped.
#[must_use]
pub fn normalize_id(raw: &str) -> String {
    raw.to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| !STRIPPED_CHARS.contains(*c))
        .collect()
}

/// Display title recovered from an id, capitalizing after every non-letter.
fn title_case(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut boundary = true;
    for c in id.chars() {
        if c.is_alphabetic() {
            if boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(c);
            boundary = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::model::AchievementDef;
    use crate::render::markup::{parse_fragment, to_xhtml};

    fn table(entries: &[(&str, Option<&str>, Option<&str>)]) -> AchievementTable {
        entries
            .iter()
            .map(|(id, title, description)| {
                (
                    (*id).to_string(),
                    AchievementDef {
                        title: title.map(str::to_string),
                        description: description.map(str::to_string),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_link_rewritten_and_block_appended() {
        let mut nodes = parse_fragment(
            r#"<p>You earn <a class="tydai-achievement" data-id="First Blood">First Blood</a>.</p>"#,
        );
        let table = table(&[("first-blood", Some("First Blood"), Some("<i>You bit someone.</i>"))]);
        annotate_achievements(&mut nodes, &table);
        let html = to_xhtml(&nodes);
        assert!(html.contains(
            r#"<a class="tydai-achievement" data-id="First Blood">&#x26A1;<u>First Blood</u></a>"#
        ));
        assert!(html.ends_with(
            "<br />\n<fieldset><legend>&#x26A1; Achievement obtained!</legend>\n<h4>First Blood</h4>\n<i>You bit someone.</i></fieldset>\n"
        ));
    }

    #[test]
    fn test_unknown_achievement_reports_error() {
        let mut nodes =
            parse_fragment(r#"<a class="tydai-achievement" data-id="ghost walk">x</a>"#);
        annotate_achievements(&mut nodes, &AchievementTable::new());
        let html = to_xhtml(&nodes);
        assert!(html.ends_with(
            "<br />\n<fieldset><legend>Error: Achievement not found.</legend>Couldn't find 'Ghost-Walk'. Ask the story author to check if the achievment exists.</fieldset>"
        ));
    }

    #[test]
    fn test_two_achievements_in_document_order() {
        let mut nodes = parse_fragment(
            r#"<p><a class="tydai-achievement" data-id="one">A</a></p><p><a class="tydai-achievement" data-id="two">B</a></p>"#,
        );
        let table = table(&[
            ("one", Some("Alpha"), None),
            ("two", Some("Beta"), None),
        ]);
        annotate_achievements(&mut nodes, &table);
        let html = to_xhtml(&nodes);
        let alpha = html.find("<h4>Alpha</h4>").unwrap();
        let beta = html.find("<h4>Beta</h4>").unwrap();
        assert!(alpha < beta);
    }

    #[test]
    fn test_link_without_id_is_restyled_only() {
        let mut nodes = parse_fragment(r#"<a class="tydai-achievement">nameless</a>"#);
        annotate_achievements(&mut nodes, &AchievementTable::new());
        let html = to_xhtml(&nodes);
        assert!(html.contains("&#x26A1;<u>nameless</u>"));
        assert!(!html.contains("fieldset"));
    }

    #[test]
    fn test_missing_title_falls_back_to_id() {
        let mut nodes =
            parse_fragment(r#"<a class="tydai-achievement" data-id="iron-will">x</a>"#);
        let table = table(&[("iron-will", None, Some("Held fast."))]);
        annotate_achievements(&mut nodes, &table);
        assert!(to_xhtml(&nodes).contains("<h4>Iron-Will</h4>"));
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("First Blood!"), "first-blood");
        assert_eq!(normalize_id("What?!"), "what");
        assert_eq!(normalize_id("snake_case id"), "snakecase-id");
        assert_eq!(normalize_id("Keep-Hyphens"), "keep-hyphens");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("first-blood"), "First-Blood");
        assert_eq!(title_case("3rd strike"), "3Rd Strike");
        assert_eq!(title_case("ALL CAPS"), "All Caps");
    }
}
