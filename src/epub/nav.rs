//! EPUB 3 navigation document.

use quick_xml::escape::escape;

use crate::api::model::StoryMetadata;
use crate::book::assemble::BookSection;

/// Renders `EPUB/nav.xhtml`: the title page first, then every kept section
/// in reading order.
#[must_use]
pub fn render_nav(story: &StoryMetadata, sections: &[BookSection]) -> String {
    let mut entries = String::from("      <li><a href=\"title.xhtml\">Title Page</a></li>\n");
    for section in sections {
        entries.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            section.file_name,
            escape(&section.title)
        ));
    }

    let title = escape(story.display_title());
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en" xml:lang="en">
<head>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc" role="doc-toc">
    <h2>{title}</h2>
    <ol>
{entries}    </ol>
  </nav>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::assemble::SectionKind;
    use serde_json::json;

    #[test]
    fn test_nav_lists_title_page_then_sections() {
        let story: StoryMetadata =
            serde_json::from_value(json!({"_id": "x", "ct": 1, "t": "Cats & Dogs"})).unwrap();
        let sections = vec![
            BookSection {
                kind: SectionKind::Chapter,
                title: "Home".to_string(),
                file_name: "chap_1.xhtml".to_string(),
                body: String::new(),
            },
            BookSection {
                kind: SectionKind::Route,
                title: "Route: B <loop>".to_string(),
                file_name: "route_1.xhtml".to_string(),
                body: String::new(),
            },
        ];
        let nav = render_nav(&story, &sections);
        assert!(nav.contains("<title>Cats &amp; Dogs</title>"));
        assert!(nav.contains(r#"epub:type="toc""#));
        let title_entry = nav.find(r#"<a href="title.xhtml">Title Page</a>"#).unwrap();
        let chapter_entry = nav.find(r#"<a href="chap_1.xhtml">Home</a>"#).unwrap();
        let route_entry = nav
            .find(r#"<a href="route_1.xhtml">Route: B &lt;loop&gt;</a>"#)
            .unwrap();
        assert!(title_entry < chapter_entry && chapter_entry < route_entry);
    }
}
