//! EPUB 3 assembly: package metadata, navigation, title page, stylesheet,
//! and the zip container itself.

pub mod fixup;
pub mod nav;
pub mod package;
pub mod title_page;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use quick_xml::escape::escape;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::api::model::StoryMetadata;
use crate::book::assemble::BookSection;
use crate::book::partition::BookMap;
use crate::error::Result;

pub use fixup::{fix_epub, fix_path, find_epubs, FixOutcome};

/// Shared stylesheet for every page in the book.
pub const STYLESHEET: &str = "\
body { font-family: serif; line-height: 1.4; }
.fff_titlepage h3 { margin-bottom: 0.25em; }
h4 span small { font-weight: normal; color: #555; }
table.voteblock { border-collapse: collapse; margin: 0.5em 0; }
table.voteblock td { border: 1px solid #999; padding: 0.15em 0.5em; }
td.votecount { text-align: right; white-space: nowrap; }
.choiceitem { margin: 0.25em 0; }
div.dice { font-family: monospace; color: #444; }
fieldset { border: 1px solid #999; margin: 0.75em 0; padding: 0.5em; }
legend { font-weight: bold; }
img { max-width: 100%; }
";

const MIMETYPE: &str = "application/epub+zip";

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="EPUB/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

fn section_document(title: &str, body: &str) -> String {
    let title = escape(title);
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <title>{title}</title>
  <link href="stylesheet.css" type="text/css" rel="stylesheet" />
</head>
<body>
{body}</body>
</html>
"#
    )
}

/// Writes the finished book to `path`.
///
/// The `mimetype` entry goes first and uncompressed; everything else is
/// deflated. Section documents are written in the order given, which is
/// also their spine order.
pub fn write_book(
    story: &StoryMetadata,
    map: &BookMap,
    sections: &[BookSection],
    include_spoiler_tags: bool,
    path: &Path,
) -> Result<()> {
    let packaged_at = Utc::now();
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default();

    zip.start_file("mimetype", stored)?;
    zip.write_all(MIMETYPE.as_bytes())?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    zip.start_file("EPUB/content.opf", deflated)?;
    zip.write_all(package::render_opf(story, sections, include_spoiler_tags, packaged_at)?.as_bytes())?;

    zip.start_file("EPUB/nav.xhtml", deflated)?;
    zip.write_all(nav::render_nav(story, sections).as_bytes())?;

    zip.start_file("EPUB/toc.ncx", deflated)?;
    zip.write_all(package::render_ncx(story, sections)?.as_bytes())?;

    zip.start_file("EPUB/title.xhtml", deflated)?;
    zip.write_all(
        title_page::render_title_page(story, map, include_spoiler_tags, packaged_at).as_bytes(),
    )?;

    zip.start_file("EPUB/stylesheet.css", deflated)?;
    zip.write_all(STYLESHEET.as_bytes())?;

    for section in sections {
        zip.start_file(format!("EPUB/{}", section.file_name), deflated)?;
        zip.write_all(section_document(&section.title, &section.body).as_bytes())?;
    }

    zip.finish()?;
    info!(path = %path.display(), sections = sections.len(), "EPUB written");
    Ok(())
}

/// Derives a filesystem-safe file name from the story title: spaces become
/// underscores and any other punctuation becomes a dash. The title itself is
/// left alone everywhere inside the book.
#[must_use]
pub fn book_filename(title: &str) -> String {
    let mut name: String = title
        .chars()
        .map(|c| {
            if c == ' ' {
                '_'
            } else if c.is_ascii_punctuation() && c != '_' {
                '-'
            } else {
                c
            }
        })
        .collect();
    if name.is_empty() {
        name.push_str("story");
    }
    name.push_str(".epub");
    name
}

/// Picks the output path for `file_name` under `dir`. Without `overwrite`,
/// an existing file is kept and the new book gets a `_2`, `_3`, ... suffix.
#[must_use]
pub fn unique_path(dir: &Path, file_name: &str, overwrite: bool) -> PathBuf {
    let path = dir.join(file_name);
    if overwrite || !path.exists() {
        return path;
    }
    let stem = file_name.strip_suffix(".epub").unwrap_or(file_name);
    let mut n = 2;
    loop {
        let candidate = dir.join(format!("{stem}_{n}.epub"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_filename_mapping() {
        assert_eq!(book_filename("Broodhive: Queen"), "Broodhive-_Queen.epub");
        assert_eq!(book_filename("plain_title"), "plain_title.epub");
        assert_eq!(book_filename("What? No!"), "What-_No-.epub");
        assert_eq!(book_filename(""), "story.epub");
    }

    #[test]
    fn test_unique_path_suffixes_instead_of_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "tale.epub", false);
        assert_eq!(first, dir.path().join("tale.epub"));
        std::fs::write(&first, b"x").unwrap();

        let second = unique_path(dir.path(), "tale.epub", false);
        assert_eq!(second, dir.path().join("tale_2.epub"));
        std::fs::write(&second, b"x").unwrap();

        let third = unique_path(dir.path(), "tale.epub", false);
        assert_eq!(third, dir.path().join("tale_3.epub"));

        let clobber = unique_path(dir.path(), "tale.epub", true);
        assert_eq!(clobber, dir.path().join("tale.epub"));
    }

    #[test]
    fn test_section_document_escapes_title_only() {
        let doc = section_document("A & B", "<div><p>kept &amp; verbatim</p></div>\n");
        assert!(doc.contains("<title>A &amp; B</title>"));
        assert!(doc.contains("<p>kept &amp; verbatim</p>"));
        assert!(doc.contains(r#"<link href="stylesheet.css" type="text/css" rel="stylesheet" />"#));
    }
}
