//! OPF package document and NCX table of contents.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::api::model::StoryMetadata;
use crate::api::urls;
use crate::book::assemble::BookSection;
use crate::error::Result;

/// The book's unique identifier: the story URL, tagged as such.
#[must_use]
pub fn story_identifier(story: &StoryMetadata) -> String {
    format!("url:{}/stories//{}", urls::SITE, story.id)
}

/// DC description: synopsis and long description folded into one field.
#[must_use]
pub fn story_description(story: &StoryMetadata) -> String {
    match (story.synopsis.as_deref(), story.description.as_deref()) {
        (Some(b), Some(d)) if !b.is_empty() && !d.is_empty() => {
            format!("{}\n{}", b.trim(), d.trim())
        }
        (Some(b), d) if !b.is_empty() => format!("{}{}", b.trim(), d.unwrap_or("").trim()),
        (b, Some(d)) if !d.is_empty() => format!("{}{}", b.unwrap_or("").trim(), d.trim()),
        _ => "Description not found.".to_string(),
    }
}

fn iso_date(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

fn text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> Result<()> {
    let mut start = BytesStart::new(name);
    for (key, value) in attrs {
        start.push_attribute((*key, *value));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn empty_element(writer: &mut Writer<Vec<u8>>, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut start = BytesStart::new(name);
    for (key, value) in attrs {
        start.push_attribute((*key, *value));
    }
    writer.write_event(Event::Empty(start))?;
    Ok(())
}

fn open(writer: &mut Writer<Vec<u8>>, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut start = BytesStart::new(name);
    for (key, value) in attrs {
        start.push_attribute((*key, *value));
    }
    writer.write_event(Event::Start(start))?;
    Ok(())
}

fn close(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn into_string(writer: Writer<Vec<u8>>) -> String {
    String::from_utf8_lossy(&writer.into_inner()).into_owned()
}

/// Renders `EPUB/content.opf`.
pub fn render_opf(
    story: &StoryMetadata,
    sections: &[BookSection],
    include_spoiler_tags: bool,
    packaged_at: DateTime<Utc>,
) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    open(
        &mut writer,
        "package",
        &[
            ("xmlns", "http://www.idpf.org/2007/opf"),
            ("unique-identifier", "id"),
            ("version", "3.0"),
        ],
    )?;

    open(
        &mut writer,
        "metadata",
        &[("xmlns:dc", "http://purl.org/dc/elements/1.1/")],
    )?;
    text_element(
        &mut writer,
        "dc:identifier",
        &[("id", "id")],
        &story_identifier(story),
    )?;
    text_element(&mut writer, "dc:title", &[], story.display_title())?;
    text_element(&mut writer, "dc:language", &[], "en")?;
    text_element(&mut writer, "dc:creator", &[("id", "creator")], story.author_name())?;
    if let Some(date) = story.published.and_then(iso_date) {
        text_element(&mut writer, "dc:date", &[], &date)?;
    }
    text_element(&mut writer, "dc:description", &[], &story_description(story))?;
    text_element(&mut writer, "dc:publisher", &[], "fiction.live")?;
    text_element(&mut writer, "dc:subject", &[], "Web Scraped")?;
    for tag in story.visible_tags() {
        text_element(&mut writer, "dc:subject", &[], tag)?;
    }
    if include_spoiler_tags {
        for tag in &story.spoiler_tags {
            text_element(&mut writer, "dc:subject", &[], tag)?;
        }
    }
    let modified = packaged_at.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    text_element(
        &mut writer,
        "meta",
        &[("property", "dcterms:modified")],
        &modified,
    )?;
    close(&mut writer, "metadata")?;

    open(&mut writer, "manifest", &[])?;
    empty_element(
        &mut writer,
        "item",
        &[
            ("href", "title.xhtml"),
            ("id", "title"),
            ("media-type", "application/xhtml+xml"),
        ],
    )?;
    empty_element(
        &mut writer,
        "item",
        &[
            ("href", "nav.xhtml"),
            ("id", "nav"),
            ("media-type", "application/xhtml+xml"),
            ("properties", "nav"),
        ],
    )?;
    empty_element(
        &mut writer,
        "item",
        &[
            ("href", "stylesheet.css"),
            ("id", "style"),
            ("media-type", "text/css"),
        ],
    )?;
    for section in sections {
        empty_element(
            &mut writer,
            "item",
            &[
                ("href", &section.file_name),
                ("id", section_id(section)),
                ("media-type", "application/xhtml+xml"),
            ],
        )?;
    }
    empty_element(
        &mut writer,
        "item",
        &[
            ("href", "toc.ncx"),
            ("id", "ncx"),
            ("media-type", "application/x-dtbncx+xml"),
        ],
    )?;
    close(&mut writer, "manifest")?;

    open(&mut writer, "spine", &[("toc", "ncx")])?;
    empty_element(&mut writer, "itemref", &[("idref", "title")])?;
    empty_element(&mut writer, "itemref", &[("idref", "nav")])?;
    for section in sections {
        empty_element(&mut writer, "itemref", &[("idref", section_id(section))])?;
    }
    close(&mut writer, "spine")?;

    close(&mut writer, "package")?;
    Ok(into_string(writer))
}

fn section_id(section: &BookSection) -> &str {
    section
        .file_name
        .strip_suffix(".xhtml")
        .unwrap_or(&section.file_name)
}

/// Renders `EPUB/toc.ncx`, the EPUB2-compatible table of contents.
pub fn render_ncx(story: &StoryMetadata, sections: &[BookSection]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(
        "ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\"",
    )))?;

    open(
        &mut writer,
        "ncx",
        &[
            ("xmlns", "http://www.daisy.org/z3986/2005/ncx/"),
            ("version", "2005-1"),
        ],
    )?;

    open(&mut writer, "head", &[])?;
    let uid = story_identifier(story);
    empty_element(&mut writer, "meta", &[("content", uid.as_str()), ("name", "dtb:uid")])?;
    empty_element(&mut writer, "meta", &[("content", "0"), ("name", "dtb:depth")])?;
    empty_element(
        &mut writer,
        "meta",
        &[("content", "0"), ("name", "dtb:totalPageCount")],
    )?;
    empty_element(
        &mut writer,
        "meta",
        &[("content", "0"), ("name", "dtb:maxPageNumber")],
    )?;
    close(&mut writer, "head")?;

    open(&mut writer, "docTitle", &[])?;
    text_element(&mut writer, "text", &[], story.display_title())?;
    close(&mut writer, "docTitle")?;

    open(&mut writer, "navMap", &[])?;
    let mut play_order = 0usize;
    let mut nav_point = |writer: &mut Writer<Vec<u8>>, label: &str, src: &str| -> Result<()> {
        play_order += 1;
        let order = play_order.to_string();
        open(
            writer,
            "navPoint",
            &[
                ("id", format!("navpoint-{play_order}").as_str()),
                ("playOrder", order.as_str()),
            ],
        )?;
        open(writer, "navLabel", &[])?;
        text_element(writer, "text", &[], label)?;
        close(writer, "navLabel")?;
        empty_element(writer, "content", &[("src", src)])?;
        close(writer, "navPoint")?;
        Ok(())
    };
    nav_point(&mut writer, "Title Page", "title.xhtml")?;
    for section in sections {
        nav_point(&mut writer, &section.title, &section.file_name)?;
    }
    close(&mut writer, "navMap")?;

    close(&mut writer, "ncx")?;
    Ok(into_string(writer))
}
