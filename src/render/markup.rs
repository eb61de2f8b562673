//! Lenient HTML handling for chunk bodies.
//!
//! Story text arrives as editor-generated HTML with the usual damage:
//! unclosed tags, stray close tags, bare `<` and `&` in prose. This module
//! parses such fragments into a small node tree, repairs the structure, and
//! serializes back to XHTML that an EPUB reader will accept.
//!
//! Numeric character references are kept verbatim in the output; AZW3
//! conversion handles them better than raw codepoints.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

// ============================================================================
// Node Tree
// ============================================================================

/// One node of a parsed HTML fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Plain text; escaped on output.
    Text(String),
    /// Already-serialized markup; written through untouched.
    Raw(String),
    Comment(String),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn raw(markup: impl Into<String>) -> Self {
        Self::Raw(markup.into())
    }
}

/// An element with its attributes in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// First value of the named attribute.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// True when `class` lists the given class name.
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|v| v.split_whitespace().any(|c| c == class))
    }
}

/// Elements that never take children and self-close on output.
fn is_void(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

// ============================================================================
// Parsing
// ============================================================================

/// A `<` that does not open markup: not a tag name, close tag, comment or PI.
static BARE_ANGLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([^A-Za-z/!?]|$)").expect("bare angle pattern"));

fn mask_bare_angles(html: &str) -> Cow<'_, str> {
    BARE_ANGLE.replace_all(html, "&lt;$1")
}

/// Parses an HTML fragment, repairing unclosed and misnested tags.
///
/// Close tags with no matching open tag are dropped; a close tag that skips
/// over open elements closes them too; anything still open at the end of
/// input is closed. Tag and attribute names are lowercased.
#[must_use]
pub fn parse_fragment(html: &str) -> Vec<Node> {
    let masked = mask_bare_angles(html);
    let mut reader = Reader::from_str(&masked);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut stack: Vec<Element> = vec![Element::new("#fragment")];

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let element = element_from_start(&start);
                if is_void(&element.name) {
                    push_child(&mut stack, Node::Element(element));
                } else {
                    stack.push(element);
                }
            }
            Ok(Event::Empty(start)) => {
                push_child(&mut stack, Node::Element(element_from_start(&start)));
            }
            Ok(Event::End(end)) => {
                let name = lowercase_name(end.name().as_ref());
                close_element(&mut stack, &name);
            }
            Ok(Event::Text(text)) => {
                let raw = String::from_utf8_lossy(&text.into_inner()).into_owned();
                decode_text_into(&raw, &mut stack);
            }
            Ok(Event::CData(data)) => {
                let raw = String::from_utf8_lossy(&data.into_inner()).into_owned();
                if !raw.is_empty() {
                    push_child(&mut stack, Node::Text(raw));
                }
            }
            Ok(Event::Comment(text)) => {
                let raw = String::from_utf8_lossy(&text.into_inner()).into_owned();
                push_child(&mut stack, Node::Comment(raw));
            }
            Ok(Event::Decl(_) | Event::PI(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) | Err(_) => break,
        }
    }

    while stack.len() > 1 {
        if let Some(open) = stack.pop() {
            push_child(&mut stack, Node::Element(open));
        }
    }
    stack.pop().map(|root| root.children).unwrap_or_default()
}

fn element_from_start(start: &BytesStart<'_>) -> Element {
    let mut element = Element::new(lowercase_name(start.name().as_ref()));
    for attr in start.html_attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = decode_attr(&String::from_utf8_lossy(&attr.value));
        element.attrs.push((key, value));
    }
    element
}

fn lowercase_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_ascii_lowercase()
}

fn push_child(stack: &mut [Element], child: Node) {
    if let Some(open) = stack.last_mut() {
        open.children.push(child);
    }
}

/// Closes the innermost open element with this name, closing anything opened
/// inside it along the way. No match means a stray close tag; it is dropped.
fn close_element(stack: &mut Vec<Element>, name: &str) {
    let Some(pos) = stack.iter().skip(1).rposition(|el| el.name == name) else {
        return;
    };
    let pos = pos + 1;
    while stack.len() > pos {
        if let Some(open) = stack.pop() {
            push_child(stack, Node::Element(open));
        }
    }
}

// ============================================================================
// Character References
// ============================================================================

enum Decoded {
    Named(char),
    Numeric(char),
}

/// Parses one character reference at the start of `rest` (which begins with
/// `&`), returning the decoded character and the byte length consumed.
fn parse_entity(rest: &str) -> Option<(Decoded, usize)> {
    let body = &rest[1..];
    let end = body.find(';')?;
    if end == 0 || end > 32 {
        return None;
    }
    let name = &body[..end];
    let len = end + 2;

    if let Some(digits) = name.strip_prefix('#') {
        let code = if let Some(hex) = digits.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            digits.parse::<u32>().ok()?
        };
        let decoded = char::from_u32(code).filter(|c| *c != '\0')?;
        return Some((Decoded::Numeric(decoded), len));
    }
    named_entity(name).map(|c| (Decoded::Named(c), len))
}

/// The named references that actually show up in story text.
fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "shy" => '\u{ad}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "bull" => '\u{2022}',
        "middot" => '\u{b7}',
        "sect" => '\u{a7}',
        "para" => '\u{b6}',
        "dagger" => '\u{2020}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "deg" => '\u{b0}',
        "plusmn" => '\u{b1}',
        "times" => '\u{d7}',
        "divide" => '\u{f7}',
        "frac12" => '\u{bd}',
        "frac14" => '\u{bc}',
        "infin" => '\u{221e}',
        "aelig" => '\u{e6}',
        "oelig" => '\u{153}',
        "szlig" => '\u{df}',
        "eacute" => '\u{e9}',
        "egrave" => '\u{e8}',
        "agrave" => '\u{e0}',
        "ccedil" => '\u{e7}',
        "ntilde" => '\u{f1}',
        "auml" => '\u{e4}',
        "ouml" => '\u{f6}',
        "uuml" => '\u{fc}',
        _ => return None,
    })
}

/// Decodes text content. Named references become characters; valid numeric
/// references are kept verbatim as [`Node::Raw`]; a `&` that opens neither
/// stays literal.
fn decode_text_into(raw: &str, stack: &mut [Element]) {
    let mut buf = String::new();
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        buf.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match parse_entity(rest) {
            Some((Decoded::Named(c), len)) => {
                buf.push(c);
                rest = &rest[len..];
            }
            Some((Decoded::Numeric(_), len)) => {
                if !buf.is_empty() {
                    push_child(stack, Node::Text(std::mem::take(&mut buf)));
                }
                push_child(stack, Node::Raw(rest[..len].to_string()));
                rest = &rest[len..];
            }
            None => {
                buf.push('&');
                rest = &rest[1..];
            }
        }
    }
    buf.push_str(rest);
    if !buf.is_empty() {
        push_child(stack, Node::Text(buf));
    }
}

/// Decodes an attribute value to plain characters.
fn decode_attr(raw: &str) -> String {
    let mut out = String::new();
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match parse_entity(rest) {
            Some((Decoded::Named(c) | Decoded::Numeric(c), len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Serialization
// ============================================================================

/// Serializes a node tree back to XHTML.
#[must_use]
pub fn to_xhtml(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

/// Parse-and-reserialize in one step, for fragments used as-is.
#[must_use]
pub fn normalize(html: &str) -> String {
    to_xhtml(&parse_fragment(html))
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => out.push_str(&partial_escape(text)),
        Node::Raw(raw) => out.push_str(raw),
        Node::Comment(comment) => {
            out.push_str("<!--");
            // XML comments cannot contain --
            out.push_str(&comment.replace("--", "- -"));
            out.push_str("-->");
        }
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (key, value) in &el.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape(value.as_str()));
                out.push('"');
            }
            if el.children.is_empty() && is_void(&el.name) {
                out.push_str(" />");
            } else {
                out.push('>');
                for child in &el.children {
                    write_node(out, child);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

// ============================================================================
// Tree Passes
// ============================================================================

/// Removes childless elements, except `img` and `br`.
///
/// Single pass in document order: a parent is judged on its children before
/// they are stripped, so a wrapper emptied by this pass survives it.
#[must_use]
pub fn strip_empty_tags(nodes: Vec<Node>) -> Vec<Node> {
    nodes.into_iter().filter_map(strip_empty_node).collect()
}

fn strip_empty_node(node: Node) -> Option<Node> {
    match node {
        Node::Element(mut el) => {
            if el.children.is_empty() && el.name != "img" && el.name != "br" {
                return None;
            }
            el.children = strip_empty_tags(std::mem::take(&mut el.children));
            Some(Node::Element(el))
        }
        other => Some(other),
    }
}

/// True when the fragment shows nothing: no image, no preserved markup, and
/// no visible text anywhere in the tree. Such a section is dropped from the
/// book.
#[must_use]
pub fn is_effectively_empty(nodes: &[Node]) -> bool {
    nodes.iter().all(|node| match node {
        Node::Raw(_) => false,
        Node::Text(text) => text.trim().is_empty(),
        Node::Comment(_) => true,
        Node::Element(el) => el.name != "img" && is_effectively_empty(&el.children),
    })
}

/// Concatenated text content, entities and comments excluded.
#[must_use]
pub fn plain_text(nodes: &[Node]) -> String {
    fn collect(nodes: &[Node], out: &mut String) {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => collect(&el.children, out),
                Node::Raw(_) | Node::Comment(_) => {}
            }
        }
    }
    let mut out = String::new();
    collect(nodes, &mut out);
    out
}

/// Pre-order walk over every element in the tree.
pub fn for_each_element_mut<F: FnMut(&mut Element)>(nodes: &mut [Node], f: &mut F) {
    for node in nodes {
        if let Node::Element(el) = node {
            f(el);
            for_each_element_mut(&mut el.children, f);
        }
    }
}

// ============================================================================
// Image URLs
// ============================================================================

static CLOUDFRONT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\.cloudfront\.net").expect("cloudfront pattern"));
static FILEPICKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"www\.filepicker\.io/api/file/(\w+)").expect("filepicker pattern"));
static LEGACY_CDN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"cdn[34]\.fiction\.live/(.+)").expect("legacy cdn pattern"));

/// Moves an image URL off retired hosts onto the current CDN.
///
/// The rules chain on purpose: a filepicker URL lands on `cdn4`, which the
/// last rule then folds into `cdn6`.
#[must_use]
pub fn transform_image_url(url: &str) -> String {
    let url = CLOUDFRONT.replace_all(url, "cdn6.fiction.live/file/fictionlive");
    let url = FILEPICKER.replace_all(&url, "cdn4.fiction.live/fp/$1");
    LEGACY_CDN
        .replace_all(&url, "cdn6.fiction.live/file/fictionlive/$1")
        .into_owned()
}

/// Rewrites `src` on every `img` in the tree.
pub fn rewrite_image_urls(nodes: &mut [Node]) {
    for_each_element_mut(nodes, &mut |el| {
        if el.name == "img" {
            for (key, value) in &mut el.attrs {
                if key == "src" {
                    *value = transform_image_url(value);
                }
            }
        }
    });
}
