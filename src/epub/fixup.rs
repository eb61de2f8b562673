//! Repair pass for already-written books.
//!
//! Earlier fiction.live exports carry `<dc:identifier scheme="opf:URL">` in
//! their package documents, an attribute spelling EPUB checkers reject. The
//! pass rewrites it to `opf:scheme="URL"` in place, leaving every other
//! archive entry byte for byte as it was.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::Result;

const OPF_ENTRY: &str = "EPUB/content.opf";

/// Library-manager droppings that must not be descended into.
const SKIPPED_DIRS: [&str; 2] = [".calnotes", ".caltrash"];

static URL_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<dc:identifier scheme="opf:URL">(.*?)</dc:identifier>"#)
        .expect("url identifier pattern compiles")
});

/// What [`fix_epub`] did to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    /// An identifier was rewritten and the archive repacked.
    Fixed,
    /// The package document was already well formed.
    Clean,
    /// The archive has no `EPUB/content.opf`, so it was left alone.
    NoOpf,
}

/// Rewrites the malformed identifier in a single book, if present.
///
/// The archive is repacked next to the original and swapped in atomically,
/// with every entry other than the package document copied raw.
pub fn fix_epub(path: &Path) -> Result<FixOutcome> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let content = {
        let mut entry = match archive.by_name(OPF_ENTRY) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(FixOutcome::NoOpf),
            Err(e) => return Err(e.into()),
        };
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        content
    };

    let replacement = r#"<dc:identifier opf:scheme="URL">$1</dc:identifier>"#;
    let fixed = match URL_IDENTIFIER.replace_all(&content, replacement) {
        Cow::Borrowed(_) => return Ok(FixOutcome::Clean),
        Cow::Owned(fixed) => fixed,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = ZipWriter::new(tmp.as_file_mut());
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            if entry.name() == OPF_ENTRY {
                writer.start_file(OPF_ENTRY, SimpleFileOptions::default())?;
                writer.write_all(fixed.as_bytes())?;
            } else {
                writer.raw_copy_file(entry)?;
            }
        }
        writer.finish()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(FixOutcome::Fixed)
}

/// Collects every `.epub` under `dir`, recursively.
pub fn find_epubs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_epubs(dir, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_epubs(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            collect_epubs(&path, found)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// Fixes `path` itself when it names a file, or every book under it when it
/// names a directory. Returns the per-file outcomes in the order processed.
pub fn fix_path(path: &Path) -> Result<Vec<(PathBuf, FixOutcome)>> {
    let targets = if path.is_dir() {
        find_epubs(path)?
    } else {
        vec![path.to_path_buf()]
    };
    let mut outcomes = Vec::with_capacity(targets.len());
    for target in targets {
        let outcome = fix_epub(&target)?;
        match outcome {
            FixOutcome::Fixed => info!(path = %target.display(), "identifier rewritten"),
            FixOutcome::Clean => debug!(path = %target.display(), "identifier already correct"),
            FixOutcome::NoOpf => warn!(path = %target.display(), "no package document found"),
        }
        outcomes.push((target, outcome));
    }
    Ok(outcomes)
}
