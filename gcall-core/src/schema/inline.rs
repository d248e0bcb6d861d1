//! Staging of inline proto content and library bundles.
//!
//! A library bundle is a single string carrying multiple files. Three
//! encodings are accepted, tried in order; the first one that parses wins:
//!
//! 1. Plain multi-file text: each file starts with a `=== file: <path>`
//!    marker line followed by its content up to the next marker.
//! 2. JSON: either an object mapping relative path to content, or an array
//!    of `{path, content}` records.
//! 3. A base64-encoded ZIP archive of the library directory.
use super::{SchemaError, io_error};
use base64::Engine;
use std::io::Read;
use std::path::PathBuf;

pub(super) struct StagedInline {
    pub root: PathBuf,
    pub includes: Vec<PathBuf>,
}

/// Writes the inline proto and its library bundle into a fresh temporary
/// directory tree, returning the discovery root and include paths.
pub(super) fn stage(proto: &str, lib: Option<&str>) -> Result<StagedInline, SchemaError> {
    let root = tempfile::Builder::new()
        .prefix("gcall-inline-proto")
        .tempdir()
        .map_err(|e| io_error("creating inline staging directory", e))?
        .keep();
    std::fs::write(root.join("inline.proto"), proto)
        .map_err(|e| io_error("writing inline proto", e))?;

    let mut includes = Vec::new();
    if let Some(lib) = lib.map(str::trim).filter(|s| !s.is_empty()) {
        let lib_dir = root.join("lib");
        std::fs::create_dir_all(&lib_dir)
            .map_err(|e| io_error("creating inline lib directory", e))?;
        for (relative, content) in decode_bundle(lib)? {
            let out = lib_dir.join(&relative);
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| io_error(format!("creating lib directory for {relative}"), e))?;
            }
            std::fs::write(&out, content)
                .map_err(|e| io_error(format!("writing lib file {relative}"), e))?;
        }
        includes.push(lib_dir);
    }

    Ok(StagedInline { root, includes })
}

fn decode_bundle(text: &str) -> Result<Vec<(String, Vec<u8>)>, SchemaError> {
    if text.contains("=== file:") {
        return Ok(parse_plain(text));
    }
    if text.starts_with('{') || text.starts_with('[') {
        match parse_json(text) {
            Some(files) => return Ok(files),
            None => {
                tracing::warn!("inline lib is not valid JSON, falling back to base64 zip");
            }
        }
    }
    parse_zip(text)
}

/// Splits `=== file: <path>` delimited text into (path, content) pairs.
/// Content before the first marker is ignored.
fn parse_plain(text: &str) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    let mut current: Option<String> = None;
    let mut buf = String::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("=== file:") {
            if let Some(path) = current.take() {
                files.push((path, std::mem::take(&mut buf).into_bytes()));
            }
            buf.clear();
            current = Some(rest.trim().to_string());
        } else if current.is_some() {
            buf.push_str(line);
            buf.push('\n');
        }
    }
    if let Some(path) = current {
        files.push((path, buf.into_bytes()));
    }
    files
}

/// Returns `None` when the text does not parse as a JSON object or array.
fn parse_json(text: &str) -> Option<Vec<(String, Vec<u8>)>> {
    match serde_json::from_str(text) {
        Ok(serde_json::Value::Object(map)) => Some(
            map.into_iter()
                .map(|(path, content)| {
                    let content = match content {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (path, content.into_bytes())
                })
                .collect(),
        ),
        Ok(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| {
                    let path = item.get("path")?.as_str()?.to_string();
                    let content = item.get("content")?.as_str()?.to_string();
                    Some((path, content.into_bytes()))
                })
                .collect(),
        ),
        _ => None,
    }
}

fn parse_zip(text: &str) -> Result<Vec<(String, Vec<u8>)>, SchemaError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| {
            SchemaError::Inline(format!(
                "library bundle is neither plain multi-file text, JSON, nor base64 zip: {e}"
            ))
        })?;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| SchemaError::Inline(format!("invalid zip archive: {e}")))?;

    let mut files = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| SchemaError::Inline(format!("invalid zip entry: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let relative = relative.to_string_lossy().into_owned();
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| io_error(format!("reading zip entry {relative}"), e))?;
        files.push((relative, content));
    }
    Ok(files)
}
