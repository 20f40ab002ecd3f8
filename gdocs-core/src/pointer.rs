//! Desktop pointer stubs.
//!
//! The desktop sync client represents native documents on disk as small JSON files with a
//! `.gdoc`, `.gsheet` or `.gslides` extension. They carry the remote identity but no content.

use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::model::DocumentKind;

#[derive(Debug, Error)]
pub enum PointerError {
    #[error("failed to read pointer file: {0}")]
    Io(#[from] io::Error),
    #[error("pointer file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pointer file carries no document id")]
    MissingId,
    #[error("no document id in url: {0}")]
    UnrecognizedUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub file_id: String,
    pub kind: Option<DocumentKind>,
}

#[derive(Debug, Deserialize)]
struct PointerBody {
    #[serde(default)]
    doc_id: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Returns the document kind when `path` has a pointer stub extension.
pub fn pointer_kind(path: &Path) -> Option<DocumentKind> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(DocumentKind::from_token)
}

pub fn read_pointer(path: &Path) -> Result<Pointer, PointerError> {
    let contents = std::fs::read_to_string(path)?;
    let mut pointer = parse_pointer(&contents)?;
    if pointer.kind.is_none() {
        pointer.kind = pointer_kind(path);
    }
    Ok(pointer)
}

/// Prefers `doc_id`, then the id half of `resource_id` (`document:<id>`), then `url`.
pub fn parse_pointer(contents: &str) -> Result<Pointer, PointerError> {
    let body: PointerBody = serde_json::from_str(contents)?;

    let mut kind = None;
    let mut resource_id = None;
    if let Some(resource) = body.resource_id.as_deref().filter(|r| !r.is_empty()) {
        match resource.split_once(':') {
            Some((prefix, id)) => {
                kind = kind_from_resource_prefix(prefix);
                resource_id = Some(id.to_string());
            }
            None => resource_id = Some(resource.to_string()),
        }
    }

    let file_id = body
        .doc_id
        .filter(|id| !id.is_empty())
        .or(resource_id)
        .or_else(|| body.url.as_deref().and_then(file_id_from_url));

    match file_id {
        Some(file_id) => Ok(Pointer { file_id, kind }),
        None => Err(PointerError::MissingId),
    }
}

/// Extracts the document id from `/d/<id>` style links or `?id=<id>` open links.
pub fn file_id_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if let Some(mut segments) = url.path_segments() {
        while let Some(segment) = segments.next() {
            if segment == "d"
                && let Some(id) = segments.next()
                && is_file_id(id)
            {
                return Some(id.to_string());
            }
        }
    }
    url.query_pairs()
        .find(|(key, value)| key == "id" && is_file_id(value))
        .map(|(_, value)| value.into_owned())
}

pub fn require_file_id_from_url(raw: &str) -> Result<String, PointerError> {
    file_id_from_url(raw).ok_or_else(|| PointerError::UnrecognizedUrl(raw.to_string()))
}

fn is_file_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn kind_from_resource_prefix(prefix: &str) -> Option<DocumentKind> {
    match prefix {
        "document" => Some(DocumentKind::Document),
        "spreadsheet" => Some(DocumentKind::Spreadsheet),
        "presentation" => Some(DocumentKind::Presentation),
        _ => None,
    }
}
