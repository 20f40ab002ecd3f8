use std::collections::HashMap;

use gdocs_core::RemoteFile;
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub const MAX_COMPONENT_CHARS: usize = 150;

const CAPTURE_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");

#[derive(Debug, Error)]
pub enum StampError {
    #[error("failed to format capture timestamp: {0}")]
    Format(#[from] time::error::Format),
}

/// Makes a remote title usable as one local path component.
///
/// ':' becomes a space, so `"Project: Plan"` is stored as `"Project  Plan"`. The resolver's
/// colon-recovery retry relies on this exact mapping.
pub fn sanitize_component(title: &str) -> String {
    let mapped: String = title
        .chars()
        .map(|c| match c {
            ':' => ' ',
            '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_COMPONENT_CHARS)
        .collect();
    let trimmed = mapped.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn format_stamp(at: OffsetDateTime) -> Result<String, StampError> {
    Ok(at.to_offset(UtcOffset::UTC).format(CAPTURE_STAMP)?)
}

pub fn parse_stamp(raw: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(raw, CAPTURE_STAMP)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

pub fn plain_file_name(base: &str, ext: &str) -> String {
    format!("{base}.{ext}")
}

pub fn capture_file_name(base: &str, at: OffsetDateTime, ext: &str) -> Result<String, StampError> {
    Ok(format!("{base}_{}.{ext}", format_stamp(at)?))
}

/// Base names for every exportable document in one folder listing, keyed by remote id.
///
/// Documents whose sanitized titles collide (case-insensitively) within the same kind are
/// ordered by creation time and id; later ones get ` (2)`, ` (3)`, ...
pub fn document_base_names(files: &[RemoteFile]) -> HashMap<String, String> {
    disambiguate(
        files
            .iter()
            .filter_map(|file| file.kind().map(|kind| (file, kind.token())))
            .collect(),
    )
}

/// Local directory names for sibling folders, disambiguated the same way.
pub fn folder_dir_names(folders: &[RemoteFile]) -> HashMap<String, String> {
    disambiguate(folders.iter().map(|folder| (folder, "")).collect())
}

fn disambiguate(mut entries: Vec<(&RemoteFile, &'static str)>) -> HashMap<String, String> {
    entries.sort_by(|(a, _), (b, _)| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut seen: HashMap<(String, &'static str), usize> = HashMap::new();
    let mut names = HashMap::with_capacity(entries.len());
    for (file, token) in entries {
        let title = sanitize_component(&file.title);
        let count = seen.entry((title.to_lowercase(), token)).or_insert(0);
        *count += 1;
        let suffix = if *count == 1 {
            String::new()
        } else {
            format!(" ({count})")
        };
        let name = if token.is_empty() {
            format!("{title}{suffix}")
        } else {
            format!("{title}{suffix}.{token}")
        };
        names.insert(file.id.clone(), name);
    }
    names
}
