use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use time::OffsetDateTime;

use super::naming::parse_stamp;

const STAMP_PATTERN: &str = r"\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}";

static ANY_CAPTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(.+)_({STAMP_PATTERN})\.([^.]+)$")).unwrap()
});

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid capture pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// One timestamped file of a document's lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub path: PathBuf,
    pub taken_at: OffsetDateTime,
}

impl Capture {
    pub fn new(path: impl Into<PathBuf>, taken_at: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            taken_at,
        }
    }
}

/// Every capture sharing one base name and extension, rebuilt from disk on each use.
#[derive(Debug, Default, Clone)]
pub struct CaptureSet {
    captures: Vec<Capture>,
}

impl CaptureSet {
    pub async fn discover(dir: &Path, base: &str, ext: &str) -> Result<Self, CaptureError> {
        let pattern = Regex::new(&format!(
            r"^{}_({STAMP_PATTERN})\.{}$",
            regex::escape(base),
            regex::escape(ext)
        ))?;
        let mut captures = Vec::new();
        for name in file_names(dir).await? {
            let Some(stamp) = pattern.captures(&name).and_then(|c| c.get(1)) else {
                continue;
            };
            if let Some(taken_at) = parse_stamp(stamp.as_str()) {
                captures.push(Capture::new(dir.join(&name), taken_at));
            }
        }
        Ok(Self { captures })
    }

    /// Adds captures a live run would have written but a dry run did not.
    pub fn merge(&mut self, pending: impl IntoIterator<Item = Capture>) {
        for capture in pending {
            if !self.captures.iter().any(|c| c.path == capture.path) {
                self.captures.push(capture);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    /// Oldest first; equal timestamps fall back to path order so the result never depends on
    /// directory listing order.
    pub fn into_sorted(mut self) -> Vec<Capture> {
        self.captures
            .sort_by(|a, b| a.taken_at.cmp(&b.taken_at).then_with(|| a.path.cmp(&b.path)));
        self.captures
    }
}

/// Every `(base, ext)` lineage with at least one parseable capture in `dir`.
pub async fn discover_groups(dir: &Path) -> Result<Vec<(String, String)>, CaptureError> {
    let mut groups = BTreeSet::new();
    for name in file_names(dir).await? {
        if let Some(caps) = ANY_CAPTURE.captures(&name)
            && parse_stamp(&caps[2]).is_some()
        {
            groups.insert((caps[1].to_string(), caps[3].to_string()));
        }
    }
    Ok(groups.into_iter().collect())
}

async fn file_names(dir: &Path) -> Result<Vec<String>, CaptureError> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(names),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
