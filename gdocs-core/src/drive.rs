use std::io;

use futures_util::stream::BoxStream;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{DocumentKind, FOLDER_MIME, RemoteFile};

/// Fields requested when walking a folder's ancestry.
pub const ANCESTOR_FIELDS: &[&str] = &["id", "title", "parents"];
/// Fields requested when describing a single document.
pub const DOCUMENT_FIELDS: &[&str] = &[
    "id",
    "title",
    "mimeType",
    "modifiedDate",
    "createdDate",
    "parents",
];

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote item not found: {0}")]
    NotFound(String),
    #[error("remote backend failed: {0}")]
    Backend(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type ExportStream = BoxStream<'static, Result<Vec<u8>, RemoteError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleFilter {
    Equals(String),
    Contains(String),
    /// Every word must appear somewhere in the title.
    ContainsAll(Vec<String>),
}

impl TitleFilter {
    /// Case-insensitive, like the drive's own title query operators.
    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        match self {
            TitleFilter::Equals(wanted) => title == wanted.to_lowercase(),
            TitleFilter::Contains(needle) => title.contains(&needle.to_lowercase()),
            TitleFilter::ContainsAll(words) => words
                .iter()
                .all(|word| title.contains(&word.to_lowercase())),
        }
    }
}

/// Filters accepted by [`RemoteDrive::list`]. `parent: None` searches the whole drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub parent: Option<String>,
    pub mime_types: Vec<String>,
    pub title: Option<TitleFilter>,
    pub modified_after: Option<OffsetDateTime>,
    pub modified_before: Option<OffsetDateTime>,
    pub exclude_trashed: bool,
}

impl ListQuery {
    pub fn children_of(parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Self::everywhere()
        }
    }

    pub fn everywhere() -> Self {
        Self {
            parent: None,
            mime_types: Vec::new(),
            title: None,
            modified_after: None,
            modified_before: None,
            exclude_trashed: true,
        }
    }

    pub fn folders(mut self) -> Self {
        self.mime_types = vec![FOLDER_MIME.to_string()];
        self
    }

    pub fn documents(mut self) -> Self {
        self.mime_types = DocumentKind::ALL
            .iter()
            .map(|kind| kind.mime().to_string())
            .collect();
        self
    }

    pub fn of_kind(mut self, kind: DocumentKind) -> Self {
        self.mime_types = vec![kind.mime().to_string()];
        self
    }

    pub fn title_equals(mut self, title: impl Into<String>) -> Self {
        self.title = Some(TitleFilter::Equals(title.into()));
        self
    }

    pub fn title_contains(mut self, needle: impl Into<String>) -> Self {
        self.title = Some(TitleFilter::Contains(needle.into()));
        self
    }

    pub fn title_contains_all(mut self, words: Vec<String>) -> Self {
        self.title = Some(TitleFilter::ContainsAll(words));
        self
    }

    pub fn modified_within(
        mut self,
        after: Option<OffsetDateTime>,
        before: Option<OffsetDateTime>,
    ) -> Self {
        self.modified_after = after;
        self.modified_before = before;
        self
    }

    /// Evaluates every filter except trash state, which only the drive knows.
    pub fn matches(&self, file: &RemoteFile) -> bool {
        if let Some(parent) = &self.parent
            && !file.parents.iter().any(|p| p == parent)
        {
            return false;
        }
        if !self.mime_types.is_empty() && !self.mime_types.contains(&file.mime_type) {
            return false;
        }
        if let Some(filter) = &self.title
            && !filter.matches(&file.title)
        {
            return false;
        }
        if let Some(after) = self.modified_after
            && file.modified_at <= after
        {
            return false;
        }
        if let Some(before) = self.modified_before
            && file.modified_at >= before
        {
            return false;
        }
        true
    }
}

/// The drive capabilities the mirror consumes. Calls are awaited one at a time; retry and
/// backoff for transient failures belong to the implementation.
#[allow(async_fn_in_trait)]
pub trait RemoteDrive {
    /// Returns matching entries in the drive's own order.
    async fn list(&self, query: &ListQuery) -> Result<Vec<RemoteFile>, RemoteError>;

    async fn fetch_metadata(&self, id: &str, fields: &[&str]) -> Result<RemoteFile, RemoteError>;

    async fn export(&self, id: &str, kind: DocumentKind) -> Result<ExportStream, RemoteError>;
}
