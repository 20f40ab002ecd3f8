use std::fmt;

use time::OffsetDateTime;

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Native document kinds that can be exported to an office format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    Document,
    Spreadsheet,
    Presentation,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::Document,
        DocumentKind::Spreadsheet,
        DocumentKind::Presentation,
    ];

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/vnd.google-apps.document" => Some(Self::Document),
            "application/vnd.google-apps.spreadsheet" => Some(Self::Spreadsheet),
            "application/vnd.google-apps.presentation" => Some(Self::Presentation),
            _ => None,
        }
    }

    /// Maps the extension of a desktop pointer stub (`.gdoc`, `.gsheet`, `.gslides`).
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "gdoc" => Some(Self::Document),
            "gsheet" => Some(Self::Spreadsheet),
            "gslides" => Some(Self::Presentation),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Document => "application/vnd.google-apps.document",
            Self::Spreadsheet => "application/vnd.google-apps.spreadsheet",
            Self::Presentation => "application/vnd.google-apps.presentation",
        }
    }

    /// Token embedded in every local file name, shared with the pointer stub extension.
    pub fn token(self) -> &'static str {
        match self {
            Self::Document => "gdoc",
            Self::Spreadsheet => "gsheet",
            Self::Presentation => "gslides",
        }
    }

    pub fn export_extension(self) -> &'static str {
        match self {
            Self::Document => "docx",
            Self::Spreadsheet => "xlsx",
            Self::Presentation => "pptx",
        }
    }

    pub fn export_mime(self) -> &'static str {
        match self {
            Self::Document => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Spreadsheet => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Presentation => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A listing or metadata entry returned by the drive. Folders and documents share this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    pub modified_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub parents: Vec<String>,
}

impl RemoteFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    pub fn kind(&self) -> Option<DocumentKind> {
        DocumentKind::from_mime(&self.mime_type)
    }

    pub fn parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    pub fn folder_ref(&self) -> RemoteFolderRef {
        RemoteFolderRef {
            id: self.id.clone(),
            title: self.title.clone(),
            parent: self.parent().map(str::to_string),
        }
    }
}

/// Folder identity as memoized for ancestor walks. `parent` is `None` at a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolderRef {
    pub id: String,
    pub title: String,
    pub parent: Option<String>,
}
