mod drive;
mod model;
pub mod pointer;

pub use drive::{
    ANCESTOR_FIELDS, DOCUMENT_FIELDS, ExportStream, ListQuery, RemoteDrive, RemoteError,
    TitleFilter,
};
pub use model::{DocumentKind, FOLDER_MIME, RemoteFile, RemoteFolderRef};
