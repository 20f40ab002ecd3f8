use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use futures_util::{StreamExt, stream};
use gdocs_core::{
    DocumentKind, ExportStream, FOLDER_MIME, ListQuery, RemoteDrive, RemoteError, RemoteFile,
};
use time::OffsetDateTime;
use time::macros::datetime;

pub const ROOT_REAL_ID: &str = "0AROOT";

/// In-memory drive that counts every call it serves.
#[derive(Default)]
pub struct FakeDrive {
    files: RefCell<Vec<RemoteFile>>,
    trashed: HashSet<String>,
    bodies: HashMap<String, Vec<u8>>,
    failing_exports: HashSet<String>,
    pub list_calls: Cell<usize>,
    pub metadata_calls: Cell<usize>,
    pub export_calls: Cell<usize>,
    pub queries: RefCell<Vec<ListQuery>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        let drive = Self::default();
        drive.files.borrow_mut().push(RemoteFile {
            id: ROOT_REAL_ID.into(),
            title: "My Drive".into(),
            mime_type: FOLDER_MIME.into(),
            modified_at: datetime!(2020-01-01 0:00 UTC),
            created_at: datetime!(2020-01-01 0:00 UTC),
            parents: Vec::new(),
        });
        drive
    }

    pub fn folder(self, id: &str, title: &str, parent: Option<&str>) -> Self {
        self.files.borrow_mut().push(RemoteFile {
            id: id.into(),
            title: title.into(),
            mime_type: FOLDER_MIME.into(),
            modified_at: datetime!(2020-01-01 0:00 UTC),
            created_at: datetime!(2020-01-01 0:00 UTC),
            parents: parent.map(|p| vec![p.to_string()]).unwrap_or_default(),
        });
        self
    }

    pub fn document(
        mut self,
        id: &str,
        title: &str,
        kind: DocumentKind,
        parent: &str,
        modified_at: OffsetDateTime,
    ) -> Self {
        self.files.borrow_mut().push(RemoteFile {
            id: id.into(),
            title: title.into(),
            mime_type: kind.mime().into(),
            modified_at,
            created_at: datetime!(2021-01-01 0:00 UTC),
            parents: vec![parent.to_string()],
        });
        self.bodies
            .insert(id.to_string(), format!("body of {id}").into_bytes());
        self
    }

    pub fn file(self, file: RemoteFile) -> Self {
        self.files.borrow_mut().push(file);
        self
    }

    pub fn trashed(mut self, id: &str) -> Self {
        self.trashed.insert(id.to_string());
        self
    }

    pub fn failing_export(mut self, id: &str) -> Self {
        self.failing_exports.insert(id.to_string());
        self
    }

    pub fn set_modified(&self, id: &str, at: OffsetDateTime) {
        for file in self.files.borrow_mut().iter_mut() {
            if file.id == id {
                file.modified_at = at;
            }
        }
    }

    pub fn remote_calls(&self) -> usize {
        self.list_calls.get() + self.metadata_calls.get()
    }

    fn canonical(id: &str) -> &str {
        if id == "root" { ROOT_REAL_ID } else { id }
    }
}

impl RemoteDrive for FakeDrive {
    async fn list(&self, query: &ListQuery) -> Result<Vec<RemoteFile>, RemoteError> {
        self.list_calls.set(self.list_calls.get() + 1);
        self.queries.borrow_mut().push(query.clone());
        let mut query = query.clone();
        query.parent = query.parent.map(|p| Self::canonical(&p).to_string());
        Ok(self
            .files
            .borrow()
            .iter()
            .filter(|file| query.matches(file))
            .filter(|file| !(query.exclude_trashed && self.trashed.contains(&file.id)))
            .cloned()
            .collect())
    }

    async fn fetch_metadata(&self, id: &str, _fields: &[&str]) -> Result<RemoteFile, RemoteError> {
        self.metadata_calls.set(self.metadata_calls.get() + 1);
        let id = Self::canonical(id);
        self.files
            .borrow()
            .iter()
            .find(|file| file.id == id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn export(&self, id: &str, _kind: DocumentKind) -> Result<ExportStream, RemoteError> {
        self.export_calls.set(self.export_calls.get() + 1);
        if self.failing_exports.contains(id) {
            return Err(RemoteError::Backend(format!("export refused for {id}")));
        }
        let body = self
            .bodies
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        Ok(stream::iter(vec![Ok(body)]).boxed())
    }
}
