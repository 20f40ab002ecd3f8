use std::collections::HashMap;

use gdocs_core::RemoteFolderRef;

/// Run-scoped memo of resolved paths and visited folders.
///
/// Entries are write-once: a second insert for the same key keeps the first value. Nothing is
/// evicted until the cache is dropped.
#[derive(Debug, Default)]
pub struct PathCache {
    paths: HashMap<String, String>,
    folders: HashMap<String, RemoteFolderRef>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_key(segments: &[String]) -> String {
        segments.join("/")
    }

    pub fn resolved(&self, segments: &[String]) -> Option<&str> {
        self.paths
            .get(&Self::path_key(segments))
            .map(String::as_str)
    }

    pub fn remember_path(&mut self, segments: &[String], folder_id: &str) {
        self.paths
            .entry(Self::path_key(segments))
            .or_insert_with(|| folder_id.to_string());
    }

    pub fn folder(&self, id: &str) -> Option<&RemoteFolderRef> {
        self.folders.get(id)
    }

    pub fn remember_folder(&mut self, folder: RemoteFolderRef) -> &RemoteFolderRef {
        self.folders.entry(folder.id.clone()).or_insert(folder)
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }
}
