use std::collections::HashSet;

use gdocs_core::{RemoteDrive, RemoteFile};
use tracing::warn;

use super::naming::sanitize_component;
use super::normalize::titles_match;
use super::resolver::{RemotePathResolver, ResolveError};

/// Leading segment for anything whose top-level folder is not the personal root.
pub const SHARED_SEGMENT: &str = "Shared";

impl RemotePathResolver {
    /// Local subfolder segments, root first, for the folder that holds `file`.
    pub async fn ancestor_path<D: RemoteDrive>(
        &mut self,
        drive: &D,
        file: &RemoteFile,
    ) -> Result<Vec<String>, ResolveError> {
        let titles = self.walk_up(drive, file.parent().map(str::to_string)).await?;
        Ok(self.localize(titles))
    }

    /// Local segments for a folder itself, including its own title.
    pub async fn folder_path<D: RemoteDrive>(
        &mut self,
        drive: &D,
        folder_id: &str,
    ) -> Result<Vec<String>, ResolveError> {
        let titles = self.walk_up(drive, Some(folder_id.to_string())).await?;
        Ok(self.localize(titles))
    }

    async fn walk_up<D: RemoteDrive>(
        &mut self,
        drive: &D,
        start: Option<String>,
    ) -> Result<Vec<String>, ResolveError> {
        let mut titles = Vec::new();
        let mut visited = HashSet::new();
        let mut next = start;
        while let Some(id) = next {
            if !visited.insert(id.clone()) {
                warn!(folder_id = %id, "parent chain loops, stopping walk");
                break;
            }
            let folder = self.folder_meta(drive, &id).await?;
            titles.push(folder.title);
            next = folder.parent;
        }
        titles.reverse();
        Ok(titles)
    }

    fn localize(&self, mut titles: Vec<String>) -> Vec<String> {
        let owned = titles
            .first()
            .is_some_and(|top| titles_match(top, &self.options().personal_root_name));
        if owned {
            titles.remove(0);
        } else {
            titles.insert(0, SHARED_SEGMENT.to_string());
        }
        titles
            .iter()
            .map(|title| sanitize_component(title))
            .collect()
    }
}
