use gdocs_core::{
    ANCESTOR_FIELDS, DocumentKind, ListQuery, RemoteDrive, RemoteError, RemoteFile,
    RemoteFolderRef,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cache::PathCache;
use super::normalize::{colon_recovery, has_delimiters, titles_match, word_match, word_tokens};

pub const DEFAULT_ROOT_ID: &str = "root";
pub const DEFAULT_PERSONAL_ROOT: &str = "My Drive";
pub const DEFAULT_SHORTCUT_MARKER: &str = ".shortcut-targets-by-id";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{title:?} not found under {path:?}")]
    LeafNotFound { path: String, title: String },
    #[error("remote lookup failed: {0}")]
    Remote(#[from] RemoteError),
}

/// What to do when more than one folder survives the word search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// Take the first candidate in the drive's listing order.
    #[default]
    FirstListed,
    /// Treat the segment as unresolved.
    Reject,
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub root_id: String,
    pub personal_root_name: String,
    pub shortcut_marker: String,
    pub ambiguity: AmbiguityPolicy,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            root_id: DEFAULT_ROOT_ID.to_string(),
            personal_root_name: DEFAULT_PERSONAL_ROOT.to_string(),
            shortcut_marker: DEFAULT_SHORTCUT_MARKER.to_string(),
            ambiguity: AmbiguityPolicy::default(),
        }
    }
}

/// Soft failures collected during a walk. None of them abort the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Unresolved {
        segment: String,
        parent_id: String,
        siblings: Vec<String>,
    },
    Ambiguous {
        segment: String,
        candidates: Vec<String>,
        chosen: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub folder_id: String,
    pub diagnostics: Vec<Diagnostic>,
    pub from_cache: bool,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::Unresolved { .. }))
    }
}

/// Maps local path segments onto remote folders (forward) and remote parent chains onto local
/// path segments (reverse, see `ancestors.rs`). Both directions share one [`PathCache`].
pub struct RemotePathResolver {
    cache: PathCache,
    options: ResolverOptions,
}

impl RemotePathResolver {
    pub fn new(options: ResolverOptions, cache: PathCache) -> Self {
        Self { cache, options }
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub async fn resolve<D: RemoteDrive>(
        &mut self,
        drive: &D,
        segments: &[String],
    ) -> Result<Resolution, ResolveError> {
        if let Some(folder_id) = self.cache.resolved(segments) {
            debug!(path = %PathCache::path_key(segments), folder_id, "path served from cache");
            return Ok(Resolution {
                folder_id: folder_id.to_string(),
                diagnostics: Vec::new(),
                from_cache: true,
            });
        }

        let (mut current, walk) = self.walk_origin(drive, segments).await?;
        let mut diagnostics = Vec::new();
        for segment in &walk {
            if let Some(next) = self
                .resolve_segment(drive, &current, segment, &mut diagnostics)
                .await?
            {
                current = next;
            }
        }

        let resolution = Resolution {
            folder_id: current,
            diagnostics,
            from_cache: false,
        };
        if resolution.is_complete() {
            self.cache.remember_path(segments, &resolution.folder_id);
        }
        Ok(resolution)
    }

    /// Resolves the folder part of a path, then requires a document titled `title` in it.
    pub async fn resolve_leaf<D: RemoteDrive>(
        &mut self,
        drive: &D,
        segments: &[String],
        title: &str,
        kind: Option<DocumentKind>,
    ) -> Result<(Resolution, RemoteFile), ResolveError> {
        let resolution = self.resolve(drive, segments).await?;
        let query = match kind {
            Some(kind) => ListQuery::children_of(&resolution.folder_id).of_kind(kind),
            None => ListQuery::children_of(&resolution.folder_id).documents(),
        };

        let mut candidates = vec![title.to_string()];
        candidates.extend(colon_recovery(title));
        for candidate in candidates {
            let found = drive
                .list(&query.clone().title_equals(candidate))
                .await?;
            if let Some(file) = found.into_iter().next() {
                return Ok((resolution, file));
            }
        }

        Err(ResolveError::LeafNotFound {
            path: PathCache::path_key(segments),
            title: title.to_string(),
        })
    }

    /// Picks the folder the walk starts from. A leading shortcut marker
    /// (`<marker>/<target id>/<alias>/...`) restarts at the target, with the alias replaced by
    /// the target's real title.
    async fn walk_origin<D: RemoteDrive>(
        &mut self,
        drive: &D,
        segments: &[String],
    ) -> Result<(String, Vec<String>), ResolveError> {
        if segments.len() >= 2 && segments[0] == self.options.shortcut_marker {
            let target_id = segments[1].clone();
            let target = self.folder_meta(drive, &target_id).await?;
            let mut walk = Vec::with_capacity(segments.len().saturating_sub(2));
            if let Some(alias) = segments.get(2) {
                if alias != &target.title {
                    info!(alias = %alias, title = %target.title, "shortcut alias differs from remote title");
                }
                walk.push(target.title.clone());
                walk.extend(segments[3..].iter().cloned());
            }
            return Ok((target_id, walk));
        }
        Ok((self.options.root_id.clone(), segments.to_vec()))
    }

    async fn resolve_segment<D: RemoteDrive>(
        &mut self,
        drive: &D,
        current: &str,
        segment: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Option<String>, ResolveError> {
        let here = self.folder_meta(drive, current).await?;
        if titles_match(&here.title, segment) {
            debug!(segment, folder_id = current, "segment matches current folder");
            return Ok(Some(current.to_string()));
        }

        if let Some(found) = self.find_exact(drive, current, segment).await? {
            return Ok(Some(found));
        }

        if let Some(recovered) = colon_recovery(segment)
            && let Some(found) = self.find_exact(drive, current, &recovered).await?
        {
            debug!(segment, recovered = %recovered, "resolved after restoring colon");
            return Ok(Some(found));
        }

        if has_delimiters(segment) {
            let words = word_tokens(segment);
            if !words.is_empty() {
                let listed = drive
                    .list(
                        &ListQuery::children_of(current)
                            .folders()
                            .title_contains_all(words.clone()),
                    )
                    .await?;
                self.remember_listing(&listed);
                let survivors: Vec<&RemoteFile> = listed
                    .iter()
                    .filter(|folder| word_match(&folder.title, &words))
                    .collect();
                match survivors.as_slice() {
                    [] => {}
                    [only] => return Ok(Some(only.id.clone())),
                    [first, ..] => {
                        let chosen = match self.options.ambiguity {
                            AmbiguityPolicy::FirstListed => Some(first.id.clone()),
                            AmbiguityPolicy::Reject => None,
                        };
                        let candidates: Vec<String> =
                            survivors.iter().map(|f| f.title.clone()).collect();
                        warn!(
                            segment,
                            ?candidates,
                            chosen = chosen.as_deref().unwrap_or("none"),
                            "ambiguous folder match"
                        );
                        diagnostics.push(Diagnostic::Ambiguous {
                            segment: segment.to_string(),
                            candidates,
                            chosen: chosen.clone(),
                        });
                        if chosen.is_some() {
                            return Ok(chosen);
                        }
                    }
                }
            }
        }

        let siblings: Vec<String> = drive
            .list(&ListQuery::children_of(current).folders())
            .await?
            .into_iter()
            .map(|folder| folder.title)
            .collect();
        warn!(segment, parent = %here.title, ?siblings, "folder not found, continuing at parent");
        diagnostics.push(Diagnostic::Unresolved {
            segment: segment.to_string(),
            parent_id: current.to_string(),
            siblings,
        });
        Ok(None)
    }

    async fn find_exact<D: RemoteDrive>(
        &mut self,
        drive: &D,
        parent: &str,
        title: &str,
    ) -> Result<Option<String>, ResolveError> {
        let listed = drive
            .list(&ListQuery::children_of(parent).folders().title_equals(title))
            .await?;
        self.remember_listing(&listed);
        Ok(listed.into_iter().next().map(|folder| folder.id))
    }

    fn remember_listing(&mut self, listed: &[RemoteFile]) {
        for folder in listed {
            self.cache.remember_folder(folder.folder_ref());
        }
    }

    pub(crate) async fn folder_meta<D: RemoteDrive>(
        &mut self,
        drive: &D,
        id: &str,
    ) -> Result<RemoteFolderRef, ResolveError> {
        if let Some(folder) = self.cache.folder(id) {
            return Ok(folder.clone());
        }
        let fetched = drive.fetch_metadata(id, ANCESTOR_FIELDS).await?;
        let mut folder = fetched.folder_ref();
        // The drive answers the root alias with the real id; keep it reachable by both.
        if folder.id != id {
            self.cache.remember_folder(folder.clone());
            folder.id = id.to_string();
        }
        Ok(self.cache.remember_folder(folder).clone())
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
