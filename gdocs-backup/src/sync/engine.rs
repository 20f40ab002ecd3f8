use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use futures_util::{StreamExt, stream};
use gdocs_core::pointer::{PointerError, pointer_kind, read_pointer};
use gdocs_core::{DOCUMENT_FIELDS, ExportStream, ListQuery, RemoteDrive, RemoteError, RemoteFile};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::cache::PathCache;
use super::captures::{CaptureError, CaptureSet};
use super::local_fs::{FsError, LocalFs};
use super::naming::{StampError, document_base_names, folder_dir_names};
use super::paths::{PathError, local_dir, segments_under};
use super::resolver::{Diagnostic, RemotePathResolver, ResolveError, ResolverOptions};
use super::retention::{Decision, Lineage, PrunePlan, RetentionEngine, RetentionOptions};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("{id} has unsupported type {mime}")]
    UnsupportedKind { id: String, mime: String },
    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),
    #[error("capture discovery failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("pointer file error: {0}")]
    Pointer(#[from] PointerError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("timestamp error: {0}")]
    Stamp(#[from] StampError),
    #[error("no drive mount configured for local path input")]
    NoDriveMount,
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub backup_root: PathBuf,
    pub drive_mount: Option<PathBuf>,
    /// `None` walks the whole tree; `Some(0)` mirrors only the starting folder.
    pub max_depth: Option<usize>,
    pub modified_after: Option<OffsetDateTime>,
    pub modified_before: Option<OffsetDateTime>,
    pub dry_run: bool,
    pub retention: RetentionOptions,
    pub resolver: ResolverOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub file_id: String,
    pub base_name: String,
    pub decision: Decision,
    pub prune: Option<PrunePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub subject: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub outcomes: Vec<DocumentOutcome>,
    pub diagnostics: Vec<Diagnostic>,
    pub failures: Vec<Failure>,
}

impl MirrorReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    fn record_failure(&mut self, subject: &str, error: EngineError) {
        warn!(subject, error = %error, "skipping after failure");
        self.failures.push(Failure {
            subject: subject.to_string(),
            error: error.to_string(),
        });
    }
}

/// Drives one run: resolve, list, decide, transfer, prune. Documents are handled strictly one
/// after another and a failure only ever costs the document (or folder listing) it happened in.
pub struct MirrorEngine<D> {
    drive: D,
    resolver: RemotePathResolver,
    retention: RetentionEngine,
    fs: LocalFs,
    options: EngineOptions,
    sibling_names: HashMap<String, HashMap<String, String>>,
}

impl<D: RemoteDrive> MirrorEngine<D> {
    pub fn new(drive: D, options: EngineOptions) -> Self {
        Self {
            drive,
            resolver: RemotePathResolver::new(options.resolver.clone(), PathCache::new()),
            retention: RetentionEngine::new(options.retention),
            fs: LocalFs::new(options.dry_run),
            options,
            sibling_names: HashMap::new(),
        }
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }

    pub fn resolver(&self) -> &RemotePathResolver {
        &self.resolver
    }

    /// Mirrors a remote folder tree into `local_dir`, breadth first.
    pub async fn mirror_folder(
        &mut self,
        folder_id: &str,
        local_dir: &Path,
    ) -> Result<MirrorReport, EngineError> {
        let mut report = MirrorReport::default();
        let mut visited = HashSet::new();
        let mut worklist = VecDeque::from([(
            folder_id.to_string(),
            local_dir.to_path_buf(),
            self.options.max_depth,
        )]);

        while let Some((id, dir, depth)) = worklist.pop_front() {
            if !visited.insert(id.clone()) {
                debug!(folder_id = %id, "folder already mirrored in this run");
                continue;
            }
            info!(folder_id = %id, dir = %dir.display(), "mirroring folder");
            if let Err(err) = self.mirror_folder_documents(&id, &dir, &mut report).await {
                report.record_failure(&id, err);
            }
            if depth == Some(0) {
                continue;
            }
            match self.subfolders(&id).await {
                Ok(folders) => {
                    let names = folder_dir_names(&folders);
                    for folder in folders {
                        if let Some(name) = names.get(&folder.id) {
                            worklist.push_back((
                                folder.id.clone(),
                                dir.join(name),
                                depth.map(|d| d - 1),
                            ));
                        }
                    }
                }
                Err(err) => report.record_failure(&id, err),
            }
        }
        Ok(report)
    }

    /// Mirrors whatever a local path under the drive mount points at: a directory becomes a
    /// folder mirror, a pointer file a single document.
    pub async fn mirror_path(&mut self, local_path: &Path) -> Result<MirrorReport, EngineError> {
        let mount = self
            .options
            .drive_mount
            .clone()
            .ok_or(EngineError::NoDriveMount)?;

        if let Some(kind) = pointer_kind(local_path) {
            let mut report = MirrorReport::default();
            let file = match read_pointer(local_path) {
                Ok(pointer) => {
                    self.drive
                        .fetch_metadata(&pointer.file_id, DOCUMENT_FIELDS)
                        .await?
                }
                Err(PointerError::MissingId) => {
                    let parent = local_path.parent().unwrap_or(mount.as_path());
                    let segments = segments_under(&mount, parent)?;
                    let title = local_path
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .ok_or(PathError::NonUtf8)?;
                    debug!(title, "pointer has no id, looking the document up by title");
                    let (resolution, file) = self
                        .resolver
                        .resolve_leaf(&self.drive, &segments, title, Some(kind))
                        .await?;
                    report.diagnostics.extend(resolution.diagnostics);
                    file
                }
                Err(err) => return Err(err.into()),
            };
            self.mirror_single(&file, &mut report).await;
            return Ok(report);
        }

        let segments = segments_under(&mount, local_path)?;
        let resolution = self.resolver.resolve(&self.drive, &segments).await?;
        let dir = local_dir(
            &self.options.backup_root,
            &self
                .resolver
                .folder_path(&self.drive, &resolution.folder_id)
                .await?,
        );
        let mut report = self.mirror_folder(&resolution.folder_id, &dir).await?;
        let mut diagnostics = resolution.diagnostics;
        diagnostics.append(&mut report.diagnostics);
        report.diagnostics = diagnostics;
        Ok(report)
    }

    /// Mirrors every document whose title contains `title_contains`, anywhere in the drive.
    pub async fn mirror_search(
        &mut self,
        title_contains: &str,
    ) -> Result<MirrorReport, EngineError> {
        let query = ListQuery::everywhere()
            .documents()
            .title_contains(title_contains)
            .modified_within(self.options.modified_after, self.options.modified_before);
        let hits = self.drive.list(&query).await?;
        info!(query = title_contains, hits = hits.len(), "search finished");

        let mut report = MirrorReport::default();
        for file in &hits {
            self.mirror_single(file, &mut report).await;
        }
        Ok(report)
    }

    /// Runs one document through the retention decision, the transfer and the pruning pass.
    pub async fn mirror_document(
        &mut self,
        file: &RemoteFile,
        base_name: &str,
        dir: &Path,
    ) -> Result<DocumentOutcome, EngineError> {
        let kind = file.kind().ok_or_else(|| EngineError::UnsupportedKind {
            id: file.id.clone(),
            mime: file.mime_type.clone(),
        })?;
        let lineage = Lineage {
            dir: dir.to_path_buf(),
            base: base_name.to_string(),
            ext: kind.export_extension().to_string(),
        };
        let plain = lineage.plain_path();
        let plain_mtime = self.fs.modified(&plain).await?;
        let decision = self
            .retention
            .decide(&lineage, file.modified_at, plain_mtime)?;
        info!(
            file_id = %file.id,
            base = base_name,
            decision = decision.label(),
            dry_run = self.fs.is_dry_run(),
            "document decided"
        );

        let Some(target) = decision.target().map(Path::to_path_buf) else {
            return Ok(DocumentOutcome {
                file_id: file.id.clone(),
                base_name: base_name.to_string(),
                decision,
                prune: None,
            });
        };

        // Ask for the export before touching the plain copy, so a refused export changes nothing.
        let stream: ExportStream = if self.fs.is_dry_run() {
            stream::empty().boxed()
        } else {
            self.drive.export(&file.id, kind).await?
        };
        self.fs.create_dir_all(dir).await?;
        if let Decision::BackupThenFetch { backup, .. } = &decision {
            self.fs.rename(&plain, &backup.path).await?;
        }
        let bytes = self.fs.write_export(&target, stream).await?;
        if !self.fs.is_dry_run() {
            info!(file_id = %file.id, target = %target.display(), bytes, "document fetched");
        }
        self.fs.set_modified(&target, file.modified_at).await?;

        let prune = if self.retention.options().policy.is_configured() {
            Some(self.prune(&lineage, &decision).await?)
        } else {
            None
        };
        Ok(DocumentOutcome {
            file_id: file.id.clone(),
            base_name: base_name.to_string(),
            decision,
            prune,
        })
    }

    async fn prune(
        &self,
        lineage: &Lineage,
        decision: &Decision,
    ) -> Result<PrunePlan, EngineError> {
        let mut captures = CaptureSet::discover(&lineage.dir, &lineage.base, &lineage.ext).await?;
        captures.merge(decision.pending_captures());
        let plan = self.retention.plan_prune(captures.into_sorted());
        for capture in &plan.remove {
            if let Err(err) = self.fs.remove_file(&capture.path).await {
                warn!(path = %capture.path.display(), error = %err, "failed to delete capture");
            }
        }
        if !plan.remove.is_empty() {
            info!(
                base = %lineage.base,
                kept = plan.keep.len(),
                removed = plan.remove.len(),
                "pruned captures"
            );
        }
        Ok(plan)
    }

    async fn mirror_folder_documents(
        &mut self,
        folder_id: &str,
        dir: &Path,
        report: &mut MirrorReport,
    ) -> Result<(), EngineError> {
        let documents = self
            .drive
            .list(&ListQuery::children_of(folder_id).documents())
            .await?;
        // Names come from the whole folder so a time window never shifts duplicate suffixes.
        let names = document_base_names(&documents);
        self.sibling_names
            .entry(folder_id.to_string())
            .or_insert_with(|| names.clone());
        let window = self.window();

        for file in documents.iter().filter(|file| window.matches(file)) {
            let Some(base) = names.get(&file.id) else {
                continue;
            };
            match self.mirror_document(file, base, dir).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(err) => report.record_failure(&file.id, err),
            }
        }
        Ok(())
    }

    async fn subfolders(&self, folder_id: &str) -> Result<Vec<RemoteFile>, EngineError> {
        Ok(self
            .drive
            .list(&ListQuery::children_of(folder_id).folders())
            .await?)
    }

    /// A search hit or pointer target: its directory comes from the reverse ancestor walk.
    async fn mirror_single(&mut self, file: &RemoteFile, report: &mut MirrorReport) {
        if let Err(err) = self.try_mirror_single(file, report).await {
            report.record_failure(&file.id, err);
        }
    }

    async fn try_mirror_single(
        &mut self,
        file: &RemoteFile,
        report: &mut MirrorReport,
    ) -> Result<(), EngineError> {
        let segments = self.resolver.ancestor_path(&self.drive, file).await?;
        let dir = local_dir(&self.options.backup_root, &segments);
        let base = self.base_name_of(file).await?;
        let outcome = self.mirror_document(file, &base, &dir).await?;
        report.outcomes.push(outcome);
        Ok(())
    }

    async fn base_name_of(&mut self, file: &RemoteFile) -> Result<String, EngineError> {
        if let Some(parent) = file.parent() {
            if !self.sibling_names.contains_key(parent) {
                let siblings = self
                    .drive
                    .list(&ListQuery::children_of(parent).documents())
                    .await?;
                self.sibling_names
                    .insert(parent.to_string(), document_base_names(&siblings));
            }
            if let Some(base) = self
                .sibling_names
                .get(parent)
                .and_then(|names| names.get(&file.id))
            {
                return Ok(base.clone());
            }
        }
        document_base_names(std::slice::from_ref(file))
            .remove(&file.id)
            .ok_or_else(|| EngineError::UnsupportedKind {
                id: file.id.clone(),
                mime: file.mime_type.clone(),
            })
    }

    fn window(&self) -> ListQuery {
        ListQuery::everywhere()
            .modified_within(self.options.modified_after, self.options.modified_before)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
