use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::{Duration, OffsetDateTime};

use super::captures::Capture;
use super::naming::{StampError, capture_file_name, plain_file_name};

/// Local and remote modification times this close together count as the same version.
pub const MTIME_TOLERANCE: Duration = Duration::seconds(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetentionError {
    #[error("retention count for {policy} must be at least 1")]
    ZeroCount { policy: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    #[default]
    None,
    NewestN(usize),
    Staggered(usize),
}

impl RetentionPolicy {
    /// NewestN wins when both counts are configured.
    pub fn select(
        keep_newest: Option<usize>,
        staggered: Option<usize>,
    ) -> Result<Self, RetentionError> {
        match (keep_newest, staggered) {
            (Some(0), _) => Err(RetentionError::ZeroCount {
                policy: "keep-newest",
            }),
            (Some(n), _) => Ok(Self::NewestN(n)),
            (None, Some(0)) => Err(RetentionError::ZeroCount {
                policy: "staggered",
            }),
            (None, Some(n)) => Ok(Self::Staggered(n)),
            (None, None) => Ok(Self::None),
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    NoLocalCopy,
    LiveCopyCurrent,
    LiveCopyStale,
}

impl LocalState {
    pub fn classify(plain_mtime: Option<OffsetDateTime>, remote_modified: OffsetDateTime) -> Self {
        match plain_mtime {
            None => Self::NoLocalCopy,
            Some(local) if (local - remote_modified).abs() <= MTIME_TOLERANCE => {
                Self::LiveCopyCurrent
            }
            Some(_) => Self::LiveCopyStale,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoClobber,
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    /// `capture_at` is set when the target itself is a timestamped capture.
    Fetch {
        target: PathBuf,
        capture_at: Option<OffsetDateTime>,
    },
    BackupThenFetch {
        backup: Capture,
        target: PathBuf,
    },
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Skip(_) => "skip",
            Decision::Fetch { .. } => "fetch",
            Decision::BackupThenFetch { .. } => "rename+fetch",
        }
    }

    pub fn target(&self) -> Option<&Path> {
        match self {
            Decision::Skip(_) => None,
            Decision::Fetch { target, .. } | Decision::BackupThenFetch { target, .. } => {
                Some(target)
            }
        }
    }

    /// Captures this decision creates once carried out.
    pub fn pending_captures(&self) -> Vec<Capture> {
        match self {
            Decision::Skip(_) => Vec::new(),
            Decision::Fetch {
                target,
                capture_at: Some(at),
            } => vec![Capture::new(target.clone(), *at)],
            Decision::Fetch { .. } => Vec::new(),
            Decision::BackupThenFetch { backup, .. } => vec![backup.clone()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionOptions {
    pub no_clobber: bool,
    pub timestamped: bool,
    pub policy: RetentionPolicy,
}

/// Where one document's files live and what they are called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub dir: PathBuf,
    pub base: String,
    pub ext: String,
}

impl Lineage {
    pub fn plain_path(&self) -> PathBuf {
        self.dir.join(plain_file_name(&self.base, &self.ext))
    }

    pub fn capture_path(&self, at: OffsetDateTime) -> Result<PathBuf, StampError> {
        Ok(self.dir.join(capture_file_name(&self.base, at, &self.ext)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrunePlan {
    pub keep: Vec<Capture>,
    pub remove: Vec<Capture>,
}

/// The pure half of the retention engine: it never touches the disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionEngine {
    options: RetentionOptions,
}

impl RetentionEngine {
    pub fn new(options: RetentionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RetentionOptions {
        &self.options
    }

    /// `plain_mtime` is the modification time of the plain copy, `None` when it is absent.
    pub fn decide(
        &self,
        lineage: &Lineage,
        remote_modified: OffsetDateTime,
        plain_mtime: Option<OffsetDateTime>,
    ) -> Result<Decision, StampError> {
        if self.options.timestamped {
            return Ok(Decision::Fetch {
                target: lineage.capture_path(remote_modified)?,
                capture_at: Some(remote_modified),
            });
        }

        let target = lineage.plain_path();
        if plain_mtime.is_some() && self.options.no_clobber {
            return Ok(Decision::Skip(SkipReason::NoClobber));
        }
        match LocalState::classify(plain_mtime, remote_modified) {
            LocalState::LiveCopyCurrent => Ok(Decision::Skip(SkipReason::UpToDate)),
            // Stamped with the remote time, never the local mtime, which may be wall-clock.
            LocalState::LiveCopyStale => Ok(Decision::BackupThenFetch {
                backup: Capture::new(lineage.capture_path(remote_modified)?, remote_modified),
                target,
            }),
            LocalState::NoLocalCopy => Ok(Decision::Fetch {
                target,
                capture_at: None,
            }),
        }
    }

    pub fn plan_prune(&self, captures: Vec<Capture>) -> PrunePlan {
        plan_prune(captures, self.options.policy)
    }
}

/// Splits `captures` (oldest first) into the ones `policy` keeps and the ones it removes.
pub fn plan_prune(captures: Vec<Capture>, policy: RetentionPolicy) -> PrunePlan {
    let m = captures.len();
    let kept: BTreeSet<usize> = match policy {
        RetentionPolicy::None => (0..m).collect(),
        RetentionPolicy::NewestN(n) => newest_indices(&captures, n),
        RetentionPolicy::Staggered(n) => staggered_indices(m, n),
    };

    let mut plan = PrunePlan::default();
    for (index, capture) in captures.into_iter().enumerate() {
        if kept.contains(&index) {
            plan.keep.push(capture);
        } else {
            plan.remove.push(capture);
        }
    }
    plan
}

/// Keeps everything at least as new as the n-th newest timestamp, so ties survive together.
fn newest_indices(captures: &[Capture], n: usize) -> BTreeSet<usize> {
    let m = captures.len();
    if n == 0 {
        return BTreeSet::new();
    }
    if m <= n {
        return (0..m).collect();
    }
    let threshold = captures[m - n].taken_at;
    (0..m)
        .filter(|&i| captures[i].taken_at >= threshold)
        .collect()
}

/// Indices into the oldest-first captures kept by `Staggered(n)`.
///
/// The oldest and newest are always kept; interior index `i` of `n - 2` is
/// `round(exp(ln(m - 1) * i / (n - 1)))`.
pub fn staggered_indices(m: usize, n: usize) -> BTreeSet<usize> {
    if m == 0 || n == 0 {
        return BTreeSet::new();
    }
    let last = m - 1;
    if n == 1 {
        return BTreeSet::from([last]);
    }
    if m <= n {
        return (0..m).collect();
    }
    let span = (last as f64).ln();
    let mut kept = BTreeSet::from([0, last]);
    for i in 1..=n - 2 {
        let idx = (span * i as f64 / (n - 1) as f64).exp().round() as usize;
        kept.insert(idx.min(last));
    }
    kept
}
