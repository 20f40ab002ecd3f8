use std::path::Path;

use tracing::{info, warn};

use crate::sync::captures::{CaptureError, CaptureSet, discover_groups};
use crate::sync::local_fs::LocalFs;
use crate::sync::retention::{PrunePlan, RetentionPolicy, plan_prune};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineagePrune {
    pub base: String,
    pub ext: String,
    pub plan: PrunePlan,
}

/// Applies `policy` to captures already on disk, without contacting the drive. `lineage`
/// restricts the pass to one `(base, ext)`; otherwise every lineage in `dir` is pruned.
pub async fn prune_directory(
    dir: &Path,
    lineage: Option<(&str, &str)>,
    policy: RetentionPolicy,
    fs: &LocalFs,
) -> Result<Vec<LineagePrune>, CaptureError> {
    let groups = match lineage {
        Some((base, ext)) => vec![(base.to_string(), ext.to_string())],
        None => discover_groups(dir).await?,
    };

    let mut results = Vec::with_capacity(groups.len());
    for (base, ext) in groups {
        let captures = CaptureSet::discover(dir, &base, &ext).await?;
        let plan = plan_prune(captures.into_sorted(), policy);
        for capture in &plan.remove {
            if let Err(err) = fs.remove_file(&capture.path).await {
                warn!(path = %capture.path.display(), error = %err, "failed to delete capture");
            }
        }
        info!(
            base = %base,
            ext = %ext,
            kept = plan.keep.len(),
            removed = plan.remove.len(),
            dry_run = fs.is_dry_run(),
            "lineage pruned"
        );
        results.push(LineagePrune { base, ext, plan });
    }
    Ok(results)
}
