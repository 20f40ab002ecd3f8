use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::sync::engine::EngineOptions;
use crate::sync::resolver::{
    AmbiguityPolicy, DEFAULT_PERSONAL_ROOT, DEFAULT_SHORTCUT_MARKER, ResolverOptions,
};
use crate::sync::retention::{RetentionOptions, RetentionPolicy};

pub const DEFAULT_BACKUP_DIR_NAME: &str = "Google Docs Backup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    pub backup_dir: PathBuf,
    pub drive_mount: Option<PathBuf>,
    pub keep_newest: Option<usize>,
    pub staggered: Option<usize>,
    pub no_clobber: bool,
    pub timestamped: bool,
    pub dry_run: bool,
    pub max_depth: Option<usize>,
    pub personal_root: String,
    pub shortcut_marker: String,
    pub modified_after: Option<OffsetDateTime>,
    pub modified_before: Option<OffsetDateTime>,
    pub ambiguity: AmbiguityPolicy,
}

impl BackupConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        Self::from_lookup(&home, |name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(home: &Path, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let backup_dir = var("GDOCS_BACKUP_DIR")
            .map(|value| expand_with_home(&value, home))
            .unwrap_or_else(|| home.join(DEFAULT_BACKUP_DIR_NAME));
        let drive_mount = var("GDOCS_DRIVE_MOUNT").map(|value| expand_with_home(&value, home));
        let ambiguity = match var("GDOCS_AMBIGUOUS").as_deref() {
            None => AmbiguityPolicy::default(),
            Some(value) => parse_ambiguity(value)?,
        };

        Ok(Self {
            backup_dir,
            drive_mount,
            keep_newest: read_count(&var, "GDOCS_KEEP_NEWEST")?,
            staggered: read_count(&var, "GDOCS_STAGGERED")?,
            no_clobber: read_bool(&var, "GDOCS_NO_CLOBBER", false),
            timestamped: read_bool(&var, "GDOCS_TIMESTAMPED", false),
            dry_run: read_bool(&var, "GDOCS_DRY_RUN", false),
            max_depth: read_count(&var, "GDOCS_MAX_DEPTH")?,
            personal_root: var("GDOCS_PERSONAL_ROOT")
                .unwrap_or_else(|| DEFAULT_PERSONAL_ROOT.to_string()),
            shortcut_marker: var("GDOCS_SHORTCUT_MARKER")
                .unwrap_or_else(|| DEFAULT_SHORTCUT_MARKER.to_string()),
            modified_after: read_time(&var, "GDOCS_MODIFIED_AFTER")?,
            modified_before: read_time(&var, "GDOCS_MODIFIED_BEFORE")?,
            ambiguity,
        })
    }

    pub fn retention_policy(&self) -> anyhow::Result<RetentionPolicy> {
        Ok(RetentionPolicy::select(self.keep_newest, self.staggered)?)
    }

    pub fn engine_options(&self) -> anyhow::Result<EngineOptions> {
        Ok(EngineOptions {
            backup_root: self.backup_dir.clone(),
            drive_mount: self.drive_mount.clone(),
            max_depth: self.max_depth,
            modified_after: self.modified_after,
            modified_before: self.modified_before,
            dry_run: self.dry_run,
            retention: RetentionOptions {
                no_clobber: self.no_clobber,
                timestamped: self.timestamped,
                policy: self.retention_policy()?,
            },
            resolver: ResolverOptions {
                personal_root_name: self.personal_root.clone(),
                shortcut_marker: self.shortcut_marker.clone(),
                ambiguity: self.ambiguity,
                ..ResolverOptions::default()
            },
        })
    }
}

pub fn parse_ambiguity(value: &str) -> anyhow::Result<AmbiguityPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "first" => Ok(AmbiguityPolicy::FirstListed),
        "reject" => Ok(AmbiguityPolicy::Reject),
        other => bail!("unknown ambiguity policy {other:?}, expected \"first\" or \"reject\""),
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_count(var: impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<usize>> {
    var(name)
        .map(|value| {
            value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{name} must be a non-negative integer, got {value:?}"))
        })
        .transpose()
}

fn read_bool(var: impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    var(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn read_time(
    var: impl Fn(&str) -> Option<String>,
    name: &str,
) -> anyhow::Result<Option<OffsetDateTime>> {
    var(name)
        .map(|value| {
            OffsetDateTime::parse(value.trim(), &Rfc3339)
                .with_context(|| format!("{name} must be an RFC 3339 timestamp, got {value:?}"))
        })
        .transpose()
}
