use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("{path} is not under the drive mount {mount}")]
    OutsideMount { path: PathBuf, mount: PathBuf },
    #[error("local path contains unsupported component")]
    UnsupportedComponent,
    #[error("local path is not valid UTF-8")]
    NonUtf8,
}

/// Splits `local` into the path segments below the drive `mount`.
pub fn segments_under(mount: &Path, local: &Path) -> Result<Vec<String>, PathError> {
    let relative = local
        .strip_prefix(mount)
        .map_err(|_| PathError::OutsideMount {
            path: local.to_path_buf(),
            mount: mount.to_path_buf(),
        })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                segments.push(part.to_str().ok_or(PathError::NonUtf8)?.to_string())
            }
            Component::CurDir => continue,
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent);
            }
        }
    }
    Ok(segments)
}

/// Local directory for already-sanitized segments under the backup root.
pub fn local_dir(root: &Path, segments: &[String]) -> PathBuf {
    let mut out = root.to_path_buf();
    out.extend(segments);
    out
}
