//! On-disk placement of adapter stores.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{StoreError, StoreResult};

/// Resolve the path of a store named `name`.
///
/// With a configured directory the store lives inside it. Otherwise a
/// scratch directory is created on first use and kept in `scratch`, so data
/// survives between runs of the same adapter and is removed when the
/// adapter is dropped.
pub(crate) fn resolve(
    data_dir: Option<&Path>,
    scratch: &mut Option<TempDir>,
    name: &str,
) -> StoreResult<PathBuf> {
    if let Some(dir) = data_dir {
        std::fs::create_dir_all(dir)?;
        return Ok(dir.join(name));
    }

    if scratch.is_none() {
        *scratch = Some(tempfile::tempdir()?);
    }
    match scratch {
        Some(dir) => Ok(dir.path().join(name)),
        None => Err(StoreError::NotOpen),
    }
}
