/*!
 * Archive writer: retire routed originals into the archive folder
 *
 * Files are moved with a single rename, so a failure leaves the source where
 * it was. A name already present in the archive gets one retry with a
 * second-resolution timestamp between stem and extension; a second
 * collision within the same second is reported as an error.
 */

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::error::{RouterError, Result};

/// Timestamp format inserted on archive name collisions
pub const COLLISION_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Move `source` into `archive_dir`, returning the final archive path
pub fn archive_file(source: &Path, archive_dir: &Path) -> Result<PathBuf> {
    archive_file_at(source, archive_dir, Local::now())
}

/// Same as [`archive_file`] with an explicit clock for the collision suffix
pub fn archive_file_at(source: &Path, archive_dir: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| RouterError::InvalidPath(source.to_path_buf()))?;

    if !source.is_file() {
        return Err(RouterError::SourceNotFound(source.to_path_buf()));
    }

    fs::create_dir_all(archive_dir)?;

    let mut target = archive_dir.join(file_name);
    if occupied(&target) {
        let renamed = archive_dir.join(timestamped_name(file_name, now));
        debug!(
            taken = %target.display(),
            retry = %renamed.display(),
            "archive name taken, retrying with timestamp"
        );
        if occupied(&renamed) {
            return Err(RouterError::ArchiveCollision(renamed));
        }
        target = renamed;
    }

    fs::rename(source, &target)?;
    Ok(target)
}

/// `<stem>_<yyyyMMdd_HHmmss><.ext>`
pub fn timestamped_name(file_name: &OsStr, now: DateTime<Local>) -> OsString {
    let as_path = Path::new(file_name);
    let stem = as_path.file_stem().unwrap_or(file_name);

    let mut name = OsString::from(stem);
    name.push("_");
    name.push(now.format(COLLISION_TIMESTAMP_FORMAT).to_string());
    if let Some(ext) = as_path.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}

fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
