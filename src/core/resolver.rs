/*!
 * Destination folder resolution
 */

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Find the destination folder for `key` under `destination_root`.
///
/// The direct join `destination_root/key` is tried first. When that is not a
/// directory, the immediate subfolders of the root are scanned for one whose
/// name equals `key` exactly. `None` means no folder exists for the key.
pub fn resolve_destination(key: &str, destination_root: &Path) -> Option<PathBuf> {
    let direct = destination_root.join(key);
    if direct.is_dir() {
        return Some(direct);
    }

    debug!(
        key,
        root = %destination_root.display(),
        "no direct destination folder, scanning subfolders"
    );
    scan_subfolders(key, destination_root)
}

fn scan_subfolders(key: &str, destination_root: &Path) -> Option<PathBuf> {
    let entries = match fs::read_dir(destination_root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                root = %destination_root.display(),
                "cannot list destination root: {}", e
            );
            return None;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .find(|entry| entry.file_name().as_os_str() == OsStr::new(key))
        .map(|entry| entry.path())
}
