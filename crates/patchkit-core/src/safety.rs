//! Pre-write safety checks shared by the apply and rollback engines: a
//! symlink-escape guard and a disk-space preflight, run immediately before
//! every staged write.

use crate::error::{PatchKitError, Result};
use std::path::Path;
use tracing::warn;

const MIN_FREE_SPACE_BYTES: u64 = 16 * 1024 * 1024;

/// Reject writing to `target` if its parent directory resolves (through
/// symlinks) outside of itself, or if `target` already exists but resolves
/// outside its own parent once symlinks are followed. A non-existent parent
/// is not yet a risk; the caller creates it before writing.
pub fn validate_no_symlink_escape(target: &Path) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| PatchKitError::PathEscape(target.to_path_buf()))?;

    if !parent.exists() {
        return Ok(());
    }

    let canonical_parent = parent.canonicalize()?;

    if target.exists() {
        let canonical_target = target.canonicalize()?;
        let resolved_parent = canonical_target
            .parent()
            .ok_or_else(|| PatchKitError::PathEscape(target.to_path_buf()))?;
        if resolved_parent != canonical_parent {
            return Err(PatchKitError::PathEscape(target.to_path_buf()));
        }
    }

    Ok(())
}

/// Best-effort free-space check before writing `needed` bytes under `dir`.
/// A `statvfs` failure is logged and ignored rather than treated as fatal,
/// since it is advisory, not part of the write's correctness.
pub fn check_disk_space(dir: &Path, needed: u64) -> Result<()> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::mem::MaybeUninit;

        let c_path = match CString::new(dir.to_string_lossy().as_bytes()) {
            Ok(c) => c,
            Err(_) => return Ok(()),
        };
        let mut stat = MaybeUninit::<libc::statvfs>::uninit();
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
        if ret == 0 {
            let stat = unsafe { stat.assume_init() };
            let available = stat.f_bavail as u64 * stat.f_frsize as u64;
            let required = needed + MIN_FREE_SPACE_BYTES;
            if available < required {
                return Err(PatchKitError::InsufficientDiskSpace {
                    dir: dir.to_path_buf(),
                    needed: required,
                    available,
                });
            }
        } else {
            warn!(dir = %dir.display(), "statvfs failed; skipping disk space check");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (dir, needed);
    }
    Ok(())
}
