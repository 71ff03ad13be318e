use crate::verifier::FileStatus;
use std::path::PathBuf;

/// Typed error surface for the patch engine. The CLI and provider crates
/// wrap these in `anyhow::Error` at their own boundaries; inside the core
/// every fallible engine operation returns `Result<_, PatchKitError>` so
/// callers can match on recoverability.
#[derive(Debug, thiserror::Error)]
pub enum PatchKitError {
    #[error("manifest not found at {0}")]
    ManifestNotFound(PathBuf),

    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("blob unavailable: {0}")]
    BlobUnavailable(String),

    #[error("blob corrupted at {path}: expected {expected}, got {actual}")]
    IntegrityError {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("unsafe state for {path}: {status:?}")]
    UnsafeState { path: PathBuf, status: FileStatus },

    #[error("missing beforeHash blob {0}; re-download the patch")]
    MissingBeforeBlob(String),

    #[error("symlink escape detected: {0} resolves outside its expected parent directory")]
    PathEscape(PathBuf),

    #[error("insufficient disk space in {dir}: need {needed} bytes, only {available} available")]
    InsufficientDiskSpace {
        dir: PathBuf,
        needed: u64,
        available: u64,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, PatchKitError>;
