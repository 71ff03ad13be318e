//! Patch engine core: content-addressed blob store backed by a manifest,
//! and a verify-apply-rollback state machine that swaps file contents
//! atomically. A package directory is always in one of two known states
//! (original or patched), never a corrupt intermediate.

pub mod apply;
pub mod blob_store;
pub mod digest;
pub mod error;
pub mod gc;
pub mod manifest;
pub mod orchestrator;
pub mod provider;
pub mod repair;
pub mod rollback;
pub mod safety;
pub mod verifier;

pub use digest::Digest;
pub use error::PatchKitError;
pub use manifest::{Manifest, PackageKey, PatchRecord};
