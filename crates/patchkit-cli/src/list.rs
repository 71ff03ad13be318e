//! Read-only manifest views: list every patched package, optionally
//! filtered to keys containing a query substring. A direct manifest query,
//! since there's no daemon to ask.

use patchkit_core::manifest::Manifest;

pub struct PatchSummary {
    pub package_key: String,
    pub file_count: usize,
    pub description: String,
    pub tier: String,
}

/// Every patch record in `manifest`, optionally filtered to keys whose
/// package-key contains `query` (case-insensitive substring match).
pub fn list_patches(manifest: &Manifest, query: Option<&str>) -> Vec<PatchSummary> {
    let query = query.map(str::to_lowercase);
    let mut summaries: Vec<PatchSummary> = manifest
        .patches()
        .iter()
        .filter(|(key, _)| match &query {
            Some(q) => key.to_lowercase().contains(q.as_str()),
            None => true,
        })
        .map(|(key, record)| PatchSummary {
            package_key: key.clone(),
            file_count: record.files.len(),
            description: record.description.clone(),
            tier: record.tier.clone(),
        })
        .collect();
    summaries.sort_by(|a, b| a.package_key.cmp(&b.package_key));
    summaries
}
