//! Registers patchkit's postinstall hook in a `package.json`, editing the
//! file as a generic `serde_json::Value` rather than a fixed-schema struct
//! since `package.json` is a third-party file whose other fields must
//! round-trip untouched.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::Path;

const HOOK_COMMAND: &str = "patchkit apply";

/// Ensure `scripts.postinstall` in the `package.json` at `path` runs
/// `patchkit apply`. Idempotent: if the hook is already present, the file
/// is left untouched and `Ok(false)` is returned. Any existing postinstall
/// command is preserved and chained with `&&`.
pub fn install_postinstall_hook(path: &Path) -> Result<bool> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut doc: Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    let root = doc
        .as_object_mut()
        .ok_or_else(|| anyhow!("{} is not a JSON object", path.display()))?;

    let scripts = root
        .entry("scripts")
        .or_insert_with(|| Value::Object(Default::default()))
        .as_object_mut()
        .ok_or_else(|| anyhow!("{}: \"scripts\" is not an object", path.display()))?;

    let existing = scripts.get("postinstall").and_then(Value::as_str);
    if let Some(existing) = existing {
        if contains_hook(existing) {
            return Ok(false);
        }
    }

    let updated = match existing {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{existing} && {HOOK_COMMAND}")
        }
        _ => HOOK_COMMAND.to_string(),
    };
    scripts.insert("postinstall".to_string(), Value::String(updated));

    let mut json = serde_json::to_string_pretty(&doc)?;
    json.push('\n');
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(true)
}

fn contains_hook(script: &str) -> bool {
    script
        .split("&&")
        .any(|segment| segment.trim() == HOOK_COMMAND)
}
