use super::variant::CameraVariant;
use crate::error::Result;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const AF_ALGORITHM: &str = "rpi.af";

/// Narrow the macro focus range and slow the normal scan so close-up
/// subjects settle reliably.
///
/// Returns `true` when the tuning actually carried an autofocus algorithm.
pub fn patch_autofocus(tuning: &mut Value) -> bool {
    let Some(algo) = find_algorithm(tuning, AF_ALGORITHM) else {
        return false;
    };

    if let Some(ranges) = algo.get_mut("ranges").and_then(Value::as_object_mut) {
        ranges.insert(
            "macro".to_string(),
            json!({ "min": 7.0, "max": 15.0, "default": 8.0 }),
        );
    }

    if let Some(normal) = algo
        .get_mut("speeds")
        .and_then(|speeds| speeds.get_mut("normal"))
        .and_then(Value::as_object_mut)
    {
        normal.insert("step_coarse".to_string(), json!(0.5));
        normal.insert("step_fine".to_string(), json!(0.1));
    }

    true
}

/// Locate an algorithm block in a version 2 tuning file, falling back to
/// the flat version 1 layout.
fn find_algorithm<'a>(tuning: &'a mut Value, name: &str) -> Option<&'a mut Value> {
    let has_list = tuning
        .get("algorithms")
        .map(Value::is_array)
        .unwrap_or(false);

    if has_list {
        tuning
            .get_mut("algorithms")
            .and_then(Value::as_array_mut)?
            .iter_mut()
            .find_map(|entry| entry.get_mut(name))
    } else {
        tuning.get_mut(name)
    }
}

/// Write a patched copy of the variant's tuning file into `staging_dir`.
///
/// A missing or unreadable tuning file is not fatal; the driver then runs
/// with its built-in tuning.
pub async fn prepare_tuning_file(
    variant: CameraVariant,
    tuning_dir: &Path,
    staging_dir: &Path,
) -> Result<Option<PathBuf>> {
    let source = tuning_dir.join(variant.tuning_file());

    let text = match tokio::fs::read_to_string(&source).await {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "Tuning file {} unavailable ({}), using driver defaults",
                source.display(),
                e
            );
            return Ok(None);
        }
    };

    let mut tuning: Value = match serde_json::from_str(&text) {
        Ok(tuning) => tuning,
        Err(e) => {
            warn!("Tuning file {} is not valid JSON: {}", source.display(), e);
            return Ok(None);
        }
    };

    if !patch_autofocus(&mut tuning) {
        debug!("{} has no {} block", source.display(), AF_ALGORITHM);
    }

    tokio::fs::create_dir_all(staging_dir).await?;
    let target = staging_dir.join(variant.tuning_file());
    tokio::fs::write(&target, serde_json::to_vec_pretty(&tuning)?).await?;

    info!("Prepared tuning file {}", target.display());
    Ok(Some(target))
}
