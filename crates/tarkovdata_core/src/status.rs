use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use walkdir::WalkDir;

use crate::runtime::{ResolvedPaths, normalize_for_display};
use crate::store::compute_hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetShape {
    Object,
    Array,
    Scalar,
    /// The file did not parse; the message is kept for display.
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub relative_path: String,
    pub shape: DatasetShape,
    pub entries: usize,
    pub bytes: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub data_dir_exists: bool,
    pub export_dir_exists: bool,
    pub config_exists: bool,
    pub datasets: Vec<DatasetSummary>,
}

/// Every `*.json` under the data directory, sorted by relative path. Unparseable files are
/// listed as invalid instead of failing the scan.
pub fn scan_datasets(paths: &ResolvedPaths) -> Result<StatusReport> {
    let mut datasets = Vec::new();
    if paths.data_dir.exists() {
        for entry in WalkDir::new(&paths.data_dir).follow_links(false) {
            let entry = entry
                .with_context(|| format!("failed to walk {}", paths.data_dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            datasets.push(summarize(&paths.data_dir, path)?);
        }
    }
    datasets.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));

    Ok(StatusReport {
        data_dir_exists: paths.data_dir.exists(),
        export_dir_exists: paths.export_dir.exists(),
        config_exists: paths.config_path.exists(),
        datasets,
    })
}

fn summarize(base: &Path, path: &Path) -> Result<DatasetSummary> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let relative = path.strip_prefix(base).unwrap_or(path);
    let (shape, entries) = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => (DatasetShape::Object, map.len()),
        Ok(Value::Array(items)) => (DatasetShape::Array, items.len()),
        Ok(_) => (DatasetShape::Scalar, 1),
        Err(error) => (DatasetShape::Invalid(error.to_string()), 0),
    };
    Ok(DatasetSummary {
        relative_path: normalize_for_display(relative),
        shape,
        entries,
        bytes: bytes.len() as u64,
        hash: compute_hash(&bytes),
    })
}
