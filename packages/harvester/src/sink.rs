//! Persistence of harvested records.
//!
//! Records are stored per category as a JSON array. Appending merges by
//! identifier, so a re-run refreshes records without losing annotations.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Category;
use crate::error::Result;
use crate::types::{ItemIdentifier, Record};

/// Destination for a run's records.
pub trait ResultSink {
    /// Store records for a category, returning where they were written.
    fn append(&mut self, category: &Category, records: &[Record]) -> Result<PathBuf>;
}

/// Writes `<output_dir>/<category>_policies.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    output_dir: PathBuf,
}

impl JsonFileSink {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// File a category's records are written to.
    #[must_use]
    pub fn path_for(&self, category: &Category) -> PathBuf {
        self.output_dir.join(format!("{category}_policies.json"))
    }
}

impl ResultSink for JsonFileSink {
    fn append(&mut self, category: &Category, records: &[Record]) -> Result<PathBuf> {
        let path = self.path_for(category);
        let existing = load_records(&path)?;
        let merged = merge_records(existing, records);
        save_records(&path, &merged)?;

        tracing::info!(
            category = %category,
            written = records.len(),
            total = merged.len(),
            path = %path.display(),
            "Saved records"
        );
        Ok(path)
    }
}

/// Merge incoming records into existing ones by identifier.
///
/// Existing order is kept and new identifiers are appended. An updated
/// record keeps the annotations already stored for it.
#[must_use]
pub fn merge_records(existing: Vec<Record>, incoming: &[Record]) -> Vec<Record> {
    let mut merged = existing;
    let mut index: HashMap<ItemIdentifier, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, r)| (r.identifier.clone(), i))
        .collect();

    for record in incoming {
        match index.get(&record.identifier) {
            Some(&i) => {
                let mut updated = record.clone();
                if updated.annotations.is_empty() {
                    updated.annotations = std::mem::take(&mut merged[i].annotations);
                }
                merged[i] = updated;
            }
            None => {
                index.insert(record.identifier.clone(), merged.len());
                merged.push(record.clone());
            }
        }
    }

    merged
}

/// Load records from a JSON file. A missing file yields no records.
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write records as pretty JSON.
///
/// Writes to a temp file, syncs, then renames over the target so a crash
/// never leaves a truncated file.
pub fn save_records(path: &Path, records: &[Record]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_file = path.with_file_name(format!(".{file_name}.tmp"));

    let content = serde_json::to_string_pretty(records)?;
    {
        let mut file = File::create(&temp_file)?;
        file.write_all(content.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }

    #[cfg(target_os = "windows")]
    if path.exists() {
        fs::remove_file(path)?;
    }

    fs::rename(&temp_file, path)?;
    Ok(())
}
