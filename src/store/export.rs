use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreSnapshot;
use crate::error::ArchiveError;
use crate::model::{Hostname, PairCounter, PairRecord, TestSession};

/// Downloadable package of one session's data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportBundle {
    pub test_name: String,
    pub exported_at: DateTime<Utc>,
    pub session: TestSession,
    /// source → dest → counters
    pub results: BTreeMap<Hostname, BTreeMap<Hostname, PairCounter>>,
    /// source → dest → history and traces
    pub pairs: BTreeMap<Hostname, BTreeMap<Hostname, PairRecord>>,
}

impl ExportBundle {
    pub fn from_snapshot(test_name: &str, exported_at: DateTime<Utc>, snapshot: &StoreSnapshot) -> Self {
        Self {
            test_name: test_name.to_string(),
            exported_at,
            session: snapshot.session.clone(),
            results: snapshot.matrix(),
            pairs: snapshot.pairs.clone(),
        }
    }
}

/// `{test_name}.json`, with anything outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn generate_filename(test_name: &str) -> String {
    let stem: String = test_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "export.json".to_string()
    } else {
        format!("{}.json", stem)
    }
}

/// Write a bundle into `dir`, creating it if needed.
pub fn save_bundle(dir: &Path, bundle: &ExportBundle) -> Result<PathBuf, ArchiveError> {
    let content = serde_json::to_string_pretty(bundle)?;

    fs::create_dir_all(dir).map_err(|source| ArchiveError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let path = dir.join(generate_filename(&bundle.test_name));
    fs::write(&path, content).map_err(|source| ArchiveError::Io {
        path: path.display().to_string(),
        source,
    })?;

    Ok(path)
}

pub fn load_bundle(path: &Path) -> Result<ExportBundle, ArchiveError> {
    let content = fs::read_to_string(path).map_err(|source| ArchiveError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
