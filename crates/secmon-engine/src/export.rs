//! # Configuration Export
//!
//! Writes the latest live state of selected pairs to an external sink. The
//! bundled [`JsonDirectorySink`] lays files out as
//! `<root>/<account>/<technology>.json`, each a JSON array of resources
//! ordered by key.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use secmon_core::{ItemRevision, Pair};
use serde::Serialize;

use crate::error::ExportError;

/// One exported resource.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedItem<'a> {
    /// Natural key.
    pub resource_key: &'a str,
    /// Content digest.
    pub digest: &'a str,
    /// When this state was observed.
    pub observed_at: DateTime<Utc>,
    /// The stored representation.
    pub config: &'a serde_json::Value,
}

/// Destination for exported pair state.
pub trait ExportSink: Send + Sync {
    /// Write the live revisions of one pair.
    fn write_pair(&self, pair: &Pair, revisions: &[ItemRevision]) -> Result<(), ExportError>;
}

/// Writes one pretty-printed JSON file per pair under a root directory.
#[derive(Debug, Clone)]
pub struct JsonDirectorySink {
    root: PathBuf,
}

impl JsonDirectorySink {
    /// Export under `root`. Directories are created as needed.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The file a pair is written to.
    pub fn path_for(&self, pair: &Pair) -> PathBuf {
        self.root
            .join(sanitize(&pair.account))
            .join(format!("{}.json", sanitize(&pair.technology)))
    }
}

impl ExportSink for JsonDirectorySink {
    fn write_pair(&self, pair: &Pair, revisions: &[ItemRevision]) -> Result<(), ExportError> {
        let path = self.path_for(pair);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
        }
        let items: Vec<ExportedItem<'_>> = revisions
            .iter()
            .filter(|r| r.is_active())
            .map(|r| ExportedItem {
                resource_key: &r.resource_key,
                digest: &r.digest,
                observed_at: r.observed_at,
                config: &r.config,
            })
            .collect();
        let mut body = serde_json::to_vec_pretty(&items)?;
        body.push(b'\n');
        std::fs::write(&path, body).map_err(|source| io_error(&path, source))?;
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Keep a name usable as one path component.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}
