//! Append-only Markdown digest, one file per run date.
//!
//! Every entry is a blank-line separator, a `## <subject>` heading, and the
//! entry text. The set of headings already in the file is read once when the
//! store is opened and kept up to date as entries are appended, so the
//! "already processed" check is an exact name lookup rather than a scan.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info};

const HEADING_PREFIX: &str = "## ";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// How [`OutputStore::append`] opened the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The file did not exist and was created by this write.
    Create,
    Append,
}

/// `thought_leaders_<YYYYMMDD>.md`
pub fn output_filename(date: NaiveDate) -> String {
    format!("thought_leaders_{}.md", date.format("%Y%m%d"))
}

/// The text written for one entry.
pub fn render_entry(subject: &str, text: &str) -> String {
    format!("\n\n{HEADING_PREFIX}{subject}\n{text}")
}

/// Subject names of every level-2 heading in `document`.
pub fn parse_headings(document: &str) -> HashSet<String> {
    document
        .lines()
        .filter_map(|line| line.strip_prefix(HEADING_PREFIX))
        .map(|name| name.trim_end().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

#[derive(Debug)]
pub struct OutputStore {
    path: PathBuf,
    processed: HashSet<String>,
}

impl OutputStore {
    /// Open the document for `date` inside `dir`.
    pub fn open(dir: impl AsRef<Path>, date: NaiveDate) -> Result<Self, StoreError> {
        Self::at_path(dir.as_ref().join(output_filename(date)))
    }

    /// Open a document at an explicit path, indexing its existing headings.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let processed = match std::fs::read_to_string(&path) {
            Ok(document) => parse_headings(&document),
            Err(e) if e.kind() == ErrorKind::NotFound => HashSet::new(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        debug!(
            "Opened {} ({} existing entries)",
            path.display(),
            processed.len()
        );
        Ok(Self { path, processed })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of subjects with a heading in the document.
    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Whether the document exists and has a `## <subject>` heading.
    pub fn exists(&self, subject: &str) -> bool {
        self.processed.contains(subject) && self.path.exists()
    }

    /// Append one entry, creating the document if needed.
    pub fn append(&mut self, subject: &str, text: &str) -> Result<WriteMode, StoreError> {
        let mode = if self.path.exists() {
            WriteMode::Append
        } else {
            WriteMode::Create
        };

        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(render_entry(subject, text).as_bytes())
            .map_err(write_err)?;
        file.flush().map_err(write_err)?;

        self.processed.insert(subject.to_string());
        info!("Results appended to {}", self.path.display());
        Ok(mode)
    }
}
