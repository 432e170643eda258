use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Everything learned about one claimed file. Lives only until the commit
/// decision has been made.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub original_name: String,
    /// Extension without the leading dot, empty when there is none
    pub original_ext: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub media_type: String,
    /// Extension suggested by the media type, empty when unknown
    pub media_ext: String,
    #[serde(skip)]
    pub hash: [u8; 32],
    pub hash_hex: String,
    #[serde(skip)]
    pub staged_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Stored {
        record: FileRecord,
        path: PathBuf,
    },
    DuplicateDiscarded {
        hash: String,
        original_name: String,
        path: PathBuf,
    },
}

impl IngestOutcome {
    pub fn hash_hex(&self) -> &str {
        match self {
            IngestOutcome::Stored { record, .. } => &record.hash_hex,
            IngestOutcome::DuplicateDiscarded { hash, .. } => hash,
        }
    }

    /// Canonical store path the content resolved to.
    pub fn store_path(&self) -> &PathBuf {
        match self {
            IngestOutcome::Stored { path, .. } | IngestOutcome::DuplicateDiscarded { path, .. } => {
                path
            }
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::DuplicateDiscarded { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path, WatchEventKind::Created)
    }

    /// Only creations and content writes make a file a claim candidate.
    pub fn is_candidate(&self) -> bool {
        matches!(self.kind, WatchEventKind::Created | WatchEventKind::Modified)
    }
}
