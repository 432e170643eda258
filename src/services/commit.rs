use crate::config::ExtensionPolicy;
use crate::error::IngestError;
use crate::models::{FileRecord, IngestOutcome};
use crate::services::classifier::MediaKind;
use crate::utils::fs::{MoveKind, move_file};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spellings that name the same format.
const EXTENSION_ALIASES: &[(&str, &str)] = &[
    ("jpg", "jpeg"),
    ("jpe", "jpeg"),
    ("tif", "tiff"),
    ("htm", "html"),
    ("mpg", "mpeg"),
    ("yml", "yaml"),
    ("midi", "mid"),
];

fn same_extension(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
        return true;
    }
    EXTENSION_ALIASES.iter().any(|(x, y)| {
        (a.eq_ignore_ascii_case(x) && b.eq_ignore_ascii_case(y))
            || (a.eq_ignore_ascii_case(y) && b.eq_ignore_ascii_case(x))
    })
}

/// Picks the store extension (without dot) for `record`. Empty means the
/// store file gets no extension.
pub fn select_extension(record: &FileRecord, policy: ExtensionPolicy) -> &str {
    match policy {
        ExtensionPolicy::Original => &record.original_ext,
        ExtensionPolicy::Detected => {
            let detected = MediaKind::new(record.media_type.as_str(), record.media_ext.as_str());
            if detected.extension.is_empty() || detected.is_generic() {
                &record.original_ext
            } else if record.original_ext.is_empty()
                || !same_extension(&record.original_ext, &record.media_ext)
            {
                &record.media_ext
            } else {
                &record.original_ext
            }
        }
    }
}

/// `<store_dir>/<hash_hex>[.<extension>]`
pub fn canonical_path(store_dir: &Path, hash_hex: &str, extension: &str) -> PathBuf {
    if extension.is_empty() {
        store_dir.join(hash_hex)
    } else {
        store_dir.join(format!("{}.{}", hash_hex, extension))
    }
}

/// Final move of identified content into the store.
#[derive(Debug, Clone)]
pub struct Committer {
    store_dir: PathBuf,
    policy: ExtensionPolicy,
    allow_cross_device: bool,
}

impl Committer {
    pub fn new(store_dir: PathBuf, policy: ExtensionPolicy, allow_cross_device: bool) -> Self {
        Self {
            store_dir,
            policy,
            allow_cross_device,
        }
    }

    pub fn canonical_path_for(&self, record: &FileRecord) -> PathBuf {
        canonical_path(
            &self.store_dir,
            &record.hash_hex,
            select_extension(record, self.policy),
        )
    }

    /// Stores the staged file, or discards it when the canonical path is
    /// already taken. Equal digests are treated as equal content.
    pub async fn commit(&self, record: FileRecord) -> Result<IngestOutcome, IngestError> {
        let target = self.canonical_path_for(&record);
        let staged = &record.staged_path;

        let exists = tokio::fs::try_exists(&target)
            .await
            .map_err(|e| IngestError::io(&target, e))?;

        if exists {
            tokio::fs::remove_file(staged)
                .await
                .map_err(|e| IngestError::io(staged, e))?;
            return Ok(IngestOutcome::DuplicateDiscarded {
                hash: record.hash_hex,
                original_name: record.original_name,
                path: target,
            });
        }

        let kind = move_file(staged, &target, self.allow_cross_device)
            .await
            .map_err(|e| IngestError::io(staged, e))?;
        if kind == MoveKind::Copied {
            debug!("{} stored via copy fallback", target.display());
        }

        Ok(IngestOutcome::Stored {
            record,
            path: target,
        })
    }
}

/// Counters reported by the commit stage when it finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    pub stored: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Commit stage: commits records until the input closes or `cancel` fires,
/// publishing each outcome on `out`. A closed outcome channel is ignored.
pub async fn run_commit_stage(
    committer: Committer,
    mut records: mpsc::Receiver<FileRecord>,
    out: mpsc::Sender<IngestOutcome>,
    cancel: CancellationToken,
) -> CommitStats {
    let mut stats = CommitStats::default();

    loop {
        let record = tokio::select! {
            _ = cancel.cancelled() => break,
            r = records.recv() => match r {
                Some(r) => r,
                None => break,
            },
        };

        let name = record.original_name.clone();
        let outcome = match committer.commit(record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("⚠️  Cannot commit {}: {}", name, e);
                stats.failed += 1;
                continue;
            }
        };

        match &outcome {
            IngestOutcome::Stored { record, path } => {
                stats.stored += 1;
                info!(
                    "📦 New file: {} {} {} {} {}",
                    record.original_name,
                    record.size,
                    record.modified,
                    record.media_type,
                    path.display()
                );
            }
            IngestOutcome::DuplicateDiscarded { original_name, path, .. } => {
                stats.duplicates += 1;
                info!(
                    "🔁 Ignoring {} as there's a file with the same hash at {}",
                    original_name,
                    path.display()
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = out.send(outcome) => {
                if sent.is_err() {
                    debug!("No outcome listener");
                }
            }
        }
    }

    stats
}
