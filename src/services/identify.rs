use crate::error::IngestError;
use crate::models::FileRecord;
use crate::services::classifier::MediaClassifier;
use crate::utils::hash::hash_reader;
use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

/// Computes the content hash and media type of staged files.
pub struct Identifier {
    classifier: Arc<dyn MediaClassifier>,
    hash_buffer_size: usize,
    sniff_len: usize,
}

impl Identifier {
    pub fn new(
        classifier: Arc<dyn MediaClassifier>,
        hash_buffer_size: usize,
        sniff_len: usize,
    ) -> Self {
        Self {
            classifier,
            hash_buffer_size,
            sniff_len,
        }
    }

    /// Reads `path` once for the digest, rewinds, and sniffs the leading
    /// `sniff_len` bytes.
    pub async fn identify(&self, path: &Path) -> Result<FileRecord, IngestError> {
        // 1. Stat
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| IngestError::io(path, e))?;
        if meta.is_dir() {
            return Err(IngestError::Directory(path.to_path_buf()));
        }
        let modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .map_err(|e| IngestError::io(path, e))?;

        // 2. Hash the whole file
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| IngestError::io(path, e))?;
        let (hash, size) = hash_reader(&mut file, self.hash_buffer_size)
            .await
            .map_err(|e| IngestError::io(path, e))?;

        // 3. Rewind and sniff
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| IngestError::io(path, e))?;
        let mut prefix = Vec::with_capacity(self.sniff_len.min(size as usize));
        (&mut file)
            .take(self.sniff_len as u64)
            .read_to_end(&mut prefix)
            .await
            .map_err(|e| IngestError::io(path, e))?;

        let kind = self
            .classifier
            .classify(&prefix)
            .map_err(|reason| IngestError::Classify {
                path: path.to_path_buf(),
                reason,
            })?;

        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let original_ext = name_extension(&original_name).to_string();

        Ok(FileRecord {
            original_name,
            original_ext,
            size,
            modified,
            media_type: kind.mime_type,
            media_ext: kind.extension,
            hash,
            hash_hex: hex::encode(hash),
            staged_path: path.to_path_buf(),
        })
    }
}

/// Everything after the last `.` of a file name, so `.bashrc` has the
/// extension `bashrc`. A trailing dot means no extension.
pub fn name_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) => &name[i + 1..],
        None => "",
    }
}

/// Identify stage. Each staged path becomes its own unit of work; at most
/// `workers` units run at once. Every spawned unit is joined before this
/// returns, so the output only closes after the last record was sent.
///
/// Returns the number of units spawned.
pub async fn run_identify_stage(
    identifier: Arc<Identifier>,
    mut input: mpsc::Receiver<PathBuf>,
    out: mpsc::Sender<FileRecord>,
    workers: usize,
    cancel: CancellationToken,
) -> usize {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut units = JoinSet::new();
    let mut spawned = 0;

    loop {
        let path = tokio::select! {
            _ = cancel.cancelled() => break,
            p = input.recv() => match p {
                Some(p) => p,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            p = permits.clone().acquire_owned() => match p {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        while let Some(done) = units.try_join_next() {
            log_join(done);
        }

        let identifier = identifier.clone();
        let out = out.clone();
        let cancel = cancel.clone();
        let span = info_span!("identify", file = %path.display());

        units.spawn(
            async move {
                let _permit = permit;
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(IngestError::Cancelled),
                    r = identifier.identify(&path) => r,
                };

                match result {
                    Ok(record) => {
                        debug!("Identified {} as {}", record.hash_hex, record.media_type);
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            sent = out.send(record) => {
                                if sent.is_err() {
                                    debug!("Commit stage gone, dropping record");
                                }
                            }
                        }
                    }
                    Err(IngestError::Cancelled) => {
                        debug!("Cancelled, file stays in staging");
                    }
                    Err(e) => warn!("⚠️  Dropping {}: {}", path.display(), e),
                }
            }
            .instrument(span),
        );
        spawned += 1;
    }

    // Completion barrier
    while let Some(done) = units.join_next().await {
        log_join(done);
    }

    debug!("Identify stage finished after {} units", spawned);
    spawned
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("❌ Identify unit failed: {}", e);
    }
}
