use crate::error::IngestError;
use crate::utils::fs::{is_temp_name, list_files};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters reported by the claim stage when it finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClaimStats {
    pub recovered: usize,
    pub claimed: usize,
    pub skipped: usize,
}

/// Moves `candidate` into `staging_dir` under its own basename.
///
/// The rename is the ownership transfer: when several callers race for the
/// same source at most one rename succeeds. A target that already exists
/// means someone claimed the name first.
pub async fn claim(candidate: &Path, staging_dir: &Path) -> Result<PathBuf, IngestError> {
    let name = candidate.file_name().ok_or_else(|| IngestError::Io {
        path: candidate.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
    })?;
    let target = staging_dir.join(name);

    if tokio::fs::try_exists(&target)
        .await
        .map_err(|e| IngestError::io(&target, e))?
    {
        return Err(IngestError::AlreadyClaimed(target));
    }

    tokio::fs::rename(candidate, &target)
        .await
        .map_err(|e| IngestError::io(candidate, e))?;

    Ok(target)
}

/// Sends every file left in `staging_dir` downstream, as if it had just been
/// claimed. Returns how many were handed over.
pub async fn recover_staged(
    staging_dir: &Path,
    out: &mpsc::Sender<PathBuf>,
    cancel: &CancellationToken,
) -> usize {
    let leftovers = match list_files(staging_dir).await {
        Ok(paths) => paths,
        Err(e) => {
            warn!(
                "⚠️  Cannot list staging directory {}: {}",
                staging_dir.display(),
                e
            );
            return 0;
        }
    };

    info!(
        "♻️  Handling initially {} files from directory {}",
        leftovers.len(),
        staging_dir.display()
    );

    let mut sent = 0;
    for path in leftovers {
        if !forward(out, path, cancel).await {
            break;
        }
        sent += 1;
    }
    sent
}

async fn forward(out: &mpsc::Sender<PathBuf>, path: PathBuf, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = out.send(path) => sent.is_ok(),
    }
}

async fn claim_and_forward(
    candidate: &Path,
    staging_dir: &Path,
    out: &mpsc::Sender<PathBuf>,
    cancel: &CancellationToken,
    stats: &mut ClaimStats,
) -> bool {
    if candidate
        .file_name()
        .is_some_and(|n| is_temp_name(&n.to_string_lossy()))
    {
        return true;
    }

    match claim(candidate, staging_dir).await {
        Ok(staged) => {
            debug!("Claimed {} -> {}", candidate.display(), staged.display());
            stats.claimed += 1;
            forward(out, staged, cancel).await
        }
        Err(IngestError::AlreadyClaimed(target)) => {
            debug!(
                "Skipping {}: {} already exists",
                candidate.display(),
                target.display()
            );
            stats.skipped += 1;
            true
        }
        Err(e) => {
            // Vanished sources are the normal outcome of duplicate notifications
            if matches!(e, IngestError::NotFound(_)) {
                debug!("Cannot claim {}: {}", candidate.display(), e);
            } else {
                warn!("⚠️  Cannot claim {}: {}", candidate.display(), e);
            }
            stats.skipped += 1;
            true
        }
    }
}

/// Claim stage: replays leftovers from `staging_dir`, optionally sweeps
/// `input_dir`, then claims live candidates until the input closes or
/// `cancel` fires. The output closes when this returns.
pub async fn run_claim_stage(
    mut candidates: mpsc::Receiver<PathBuf>,
    staging_dir: PathBuf,
    sweep_dir: Option<PathBuf>,
    out: mpsc::Sender<PathBuf>,
    cancel: CancellationToken,
) -> ClaimStats {
    let mut stats = ClaimStats {
        recovered: recover_staged(&staging_dir, &out, &cancel).await,
        ..ClaimStats::default()
    };

    if let Some(input_dir) = sweep_dir {
        match list_files(&input_dir).await {
            Ok(existing) => {
                info!(
                    "🧹 Sweeping {} existing files from {}",
                    existing.len(),
                    input_dir.display()
                );
                for candidate in existing {
                    if !claim_and_forward(&candidate, &staging_dir, &out, &cancel, &mut stats).await
                    {
                        return stats;
                    }
                }
            }
            Err(e) => warn!("⚠️  Cannot sweep {}: {}", input_dir.display(), e),
        }
    }

    loop {
        let candidate = tokio::select! {
            _ = cancel.cancelled() => break,
            c = candidates.recv() => match c {
                Some(c) => c,
                None => break,
            },
        };

        if !claim_and_forward(&candidate, &staging_dir, &out, &cancel, &mut stats).await {
            break;
        }
    }

    debug!("Claim stage finished: {:?}", stats);
    stats
}
