use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Prefix of temp files written by the cross-device fallback. Recovery and
/// store listings skip anything carrying it.
pub const TEMP_PREFIX: &str = ".tagz-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// Single `rename(2)`, atomic within one filesystem
    Renamed,
    /// Copy + fsync + rename + remove. Not atomic with respect to `src`.
    Copied,
}

pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

/// Moves `src` to `dst` with a rename. When the two paths live on different
/// filesystems and `allow_cross_device` is set, falls back to copying into a
/// temp file beside `dst`, syncing it, renaming it into place and removing
/// `src`.
pub async fn move_file(src: &Path, dst: &Path, allow_cross_device: bool) -> io::Result<MoveKind> {
    match fs::rename(src, dst).await {
        Ok(()) => Ok(MoveKind::Renamed),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices && allow_cross_device => {
            tracing::warn!(
                "⚠️  {} and {} are on different filesystems, using non-atomic copy",
                src.display(),
                dst.display()
            );
            copy_then_remove(src, dst).await?;
            Ok(MoveKind::Copied)
        }
        Err(e) => Err(e),
    }
}

async fn copy_then_remove(src: &Path, dst: &Path) -> io::Result<()> {
    let tmp = temp_sibling(dst);

    let result = async {
        let mut reader = fs::File::open(src).await?;
        let mut writer = fs::File::create(&tmp).await?;
        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        writer.sync_all().await?;
        drop(writer);
        fs::rename(&tmp, dst).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }

    fs::remove_file(src).await
}

fn temp_sibling(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_name = format!("{}{}.{}", TEMP_PREFIX, std::process::id(), name);
    match dst.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

/// Lists regular entries of `dir`, skipping fallback temp files. Entries
/// are returned sorted by name.
pub async fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if is_temp_name(&name.to_string_lossy()) {
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}
