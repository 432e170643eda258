//! Filesystem change notifications for the input directory.
//!
//! Wraps a `notify::RecommendedWatcher` and bridges its callback thread into a
//! bounded tokio channel of [`WatchEvent`]s. Only creations and content
//! writes are forwarded downstream as claim candidates.

use crate::error::IngestError;
use crate::models::{WatchEvent, WatchEventKind};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub type EventStream = mpsc::Receiver<Result<WatchEvent, IngestError>>;

/// Keeps the OS watch registered. Dropping it ends the subscription and
/// closes the event stream.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("path", &self.path)
            .finish()
    }
}

impl DirectoryWatcher {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Subscribes to non-recursive change notifications for `path`.
///
/// The notify callback blocks when the channel is full, so a slow pipeline
/// throttles event delivery instead of dropping events.
pub fn subscribe(path: &Path, capacity: usize) -> Result<(DirectoryWatcher, EventStream), IngestError> {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let items: Vec<Result<WatchEvent, IngestError>> = match res {
                Ok(event) => convert_event(&event).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(IngestError::Watch(e.to_string()))],
            };
            for item in items {
                // Receiver gone means the pipeline is shutting down
                if tx.blocking_send(item).is_err() {
                    return;
                }
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| IngestError::Watch(format!("Failed to create watcher: {}", e)))?;

    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .map_err(|e| IngestError::Watch(format!("Failed to watch {}: {}", path.display(), e)))?;

    debug!("Registered watch on {}", path.display());

    Ok((
        DirectoryWatcher {
            _watcher: watcher,
            path: path.to_path_buf(),
        },
        rx,
    ))
}

/// Flattens a notify event into one [`WatchEvent`] per affected path.
///
/// A file moved into the watched directory counts as created; the source
/// side of a rename and metadata-only changes are `Other`.
pub fn convert_event(event: &notify::Event) -> Vec<WatchEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.iter().map(|p| WatchEvent::created(p)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(|p| WatchEvent::created(p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let kind = if i == 1 {
                    WatchEventKind::Created
                } else {
                    WatchEventKind::Other
                };
                WatchEvent::new(p, kind)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => event
            .paths
            .iter()
            .map(|p| WatchEvent::new(p, WatchEventKind::Modified))
            .collect(),
        _ => event
            .paths
            .iter()
            .map(|p| WatchEvent::new(p, WatchEventKind::Other))
            .collect(),
    }
}

/// Forwards candidate paths from `events` into `out` until the stream ends,
/// the consumer goes away or `cancel` fires. An error on the stream is a
/// hard stop and is returned to the caller.
pub async fn forward_candidates(
    mut events: EventStream,
    out: mpsc::Sender<PathBuf>,
    cancel: CancellationToken,
) -> Result<(), IngestError> {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Watcher adapter cancelled");
                return Ok(());
            }
            item = events.recv() => item,
        };

        match item {
            Some(Ok(event)) if event.is_candidate() => {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    sent = out.send(event.path) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
            Some(Ok(event)) => {
                debug!("Ignoring {:?} event for {}", event.kind, event.path.display());
            }
            Some(Err(e)) => {
                error!("❌ Change notification stream failed: {}", e);
                return Err(e);
            }
            None => {
                info!("Change notification stream closed");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut ev = notify::Event::new(kind);
        for p in paths {
            ev = ev.add_path(PathBuf::from(p));
        }
        ev
    }

    #[test]
    fn test_convert_create_and_write() {
        let created = convert_event(&event(EventKind::Create(CreateKind::File), &["/in/a.txt"]));
        assert_eq!(created, vec![WatchEvent::created("/in/a.txt")]);

        let written = convert_event(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/in/a.txt"],
        ));
        assert_eq!(written[0].kind, WatchEventKind::Modified);
    }

    #[test]
    fn test_convert_ignored_kinds() {
        for kind in [
            EventKind::Remove(RemoveKind::File),
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
        ] {
            let converted = convert_event(&event(kind, &["/in/a.txt"]));
            assert!(converted.iter().all(|e| !e.is_candidate()));
        }
    }

    #[test]
    fn test_convert_moved_in() {
        let both = convert_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/in/old.txt", "/in/new.txt"],
        ));
        assert_eq!(both[0].kind, WatchEventKind::Other);
        assert_eq!(both[1], WatchEvent::created("/in/new.txt"));
    }

    #[tokio::test]
    async fn test_forward_filters_events() {
        let (tx, rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        tx.send(Ok(WatchEvent::created("/in/a"))).await.unwrap();
        tx.send(Ok(WatchEvent::new("/in/b", WatchEventKind::Other)))
            .await
            .unwrap();
        tx.send(Ok(WatchEvent::new("/in/c", WatchEventKind::Modified)))
            .await
            .unwrap();
        drop(tx);

        forward_candidates(rx, out_tx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out_rx.recv().await, Some(PathBuf::from("/in/a")));
        assert_eq!(out_rx.recv().await, Some(PathBuf::from("/in/c")));
        assert_eq!(out_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_forward_stops_on_stream_error() {
        let (tx, rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        tx.send(Err(IngestError::Watch("inotify overflow".into())))
            .await
            .unwrap();
        tx.send(Ok(WatchEvent::created("/in/late"))).await.unwrap();

        let result = forward_candidates(rx, out_tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(IngestError::Watch(_))));
        assert_eq!(out_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscribe_reports_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let (watcher, mut events) = subscribe(tmp.path(), 16).unwrap();
        assert_eq!(watcher.path(), tmp.path());

        std::fs::write(tmp.path().join("dropped.txt"), b"hi").unwrap();

        let seen = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while let Some(item) = events.recv().await {
                if let Ok(ev) = item {
                    if ev.is_candidate() && ev.path.ends_with("dropped.txt") {
                        return true;
                    }
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(seen);
    }

    #[test]
    fn test_subscribe_missing_dir_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = subscribe(&tmp.path().join("missing"), 4).unwrap_err();
        assert!(err.is_fatal());
    }
}
