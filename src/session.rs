use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::time::Instant;
use tracing::info;

use crate::check::checks_from_config;
use crate::config::DevdashConfig;
use crate::controller::{Controller, DisplaySurface};
use crate::fingerprint::FingerprintStore;
use crate::watcher::dedup::Deduplicator;
use crate::watcher::event::ChangeEvent;
use crate::watcher::{WatchFilter, start_watcher};

/// Watch `root` and keep the dashboard current until Ctrl-C.
///
/// The event loop is the only owner of the fingerprint store, so updates to
/// it are serialized by construction.
pub async fn run_watch(
    root: &Path,
    config: &DevdashConfig,
    surface: Arc<dyn DisplaySurface>,
) -> anyhow::Result<()> {
    let root = root.canonicalize()?;
    let controller = Controller::new(checks_from_config(config), surface, &root);
    let (_handle, mut rx) = start_watcher(&root, WatchFilter::new(&root, config))?;
    let names: Vec<&str> = controller.checks().map(|c| c.name.as_str()).collect();
    info!(root = %root.display(), checks = ?names, "watching");

    controller.trigger_all();

    let mut dedup = Deduplicator::new(FingerprintStore::new());
    let window = Duration::from_millis(config.debounce_ms());
    loop {
        tokio::select! {
            burst = collect_burst(&mut rx, &mut dedup, window) => {
                let Some(changed) = burst else {
                    info!("watcher stopped");
                    break;
                };
                if !changed.is_empty() {
                    info!(files = ?changed, "content changed, rechecking");
                    controller.trigger_all();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(fingerprints = dedup.store().len(), "shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Wait for the next event, then absorb whatever else arrives within `window`.
///
/// Returns the paths whose content changed across the whole burst, or None
/// once the event channel is closed.
async fn collect_burst(
    rx: &mut Receiver<ChangeEvent>,
    dedup: &mut Deduplicator,
    window: Duration,
) -> Option<Vec<PathBuf>> {
    let first = rx.recv().await?;
    let mut changed = dedup.apply(&first);

    let deadline = Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        changed.extend(dedup.apply(&event));
    }
    Some(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_burst_is_deduplicated_into_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.py");
        fs::write(&path, "import setuptools\n").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut dedup = Deduplicator::default();
        tx.send(ChangeEvent::Modified(path.clone())).await.unwrap();
        tx.send(ChangeEvent::Modified(path.clone())).await.unwrap();
        tx.send(ChangeEvent::Created(path.clone())).await.unwrap();

        let changed = collect_burst(&mut rx, &mut dedup, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(changed, vec![path.clone()]);

        // Same content again: a burst with nothing new.
        tx.send(ChangeEvent::Modified(path)).await.unwrap();
        let changed = collect_burst(&mut rx, &mut dedup, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(changed.is_empty());
    }

    #[tokio::test]
    async fn test_move_burst_fires_both_halves_once() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("old_name.py");
        let to = dir.path().join("new_name.py");
        fs::write(&to, "import setuptools\n").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut dedup = Deduplicator::default();
        tx.send(ChangeEvent::Moved {
            from: from.clone(),
            to: to.clone(),
        })
        .await
        .unwrap();
        tx.send(ChangeEvent::Created(to.clone())).await.unwrap();

        let changed = collect_burst(&mut rx, &mut dedup, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(changed, vec![from, to]);
    }

    #[tokio::test]
    async fn test_closed_channel_ends_the_loop() {
        let (tx, mut rx) = mpsc::channel::<ChangeEvent>(1);
        drop(tx);
        let mut dedup = Deduplicator::default();
        assert!(
            collect_burst(&mut rx, &mut dedup, Duration::from_millis(5))
                .await
                .is_none()
        );
    }
}
