use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::fingerprint::{Digest, FingerprintStore, digest_file};

use super::event::ChangeEvent;

/// Turns raw change events into "content actually changed" rechecks.
///
/// Owns the session's `FingerprintStore`; the store is dropped with the
/// deduplicator when the watch session ends.
#[derive(Debug, Default)]
pub struct Deduplicator {
    store: FingerprintStore,
}

impl Deduplicator {
    pub fn new(store: FingerprintStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FingerprintStore {
        &self.store
    }

    /// Apply one event and return the paths whose fingerprint changed.
    ///
    /// Each returned path is one recheck. A `Moved` event can return two.
    pub fn apply(&mut self, event: &ChangeEvent) -> Vec<PathBuf> {
        let mut fired = Vec::new();
        match event {
            ChangeEvent::Created(path) | ChangeEvent::Modified(path) => {
                if let Some(digest) = current_digest(path) {
                    self.update(path, digest, &mut fired);
                }
            }
            ChangeEvent::Deleted(path) => {
                self.update(path, Digest::Empty, &mut fired);
            }
            ChangeEvent::Moved { from, to } => {
                self.update(from, Digest::Empty, &mut fired);
                if let Some(digest) = current_digest(to) {
                    self.update(to, digest, &mut fired);
                }
            }
        }
        fired
    }

    fn update(&mut self, path: &Path, digest: Digest, fired: &mut Vec<PathBuf>) {
        if self.store.get(path) == Some(&digest) {
            debug!(path = %path.display(), "content unchanged, suppressing recheck");
            return;
        }
        self.store.set(path.to_path_buf(), digest);
        fired.push(path.to_path_buf());
    }
}

/// Digest of `path` if it is still a regular file; `None` means skip.
fn current_digest(path: &Path) -> Option<Digest> {
    if !path.is_file() {
        debug!(path = %path.display(), "path is no longer a regular file, skipping");
        return None;
    }
    match digest_file(path) {
        Ok(digest) => Some(digest),
        Err(err) => {
            warn!("{err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Small project tree: `environment.yml`, `dummy/__init__.py`, `setup.py`.
    fn tree_project() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("environment.yml"), "name: dummy\n").unwrap();
        fs::create_dir(dir.path().join("dummy")).unwrap();
        fs::write(
            dir.path().join("dummy").join("__init__.py"),
            "print('Hello world!')\n",
        )
        .unwrap();
        fs::write(dir.path().join("setup.py"), "import setuptools\n").unwrap();
        dir
    }

    fn existing(dir: &TempDir) -> PathBuf {
        dir.path().join("dummy").join("__init__.py")
    }

    fn missing(dir: &TempDir) -> PathBuf {
        dir.path().join("dummy.py")
    }

    fn rename_into_existing(dir: &TempDir) -> ChangeEvent {
        ChangeEvent::Moved {
            from: missing(dir),
            to: existing(dir),
        }
    }

    fn count(dedup: &mut Deduplicator, events: &[ChangeEvent]) -> usize {
        events.iter().map(|e| dedup.apply(e).len()).sum()
    }

    #[test]
    fn test_repeated_creates_fire_once() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();
        let ev = ChangeEvent::Created(existing(&dir));
        assert_eq!(count(&mut dedup, &[ev.clone(), ev]), 1);
    }

    #[test]
    fn test_repeated_modifies_fire_once() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();
        let ev = ChangeEvent::Modified(existing(&dir));
        assert_eq!(count(&mut dedup, &[ev.clone(), ev]), 1);
    }

    #[test]
    fn test_repeated_deletes_fire_once() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();
        let ev = ChangeEvent::Deleted(missing(&dir));
        assert_eq!(count(&mut dedup, &[ev.clone(), ev]), 1);
    }

    #[test]
    fn test_create_then_modify_same_content_fires_once() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();
        let events = [
            ChangeEvent::Created(existing(&dir)),
            ChangeEvent::Modified(existing(&dir)),
        ];
        assert_eq!(count(&mut dedup, &events), 1);
    }

    #[test]
    fn test_modify_then_create_same_content_fires_once() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();
        let events = [
            ChangeEvent::Modified(existing(&dir)),
            ChangeEvent::Created(existing(&dir)),
        ];
        assert_eq!(count(&mut dedup, &events), 1);
    }

    #[test]
    fn test_move_yields_two_effective_updates() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();

        let fired = dedup.apply(&rename_into_existing(&dir));
        assert_eq!(fired, vec![missing(&dir), existing(&dir)]);
        assert_eq!(dedup.store().get(&missing(&dir)), Some(&Digest::Empty));
        assert_eq!(
            dedup.store().get(&existing(&dir)),
            Some(&Digest::of_bytes(b"print('Hello world!')\n"))
        );

        // Replaying the same rename changes nothing.
        assert!(dedup.apply(&rename_into_existing(&dir)).is_empty());
    }

    #[test]
    fn test_move_followed_by_redundant_events_fires_nothing_more() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();
        assert_eq!(dedup.apply(&rename_into_existing(&dir)).len(), 2);

        assert!(dedup.apply(&ChangeEvent::Modified(existing(&dir))).is_empty());
        assert!(dedup.apply(&ChangeEvent::Created(existing(&dir))).is_empty());
        assert!(dedup.apply(&ChangeEvent::Deleted(missing(&dir))).is_empty());
    }

    #[test]
    fn test_move_to_vanished_path_only_clears_source() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();
        let fired = dedup.apply(&ChangeEvent::Moved {
            from: existing(&dir),
            to: dir.path().join("nowhere.py"),
        });
        assert_eq!(fired, vec![existing(&dir)]);
        assert!(dedup.store().get(&dir.path().join("nowhere.py")).is_none());
    }

    #[test]
    fn test_delete_then_recreate_fires_once_and_stores_hash() {
        let dir = tree_project();
        let path = dir.path().join("setup.py");
        let mut dedup = Deduplicator::default();

        fs::remove_file(&path).unwrap();
        assert_eq!(dedup.apply(&ChangeEvent::Deleted(path.clone())).len(), 1);
        assert_eq!(dedup.store().get(&path), Some(&Digest::Empty));

        fs::write(&path, "setup()\n").unwrap();
        assert_eq!(dedup.apply(&ChangeEvent::Created(path.clone())).len(), 1);
        assert_eq!(dedup.apply(&ChangeEvent::Created(path.clone())).len(), 0);
        assert_eq!(
            dedup.store().get(&path),
            Some(&Digest::of_bytes(b"setup()\n"))
        );
    }

    #[test]
    fn test_vanished_file_is_skipped() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();
        assert!(dedup.apply(&ChangeEvent::Modified(missing(&dir))).is_empty());
        assert!(dedup.apply(&ChangeEvent::Created(missing(&dir))).is_empty());
        assert!(dedup.store().is_empty());
    }

    #[test]
    fn test_directory_events_are_skipped() {
        let dir = tree_project();
        let mut dedup = Deduplicator::default();
        let sub = dir.path().join("dummy");
        assert!(dedup.apply(&ChangeEvent::Modified(sub)).is_empty());
    }

    #[test]
    fn test_rewrite_with_identical_content_is_suppressed() {
        let dir = tree_project();
        let path = dir.path().join("setup.py");
        let mut dedup = Deduplicator::default();
        assert_eq!(dedup.apply(&ChangeEvent::Modified(path.clone())).len(), 1);

        fs::write(&path, "").unwrap();
        fs::write(&path, "import setuptools\n").unwrap();
        assert!(dedup.apply(&ChangeEvent::Modified(path.clone())).is_empty());

        fs::write(&path, "import setuptools\nsetup()\n").unwrap();
        assert_eq!(dedup.apply(&ChangeEvent::Modified(path)).len(), 1);
    }
}
