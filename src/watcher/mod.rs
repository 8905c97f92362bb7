pub mod dedup;
pub mod event;

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::DevdashConfig;
use event::ChangeEvent;

/// Handle to a running watcher. Keeps the OS watcher alive (dropping stops watching).
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    /// The bridge task forwarding events from std channel to tokio channel.
    _bridge_task: JoinHandle<()>,
}

/// Directory names whose contents never reach the deduplicator: VCS metadata,
/// the checks' own caches, virtualenvs and build output.
const HARD_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".venv",
    "venv",
    "build",
    "dist",
];

/// Decides which paths are relevant to the checks.
pub struct WatchFilter {
    root: PathBuf,
    include: Vec<glob::Pattern>,
    ignore: Vec<glob::Pattern>,
    gitignore: Gitignore,
}

impl WatchFilter {
    pub fn new(root: &Path, config: &DevdashConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            include: compile_patterns(&config.include_patterns()),
            ignore: compile_patterns(&config.ignore_patterns()),
            gitignore: build_gitignore_matcher(root),
        }
    }

    /// Whether a change to `path` should be considered at all.
    ///
    /// Filtering order:
    /// 1. Hardcoded VCS, cache and build directories (below the root only)
    /// 2. `.gitignore` rules of the project root
    /// 3. Configured ignore patterns
    /// 4. Configured include patterns
    pub fn is_relevant(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if relative
            .components()
            .any(|c| HARD_EXCLUDED_DIRS.iter().any(|d| c.as_os_str() == *d))
        {
            return false;
        }

        if path.starts_with(&self.root)
            && self
                .gitignore
                .matched_path_or_any_parents(path, path.is_dir())
                .is_ignore()
        {
            return false;
        }

        if matches_any(&self.ignore, path) {
            return false;
        }
        matches_any(&self.include, path)
    }

    /// Drop or narrow an event to its relevant paths.
    ///
    /// A rename across the relevance boundary degrades to the half that matters.
    pub fn admit(&self, event: ChangeEvent) -> Option<ChangeEvent> {
        match event {
            ChangeEvent::Moved { from, to } => {
                match (self.is_relevant(&from), self.is_relevant(&to)) {
                    (true, true) => Some(ChangeEvent::Moved { from, to }),
                    (true, false) => Some(ChangeEvent::Deleted(from)),
                    (false, true) => Some(ChangeEvent::Created(to)),
                    (false, false) => None,
                }
            }
            ChangeEvent::Created(ref p)
            | ChangeEvent::Deleted(ref p)
            | ChangeEvent::Modified(ref p) => self.is_relevant(p).then_some(event),
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                warn!("ignoring invalid pattern {p:?}: {err}");
                None
            }
        })
        .collect()
}

/// Match against the full path, then against each component.
fn matches_any(patterns: &[glob::Pattern], path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    patterns.iter().any(|pattern| {
        pattern.matches(&path_str)
            || path
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .any(|s| pattern.matches(s))
    })
}

/// Build a Gitignore matcher from the project root's .gitignore file.
/// If no .gitignore exists, returns an empty matcher that matches nothing.
fn build_gitignore_matcher(project_root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(project_root);
    let gitignore_path = project_root.join(".gitignore");
    if gitignore_path.exists()
        && let Some(err) = builder.add(&gitignore_path)
    {
        warn!("partially invalid .gitignore: {err}");
    }
    builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Map a raw notify event onto a `ChangeEvent`, or None for kinds we don't track.
fn classify(event: notify::Event) -> Option<ChangeEvent> {
    let mut paths = event.paths.into_iter();
    let first = paths.next()?;
    match event.kind {
        EventKind::Create(_) => Some(ChangeEvent::Created(first)),
        EventKind::Remove(_) => Some(ChangeEvent::Deleted(first)),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let to = paths.next()?;
            Some(ChangeEvent::Moved { from: first, to })
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            Some(ChangeEvent::Deleted(first))
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeEvent::Created(first)),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeEvent::Modified(first)),
        _ => None,
    }
}

/// Start a recursive file watcher on `watch_root`.
///
/// Returns a `WatcherHandle` (must be kept alive) and a tokio mpsc receiver
/// that yields classified, filtered `ChangeEvent`s.
pub fn start_watcher(
    watch_root: &Path,
    filter: WatchFilter,
) -> anyhow::Result<(WatcherHandle, tokio_mpsc::Receiver<ChangeEvent>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = std_tx.send(res);
    })?;
    watcher.watch(watch_root, RecursiveMode::Recursive)?;

    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<ChangeEvent>(256);

    // Bridge: spawn_blocking to receive from std channel, classify, forward to tokio
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(raw) => {
                    let Some(change) = classify(raw).and_then(|e| filter.admit(e)) else {
                        continue;
                    };
                    debug!(?change, "filesystem change");
                    if tokio_tx.blocking_send(change).is_err() {
                        return; // receiver dropped, shutdown
                    }
                }
                Err(err) => {
                    warn!("watcher error: {err}");
                }
            }
        }
    });

    Ok((
        WatcherHandle {
            _watcher: watcher,
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;

    fn filter_for(root: &Path) -> WatchFilter {
        WatchFilter::new(root, &DevdashConfig::default())
    }

    #[test]
    fn test_classify_create_remove_modify() {
        let p = PathBuf::from("/proj/a.py");
        let created = notify::Event::new(EventKind::Create(CreateKind::File)).add_path(p.clone());
        let removed = notify::Event::new(EventKind::Remove(RemoveKind::File)).add_path(p.clone());
        let modified = notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(p.clone());

        assert_eq!(classify(created), Some(ChangeEvent::Created(p.clone())));
        assert_eq!(classify(removed), Some(ChangeEvent::Deleted(p.clone())));
        assert_eq!(classify(modified), Some(ChangeEvent::Modified(p)));
    }

    #[test]
    fn test_classify_renames() {
        let from = PathBuf::from("/proj/dummy/__init__.py");
        let to = PathBuf::from("/proj/dummy.py");
        let both = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(from.clone())
            .add_path(to.clone());
        assert_eq!(
            classify(both),
            Some(ChangeEvent::Moved {
                from: from.clone(),
                to: to.clone()
            })
        );

        let half_from = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(from.clone());
        assert_eq!(classify(half_from), Some(ChangeEvent::Deleted(from)));
        let half_to = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(to.clone());
        assert_eq!(classify(half_to), Some(ChangeEvent::Created(to)));
    }

    #[test]
    fn test_classify_drops_metadata_and_access() {
        let p = PathBuf::from("/proj/a.py");
        let meta = notify::Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))
            .add_path(p.clone());
        let access = notify::Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(p);
        assert_eq!(classify(meta), None);
        assert_eq!(classify(access), None);
    }

    #[test]
    fn test_filter_includes_default_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let filter = filter_for(dir.path());
        assert!(filter.is_relevant(&dir.path().join("pkg").join("mod.py")));
        assert!(filter.is_relevant(&dir.path().join("environment.yml")));
        assert!(filter.is_relevant(&dir.path().join(".flake8")));
        assert!(!filter.is_relevant(&dir.path().join("notes.txt")));
    }

    #[test]
    fn test_filter_excludes_ignored_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let filter = filter_for(dir.path());
        assert!(!filter.is_relevant(&dir.path().join("pkg").join("mod.pyc")));
        assert!(!filter.is_relevant(&dir.path().join("__pycache__").join("mod.py")));
        assert!(!filter.is_relevant(
            &dir.path().join(".ipynb_checkpoints").join("nb-checkpoint.json")
        ));
        assert!(!filter.is_relevant(&dir.path().join(".~lock.py")));
        assert!(!filter.is_relevant(&dir.path().join(".git").join("config.json")));
    }

    #[test]
    fn test_filter_excludes_tool_caches() {
        let dir = tempfile::tempdir().unwrap();
        let filter = filter_for(dir.path());
        let root = dir.path();
        assert!(!filter.is_relevant(&root.join(".mypy_cache/3.12/pkg.meta.json")));
        assert!(!filter.is_relevant(&root.join(".pytest_cache/v/cache/lastfailed.json")));
        assert!(!filter.is_relevant(&root.join(".tox/py312/setup.cfg")));
        assert!(!filter.is_relevant(&root.join(".venv/lib/site.py")));
        assert!(!filter.is_relevant(&root.join("venv/lib/site.py")));
        assert!(!filter.is_relevant(&root.join("dist/pkg/setup.py")));
        assert!(!filter.is_relevant(&root.join("dummy.egg-info/requires.toml")));
        assert!(filter.is_relevant(&root.join("dummy/__init__.py")));
    }

    #[test]
    fn test_excluded_names_above_the_root_do_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("build").join("project");
        fs::create_dir_all(&root).unwrap();
        let filter = filter_for(&root);
        assert!(filter.is_relevant(&root.join("setup.py")));
        assert!(!filter.is_relevant(&root.join("build").join("lib.py")));
    }

    #[test]
    fn test_filter_respects_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "build/\n").unwrap();
        fs::create_dir(dir.path().join("build")).unwrap();
        let filter = filter_for(dir.path());
        assert!(!filter.is_relevant(&dir.path().join("build").join("lib.py")));
        assert!(filter.is_relevant(&dir.path().join("src.py")));
    }

    #[test]
    fn test_admit_narrows_moves_across_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let filter = filter_for(dir.path());
        let py = dir.path().join("setup.py");
        let bak = dir.path().join("setup.bak");

        assert_eq!(
            filter.admit(ChangeEvent::Moved {
                from: py.clone(),
                to: bak.clone()
            }),
            Some(ChangeEvent::Deleted(py.clone()))
        );
        assert_eq!(
            filter.admit(ChangeEvent::Moved {
                from: bak.clone(),
                to: py.clone()
            }),
            Some(ChangeEvent::Created(py))
        );
        assert_eq!(filter.admit(ChangeEvent::Modified(bak)), None);
    }
}
