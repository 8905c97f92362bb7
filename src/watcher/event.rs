use std::path::PathBuf;

/// Classified filesystem change, as delivered to the deduplicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A file appeared.
    Created(PathBuf),
    /// A file was removed.
    Deleted(PathBuf),
    /// A file was renamed within the watched tree.
    Moved { from: PathBuf, to: PathBuf },
    /// A file was written to.
    Modified(PathBuf),
}
