use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Content digest of a watched file.
///
/// `Empty` is the reserved digest for a path that no longer exists, so a
/// deleted file compares unequal to any content it ever had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Digest {
    Empty,
    Content([u8; 32]),
}

impl Digest {
    /// Digest of an in-memory byte buffer.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Digest::Content(*blake3::hash(bytes).as_bytes())
    }
}

/// The file vanished or became unreadable between the event and the read.
#[derive(Debug, thiserror::Error)]
#[error("failed to read {path} for fingerprinting: {source}")]
pub struct ContentReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Hash the full content of `path`.
///
/// Callers must check that `path` is a regular file first; anything else
/// surfaces as a `ContentReadError`.
pub fn digest_file(path: &Path) -> Result<Digest, ContentReadError> {
    let bytes = std::fs::read(path).map_err(|source| ContentReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Digest::of_bytes(&bytes))
}

/// Last-seen digest per path. One entry per path; `set` overwrites.
#[derive(Debug, Default)]
pub struct FingerprintStore {
    digests: HashMap<PathBuf, Digest>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&Digest> {
        self.digests.get(path)
    }

    pub fn set(&mut self, path: PathBuf, digest: Digest) {
        self.digests.insert(path, digest);
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}
