// src/watch/hash.rs

//! Content hashing for `use_hash`: a write that leaves a file's bytes
//! unchanged (editor touch, `git checkout` of the same content) is dropped.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;

/// blake3 hex digest of a file's contents.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut reader = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Last seen hash per file, in memory for the lifetime of a watch session.
#[derive(Debug, Default)]
pub struct HashIndex {
    hashes: HashMap<PathBuf, String>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hash` for `path`; true if it differs from the previous one
    /// (or the file was not seen before).
    pub fn update(&mut self, path: &Path, hash: String) -> bool {
        if self.hashes.get(path) == Some(&hash) {
            debug!(?path, "content hash unchanged");
            return false;
        }
        self.hashes.insert(path.to_path_buf(), hash);
        true
    }

    pub fn forget(&mut self, path: &Path) {
        self.hashes.retain(|p, _| !p.starts_with(path));
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    #[test]
    fn same_content_same_hash() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/a.txt", "hello");
        fs.add_file("/p/b.txt", "hello");
        fs.add_file("/p/c.txt", "world");

        let a = compute_file_hash(&fs, Path::new("/p/a.txt")).unwrap();
        let b = compute_file_hash(&fs, Path::new("/p/b.txt")).unwrap();
        let c = compute_file_hash(&fs, Path::new("/p/c.txt")).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn index_reports_only_real_changes() {
        let mut index = HashIndex::new();
        let path = Path::new("/p/a.txt");

        assert!(index.update(path, "h1".to_string()));
        assert!(!index.update(path, "h1".to_string()));
        assert!(index.update(path, "h2".to_string()));

        index.forget(Path::new("/p"));
        assert!(index.is_empty());
    }
}
