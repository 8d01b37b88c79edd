use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use walkdir::WalkDir;

use crate::common::fs::write_atomic;

/// Key-value access to stored patch files by store-relative key, e.g.
/// `"3deg/N45E006_3d.cells"` or `"3deg/manifest.json"`.
pub trait StoreBackend: Send {
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()>;
    fn has(&self, key: &str) -> bool;
    /// Keys under a prefix, in unspecified order.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

impl<B: StoreBackend> StoreBackend for &mut B {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        (**self).get(key)
    }
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).put(key, bytes)
    }
    fn has(&self, key: &str) -> bool {
        (**self).has(key)
    }
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list(prefix)
    }
}

/// Disk-backed store rooted at a directory. Writes are atomic
/// (write-then-rename) so a crashed scan never leaves a torn patch.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl StoreBackend for DiskStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        std::fs::read(self.full(key)).with_context(|| format!("read {key}"))
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.full(key), bytes)
    }

    fn has(&self, key: &str) -> bool {
        self.full(key).exists()
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.full(prefix);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                let rel = entry
                    .path()
                    .strip_prefix(&self.root)
                    .map_err(|e| anyhow!("path outside store root: {e}"))?;
                keys.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(keys)
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default, Clone)]
pub struct MemStore {
    files: BTreeMap<String, Vec<u8>>,
}

impl StoreBackend for MemStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.files
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("missing store key: {key}"))
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.files.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn has(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .files
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
