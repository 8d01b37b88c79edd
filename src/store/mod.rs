mod backend;
mod manifest;
mod patch;

pub use backend::{DiskStore, MemStore, StoreBackend};
pub use manifest::{Manifest, PatchEntry, PatchStatus};
pub use patch::{PatchId, Resolution};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::codec::{self, EncodedPatch};
use crate::types::NameMap;

/// Sidecar metadata stored next to each patch's raw cell buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PatchMeta {
    cell_count: usize,
    crc32: u32,
    format_version: u8,
    name_table: Vec<NameMap>,
}

/// A loaded patch plus the result of its integrity recheck. A CRC mismatch
/// never blocks the load; callers decide what to do with the data.
#[derive(Debug)]
pub struct LoadedPatch {
    pub buffer: Vec<u8>,
    pub name_table: Vec<NameMap>,
    pub cell_count: usize,
    pub format_version: u8,
    pub crc32: u32,
    /// `Some((stored, computed))` when the recomputed CRC32 disagrees.
    pub crc_mismatch: Option<(u32, u32)>,
}

/// Key-value persistence of encoded patches and per-resolution manifests.
/// Outlives any one generation; all mutation goes through `put` on the
/// backend, which is atomic per key.
pub struct CellStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> CellStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn cells_key(resolution: Resolution, patch: &PatchId) -> String {
        format!("{}/{}.cells", resolution.key(), patch)
    }

    fn meta_key(resolution: Resolution, patch: &PatchId) -> String {
        format!("{}/{}.json", resolution.key(), patch)
    }

    fn manifest_key(resolution: Resolution) -> String {
        format!("{}/manifest.json", resolution.key())
    }

    pub fn has_patch(&self, resolution: Resolution, patch: &PatchId) -> bool {
        self.backend.has(&Self::cells_key(resolution, patch))
    }

    pub fn save_patch(
        &mut self,
        resolution: Resolution,
        patch: &PatchId,
        encoded: &EncodedPatch,
    ) -> Result<()> {
        let meta = PatchMeta {
            cell_count: encoded.cell_count,
            crc32: encoded.crc32,
            format_version: encoded.format_version,
            name_table: encoded.name_table.clone(),
        };
        self.backend
            .put(&Self::cells_key(resolution, patch), &encoded.buffer)
            .with_context(|| format!("store patch {patch} cells"))?;
        self.backend
            .put(
                &Self::meta_key(resolution, patch),
                &serde_json::to_vec(&meta)?,
            )
            .with_context(|| format!("store patch {patch} meta"))?;
        Ok(())
    }

    /// Load a patch; `None` if absent. The CRC32 is always recomputed and a
    /// mismatch is reported in [`LoadedPatch::crc_mismatch`].
    pub fn load_patch(
        &self,
        resolution: Resolution,
        patch: &PatchId,
    ) -> Result<Option<LoadedPatch>> {
        let cells_key = Self::cells_key(resolution, patch);
        if !self.backend.has(&cells_key) {
            return Ok(None);
        }
        let buffer = self.backend.get(&cells_key)?;
        let meta_bytes = self
            .backend
            .get(&Self::meta_key(resolution, patch))
            .with_context(|| format!("patch {patch} has cells but no metadata"))?;
        let meta: PatchMeta =
            serde_json::from_slice(&meta_bytes).context("parse patch metadata")?;

        let computed = codec::crc32(&buffer);
        let crc_mismatch = (computed != meta.crc32).then_some((meta.crc32, computed));

        Ok(Some(LoadedPatch {
            buffer,
            name_table: meta.name_table,
            cell_count: meta.cell_count,
            format_version: meta.format_version,
            crc32: meta.crc32,
            crc_mismatch,
        }))
    }

    pub fn load_manifest(&self, resolution: Resolution) -> Result<Manifest> {
        let key = Self::manifest_key(resolution);
        if !self.backend.has(&key) {
            return Ok(Manifest::default());
        }
        let bytes = self.backend.get(&key)?;
        serde_json::from_slice(&bytes).context("parse manifest")
    }

    pub fn save_manifest(&mut self, resolution: Resolution, manifest: &Manifest) -> Result<()> {
        self.backend.put(
            &Self::manifest_key(resolution),
            &serde_json::to_vec_pretty(manifest)?,
        )
    }

    /// Read-modify-write of one patch's manifest entry.
    pub fn update_patch_manifest(
        &mut self,
        resolution: Resolution,
        patch: &PatchId,
        update: impl FnOnce(&mut PatchEntry),
    ) -> Result<()> {
        let mut manifest = self.load_manifest(resolution)?;
        update(manifest.entry_mut(&patch.to_string()));
        self.save_manifest(resolution, &manifest)
    }

    /// Patch ids with stored cell buffers under a resolution.
    pub fn stored_patches(&self, resolution: Resolution) -> Result<Vec<PatchId>> {
        let prefix = format!("{}/", resolution.key());
        let mut out = Vec::new();
        for key in self.backend.list(&prefix)? {
            if let Some(stem) = key
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".cells"))
            {
                if let Ok(id) = stem.parse() {
                    out.push(id);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::types::Cell;

    fn patch_id() -> PatchId {
        PatchId::new(45, 6, Resolution::Coarse)
    }

    #[test]
    fn save_load_round_trip() {
        let mut store = CellStore::new(MemStore::default());
        let encoded = encode(&[Cell::default(), Cell::default()]).unwrap();
        store
            .save_patch(Resolution::Coarse, &patch_id(), &encoded)
            .unwrap();

        let loaded = store
            .load_patch(Resolution::Coarse, &patch_id())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.buffer, encoded.buffer);
        assert_eq!(loaded.cell_count, 2);
        assert!(loaded.crc_mismatch.is_none());
        assert!(store.has_patch(Resolution::Coarse, &patch_id()));
        assert!(!store.has_patch(Resolution::Fine, &patch_id()));
    }

    #[test]
    fn corrupted_patch_still_loads_with_mismatch() {
        let mut backend = MemStore::default();
        let encoded = encode(&[Cell::default()]).unwrap();
        {
            let mut store = CellStore::new(&mut backend);
            store
                .save_patch(Resolution::Coarse, &patch_id(), &encoded)
                .unwrap();
        }
        // Flip a byte behind the store's back.
        let key = format!("3deg/{}.cells", patch_id());
        let mut bytes = backend.get(&key).unwrap();
        bytes[0] ^= 0xFF;
        backend.put(&key, &bytes).unwrap();

        let store = CellStore::new(&mut backend);
        let loaded = store
            .load_patch(Resolution::Coarse, &patch_id())
            .unwrap()
            .unwrap();
        assert!(loaded.crc_mismatch.is_some());
        assert_eq!(loaded.buffer.len(), encoded.buffer.len());
    }

    #[test]
    fn manifest_update_is_read_modify_write() {
        let mut store = CellStore::new(MemStore::default());
        store
            .update_patch_manifest(Resolution::Fine, &patch_id(), |entry| {
                entry.status = PatchStatus::InProgress;
            })
            .unwrap();
        store
            .update_patch_manifest(Resolution::Fine, &patch_id(), |entry| {
                entry.status = PatchStatus::Complete;
                entry.cell_count = 100;
            })
            .unwrap();

        let manifest = store.load_manifest(Resolution::Fine).unwrap();
        let entry = manifest.get(&patch_id().to_string()).unwrap();
        assert_eq!(entry.status, PatchStatus::Complete);
        assert_eq!(entry.cell_count, 100);
    }

    #[test]
    fn stored_patches_lists_saved_ids() {
        let mut store = CellStore::new(MemStore::default());
        let encoded = encode(&[Cell::default()]).unwrap();
        let a = PatchId::new(45, 6, Resolution::Coarse);
        let b = PatchId::new(-3, -120, Resolution::Coarse);
        store.save_patch(Resolution::Coarse, &a, &encoded).unwrap();
        store.save_patch(Resolution::Coarse, &b, &encoded).unwrap();
        let ids = store.stored_patches(Resolution::Coarse).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }
}
