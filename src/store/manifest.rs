use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one patch within a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
}

/// One patch's manifest record. Created on first scan, updated atomically
/// per transition, read on resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchEntry {
    pub status: PatchStatus,
    /// Pipeline phases that completed for this patch, in run order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<String>,
    #[serde(default)]
    pub cell_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Per-resolution mapping of patch id → scan state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    entries: BTreeMap<String, PatchEntry>,
}

impl Manifest {
    pub fn get(&self, patch_id: &str) -> Option<&PatchEntry> {
        self.entries.get(patch_id)
    }

    /// Entry for a patch, created pending if absent.
    pub fn entry_mut(&mut self, patch_id: &str) -> &mut PatchEntry {
        self.entries.entry(patch_id.to_string()).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PatchEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_status(&self, status: PatchStatus) -> usize {
        self.entries.values().filter(|e| e.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_mut_creates_pending() {
        let mut manifest = Manifest::default();
        assert!(manifest.get("N45E006_3d").is_none());
        manifest.entry_mut("N45E006_3d").retries = 2;
        let entry = manifest.get("N45E006_3d").unwrap();
        assert_eq!(entry.status, PatchStatus::Pending);
        assert_eq!(entry.retries, 2);
    }

    #[test]
    fn json_round_trip() {
        let mut manifest = Manifest::default();
        {
            let e = manifest.entry_mut("N00E000_3d");
            e.status = PatchStatus::Complete;
            e.phases = vec!["landcover".into(), "classify".into()];
            e.cell_count = 1200;
            e.timestamp = Some(Utc::now());
        }
        let json = serde_json::to_string(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.count_status(PatchStatus::Complete), 1);
        assert_eq!(back.get("N00E000_3d").unwrap().cell_count, 1200);
    }
}
