//! Scan integrity verification: spot-checks completed patches against the
//! manifest, the stored buffers, and the codec's validation mode, and
//! reports coverage gaps.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;

use crate::codec::decode_validated;
use crate::store::{CellStore, PatchStatus, Resolution, StoreBackend};

/// Findings of one verification pass. An empty report means the scan data
/// is internally consistent.
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub checked: usize,
    /// Patches whose stored CRC32 disagrees with the buffer.
    pub crc_mismatches: Vec<String>,
    /// Complete manifest entries with no stored buffer.
    pub missing_buffers: Vec<String>,
    /// Manifest cell count != decoded cell count.
    pub count_mismatches: Vec<String>,
    /// (patch, invalid cell count) from sampled field-level validation.
    pub invalid_cells: Vec<(String, usize)>,
    /// `in_progress` entries older than an hour (crashed runs).
    pub stale_in_progress: Vec<String>,
    /// Complete entries missing core pipeline phases.
    pub incomplete_phases: Vec<String>,
    /// 10°×10° lat/lon zones with no completed patch.
    pub empty_zones: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.crc_mismatches.is_empty()
            && self.missing_buffers.is_empty()
            && self.count_mismatches.is_empty()
            && self.invalid_cells.is_empty()
            && self.stale_in_progress.is_empty()
            && self.incomplete_phases.is_empty()
    }
}

const SAMPLED_CELLS: usize = 10;

/// Spot-check a scan at one resolution.
///
/// `expect_world_coverage` additionally reports 10° zones with no
/// completed patch (only meaningful after a whole-planet scan).
pub fn verify_scan<B: StoreBackend>(
    store: &CellStore<B>,
    resolution: Resolution,
    expect_world_coverage: bool,
) -> Result<VerifyReport> {
    let manifest = store.load_manifest(resolution)?;
    let mut report = VerifyReport::default();
    let mut rng = rand::rng();
    let stale_cutoff = Utc::now() - ChronoDuration::hours(1);

    for (patch_id, entry) in manifest.iter() {
        match entry.status {
            PatchStatus::InProgress => {
                if entry.timestamp.map_or(true, |t| t < stale_cutoff) {
                    report.stale_in_progress.push(patch_id.to_string());
                }
                continue;
            }
            PatchStatus::Complete => {}
            _ => continue,
        }
        report.checked += 1;

        if !entry.phases.iter().any(|p| p == "classify")
            || !entry.phases.iter().any(|p| p == "encode")
        {
            report.incomplete_phases.push(patch_id.to_string());
        }

        let Ok(parsed) = patch_id.parse() else {
            report.missing_buffers.push(patch_id.to_string());
            continue;
        };
        let Some(loaded) = store.load_patch(resolution, &parsed)? else {
            report.missing_buffers.push(patch_id.to_string());
            continue;
        };

        if loaded.crc_mismatch.is_some() {
            report.crc_mismatches.push(patch_id.to_string());
        }

        let decoded = match decode_validated(&loaded.buffer, &loaded.name_table) {
            Ok(cells) => cells,
            Err(_) => {
                report.count_mismatches.push(patch_id.to_string());
                continue;
            }
        };
        if decoded.len() != entry.cell_count {
            report.count_mismatches.push(patch_id.to_string());
        }

        // Sample up to 10 cells for field-level validation.
        if !decoded.is_empty() {
            let mut invalid = 0usize;
            for _ in 0..SAMPLED_CELLS.min(decoded.len()) {
                let cell = &decoded[rng.random_range(0..decoded.len())];
                if !cell.errors.is_empty() {
                    invalid += 1;
                }
            }
            if invalid > 0 {
                report.invalid_cells.push((patch_id.to_string(), invalid));
            }
        }
    }

    if expect_world_coverage {
        for zone_lat in (-90i16..90).step_by(10) {
            for zone_lon in (-180i16..180).step_by(10) {
                let covered = manifest.iter().any(|(id, entry)| {
                    entry.status == PatchStatus::Complete
                        && id.parse::<crate::store::PatchId>().is_ok_and(|p| {
                            p.sw_lat < zone_lat + 10
                                && p.sw_lat + p.side_deg > zone_lat
                                && p.sw_lon < zone_lon + 10
                                && p.sw_lon + p.side_deg > zone_lon
                        })
                });
                if !covered {
                    report.empty_zones.push(format!(
                        "lat {zone_lat}..{} lon {zone_lon}..{}",
                        zone_lat + 10,
                        zone_lon + 10
                    ));
                }
            }
        }
    }

    Ok(report)
}
