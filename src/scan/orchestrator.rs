//! World scan: enumerate patches, drive the per-patch pipeline, back off on
//! failures, persist results, and stay resumable at every step.
//!
//! Patches run strictly one at a time so provider pacing holds globally;
//! the fan-out inside a single patch (tiles, batches, chunks) is the only
//! concurrency. Manifest writes for a patch are totally ordered
//! `in_progress → (complete | failed)`.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::codec::encode;
use crate::common::{GenLog, HttpFetch};
use crate::pipeline::{generate_bbox_map, ProviderConfig};
use crate::store::{CellStore, PatchId, PatchStatus, Resolution, StoreBackend};
use crate::types::GeoBounds;

/// Latitude band served by the full pipeline; beyond it patches degrade to
/// land cover + elevation only.
const FULL_PIPELINE_LAT: i16 = 72;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub resolution: Resolution,
    pub cell_km: f64,
    /// Scan window; polar caps outside ±72° still run, degraded.
    pub lat_min: i16,
    pub lat_max: i16,
    pub max_retries: u32,
    pub max_consecutive_failures: u32,
    pub backoff_base: Duration,
    pub patch_yield: Duration,
}

impl ScanConfig {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            cell_km: match resolution {
                Resolution::Coarse => 10.0,
                Resolution::Fine => 2.0,
            },
            lat_min: -90,
            lat_max: 90,
            max_retries: 5,
            max_consecutive_failures: 10,
            backoff_base: Duration::from_secs(1),
            patch_yield: Duration::from_millis(50),
        }
    }

    /// Collapse sleeps (tests).
    pub fn without_timers(mut self) -> Self {
        self.backoff_base = Duration::ZERO;
        self.patch_yield = Duration::ZERO;
        self
    }
}

/// All patches in the scan window, with whether each gets the full
/// pipeline. Row-major from the south-west.
pub fn enumerate_patches(config: &ScanConfig) -> Vec<(PatchId, bool)> {
    let side = config.resolution.side_deg();
    let mut patches = Vec::new();
    let mut lat = (config.lat_min / side) * side;
    if lat > config.lat_min {
        lat -= side;
    }
    while lat < config.lat_max {
        let mut lon = -180i16;
        while lon < 180 {
            let full = lat >= -FULL_PIPELINE_LAT && lat + side <= FULL_PIPELINE_LAT;
            patches.push((PatchId::new(lat, lon, config.resolution), full));
            lon += side;
        }
        lat += side;
    }
    patches
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// True when the scan stopped early (cancellation or the consecutive
    /// failure cap).
    pub aborted: bool,
}

/// Grid dimensions for one patch at the configured cell size.
fn patch_grid(bounds: &GeoBounds, cell_km: f64) -> (usize, usize) {
    let cols = (bounds.width_km() / cell_km).floor().max(1.0) as usize;
    let rows = (bounds.height_km() / (cell_km * crate::hex::SQRT3 / 2.0))
        .floor()
        .max(1.0) as usize;
    (cols, rows)
}

/// Run (or resume) a world scan. `should_stop` is polled between patches;
/// a cancelled scan leaves the manifest consistent and resumable.
pub fn run_scan<B: StoreBackend>(
    store: &mut CellStore<B>,
    http: &dyn HttpFetch,
    providers: &ProviderConfig,
    config: &ScanConfig,
    should_stop: &dyn Fn() -> bool,
    verbose: u8,
) -> Result<ScanSummary> {
    let resolution = config.resolution;
    let manifest = store.load_manifest(resolution)?;

    // Failed patches (fewest retries first) run before pending ones;
    // complete patches are skipped outright.
    let mut todo: Vec<(PatchId, bool, u32, bool)> = Vec::new();
    let mut summary = ScanSummary::default();
    for (patch, full) in enumerate_patches(config) {
        match manifest.get(&patch.to_string()) {
            Some(entry) if entry.status == PatchStatus::Complete => summary.skipped += 1,
            Some(entry) if entry.status == PatchStatus::Failed => {
                if entry.retries < config.max_retries {
                    todo.push((patch, full, entry.retries, true));
                } else {
                    summary.skipped += 1;
                }
            }
            _ => todo.push((patch, full, 0, false)),
        }
    }
    todo.sort_by_key(|&(patch, _, retries, failed)| {
        (if failed { (0, retries) } else { (1, 0) }, patch)
    });

    let mut consecutive_failures = 0u32;
    for (i, &(patch, full, _, _)) in todo.iter().enumerate() {
        if should_stop() {
            summary.aborted = true;
            break;
        }
        if consecutive_failures > 0 {
            let backoff = config
                .backoff_base
                .saturating_mul(1u32 << consecutive_failures.min(5))
                .min(Duration::from_secs(30));
            std::thread::sleep(backoff);
        }

        if verbose > 0 {
            eprintln!("[scan] {}/{} {patch}", i + 1, todo.len());
        }

        store.update_patch_manifest(resolution, &patch, |entry| {
            entry.status = PatchStatus::InProgress;
            entry.timestamp = Some(Utc::now());
        })?;

        match scan_patch(store, http, providers, config, &patch, full) {
            Ok((cell_count, phases)) => {
                consecutive_failures = 0;
                summary.completed += 1;
                store.update_patch_manifest(resolution, &patch, |entry| {
                    entry.status = PatchStatus::Complete;
                    entry.cell_count = cell_count;
                    entry.phases = phases;
                    entry.timestamp = Some(Utc::now());
                    entry.last_error = None;
                })?;
            }
            Err(e) => {
                consecutive_failures += 1;
                summary.failed += 1;
                if verbose > 0 {
                    eprintln!("[scan] {patch} failed: {e:#}");
                }
                let max_retries = config.max_retries;
                store.update_patch_manifest(resolution, &patch, |entry| {
                    entry.status = PatchStatus::Failed;
                    entry.retries = (entry.retries + 1).min(max_retries);
                    entry.last_error = Some(format!("{e:#}"));
                    entry.timestamp = Some(Utc::now());
                })?;
                if consecutive_failures >= config.max_consecutive_failures {
                    summary.aborted = true;
                    break;
                }
            }
        }

        std::thread::sleep(config.patch_yield);
    }

    Ok(summary)
}

/// One patch through the pipeline: generate, encode, persist.
fn scan_patch<B: StoreBackend>(
    store: &mut CellStore<B>,
    http: &dyn HttpFetch,
    providers: &ProviderConfig,
    config: &ScanConfig,
    patch: &PatchId,
    full: bool,
) -> Result<(usize, Vec<String>)> {
    let bounds = patch.bounds();
    let (cols, rows) = patch_grid(&bounds, config.cell_km);
    let mut log = GenLog::new();

    let map = generate_bbox_map(http, providers, bounds, cols, rows, config.cell_km, full, &mut log)
        .with_context(|| format!("generate patch {patch}"))?;
    let encoded = encode(&map.cells).with_context(|| format!("encode patch {patch}"))?;
    store
        .save_patch(config.resolution, patch, &encoded)
        .with_context(|| format!("persist patch {patch}"))?;

    let mut phases = vec!["elevation".to_string(), "landcover".to_string()];
    if full {
        phases.push("vector".to_string());
        phases.push("gazetteer".to_string());
    }
    phases.push("classify".to_string());
    phases.push("post".to_string());
    phases.push("encode".to_string());
    Ok((encoded.cell_count, phases))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::http::MemFetch;
    use crate::store::MemStore;

    fn tiny_config() -> ScanConfig {
        // One 3° row between 45N and 48N for a fast test scan.
        let mut config = ScanConfig::new(Resolution::Coarse).without_timers();
        config.lat_min = 45;
        config.lat_max = 48;
        config.cell_km = 50.0;
        config
    }

    fn providers() -> ProviderConfig {
        ProviderConfig {
            landcover_url: "https://lc/{tile}".into(),
            elevation_primary: "https://elev1".into(),
            elevation_secondary: "https://elev2".into(),
            vector_endpoint: "https://overpass".into(),
            gazetteer_endpoint: "https://gaz".into(),
            pacing: false,
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn enumerate_flags_polar_bands_degraded() {
        let config = ScanConfig::new(Resolution::Coarse);
        let patches = enumerate_patches(&config);
        assert_eq!(patches.len(), (180 / 3) * (360 / 3));
        let polar = patches
            .iter()
            .find(|(p, _)| p.sw_lat == 87)
            .unwrap();
        assert!(!polar.1);
        let temperate = patches
            .iter()
            .find(|(p, _)| p.sw_lat == 45 && p.sw_lon == 6)
            .unwrap();
        assert!(temperate.1);
        // The band touching ±72 from inside is still full.
        let edge = patches.iter().find(|(p, _)| p.sw_lat == 69).unwrap();
        assert!(edge.1);
        let beyond = patches.iter().find(|(p, _)| p.sw_lat == 72).unwrap();
        assert!(!beyond.1);
    }

    #[test]
    fn scan_completes_and_resume_skips() {
        let http = MemFetch::new(); // all providers 404; cells default
        let mut store = CellStore::new(MemStore::default());
        let config = tiny_config();

        let summary =
            run_scan(&mut store, &http, &providers(), &config, &|| false, 0).unwrap();
        assert_eq!(summary.completed, 120); // 360/3 lon patches, one lat row
        assert_eq!(summary.failed, 0);
        assert!(!summary.aborted);

        let manifest = store.load_manifest(Resolution::Coarse).unwrap();
        assert_eq!(manifest.count_status(PatchStatus::Complete), 120);

        // Resume: everything already complete.
        let summary2 =
            run_scan(&mut store, &http, &providers(), &config, &|| false, 0).unwrap();
        assert_eq!(summary2.completed, 0);
        assert_eq!(summary2.skipped, 120);
    }

    #[test]
    fn cancellation_between_patches_is_resumable() {
        let http = MemFetch::new();
        let mut store = CellStore::new(MemStore::default());
        let config = tiny_config();

        let count = std::cell::Cell::new(0u32);
        let stop = move || {
            count.set(count.get() + 1);
            count.get() > 3 // allow 3 patches then stop
        };
        let summary = run_scan(&mut store, &http, &providers(), &config, &stop, 0).unwrap();
        assert!(summary.aborted);
        assert_eq!(summary.completed, 3);

        let manifest = store.load_manifest(Resolution::Coarse).unwrap();
        assert_eq!(manifest.count_status(PatchStatus::Complete), 3);
        assert_eq!(manifest.count_status(PatchStatus::InProgress), 0);

        // Resume finishes the rest.
        let summary2 =
            run_scan(&mut store, &http, &providers(), &config, &|| false, 0).unwrap();
        assert_eq!(summary2.completed, 117);
        assert_eq!(summary2.skipped, 3);
    }

    #[test]
    fn oversized_patch_grid_fails_and_records_error() {
        let http = MemFetch::new();
        let mut store = CellStore::new(MemStore::default());
        let mut config = tiny_config();
        config.cell_km = 0.5; // 3° patch at 0.5 km cells blows the limit
        config.max_consecutive_failures = 2;

        let summary = run_scan(&mut store, &http, &providers(), &config, &|| false, 0).unwrap();
        assert!(summary.aborted);
        assert_eq!(summary.failed, 2);

        let manifest = store.load_manifest(Resolution::Coarse).unwrap();
        let failed: Vec<_> = manifest
            .iter()
            .filter(|(_, e)| e.status == PatchStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed[0].1.last_error.as_ref().unwrap().contains("grid too large"));
        assert_eq!(failed[0].1.retries, 1);
    }
}
