//! Elevation sampling with provider fallback and sparse-grid interpolation.
//!
//! Points go out in batches of up to 100 to the primary provider, pacing
//! ≥1.1 s between batches; a 429 sleeps 60 s and retries once before the
//! sampler escalates to the secondary provider (≥0.25 s pacing). A provider
//! switch is sticky for all subsequent batches. Above a grid-size threshold
//! the sampler switches to a sparse sub-grid lattice and fills the rest of
//! the grid by bilinear interpolation.

use std::time::Duration;

use serde::Deserialize;

use crate::common::{GenLog, HttpFetch, Pacer};
use crate::hex::HexProjection;

/// Grid size at which full sampling gives way to sparse + interpolate.
pub const SPARSE_THRESHOLD: usize = 5_000;

const BATCH_SIZE: usize = 100;

/// Per-cell elevation in meters (0 where unknown) plus response coverage.
pub struct ElevationGrid {
    values: Vec<f64>,
    coverage: f64,
}

impl ElevationGrid {
    pub fn new(values: Vec<f64>, coverage: f64) -> Self {
        Self { values, coverage }
    }

    pub fn flat(cell_count: usize) -> Self {
        Self { values: vec![0.0; cell_count], coverage: 0.0 }
    }

    #[inline] pub fn get(&self, idx: usize) -> f64 { self.values[idx] }
    #[inline] pub fn values(&self) -> &[f64] { &self.values }
    #[inline] pub fn coverage(&self) -> f64 { self.coverage }
}

#[derive(Deserialize)]
struct ProviderResponse {
    results: Vec<ProviderPoint>,
}

#[derive(Deserialize)]
struct ProviderPoint {
    elevation: Option<f64>,
}

pub struct ElevationSampler<'a> {
    http: &'a dyn HttpFetch,
    endpoints: [String; 2],
    pacers: [Pacer; 2],
    rate_limit_sleep: Duration,
    /// Index of the provider currently in use; switches are sticky.
    active: usize,
}

impl<'a> ElevationSampler<'a> {
    pub fn new(
        http: &'a dyn HttpFetch,
        primary: impl Into<String>,
        secondary: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoints: [primary.into(), secondary.into()],
            pacers: [
                Pacer::new(Duration::from_millis(1100)),
                Pacer::new(Duration::from_millis(250)),
            ],
            rate_limit_sleep: Duration::from_secs(60),
            active: 0,
        }
    }

    /// Override pacing floors and the 429 sleep (tests, offline hosts).
    pub fn with_timing(mut self, primary: Duration, secondary: Duration, rate_limit: Duration) -> Self {
        self.pacers = [Pacer::new(primary), Pacer::new(secondary)];
        self.rate_limit_sleep = rate_limit;
        self
    }

    /// Fetch elevations for arbitrary (lat, lon) points. Missing values
    /// become 0; the second tuple element is the fraction of non-null
    /// responses.
    pub fn fetch_points(&mut self, points: &[(f64, f64)], log: &mut GenLog) -> (Vec<f64>, f64) {
        let mut values = Vec::with_capacity(points.len());
        let mut hits = 0usize;

        for batch in points.chunks(BATCH_SIZE) {
            match self.fetch_batch(batch, log) {
                Some(batch_values) => {
                    for v in batch_values {
                        match v {
                            Some(elev) => {
                                hits += 1;
                                values.push(elev);
                            }
                            None => values.push(0.0),
                        }
                    }
                }
                None => values.extend(std::iter::repeat(0.0).take(batch.len())),
            }
        }

        let coverage = if points.is_empty() { 0.0 } else { hits as f64 / points.len() as f64 };
        (values, coverage)
    }

    /// One batch against the active provider, escalating once on failure.
    fn fetch_batch(&mut self, batch: &[(f64, f64)], log: &mut GenLog) -> Option<Vec<Option<f64>>> {
        loop {
            match self.try_provider(self.active, batch, log) {
                Some(values) => return Some(values),
                None if self.active == 0 => {
                    log.warn("primary elevation provider failed; switching to secondary");
                    self.active = 1;
                }
                None => {
                    log.error("both elevation providers failed for a batch");
                    return None;
                }
            }
        }
    }

    fn try_provider(
        &self,
        provider: usize,
        batch: &[(f64, f64)],
        log: &mut GenLog,
    ) -> Option<Vec<Option<f64>>> {
        let locations: Vec<String> = batch
            .iter()
            .map(|(lat, lon)| format!("{lat:.6},{lon:.6}"))
            .collect();
        let url = format!("{}?locations={}", self.endpoints[provider], locations.join("|"));

        for attempt in 0..2 {
            self.pacers[provider].wait();
            let resp = match self.http.get(&url) {
                Ok(resp) => resp,
                Err(e) => {
                    log.warn(format!("elevation batch: {e}"));
                    return None;
                }
            };
            if resp.is_rate_limited() {
                if attempt == 0 {
                    log.info("elevation provider rate-limited; sleeping before retry");
                    std::thread::sleep(self.rate_limit_sleep);
                    continue;
                }
                return None;
            }
            if !resp.is_ok() {
                log.warn(format!("elevation batch: HTTP {}", resp.status));
                return None;
            }
            let parsed: ProviderResponse = match serde_json::from_slice(&resp.body) {
                Ok(p) => p,
                Err(e) => {
                    log.warn(format!("elevation batch: malformed response: {e}"));
                    return None;
                }
            };
            if parsed.results.len() != batch.len() {
                log.warn(format!(
                    "elevation batch: {} results for {} points",
                    parsed.results.len(),
                    batch.len()
                ));
                return None;
            }
            return Some(parsed.results.into_iter().map(|p| p.elevation).collect());
        }
        None
    }

    /// Elevation for every cell of the grid. Small grids sample every cell
    /// center; grids beyond [`SPARSE_THRESHOLD`] sample a stride-s lattice
    /// (endpoints included) and interpolate bilinearly between lattice
    /// cells, degrading to 1-D interpolation or direct copy at the lattice
    /// edge.
    pub fn sample_grid(&mut self, proj: &HexProjection, log: &mut GenLog) -> ElevationGrid {
        log.section("elevation");
        let n = proj.cell_count();

        if n <= SPARSE_THRESHOLD {
            let points: Vec<(f64, f64)> = (0..proj.rows() as i32)
                .flat_map(|row| {
                    (0..proj.cols() as i32).map(move |col| (col, row))
                })
                .map(|(col, row)| {
                    let (lon, lat) = proj.cell_center(col, row);
                    (lat, lon)
                })
                .collect();
            let (values, coverage) = self.fetch_points(&points, log);
            log.kv("points", n);
            log.kv("coverage", format!("{coverage:.3}"));
            log.ok("elevation sampled (full grid)");
            return ElevationGrid { values, coverage };
        }

        // Sparse lattice: stride grows with grid size, endpoints included.
        let stride = ((n as f64 / SPARSE_THRESHOLD as f64).sqrt().ceil() as usize).max(2);
        let lattice_cols = lattice_axis(proj.cols(), stride);
        let lattice_rows = lattice_axis(proj.rows(), stride);

        let mut points = Vec::with_capacity(lattice_cols.len() * lattice_rows.len());
        for &row in &lattice_rows {
            for &col in &lattice_cols {
                let (lon, lat) = proj.cell_center(col as i32, row as i32);
                points.push((lat, lon));
            }
        }
        let (lattice_values, coverage) = self.fetch_points(&points, log);

        let mut values = vec![0.0; n];
        for row in 0..proj.rows() {
            let (r0, r1, u) = bracket(&lattice_rows, row);
            for col in 0..proj.cols() {
                let (c0, c1, t) = bracket(&lattice_cols, col);
                let at = |ri: usize, ci: usize| lattice_values[ri * lattice_cols.len() + ci];
                let top = at(r0, c0) * (1.0 - t) + at(r0, c1) * t;
                let bottom = at(r1, c0) * (1.0 - t) + at(r1, c1) * t;
                values[row * proj.cols() + col] = top * (1.0 - u) + bottom * u;
            }
        }

        log.kv("points", points.len());
        log.kv("stride", stride);
        log.kv("coverage", format!("{coverage:.3}"));
        log.ok("elevation sampled (sparse + bilinear)");
        ElevationGrid { values, coverage }
    }
}

/// Lattice indices along one axis: 0, s, 2s, … plus the last index.
fn lattice_axis(len: usize, stride: usize) -> Vec<usize> {
    let mut axis: Vec<usize> = (0..len).step_by(stride).collect();
    if *axis.last().unwrap() != len - 1 {
        axis.push(len - 1);
    }
    axis
}

/// Bracketing lattice slots for an index: (lower slot, upper slot, fraction).
/// Exact lattice hits and single-slot axes collapse to a direct copy.
fn bracket(axis: &[usize], idx: usize) -> (usize, usize, f64) {
    let hi = axis.partition_point(|&v| v < idx);
    if hi == 0 {
        return (0, 0, 0.0);
    }
    if hi >= axis.len() {
        return (axis.len() - 1, axis.len() - 1, 0.0);
    }
    if axis[hi] == idx {
        return (hi, hi, 0.0);
    }
    let lo = hi - 1;
    let t = (idx - axis[lo]) as f64 / (axis[hi] - axis[lo]) as f64;
    (lo, hi, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::http::MemFetch;
    use crate::types::GeoBounds;

    fn fast(sampler: ElevationSampler<'_>) -> ElevationSampler<'_> {
        sampler.with_timing(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    fn constant_response(count: usize, elevation: f64) -> Vec<u8> {
        let results: Vec<String> = (0..count)
            .map(|_| format!("{{\"elevation\":{elevation}}}"))
            .collect();
        format!("{{\"results\":[{}]}}", results.join(",")).into_bytes()
    }

    #[test]
    fn full_grid_under_threshold() {
        let http = MemFetch::new().route("https://elev1", 200, constant_response(100, 250.0));
        let proj = HexProjection::new(GeoBounds::new(45.0, 46.0, 6.0, 7.0), 10, 10);
        let mut sampler = fast(ElevationSampler::new(&http, "https://elev1", "https://elev2"));
        let mut log = GenLog::new();
        let grid = sampler.sample_grid(&proj, &mut log);
        assert_eq!(grid.values().len(), 100);
        assert!(grid.values().iter().all(|&v| v == 250.0));
        assert_eq!(grid.coverage(), 1.0);
    }

    #[test]
    fn provider_fallback_is_sticky() {
        // Primary always 500s, secondary succeeds.
        let http = MemFetch::new()
            .route("https://elev1", 500, Vec::new())
            .route("https://elev2", 200, constant_response(4, 10.0));
        let mut sampler = fast(ElevationSampler::new(&http, "https://elev1", "https://elev2"));
        let mut log = GenLog::new();

        let (values, coverage) = sampler.fetch_points(&[(1.0, 1.0); 4], &mut log);
        assert_eq!(values, vec![10.0; 4]);
        assert_eq!(coverage, 1.0);
        assert_eq!(sampler.active, 1);

        // Second call goes straight to the secondary.
        let before = http.requests().len();
        let _ = sampler.fetch_points(&[(2.0, 2.0); 4], &mut log);
        let after = http.requests();
        assert!(after[before..].iter().all(|u| u.starts_with("https://elev2")));
    }

    #[test]
    fn nulls_become_zero_and_shrink_coverage() {
        let body = br#"{"results":[{"elevation":5.0},{"elevation":null}]}"#.to_vec();
        let http = MemFetch::new().route("https://elev1", 200, body);
        let mut sampler = fast(ElevationSampler::new(&http, "https://elev1", "https://elev2"));
        let mut log = GenLog::new();
        let (values, coverage) = sampler.fetch_points(&[(0.0, 0.0), (0.1, 0.1)], &mut log);
        assert_eq!(values, vec![5.0, 0.0]);
        assert!((coverage - 0.5).abs() < 1e-9);
    }

    #[test]
    fn lattice_axis_includes_endpoints() {
        assert_eq!(lattice_axis(10, 3), vec![0, 3, 6, 9]);
        assert_eq!(lattice_axis(11, 3), vec![0, 3, 6, 9, 10]);
        assert_eq!(lattice_axis(3, 5), vec![0, 2]);
    }

    #[test]
    fn bracket_interpolates_between_slots() {
        let axis = vec![0usize, 4, 8];
        assert_eq!(bracket(&axis, 0), (0, 0, 0.0));
        assert_eq!(bracket(&axis, 4), (1, 1, 0.0));
        let (lo, hi, t) = bracket(&axis, 6);
        assert_eq!((lo, hi), (1, 2));
        assert!((t - 0.5).abs() < 1e-9);
    }

    #[test]
    fn sparse_grid_interpolates() {
        // 100x100 = 10_000 cells > threshold. Uniform provider value makes
        // interpolation exact everywhere.
        let http = MemFetch::new().route("https://elev1", 200, constant_response(100, 42.0));
        let proj = HexProjection::new(GeoBounds::new(40.0, 50.0, 0.0, 10.0), 100, 100);
        let mut sampler = fast(ElevationSampler::new(&http, "https://elev1", "https://elev2"));
        let mut log = GenLog::new();
        let grid = sampler.sample_grid(&proj, &mut log);
        assert_eq!(grid.values().len(), 10_000);
        assert!(grid.values().iter().all(|&v| (v - 42.0).abs() < 1e-9));
    }
}
