//! Land-cover majority-vote sampler.
//!
//! The planet's class-coded raster is served as 3°×3° tiles. For the grid's
//! bbox we fetch every intersecting tile, then give each hex cell roughly
//! N×N samples (N per tier) across its bbox and take the per-cell majority
//! class alongside the full normalized class mix.

use std::collections::BTreeMap;
use std::io::Read;

use ahash::AHashMap;

use crate::common::{GenLog, HttpFetch};
use crate::error::{FuseError, FuseResult};
use crate::hex::HexProjection;
use crate::types::{LandClass, Tier};

/// Tile id for the 3°-aligned tile containing a point, e.g. `N45E006`.
pub fn lc_tile_id(lat: f64, lon: f64) -> String {
    let lat0 = (lat / 3.0).floor() as i32 * 3;
    let lon0 = (lon / 3.0).floor() as i32 * 3;
    let (ns, lat0) = if lat0 < 0 { ('S', -lat0) } else { ('N', lat0) };
    let (ew, lon0) = if lon0 < 0 { ('W', -lon0) } else { ('E', lon0) };
    format!("{ns}{lat0:02}{ew}{lon0:03}")
}

/// One decoded tile: class byte per pixel, row-major from the NW corner.
struct LandTile {
    sw_lat: f64,
    sw_lon: f64,
    width: usize,
    height: usize,
    classes: Vec<u8>,
}

const TILE_DEG: f64 = 3.0;
const TILE_MAGIC: &[u8; 4] = b"LCT1";

impl LandTile {
    /// Decode a gzip-compressed `LCT1` raster payload.
    fn decode(sw_lat: f64, sw_lon: f64, payload: &[u8]) -> FuseResult<Self> {
        let mut raw = Vec::new();
        flate2::read::GzDecoder::new(payload)
            .read_to_end(&mut raw)
            .map_err(|e| FuseError::parse(format!("tile gunzip: {e}")))?;
        if raw.len() < 12 || &raw[0..4] != TILE_MAGIC {
            return Err(FuseError::parse("tile payload missing LCT1 magic"));
        }
        let width = u32::from_le_bytes(raw[4..8].try_into().unwrap()) as usize;
        let height = u32::from_le_bytes(raw[8..12].try_into().unwrap()) as usize;
        if raw.len() != 12 + width * height {
            return Err(FuseError::parse(format!(
                "tile payload size {} does not match {width}×{height}",
                raw.len() - 12
            )));
        }
        Ok(Self { sw_lat, sw_lon, width, height, classes: raw[12..].to_vec() })
    }

    /// Class code at a geographic point, None outside the tile.
    fn class_at(&self, lat: f64, lon: f64) -> Option<u8> {
        let fx = (lon - self.sw_lon) / TILE_DEG;
        let fy = (self.sw_lat + TILE_DEG - lat) / TILE_DEG; // north row first
        if !(0.0..1.0).contains(&fx) || !(0.0..1.0).contains(&fy) {
            return None;
        }
        let px = ((fx * self.width as f64) as usize).min(self.width - 1);
        let py = ((fy * self.height as f64) as usize).min(self.height - 1);
        Some(self.classes[py * self.width + px])
    }
}

/// Per-cell land-cover result: majority class plus the normalized class mix.
pub struct LandCoverGrid {
    majority: Vec<Option<LandClass>>,
    mix: Vec<BTreeMap<LandClass, f32>>,
    /// Raw class code of the majority sample, kept for heuristics that care
    /// about the source code rather than the mapped class (bare/sparse).
    raw: Vec<Option<u8>>,
    coverage: f64,
}

impl LandCoverGrid {
    pub fn empty(cell_count: usize) -> Self {
        Self {
            majority: vec![None; cell_count],
            mix: vec![BTreeMap::new(); cell_count],
            raw: vec![None; cell_count],
            coverage: 0.0,
        }
    }

    #[inline]
    pub fn majority(&self, idx: usize) -> Option<LandClass> {
        self.majority[idx]
    }

    #[inline]
    pub fn raw_code(&self, idx: usize) -> Option<u8> {
        self.raw[idx]
    }

    /// Normalized fraction of a class within the cell's samples.
    #[inline]
    pub fn fraction(&self, idx: usize, class: LandClass) -> f32 {
        self.mix[idx].get(&class).copied().unwrap_or(0.0)
    }

    pub fn mix(&self, idx: usize) -> &BTreeMap<LandClass, f32> {
        &self.mix[idx]
    }

    /// Fraction of cells that received at least one sample.
    #[inline]
    pub fn coverage(&self) -> f64 {
        self.coverage
    }

    #[cfg(test)]
    pub(crate) fn set_for_test(&mut self, idx: usize, class: LandClass, fraction: f32) {
        self.majority[idx] = Some(class);
        self.raw[idx] = Some(class.code());
        self.mix[idx].insert(class, fraction);
        self.coverage = 1.0;
    }
}

pub struct LandCoverSampler<'a> {
    http: &'a dyn HttpFetch,
    /// URL template with a `{tile}` placeholder.
    url_template: String,
}

impl<'a> LandCoverSampler<'a> {
    pub fn new(http: &'a dyn HttpFetch, url_template: impl Into<String>) -> Self {
        Self { http, url_template: url_template.into() }
    }

    /// Sample the whole grid. Tiles that 404 are treated as absence (open
    /// ocean); other transport failures skip the tile with a warning and
    /// leave its cells defaulted.
    pub fn sample(&self, proj: &HexProjection, tier: Tier, log: &mut GenLog) -> LandCoverGrid {
        log.section("land cover");
        let tiles = self.fetch_tiles(proj, log);
        if tiles.is_empty() {
            log.info("no land-cover tiles available; all cells default");
            return LandCoverGrid::empty(proj.cell_count());
        }

        let n = tier.landcover_samples();
        let mut grid = LandCoverGrid::empty(proj.cell_count());
        let mut covered = 0usize;

        let mut counts: AHashMap<u8, u32> = AHashMap::new();
        for row in 0..proj.rows() as i32 {
            for col in 0..proj.cols() as i32 {
                counts.clear();
                for (lat, lon) in proj.cell_sample_points(col, row, n) {
                    let key = (
                        (lat / TILE_DEG).floor() as i32,
                        (lon / TILE_DEG).floor() as i32,
                    );
                    if let Some(tile) = tiles.get(&key) {
                        if let Some(code) = tile.class_at(lat, lon) {
                            *counts.entry(code).or_insert(0) += 1;
                        }
                    }
                }
                if counts.is_empty() {
                    continue;
                }
                covered += 1;

                let idx = proj.cell_index(col, row);
                let total: u32 = counts.values().sum();
                // Majority with deterministic ties: lowest class code wins.
                let (&best_code, _) = counts
                    .iter()
                    .max_by_key(|(code, count)| (**count, std::cmp::Reverse(**code)))
                    .unwrap();
                grid.raw[idx] = Some(best_code);
                grid.majority[idx] = LandClass::from_code(best_code);
                for (&code, &count) in &counts {
                    if let Some(class) = LandClass::from_code(code) {
                        *grid.mix[idx].entry(class).or_insert(0.0) +=
                            count as f32 / total as f32;
                    }
                }
            }
        }

        grid.coverage = covered as f64 / proj.cell_count() as f64;
        log.kv("tiles", tiles.len());
        log.kv("coverage", format!("{:.3}", grid.coverage));
        log.ok("land cover sampled");
        grid
    }

    fn fetch_tiles(
        &self,
        proj: &HexProjection,
        log: &mut GenLog,
    ) -> AHashMap<(i32, i32), LandTile> {
        let b = proj.bounds();
        let lat0 = (b.south / TILE_DEG).floor() as i32;
        let lat1 = (b.north / TILE_DEG).floor() as i32;
        let lon0 = (b.west / TILE_DEG).floor() as i32;
        let lon1 = (b.east / TILE_DEG).floor() as i32;

        let mut tiles = AHashMap::new();
        for ty in lat0..=lat1 {
            for tx in lon0..=lon1 {
                let sw_lat = ty as f64 * TILE_DEG;
                let sw_lon = tx as f64 * TILE_DEG;
                let tile_id = lc_tile_id(sw_lat, sw_lon);
                let url = self.url_template.replace("{tile}", &tile_id);

                match self.http.get(&url) {
                    Ok(resp) if resp.is_ok() => {
                        match LandTile::decode(sw_lat, sw_lon, &resp.body) {
                            Ok(tile) => {
                                tiles.insert((ty, tx), tile);
                            }
                            Err(e) => log.warn(format!("tile {tile_id}: {e}")),
                        }
                    }
                    Ok(resp) if resp.is_not_found() => {
                        log.info(format!("tile {tile_id}: not present (ocean)"));
                    }
                    Ok(resp) => {
                        log.warn(format!("tile {tile_id}: HTTP {}", resp.status));
                    }
                    Err(e) => {
                        log.warn(format!("tile {tile_id}: {e}"));
                    }
                }
            }
        }
        tiles
    }
}

/// Encode a raster into the `LCT1` tile payload (gzip). Test and host-proxy
/// helper; the sampler only decodes.
pub(crate) fn encode_tile(width: usize, height: usize, classes: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use std::io::Write;

    debug_assert_eq!(classes.len(), width * height);
    let mut raw = Vec::with_capacity(12 + classes.len());
    raw.extend_from_slice(TILE_MAGIC);
    raw.extend_from_slice(&(width as u32).to_le_bytes());
    raw.extend_from_slice(&(height as u32).to_le_bytes());
    raw.extend_from_slice(classes);

    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(&raw).unwrap();
    encoder.finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::http::MemFetch;
    use crate::types::GeoBounds;

    #[test]
    fn tile_ids() {
        assert_eq!(lc_tile_id(45.5, 6.2), "N45E006");
        assert_eq!(lc_tile_id(-0.5, -0.5), "S03W003");
        assert_eq!(lc_tile_id(0.0, 0.0), "N00E000");
    }

    fn uniform_tile(code: u8) -> Vec<u8> {
        encode_tile(30, 30, &vec![code; 900])
    }

    #[test]
    fn uniform_tile_gives_uniform_majority() {
        let http = MemFetch::new().route("https://lc/N45E006", 200, uniform_tile(40));
        let proj = HexProjection::new(GeoBounds::new(45.2, 45.8, 6.2, 6.8), 10, 10);
        let sampler = LandCoverSampler::new(&http, "https://lc/{tile}");
        let mut log = GenLog::new();
        let grid = sampler.sample(&proj, Tier::Operational, &mut log);

        assert_eq!(grid.coverage(), 1.0);
        for idx in 0..proj.cell_count() {
            assert_eq!(grid.majority(idx), Some(LandClass::Cropland));
            assert!((grid.fraction(idx, LandClass::Cropland) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_tile_is_absence_not_error() {
        let http = MemFetch::new(); // everything 404s
        let proj = HexProjection::new(GeoBounds::new(45.2, 45.8, 6.2, 6.8), 5, 5);
        let sampler = LandCoverSampler::new(&http, "https://lc/{tile}");
        let mut log = GenLog::new();
        let grid = sampler.sample(&proj, Tier::Operational, &mut log);
        assert_eq!(grid.coverage(), 0.0);
        assert_eq!(grid.majority(0), None);
        assert_eq!(log.error_count(), 0);
    }

    #[test]
    fn split_tile_majority_votes_per_cell() {
        // Left half water (80), right half grass (30).
        let mut classes = vec![0u8; 900];
        for row in 0..30 {
            for col in 0..30 {
                classes[row * 30 + col] = if col < 15 { 80 } else { 30 };
            }
        }
        let http = MemFetch::new().route("https://lc/N45E006", 200, encode_tile(30, 30, &classes));
        // Bbox covering the whole tile, 6x6 grid.
        let proj = HexProjection::new(GeoBounds::new(45.0, 48.0, 6.0, 9.0), 6, 6);
        let sampler = LandCoverSampler::new(&http, "https://lc/{tile}");
        let mut log = GenLog::new();
        let grid = sampler.sample(&proj, Tier::Operational, &mut log);

        // A cell on the far west should vote water, far east grass.
        let west_idx = proj.cell_index(0, 3);
        let east_idx = proj.cell_index(5, 3);
        assert_eq!(grid.majority(west_idx), Some(LandClass::Water));
        assert_eq!(grid.majority(east_idx), Some(LandClass::Grassland));
        assert!(grid.fraction(west_idx, LandClass::Water) > 0.5);
    }
}
