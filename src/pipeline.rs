//! Single-map generation driver: wires the samplers, fetchers, classifier,
//! and post-processor together over one shared projection, and serializes
//! the result as the viewer interchange JSON.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::classify::{classify, post_process};
use crate::common::{GenLog, HttpFetch};
use crate::error::{FuseError, FuseResult};
use crate::hex::{HexProjection, SQRT3};
use crate::ingest::{
    parse_features, ElevationSampler, GazetteerResolver, LandCoverSampler, VectorFetcher,
};
use crate::types::{Cell, ClimateZone, GeoBounds, Tier};

/// Hard ceiling on grid size; larger requests are rejected before any work.
pub const MAX_CELLS: usize = 50_000;

/// Host-injected provider endpoints. The core never hardcodes URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Land-cover tile URL template with a `{tile}` placeholder.
    pub landcover_url: String,
    pub elevation_primary: String,
    pub elevation_secondary: String,
    pub vector_endpoint: String,
    pub gazetteer_endpoint: String,
    /// Minimum river length (km) for gazetteer matches.
    pub gazetteer_min_river_km: f64,
    /// Disable to collapse pacing floors and retry backoffs (tests,
    /// offline replay against canned responses).
    pub pacing: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            landcover_url: String::new(),
            elevation_primary: String::new(),
            elevation_secondary: String::new(),
            vector_endpoint: String::new(),
            gazetteer_endpoint: String::new(),
            gazetteer_min_river_km: 50.0,
            pacing: true,
        }
    }
}

/// Requested map: center plus extent and cell size in km.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSpec {
    pub center_lat: f64,
    pub center_lon: f64,
    pub width_km: f64,
    pub height_km: f64,
    pub cell_km: f64,
}

impl MapSpec {
    /// Grid dimensions: cell width across, staggered row spacing down.
    pub fn grid_size(&self) -> (usize, usize) {
        let cols = (self.width_km / self.cell_km).floor().max(1.0) as usize;
        let rows = (self.height_km / (self.cell_km * SQRT3 / 2.0)).floor().max(1.0) as usize;
        (cols, rows)
    }

    pub fn bounds(&self) -> GeoBounds {
        GeoBounds::around(self.center_lat, self.center_lon, self.width_km, self.height_km)
    }

    pub fn tier(&self) -> Tier {
        Tier::from_cell_km(self.cell_km)
    }
}

/// A finished generation: the projection parameters plus one cell per grid
/// position in row-major order.
#[derive(Debug)]
pub struct GeneratedMap {
    pub bounds: GeoBounds,
    pub cols: usize,
    pub rows: usize,
    pub cell_km: f64,
    pub tier: Tier,
    pub cells: Vec<Cell>,
}

impl GeneratedMap {
    /// Viewer interchange JSON.
    pub fn to_viewer_json(&self) -> serde_json::Value {
        let mut cells = serde_json::Map::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                let cell = &self.cells[row * self.cols + col];
                cells.insert(format!("{col},{row}"), serde_json::to_value(cell).unwrap());
            }
        }
        let (center_lat, center_lon) = self.bounds.center();
        json!({
            "map": {
                "cols": self.cols,
                "rows": self.rows,
                "cellSizeKm": self.cell_km,
                "widthKm": self.bounds.width_km(),
                "heightKm": self.bounds.height_km(),
                "gridType": "hex",
                "center": { "lat": center_lat, "lng": center_lon },
                "bbox": {
                    "s": self.bounds.south,
                    "n": self.bounds.north,
                    "w": self.bounds.west,
                    "e": self.bounds.east,
                },
                "cells": serde_json::Value::Object(cells),
                "labels": {},
            },
            "_meta": {
                "generated": chrono::Utc::now().to_rfc3339(),
                "source": "hexatlas",
                "version": env!("CARGO_PKG_VERSION"),
                "tier": self.tier.name(),
            },
        })
    }
}

/// Generate a map from a center/extent spec. Only `LimitExceeded` and
/// `Fatal` surface as errors; provider trouble degrades with warnings in
/// the log.
pub fn generate_map(
    http: &dyn HttpFetch,
    providers: &ProviderConfig,
    spec: &MapSpec,
    log: &mut GenLog,
) -> FuseResult<GeneratedMap> {
    let (cols, rows) = spec.grid_size();
    generate_bbox_map(http, providers, spec.bounds(), cols, rows, spec.cell_km, true, log)
}

/// Generate over an explicit bbox and grid. `full` disables the vector and
/// gazetteer stages (polar bands run land cover + elevation only).
#[allow(clippy::too_many_arguments)]
pub fn generate_bbox_map(
    http: &dyn HttpFetch,
    providers: &ProviderConfig,
    bounds: GeoBounds,
    cols: usize,
    rows: usize,
    cell_km: f64,
    full: bool,
    log: &mut GenLog,
) -> FuseResult<GeneratedMap> {
    if cols * rows > MAX_CELLS {
        return Err(FuseError::LimitExceeded { cols, rows, limit: MAX_CELLS });
    }
    let tier = Tier::from_cell_km(cell_km);
    let proj = HexProjection::new(bounds, cols, rows);

    log.section("generation");
    log.kv("grid", format!("{cols}×{rows}"));
    log.kv("cell km", format!("{cell_km:.3}"));
    log.kv("tier", tier.name());
    if !full {
        log.info("degraded pipeline: land cover + elevation only");
    }

    // Elevation first: the vector planner needs it for ocean skipping.
    let mut elevation_sampler =
        ElevationSampler::new(http, &providers.elevation_primary, &providers.elevation_secondary);
    if !providers.pacing {
        elevation_sampler = elevation_sampler.with_timing(
            std::time::Duration::ZERO,
            std::time::Duration::ZERO,
            std::time::Duration::ZERO,
        );
    }
    let elevation = elevation_sampler.sample_grid(&proj, log);

    let landcover =
        LandCoverSampler::new(http, &providers.landcover_url).sample(&proj, tier, log);

    let (parsed, rivers) = if full {
        let mut fetcher = VectorFetcher::new(http, &providers.vector_endpoint);
        if !providers.pacing {
            fetcher = fetcher.with_timing(std::time::Duration::ZERO, std::time::Duration::ZERO);
        }
        let vectors = fetcher.fetch(&proj, tier, &elevation, log);
        let parsed = parse_features(&vectors.elements, tier);

        let rivers = GazetteerResolver::new(http, &providers.gazetteer_endpoint).resolve(
            &bounds,
            providers.gazetteer_min_river_km,
            log,
        );
        (parsed, rivers)
    } else {
        (Default::default(), Vec::new())
    };

    let mut grid = classify(&proj, tier, &landcover, &elevation, &parsed, &rivers, log);
    post_process(&mut grid, &proj, &elevation, log);

    // Assemble the output cells.
    let mut cells = Vec::with_capacity(proj.cell_count());
    for row in 0..rows as i32 {
        for col in 0..cols as i32 {
            let idx = proj.cell_index(col, row);
            let (lon, lat) = proj.cell_center(col, row);
            let terrain = grid.terrain[idx];
            cells.push(Cell {
                terrain,
                infrastructure: grid.infrastructure[idx],
                elevation: elevation.get(idx).round() as i32,
                features: grid.features[idx].clone(),
                feature_names: grid.names[idx].clone(),
                attributes: grid.attributes[idx].clone(),
                lat,
                lon,
                confidence: grid.confidence[idx],
                slope_angle: grid.slope_angle[idx],
                climate: ClimateZone::derive(lat, terrain),
                population_k: grid.population_k[idx],
            });
        }
    }

    log_terrain_histogram(&cells, log);
    Ok(GeneratedMap { bounds, cols, rows, cell_km, tier, cells })
}

fn log_terrain_histogram(cells: &[Cell], log: &mut GenLog) {
    use strum::IntoEnumIterator;

    log.section("terrain histogram");
    for terrain in crate::types::Terrain::iter() {
        let count = cells.iter().filter(|c| c.terrain == terrain).count();
        if count > 0 {
            log.kv(<&'static str>::from(terrain), count);
        }
    }
    let featured = cells.iter().filter(|c| !c.features.is_empty()).count();
    log.kv("cells with features", featured);
}
