//! Post-processing: emergent attributes derived from the classified grid.
//!
//! Passes run in a fixed order (ocean flood fill, road-density urban,
//! chokepoints, landing zones, cliffs, ridgelines, treelines, slope tags,
//! building density, elevation advantage, shore ports) and finish by
//! merging the attribute set into the feature set. The whole stage is
//! idempotent: a second run leaves the grid unchanged.

use std::collections::VecDeque;

use crate::classify::ClassifiedGrid;
use crate::common::GenLog;
use crate::hex::{neighbors, HexProjection};
use crate::ingest::ElevationGrid;
use crate::types::{Feature, Infrastructure, Terrain, Tier};

/// Valid neighbors of a cell as flat indices.
fn neighbor_indices(proj: &HexProjection, col: i32, row: i32) -> impl Iterator<Item = usize> + '_ {
    neighbors(col, row)
        .into_iter()
        .filter(|&(c, r)| proj.in_grid(c, r))
        .map(|(c, r)| proj.cell_index(c, r))
}

fn for_each_cell(proj: &HexProjection, mut f: impl FnMut(i32, i32, usize)) {
    for row in 0..proj.rows() as i32 {
        for col in 0..proj.cols() as i32 {
            f(col, row, proj.cell_index(col, row));
        }
    }
}

/// Flood-fill ocean from the map border and split it into coastal and deep
/// water by BFS distance from land. Skipped when elevation coverage is too
/// low to trust sea level.
fn ocean_fill(grid: &mut ClassifiedGrid, proj: &HexProjection, elevation: &ElevationGrid) {
    if elevation.coverage() <= 0.5 {
        return;
    }
    let n = proj.cell_count();
    let seedable = |terrain: Terrain| {
        matches!(terrain, Terrain::OpenGround | Terrain::Lake | Terrain::Desert)
    };

    let mut ocean = vec![false; n];
    let mut queue = VecDeque::new();
    for_each_cell(proj, |col, row, idx| {
        let border = row == 0
            || col == 0
            || row == proj.rows() as i32 - 1
            || col == proj.cols() as i32 - 1;
        if border && seedable(grid.terrain[idx]) && elevation.get(idx) <= 1.0 {
            ocean[idx] = true;
            queue.push_back((col, row));
        }
    });

    while let Some((col, row)) = queue.pop_front() {
        for (nc, nr) in neighbors(col, row) {
            if !proj.in_grid(nc, nr) {
                continue;
            }
            let nidx = proj.cell_index(nc, nr);
            if !ocean[nidx] && seedable(grid.terrain[nidx]) && elevation.get(nidx) <= 1.0 {
                ocean[nidx] = true;
                queue.push_back((nc, nr));
            }
        }
    }

    // Land distance: multi-source BFS from every non-ocean cell.
    let mut dist = vec![u32::MAX; n];
    let mut queue = VecDeque::new();
    for_each_cell(proj, |col, row, idx| {
        if !ocean[idx] {
            dist[idx] = 0;
            queue.push_back((col, row));
        }
    });
    while let Some((col, row)) = queue.pop_front() {
        let d = dist[proj.cell_index(col, row)];
        for (nc, nr) in neighbors(col, row) {
            if !proj.in_grid(nc, nr) {
                continue;
            }
            let nidx = proj.cell_index(nc, nr);
            if dist[nidx] == u32::MAX {
                dist[nidx] = d + 1;
                queue.push_back((nc, nr));
            }
        }
    }

    for idx in 0..n {
        if ocean[idx] {
            grid.terrain[idx] = if dist[idx] > 3 {
                Terrain::DeepWater
            } else {
                Terrain::CoastalWater
            };
        }
    }
}

/// Promote open terrain with dense rasterized road coverage (and similarly
/// dense neighbors) to dense urban.
fn road_density_urban(grid: &mut ClassifiedGrid, proj: &HexProjection, cell_km: f64) {
    let threshold = ((4.0 / cell_km).round() as u16).max(2);
    let dense: Vec<bool> = grid.road_count.iter().map(|&c| c >= threshold).collect();

    let mut promote = vec![false; proj.cell_count()];
    for_each_cell(proj, |col, row, idx| {
        if !grid.terrain[idx].is_open() || !dense[idx] {
            return;
        }
        let dense_neighbors = neighbor_indices(proj, col, row)
            .filter(|&nidx| dense[nidx])
            .count();
        promote[idx] = dense_neighbors >= 3;
    });
    for (idx, &p) in promote.iter().enumerate() {
        if p {
            grid.terrain[idx] = Terrain::DenseUrban;
        }
    }
}

/// A passable cell flanked by impassable terrain for two steps on two
/// opposing sides is a chokepoint.
fn chokepoints(grid: &mut ClassifiedGrid, proj: &HexProjection) {
    let impassable = |proj: &HexProjection, grid: &ClassifiedGrid, c: i32, r: i32| {
        proj.in_grid(c, r) && grid.terrain[proj.cell_index(c, r)].is_impassable()
    };

    let mut hits = Vec::new();
    for_each_cell(proj, |col, row, idx| {
        if grid.terrain[idx].is_impassable() {
            return;
        }
        // Opposing neighbor pairs in the fixed E,SE,SW,W,NW,NE order.
        for (d, opp) in [(0usize, 3usize), (1, 4), (2, 5)] {
            let a1 = neighbors(col, row)[d];
            let a2 = neighbors(a1.0, a1.1)[d];
            let b1 = neighbors(col, row)[opp];
            let b2 = neighbors(b1.0, b1.1)[opp];
            if impassable(proj, grid, a1.0, a1.1)
                && impassable(proj, grid, a2.0, a2.1)
                && impassable(proj, grid, b1.0, b1.1)
                && impassable(proj, grid, b2.0, b2.1)
            {
                hits.push(idx);
                return;
            }
        }
    });
    for idx in hits {
        grid.attributes[idx].insert(Feature::Chokepoint);
    }
}

fn max_neighbor_delta(
    proj: &HexProjection,
    elevation: &ElevationGrid,
    col: i32,
    row: i32,
    idx: usize,
) -> f64 {
    neighbor_indices(proj, col, row)
        .map(|nidx| (elevation.get(nidx) - elevation.get(idx)).abs())
        .fold(0.0, f64::max)
}

/// Flat, open, non-urban cells where the steepest neighbor delta stays
/// under a 5° slope. Tactical and finer additionally require a cluster of
/// at least two candidates.
fn landing_zones(
    grid: &mut ClassifiedGrid,
    proj: &HexProjection,
    elevation: &ElevationGrid,
    tier: Tier,
    cell_km: f64,
) {
    let max_delta = (5f64).to_radians().tan() * cell_km * 1000.0;
    let n = proj.cell_count();

    let mut candidate = vec![false; n];
    for_each_cell(proj, |col, row, idx| {
        candidate[idx] = grid.terrain[idx].is_open()
            && max_neighbor_delta(proj, elevation, col, row, idx) < max_delta;
    });

    for_each_cell(proj, |col, row, idx| {
        if !candidate[idx] {
            return;
        }
        if tier <= Tier::Tactical {
            let clustered = neighbor_indices(proj, col, row).any(|nidx| candidate[nidx]);
            if !clustered {
                return;
            }
        }
        grid.attributes[idx].insert(Feature::LandingZone);
    });
}

/// Apply the post-processing passes and merge attributes into features.
pub fn post_process(
    grid: &mut ClassifiedGrid,
    proj: &HexProjection,
    elevation: &ElevationGrid,
    log: &mut GenLog,
) {
    log.section("post-process");
    let tier = grid.tier;
    let cell_km = proj.cell_km();
    let cell_m = cell_km * 1000.0;

    ocean_fill(grid, proj, elevation);
    road_density_urban(grid, proj, cell_km);
    chokepoints(grid, proj);
    landing_zones(grid, proj, elevation, tier, cell_km);

    for_each_cell(proj, |col, row, idx| {
        let terrain = grid.terrain[idx];
        let elev = elevation.get(idx);
        let delta = max_neighbor_delta(proj, elevation, col, row, idx);

        // Slope in degrees is recorded for every cell; the tags are
        // tier-gated below.
        let slope_deg = (delta / cell_m).atan().to_degrees();
        grid.slope_angle[idx] = slope_deg.round().clamp(0.0, 90.0) as u8;

        if tier != Tier::Strategic && delta >= 250.0 * cell_km {
            grid.attributes[idx].insert(Feature::Cliffs);
        }

        if tier != Tier::Strategic && !terrain.is_water() && elev >= 50.0 {
            let all_lower = neighbor_indices(proj, col, row)
                .all(|nidx| elevation.get(nidx) <= elev - 30.0);
            if all_lower && neighbor_indices(proj, col, row).next().is_some() {
                grid.attributes[idx].insert(Feature::Ridgeline);
            }
        }

        if tier <= Tier::Tactical && terrain.is_forest() {
            let open_adjacent = neighbor_indices(proj, col, row)
                .any(|nidx| grid.terrain[nidx].is_open());
            if open_adjacent {
                grid.attributes[idx].insert(Feature::Treeline);
            }
        }

        if tier <= Tier::Tactical {
            if slope_deg > 30.0 && tier == Tier::SubTactical {
                grid.attributes[idx].insert(Feature::SlopeExtreme);
            } else if slope_deg > 15.0 {
                grid.attributes[idx].insert(Feature::SlopeSteep);
            }
        }

        if tier == Tier::SubTactical {
            if grid.building_count[idx] >= 8 {
                grid.attributes[idx].insert(Feature::BuildingDense);
            } else if grid.building_count[idx] >= 2 {
                grid.attributes[idx].insert(Feature::BuildingSparse);
            }
        }

        // Elevation advantage over the neighborhood mean.
        let mut sum = 0.0;
        let mut count = 0usize;
        for nidx in neighbor_indices(proj, col, row) {
            sum += elevation.get(nidx);
            count += 1;
        }
        if count > 0 && elev >= sum / count as f64 + 50.0 {
            grid.attributes[idx].insert(Feature::ElevationAdvantage);
        }
    });

    // Shore ports: urban waterfront with no other infrastructure.
    let mut ports = Vec::new();
    for_each_cell(proj, |col, row, idx| {
        if grid.terrain[idx].is_urban()
            && grid.infrastructure[idx] == Infrastructure::None
            && neighbor_indices(proj, col, row).any(|nidx| grid.terrain[nidx].is_water())
        {
            ports.push(idx);
        }
    });
    for idx in ports {
        grid.infrastructure[idx] = Infrastructure::Port;
        grid.attributes[idx].insert(Feature::Port);
    }

    // Fold the attribute set into the feature set; attributes stay
    // populated for backward reads.
    let mut attribute_cells = 0usize;
    for idx in 0..proj.cell_count() {
        if !grid.attributes[idx].is_empty() {
            attribute_cells += 1;
            let attrs = grid.attributes[idx].clone();
            grid.features[idx].merge(&attrs);
        }
    }

    log.kv("cells with attributes", attribute_cells);
    log.ok("post-processing complete");
}
