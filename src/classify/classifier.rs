//! Per-cell fusion of land cover, vector polygons, elevation, and
//! line/area accumulators into terrain, infrastructure, features, and
//! feature names.
//!
//! Two passes over the grid: terrain first (land-cover vote, OSM overlay
//! vote, urban escalation, water refinement, desert heuristic, elevation
//! ladders), then infrastructure and features against the finalized
//! terrain. All per-cell state lives in flat `cols×rows` arenas.

use geo::Contains;

use crate::common::GenLog;
use crate::geom::SpatialIndex;
use crate::hex::{neighbors, rasterize_way, HexProjection};
use crate::ingest::{
    ElevationGrid, LandCoverGrid, ParsedFeatures, PowerSource, RiverName,
};
use crate::types::{
    Feature, FeatureSet, Infrastructure, LandClass, NameMap, Terrain, Tier,
};

/// Classifier output plus the accumulators the post-processor reads.
pub struct ClassifiedGrid {
    pub cols: usize,
    pub rows: usize,
    pub tier: Tier,
    pub terrain: Vec<Terrain>,
    pub infrastructure: Vec<Infrastructure>,
    pub features: Vec<FeatureSet>,
    pub names: Vec<NameMap>,
    /// Post-processing derives emergent attributes here, then merges them
    /// into `features`.
    pub attributes: Vec<FeatureSet>,
    pub confidence: Vec<f32>,
    pub population_k: Vec<u16>,
    /// Ground slope in degrees, filled by the post-processor.
    pub slope_angle: Vec<u8>,
    pub road_count: Vec<u16>,
    pub building_count: Vec<u16>,
}

/// Flat per-cell accumulators filled by rasterizing lines and bucketing
/// point/area features before the per-cell passes run.
struct Accum {
    line_kind: Vec<Infrastructure>,
    road_count: Vec<u16>,
    bridge: Vec<bool>,
    tunnel: Vec<bool>,
    water_line: Vec<bool>,
    canal_line: Vec<bool>,
    stream_line: Vec<bool>,
    nav_tagged: Vec<bool>,
    nav_qualified: Vec<bool>,
    nav_name: Vec<Option<String>>,
    dam: Vec<bool>,
    pipeline: Vec<bool>,
    beach: Vec<bool>,
    power_plant: Vec<bool>,
    barrier: Vec<bool>,
    tower: Vec<bool>,
    hedge_count: Vec<u16>,
    building_count: Vec<u16>,
    flag_infra: Vec<Infrastructure>,
}

impl Accum {
    fn new(n: usize) -> Self {
        Self {
            line_kind: vec![Infrastructure::None; n],
            road_count: vec![0; n],
            bridge: vec![false; n],
            tunnel: vec![false; n],
            water_line: vec![false; n],
            canal_line: vec![false; n],
            stream_line: vec![false; n],
            nav_tagged: vec![false; n],
            nav_qualified: vec![false; n],
            nav_name: vec![None; n],
            dam: vec![false; n],
            pipeline: vec![false; n],
            beach: vec![false; n],
            power_plant: vec![false; n],
            barrier: vec![false; n],
            tower: vec![false; n],
            hedge_count: vec![0; n],
            building_count: vec![0; n],
            flag_infra: vec![Infrastructure::None; n],
        }
    }
}

/// Cells a polyline passes through, deduplicated per way.
fn way_cells(points: &[(f64, f64)], proj: &HexProjection) -> Vec<usize> {
    let mut cells: Vec<usize> = rasterize_way(points, proj)
        .into_iter()
        .filter(|&(c, r)| proj.in_grid(c, r))
        .map(|(c, r)| proj.cell_index(c, r))
        .collect();
    cells.sort_unstable();
    cells.dedup();
    cells
}

/// Cells whose center lies inside a polygon (falling back to the bbox
/// centroid cell for polygons smaller than one cell).
fn polygon_cells(polygon: &geo::Polygon<f64>, proj: &HexProjection) -> Vec<usize> {
    use geo::BoundingRect;
    let Some(rect) = polygon.bounding_rect() else { return Vec::new() };
    let Some((r0, r1, c0, c1)) =
        proj.geo_range_to_grid_range(rect.min().y, rect.max().y, rect.min().x, rect.max().x)
    else {
        return Vec::new();
    };

    let mut cells = Vec::new();
    for row in r0..=r1 {
        for col in c0..=c1 {
            let (lon, lat) = proj.cell_center(col, row);
            if polygon.contains(&geo::point!(x: lon, y: lat)) {
                cells.push(proj.cell_index(col, row));
            }
        }
    }
    if cells.is_empty() {
        let center = geo::point!(
            x: (rect.min().x + rect.max().x) / 2.0,
            y: (rect.min().y + rect.max().y) / 2.0
        );
        if let Some((col, row)) = proj.geo_to_cell(center.x(), center.y()) {
            cells.push(proj.cell_index(col, row));
        }
    }
    cells
}

fn fill_accumulators(
    proj: &HexProjection,
    tier: Tier,
    parsed: &ParsedFeatures,
    rivers: &[RiverName],
    acc: &mut Accum,
) {
    // Line infra: best rank per cell, road passes counted for density.
    for line in &parsed.infra_lines {
        for idx in way_cells(&line.points, proj) {
            if line.kind.rank() > acc.line_kind[idx].rank() {
                acc.line_kind[idx] = line.kind;
            }
            if line.kind.is_road() {
                acc.road_count[idx] = acc.road_count[idx].saturating_add(1);
            }
            acc.bridge[idx] |= line.bridge;
            acc.tunnel[idx] |= line.tunnel;
        }
    }

    for line in &parsed.water_lines {
        for idx in way_cells(line, proj) {
            acc.water_line[idx] = true;
        }
    }
    for line in &parsed.stream_lines {
        for idx in way_cells(line, proj) {
            acc.stream_line[idx] = true;
        }
    }

    // Navigability: a line qualifies if it is ship-tagged, if the
    // gazetteer recognizes its name, or (fine tiers) if it spans enough
    // cells to matter.
    let fine = tier <= Tier::Tactical;
    for nav in &parsed.navigable_lines {
        let cells = way_cells(&nav.points, proj);
        if cells.is_empty() {
            continue;
        }
        let gazetteer_hit = nav
            .actual_name
            .as_deref()
            .map(|name| rivers.iter().any(|r| r.matches(name)))
            .unwrap_or(false);
        let qualified = nav.tagged || gazetteer_hit || (fine && cells.len() >= 3);

        for &idx in &cells {
            acc.nav_tagged[idx] |= nav.tagged;
            if nav.canal {
                acc.canal_line[idx] = true;
            }
            if qualified {
                acc.nav_qualified[idx] = true;
                if acc.nav_name[idx].is_none() {
                    acc.nav_name[idx] = nav.actual_name.clone();
                }
            }
        }
    }

    // Pipelines carry a span filter at coarse tiers.
    for line in &parsed.pipeline_lines {
        let cells = way_cells(line, proj);
        if !fine && cells.len() < 3 {
            continue;
        }
        for idx in cells {
            acc.pipeline[idx] = true;
        }
    }

    for line in &parsed.barrier_lines {
        for idx in way_cells(line, proj) {
            acc.barrier[idx] = true;
        }
    }
    for line in &parsed.hedge_lines {
        for idx in way_cells(line, proj) {
            acc.hedge_count[idx] = acc.hedge_count[idx].saturating_add(1);
        }
    }

    for &(lat, lon) in &parsed.dam_points {
        if let Some((c, r)) = proj.geo_to_cell(lon, lat) {
            acc.dam[proj.cell_index(c, r)] = true;
        }
    }
    for &(lat, lon) in &parsed.tower_nodes {
        if let Some((c, r)) = proj.geo_to_cell(lon, lat) {
            acc.tower[proj.cell_index(c, r)] = true;
        }
    }

    for polygon in &parsed.beach_areas {
        for idx in polygon_cells(polygon, proj) {
            acc.beach[idx] = true;
        }
    }
    for (polygon, source) in parsed
        .power_plant_polygons
        .iter()
        .zip(&parsed.power_plant_sources)
    {
        debug_assert!(*source != PowerSource::Unknown || tier <= Tier::Tactical);
        for idx in polygon_cells(polygon, proj) {
            acc.power_plant[idx] = true;
        }
    }

    for polygon in &parsed.building_areas {
        use geo::{BoundingRect, Centroid};
        let centroid = polygon
            .centroid()
            .or_else(|| polygon.bounding_rect().map(|r| r.centroid()));
        if let Some(p) = centroid {
            if let Some((c, r)) = proj.geo_to_cell(p.x(), p.y()) {
                let idx = proj.cell_index(c, r);
                acc.building_count[idx] = acc.building_count[idx].saturating_add(1);
            }
        }
    }

    // Area flags: the centroid cell of a military base, airfield, or port
    // carries the label outright.
    for area in &parsed.infra_areas {
        let (lat, lon) = area.centroid;
        if let Some((c, r)) = proj.geo_to_cell(lon, lat) {
            let idx = proj.cell_index(c, r);
            if area.kind.rank() > acc.flag_infra[idx].rank() {
                acc.flag_infra[idx] = area.kind;
            }
        }
    }
}

/// Terrain decision for one cell (steps 1-6).
#[allow(clippy::too_many_arguments)]
fn terrain_for_cell(
    proj: &HexProjection,
    tier: Tier,
    col: i32,
    row: i32,
    idx: usize,
    landcover: &LandCoverGrid,
    elevation: &ElevationGrid,
    terrain_index: &SpatialIndex,
    parsed: &ParsedFeatures,
    acc: &Accum,
    osm_vote_out: &mut bool,
) -> Terrain {
    let (_, lat) = proj.cell_center(col, row);
    let builtup = landcover.fraction(idx, LandClass::BuiltUp);

    // 1) OSM terrain vote over sample points; the highest-priority polygon
    //    containing each point casts that point's vote.
    let samples = if tier == Tier::SubTactical { 2 } else { 5 };
    let points = proj.cell_sample_points(col, row, samples);
    let mut osm_terrain: Option<Terrain> = None;
    let mut osm_count = 0usize;
    {
        let mut tally: Vec<(Terrain, usize)> = Vec::new();
        for &(plat, plon) in &points {
            if let Some(area_idx) =
                terrain_index.last_containing(&parsed.terrain_polygons, plat, plon)
            {
                let t = parsed.terrain_areas[area_idx].terrain;
                match tally.iter_mut().find(|(tt, _)| *tt == t) {
                    Some((_, count)) => *count += 1,
                    None => tally.push((t, 1)),
                }
            }
        }
        if let Some(&(t, count)) = tally.iter().max_by_key(|(_, count)| *count) {
            osm_terrain = Some(t);
            osm_count = count;
        }
    }

    // 2) Base choice: OSM wins with ≥20% coverage, unless it claims urban
    //    over a land-cover mix that shows none (zoning artifact).
    let osm_covers = osm_count * 5 >= points.len();
    *osm_vote_out = osm_covers;
    let mut terrain = match osm_terrain {
        Some(t) if osm_covers && !(t.is_urban() && builtup < 0.05) => t,
        _ => landcover
            .majority(idx)
            .map(LandClass::base_terrain)
            .unwrap_or(Terrain::OpenGround),
    };

    // Dense canopy: an overwhelming tree mix upgrades forest.
    if terrain == Terrain::Forest && landcover.fraction(idx, LandClass::TreeCover) >= 0.9 {
        terrain = Terrain::DenseForest;
    }

    // 3) Urban escalation from the built-up mix. OSM-confirmed urban uses
    //    softer thresholds; at sub-tactical the mix is too uniform to be
    //    trusted on its own.
    if !terrain.is_urban() {
        let osm_urban = osm_terrain.is_some_and(|t| t.is_urban());
        if builtup >= 0.45 || (osm_urban && builtup >= 0.15) {
            terrain = Terrain::DenseUrban;
        } else if builtup >= 0.20 || (osm_urban && builtup >= 0.10) {
            terrain = Terrain::LightUrban;
        }
    } else if terrain == Terrain::LightUrban
        && tier == Tier::SubTactical
        && osm_terrain.map_or(true, |t| !t.is_urban())
    {
        // Mix-derived urban is meaningless at building scale; let OSM
        // landuse and building density speak instead.
        terrain = Terrain::OpenGround;
    }

    // 4) A land-cover lake with a waterway through it is really a river.
    if terrain == Terrain::Lake && acc.water_line[idx] && tier <= Tier::Tactical {
        terrain = Terrain::River;
    }

    // 5) Bare/sparse ground in arid latitudes is desert.
    if terrain == Terrain::OpenGround
        && lat.abs() < 35.0
        && landcover.raw_code(idx) == Some(LandClass::BareSparse.code())
    {
        terrain = Terrain::Desert;
    }

    // 6) Elevation ladders; water, urban, farmland, wetland, and ice are
    //    exempt. Arid cells climb a stricter ladder.
    if !terrain.is_water()
        && !terrain.is_urban()
        && !matches!(terrain, Terrain::Farmland | Terrain::Wetland | Terrain::Ice)
    {
        let elev = elevation.get(idx);
        if terrain == Terrain::Desert {
            // High desert plateaus below the mountain line stay desert.
            if elev > 2500.0 {
                terrain = Terrain::Peak;
            } else if elev > 1500.0 {
                terrain = Terrain::Mountain;
            }
        } else {
            let forest = terrain.is_forest();
            if elev > 1500.0 {
                terrain = Terrain::Peak;
            } else if elev > 800.0 {
                terrain = if forest { Terrain::MountainForest } else { Terrain::Mountain };
            } else if elev > 500.0 {
                terrain = if forest { Terrain::MountainForest } else { Terrain::Highland };
            }
        }
    }

    terrain
}

/// Fuse all prepared inputs into the classified grid.
pub fn classify(
    proj: &HexProjection,
    tier: Tier,
    landcover: &LandCoverGrid,
    elevation: &ElevationGrid,
    parsed: &ParsedFeatures,
    rivers: &[RiverName],
    log: &mut GenLog,
) -> ClassifiedGrid {
    log.section("classify");
    let n = proj.cell_count();
    let bounds = *proj.bounds();

    let terrain_index = SpatialIndex::build(&parsed.terrain_polygons, bounds);
    let infra_index = SpatialIndex::build(&parsed.infra_polygons, bounds);

    let mut acc = Accum::new(n);
    fill_accumulators(proj, tier, parsed, rivers, &mut acc);

    // Pass 1: terrain.
    let mut terrain = vec![Terrain::OpenGround; n];
    let mut osm_vote = vec![false; n];
    for row in 0..proj.rows() as i32 {
        for col in 0..proj.cols() as i32 {
            let idx = proj.cell_index(col, row);
            terrain[idx] = terrain_for_cell(
                proj, tier, col, row, idx, landcover, elevation, &terrain_index, parsed,
                &acc, &mut osm_vote[idx],
            );
        }
    }

    // Strategic dams only survive next to standing water.
    if tier == Tier::Strategic {
        for row in 0..proj.rows() as i32 {
            for col in 0..proj.cols() as i32 {
                let idx = proj.cell_index(col, row);
                if !acc.dam[idx] {
                    continue;
                }
                let lake_adjacent = terrain[idx] == Terrain::Lake
                    || neighbors(col, row).iter().any(|&(nc, nr)| {
                        proj.in_grid(nc, nr) && terrain[proj.cell_index(nc, nr)] == Terrain::Lake
                    });
                if !lake_adjacent {
                    acc.dam[idx] = false;
                }
            }
        }
    }

    // Pass 2: infrastructure, features, names.
    let mut grid = ClassifiedGrid {
        cols: proj.cols(),
        rows: proj.rows(),
        tier,
        terrain,
        infrastructure: vec![Infrastructure::None; n],
        features: vec![FeatureSet::new(); n],
        names: vec![NameMap::new(); n],
        attributes: vec![FeatureSet::new(); n],
        confidence: vec![0.0; n],
        population_k: vec![0; n],
        slope_angle: vec![0; n],
        road_count: acc.road_count.clone(),
        building_count: acc.building_count.clone(),
    };

    let fine = tier <= Tier::Tactical;
    let coarse = !fine;
    for row in 0..proj.rows() as i32 {
        for col in 0..proj.cols() as i32 {
            let idx = proj.cell_index(col, row);
            let terrain = grid.terrain[idx];
            let features = &mut grid.features[idx];

            // 7) Infrastructure: area flag or PIP pick, overridden by a
            //    higher-ranked line, then the structural specials.
            let mut area_pick = acc.flag_infra[idx];
            if area_pick == Infrastructure::None && !parsed.infra_areas.is_empty() {
                let (lon, lat) = proj.cell_center(col, row);
                let mut probes = proj.cell_sample_points(col, row, 2);
                probes.push((lat, lon));
                for (plat, plon) in probes {
                    if let Some(hit) =
                        infra_index.last_containing(&parsed.infra_polygons, plat, plon)
                    {
                        let kind = parsed.infra_areas[hit].kind;
                        if kind.rank() > area_pick.rank() {
                            area_pick = kind;
                        }
                    }
                }
            }

            let line_pick = acc.line_kind[idx];
            let mut infra = if line_pick.rank() > area_pick.rank() { line_pick } else { area_pick };

            if acc.bridge[idx] && terrain.is_water() {
                infra = Infrastructure::Bridge;
            }

            if acc.dam[idx] && Infrastructure::Dam.rank() > infra.rank() {
                infra = Infrastructure::Dam;
            }

            if infra == Infrastructure::None && tier == Tier::SubTactical {
                if acc.building_count[idx] >= 8 {
                    infra = Infrastructure::DenseBuildings;
                } else if acc.tower[idx] {
                    infra = Infrastructure::CommsTower;
                } else if acc.barrier[idx] {
                    infra = Infrastructure::Fortification;
                }
            }
            grid.infrastructure[idx] = infra;

            // 8) Feature accumulation: everything that touched the cell,
            //    tier-filtered; winner-take-all never applies here.
            match area_pick {
                Infrastructure::MilitaryBase => { features.insert(Feature::MilitaryBase); }
                Infrastructure::Airfield => { features.insert(Feature::Airfield); }
                Infrastructure::Port => { features.insert(Feature::Port); }
                _ => {}
            }
            match line_pick {
                Infrastructure::Motorway | Infrastructure::TrunkRoad | Infrastructure::PrimaryRoad => {
                    features.insert(Feature::RoadMajor);
                }
                Infrastructure::SecondaryRoad
                | Infrastructure::TertiaryRoad
                | Infrastructure::ResidentialStreet
                | Infrastructure::Track => {
                    features.insert(Feature::RoadMinor);
                }
                Infrastructure::Railway => {
                    features.insert(Feature::Rail);
                }
                _ => {}
            }
            if acc.bridge[idx] {
                features.insert(Feature::Bridge);
            }
            // Tunnel bits only matter where the line actually passes
            // through something: high ground or water.
            if acc.tunnel[idx]
                && (terrain.is_water()
                    || matches!(
                        terrain,
                        Terrain::Highland | Terrain::Mountain | Terrain::Peak | Terrain::MountainForest
                    ))
            {
                features.insert(Feature::Tunnel);
            }
            if acc.water_line[idx] {
                features.insert(Feature::Waterway);
            }
            if acc.canal_line[idx] {
                features.insert(Feature::Canal);
            }
            if acc.stream_line[idx] && fine {
                features.insert(Feature::Stream);
            }
            if acc.dam[idx] {
                features.insert(Feature::Dam);
            }
            if acc.beach[idx] {
                features.insert(Feature::Beach);
            }
            if acc.pipeline[idx] {
                features.insert(Feature::Pipeline);
            }
            if acc.power_plant[idx] {
                features.insert(Feature::PowerPlant);
            }
            if acc.barrier[idx] && fine {
                features.insert(Feature::Barrier);
            }
            if acc.tower[idx] && fine {
                features.insert(Feature::Tower);
            }
            if tier == Tier::SubTactical {
                let hedge_threshold = (10.0 * proj.cell_km()).round().max(1.0) as u16;
                if acc.hedge_count[idx] >= hedge_threshold {
                    features.insert(Feature::Hedgerow);
                }
            }

            // Navigability, with the wadi / alpine-gorge exclusions.
            if acc.nav_qualified[idx] {
                let blocked = (!acc.nav_tagged[idx])
                    && (terrain == Terrain::Desert
                        || (coarse && matches!(terrain, Terrain::Peak | Terrain::Mountain)));
                if !blocked {
                    features.insert(Feature::NavigableWaterway);
                    if let Some(name) = &acc.nav_name[idx] {
                        grid.names[idx]
                            .entry("navigable_waterway".to_string())
                            .or_insert_with(|| name.clone());
                    }
                }
            }

            // Built-up mix in the town band tags a town without upgrading
            // the terrain.
            let builtup = landcover.fraction(idx, LandClass::BuiltUp);
            if !terrain.is_water() && !terrain.is_urban() && (0.05..0.20).contains(&builtup) {
                features.insert(Feature::Town);
            }

            let mut confidence = 0.3;
            if landcover.majority(idx).is_some() {
                confidence += 0.3;
            }
            if osm_vote[idx] {
                confidence += 0.2;
            }
            confidence += 0.2 * elevation.coverage() as f32;
            grid.confidence[idx] = confidence.min(1.0);
        }
    }

    // 9) Settlement names: highest place rank wins a cell, population
    //    breaks ties. The name keys off the urban terrain label, the town
    //    tag, or a synthetic settlement key.
    let mut best_place: Vec<Option<usize>> = vec![None; n];
    for (place_idx, place) in parsed.place_nodes.iter().enumerate() {
        let Some((c, r)) = proj.geo_to_cell(place.lon, place.lat) else { continue };
        let idx = proj.cell_index(c, r);
        let better = match best_place[idx] {
            None => true,
            Some(prev) => {
                let prev = &parsed.place_nodes[prev];
                (place.rank, place.population) > (prev.rank, prev.population)
            }
        };
        if better {
            best_place[idx] = Some(place_idx);
        }
    }
    for idx in 0..n {
        let Some(place_idx) = best_place[idx] else { continue };
        let place = &parsed.place_nodes[place_idx];
        let terrain = grid.terrain[idx];
        let key = if terrain.is_urban() {
            <&'static str>::from(terrain).to_string()
        } else if grid.features[idx].contains(Feature::Town) {
            "town".to_string()
        } else {
            grid.features[idx].insert(Feature::Settlement);
            "settlement".to_string()
        };
        grid.names[idx].insert(key, place.name.clone());
        grid.population_k[idx] = (place.population / 1000).min(u16::MAX as u64) as u16;
    }

    log.kv("cells", n);
    log.kv(
        "named cells",
        grid.names.iter().filter(|m| !m.is_empty()).count(),
    );
    log.ok("classification complete");
    grid
}
