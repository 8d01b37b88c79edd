// End-to-end generation against canned provider fixtures: a coastal strip
// with an urban waterfront, exercised through the full pipeline.

use flate2::write::GzEncoder;
use hexatlas::{
    generate_bbox_map, ElevationSampler, GenLog, GeoBounds, HexProjection, Infrastructure,
    MemFetch, ProviderConfig, Terrain, SPARSE_THRESHOLD,
};
use std::io::Write;
use std::time::Duration;

/// Gzip LCT1 tile payload: class byte per pixel, row-major from the NW.
fn tile_payload(width: usize, height: usize, class_at: impl Fn(usize, usize) -> u8) -> Vec<u8> {
    let mut raw = Vec::with_capacity(12 + width * height);
    raw.extend_from_slice(b"LCT1");
    raw.extend_from_slice(&(width as u32).to_le_bytes());
    raw.extend_from_slice(&(height as u32).to_le_bytes());
    for py in 0..height {
        for px in 0..width {
            raw.push(class_at(px, py));
        }
    }
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(&raw).unwrap();
    encoder.finish().unwrap()
}

fn elevation_response(count: usize, elevation: f64) -> Vec<u8> {
    let results: Vec<String> = (0..count)
        .map(|_| format!("{{\"elevation\":{elevation}}}"))
        .collect();
    format!("{{\"results\":[{}]}}", results.join(",")).into_bytes()
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
fn coastal_strip_floods_ocean_and_places_shore_ports() {
    // Bbox inside tile N45E006; tile pixels west of lon 6.5 are water
    // (class 80), the rest built-up (class 50). The tile spans 3° at 60 px,
    // so the split sits at pixel 10.
    let tile = tile_payload(60, 60, |px, _| if px < 10 { 80 } else { 50 });
    let http = MemFetch::new()
        .route("https://lc/N45E006", 200, tile)
        .route("https://elev1", 200, elevation_response(100, 0.5));

    let bounds = GeoBounds::new(45.2, 45.8, 6.2, 6.8);
    let mut log = GenLog::new();
    let map = generate_bbox_map(&http, &providers(), bounds, 20, 20, 2.0, true, &mut log)
        .expect("generation succeeds");

    assert_eq!(map.cells.len(), 400);

    let coastal = map
        .cells
        .iter()
        .filter(|c| c.terrain == Terrain::CoastalWater)
        .count();
    let deep = map
        .cells
        .iter()
        .filter(|c| c.terrain == Terrain::DeepWater)
        .count();
    let urban = map.cells.iter().filter(|c| c.terrain.is_urban()).count();

    // A real coastline: both water bands present, urban east bank present.
    assert!(coastal + deep > 20, "water cells: {coastal} + {deep}");
    assert!(coastal > 0 && deep > 0);
    assert!(urban > 20, "urban cells: {urban}");

    // At least one shore port on an urban cell adjacent to water.
    let ports: Vec<_> = map
        .cells
        .iter()
        .filter(|c| c.infrastructure == Infrastructure::Port)
        .collect();
    assert!(!ports.is_empty());
    assert!(ports.iter().all(|c| c.terrain.is_urban()));

    // Water cells keep their sampled elevation (rounded).
    assert!(map
        .cells
        .iter()
        .all(|c| c.elevation == 1 || c.elevation == 0));
}

#[test]
fn elevation_threshold_switches_to_sparse_sampling() {
    let http = MemFetch::new().route("https://elev1", 200, elevation_response(100, 7.0));
    let mut log = GenLog::new();

    // Exactly the threshold: full sampling, one batch per 100 cells.
    let proj = HexProjection::new(GeoBounds::new(40.0, 45.0, 0.0, 5.0), 50, 100);
    assert_eq!(proj.cell_count(), SPARSE_THRESHOLD);
    let mut sampler = ElevationSampler::new(&http, "https://elev1", "https://elev2")
        .with_timing(Duration::ZERO, Duration::ZERO, Duration::ZERO);
    sampler.sample_grid(&proj, &mut log);
    let full_requests = http.requests().len();
    assert_eq!(full_requests, 50);

    // One past the threshold: the sparse lattice needs far fewer batches.
    let http = MemFetch::new().route("https://elev1", 200, elevation_response(100, 7.0));
    let proj = HexProjection::new(GeoBounds::new(40.0, 45.0, 0.0, 5.0), 51, 100);
    assert!(proj.cell_count() > SPARSE_THRESHOLD);
    let mut sampler = ElevationSampler::new(&http, "https://elev1", "https://elev2")
        .with_timing(Duration::ZERO, Duration::ZERO, Duration::ZERO);
    sampler.sample_grid(&proj, &mut log);
    assert!(http.requests().len() < full_requests / 2);
}

#[test]
fn open_ocean_map_skips_every_vector_chunk() {
    // Strategic map over nothing but sea-level cells: every chunk is
    // flagged ocean and the vector endpoint is never contacted.
    let http = MemFetch::new().route("https://elev1", 200, elevation_response(100, 0.0));
    let bounds = GeoBounds::new(25.0, 34.0, -44.5, -35.5);
    let mut log = GenLog::new();
    let map = generate_bbox_map(&http, &providers(), bounds, 50, 100, 10.0, true, &mut log)
        .expect("generation succeeds");

    assert!(map
        .cells
        .iter()
        .all(|c| matches!(c.terrain, Terrain::DeepWater | Terrain::CoastalWater)));
    assert!(map
        .cells
        .iter()
        .all(|c| c.infrastructure == Infrastructure::None));
    assert!(!http
        .requests()
        .iter()
        .any(|r| r.starts_with("https://overpass")));
}
