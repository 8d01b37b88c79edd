//! Tiered vector-feature fetch: query composition, chunking, ocean-chunk
//! skipping, retry with terrain-only fallback, and cross-chunk dedup.

use std::collections::HashMap;
use std::time::Duration;

use ahash::AHashSet;
use serde::Deserialize;

use crate::common::{GenLog, HttpFetch};
use crate::hex::HexProjection;
use crate::ingest::ElevationGrid;
use crate::types::{GeoBounds, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMember {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub geometry: Vec<LatLon>,
}

/// One raw vector element as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct RawElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub id: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default)]
    pub geometry: Vec<LatLon>,
    #[serde(default)]
    pub members: Vec<RawMember>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl RawElement {
    #[inline]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    #[inline]
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tag(key) == Some(value)
    }

    /// Way geometry as (lat, lon) pairs.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.geometry.iter().map(|p| (p.lat, p.lon)).collect()
    }
}

#[derive(Deserialize)]
struct ProviderEnvelope {
    #[serde(default)]
    elements: Vec<RawElement>,
}

/// Outcome of the chunked fetch, with per-chunk accounting for the log.
pub struct VectorResult {
    pub elements: Vec<RawElement>,
    pub chunks_total: usize,
    pub chunks_ocean: usize,
    pub chunks_failed: usize,
    pub chunks_fallback: usize,
}

/// Per-tier query expression over a bbox `(south, west, north, east)`.
/// Coarser tiers only ask for what they can render: motorway/trunk/primary
/// everywhere, tertiary from tactical down, residential only sub-tactical.
fn tier_query(tier: Tier, b: &GeoBounds) -> String {
    let bbox = format!("({},{},{},{})", b.south, b.west, b.north, b.east);
    let mut parts: Vec<String> = Vec::new();

    // Terrain polygons are wanted at every tier.
    for selector in [
        "way[\"natural\"~\"^(water|wood|wetland|beach|glacier|scrub|heath|sand|bare_rock)$\"]",
        "way[\"landuse\"~\"^(forest|farmland|meadow|orchard|vineyard|residential|industrial|quarry|basin|reservoir)$\"]",
        "relation[\"natural\"=\"water\"]",
        "relation[\"landuse\"=\"forest\"]",
        "relation[\"waterway\"][\"name\"]",
    ] {
        parts.push(format!("{selector}{bbox};"));
    }

    // Waterways.
    let waterway = match tier {
        Tier::SubTactical | Tier::Tactical => "^(river|canal|stream|drain|ditch)$",
        Tier::Operational => "^(river|canal|stream)$",
        Tier::Strategic => "^(river|canal)$",
    };
    parts.push(format!("way[\"waterway\"~\"{waterway}\"]{bbox};"));

    // Roads and rail, tier-gated.
    let highway = match tier {
        Tier::SubTactical => {
            "^(motorway|trunk|primary|secondary|tertiary|unclassified|residential|track|service)$"
        }
        Tier::Tactical => "^(motorway|trunk|primary|secondary|tertiary)$",
        Tier::Operational => "^(motorway|trunk|primary|secondary)$",
        Tier::Strategic => "^(motorway|trunk|primary)$",
    };
    parts.push(format!("way[\"highway\"~\"{highway}\"]{bbox};"));
    parts.push(format!("way[\"railway\"~\"^(rail|light_rail)$\"]{bbox};"));

    // Structural areas and points.
    for selector in [
        "way[\"aeroway\"~\"^(aerodrome|runway)$\"]",
        "relation[\"aeroway\"=\"aerodrome\"]",
        "way[\"landuse\"=\"military\"]",
        "relation[\"landuse\"=\"military\"]",
        "way[\"industrial\"=\"port\"]",
        "way[\"harbour\"=\"yes\"]",
        "way[\"waterway\"=\"dam\"]",
        "node[\"waterway\"=\"dam\"]",
        "way[\"man_made\"=\"pipeline\"]",
        "way[\"power\"=\"plant\"]",
        "relation[\"power\"=\"plant\"]",
        "node[\"place\"~\"^(city|town|village)$\"]",
    ] {
        parts.push(format!("{selector}{bbox};"));
    }

    if tier == Tier::SubTactical {
        for selector in [
            "way[\"building\"]",
            "way[\"barrier\"~\"^(wall|fence|hedge)$\"]",
            "node[\"man_made\"~\"^(tower|communications_tower|water_tower)$\"]",
        ] {
            parts.push(format!("{selector}{bbox};"));
        }
    }

    format!(
        "[out:json][timeout:90];({});out geom;",
        parts.concat()
    )
}

/// Terrain-only fallback: polygons and waterways, no roads/rail/infra lines.
fn terrain_only_query(b: &GeoBounds) -> String {
    let bbox = format!("({},{},{},{})", b.south, b.west, b.north, b.east);
    let parts = [
        format!("way[\"natural\"~\"^(water|wood|wetland|beach|glacier)$\"]{bbox};"),
        format!("way[\"landuse\"~\"^(forest|farmland|meadow|residential)$\"]{bbox};"),
        format!("relation[\"natural\"=\"water\"]{bbox};"),
        format!("way[\"waterway\"~\"^(river|canal)$\"]{bbox};"),
    ];
    format!("[out:json][timeout:90];({});out geom;", parts.concat())
}

pub struct VectorFetcher<'a> {
    http: &'a dyn HttpFetch,
    endpoint: String,
    retry_backoffs: [Duration; 2],
    interchunk_unit: Duration,
}

impl<'a> VectorFetcher<'a> {
    pub fn new(http: &'a dyn HttpFetch, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            retry_backoffs: [Duration::from_secs(8), Duration::from_secs(15)],
            interchunk_unit: Duration::from_secs(1),
        }
    }

    /// Collapse all sleeps (tests, offline replay).
    pub fn with_timing(mut self, backoff: Duration, interchunk: Duration) -> Self {
        self.retry_backoffs = [backoff, backoff];
        self.interchunk_unit = interchunk;
        self
    }

    /// Chunked fetch over the grid bbox. Chunks whose elevation samples are
    /// all at sea level are skipped outright; failed chunks degrade to a
    /// terrain-only query and then to zero elements.
    pub fn fetch(
        &self,
        proj: &HexProjection,
        tier: Tier,
        elevation: &ElevationGrid,
        log: &mut GenLog,
    ) -> VectorResult {
        log.section("vector features");
        let bounds = *proj.bounds();
        let chunk_km = tier.chunk_km();
        let chunks_x = (bounds.width_km() / chunk_km).ceil().max(1.0) as usize;
        let chunks_y = (bounds.height_km() / chunk_km).ceil().max(1.0) as usize;
        let total = chunks_x * chunks_y;

        log.kv("tier", tier.name());
        log.kv("chunks", format!("{chunks_x}×{chunks_y}"));

        let mut result = VectorResult {
            elements: Vec::new(),
            chunks_total: total,
            chunks_ocean: 0,
            chunks_failed: 0,
            chunks_fallback: 0,
        };
        let mut seen: AHashSet<(ElementKind, i64)> = AHashSet::new();

        // Single-chunk maps skip all chunking logic and timers.
        if total == 1 {
            let elements = self.fetch_chunk(&bounds, tier, log, &mut result);
            for el in elements {
                if seen.insert((el.kind, el.id)) {
                    result.elements.push(el);
                }
            }
            log.kv("elements", result.elements.len());
            log.ok("vector fetch complete");
            return result;
        }

        let pace = interchunk_pacing(total, self.interchunk_unit);
        let mut first = true;

        for cy in 0..chunks_y {
            for cx in 0..chunks_x {
                let chunk = chunk_bounds(&bounds, chunks_x, chunks_y, cx, cy);

                if chunk_is_ocean(proj, elevation, &chunk) {
                    result.chunks_ocean += 1;
                    continue;
                }

                if !first {
                    std::thread::sleep(pace);
                }
                first = false;

                let elements = self.fetch_chunk(&chunk, tier, log, &mut result);
                for el in elements {
                    if seen.insert((el.kind, el.id)) {
                        result.elements.push(el);
                    }
                }
            }
        }

        log.kv("ocean chunks skipped", result.chunks_ocean);
        log.kv("elements", result.elements.len());
        if result.chunks_failed > 0 {
            log.warn(format!("{} chunks returned no data", result.chunks_failed));
        }
        log.ok("vector fetch complete");
        result
    }

    /// Full tier query with up to 3 attempts, then the terrain-only
    /// fallback, then zero elements.
    fn fetch_chunk(
        &self,
        chunk: &GeoBounds,
        tier: Tier,
        log: &mut GenLog,
        result: &mut VectorResult,
    ) -> Vec<RawElement> {
        let query = tier_query(tier, chunk);
        for attempt in 0..3 {
            match self.post_query(&query) {
                Ok(elements) => return elements,
                Err(e) => {
                    log.warn(format!("chunk attempt {}: {e}", attempt + 1));
                    if attempt < 2 {
                        std::thread::sleep(self.retry_backoffs[attempt]);
                    }
                }
            }
        }

        result.chunks_fallback += 1;
        log.warn("tier query exhausted; trying terrain-only fallback");
        match self.post_query(&terrain_only_query(chunk)) {
            Ok(elements) => elements,
            Err(e) => {
                result.chunks_failed += 1;
                log.error(format!("terrain-only fallback failed: {e}"));
                Vec::new()
            }
        }
    }

    fn post_query(&self, query: &str) -> Result<Vec<RawElement>, String> {
        let resp = self
            .http
            .post(&self.endpoint, query)
            .map_err(|e| e.to_string())?;
        if !resp.is_ok() {
            return Err(format!("HTTP {}", resp.status));
        }
        let envelope: ProviderEnvelope =
            serde_json::from_slice(&resp.body).map_err(|e| format!("malformed response: {e}"))?;
        Ok(envelope.elements)
    }
}

/// Degree bounds of one chunk in the chunks_x × chunks_y partition.
fn chunk_bounds(
    b: &GeoBounds,
    chunks_x: usize,
    chunks_y: usize,
    cx: usize,
    cy: usize,
) -> GeoBounds {
    let dlon = b.lon_span() / chunks_x as f64;
    let dlat = b.lat_span() / chunks_y as f64;
    GeoBounds::new(
        b.south + dlat * cy as f64,
        b.south + dlat * (cy + 1) as f64,
        b.west + dlon * cx as f64,
        b.west + dlon * (cx + 1) as f64,
    )
}

/// Probe ~5×5 elevation samples inside the chunk; all ≤ 1 m means ocean.
/// Requires a usable elevation grid; low coverage disables skipping.
fn chunk_is_ocean(proj: &HexProjection, elevation: &ElevationGrid, chunk: &GeoBounds) -> bool {
    if elevation.coverage() < 0.5 {
        return false;
    }
    let mut probed = false;
    for j in 0..5 {
        for i in 0..5 {
            let lat = chunk.south + chunk.lat_span() * (j as f64 + 0.5) / 5.0;
            let lon = chunk.west + chunk.lon_span() * (i as f64 + 0.5) / 5.0;
            if let Some((col, row)) = proj.geo_to_cell(lon, lat) {
                probed = true;
                if elevation.get(proj.cell_index(col, row)) > 1.0 {
                    return false;
                }
            }
        }
    }
    probed
}

/// Interchunk pacing bucket: more chunks, longer floor.
fn interchunk_pacing(total: usize, unit: Duration) -> Duration {
    if total <= 6 {
        unit
    } else if total <= 20 {
        unit + unit / 2
    } else {
        unit * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::http::MemFetch;

    fn proj(width_deg: f64) -> HexProjection {
        HexProjection::new(GeoBounds::new(45.0, 45.0 + width_deg, 6.0, 6.0 + width_deg), 20, 20)
    }

    fn elements_body(json_elements: &str) -> Vec<u8> {
        format!("{{\"elements\":[{json_elements}]}}").into_bytes()
    }

    #[test]
    fn query_gates_roads_by_tier() {
        let b = GeoBounds::new(0.0, 1.0, 0.0, 1.0);
        let strategic = tier_query(Tier::Strategic, &b);
        assert!(strategic.contains("motorway|trunk|primary"));
        assert!(!strategic.contains("tertiary"));
        assert!(!strategic.contains("residential|track"));

        let tactical = tier_query(Tier::Tactical, &b);
        assert!(tactical.contains("tertiary"));
        assert!(!tactical.contains("\"building\""));

        let sub = tier_query(Tier::SubTactical, &b);
        assert!(sub.contains("residential"));
        assert!(sub.contains("\"building\""));
    }

    #[test]
    fn single_chunk_fast_path_dedupes() {
        let body = elements_body(
            r#"{"type":"way","id":7,"geometry":[{"lat":45.1,"lon":6.1}],"tags":{"highway":"primary"}},
               {"type":"way","id":7,"geometry":[{"lat":45.1,"lon":6.1}],"tags":{"highway":"primary"}}"#,
        );
        let http = MemFetch::new().route("https://overpass", 200, body);
        let p = proj(0.2); // tiny map, one chunk at strategic chunk size
        let fetcher = VectorFetcher::new(&http, "https://overpass")
            .with_timing(Duration::ZERO, Duration::ZERO);
        let mut log = GenLog::new();
        let result = fetcher.fetch(&p, Tier::Strategic, &ElevationGrid::flat(400), &mut log);
        assert_eq!(result.chunks_total, 1);
        assert_eq!(result.elements.len(), 1);
        assert_eq!(result.elements[0].id, 7);
    }

    #[test]
    fn failed_chunk_returns_zero_elements() {
        let http = MemFetch::new().route("https://overpass", 503, Vec::new());
        let p = proj(0.2);
        let fetcher = VectorFetcher::new(&http, "https://overpass")
            .with_timing(Duration::ZERO, Duration::ZERO);
        let mut log = GenLog::new();
        let result = fetcher.fetch(&p, Tier::Strategic, &ElevationGrid::flat(400), &mut log);
        assert!(result.elements.is_empty());
        assert_eq!(result.chunks_failed, 1);
        assert_eq!(result.chunks_fallback, 1);
        // 3 tier attempts + 1 fallback attempt.
        assert_eq!(http.requests().len(), 4);
        assert!(log.error_count() >= 1);
    }

    #[test]
    fn ocean_chunks_are_skipped() {
        let http = MemFetch::new().route("https://overpass", 200, elements_body(""));
        // Wide map → multiple chunks at strategic (200 km) chunk size.
        let p = proj(8.0);
        let elevation = ElevationGrid::new(vec![0.0; 400], 1.0);
        let fetcher = VectorFetcher::new(&http, "https://overpass")
            .with_timing(Duration::ZERO, Duration::ZERO);
        let mut log = GenLog::new();
        let result = fetcher.fetch(&p, Tier::Strategic, &elevation, &mut log);
        assert!(result.chunks_total > 1);
        assert_eq!(result.chunks_ocean, result.chunks_total);
        assert!(http.requests().is_empty());
    }

    #[test]
    fn pacing_buckets() {
        let unit = Duration::from_secs(1);
        assert_eq!(interchunk_pacing(4, unit), Duration::from_secs(1));
        assert_eq!(interchunk_pacing(12, unit), Duration::from_millis(1500));
        assert_eq!(interchunk_pacing(40, unit), Duration::from_secs(2));
    }
}
