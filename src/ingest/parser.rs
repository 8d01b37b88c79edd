//! Demultiplexes raw vector elements into the typed collections the
//! classifier consumes. Tier gates keep sub-scale detail (residential
//! roads, buildings, hedges) out of coarse pipelines entirely; terrain
//! areas come out sorted by ascending priority so the last containing
//! polygon wins point-in-polygon votes.

use geo::Polygon;

use crate::geom::{ring_centroid, ring_to_polygon};
use crate::ingest::vector::{ElementKind, RawElement};
use crate::types::{Infrastructure, Terrain, Tier};

/// Terrain polygon metadata, parallel to `ParsedFeatures::terrain_polygons`.
#[derive(Debug, Clone, Copy)]
pub struct TerrainArea {
    pub terrain: Terrain,
    pub priority: i32,
}

/// Infrastructure polygon metadata, parallel to
/// `ParsedFeatures::infra_polygons`. The centroid doubles as the
/// area-flag anchor for military bases, airfields, and ports.
#[derive(Debug, Clone)]
pub struct InfraArea {
    pub kind: Infrastructure,
    pub centroid: (f64, f64),
}

#[derive(Debug, Clone)]
pub struct InfraLine {
    pub points: Vec<(f64, f64)>,
    pub kind: Infrastructure,
    pub bridge: bool,
    pub tunnel: bool,
}

#[derive(Debug, Clone)]
pub struct NavigableLine {
    pub points: Vec<(f64, f64)>,
    /// Explicitly tagged as ship-routable (motorboat/ship/boat/CEMT).
    pub tagged: bool,
    pub named: bool,
    pub from_relation: bool,
    pub canal: bool,
    pub actual_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSource {
    Nuclear,
    Fossil,
    Hydro,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct PlaceNode {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    /// city = 3, town = 2, village = 1.
    pub rank: u8,
    pub population: u64,
}

/// Typed, tier-filtered view of one vector fetch.
#[derive(Default)]
pub struct ParsedFeatures {
    pub terrain_polygons: Vec<Polygon<f64>>,
    pub terrain_areas: Vec<TerrainArea>,
    pub infra_polygons: Vec<Polygon<f64>>,
    pub infra_areas: Vec<InfraArea>,
    pub infra_lines: Vec<InfraLine>,
    pub water_lines: Vec<Vec<(f64, f64)>>,
    pub navigable_lines: Vec<NavigableLine>,
    pub stream_lines: Vec<Vec<(f64, f64)>>,
    pub dam_points: Vec<(f64, f64)>,
    pub building_areas: Vec<Polygon<f64>>,
    pub barrier_lines: Vec<Vec<(f64, f64)>>,
    pub tower_nodes: Vec<(f64, f64)>,
    pub beach_areas: Vec<Polygon<f64>>,
    pub pipeline_lines: Vec<Vec<(f64, f64)>>,
    pub power_plant_polygons: Vec<Polygon<f64>>,
    pub power_plant_sources: Vec<PowerSource>,
    pub place_nodes: Vec<PlaceNode>,
    pub hedge_lines: Vec<Vec<(f64, f64)>>,
}

/// Terrain mapping for a polygon's tags, with overlay priority (higher
/// wins). Order here decides conflicts like forest landuse inside a
/// residential zone.
fn terrain_for_tags(el: &RawElement) -> Option<(Terrain, i32)> {
    if let Some(natural) = el.tag("natural") {
        return match natural {
            "water" => Some((Terrain::Lake, 10)),
            "glacier" => Some((Terrain::Ice, 9)),
            "wetland" => Some((Terrain::Wetland, 8)),
            "wood" => Some((Terrain::Forest, 5)),
            "scrub" | "heath" => Some((Terrain::LightVeg, 2)),
            "sand" | "bare_rock" => Some((Terrain::OpenGround, 1)),
            _ => None,
        };
    }
    if let Some(landuse) = el.tag("landuse") {
        return match landuse {
            "basin" | "reservoir" => Some((Terrain::Lake, 10)),
            "residential" | "industrial" => Some((Terrain::LightUrban, 6)),
            "forest" => Some((Terrain::Forest, 5)),
            "farmland" | "vineyard" => Some((Terrain::Farmland, 4)),
            "orchard" => Some((Terrain::Farmland, 4)),
            "meadow" => Some((Terrain::OpenGround, 3)),
            "quarry" => Some((Terrain::OpenGround, 7)),
            _ => None,
        };
    }
    None
}

fn highway_infra(highway: &str, tier: Tier) -> Option<Infrastructure> {
    match highway {
        "motorway" => Some(Infrastructure::Motorway),
        "trunk" => Some(Infrastructure::TrunkRoad),
        "primary" => Some(Infrastructure::PrimaryRoad),
        "secondary" if tier <= Tier::Operational => Some(Infrastructure::SecondaryRoad),
        "tertiary" if tier <= Tier::Tactical => Some(Infrastructure::TertiaryRoad),
        "residential" | "unclassified" | "service" if tier == Tier::SubTactical => {
            Some(Infrastructure::ResidentialStreet)
        }
        "track" if tier == Tier::SubTactical => Some(Infrastructure::Track),
        _ => None,
    }
}

fn infra_area_kind(el: &RawElement) -> Option<Infrastructure> {
    if matches!(el.tag("aeroway"), Some("aerodrome")) {
        return Some(Infrastructure::Airfield);
    }
    if el.has_tag("landuse", "military") || el.tag("military").is_some() {
        return Some(Infrastructure::MilitaryBase);
    }
    if el.has_tag("industrial", "port") || el.has_tag("harbour", "yes") {
        return Some(Infrastructure::Port);
    }
    None
}

fn ship_routable(el: &RawElement) -> bool {
    matches!(el.tag("motorboat"), Some("yes"))
        || matches!(el.tag("ship"), Some("yes"))
        || matches!(el.tag("boat"), Some("yes"))
        || el.tag("CEMT").is_some()
}

fn power_source(el: &RawElement) -> Option<PowerSource> {
    match el.tag("plant:source") {
        Some("nuclear") => Some(PowerSource::Nuclear),
        Some("coal") | Some("gas") | Some("oil") | Some("diesel") | Some("fossil") => {
            Some(PowerSource::Fossil)
        }
        Some("hydro") => Some(PowerSource::Hydro),
        Some("solar") | Some("wind") | Some("biomass") | Some("biogas") => None,
        _ => Some(PowerSource::Unknown),
    }
}

fn parse_population(el: &RawElement) -> u64 {
    el.tag("population")
        .map(|raw| {
            raw.chars()
                .filter(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

/// Convert raw elements into typed collections for one tier.
pub fn parse_features(elements: &[RawElement], tier: Tier) -> ParsedFeatures {
    let mut out = ParsedFeatures::default();
    let fine = tier <= Tier::Tactical;

    // Collected unsorted, sorted by priority at the end.
    let mut terrain: Vec<(Polygon<f64>, TerrainArea)> = Vec::new();

    for el in elements {
        match el.kind {
            ElementKind::Node => parse_node(el, tier, &mut out),
            ElementKind::Way => parse_way(el, tier, fine, &mut terrain, &mut out),
            ElementKind::Relation => parse_relation(el, &mut terrain, &mut out),
        }
    }

    terrain.sort_by_key(|(_, area)| area.priority);
    for (polygon, area) in terrain {
        out.terrain_polygons.push(polygon);
        out.terrain_areas.push(area);
    }
    out
}

fn parse_node(el: &RawElement, _tier: Tier, out: &mut ParsedFeatures) {
    let (Some(lat), Some(lon)) = (el.lat, el.lon) else { return };

    if let Some(place) = el.tag("place") {
        let rank = match place {
            "city" => 3,
            "town" => 2,
            "village" => 1,
            _ => return,
        };
        let Some(name) = el.tag("name") else { return };
        out.place_nodes.push(PlaceNode {
            lat,
            lon,
            name: name.to_string(),
            rank,
            population: parse_population(el),
        });
        return;
    }

    if el.has_tag("waterway", "dam") {
        out.dam_points.push((lat, lon));
        return;
    }

    if matches!(
        el.tag("man_made"),
        Some("tower") | Some("communications_tower") | Some("water_tower")
    ) {
        out.tower_nodes.push((lat, lon));
    }
}

fn parse_way(
    el: &RawElement,
    tier: Tier,
    fine: bool,
    terrain: &mut Vec<(Polygon<f64>, TerrainArea)>,
    out: &mut ParsedFeatures,
) {
    let points = el.points();
    if points.is_empty() {
        return;
    }

    // Structural areas first: they outrank the landuse tags they often carry.
    if let Some(kind) = infra_area_kind(el) {
        if let Some(centroid) = ring_centroid(&points) {
            out.infra_polygons.push(ring_to_polygon(&points));
            out.infra_areas.push(InfraArea { kind, centroid });
        }
        return;
    }

    if el.has_tag("natural", "beach") {
        out.beach_areas.push(ring_to_polygon(&points));
        return;
    }

    if let Some((terrain_kind, priority)) = terrain_for_tags(el) {
        terrain.push((
            ring_to_polygon(&points),
            TerrainArea { terrain: terrain_kind, priority },
        ));
        return;
    }

    if let Some(highway) = el.tag("highway") {
        if let Some(kind) = highway_infra(highway, tier) {
            out.infra_lines.push(InfraLine {
                points,
                kind,
                bridge: el.tag("bridge").is_some_and(|v| v != "no"),
                tunnel: el.tag("tunnel").is_some_and(|v| v != "no"),
            });
        }
        return;
    }

    if matches!(el.tag("railway"), Some("rail") | Some("light_rail")) {
        out.infra_lines.push(InfraLine {
            points,
            kind: Infrastructure::Railway,
            bridge: el.tag("bridge").is_some_and(|v| v != "no"),
            tunnel: el.tag("tunnel").is_some_and(|v| v != "no"),
        });
        return;
    }

    if let Some(waterway) = el.tag("waterway") {
        match waterway {
            "river" | "canal" => {
                let name = el.tag("name").map(str::to_string);
                out.navigable_lines.push(NavigableLine {
                    points: points.clone(),
                    tagged: ship_routable(el),
                    named: name.is_some(),
                    from_relation: false,
                    canal: waterway == "canal",
                    actual_name: name,
                });
                out.water_lines.push(points);
            }
            "stream" | "drain" | "ditch" if fine => {
                out.stream_lines.push(points);
            }
            "dam" => {
                // Anchor the dam at the way's centroid.
                if let Some(centroid) = ring_centroid(&points) {
                    out.dam_points.push(centroid);
                }
            }
            _ => {}
        }
        return;
    }

    if el.has_tag("man_made", "pipeline") {
        out.pipeline_lines.push(points);
        return;
    }

    if el.has_tag("power", "plant") {
        if let Some(source) = power_source(el) {
            if source != PowerSource::Unknown || fine {
                out.power_plant_polygons.push(ring_to_polygon(&points));
                out.power_plant_sources.push(source);
            }
        }
        return;
    }

    if tier == Tier::SubTactical {
        if el.tag("building").is_some() {
            out.building_areas.push(ring_to_polygon(&points));
            return;
        }
        if let Some(barrier) = el.tag("barrier") {
            match barrier {
                "hedge" => out.hedge_lines.push(points),
                "wall" | "fence" => out.barrier_lines.push(points),
                _ => {}
            }
        }
    }
}

fn parse_relation(
    el: &RawElement,
    terrain: &mut Vec<(Polygon<f64>, TerrainArea)>,
    out: &mut ParsedFeatures,
) {
    // Named waterway relations seed navigable lines from every way member.
    if el.tag("waterway").is_some() {
        if let Some(name) = el.tag("name") {
            for member in &el.members {
                if member.kind != ElementKind::Way || member.geometry.is_empty() {
                    continue;
                }
                let points: Vec<(f64, f64)> =
                    member.geometry.iter().map(|p| (p.lat, p.lon)).collect();
                out.navigable_lines.push(NavigableLine {
                    points: points.clone(),
                    tagged: ship_routable(el),
                    named: true,
                    from_relation: true,
                    canal: false,
                    actual_name: Some(name.to_string()),
                });
                out.water_lines.push(points);
            }
            return;
        }
    }

    let terrain_kind = terrain_for_tags(el);
    let infra_kind = infra_area_kind(el);
    let power = el.has_tag("power", "plant");
    if terrain_kind.is_none() && infra_kind.is_none() && !power {
        return;
    }

    // Relations contribute each outer member ring as its own polygon.
    for member in &el.members {
        if member.kind != ElementKind::Way || member.role != "outer" || member.geometry.is_empty() {
            continue;
        }
        let ring: Vec<(f64, f64)> = member.geometry.iter().map(|p| (p.lat, p.lon)).collect();
        if let Some((t, priority)) = terrain_kind {
            terrain.push((ring_to_polygon(&ring), TerrainArea { terrain: t, priority }));
        } else if let Some(kind) = infra_kind {
            if let Some(centroid) = ring_centroid(&ring) {
                out.infra_polygons.push(ring_to_polygon(&ring));
                out.infra_areas.push(InfraArea { kind, centroid });
            }
        } else if power {
            if let Some(source) = power_source(el) {
                out.power_plant_polygons.push(ring_to_polygon(&ring));
                out.power_plant_sources.push(source);
            }
        }
    }
}
