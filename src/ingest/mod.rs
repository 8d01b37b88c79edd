mod elevation;
mod gazetteer;
mod landcover;
mod parser;
mod vector;

pub use elevation::{ElevationGrid, ElevationSampler, SPARSE_THRESHOLD};
pub use gazetteer::{GazetteerResolver, RiverName};
pub use landcover::{lc_tile_id, LandCoverGrid, LandCoverSampler};
pub use parser::{
    parse_features, InfraArea, InfraLine, NavigableLine, ParsedFeatures, PlaceNode, PowerSource,
    TerrainArea,
};
pub use vector::{ElementKind, LatLon, RawElement, RawMember, VectorFetcher, VectorResult};
