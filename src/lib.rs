#![doc = "Hexatlas public API"]

mod classify;
mod codec;
mod common;
mod error;
mod geom;
mod hex;
mod ingest;
mod pipeline;
mod scan;
mod store;
mod types;

pub mod cli;

#[cfg(feature = "download")]
pub mod commands;

#[doc(inline)]
pub use types::{
    Cell, ClimateZone, Feature, FeatureSet, GeoBounds, Infrastructure, LandClass, NameMap,
    Terrain, Tier,
};

#[doc(inline)]
pub use hex::{hex_line, neighbors, offset_to_pixel, pixel_to_offset, rasterize_way, HexProjection};

#[doc(inline)]
pub use geom::SpatialIndex;

#[doc(inline)]
pub use error::{FuseError, FuseResult};

#[doc(inline)]
pub use common::{GenLog, HttpFetch, Pacer};
pub use common::http::{HttpResponse, MemFetch};
pub use common::log::{LineTag, LogLine};
#[cfg(feature = "download")]
pub use common::http::ReqwestFetch;

#[doc(inline)]
pub use codec::{
    crc32, decode, decode_validated, encode, verify_crc, DecodedCell, EncodedPatch, FORMAT_VERSION,
    NO_NAMES,
};

#[doc(inline)]
pub use store::{
    CellStore, DiskStore, LoadedPatch, Manifest, MemStore, PatchEntry, PatchId, PatchStatus,
    Resolution, StoreBackend,
};

#[doc(inline)]
pub use ingest::{
    lc_tile_id, ElementKind, ElevationGrid, ElevationSampler, GazetteerResolver, LandCoverGrid,
    LandCoverSampler, ParsedFeatures, RawElement, RiverName, VectorFetcher, SPARSE_THRESHOLD,
};
pub use ingest::parse_features;

#[doc(inline)]
pub use classify::{classify, post_process, ClassifiedGrid};

#[doc(inline)]
pub use pipeline::{
    generate_bbox_map, generate_map, GeneratedMap, MapSpec, ProviderConfig, MAX_CELLS,
};

#[doc(inline)]
pub use scan::{enumerate_patches, run_scan, verify_scan, ScanConfig, ScanSummary, VerifyReport};
