mod index;
mod ring;

pub use index::SpatialIndex;
pub use ring::{ring_centroid, ring_to_polygon};
