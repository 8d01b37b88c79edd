mod math;
mod proj;
mod raster;

pub use math::{hex_line, neighbors, offset_to_pixel, pixel_to_offset, SQRT3};
pub use proj::HexProjection;
pub use raster::rasterize_way;
