mod bbox;
mod cell;
mod climate;
mod feature;
mod infrastructure;
mod landclass;
mod terrain;
mod tier;

pub use bbox::GeoBounds;
pub use cell::{Cell, FeatureSet, NameMap};
pub use climate::ClimateZone;
pub use feature::Feature;
pub use infrastructure::Infrastructure;
pub use landclass::LandClass;
pub use terrain::Terrain;
pub use tier::Tier;
