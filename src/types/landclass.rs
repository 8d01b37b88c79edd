use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::types::Terrain;

/// Land-cover class codes as they appear in the 10 m class-coded raster
/// tiles (ESA WorldCover numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter)]
#[repr(u8)]
pub enum LandClass {
    TreeCover = 10,
    Shrubland = 20,
    Grassland = 30,
    Cropland = 40,
    BuiltUp = 50,
    BareSparse = 60,
    SnowIce = 70,
    Water = 80,
    Wetland = 90,
    Mangroves = 95,
    MossLichen = 100,
}

impl LandClass {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            10 => Some(LandClass::TreeCover),
            20 => Some(LandClass::Shrubland),
            30 => Some(LandClass::Grassland),
            40 => Some(LandClass::Cropland),
            50 => Some(LandClass::BuiltUp),
            60 => Some(LandClass::BareSparse),
            70 => Some(LandClass::SnowIce),
            80 => Some(LandClass::Water),
            90 => Some(LandClass::Wetland),
            95 => Some(LandClass::Mangroves),
            100 => Some(LandClass::MossLichen),
            _ => None,
        }
    }

    #[inline] pub fn code(self) -> u8 { self as u8 }

    /// Base terrain for a majority vote of this class. Built-up and
    /// bare/sparse get refined later by the classifier (urban mix
    /// thresholds, arid-latitude desert heuristic).
    pub fn base_terrain(self) -> Terrain {
        match self {
            LandClass::TreeCover => Terrain::Forest,
            LandClass::Shrubland => Terrain::LightVeg,
            LandClass::Grassland => Terrain::OpenGround,
            LandClass::Cropland => Terrain::Farmland,
            LandClass::BuiltUp => Terrain::LightUrban,
            LandClass::BareSparse => Terrain::OpenGround,
            LandClass::SnowIce => Terrain::Ice,
            LandClass::Water => Terrain::Lake,
            LandClass::Wetland => Terrain::Wetland,
            LandClass::Mangroves => Terrain::Wetland,
            LandClass::MossLichen => Terrain::OpenGround,
        }
    }
}
