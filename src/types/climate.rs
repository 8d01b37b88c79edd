use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, FromRepr};

use crate::types::Terrain;

/// Coarse climate bucket stored per cell (codec byte 25). Derived from the
/// latitude band and the final terrain label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    Serialize, Deserialize, Display, EnumIter, FromRepr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ClimateZone {
    #[default]
    Temperate = 0,
    Arid = 1,
    Tropical = 2,
    Continental = 3,
    Polar = 4,
    Alpine = 5,
}

impl ClimateZone {
    #[inline] pub fn index(self) -> u8 { self as u8 }

    #[inline]
    pub fn from_index(idx: u8) -> Option<Self> {
        Self::from_repr(idx)
    }

    pub fn derive(lat: f64, terrain: Terrain) -> Self {
        match terrain {
            Terrain::Ice => return ClimateZone::Polar,
            Terrain::Desert => return ClimateZone::Arid,
            Terrain::Peak | Terrain::Mountain => return ClimateZone::Alpine,
            _ => {}
        }
        let a = lat.abs();
        if a >= 66.5 {
            ClimateZone::Polar
        } else if a >= 50.0 {
            ClimateZone::Continental
        } else if a < 23.5 {
            ClimateZone::Tropical
        } else {
            ClimateZone::Temperate
        }
    }
}
