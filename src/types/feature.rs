use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr, IntoStaticStr};

/// Closed catalog of optional per-cell feature tags. Unlike terrain and
/// infrastructure these accumulate: a cell may carry any subset.
///
/// Discriminant order is the bit position in the codec's 64-bit feature
/// mask; append-only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize, Display, EnumIter, EnumString, FromRepr, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Feature {
    NavigableWaterway = 0,
    Waterway = 1,
    Stream = 2,
    Canal = 3,
    Ford = 4,
    Dam = 5,
    Bridge = 6,
    Tunnel = 7,
    Beach = 8,
    Marsh = 9,
    Town = 10,
    Settlement = 11,
    Airfield = 12,
    Port = 13,
    MilitaryBase = 14,
    Fortification = 15,
    Checkpoint = 16,
    Barrier = 17,
    Tower = 18,
    Pipeline = 19,
    PowerPlant = 20,
    PowerLine = 21,
    Rail = 22,
    RoadMajor = 23,
    RoadMinor = 24,
    Hedgerow = 25,
    Orchard = 26,
    Quarry = 27,
    BuildingDense = 28,
    BuildingSparse = 29,
    Chokepoint = 30,
    LandingZone = 31,
    Cliffs = 32,
    Ridgeline = 33,
    Treeline = 34,
    SlopeSteep = 35,
    SlopeExtreme = 36,
    ElevationAdvantage = 37,
}

impl Feature {
    pub const COUNT: usize = 38;

    /// Bit position in the 64-bit feature mask.
    #[inline] pub fn bit(self) -> u64 { 1u64 << (self as u8) }

    #[inline] pub fn index(self) -> u8 { self as u8 }

    #[inline]
    pub fn from_index(idx: u8) -> Option<Self> {
        Self::from_repr(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::Feature;
    use strum::IntoEnumIterator;

    #[test]
    fn catalog_fits_in_u64() {
        assert!(Feature::COUNT <= 64);
        assert_eq!(Feature::iter().count(), Feature::COUNT);
    }

    #[test]
    fn bits_are_unique() {
        let mut mask = 0u64;
        for f in Feature::iter() {
            assert_eq!(mask & f.bit(), 0);
            mask |= f.bit();
        }
        assert_eq!(mask.count_ones() as usize, Feature::COUNT);
    }

    #[test]
    fn labels_parse() {
        assert_eq!("navigable_waterway".parse::<Feature>().unwrap(), Feature::NavigableWaterway);
        assert_eq!(Feature::LandingZone.to_string(), "landing_zone");
    }
}
