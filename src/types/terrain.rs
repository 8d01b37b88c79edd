use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr, IntoStaticStr};

/// Closed catalog of per-cell terrain labels. Every cell carries exactly one.
///
/// Discriminant order is the binary codec index and must never be reordered;
/// new labels append at the end.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    Serialize, Deserialize, Display, EnumIter, EnumString, FromRepr, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Terrain {
    DeepWater = 0,
    CoastalWater = 1,
    Lake = 2,
    River = 3,
    Wetland = 4,
    #[default]
    OpenGround = 5,
    LightVeg = 6,
    Farmland = 7,
    Forest = 8,
    DenseForest = 9,
    Highland = 10,
    MountainForest = 11,
    Mountain = 12,
    Peak = 13,
    Desert = 14,
    Ice = 15,
    LightUrban = 16,
    DenseUrban = 17,
}

impl Terrain {
    pub const COUNT: usize = 18;

    /// Codec index, stable across versions.
    #[inline] pub fn index(self) -> u8 { self as u8 }

    /// Inverse of [`Self::index`]; out-of-range values fall back to index 0.
    #[inline]
    pub fn from_index(idx: u8) -> Option<Self> {
        Self::from_repr(idx)
    }

    /// Any water-class terrain (ocean, lake, river, wetland excluded).
    #[inline]
    pub fn is_water(self) -> bool {
        matches!(
            self,
            Terrain::DeepWater | Terrain::CoastalWater | Terrain::Lake | Terrain::River
        )
    }

    #[inline]
    pub fn is_urban(self) -> bool {
        matches!(self, Terrain::LightUrban | Terrain::DenseUrban)
    }

    #[inline]
    pub fn is_forest(self) -> bool {
        matches!(
            self,
            Terrain::Forest | Terrain::DenseForest | Terrain::MountainForest
        )
    }

    /// High ground that blocks movement for chokepoint purposes.
    #[inline]
    pub fn is_impassable(self) -> bool {
        self.is_water() || matches!(self, Terrain::Mountain | Terrain::Peak)
    }

    /// Terrain that can host road-density urban promotion.
    #[inline]
    pub fn is_open(self) -> bool {
        matches!(
            self,
            Terrain::OpenGround | Terrain::LightVeg | Terrain::Farmland
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Terrain;
    use strum::IntoEnumIterator;

    #[test]
    fn index_round_trip() {
        for t in Terrain::iter() {
            assert_eq!(Terrain::from_index(t.index()), Some(t));
        }
        assert_eq!(Terrain::iter().count(), Terrain::COUNT);
    }

    #[test]
    fn labels_are_snake_case() {
        assert_eq!(Terrain::DeepWater.to_string(), "deep_water");
        assert_eq!(Terrain::MountainForest.to_string(), "mountain_forest");
        assert_eq!("dense_urban".parse::<Terrain>().unwrap(), Terrain::DenseUrban);
    }

    #[test]
    fn out_of_range_index_is_none() {
        assert_eq!(Terrain::from_index(Terrain::COUNT as u8), None);
    }
}
