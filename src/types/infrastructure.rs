use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr, IntoStaticStr};

/// Closed catalog of per-cell infrastructure labels; exactly one per cell,
/// the dominant structural overlay. Discriminant order is the codec index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
    Serialize, Deserialize, Display, EnumIter, EnumString, FromRepr, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Infrastructure {
    #[default]
    None = 0,
    Motorway = 1,
    TrunkRoad = 2,
    PrimaryRoad = 3,
    SecondaryRoad = 4,
    TertiaryRoad = 5,
    ResidentialStreet = 6,
    Track = 7,
    Railway = 8,
    RailStation = 9,
    Bridge = 10,
    Airfield = 11,
    Helipad = 12,
    Port = 13,
    MilitaryBase = 14,
    Checkpoint = 15,
    Dam = 16,
    Lock = 17,
    PowerPlant = 18,
    Substation = 19,
    Pipeline = 20,
    CommsTower = 21,
    Fortification = 22,
    DenseBuildings = 23,
}

impl Infrastructure {
    pub const COUNT: usize = 24;

    #[inline] pub fn index(self) -> u8 { self as u8 }

    #[inline]
    pub fn from_index(idx: u8) -> Option<Self> {
        Self::from_repr(idx)
    }

    /// Dominance rank used when several overlays compete for one cell.
    /// Area flags (military base, airfield, port) outrank everything;
    /// line infra overrides area picks only when its rank is higher.
    pub fn rank(self) -> u8 {
        match self {
            Infrastructure::None => 0,
            Infrastructure::Track => 10,
            Infrastructure::ResidentialStreet => 15,
            Infrastructure::TertiaryRoad => 20,
            Infrastructure::Pipeline => 22,
            Infrastructure::CommsTower => 25,
            Infrastructure::Checkpoint => 28,
            Infrastructure::SecondaryRoad => 30,
            Infrastructure::Lock => 32,
            Infrastructure::Dam => 35,
            Infrastructure::Substation => 38,
            Infrastructure::DenseBuildings => 40,
            Infrastructure::Helipad => 42,
            Infrastructure::RailStation => 45,
            Infrastructure::Railway => 50,
            Infrastructure::PrimaryRoad => 55,
            Infrastructure::PowerPlant => 58,
            Infrastructure::Fortification => 60,
            Infrastructure::TrunkRoad => 65,
            Infrastructure::Motorway => 70,
            Infrastructure::Bridge => 75,
            Infrastructure::Port => 80,
            Infrastructure::Airfield => 85,
            Infrastructure::MilitaryBase => 90,
        }
    }

    /// Road-class line infra, in descending importance.
    #[inline]
    pub fn is_road(self) -> bool {
        matches!(
            self,
            Infrastructure::Motorway
                | Infrastructure::TrunkRoad
                | Infrastructure::PrimaryRoad
                | Infrastructure::SecondaryRoad
                | Infrastructure::TertiaryRoad
                | Infrastructure::ResidentialStreet
                | Infrastructure::Track
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Infrastructure;
    use strum::IntoEnumIterator;

    #[test]
    fn index_round_trip() {
        for i in Infrastructure::iter() {
            assert_eq!(Infrastructure::from_index(i.index()), Some(i));
        }
        assert_eq!(Infrastructure::iter().count(), Infrastructure::COUNT);
    }

    #[test]
    fn ranks_are_distinct() {
        let mut ranks: Vec<u8> = Infrastructure::iter().map(|i| i.rank()).collect();
        ranks.sort_unstable();
        ranks.dedup();
        assert_eq!(ranks.len(), Infrastructure::COUNT);
    }

    #[test]
    fn area_flags_outrank_roads() {
        assert!(Infrastructure::MilitaryBase.rank() > Infrastructure::Motorway.rank());
        assert!(Infrastructure::Airfield.rank() > Infrastructure::Motorway.rank());
        assert!(Infrastructure::Port.rank() > Infrastructure::Motorway.rank());
    }
}
