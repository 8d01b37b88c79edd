use serde::{Deserialize, Serialize};
use std::str::FromStr;

use anyhow::anyhow;

/// Scale bucket derived from cell size. The tier selects vector query
/// complexity, chunk side, and several classifier thresholds; cached patches
/// are only interpretable if these thresholds stay fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Cell side below 0.5 km: individual buildings, hedges, residential roads.
    SubTactical,
    /// Below 2 km.
    Tactical,
    /// Below 8 km.
    Operational,
    /// 8 km and up: whole-theater maps.
    Strategic,
}

impl Tier {
    /// Select the tier from the cell side in kilometers.
    pub fn from_cell_km(cell_km: f64) -> Self {
        if cell_km < 0.5 {
            Tier::SubTactical
        } else if cell_km < 2.0 {
            Tier::Tactical
        } else if cell_km < 8.0 {
            Tier::Operational
        } else {
            Tier::Strategic
        }
    }

    /// Vector query chunk side in kilometers.
    pub fn chunk_km(self) -> f64 {
        match self {
            Tier::SubTactical => 5.0,
            Tier::Tactical => 75.0,
            Tier::Operational => 150.0,
            Tier::Strategic => 200.0,
        }
    }

    /// Land-cover samples per cell axis (N of the N×N majority vote).
    pub fn landcover_samples(self) -> usize {
        match self {
            Tier::SubTactical => 1,
            _ => 20,
        }
    }

    #[inline]
    pub fn at_most(self, other: Tier) -> bool {
        self <= other
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::SubTactical => "sub-tactical",
            Tier::Tactical => "tactical",
            Tier::Operational => "operational",
            Tier::Strategic => "strategic",
        }
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sub-tactical" | "subtactical" => Ok(Tier::SubTactical),
            "tactical" => Ok(Tier::Tactical),
            "operational" => Ok(Tier::Operational),
            "strategic" => Ok(Tier::Strategic),
            _ => Err(anyhow!("Unknown tier: {s}. Expected sub-tactical, tactical, operational, or strategic")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Tier;

    #[test]
    fn tier_thresholds() {
        assert_eq!(Tier::from_cell_km(0.1), Tier::SubTactical);
        assert_eq!(Tier::from_cell_km(0.5), Tier::Tactical);
        assert_eq!(Tier::from_cell_km(1.99), Tier::Tactical);
        assert_eq!(Tier::from_cell_km(2.0), Tier::Operational);
        assert_eq!(Tier::from_cell_km(8.0), Tier::Strategic);
        assert_eq!(Tier::from_cell_km(10.0), Tier::Strategic);
    }

    #[test]
    fn ordering_matches_scale() {
        assert!(Tier::SubTactical < Tier::Tactical);
        assert!(Tier::Tactical.at_most(Tier::Operational));
        assert!(!Tier::Strategic.at_most(Tier::Tactical));
    }
}
