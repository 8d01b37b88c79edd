use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::{ClimateZone, Feature, Infrastructure, Terrain};

/// Per-cell name side table entry: feature tag (or terrain tag, for
/// settlements) → display name.
pub type NameMap = BTreeMap<String, String>;

/// Set of feature tags with stable insertion order. Membership is tracked in
/// a 64-bit mask (the codec's wire form); the order vector only records the
/// sequence tags were first added in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    mask: u64,
    order: SmallVec<[Feature; 8]>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a wire mask; order follows ascending bit position.
    pub fn from_mask(mask: u64) -> Self {
        let mut set = Self::new();
        for idx in 0..Feature::COUNT as u8 {
            if let Some(f) = Feature::from_index(idx) {
                if mask & f.bit() != 0 {
                    set.insert(f);
                }
            }
        }
        set
    }

    /// Insert a tag; duplicates are ignored. Returns true if newly added.
    pub fn insert(&mut self, feature: Feature) -> bool {
        if self.mask & feature.bit() != 0 {
            return false;
        }
        self.mask |= feature.bit();
        self.order.push(feature);
        true
    }

    #[inline]
    pub fn contains(&self, feature: Feature) -> bool {
        self.mask & feature.bit() != 0
    }

    pub fn remove(&mut self, feature: Feature) -> bool {
        if self.mask & feature.bit() == 0 {
            return false;
        }
        self.mask &= !feature.bit();
        self.order.retain(|f| *f != feature);
        true
    }

    /// Union the other set in, preserving this set's existing order.
    pub fn merge(&mut self, other: &FeatureSet) {
        for f in other.iter() {
            self.insert(f);
        }
    }

    #[inline] pub fn mask(&self) -> u64 { self.mask }
    #[inline] pub fn len(&self) -> usize { self.order.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.mask == 0 }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.order.iter().copied()
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut set = Self::new();
        for f in iter {
            set.insert(f);
        }
        set
    }
}

impl Serialize for FeatureSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for FeatureSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tags = Vec::<Feature>::deserialize(deserializer)?;
        Ok(tags.into_iter().collect())
    }
}

/// The atomic output record: one hexagonal tile of the fused grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub terrain: Terrain,
    pub infrastructure: Infrastructure,
    /// Signed meters; 0 where unknown.
    pub elevation: i32,
    #[serde(default, skip_serializing_if = "FeatureSet::is_empty")]
    pub features: FeatureSet,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub feature_names: NameMap,
    /// Legacy attribute set; merged into `features` after post-processing
    /// and retained for backward reads.
    #[serde(default, skip_serializing_if = "FeatureSet::is_empty")]
    pub attributes: FeatureSet,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub lat: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub lon: f64,
    /// Classification confidence in [0, 1]; quantized to 8 bits on encode.
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub confidence: f32,
    /// Ground slope in degrees, clamped to [0, 90].
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub slope_angle: u8,
    #[serde(default)]
    pub climate: ClimateZone,
    /// Resident population in thousands.
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub population_k: u16,
}

fn is_zero_f64(v: &f64) -> bool { *v == 0.0 }
fn is_zero_f32(v: &f32) -> bool { *v == 0.0 }
fn is_zero_u8(v: &u8) -> bool { *v == 0 }
fn is_zero_u16(v: &u16) -> bool { *v == 0 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_set_keeps_insertion_order() {
        let mut set = FeatureSet::new();
        set.insert(Feature::Chokepoint);
        set.insert(Feature::Bridge);
        set.insert(Feature::Chokepoint); // duplicate
        set.insert(Feature::Dam);
        let tags: Vec<_> = set.iter().collect();
        assert_eq!(tags, vec![Feature::Chokepoint, Feature::Bridge, Feature::Dam]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn mask_round_trip_is_order_insensitive() {
        let mut a = FeatureSet::new();
        a.insert(Feature::Cliffs);
        a.insert(Feature::Beach);
        let b = FeatureSet::from_mask(a.mask());
        assert_eq!(a.mask(), b.mask());
        assert!(b.contains(Feature::Beach) && b.contains(Feature::Cliffs));
    }

    #[test]
    fn merge_preserves_existing_order() {
        let mut a: FeatureSet = [Feature::Town, Feature::Port].into_iter().collect();
        let b: FeatureSet = [Feature::Port, Feature::Beach].into_iter().collect();
        a.merge(&b);
        let tags: Vec<_> = a.iter().collect();
        assert_eq!(tags, vec![Feature::Town, Feature::Port, Feature::Beach]);
    }

    #[test]
    fn cell_serializes_feature_labels() {
        let mut cell = Cell::default();
        cell.features.insert(Feature::NavigableWaterway);
        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(json["terrain"], "open_ground");
        assert_eq!(json["features"][0], "navigable_waterway");
    }
}
