use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::types::GeoBounds;

/// Scan resolution: the side of the square patches the planet is tiled
/// into. Coarse scans use 3° patches, fine scans 1°.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Coarse,
    Fine,
}

impl Resolution {
    #[inline]
    pub fn side_deg(self) -> i16 {
        match self {
            Resolution::Coarse => 3,
            Resolution::Fine => 1,
        }
    }

    /// Store keyspace prefix.
    pub fn key(self) -> &'static str {
        match self {
            Resolution::Coarse => "3deg",
            Resolution::Fine => "1deg",
        }
    }
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3deg" | "coarse" => Ok(Resolution::Coarse),
            "1deg" | "fine" => Ok(Resolution::Fine),
            _ => Err(anyhow!("Unknown resolution: {s}. Expected coarse or fine")),
        }
    }
}

/// Identity of one scanned patch: its SW corner snapped to the patch grid
/// plus the patch side in degrees. String form `N45E006_3d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId {
    pub sw_lat: i16,
    pub sw_lon: i16,
    pub side_deg: i16,
}

impl PatchId {
    pub fn new(sw_lat: i16, sw_lon: i16, resolution: Resolution) -> Self {
        let side = resolution.side_deg();
        debug_assert!(sw_lat % side == 0 && sw_lon % side == 0, "corner off the patch grid");
        Self { sw_lat, sw_lon, side_deg: side }
    }

    /// The geographic square this patch covers.
    pub fn bounds(&self) -> GeoBounds {
        GeoBounds::new(
            self.sw_lat as f64,
            (self.sw_lat + self.side_deg) as f64,
            self.sw_lon as f64,
            (self.sw_lon + self.side_deg) as f64,
        )
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ns, lat) = if self.sw_lat < 0 { ('S', -self.sw_lat) } else { ('N', self.sw_lat) };
        let (ew, lon) = if self.sw_lon < 0 { ('W', -self.sw_lon) } else { ('E', self.sw_lon) };
        write!(f, "{ns}{lat:02}{ew}{lon:03}_{}d", self.side_deg)
    }
}

impl FromStr for PatchId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (corner, side) = s
            .split_once('_')
            .ok_or_else(|| anyhow!("malformed patch id: {s}"))?;
        let side_deg: i16 = side
            .strip_suffix('d')
            .ok_or_else(|| anyhow!("malformed patch side: {s}"))?
            .parse()?;

        let bytes = corner.as_bytes();
        if bytes.len() < 7 {
            bail!("malformed patch corner: {corner}");
        }
        let ns = bytes[0] as char;
        let ew_pos = corner[1..]
            .find(['E', 'W'])
            .map(|p| p + 1)
            .ok_or_else(|| anyhow!("malformed patch corner: {corner}"))?;
        let lat: i16 = corner[1..ew_pos].parse()?;
        let ew = bytes[ew_pos] as char;
        let lon: i16 = corner[ew_pos + 1..].parse()?;

        let sw_lat = match ns {
            'N' => lat,
            'S' => -lat,
            _ => bail!("malformed patch corner: {corner}"),
        };
        let sw_lon = match ew {
            'E' => lon,
            'W' => -lon,
            _ => bail!("malformed patch corner: {corner}"),
        };
        Ok(Self { sw_lat, sw_lon, side_deg })
    }
}

impl Serialize for PatchId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PatchId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
