//! Fixed-stride binary cell codec.
//!
//! Each cell is a little-endian record; names live in a parallel side table
//! addressed by a 16-bit per-cell index (0xFFFF = no names). Layout,
//! version 1 (28 bytes):
//!
//! ```text
//! 0      terrain index (u8)
//! 1      infrastructure index (u8)
//! 2-3    elevation (i16)
//! 4-11   feature bitmask (two u32 halves, low then high)
//! 12-15  latitude (f32)
//! 16-19  longitude (f32)
//! 20-21  name-table index (u16, 0xFFFF = none)
//! 22     confidence (u8, 0-255 → 0.0-1.0)
//! 23     format version (u8)
//! 24     slope angle (u8, 0-90)
//! 25     climate zone (u8)
//! 26-27  population in thousands (u16)
//! ```
//!
//! Legacy version 0 records are 24 bytes (bytes 24-27 absent) and decode
//! with defaulted slope/climate/population.

use bytes::{Buf, BufMut};

use crate::error::{FuseError, FuseResult};
use crate::types::{Cell, ClimateZone, FeatureSet, Infrastructure, NameMap, Terrain};

pub const FORMAT_VERSION: u8 = 1;
pub const STRIDE_V1: usize = 28;
pub const STRIDE_V0: usize = 24;

/// Per-cell index meaning "no names".
pub const NO_NAMES: u16 = 0xFFFF;

/// Encoded patch payload: the cell buffer plus its name side table.
#[derive(Debug, Clone)]
pub struct EncodedPatch {
    pub buffer: Vec<u8>,
    pub name_table: Vec<NameMap>,
    pub cell_count: usize,
    pub format_version: u8,
    pub crc32: u32,
}

/// CRC32 (IEEE, polynomial 0xEDB88320) of a buffer.
pub fn crc32(buffer: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(buffer);
    crc.sum()
}

/// Encode cells into a fixed-stride buffer and name table.
///
/// Lossy by contract: elevation clamps to i16, confidence quantizes to
/// 8 bits, slope clamps to [0, 90], population to u16 thousands.
pub fn encode(cells: &[Cell]) -> FuseResult<EncodedPatch> {
    let mut buffer = Vec::with_capacity(cells.len() * STRIDE_V1);
    let mut name_table: Vec<NameMap> = Vec::new();

    for cell in cells {
        let name_idx = if cell.feature_names.is_empty() {
            NO_NAMES
        } else {
            if name_table.len() >= NO_NAMES as usize {
                return Err(FuseError::Fatal(format!(
                    "name table overflow: more than {} named cells in one patch",
                    NO_NAMES
                )));
            }
            name_table.push(cell.feature_names.clone());
            (name_table.len() - 1) as u16
        };

        let mask = cell.features.mask();
        buffer.put_u8(cell.terrain.index());
        buffer.put_u8(cell.infrastructure.index());
        buffer.put_i16_le(cell.elevation.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        buffer.put_u32_le((mask & 0xFFFF_FFFF) as u32);
        buffer.put_u32_le((mask >> 32) as u32);
        buffer.put_f32_le(cell.lat as f32);
        buffer.put_f32_le(cell.lon as f32);
        buffer.put_u16_le(name_idx);
        buffer.put_u8((cell.confidence.clamp(0.0, 1.0) * 255.0).round() as u8);
        buffer.put_u8(FORMAT_VERSION);
        buffer.put_u8(cell.slope_angle.min(90));
        buffer.put_u8(cell.climate.index());
        buffer.put_u16_le(cell.population_k);
    }

    let crc32 = crc32(&buffer);
    Ok(EncodedPatch {
        buffer,
        name_table,
        cell_count: cells.len(),
        format_version: FORMAT_VERSION,
        crc32,
    })
}

/// Format version and stride detected from a cell buffer.
fn detect_stride(buffer: &[u8]) -> FuseResult<(u8, usize)> {
    if buffer.is_empty() {
        return Ok((FORMAT_VERSION, STRIDE_V1));
    }
    if buffer.len() < STRIDE_V0 {
        return Err(FuseError::parse(format!(
            "cell buffer too short: {} bytes",
            buffer.len()
        )));
    }
    // Byte 23 of the first record is the format version in every layout.
    let (version, stride) = match buffer[23] {
        0 => (0u8, STRIDE_V0),
        _ => (buffer[23], STRIDE_V1),
    };
    if buffer.len() % stride != 0 {
        return Err(FuseError::parse(format!(
            "cell buffer length {} is not a multiple of stride {stride} (version {version})",
            buffer.len()
        )));
    }
    Ok((version, stride))
}

/// A decoded cell and whatever field-level validation errors it carries.
/// `errors` is only populated when decoding in validation mode.
#[derive(Debug, Clone)]
pub struct DecodedCell {
    pub cell: Cell,
    pub errors: Vec<String>,
}

/// Decode a cell buffer. Out-of-range terrain/infrastructure indices fall
/// back to index 0 / `none`; decode never aborts on a bad cell.
pub fn decode(buffer: &[u8], name_table: &[NameMap]) -> FuseResult<Vec<Cell>> {
    Ok(decode_impl(buffer, name_table, false)?
        .into_iter()
        .map(|d| d.cell)
        .collect())
}

/// Decode in validation mode: each cell is annotated with its field-level
/// errors (out-of-range index, lat/lon out of range, implausible elevation,
/// dangling name-table index).
pub fn decode_validated(buffer: &[u8], name_table: &[NameMap]) -> FuseResult<Vec<DecodedCell>> {
    decode_impl(buffer, name_table, true)
}

fn decode_impl(buffer: &[u8], name_table: &[NameMap], validate: bool) -> FuseResult<Vec<DecodedCell>> {
    let (_, stride) = detect_stride(buffer)?;
    let mut cells = Vec::with_capacity(buffer.len() / stride);

    for record in buffer.chunks_exact(stride) {
        let mut buf = record;
        let mut errors = Vec::new();

        let terrain_idx = buf.get_u8();
        let infra_idx = buf.get_u8();
        let elevation = buf.get_i16_le() as i32;
        let mask = buf.get_u32_le() as u64 | ((buf.get_u32_le() as u64) << 32);
        let lat = buf.get_f32_le() as f64;
        let lon = buf.get_f32_le() as f64;
        let name_idx = buf.get_u16_le();
        let confidence = buf.get_u8() as f32 / 255.0;
        let _version = buf.get_u8();
        let (slope_angle, climate_idx, population_k) = if stride == STRIDE_V1 {
            (buf.get_u8(), buf.get_u8(), buf.get_u16_le())
        } else {
            (0, 0, 0)
        };

        let terrain = Terrain::from_index(terrain_idx).unwrap_or_else(|| {
            if validate {
                errors.push(format!("terrain index {terrain_idx} out of range"));
            }
            Terrain::from_index(0).unwrap()
        });
        let infrastructure = Infrastructure::from_index(infra_idx).unwrap_or_else(|| {
            if validate {
                errors.push(format!("infrastructure index {infra_idx} out of range"));
            }
            Infrastructure::None
        });
        let climate = ClimateZone::from_index(climate_idx).unwrap_or_else(|| {
            if validate {
                errors.push(format!("climate index {climate_idx} out of range"));
            }
            ClimateZone::Temperate
        });

        if validate {
            if !(-90.0..=90.0).contains(&lat) {
                errors.push(format!("latitude {lat} out of range"));
            }
            if !(-180.0..=180.0).contains(&lon) {
                errors.push(format!("longitude {lon} out of range"));
            }
            if !(-500..=9000).contains(&elevation) {
                errors.push(format!("elevation {elevation} outside [-500, 9000]"));
            }
            if slope_angle > 90 {
                errors.push(format!("slope {slope_angle} above 90"));
            }
            if name_idx != NO_NAMES && name_idx as usize >= name_table.len() {
                errors.push(format!(
                    "name-table index {name_idx} dangles (table has {} entries)",
                    name_table.len()
                ));
            }
        }

        let feature_names = if name_idx == NO_NAMES {
            NameMap::new()
        } else {
            name_table.get(name_idx as usize).cloned().unwrap_or_default()
        };

        cells.push(DecodedCell {
            cell: Cell {
                terrain,
                infrastructure,
                elevation,
                features: FeatureSet::from_mask(mask),
                feature_names,
                attributes: FeatureSet::new(),
                lat,
                lon,
                confidence,
                slope_angle: slope_angle.min(90),
                climate,
                population_k,
            },
            errors,
        });
    }
    Ok(cells)
}

/// Check a stored CRC against the buffer; Err carries both values.
pub fn verify_crc(buffer: &[u8], stored: u32) -> FuseResult<()> {
    let computed = crc32(buffer);
    if computed != stored {
        return Err(FuseError::Integrity { stored, computed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Feature;

    fn sample_cell() -> Cell {
        let mut cell = Cell {
            terrain: Terrain::MountainForest,
            infrastructure: Infrastructure::Railway,
            elevation: 1843,
            lat: 46.5,
            lon: 8.25,
            confidence: 0.75,
            slope_angle: 22,
            climate: ClimateZone::Alpine,
            population_k: 4,
            ..Cell::default()
        };
        cell.features.insert(Feature::Tunnel);
        cell.features.insert(Feature::Cliffs);
        cell.feature_names.insert("navigable_waterway".into(), "Rhein".into());
        cell
    }

    #[test]
    fn encode_decode_round_trip() {
        let cells = vec![sample_cell(), Cell::default()];
        let patch = encode(&cells).unwrap();
        assert_eq!(patch.cell_count, 2);
        assert_eq!(patch.buffer.len(), 2 * STRIDE_V1);
        assert_eq!(patch.name_table.len(), 1);

        let decoded = decode(&patch.buffer, &patch.name_table).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].terrain, Terrain::MountainForest);
        assert_eq!(decoded[0].infrastructure, Infrastructure::Railway);
        assert_eq!(decoded[0].elevation, 1843);
        assert_eq!(decoded[0].features.mask(), cells[0].features.mask());
        assert_eq!(decoded[0].feature_names, cells[0].feature_names);
        assert_eq!(decoded[0].slope_angle, 22);
        assert_eq!(decoded[0].climate, ClimateZone::Alpine);
        assert_eq!(decoded[0].population_k, 4);
        assert!((decoded[0].lat - 46.5).abs() < 1e-4);
        assert!((decoded[0].confidence - 0.75).abs() < 1.0 / 255.0);
        assert_eq!(decoded[1].feature_names.len(), 0);
    }

    #[test]
    fn elevation_clamps_to_i16() {
        let cell = Cell { elevation: 40_000, ..Cell::default() };
        let patch = encode(&[cell]).unwrap();
        let decoded = decode(&patch.buffer, &patch.name_table).unwrap();
        assert_eq!(decoded[0].elevation, i16::MAX as i32);
    }

    #[test]
    fn crc_detects_flipped_byte() {
        let patch = encode(&[sample_cell()]).unwrap();
        assert!(verify_crc(&patch.buffer, patch.crc32).is_ok());

        let mut corrupted = patch.buffer.clone();
        corrupted[5] ^= 0x40;
        let err = verify_crc(&corrupted, patch.crc32).unwrap_err();
        assert!(matches!(err, FuseError::Integrity { .. }));
    }

    #[test]
    fn bad_indices_fall_back_and_annotate() {
        let patch = encode(&[Cell::default()]).unwrap();
        let mut buffer = patch.buffer.clone();
        buffer[0] = 200; // terrain index out of range
        buffer[1] = 99; // infrastructure index out of range

        let lenient = decode(&buffer, &patch.name_table).unwrap();
        assert_eq!(lenient[0].terrain.index(), 0);
        assert_eq!(lenient[0].infrastructure, Infrastructure::None);

        let validated = decode_validated(&buffer, &patch.name_table).unwrap();
        assert_eq!(validated[0].errors.len(), 2);
    }

    #[test]
    fn dangling_name_index_is_reported() {
        let patch = encode(&[sample_cell()]).unwrap();
        let validated = decode_validated(&patch.buffer, &[]).unwrap();
        assert!(validated[0]
            .errors
            .iter()
            .any(|e| e.contains("name-table index")));
    }

    #[test]
    fn legacy_v0_records_decode() {
        // Build a v0 record by hand: 24 bytes, version byte 0.
        let mut buf = Vec::new();
        buf.put_u8(Terrain::Desert.index());
        buf.put_u8(Infrastructure::Track.index());
        buf.put_i16_le(412);
        buf.put_u32_le(Feature::Pipeline.bit() as u32);
        buf.put_u32_le(0);
        buf.put_f32_le(24.0);
        buf.put_f32_le(45.0);
        buf.put_u16_le(NO_NAMES);
        buf.put_u8(128);
        buf.put_u8(0); // legacy format version
        assert_eq!(buf.len(), STRIDE_V0);

        let decoded = decode(&buf, &[]).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].terrain, Terrain::Desert);
        assert_eq!(decoded[0].elevation, 412);
        assert!(decoded[0].features.contains(Feature::Pipeline));
        assert_eq!(decoded[0].slope_angle, 0);
        assert_eq!(decoded[0].population_k, 0);
    }

    #[test]
    fn misaligned_buffer_is_a_parse_error() {
        let patch = encode(&[Cell::default()]).unwrap();
        let mut buffer = patch.buffer.clone();
        buffer.push(0);
        assert!(decode(&buffer, &patch.name_table).is_err());
    }
}
