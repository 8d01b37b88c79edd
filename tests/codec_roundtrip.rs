// Round-trip law for the binary cell codec over the full label catalogs,
// plus CRC behavior on corruption.

use hexatlas::{
    crc32, decode, encode, verify_crc, Cell, ClimateZone, Feature, FeatureSet, FuseError,
    Infrastructure, Terrain,
};
use strum::IntoEnumIterator;

fn synthetic_cells(count: usize) -> Vec<Cell> {
    let terrains: Vec<Terrain> = Terrain::iter().collect();
    let infras: Vec<Infrastructure> = Infrastructure::iter().collect();
    let features: Vec<Feature> = Feature::iter().collect();

    (0..count)
        .map(|i| {
            let mut cell = Cell {
                terrain: terrains[i % terrains.len()],
                infrastructure: infras[i % infras.len()],
                elevation: (i as i32 * 37) % 9000 - 400,
                lat: -80.0 + (i as f64 * 0.11) % 160.0,
                lon: -170.0 + (i as f64 * 0.37) % 340.0,
                confidence: (i % 11) as f32 / 10.0,
                slope_angle: (i % 91) as u8,
                climate: ClimateZone::derive(0.0, terrains[i % terrains.len()]),
                population_k: (i % 900) as u16,
                ..Cell::default()
            };
            // Every feature appears somewhere; most cells carry a few.
            cell.features.insert(features[i % features.len()]);
            cell.features.insert(features[(i * 7 + 3) % features.len()]);
            if i % 13 == 0 {
                cell.feature_names
                    .insert("navigable_waterway".into(), format!("River {i}"));
            }
            if i % 29 == 0 {
                cell.feature_names.insert("settlement".into(), format!("Town {i}"));
            }
            cell
        })
        .collect()
}

#[test]
fn thousand_cell_round_trip() {
    let cells = synthetic_cells(1000);
    let patch = encode(&cells).unwrap();
    assert_eq!(patch.cell_count, 1000);
    assert_eq!(patch.crc32, crc32(&patch.buffer));

    let decoded = decode(&patch.buffer, &patch.name_table).unwrap();
    assert_eq!(decoded.len(), cells.len());

    for (original, decoded) in cells.iter().zip(&decoded) {
        assert_eq!(decoded.terrain, original.terrain);
        assert_eq!(decoded.infrastructure, original.infrastructure);
        // Elevation clamps to i16; the synthetic range stays inside it.
        assert_eq!(decoded.elevation, original.elevation);
        // Features compare as sets (wire form is the bitmask).
        assert_eq!(decoded.features.mask(), original.features.mask());
        assert_eq!(decoded.feature_names, original.feature_names);
        // Confidence survives to 8-bit precision.
        assert!((decoded.confidence - original.confidence).abs() <= 1.0 / 255.0 + f32::EPSILON);
        assert_eq!(decoded.slope_angle, original.slope_angle.min(90));
        assert_eq!(decoded.climate, original.climate);
        assert_eq!(decoded.population_k, original.population_k);
        assert!((decoded.lat - original.lat).abs() < 1e-3);
        assert!((decoded.lon - original.lon).abs() < 1e-3);
    }
}

#[test]
fn every_label_survives_the_codec() {
    // One cell per terrain × a rotating infrastructure, all features set.
    let mut all_features = FeatureSet::new();
    for f in Feature::iter() {
        all_features.insert(f);
    }
    let cells: Vec<Cell> = Terrain::iter()
        .map(|t| Cell {
            terrain: t,
            features: all_features.clone(),
            ..Cell::default()
        })
        .collect();
    let patch = encode(&cells).unwrap();
    let decoded = decode(&patch.buffer, &patch.name_table).unwrap();
    for (cell, t) in decoded.iter().zip(Terrain::iter()) {
        assert_eq!(cell.terrain, t);
        assert_eq!(cell.features.len(), Feature::COUNT);
    }
}

#[test]
fn flipped_byte_breaks_the_crc() {
    let cells = synthetic_cells(64);
    let patch = encode(&cells).unwrap();
    assert!(verify_crc(&patch.buffer, patch.crc32).is_ok());

    // Flip one byte somewhere in the middle.
    let mut corrupted = patch.buffer.clone();
    let target = corrupted.len() / 2 + 3;
    corrupted[target] ^= 0x10;

    match verify_crc(&corrupted, patch.crc32) {
        Err(FuseError::Integrity { stored, computed }) => {
            assert_eq!(stored, patch.crc32);
            assert_ne!(stored, computed);
        }
        other => panic!("expected integrity error, got {other:?}"),
    }
}

#[test]
fn encoding_is_deterministic() {
    let cells = synthetic_cells(100);
    let a = encode(&cells).unwrap();
    let b = encode(&cells).unwrap();
    assert_eq!(a.buffer, b.buffer);
    assert_eq!(a.crc32, b.crc32);
    assert_eq!(a.name_table, b.name_table);
}
