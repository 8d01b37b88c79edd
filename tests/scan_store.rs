// Disk-backed scan lifecycle: scan a narrow window, resume it, corrupt a
// stored patch, and let verification find the damage.

use hexatlas::{
    run_scan, verify_scan, CellStore, DiskStore, MemFetch, PatchStatus, ProviderConfig,
    Resolution, ScanConfig,
};

fn providers() -> ProviderConfig {
    ProviderConfig {
        landcover_url: "https://lc/{tile}".into(),
        elevation_primary: "https://elev1".into(),
        elevation_secondary: "https://elev2".into(),
        vector_endpoint: "https://overpass".into(),
        gazetteer_endpoint: "https://gaz".into(),
        pacing: false,
        ..ProviderConfig::default()
    }
}

fn narrow_config() -> ScanConfig {
    let mut config = ScanConfig::new(Resolution::Coarse).without_timers();
    config.lat_min = 0;
    config.lat_max = 3;
    config.cell_km = 60.0;
    config
}

#[test]
fn disk_scan_survives_restart_and_verification_catches_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let http = MemFetch::new(); // offline: every provider 404s, cells default

    // First run: complete the row of patches.
    {
        let mut store = CellStore::new(DiskStore::new(dir.path()));
        let summary =
            run_scan(&mut store, &http, &providers(), &narrow_config(), &|| false, 0).unwrap();
        assert_eq!(summary.completed, 120);
        assert_eq!(summary.failed, 0);
    }

    // A fresh store over the same directory resumes to a no-op.
    {
        let mut store = CellStore::new(DiskStore::new(dir.path()));
        let summary =
            run_scan(&mut store, &http, &providers(), &narrow_config(), &|| false, 0).unwrap();
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.skipped, 120);

        let manifest = store.load_manifest(Resolution::Coarse).unwrap();
        assert_eq!(manifest.count_status(PatchStatus::Complete), 120);

        let report = verify_scan(&store, Resolution::Coarse, false).unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.checked, 120);
    }

    // Corrupt one stored buffer on disk; verification reports exactly it.
    let victim = dir.path().join("3deg/N00E006_3d.cells");
    let mut bytes = std::fs::read(&victim).unwrap();
    bytes[7] ^= 0xFF;
    std::fs::write(&victim, bytes).unwrap();

    let store = CellStore::new(DiskStore::new(dir.path()));
    let report = verify_scan(&store, Resolution::Coarse, false).unwrap();
    assert_eq!(report.crc_mismatches, vec!["N00E006_3d".to_string()]);
    assert!(!report.is_clean());
}
