use anyhow::Result;

use crate::cli::{Cli, VerifyArgs};
use crate::scan::verify_scan;
use crate::store::{CellStore, DiskStore};

/// Verify the integrity of a scanned patch store.
pub fn verify(cli: &Cli, args: &VerifyArgs) -> Result<()> {
    let store = CellStore::new(DiskStore::new(&args.store));
    let report = verify_scan(&store, args.resolution.parse()?, args.world)?;

    eprintln!("[verify] checked {} completed patches", report.checked);
    for id in &report.crc_mismatches {
        eprintln!("[verify] crc mismatch: {id}");
    }
    for id in &report.missing_buffers {
        eprintln!("[verify] missing buffer: {id}");
    }
    for id in &report.count_mismatches {
        eprintln!("[verify] cell count mismatch: {id}");
    }
    for (id, count) in &report.invalid_cells {
        eprintln!("[verify] {count} invalid sampled cells: {id}");
    }
    for id in &report.stale_in_progress {
        eprintln!("[verify] stale in_progress: {id}");
    }
    for id in &report.incomplete_phases {
        eprintln!("[verify] incomplete phases: {id}");
    }
    if cli.verbose > 0 {
        for zone in &report.empty_zones {
            eprintln!("[verify] no coverage: {zone}");
        }
    } else if !report.empty_zones.is_empty() {
        eprintln!("[verify] {} empty 10° zones (use -v to list)", report.empty_zones.len());
    }

    if report.is_clean() {
        eprintln!("[verify] ok");
    }
    Ok(())
}
