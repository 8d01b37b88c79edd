use anyhow::Result;

use crate::cli::{Cli, ScanArgs};
use crate::commands::{http_client, load_providers};
use crate::scan::{run_scan, ScanConfig};
use crate::store::{CellStore, DiskStore};

/// Run (or resume) a world scan into a disk-backed patch store.
pub fn scan(cli: &Cli, args: &ScanArgs) -> Result<()> {
    let providers = load_providers(cli.providers.as_deref())?;
    let http = http_client()?;

    let mut config = ScanConfig::new(args.resolution.parse()?);
    if let Some(cell_km) = args.cell_km {
        config.cell_km = cell_km;
    }
    config.lat_min = args.lat_min;
    config.lat_max = args.lat_max;

    let mut store = CellStore::new(DiskStore::new(&args.store));
    let summary = run_scan(&mut store, &http, &providers, &config, &|| false, cli.verbose)?;

    eprintln!(
        "[scan] complete={} failed={} skipped={}{}",
        summary.completed,
        summary.failed,
        summary.skipped,
        if summary.aborted { " (aborted)" } else { "" }
    );
    Ok(())
}
