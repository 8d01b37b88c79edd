use anyhow::{bail, Context, Result};

use crate::cli::{Cli, GenerateArgs};
use crate::commands::{http_client, load_providers};
use crate::common::GenLog;
use crate::pipeline::{generate_map, MapSpec};

/// Generate one map and write the viewer JSON (and optionally the log).
pub fn generate(cli: &Cli, args: &GenerateArgs) -> Result<()> {
    if !args.force && args.output.exists() {
        bail!(
            "Refusing to overwrite existing file: {} (use --force)",
            args.output.display()
        );
    }
    let providers = load_providers(cli.providers.as_deref())?;
    let http = http_client()?;
    let spec = MapSpec {
        center_lat: args.lat,
        center_lon: args.lon,
        width_km: args.width_km,
        height_km: args.height_km,
        cell_km: args.cell_km,
    };

    if cli.verbose > 0 {
        let (cols, rows) = spec.grid_size();
        eprintln!("[generate] {cols}×{rows} cells, tier {}", spec.tier().name());
    }

    let mut log = GenLog::new();
    let result = generate_map(&http, &providers, &spec, &mut log);

    if args.log || result.is_err() {
        let log_path = args.output.with_extension("log");
        std::fs::write(&log_path, log.render())
            .with_context(|| format!("write {}", log_path.display()))?;
        if cli.verbose > 0 {
            eprintln!("[generate] log -> {}", log_path.display());
        }
    }

    // A failed generation yields no partial map; the log above survives.
    let map = result?;
    let json = serde_json::to_vec_pretty(&map.to_viewer_json())?;
    std::fs::write(&args.output, json)
        .with_context(|| format!("write {}", args.output.display()))?;

    if cli.verbose > 0 {
        eprintln!(
            "[generate] {} cells -> {} ({} warnings)",
            map.cells.len(),
            args.output.display(),
            log.warn_count()
        );
    }
    Ok(())
}
