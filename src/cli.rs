use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// Hex terrain fusion CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "hexatlas", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Provider endpoint config (JSON); built-in defaults if omitted
    #[arg(long, value_hint = ValueHint::FilePath, global = true)]
    pub providers: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a single map and write the viewer JSON
    Generate(GenerateArgs),

    /// Run (or resume) a world scan into a patch store
    Scan(ScanArgs),

    /// Verify the integrity of a scanned patch store
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Map center latitude in degrees
    pub lat: f64,

    /// Map center longitude in degrees
    pub lon: f64,

    /// Output JSON file
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Map width in km
    #[arg(long, default_value_t = 100.0)]
    pub width_km: f64,

    /// Map height in km
    #[arg(long, default_value_t = 100.0)]
    pub height_km: f64,

    /// Hex cell size in km (selects the tier)
    #[arg(long, default_value_t = 2.0)]
    pub cell_km: f64,

    /// Overwrite if the file exists
    #[arg(long)]
    pub force: bool,

    /// Write the generation log next to the output (<output>.log)
    #[arg(long)]
    pub log: bool,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Patch store directory
    #[arg(value_hint = ValueHint::DirPath)]
    pub store: PathBuf,

    /// Scan resolution: coarse (3° patches) or fine (1°)
    #[arg(long, default_value = "coarse")]
    pub resolution: String,

    /// Override the per-resolution default cell size in km
    #[arg(long)]
    pub cell_km: Option<f64>,

    /// Southern scan limit in degrees
    #[arg(long, default_value_t = -90)]
    pub lat_min: i16,

    /// Northern scan limit in degrees
    #[arg(long, default_value_t = 90)]
    pub lat_max: i16,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Patch store directory
    #[arg(value_hint = ValueHint::DirPath)]
    pub store: PathBuf,

    /// Resolution to verify
    #[arg(long, default_value = "coarse")]
    pub resolution: String,

    /// Also report 10° zones with no coverage (whole-planet scans)
    #[arg(long)]
    pub world: bool,
}
