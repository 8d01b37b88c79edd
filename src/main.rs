use anyhow::Result;
use clap::Parser;

use hexatlas::cli::{Cli, Commands};
use hexatlas::commands::{generate, scan, verify};

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Generate(args) => generate(&cli, args),
        Commands::Scan(args) => scan(&cli, args),
        Commands::Verify(args) => verify(&cli, args),
    }
}
