//! Stand-alone disk-image formatting tool, in the spirit of the teacher's
//! `tools/extract.rs`: a small `clap` binary with one job, separate from
//! the main CLI's subcommand tree.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use eduos::disk::DiskGeometry;
use eduos::kernel::Kernel;

#[derive(Parser)]
#[command(name = "mkdisk")]
#[command(about = "Create and format a fresh simulated disk image", long_about = None)]
struct Cli {
    /// Path of the disk image to create.
    #[arg(long, value_name = "PATH")]
    path: PathBuf,

    /// Number of tracks.
    #[arg(long, default_value_t = 32)]
    tracks: usize,

    /// Sectors per track.
    #[arg(long, default_value_t = 32)]
    sectors_per_track: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let geometry = DiskGeometry::new(cli.tracks, cli.sectors_per_track);

    Kernel::boot(&cli.path, geometry, true)
        .with_context(|| format!("formatting {}", cli.path.display()))?;

    println!(
        "formatted {} ({} tracks x {} sectors/track = {} sectors)",
        cli.path.display(),
        cli.tracks,
        cli.sectors_per_track,
        geometry.total_sectors(),
    );
    Ok(())
}
