/*
 * Pedagogical OS Emulator CLI
 * ===========================
 *
 * Command-line front-end over the kernel context: format a disk image,
 * populate its file system, and inspect a loaded executable's address
 * space. Sequencing mirrors the teacher's own `main.rs` (construct the
 * disk, construct the rest of the machine on top of it, then act) but
 * driven through subcommands instead of a single hardcoded boot path.
 *
 * Instruction execution is out of scope (spec §1's Non-goals), so there
 * is no subcommand that runs an arbitrary executable to completion --
 * `exec` loads it far enough to report its paged shape.
 */

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};

use eduos::kernel::Kernel;
use eduos::KernelConfig;

#[derive(Parser)]
#[command(name = "eduos")]
#[command(about = "A teaching OS emulator: file system + process substrate", long_about = None)]
struct Cli {
    /// Path to the simulated disk image.
    #[arg(long, default_value = "disk.img", global = true)]
    disk: PathBuf,

    /// Path to a TOML config file overriding disk geometry and process
    /// limits. Defaults built into `KernelConfig` are used if omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and format a fresh disk image.
    Format,
    /// List every file and directory on the disk.
    Ls,
    /// Create a new, empty file.
    Mkfile {
        path: String,
        #[arg(long, default_value_t = 0)]
        size: u32,
    },
    /// Write bytes (read from a host file) into a file at a byte offset.
    Write {
        path: String,
        /// Host file whose bytes are written into the simulated file.
        source: PathBuf,
        #[arg(long, default_value_t = 0)]
        at: u32,
    },
    /// Read bytes back out of a file and print them as hex.
    Cat {
        path: String,
        #[arg(long, default_value_t = 0)]
        at: u32,
        #[arg(long, default_value_t = 128)]
        length: usize,
    },
    /// Remove a file or an entire directory subtree.
    Rm { path: String },
    /// Load a NOFF executable far enough to report its page-table shape.
    Exec { path: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = TermLogger::init(level, LogConfig::default(), TerminalMode::Mixed, ColorChoice::Auto);

    let config = match &cli.config {
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::default(),
    };

    match &cli.command {
        Commands::Format => {
            Kernel::boot_with_config(&cli.disk, &config, true)
                .with_context(|| format!("formatting {}", cli.disk.display()))?;
            println!("formatted {} ({:?})", cli.disk.display(), config.geometry());
        }
        Commands::Ls => {
            let kernel = Kernel::boot_with_config(&cli.disk, &config, false)?;
            for path in kernel.list_files() {
                println!("{path}");
            }
        }
        Commands::Mkfile { path, size } => {
            let mut kernel = Kernel::boot_with_config(&cli.disk, &config, false)?;
            if !kernel.create_file(path, *size)? {
                anyhow::bail!("could not create {path} (already exists, or out of space)");
            }
        }
        Commands::Write { path, source, at } => {
            let mut kernel = Kernel::boot_with_config(&cli.disk, &config, false)?;
            let data = fs::read(source).with_context(|| format!("reading {}", source.display()))?;
            let written = kernel
                .write_file(path, *at, &data)?
                .ok_or_else(|| anyhow::anyhow!("no such file: {path}"))?;
            println!("wrote {written} bytes to {path} at offset {at}");
        }
        Commands::Cat { path, at, length } => {
            let mut kernel = Kernel::boot_with_config(&cli.disk, &config, false)?;
            let mut buf = vec![0u8; *length];
            let read = kernel
                .read_file(path, *at, &mut buf)?
                .ok_or_else(|| anyhow::anyhow!("no such file: {path}"))?;
            for byte in &buf[..read] {
                print!("{byte:02x}");
            }
            println!();
        }
        Commands::Rm { path } => {
            let mut kernel = Kernel::boot_with_config(&cli.disk, &config, false)?;
            if !kernel.remove_file(path)? {
                anyhow::bail!("could not remove {path}");
            }
        }
        Commands::Exec { path } => {
            let mut kernel = Kernel::boot_with_config(&cli.disk, &config, false)?;
            let info = kernel.inspect_executable(path)?;
            println!(
                "{path}: {} pages, initial sp=0x{:x}",
                info.num_pages, info.initial_sp
            );
        }
    }

    Ok(())
}
