//! tilesource CLI
//!
//! Inspects single-file tile archives and loads individual tiles through
//! the same source engine a renderer would use.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use error::CliError;
use runner::{CliRunner, GlobalOptions};

#[derive(Parser, Debug)]
#[command(name = "tilesource")]
#[command(version, about = "Serve tiles from single-file tile archives", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.tilesource/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tile size in pixels, overriding the config file
    #[arg(long, global = true)]
    tile_size: Option<u32>,

    /// Number of vector parse workers, overriding the config file
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Directory for the log file
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show an archive's kind, zoom range, bounds and metadata
    Info {
        /// Path to the archive
        archive: PathBuf,
    },

    /// Load a single tile
    Tile {
        /// Path to the archive
        archive: PathBuf,

        /// Zoom level
        z: u8,

        /// Tile column
        x: u32,

        /// Tile row (XYZ)
        y: u32,

        /// Write raster tiles to this PNG file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn global_options(&self) -> GlobalOptions {
        GlobalOptions {
            config: self.config.clone(),
            tile_size: self.tile_size,
            workers: self.workers,
            log_dir: self.log_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let runner = CliRunner::new(&cli.global_options())?;

    match cli.command {
        Commands::Info { archive } => commands::info::run(&runner, &archive).await,
        Commands::Tile {
            archive,
            z,
            x,
            y,
            output,
        } => commands::tile::run(&runner, &archive, z, x, y, output.as_deref()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let cli = Cli::try_parse_from(["tilesource", "info", "world.pmtiles"]).unwrap();
        match cli.command {
            Commands::Info { archive } => assert_eq!(archive, PathBuf::from("world.pmtiles")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_tile_with_globals() {
        let cli = Cli::try_parse_from([
            "tilesource",
            "tile",
            "aerial.pmtiles",
            "3",
            "4",
            "2",
            "--output",
            "out.png",
            "--workers",
            "2",
            "--tile-size",
            "256",
        ])
        .unwrap();

        let options = cli.global_options();
        assert_eq!(options.workers, Some(2));
        assert_eq!(options.tile_size, Some(256));
        match cli.command {
            Commands::Tile {
                z, x, y, output, ..
            } => {
                assert_eq!((z, x, y), (3, 4, 2));
                assert_eq!(output, Some(PathBuf::from("out.png")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_tile_requires_coordinates() {
        assert!(Cli::try_parse_from(["tilesource", "tile", "a.pmtiles", "3"]).is_err());
    }
}
