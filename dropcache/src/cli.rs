use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dropcache", version, about = "Drop clean page cache below a path")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drop clean cached pages of each path and everything beneath it
    Drop {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show how many pages of each file below a path are cached
    Stat {
        path: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl Commands {
    pub fn config(&self) -> Option<&PathBuf> {
        match self {
            Commands::Drop { config, .. } | Commands::Stat { config, .. } => config.as_ref(),
        }
    }
}
