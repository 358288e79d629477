mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use env_logger::Env;
use libdropcache::config::{Config, load_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = match cli.command.config() {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level.as_str())).init();

    match cli.command {
        Commands::Drop { paths, .. } => commands::drop::run(&cfg, paths).await,
        Commands::Stat { path, .. } => commands::stat::run(&cfg, path).await,
    }
}
