use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use jumpstorm::{
    components::{BoundingBox, Jump, Velocity},
    host, web, Config, ConfigLoader,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "JumpStorm physics server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the authoritative game server
    Serve {
        /// Path to the config YAML file
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
    /// Drop a player onto the floor and run a fixed number of ticks without networking
    Simulate {
        /// Path to the config YAML file
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 600)]
        ticks: u64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::new(".")
            .load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn simulate(config: &Config, ticks: u64) -> Result<()> {
    let (mut game, player) = host::local_game(config)?;
    let tick_ms = config.server.tick_interval_ms();

    let mut clock = 0.0;
    game.start(clock);
    for _ in 0..ticks {
        clock += tick_ms;
        game.advance(clock)?;
    }

    let world = game.world();
    let center = world.require::<BoundingBox>(&player)?.center;
    let velocity = world.require::<Velocity>(&player)?;
    let can_jump = world.get::<Jump>(&player).is_some_and(|jump| jump.can_jump);
    info!(
        ticks,
        x = center.x,
        y = center.y,
        dy = velocity.dy,
        can_jump,
        average_tick_us = game.average_tick_time().map(|t| t.as_micros() as u64),
        "simulation finished"
    );
    println!(
        "Player after {} ticks: center=({:.2}, {:.2}) velocity=({:.3}, {:.3}) grounded={}",
        ticks, center.x, center.y, velocity.dx, velocity.dy, can_jump
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config, host, port } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            init_logging(&config);
            web::run(config).await
        }
        Command::Simulate { config, ticks } => {
            let config = load_config(config.as_ref())?;
            init_logging(&config);
            simulate(&config, ticks)
        }
    }
}
