use std::path::PathBuf;

use clap::Parser;
use server::init::{self, ServerOptions};
use shared::constants::{DEFAULT_WORLD_NAME, MAX_TICKS_PER_SECOND, TICKS_PER_SECOND};
use shared::water::WaterFlowPreset;

#[derive(Parser, Debug)]
#[command(version, about = "Headless leveled water flow server", long_about = None)]
struct Args {
    /// RON scene to load instead of the generated demo world
    #[arg(short, long)]
    scene: Option<PathBuf>,

    /// RON water flow config; overrides --preset
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value_t = WaterFlowPreset::Default)]
    preset: WaterFlowPreset,

    #[arg(short, long, default_value = DEFAULT_WORLD_NAME)]
    world: String,

    /// Seed for the demo world; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many frames
    #[arg(short, long)]
    ticks: Option<u64>,

    #[arg(long, default_value_t = TICKS_PER_SECOND)]
    tick_rate: u64,
}

fn main() {
    let args = Args::parse();

    // Validate tick_rate is within reasonable range
    if args.tick_rate < 1 || args.tick_rate > MAX_TICKS_PER_SECOND {
        eprintln!(
            "Error: tick_rate must be between 1 and {} (inclusive).",
            MAX_TICKS_PER_SECOND
        );
        eprintln!("Got: {}", args.tick_rate);
        std::process::exit(1);
    }

    init::init(ServerOptions {
        world_name: args.world,
        scene: args.scene,
        config: args.config,
        preset: args.preset,
        seed: args.seed.unwrap_or_else(rand::random::<u64>),
        tick_rate: args.tick_rate,
        max_ticks: args.ticks,
    });
}
