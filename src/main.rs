use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use argh::FromArgs;
use boid_flock::FlockSettings;
use boid_flock::boids::{DEFAULT_MAX_BOIDS, Flock};
use boid_flock::neighbors::{BruteForce, NeighborQuery, UniformGrid};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Run a headless flocking simulation and print a summary of the final flock.
struct Args {
    /// number of boids to spawn
    #[argh(option, default = "200")]
    boids: usize,

    /// number of simulation steps to run
    #[argh(option, default = "500")]
    steps: u64,

    /// seconds per step
    #[argh(option, default = "0.02")]
    dt: f32,

    /// seed for spawning; random when omitted
    #[argh(option)]
    seed: Option<u64>,

    /// JSON file with flock settings; missing fields keep their defaults
    #[argh(option)]
    settings: Option<PathBuf>,

    /// neighbour search: "grid" or "brute"
    #[argh(option, default = "String::from(\"grid\")")]
    strategy: String,

    /// boids spawn inside a square of this half-width around the origin
    #[argh(option, default = "10.0")]
    extent: f32,

    /// population cap
    #[argh(option, default = "DEFAULT_MAX_BOIDS")]
    max_boids: usize,

    /// hide the progress bar
    #[argh(switch)]
    quiet: bool,
}

fn load_settings(path: Option<&Path>) -> Result<FlockSettings> {
    let settings = match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening settings file {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing settings file {}", path.display()))?
        }
        None => FlockSettings::default(),
    };
    let (settings, _) = settings.clamped();
    Ok(settings)
}

fn neighbor_query(name: &str) -> Result<Box<dyn NeighborQuery>> {
    match name {
        "grid" => Ok(Box::new(UniformGrid::new())),
        "brute" => Ok(Box::new(BruteForce)),
        other => bail!("unknown strategy {other:?}, expected \"grid\" or \"brute\""),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args: Args = argh::from_env();
    if args.dt.is_nan() || args.dt <= 0.0 {
        bail!("--dt must be positive, got {}", args.dt);
    }
    if !args.extent.is_finite() {
        bail!("--extent must be finite, got {}", args.extent);
    }
    let settings = load_settings(args.settings.as_deref())?;
    let seed = args.seed.unwrap_or_else(rand::random);

    let mut flock =
        Flock::with_query(seed, neighbor_query(&args.strategy)?).with_max_boids(args.max_boids);
    let spawned = flock.spawn_random(args.boids, args.extent, &settings);
    info!(seed, spawned, strategy = flock.strategy_name(), "starting simulation");

    let pbar = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(args.steps)
    };
    pbar.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}/{eta_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
        )
        .context("building progress bar template")?,
    );
    for _ in 0..args.steps {
        flock.step(&settings, args.dt);
        pbar.inc(1);
    }
    pbar.finish_and_clear();

    let stats = flock.stats();
    info!(polarisation = stats.polarisation, spread = stats.spread, "simulation finished");
    serde_json::to_writer_pretty(io::stdout().lock(), &stats).context("writing summary")?;
    println!();
    Ok(())
}
