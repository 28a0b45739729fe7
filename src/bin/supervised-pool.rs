use std::path::PathBuf;
use std::process::exit;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info};
use rand::Rng;

use supervised_pool::{id_from_context, Context, Pool, PoolConfig, Result};

/// Upper bound of a single simulated work cycle.
const MAX_CYCLE_MS: u64 = 200;

#[derive(Parser)]
#[command(
    name = "supervised-pool",
    version,
    about = "Runs a pool of supervised sleeping workers"
)]
struct Cli {
    /// Number of workers (defaults to the number of CPUs)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Delay before a returned worker is restarted
    #[arg(long, value_name = "MS")]
    restart_delay_ms: Option<u64>,

    /// JSON config file; command-line flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of workers to kill once the pool is running
    #[arg(long, default_value_t = 0, value_name = "K")]
    kill: usize,

    /// How long to run before closing the pool
    #[arg(long, default_value_t = 1000, value_name = "MS")]
    run_ms: u64,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => PoolConfig::from_file(path)?,
        None => PoolConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(delay) = cli.restart_delay_ms {
        config.restart_delay_ms = delay;
    }

    info!("supervised-pool {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Running {} workers, restart delay {}ms",
        config.workers, config.restart_delay_ms
    );

    let pool = Pool::builder(work_cycle).config(&config).build();
    pool.resize(config.workers)?;
    info!("Workers: {:?}", pool.worker_ids());

    let victims: Vec<String> = pool.worker_ids().into_iter().take(cli.kill).collect();
    for id in &victims {
        if pool.kill_worker(id)? {
            info!("Killed worker {}", id);
        }
    }

    thread::sleep(Duration::from_millis(cli.run_ms));
    info!("Workers: {:?}", pool.worker_ids());

    pool.close();
    info!("Pool closed");
    Ok(())
}

/// Simulates one cycle of work, then returns so the pool restarts it.
fn work_cycle(ctx: &Context) {
    let id = id_from_context(ctx).unwrap_or("?");
    let cycle = Duration::from_millis(rand::thread_rng().gen_range(1..=MAX_CYCLE_MS));
    if ctx.sleep(cycle) {
        debug!("Worker {} finished a {}ms cycle", id, cycle.as_millis());
    }
}
