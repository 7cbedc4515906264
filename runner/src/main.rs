mod checkpoint;
mod config;
mod database;
mod distributed;
mod executors;
mod farm;
mod keys;
mod keyspace;

use clap::{Parser, Subcommand};
use config::Environment;
use executors::Engines;
use farm::RunError;
use itertools::Itertools;
use std::{
    path::{Path, PathBuf},
    process::exit,
    time::Instant,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Distributed docking task farm that resumes from its result shards")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working directory, falls back to $WORKDIR and then the current directory
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Directory the input lists are resolved against, falls back to $INPUTDIR
    #[arg(long, global = true)]
    input_dir: Option<PathBuf>,

    /// Directory for result shards and scratch space, falls back to $DATAPATH
    #[arg(long, global = true)]
    data_path: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dock every receptor/ligand pair that has no result yet
    Dock {
        #[arg(short, long)]
        config: PathBuf,

        /// Size of the process group including the master, at least 2
        #[arg(short = 'n', long)]
        processes: Option<usize>,
    },
    /// Print the keys a run would still dispatch
    Keys {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print every key stored in the result shards
    Scan {
        /// Only list keys with a successful result
        #[arg(long)]
        success_only: bool,

        /// Also print status, pose count and best score
        #[arg(long)]
        details: bool,
    },
}

fn dock(config: &Path, processes: Option<usize>, environment: &Environment) -> Result<(), RunError> {
    let start = Instant::now();
    let (config, inputs) = farm::prepare(config, environment)?;
    let engine = Engines::load(&config.engine, environment)?;
    let work = farm::plan(&inputs);

    let processes = processes.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
            + 1
    });

    info!(processes = processes, keys = work.len(), "Docking begin");

    let report = farm::run_farm(
        work,
        &config.docking,
        environment,
        &engine,
        processes,
        config.retry_failed,
    )?;

    info!(
        completed_before = report.dispatch.completed_before,
        dispatched = report.dispatch.dispatched.len(),
        committed = report.workers.iter().map(|worker| worker.committed).sum::<usize>(),
        stopped = report.dispatch.stops,
        "Docking end, wall time {:.3} sec.",
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

fn remaining_keys(config: &Path, environment: &Environment) -> Result<(), RunError> {
    let (config, inputs) = farm::prepare(config, environment)?;
    let mut work = farm::plan(&inputs);
    let total = work.len();
    let finished = farm::remove_finished(&mut work, environment, config.retry_failed)?;

    for key in work.iter().sorted() {
        println!("{key}");
    }

    info!(
        total = total,
        finished = finished,
        remaining = work.len(),
        "Computed remaining work"
    );

    Ok(())
}

fn scan(environment: &Environment, success_only: bool, details: bool) -> Result<(), RunError> {
    let shards = checkpoint::discover_shards(&environment.shard_dir())?;

    for record in checkpoint::scan_records(&shards, success_only) {
        if !details {
            println!("{}", record.key);
            continue;
        }

        let best = record
            .scores
            .first()
            .map(|score| score.to_string())
            .unwrap_or_else(|| "-".to_owned());

        println!(
            "{}\t{}\t{}\t{best}",
            record.key,
            if record.success { "ok" } else { "failed" },
            record.num_pose
        );
    }

    info!(shards = shards.len(), "Scanned result shards");

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let environment = Environment::resolve(cli.work_dir, cli.input_dir, cli.data_path);

    let result = match cli.command {
        Commands::Dock { config, processes } => dock(&config, processes, &environment),
        Commands::Keys { config } => remaining_keys(&config, &environment),
        Commands::Scan {
            success_only,
            details,
        } => scan(&environment, success_only, details),
    };

    if let Err(error) = result {
        error!("{error}");
        exit(1);
    }
}
