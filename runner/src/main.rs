use clap::{Parser, Subcommand};
use duel_runner::{
    bench::{publish, publish_sizes, run_scale},
    config::BenchConfig,
    sizes::compare_file_sizes,
};
use rand::{rngs::StdRng, SeedableRng};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_unwrap::ResultExt;

/// Compare a network key-value store against SQLite
#[derive(Parser, Debug)]
#[command(name = "duel", version, about)]
struct Args {
    /// Benchmark configuration
    #[arg(short, long, default_value = "duel.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the benchmark for every configured scale
    Run {
        /// Override the configured scales, may be repeated
        #[arg(short, long)]
        scale: Vec<usize>,
    },
    /// Compare on-disk sizes of artifacts left by earlier runs
    Sizes,
    /// Validate the configuration and exit
    Check,
}

fn run(config: &BenchConfig) -> ExitCode {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut failed = 0;

    for &scale in &config.scales {
        let published = run_scale(config, scale, &mut rng)
            .map_err(|error| error.to_string())
            .and_then(|results| publish(&results, &config.output).map_err(|error| error.to_string()));

        // one broken scale does not stop the remaining ones
        if let Err(error) = published {
            error!(scale = scale, "Benchmark run failed: {error}");
            failed += 1;
        }
    }

    if failed > 0 {
        error!(failed = failed, "Some benchmark runs failed");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn sizes(config: &BenchConfig) -> ExitCode {
    let table = match compare_file_sizes(config) {
        Ok(table) => table,
        Err(error) => {
            error!(error = ?error, "File size comparison failed: {error}");
            return ExitCode::FAILURE;
        }
    };

    match publish_sizes(&table, &config.output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = ?error, "Failed to render file sizes: {error}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = BenchConfig::load(&args.config).unwrap_or_log();

    if let Command::Run { scale } = &args.command {
        config.override_scales(scale);
    }

    if config.preflight_checks() {
        error!(path = %args.config.display(), "Configuration failed preflight checks");
        return ExitCode::FAILURE;
    }

    match args.command {
        Command::Run { .. } => run(&config),
        Command::Sizes => sizes(&config),
        Command::Check => {
            info!(path = %args.config.display(), "Configuration is valid");
            ExitCode::SUCCESS
        }
    }
}
