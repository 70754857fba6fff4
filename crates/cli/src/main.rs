//! The `siege` binary.
//!
//! Exit codes: 0 on a verified run, 1 on invalid options, open failure,
//! or verification abort.

mod args;

use std::process;

use tracing_subscriber::EnvFilter;

use siege_harness::StressRunner;

fn main() {
    init_tracing();
    process::exit(run());
}

fn run() -> i32 {
    let matches = args::build_cli().get_matches();

    let config = match args::build_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return 1;
    }

    let runner = match StressRunner::new(config) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("open error: {}", e);
            return 1;
        }
    };

    match runner.run() {
        Ok(summary) => {
            tracing::info!(
                ops = summary.stats.done(),
                reopens = summary.reopens,
                verified = summary.verified,
                "run complete"
            );
            0
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
