//! Run orchestration.
//!
//! The runner owns the whole lifecycle: print the environment, prepare
//! the database directory, spawn the workers, walk the four phase
//! barriers from the main thread, merge the stats, and turn any recorded
//! verification failure into the run's error.

use std::sync::Arc;
use std::thread;

use siege_core::{Result, SiegeError, StressConfig};
use siege_engine::destroy_db;

use crate::db::StressDb;
use crate::driver::Worker;
use crate::shared::SharedState;
use crate::stats::Stats;

/// What a finished run looked like.
#[derive(Debug)]
pub struct RunSummary {
    /// Counters merged across all workers.
    pub stats: Stats,
    /// How many crash-recovery reopens happened.
    pub reopens: u32,
    /// Whether the full shadow verification ran (batch mode only does
    /// its limited in-band checks).
    pub verified: bool,
}

/// A configured stress run.
pub struct StressRunner {
    config: StressConfig,
    db: Arc<StressDb>,
}

impl StressRunner {
    /// Prepare a run against the reference engine: validate the
    /// configuration, print the banner, optionally destroy the database
    /// directory, and open the engine.
    pub fn new(config: StressConfig) -> Result<Self> {
        config.validate()?;
        print_env(&config);
        if config.destroy_db_initially {
            destroy_db(&config.db_path)?;
        }
        let db = Arc::new(StressDb::open(&config)?);
        Ok(Self { config, db })
    }

    /// Prepare a run against a caller-supplied database handle. Used by
    /// tests to inject misbehaving engines; skips banner and directory
    /// preparation.
    pub fn with_db(config: StressConfig, db: Arc<StressDb>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, db })
    }

    /// Execute the run to completion.
    ///
    /// # Errors
    ///
    /// Returns the first recorded verification failure, or an error if a
    /// worker thread could not be spawned or died.
    pub fn run(self) -> Result<RunSummary> {
        let shared = SharedState::new(self.config.clone());

        let mut handles = Vec::with_capacity(self.config.threads as usize);
        for tid in 0..self.config.threads {
            let worker = Worker::new(tid, Arc::clone(&shared), Arc::clone(&self.db));
            let handle = thread::Builder::new()
                .name(format!("siege-worker-{}", tid))
                .spawn(move || worker.run())?;
            handles.push(handle);
        }

        // Each worker walks: initialize -> wait for the pack -> operate
        // -> wait for the pack -> verify -> done.
        shared.main_start_operate();
        shared.main_start_verify();
        shared.main_wait_done();

        let mut merged: Option<Stats> = None;
        for handle in handles {
            let stats = handle
                .join()
                .map_err(|_| SiegeError::engine("worker thread panicked"))?;
            match &mut merged {
                Some(all) => all.merge(&stats),
                None => merged = Some(stats),
            }
        }
        let stats = merged.unwrap_or_else(|| Stats::new(false));
        stats.report("Stress Test");

        let close_result = self.db.close();

        shared.take_failure()?;
        close_result?;

        if !self.config.test_batches_snapshots {
            tracing::info!("verification successful");
        }

        Ok(RunSummary {
            stats,
            reopens: self.db.reopens(),
            verified: !self.config.test_batches_snapshots,
        })
    }
}

/// Banner mirroring the run's effective configuration.
fn print_env(config: &StressConfig) {
    println!("Siege version       : {}", env!("CARGO_PKG_VERSION"));
    println!("Number of threads   : {}", config.threads);
    println!("Ops per thread      : {}", config.ops_per_thread);
    let ttl_state = match config.ttl {
        Some(secs) => secs.to_string(),
        None => "unused".to_string(),
    };
    println!("Time to live(sec)   : {}", ttl_state);
    println!("Read percentage     : {}", config.readpercent);
    println!("Prefix percentage   : {}", config.prefixpercent);
    println!("Write percentage    : {}", config.writepercent);
    println!("Delete percentage   : {}", config.delpercent);
    println!("Max key             : {}", config.max_key);
    println!(
        "Ratio #ops/#keys    : {}",
        (config.ops_per_thread as f64 * f64::from(config.threads)) / config.max_key as f64
    );
    println!("Num times DB reopens: {}", config.reopen);
    println!(
        "Batches/snapshots   : {}",
        config.test_batches_snapshots as u8
    );
    println!("Purge redundant %   : {}", config.purge_redundant_percent);
    println!("Deletes use filter  : {}", config.filter_deletes as u8);
    println!("Num keys per lock   : {}", 1u64 << config.log2_keys_per_lock);
    println!("DB path             : [{}]", config.db_path.display());
    println!("------------------------------------------------");
}
