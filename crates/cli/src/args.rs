//! Clap command definition and flag-to-config mapping.
//!
//! Boolean options take an explicit `0`/`1` value (`--disable_wal=1`) so
//! that defaults which are *on*, like `destroy_db_initially`, can be
//! switched off from the same surface. `--config <file>` loads a TOML
//! [`StressConfig`] first; explicit flags then override it field by
//! field.

use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;

use siege_core::{Result, StressConfig};

fn num_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_parser(value_parser!(u64))
        .help(help)
}

fn bool_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_parser(value_parser!(u8).range(0..=1))
        .help(help)
}

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("siege")
        .about("Concurrent stress-and-verification harness for ordered key-value engines")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("TOML config file loaded before flag overrides"),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_parser(value_parser!(PathBuf))
                .help("Database directory (default: ./siege-db)"),
        )
        .arg(num_arg("seed", "Base for all PRNG streams"))
        .arg(num_arg("max_key", "Size of the key universe"))
        .arg(num_arg("threads", "Number of worker threads"))
        .arg(num_arg("ops_per_thread", "Operations per worker"))
        .arg(num_arg("reopen", "Number of mid-run crash-recovery reopens"))
        .arg(num_arg("readpercent", "Share of point reads (percent)"))
        .arg(num_arg("prefixpercent", "Share of prefix scans (percent)"))
        .arg(num_arg("writepercent", "Share of point writes (percent)"))
        .arg(num_arg("delpercent", "Share of point deletes (percent)"))
        .arg(num_arg("log2_keys_per_lock", "Log2 of keys guarded per shard lock"))
        .arg(num_arg("value_size_mult", "Value length multiplier"))
        .arg(num_arg("write_buffer_size", "Engine write buffer budget in bytes"))
        .arg(num_arg(
            "purge_redundant_percent",
            "Share of runs that compact the WAL on reopen (percent)",
        ))
        .arg(num_arg(
            "kill_random_test",
            "Fault-injection hint: crash with probability 1/N (0 disables)",
        ))
        .arg(
            Arg::new("ttl")
                .long("ttl")
                .value_parser(value_parser!(i64))
                .allow_negative_numbers(true)
                .help("Open a TTL database with this lifetime in seconds (-1 disables)"),
        )
        .arg(bool_arg(
            "test_batches_snapshots",
            "Use ten-lane batch/snapshot operations instead of the shadow model",
        ))
        .arg(bool_arg(
            "verify_before_write",
            "Strict shadow check before every write",
        ))
        .arg(bool_arg("verify_checksum", "Verify checksums on every read"))
        .arg(bool_arg("disable_wal", "Do not write the WAL"))
        .arg(bool_arg("sync", "Sync every write"))
        .arg(bool_arg("use_fsync", "Use fsync instead of fdatasync"))
        .arg(bool_arg("disable_data_sync", "Skip data syncs"))
        .arg(bool_arg("filter_deletes", "Drop deletes of provably absent keys"))
        .arg(bool_arg("use_merge", "Replace puts with merges that behave as puts"))
        .arg(bool_arg("histogram", "Collect and print a latency histogram"))
        .arg(bool_arg("verbose", "Print every key/value written"))
        .arg(bool_arg(
            "destroy_db_initially",
            "Destroy the database directory before starting (default 1)",
        ))
}

/// Build the effective configuration: TOML underlay, then flag overrides.
pub fn build_config(matches: &ArgMatches) -> Result<StressConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => StressConfig::load(path)?,
        None => StressConfig::default(),
    };

    if let Some(path) = matches.get_one::<PathBuf>("db") {
        config.db_path = path.clone();
    }

    let num = |name: &str| matches.get_one::<u64>(name).copied();
    if let Some(v) = num("seed") {
        config.seed = v;
    }
    if let Some(v) = num("max_key") {
        config.max_key = v;
    }
    if let Some(v) = num("threads") {
        config.threads = v as u32;
    }
    if let Some(v) = num("ops_per_thread") {
        config.ops_per_thread = v;
    }
    if let Some(v) = num("reopen") {
        config.reopen = v as u32;
    }
    if let Some(v) = num("readpercent") {
        config.readpercent = v as u32;
    }
    if let Some(v) = num("prefixpercent") {
        config.prefixpercent = v as u32;
    }
    if let Some(v) = num("writepercent") {
        config.writepercent = v as u32;
    }
    if let Some(v) = num("delpercent") {
        config.delpercent = v as u32;
    }
    if let Some(v) = num("log2_keys_per_lock") {
        config.log2_keys_per_lock = v as u32;
    }
    if let Some(v) = num("value_size_mult") {
        config.value_size_mult = v as usize;
    }
    if let Some(v) = num("write_buffer_size") {
        config.write_buffer_size = v as usize;
    }
    if let Some(v) = num("purge_redundant_percent") {
        config.purge_redundant_percent = v as u32;
    }
    if let Some(v) = num("kill_random_test") {
        config.kill_random_test = v as u32;
    }

    if let Some(&ttl) = matches.get_one::<i64>("ttl") {
        config.ttl = (ttl >= 0).then_some(ttl as u64);
    }

    let flag = |name: &str| matches.get_one::<u8>(name).map(|v| *v != 0);
    if let Some(v) = flag("test_batches_snapshots") {
        config.test_batches_snapshots = v;
    }
    if let Some(v) = flag("verify_before_write") {
        config.verify_before_write = v;
    }
    if let Some(v) = flag("verify_checksum") {
        config.verify_checksum = v;
    }
    if let Some(v) = flag("disable_wal") {
        config.disable_wal = v;
    }
    if let Some(v) = flag("sync") {
        config.sync = v;
    }
    if let Some(v) = flag("use_fsync") {
        config.use_fsync = v;
    }
    if let Some(v) = flag("disable_data_sync") {
        config.disable_data_sync = v;
    }
    if let Some(v) = flag("filter_deletes") {
        config.filter_deletes = v;
    }
    if let Some(v) = flag("use_merge") {
        config.use_merge_put = v;
    }
    if let Some(v) = flag("histogram") {
        config.histogram = v;
    }
    if let Some(v) = flag("verbose") {
        config.verbose = v;
    }
    if let Some(v) = flag("destroy_db_initially") {
        config.destroy_db_initially = v;
    }

    Ok(config)
}
