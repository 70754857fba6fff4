//! Per-thread operation counters and latency histogram.
//!
//! Every worker owns a `Stats`; nobody else touches it while the run is
//! live. The main thread merges all of them after the workers join and
//! prints one report, so no counter is ever contended.

use std::fmt;
use std::io::Write as IoWrite;
use std::time::Instant;

/// Microsecond latency histogram with power-of-two buckets.
///
/// Bucket `i` covers `[2^i, 2^(i+1))` microseconds; bucket 0 also takes
/// zero. Percentiles interpolate linearly inside the winning bucket.
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: [u64; Histogram::NUM_BUCKETS],
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl Histogram {
    const NUM_BUCKETS: usize = 40;

    /// An empty histogram.
    pub fn new() -> Self {
        Self {
            buckets: [0; Self::NUM_BUCKETS],
            count: 0,
            sum: 0,
            min: u64::MAX,
            max: 0,
        }
    }

    fn bucket_for(micros: u64) -> usize {
        if micros < 2 {
            return micros as usize & 1;
        }
        ((63 - micros.leading_zeros()) as usize).min(Self::NUM_BUCKETS - 1)
    }

    /// Record one sample.
    pub fn add(&mut self, micros: u64) {
        self.buckets[Self::bucket_for(micros)] += 1;
        self.count += 1;
        self.sum += micros;
        self.min = self.min.min(micros);
        self.max = self.max.max(micros);
    }

    /// Fold another histogram into this one.
    pub fn merge(&mut self, other: &Histogram) {
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *mine += theirs;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Number of samples recorded.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean sample, zero when empty.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    /// The `p`-th percentile (0 < p <= 100), interpolated.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let threshold = self.count as f64 * (p / 100.0);
        let mut seen = 0u64;
        for (i, &n) in self.buckets.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let next = seen + n;
            if next as f64 >= threshold {
                let left = (1u64 << i) as f64;
                let right = (1u64 << (i + 1)) as f64;
                let into = (threshold - seen as f64) / n as f64;
                let value = left + (right - left) * into;
                return value.clamp(self.min as f64, self.max as f64);
            }
            seen = next;
        }
        self.max as f64
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Count: {} Average: {:.1} Min: {} Max: {}",
            self.count,
            self.average(),
            if self.count == 0 { 0 } else { self.min },
            self.max
        )?;
        write!(
            f,
            "Median: {:.1} P75: {:.1} P99: {:.1}",
            self.percentile(50.0),
            self.percentile(75.0),
            self.percentile(99.0)
        )
    }
}

/// One worker's counters for a run.
#[derive(Debug, Clone)]
pub struct Stats {
    start: Instant,
    finish: Instant,
    seconds: f64,
    done: u64,
    gets: u64,
    founds: u64,
    prefixes: u64,
    iterator_size_sums: u64,
    writes: u64,
    deletes: u64,
    errors: u64,
    cross_lane_errors: u64,
    bytes: u64,
    next_report: u64,
    last_op_finish: Instant,
    hist: Option<Histogram>,
}

impl Stats {
    /// Fresh counters; pass `histogram` to collect latencies too.
    pub fn new(histogram: bool) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            finish: now,
            seconds: 0.0,
            done: 0,
            gets: 0,
            founds: 0,
            prefixes: 0,
            iterator_size_sums: 0,
            writes: 0,
            deletes: 0,
            errors: 0,
            cross_lane_errors: 0,
            bytes: 0,
            next_report: 100,
            last_op_finish: now,
            hist: histogram.then(Histogram::new),
        }
    }

    /// Reset all counters and restart the clock.
    pub fn start(&mut self) {
        let hist_enabled = self.hist.is_some();
        *self = Stats::new(hist_enabled);
    }

    /// Stop the clock.
    pub fn stop(&mut self) {
        self.finish = Instant::now();
        self.seconds = (self.finish - self.start).as_secs_f64();
    }

    /// Count one finished operation.
    ///
    /// Feeds the latency histogram when enabled and prints a progress
    /// line on an exponentially widening schedule.
    pub fn finished_single_op(&mut self) {
        if let Some(hist) = &mut self.hist {
            let now = Instant::now();
            let micros = (now - self.last_op_finish).as_micros() as u64;
            hist.add(micros);
            if micros > 20_000 {
                tracing::warn!(micros, "long op");
            }
            self.last_op_finish = now;
        }

        self.done += 1;
        if self.done >= self.next_report {
            self.next_report += match self.next_report {
                n if n < 1_000 => 100,
                n if n < 5_000 => 500,
                n if n < 10_000 => 1_000,
                n if n < 50_000 => 5_000,
                n if n < 100_000 => 10_000,
                n if n < 500_000 => 50_000,
                _ => 100_000,
            };
            print!("... finished {} ops{:30}\r", self.done, "");
            std::io::stdout().flush().ok();
        }
    }

    /// Count writes and the bytes they carried.
    pub fn add_bytes_for_writes(&mut self, nwrites: u64, nbytes: u64) {
        self.writes += nwrites;
        self.bytes += nbytes;
    }

    /// Count point reads and how many found a value.
    pub fn add_gets(&mut self, ngets: u64, nfounds: u64) {
        self.gets += ngets;
        self.founds += nfounds;
    }

    /// Count prefix scans and the entries they returned.
    pub fn add_prefixes(&mut self, nprefixes: u64, size_sum: u64) {
        self.prefixes += nprefixes;
        self.iterator_size_sums += size_sum;
    }

    /// Count deletes.
    pub fn add_deletes(&mut self, n: u64) {
        self.deletes += n;
    }

    /// Count contained operation errors.
    pub fn add_errors(&mut self, n: u64) {
        self.errors += n;
    }

    /// Count batch-mode cross-lane inconsistencies.
    pub fn add_cross_lane_errors(&mut self, n: u64) {
        self.cross_lane_errors += n;
    }

    /// Fold another worker's counters into this one.
    pub fn merge(&mut self, other: &Stats) {
        match (&mut self.hist, &other.hist) {
            (Some(mine), Some(theirs)) => mine.merge(theirs),
            (None, Some(theirs)) => self.hist = Some(theirs.clone()),
            _ => {}
        }
        self.done += other.done;
        self.gets += other.gets;
        self.founds += other.founds;
        self.prefixes += other.prefixes;
        self.iterator_size_sums += other.iterator_size_sums;
        self.writes += other.writes;
        self.deletes += other.deletes;
        self.errors += other.errors;
        self.cross_lane_errors += other.cross_lane_errors;
        self.bytes += other.bytes;
        self.seconds += other.seconds;
        self.start = self.start.min(other.start);
        self.finish = self.finish.max(other.finish);
    }

    /// Operations counted so far.
    pub fn done(&self) -> u64 {
        self.done
    }

    /// Point reads issued.
    pub fn gets(&self) -> u64 {
        self.gets
    }

    /// Point reads that found a value.
    pub fn founds(&self) -> u64 {
        self.founds
    }

    /// Prefix scans issued.
    pub fn prefixes(&self) -> u64 {
        self.prefixes
    }

    /// Writes issued.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Deletes issued.
    pub fn deletes(&self) -> u64 {
        self.deletes
    }

    /// Contained operation errors.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Batch-mode cross-lane inconsistencies observed.
    pub fn cross_lane_errors(&self) -> u64 {
        self.cross_lane_errors
    }

    /// Bytes written.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Print the merged report.
    pub fn report(&self, name: &str) {
        if self.done < 1 {
            eprintln!("No writes or ops?");
            return;
        }

        let elapsed = (self.finish - self.start).as_secs_f64().max(f64::EPSILON);
        let bytes_mb = self.bytes as f64 / 1_048_576.0;

        println!(
            "{:<12}: {:.3} micros/op {} ops/sec",
            name,
            self.seconds * 1e6 / self.done as f64,
            (self.done as f64 / elapsed) as u64
        );
        println!(
            "{:<12}: Wrote {:.2} MB ({:.2} MB/sec) ({}% of {} ops)",
            "",
            bytes_mb,
            bytes_mb / elapsed,
            100 * self.writes / self.done,
            self.done
        );
        println!("{:<12}: Wrote {} times", "", self.writes);
        println!("{:<12}: Deleted {} times", "", self.deletes);
        println!(
            "{:<12}: {} read and {} found the key",
            "", self.gets, self.founds
        );
        println!("{:<12}: Prefix scanned {} times", "", self.prefixes);
        println!(
            "{:<12}: Iterator size sum is {}",
            "", self.iterator_size_sums
        );
        if self.cross_lane_errors > 0 {
            println!(
                "{:<12}: Cross-lane inconsistencies {}",
                "", self.cross_lane_errors
            );
        }
        println!("{:<12}: Got errors {} times", "", self.errors);

        if let Some(hist) = &self.hist {
            println!("Microseconds per op:\n{}", hist);
        }
    }
}
