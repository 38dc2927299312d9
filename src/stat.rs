//! This module contains a sampling parser for the aggregate "cpu" line of
//! /proc/stat
//!
//! The first line of /proc/stat sums up, across all hardware threads, how many
//! clock ticks the system spent in each CPU state since boot. Per-thread lines
//! ("cpu0", "cpu1"...) follow, and are of no interest here.

use crate::error::SampleError;
use crate::reader::PseudoFileReader;
use itertools::Itertools;
use std::fmt;
use std::path::Path;


/// Where CPU statistics are read from by default
pub const DEFAULT_STAT_SOURCE: &str = "/proc/stat";

/// Header of the line holding CPU statistics aggregated across all threads
const AGGREGATE_HEADER: &str = "cpu";

/// Position of the idle time counter in a CPU statistics line
pub const IDLE_INDEX: usize = 3;

/// Counters which every kernel reports: user, nice, system and idle time
const MANDATORY_COUNTERS: usize = IDLE_INDEX + 1;


/// Cumulative CPU time counters, in clock ticks since boot
///
/// Counters are kept in kernel order. Newer kernels append more counters
/// (iowait, irq, softirq, steal, guest, guest_nice) after the first four,
/// which are always present.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuSample {
    counters: Vec<u64>,
}
//
impl CpuSample {
    /// Build a sample from raw counters, which must at least go up to idle
    pub fn new(counters: Vec<u64>) -> Result<Self, String> {
        if counters.len() < MANDATORY_COUNTERS {
            return Err(format!("expected at least {} CPU counters, found {}",
                               MANDATORY_COUNTERS,
                               counters.len()));
        }
        Ok(Self { counters })
    }

    /// Raw counters, in kernel order
    pub fn counters(&self) -> &[u64] {
        &self.counters
    }

    /// Sum of all counters
    pub fn total(&self) -> u128 {
        self.counters.iter().map(|&ticks| u128::from(ticks)).sum()
    }

    /// Cumulative idle time
    pub fn idle(&self) -> u64 {
        self.counters[IDLE_INDEX]
    }
}
//
impl fmt::Display for CpuSample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", AGGREGATE_HEADER, self.counters.iter().join(" "))
    }
}


/// Anything which can produce CPU statistics samples on demand
pub trait SampleSource {
    /// Acquire a fresh sample
    fn sample(&mut self) -> Result<CpuSample, SampleError>;
}


/// Mechanism for sampling aggregate CPU statistics from a /proc/stat-like file
pub struct CpuStatSampler {
    /// Reader object for the statistics file
    reader: PseudoFileReader,
}
//
impl CpuStatSampler {
    /// Open a statistics source, typically DEFAULT_STAT_SOURCE
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SampleError> {
        let reader = PseudoFileReader::open(path)?;
        Ok(Self { reader })
    }

    /// Path of the statistics source
    pub fn path(&self) -> &Path {
        self.reader.path()
    }
}
//
impl SampleSource for CpuStatSampler {
    fn sample(&mut self) -> Result<CpuSample, SampleError> {
        let sample = self.reader.sample(parse_stat)?;
        tracing::trace!(source = %self.path().display(), %sample,
                        "sampled CPU statistics");
        Ok(sample)
    }
}


/// Take a single sample from a statistics source
pub fn sample<P: AsRef<Path>>(path: P) -> Result<CpuSample, SampleError> {
    CpuStatSampler::open(path)?.sample()
}


/// Extract the aggregate CPU counters from the text of a /proc/stat-like file
fn parse_stat(path: &Path, file_contents: &str) -> Result<CpuSample, SampleError> {
    let malformed = |reason: String| SampleError::MalformedStats {
        path: path.to_owned(),
        reason,
    };

    // Look for the line whose header is exactly "cpu", not "cpuN"
    let mut columns = file_contents
        .lines()
        .map(str::split_whitespace)
        .find_map(|mut columns| match columns.next() {
            Some(AGGREGATE_HEADER) => Some(columns),
            _ => None,
        })
        .ok_or_else(|| malformed("no aggregate \"cpu\" line".to_owned()))?;

    // Everything after the header must be a tick counter
    let counters = columns
        .try_fold(Vec::new(), |mut counters, column| {
            let ticks = column.parse::<u64>().map_err(|e| {
                format!("bad CPU counter {:?}: {}", column, e)
            })?;
            counters.push(ticks);
            Ok::<_, String>(counters)
        })
        .map_err(malformed)?;

    CpuSample::new(counters).map_err(malformed)
}
