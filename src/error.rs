//! Error types for the disk CPU load test
//!
//! Faults are grouped by the stage of the test that raises them: sampling the
//! CPU statistics, driving the disk workload, or validating the run
//! configuration. A test which ran to completion but measured too much CPU
//! load is not a fault, and is reported through a Verdict instead.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;


/// Failure to acquire a CPU statistics sample
#[derive(Debug, Error)]
pub enum SampleError {
    /// The statistics source could not be opened or read
    #[error("cannot read CPU statistics from {}: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The statistics source does not follow the /proc/stat format
    #[error("cannot read CPU utilization from {}: {reason}", path.display())]
    MalformedStats {
        path: PathBuf,
        reason: String,
    },
}


/// Failure of the disk read workload
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// The device node could not be opened for reading
    #[error("cannot open {} for reading: {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A read from the device failed outright (short reads do not count)
    #[error("read #{read_index} from {} failed: {source}", path.display())]
    DeviceRead {
        path: PathBuf,
        read_index: u64,
        #[source]
        source: io::Error,
    },

    /// The workload was still running when its time limit expired
    #[error("disk read of {} exceeded its {limit:?} time limit after {reads_issued} reads",
            path.display())]
    TimedOut {
        path: PathBuf,
        reads_issued: u64,
        limit: Duration,
    },
}


/// Invalid run configuration, detected before the test starts
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The target exists (or not) but is not a block device
    #[error("Unknown block device \"{}\"", path.display())]
    NotABlockDevice { path: PathBuf },
}


/// Any fault which aborts a test run
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The orchestrator was asked to carry out the same run twice
    #[error("test run was already carried out")]
    AlreadyRun,

    /// The report could not be written out
    #[error("cannot write test report: {0}")]
    Report(#[from] io::Error),
}
