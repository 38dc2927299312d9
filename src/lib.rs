//! Measurement of the CPU load imposed by sequential block device reads
//!
//! The test samples the aggregate CPU time counters of /proc/stat, reads a
//! configurable amount of data from a block device, samples the counters again,
//! and computes which share of the CPU time elapsed in between was not spent
//! idle. That share is then compared to an acceptable ceiling.
//!
//! The measurement is system-wide: anything else which runs on the machine at
//! the same time is counted as disk read overhead. For meaningful results, run
//! the test on an otherwise quiet system.
//!
//! Note that the device node is read directly, no filesystem is ever mounted.

pub mod config;
pub mod error;
pub mod load;
pub mod orchestrator;
mod reader;
pub mod stat;
pub mod workload;

pub use config::TestConfig;
pub use error::{ConfigError, RunError, SampleError, WorkloadError};
pub use orchestrator::{run_test, Orchestrator, Outcome, Stage, Verdict};
pub use stat::{CpuSample, CpuStatSampler, SampleSource};
pub use workload::{DeviceReader, Workload, WorkloadReport, WorkloadSpec};
