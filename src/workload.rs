//! The sequential disk read workload whose CPU overhead is being measured
//!
//! The workload reads a device node from its beginning, one fixed-size unit at
//! a time, without ever seeking. Its only purpose is to generate I/O load, so
//! the data is thrown away and short reads (e.g. past the end of a device which
//! is smaller than the requested transfer) are not an error.

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use crate::error::WorkloadError;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::{Duration, Instant};


/// Size of a single read, 1 MiB
pub const UNIT_SIZE_BYTES: usize = 1 << 20;


/// What the disk workload should do
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// Device node to be read, e.g. /dev/sda
    pub device_path: PathBuf,

    /// Number of UNIT_SIZE_BYTES reads to be issued
    pub transfer_units: u64,

    /// Give up if the reads are not over after this long. There is no way to
    /// interrupt a read which is already blocked in the kernel, so the limit
    /// is only checked between reads.
    pub time_limit: Option<Duration>,
}
//
impl WorkloadSpec {
    /// Read `transfer_units` MiB from a device, without any time limit
    pub fn new<P: Into<PathBuf>>(device_path: P, transfer_units: u64) -> Self {
        Self {
            device_path: device_path.into(),
            transfer_units,
            time_limit: None,
        }
    }

    /// Set a time limit on the workload
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Amount of data that the workload will try to read
    pub fn requested_bytes(&self) -> u64 {
        self.transfer_units.saturating_mul(UNIT_SIZE_BYTES as u64)
    }
}


/// What the disk workload actually did
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadReport {
    /// Number of read calls issued
    pub reads_issued: u64,

    /// Number of bytes which these reads returned
    pub bytes_read: u64,

    /// When the first read was issued
    pub started_at: DateTime<Utc>,

    /// When the last read returned
    pub finished_at: DateTime<Utc>,
}
//
impl WorkloadReport {
    /// Wall-clock duration of the workload
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at).to_std().unwrap_or_default()
    }
}


/// Anything which can run a disk workload
pub trait Workload {
    /// Run the workload to completion
    fn run(&mut self, spec: &WorkloadSpec) -> Result<WorkloadReport, WorkloadError>;
}


/// Disk workload which reads from a real device node
#[derive(Debug, Default)]
pub struct DeviceReader;
//
impl Workload for DeviceReader {
    fn run(&mut self, spec: &WorkloadSpec) -> Result<WorkloadReport, WorkloadError> {
        run(spec)
    }
}


/// Open the device from a workload spec and read it
///
/// The device handle only lives for the duration of this call, and is closed
/// on every exit path.
///
pub fn run(spec: &WorkloadSpec) -> Result<WorkloadReport, WorkloadError> {
    let device = File::open(&spec.device_path).map_err(|source| {
        WorkloadError::DeviceOpen { path: spec.device_path.clone(), source }
    })?;
    tracing::debug!(device = %spec.device_path.display(),
                    requested = %ByteSize::b(spec.requested_bytes()),
                    "opened device for reading");
    drive(device, spec)
}


/// Issue the reads of a workload spec against some byte source
///
/// Exactly `spec.transfer_units` read calls are issued, not counting reads
/// which were interrupted by a signal and retried.
///
pub fn drive<R: Read>(mut device: R, spec: &WorkloadSpec) -> Result<WorkloadReport, WorkloadError> {
    let mut buffer = vec![0u8; UNIT_SIZE_BYTES];
    let mut bytes_read = 0u64;
    let mut exhausted = false;
    let start = Instant::now();
    let started_at = Utc::now();

    for read_index in 0..spec.transfer_units {
        if let Some(limit) = spec.time_limit {
            if start.elapsed() >= limit {
                return Err(WorkloadError::TimedOut {
                    path: spec.device_path.clone(),
                    reads_issued: read_index,
                    limit,
                });
            }
        }

        let amount = read_unit(&mut device, &mut buffer).map_err(|source| {
            WorkloadError::DeviceRead {
                path: spec.device_path.clone(),
                read_index,
                source,
            }
        })?;
        if amount < buffer.len() && !exhausted {
            exhausted = true;
            tracing::debug!(device = %spec.device_path.display(),
                            read_index,
                            offset = bytes_read,
                            "short read, device is smaller than the transfer");
        }
        bytes_read += amount as u64;
    }

    let report = WorkloadReport {
        reads_issued: spec.transfer_units,
        bytes_read,
        started_at,
        finished_at: Utc::now(),
    };
    tracing::info!(device = %spec.device_path.display(),
                   reads = report.reads_issued,
                   read = %ByteSize::b(report.bytes_read),
                   elapsed = ?report.elapsed(),
                   "disk read workload complete");
    Ok(report)
}

// INTERNAL: Issue a single read, retrying it if a signal interrupted it
fn read_unit<R: Read>(source: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        match source.read(buffer) {
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
