//! Configuration of a disk CPU load test run
//!
//! A run is fully described by an immutable TestConfig, built once from the
//! command line and handed to the orchestrator.

use crate::error::ConfigError;
use crate::stat::DEFAULT_STAT_SOURCE;
use crate::workload::WorkloadSpec;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;


/// Highest acceptable CPU load, in percent
pub const DEFAULT_MAX_LOAD: u32 = 30;

/// Amount of data to be read, in MiB (4 GiB)
pub const DEFAULT_XFER_MIB: u64 = 4096;

/// Whole-disk device to be read
pub const DEFAULT_DEVICE: &str = "/dev/sda";

/// Directory where device nodes live
const DEVICE_ROOT: &str = "/dev";


/// Everything needed to carry out a test run
#[derive(Clone, Debug, PartialEq)]
pub struct TestConfig {
    /// Device node to be read, always under /dev
    pub device: PathBuf,

    /// Amount of data to be read, in MiB
    pub xfer_mib: u64,

    /// Highest acceptable CPU load, in percent
    pub max_load: u32,

    /// Report intermediate CPU time totals
    pub verbose: bool,

    /// File from which CPU statistics are sampled
    pub stat_source: PathBuf,

    /// Optional limit on the duration of the disk reads
    pub time_limit: Option<Duration>,
}
//
impl TestConfig {
    /// Configuration for reading a device with every other setting at its
    /// default value. The device name is normalized, but not validated.
    pub fn new(device: &str) -> Self {
        Self {
            device: normalize_device_path(device),
            xfer_mib: DEFAULT_XFER_MIB,
            max_load: DEFAULT_MAX_LOAD,
            verbose: false,
            stat_source: PathBuf::from(DEFAULT_STAT_SOURCE),
            time_limit: None,
        }
    }

    /// Disk workload described by this configuration
    pub fn workload_spec(&self) -> WorkloadSpec {
        let spec = WorkloadSpec::new(self.device.clone(), self.xfer_mib);
        match self.time_limit {
            Some(limit) => spec.with_time_limit(limit),
            None => spec,
        }
    }
}
//
impl Default for TestConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}


/// Make sure that a device name is a path under /dev
///
/// "sda" and "/dev/sda" both designate /dev/sda. Anything which does not start
/// with "/dev/" is considered to be relative to /dev, including absolute
/// paths elsewhere ("/tmp/x" becomes "/dev//tmp/x", which the kernel resolves
/// as "/dev/tmp/x").
///
pub fn normalize_device_path(device: &str) -> PathBuf {
    lazy_static! {
        static ref UNDER_DEVICE_ROOT: Regex = Regex::new(r"^/dev/")
                                                    .expect("Invalid device root regex");
    }
    if UNDER_DEVICE_ROOT.is_match(device) {
        PathBuf::from(device)
    } else {
        PathBuf::from(format!("{}/{}", DEVICE_ROOT, device))
    }
}


/// Check that a path designates a block device
///
/// Symlinks are followed, so /dev/disk/by-id/... paths are fine. Paths which
/// cannot be inspected at all are reported as not being block devices.
///
pub fn ensure_block_device(path: &Path) -> Result<(), ConfigError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.file_type().is_block_device() => Ok(()),
        Ok(_) => Err(ConfigError::NotABlockDevice { path: path.to_owned() }),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e,
                            "cannot inspect device");
            Err(ConfigError::NotABlockDevice { path: path.to_owned() })
        }
    }
}
