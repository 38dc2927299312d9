//! Command-line front-end of the disk CPU load test
//!
//! Exits with status 0 if the device could be read while keeping the CPU load
//! at or below the acceptable maximum, and 1 otherwise (including when the
//! device is not a block device or the test could not be carried out).

use clap::Parser;
use disk_cpu_load::config::{self, DEFAULT_DEVICE, DEFAULT_MAX_LOAD, DEFAULT_XFER_MIB};
use disk_cpu_load::stat::DEFAULT_STAT_SOURCE;
use disk_cpu_load::{run_test, RunError, TestConfig};
use itertools::Itertools;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;


/// Performs a disk stress test by reading data from a disk, with a maximum
/// acceptable CPU load
#[derive(Debug, Parser)]
#[command(name = "disk_cpu_load", version)]
struct Args {
    /// The maximum acceptable CPU load, as a percentage
    #[arg(long, default_value_t = DEFAULT_MAX_LOAD)]
    max_load: u32,

    /// The amount of data to read from the disk, in mebibytes
    #[arg(long, default_value_t = DEFAULT_XFER_MIB)]
    xfer: u64,

    /// If present, produce more verbose output
    #[arg(long)]
    verbose: bool,

    /// File from which CPU statistics are read
    #[arg(long, default_value = DEFAULT_STAT_SOURCE)]
    stat_file: PathBuf,

    /// Abort if the disk read takes longer than this many seconds
    #[arg(long, value_name = "SECONDS")]
    time_limit: Option<u64>,

    /// The whole-disk device filename (with or without "/dev/"), e.g. "sda"
    /// or "/dev/sda"
    #[arg(value_name = "DEVICE-FILENAME")]
    device: Vec<String>,
}


fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    let code = match run(args) {
        Ok(code) => code,
        Err(RunError::Config(e)) => {
            println!("{}", e);
            1
        },
        Err(e) => {
            eprintln!("ERROR: {}", e);
            1
        },
    };
    ExitCode::from(code)
}


// Turn the command line into a test configuration, and carry out the test
fn run(args: Args) -> Result<u8, RunError> {
    let device = match args.device.as_slice() {
        [] => DEFAULT_DEVICE,
        [device] => device.as_str(),
        [_, extra @ ..] => {
            println!("ERROR: Unknown positional arguments: {}", quoted_list(extra));
            return Ok(1);
        },
    };

    let config = TestConfig {
        xfer_mib: args.xfer,
        max_load: args.max_load,
        verbose: args.verbose,
        stat_source: args.stat_file,
        time_limit: args.time_limit.map(Duration::from_secs),
        ..TestConfig::new(device)
    };
    tracing::debug!(?config, "parsed command line");
    config::ensure_block_device(&config.device)?;

    let stdout = io::stdout();
    let verdict = run_test(&config, &mut stdout.lock())?;
    Ok(verdict.exit_code())
}


// Display a list of arguments as ['a', 'b']
fn quoted_list(args: &[String]) -> String {
    format!("[{}]", args.iter().map(|arg| format!("'{}'", arg)).join(", "))
}


// Send diagnostics to stderr, keeping stdout for the test report. RUST_LOG
// overrides the default verbosity.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
                           .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
