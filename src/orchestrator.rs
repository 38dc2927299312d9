//! Sequencing of a disk CPU load test
//!
//! A test run goes through the following stages, in order, and never comes
//! back to an earlier stage:
//!
//! Idle -> SamplingStart -> RunningWorkload -> SamplingEnd -> Evaluating -> Done
//!
//! Any fault along the way aborts the run in the Done(Failed) state. A run
//! which gets through all stages ends up in Done(Passed) or Done(Failed)
//! depending on how the measured CPU load compares to the configured ceiling.
//!
//! Human-readable progress goes to the output handed to run(), while
//! diagnostics go through tracing.

use crate::config::TestConfig;
use crate::error::RunError;
use crate::load::{self, LoadBreakdown};
use crate::stat::{CpuStatSampler, SampleSource};
use crate::workload::{DeviceReader, Workload, WorkloadReport};
use std::io::Write;


/// Final outcome of a test run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The measured CPU load stayed at or below the ceiling
    Passed,

    /// The CPU load was too high, or the run was aborted by a fault
    Failed,
}


/// Where a test run currently stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Nothing was done yet
    Idle,

    /// Taking the CPU statistics sample before the disk reads
    SamplingStart,

    /// Reading the disk
    RunningWorkload,

    /// Taking the CPU statistics sample after the disk reads
    SamplingEnd,

    /// Computing the CPU load and comparing it to the ceiling
    Evaluating,

    /// The run is over
    Done(Outcome),
}


/// Result of a test run which went through all stages
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    /// CPU load measured while the disk was being read, in percent
    pub measured_load: f64,

    /// Highest acceptable CPU load, in percent
    pub ceiling: u32,

    /// Whether the measured load stayed at or below the ceiling
    pub passed: bool,

    /// CPU time totals from which the load was computed
    pub breakdown: LoadBreakdown,

    /// What the disk workload did
    pub workload: WorkloadReport,
}
//
impl Verdict {
    /// Process exit code conveying this verdict
    pub fn exit_code(&self) -> u8 {
        if self.passed { 0 } else { 1 }
    }
}


/// Driver of a test run, from CPU statistics sampling to verdict
pub struct Orchestrator<S, W> {
    /// What should be done
    config: TestConfig,

    /// Source of CPU statistics samples
    sampler: S,

    /// Disk workload whose CPU overhead is measured
    workload: W,

    /// Current stage of the run
    stage: Stage,
}
//
impl<S: SampleSource, W: Workload> Orchestrator<S, W> {
    /// Prepare a test run
    pub fn new(config: TestConfig, sampler: S, workload: W) -> Self {
        Self {
            config,
            sampler,
            workload,
            stage: Stage::Idle,
        }
    }

    /// Current stage of the run
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Carry out the test, writing progress reports to `out`
    ///
    /// A run can only be carried out once. Calling this again after the run
    /// is done just fails.
    ///
    pub fn run<O: Write>(&mut self, out: &mut O) -> Result<Verdict, RunError> {
        if self.stage != Stage::Idle {
            tracing::warn!(stage = ?self.stage, "test run was already carried out");
            return Err(RunError::AlreadyRun);
        }
        let result = self.run_stages(out);
        match result {
            Ok(ref verdict) => {
                let outcome = if verdict.passed { Outcome::Passed }
                              else { Outcome::Failed };
                self.enter(Stage::Done(outcome));
            },
            Err(ref e) => {
                tracing::error!(stage = ?self.stage, error = %e, "test run aborted");
                self.enter(Stage::Done(Outcome::Failed));
            },
        }
        result
    }

    // INTERNAL: Go through every stage of the test, bailing out on faults
    fn run_stages<O: Write>(&mut self, out: &mut O) -> Result<Verdict, RunError> {
        let spec = self.config.workload_spec();
        writeln!(out, "Testing CPU load when reading {} MiB from {}",
                 self.config.xfer_mib, self.config.device.display())?;
        writeln!(out, "Maximum acceptable CPU load is {}", self.config.max_load)?;

        // Bracket the disk reads with CPU statistics samples
        self.enter(Stage::SamplingStart);
        let start = self.sampler.sample()?;

        self.enter(Stage::RunningWorkload);
        writeln!(out, "Beginning disk read....")?;
        out.flush()?;
        let workload = self.workload.run(&spec)?;
        writeln!(out, "Disk read complete!")?;

        self.enter(Stage::SamplingEnd);
        let end = self.sampler.sample()?;

        // Compute the CPU load and compare it to what is acceptable
        self.enter(Stage::Evaluating);
        let breakdown = load::breakdown(&start, &end);
        tracing::debug!(used = ?load::ticks_to_duration(breakdown.used),
                        elapsed = ?load::ticks_to_duration(breakdown.elapsed),
                        "CPU time spent during the disk read");
        if self.config.verbose {
            writeln!(out, "Start CPU time = {}", breakdown.total_start)?;
            writeln!(out, "End CPU time = {}", breakdown.total_end)?;
            writeln!(out, "CPU time used = {}", breakdown.used)?;
            writeln!(out, "Total elapsed time = {}", breakdown.elapsed)?;
        }
        let measured_load = breakdown.load();
        writeln!(out, "Detected disk read CPU load is {}", measured_load.trunc() as i64)?;

        let passed = measured_load <= f64::from(self.config.max_load);
        if !passed {
            writeln!(out, "*** DISK CPU LOAD TEST HAS FAILED! ***")?;
        }
        tracing::info!(load = measured_load, ceiling = self.config.max_load, passed,
                       "disk CPU load test evaluated");

        Ok(
            Verdict {
                measured_load,
                ceiling: self.config.max_load,
                passed,
                breakdown,
                workload,
            }
        )
    }

    // INTERNAL: Move on to the next stage
    fn enter(&mut self, stage: Stage) {
        tracing::debug!(from = ?self.stage, to = ?stage, "test stage transition");
        self.stage = stage;
    }
}


/// Carry out a test run against the real statistics source and device
///
/// The configuration is trusted: checking that the device is a block device
/// is up to the caller.
///
pub fn run_test<O: Write>(config: &TestConfig, out: &mut O) -> Result<Verdict, RunError> {
    let sampler = CpuStatSampler::open(&config.stat_source)?;
    Orchestrator::new(config.clone(), sampler, DeviceReader).run(out)
}


/// Unit tests
#[cfg(test)]
mod tests {
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::io::{self, Write};
    use std::path::PathBuf;
    use super::{run_test, Orchestrator, Outcome, Stage};
    use crate::config::TestConfig;
    use crate::error::{RunError, SampleError, WorkloadError};
    use crate::stat::{CpuSample, SampleSource};
    use crate::workload::{Workload, WorkloadReport, WorkloadSpec};

    /// Sample source which replays a predefined list of samples
    struct ScriptedSamples {
        samples: VecDeque<Result<CpuSample, SampleError>>,
    }
    //
    impl ScriptedSamples {
        fn new(samples: &[&[u64]]) -> Self {
            Self {
                samples: samples.iter()
                                .map(|counters| {
                                    Ok(CpuSample::new(counters.to_vec())
                                                 .expect("Invalid test sample"))
                                })
                                .collect(),
            }
        }

        fn failing() -> Self {
            Self::failing_after(&[])
        }

        fn failing_after(samples: &[&[u64]]) -> Self {
            let mut result = Self::new(samples);
            result.samples.push_back(Err(malformed_stats()));
            result
        }
    }
    //
    impl SampleSource for ScriptedSamples {
        fn sample(&mut self) -> Result<CpuSample, SampleError> {
            self.samples.pop_front().unwrap_or_else(|| Err(malformed_stats()))
        }
    }

    fn malformed_stats() -> SampleError {
        SampleError::MalformedStats {
            path: PathBuf::from("/proc/stat"),
            reason: "no aggregate \"cpu\" line".to_owned(),
        }
    }

    /// Disk workload which does not touch any disk
    #[derive(Default)]
    struct FakeWorkload {
        runs: Vec<WorkloadSpec>,
        fail: bool,
    }
    //
    impl Workload for FakeWorkload {
        fn run(&mut self, spec: &WorkloadSpec) -> Result<WorkloadReport, WorkloadError> {
            self.runs.push(spec.clone());
            if self.fail {
                return Err(WorkloadError::DeviceOpen {
                    path: spec.device_path.clone(),
                    source: io::Error::new(io::ErrorKind::PermissionDenied,
                                           "permission denied"),
                });
            }
            let now = Utc::now();
            Ok(WorkloadReport {
                reads_issued: spec.transfer_units,
                bytes_read: spec.requested_bytes(),
                started_at: now,
                finished_at: now,
            })
        }
    }

    fn config(max_load: u32, verbose: bool) -> TestConfig {
        let mut config = TestConfig::new("sdz");
        config.xfer_mib = 16;
        config.max_load = max_load;
        config.verbose = verbose;
        config
    }

    /// A load below the ceiling passes
    #[test]
    fn load_below_ceiling() {
        let samples = ScriptedSamples::new(&[&[0, 0, 0, 0], &[25, 0, 0, 75]]);
        let mut orchestrator =
            Orchestrator::new(config(30, false), samples, FakeWorkload::default());
        let mut out = Vec::new();
        let verdict = orchestrator.run(&mut out).expect("The test should run");

        assert_eq!(verdict.measured_load, 25.0);
        assert!(verdict.passed);
        assert_eq!(verdict.exit_code(), 0);
        assert_eq!(orchestrator.stage(), Stage::Done(Outcome::Passed));
        assert_eq!(orchestrator.workload.runs,
                   vec![WorkloadSpec::new("/dev/sdz", 16)]);

        let out = String::from_utf8(out).expect("Output should be text");
        assert_eq!(out, "\
Testing CPU load when reading 16 MiB from /dev/sdz
Maximum acceptable CPU load is 30
Beginning disk read....
Disk read complete!
Detected disk read CPU load is 25
");
    }

    /// A load above the ceiling fails, with a banner
    #[test]
    fn load_above_ceiling() {
        let samples = ScriptedSamples::new(&[&[0, 0, 0, 0], &[45, 0, 0, 55]]);
        let mut orchestrator =
            Orchestrator::new(config(30, false), samples, FakeWorkload::default());
        let mut out = Vec::new();
        let verdict = orchestrator.run(&mut out).expect("The test should run");

        assert_eq!(verdict.measured_load, 45.0);
        assert!(!verdict.passed);
        assert_eq!(verdict.exit_code(), 1);
        assert_eq!(orchestrator.stage(), Stage::Done(Outcome::Failed));

        let out = String::from_utf8(out).expect("Output should be text");
        assert!(out.ends_with("Detected disk read CPU load is 45\n\
                               *** DISK CPU LOAD TEST HAS FAILED! ***\n"));
    }

    /// A load exactly at the ceiling is still acceptable
    #[test]
    fn load_at_ceiling() {
        let samples = ScriptedSamples::new(&[&[0, 0, 0, 0], &[30, 0, 0, 70]]);
        let mut orchestrator =
            Orchestrator::new(config(30, false), samples, FakeWorkload::default());
        let verdict = orchestrator.run(&mut io::sink()).expect("The test should run");
        assert!(verdict.passed);
    }

    /// Fractional loads are truncated in the report, but not in the comparison
    #[test]
    fn fractional_load() {
        let samples = ScriptedSamples::new(&[&[0, 0, 0, 0], &[61, 0, 0, 139]]);
        let mut orchestrator =
            Orchestrator::new(config(30, false), samples, FakeWorkload::default());
        let mut out = Vec::new();
        let verdict = orchestrator.run(&mut out).expect("The test should run");
        assert_eq!(verdict.measured_load, 30.5);
        assert!(!verdict.passed);
        let out = String::from_utf8(out).expect("Output should be text");
        assert!(out.contains("Detected disk read CPU load is 30\n"));
    }

    /// Verbose mode reports CPU time totals before the load
    #[test]
    fn verbose_totals() {
        let samples = ScriptedSamples::new(&[&[100, 0, 50, 500],
                                             &[150, 0, 80, 620]]);
        let mut orchestrator =
            Orchestrator::new(config(30, true), samples, FakeWorkload::default());
        let mut out = Vec::new();
        let verdict = orchestrator.run(&mut out).expect("The test should run");
        assert_eq!(verdict.measured_load, 40.0);
        assert!(!verdict.passed);

        let out = String::from_utf8(out).expect("Output should be text");
        assert!(out.contains("\
Disk read complete!
Start CPU time = 650
End CPU time = 850
CPU time used = 80
Total elapsed time = 200
Detected disk read CPU load is 40
"));
    }

    /// No elapsed CPU time means no load
    #[test]
    fn no_elapsed_time() {
        let samples = ScriptedSamples::new(&[&[1, 2, 3, 4], &[1, 2, 3, 4]]);
        let mut orchestrator =
            Orchestrator::new(config(0, false), samples, FakeWorkload::default());
        let verdict = orchestrator.run(&mut io::sink()).expect("The test should run");
        assert_eq!(verdict.measured_load, 0.0);
        assert!(verdict.passed);
    }

    /// Failing to sample aborts the run before any disk read
    #[test]
    fn sampling_fault() {
        let mut orchestrator = Orchestrator::new(config(30, false),
                                                 ScriptedSamples::failing(),
                                                 FakeWorkload::default());
        let mut out = Vec::new();
        let result = orchestrator.run(&mut out);
        assert!(matches!(result,
                         Err(RunError::Sample(SampleError::MalformedStats { .. }))));
        assert!(orchestrator.workload.runs.is_empty());
        assert_eq!(orchestrator.stage(), Stage::Done(Outcome::Failed));
        let out = String::from_utf8(out).expect("Output should be text");
        assert!(!out.contains("Beginning disk read"));
    }

    /// Failing to read the disk aborts the run before the second sample
    #[test]
    fn workload_fault() {
        let samples = ScriptedSamples::new(&[&[0, 0, 0, 0]]);
        let workload = FakeWorkload { fail: true, ..FakeWorkload::default() };
        let mut orchestrator = Orchestrator::new(config(30, false), samples, workload);
        let result = orchestrator.run(&mut io::sink());
        assert!(matches!(result,
                         Err(RunError::Workload(WorkloadError::DeviceOpen { .. }))));
        assert_eq!(orchestrator.stage(), Stage::Done(Outcome::Failed));
    }

    /// Failing to sample after the disk read aborts the run before evaluation
    #[test]
    fn sampling_end_fault() {
        let samples = ScriptedSamples::failing_after(&[&[0, 0, 0, 0]]);
        let mut orchestrator =
            Orchestrator::new(config(30, false), samples, FakeWorkload::default());
        let mut out = Vec::new();
        let result = orchestrator.run(&mut out);
        assert!(matches!(result,
                         Err(RunError::Sample(SampleError::MalformedStats { .. }))));
        assert_eq!(orchestrator.workload.runs.len(), 1);
        assert_eq!(orchestrator.stage(), Stage::Done(Outcome::Failed));
        let out = String::from_utf8(out).expect("Output should be text");
        assert!(out.contains("Disk read complete!\n"));
        assert!(!out.contains("Detected disk read CPU load"));
    }

    /// A run cannot be carried out twice
    #[test]
    fn single_shot() {
        let samples = ScriptedSamples::new(&[&[0, 0, 0, 0], &[1, 0, 0, 1]]);
        let mut orchestrator =
            Orchestrator::new(config(30, false), samples, FakeWorkload::default());
        orchestrator.run(&mut io::sink()).expect("The first run should work");
        assert!(matches!(orchestrator.run(&mut io::sink()),
                         Err(RunError::AlreadyRun)));
        assert_eq!(orchestrator.workload.runs.len(), 1);
    }

    /// Full run against a synthetic statistics file and a regular file
    #[test]
    fn run_against_files() {
        let mut stat = tempfile::NamedTempFile::new()
                                 .expect("Failed to create a temporary file");
        stat.write_all(b"cpu 10 20 30 40 50\ncpu0 10 20 30 40 50\n")
            .expect("Failed to write statistics");
        let mut disk = tempfile::NamedTempFile::new()
                                 .expect("Failed to create a temporary file");
        disk.write_all(&[0u8; 4096]).expect("Failed to write disk contents");

        let mut config = config(30, true);
        config.device = disk.path().to_owned();
        config.stat_source = stat.path().to_owned();
        config.xfer_mib = 3;

        let mut out = Vec::new();
        let verdict = run_test(&config, &mut out).expect("The test should run");
        assert_eq!(verdict.measured_load, 0.0);
        assert!(verdict.passed);
        assert_eq!(verdict.workload.reads_issued, 3);
        assert_eq!(verdict.workload.bytes_read, 4096);
    }

    /// A missing statistics source aborts the run
    #[test]
    fn missing_stat_source() {
        let mut config = config(30, false);
        config.stat_source = PathBuf::from("/nonexistent/stat");
        let result = run_test(&config, &mut io::sink());
        assert!(matches!(result,
                         Err(RunError::Sample(SampleError::SourceUnavailable { .. }))));
    }
}
