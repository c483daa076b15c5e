//! Runs xschem testbenches through ngspice and extracts the metrics they print.
//!
//! Every external tool is invoked with absolute paths and its own working
//! directory, so simulations can safely run concurrently.
#![warn(missing_docs)]

use std::fs;
#[cfg(any(unix, target_os = "redox"))]
use std::os::unix::prelude::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use crate::error::{Error, Result};
use crate::templates::{
    write_netlist_script, write_simulate_script, NetlistScriptContext, SimulateScriptContext,
};

pub mod error;
pub mod metrics;
pub(crate) mod templates;

#[cfg(test)]
mod tests;

pub use metrics::{extract_metrics, parse_metrics};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Simulation runner configuration.
#[derive(Debug, Clone)]
pub struct SimulatorOpts {
    /// Directory receiving netlists (`spice/`) and per-run scratch files (`sim/`).
    pub build_dir: PathBuf,
    /// The xschem executable.
    pub xschem: PathBuf,
    /// The ngspice executable.
    pub ngspice: PathBuf,
    /// Wall-clock limit for each external tool invocation.
    pub timeout: Duration,
    /// Maximum number of concurrent simulations in a batch.
    pub workers: usize,
}

impl Default for SimulatorOpts {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            xschem: PathBuf::from("xschem"),
            ngspice: PathBuf::from("ngspice"),
            timeout: Duration::from_secs(30),
            workers: 4,
        }
    }
}

/// Metrics extracted from one simulation, along with the raw simulator output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimOutput {
    /// Extracted metrics, in order of first appearance.
    pub metrics: IndexMap<ArcStr, f64>,
    /// Combined standard output and standard error of the simulator.
    pub stdout: ArcStr,
}

/// Netlists and simulates xschem testbenches.
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    opts: SimulatorOpts,
}

impl Simulator {
    /// Creates a simulator with the given options.
    pub fn new(opts: SimulatorOpts) -> Self {
        Self { opts }
    }

    /// The simulator's options.
    #[inline]
    pub fn opts(&self) -> &SimulatorOpts {
        &self.opts
    }

    /// The netlist path for a testbench: `{build_dir}/spice/{stem}.spice`.
    pub fn netlist_path(&self, testbench: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(std::path::absolute(&self.opts.build_dir)?
            .join("spice")
            .join(format!("{}.spice", stem(testbench.as_ref()))))
    }

    fn work_dir(&self, testbench: &Path) -> Result<PathBuf> {
        let dir = std::path::absolute(&self.opts.build_dir)?
            .join("sim")
            .join(stem(testbench));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Netlists a testbench schematic, returning the path of the generated netlist.
    pub fn netlist(&self, testbench: impl AsRef<Path>) -> Result<PathBuf> {
        let testbench = std::path::absolute(testbench.as_ref())?;
        let work_dir = self.work_dir(&testbench)?;
        let netlist = self.netlist_path(&testbench)?;
        let netlist_dir = netlist
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| work_dir.clone());
        fs::create_dir_all(&netlist_dir)?;
        if netlist.exists() {
            fs::remove_file(&netlist)?;
        }

        let run_script = work_dir.join("netlist.sh");
        write_netlist_script(
            NetlistScriptContext::new(
                &self.opts.xschem,
                &testbench,
                &netlist_dir,
                &work_dir.join("xschem.log"),
            ),
            &run_script,
        )?;

        tracing::debug!(?testbench, "netlisting testbench");
        let status = execute_run_script(&run_script, &work_dir, self.opts.timeout)?;
        if !netlist.exists() {
            return Err(Error::Netlist {
                testbench,
                status: Some(status),
            });
        }
        if !status.success() {
            tracing::warn!(?testbench, ?status, "netlister exited with an error");
        }
        Ok(netlist)
    }

    /// Runs ngspice in batch mode on a netlist, returning its combined output.
    ///
    /// A non-zero exit status is logged but not treated as an error,
    /// since measurements printed before a failure are still useful.
    pub fn simulate(&self, netlist: impl AsRef<Path>) -> Result<ArcStr> {
        let netlist = std::path::absolute(netlist.as_ref())?;
        let work_dir = self.work_dir(&netlist)?;
        let log_path = work_dir.join("ngspice.log");
        let run_script = work_dir.join("simulate.sh");
        write_simulate_script(
            SimulateScriptContext::new(&self.opts.ngspice, &netlist, &log_path),
            &run_script,
        )?;

        tracing::debug!(?netlist, "running ngspice");
        let status = execute_run_script(&run_script, &work_dir, self.opts.timeout)?;
        if !status.success() {
            tracing::warn!(?netlist, ?status, "ngspice exited with an error");
        }
        let output = fs::read(&log_path)?;
        Ok(ArcStr::from(&*String::from_utf8_lossy(&output)))
    }

    /// Netlists and simulates a testbench, then extracts metrics from the output.
    ///
    /// If `keywords` is non-empty, only the named metrics are kept. The
    /// netlist and scratch directory of the run are removed afterwards,
    /// whether or not it succeeded.
    pub fn run<S: AsRef<str>>(
        &self,
        testbench: impl AsRef<Path>,
        keywords: &[S],
    ) -> Result<SimOutput> {
        let testbench = testbench.as_ref();
        let result = self.netlist(testbench).and_then(|netlist| {
            let stdout = self.simulate(&netlist)?;
            let metrics = parse_metrics(&stdout, keywords)?;
            Ok(SimOutput { metrics, stdout })
        });
        self.clean(testbench);
        result
    }

    /// Removes the netlist and scratch directory left by a run of `testbench`.
    fn clean(&self, testbench: &Path) {
        let build_dir = match std::path::absolute(&self.opts.build_dir) {
            Ok(dir) => dir,
            Err(err) => {
                tracing::warn!(%err, "failed to resolve build directory");
                return;
            }
        };
        let stem = stem(testbench);
        let work_dir = build_dir.join("sim").join(stem);
        if let Err(err) = fs::remove_dir_all(&work_dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(?work_dir, %err, "failed to remove scratch directory");
            }
        }
        let netlist = build_dir.join("spice").join(format!("{stem}.spice"));
        if let Err(err) = fs::remove_file(&netlist) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(?netlist, %err, "failed to remove netlist");
            }
        }
    }

    /// Runs many testbenches concurrently on a bounded pool of worker threads.
    ///
    /// Results arrive in completion order, each tagged with its testbench.
    pub fn run_batch<S: AsRef<str> + Sync>(
        &self,
        testbenches: &[PathBuf],
        keywords: &[S],
    ) -> Vec<(PathBuf, Result<SimOutput>)> {
        if testbenches.is_empty() {
            return Vec::new();
        }
        let workers = self.opts.workers.clamp(1, testbenches.len());
        tracing::debug!(jobs = testbenches.len(), workers, "starting simulation batch");

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<PathBuf>();
        let (res_tx, res_rx) = crossbeam_channel::unbounded();
        for tb in testbenches {
            if job_tx.send(tb.clone()).is_err() {
                break;
            }
        }
        drop(job_tx);

        std::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let res_tx = res_tx.clone();
                s.spawn(move || {
                    for tb in job_rx.iter() {
                        let result = self.run(&tb, keywords);
                        if let Err(err) = &result {
                            tracing::warn!(testbench = ?tb, %err, "simulation failed");
                        }
                        if res_tx.send((tb, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(res_tx);
            res_rx.iter().collect()
        })
    }
}

fn stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("testbench")
}

/// Runs a bash script in `work_dir`, killing it once `timeout` has elapsed.
fn execute_run_script(path: &Path, work_dir: &Path, timeout: Duration) -> Result<ExitStatus> {
    let mut perms = fs::metadata(path)?.permissions();
    #[cfg(any(unix, target_os = "redox"))]
    perms.set_mode(0o744);
    fs::set_permissions(path, perms)?;

    let mut child = Command::new("/bin/bash")
        .arg(path)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .spawn()?;

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            tracing::warn!(script = ?path, ?timeout, "killing timed out process");
            if let Err(err) = child.kill() {
                tracing::warn!(%err, "failed to kill process");
            }
            child.wait()?;
            return Err(Error::Timeout(timeout));
        }
        std::thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
    }
}
