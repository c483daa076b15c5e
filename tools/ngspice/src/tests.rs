use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use approx::assert_relative_eq;
use tempfile::TempDir;
use test_log::test;

use crate::error::Error;
use crate::*;

const STUB_XSCHEM: &str = r#"#!/bin/bash
out=""
tb=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -*) shift ;;
    *) tb="$1"; shift ;;
  esac
done
name=$(basename "$tb")
cp "$tb" "$out/${name%.*}.spice"
"#;

const STUB_NGSPICE: &str = r#"#!/bin/bash
if grep -q SLEEP "$2"; then
  sleep 5
fi
echo "Circuit: stub"
cat "$2"
"#;

const NO_NETLIST: &str = "#!/bin/bash\nexit 1\n";

fn write_executable(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, contents).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    sim: Simulator,
}

impl Fixture {
    fn new(xschem: &str, timeout: Duration) -> Self {
        Self::in_subdir(xschem, timeout, "work")
    }

    /// Places the tools, testbenches, and build directory under `subdir`.
    fn in_subdir(xschem: &str, timeout: Duration, subdir: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(subdir);
        let bin = root.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        write_executable(&bin.join("xschem"), xschem);
        write_executable(&bin.join("ngspice"), STUB_NGSPICE);
        let sim = Simulator::new(SimulatorOpts {
            build_dir: root.join("build"),
            xschem: bin.join("xschem"),
            ngspice: bin.join("ngspice"),
            timeout,
            workers: 2,
        });
        Self {
            _dir: dir,
            root,
            sim,
        }
    }

    fn testbench(&self, name: &str, output: &str) -> PathBuf {
        let path = self.root.join(format!("{name}.sch"));
        std::fs::write(&path, output).unwrap();
        path
    }

    /// Number of entries left in `build/sim` and `build/spice`.
    fn leftovers(&self) -> usize {
        ["sim", "spice"]
            .iter()
            .map(|sub| self.root.join("build").join(sub))
            .filter(|dir| dir.exists())
            .map(|dir| std::fs::read_dir(dir).unwrap().count())
            .sum()
    }
}

#[test]
fn extracts_uppercase_metrics() {
    let stdout = "Note: ignored\nGAIN_DB: 45.5\nbw: 3\nUGF_HZ : 1.25e+06 Hz\nPM: -.5\nNOT A METRIC\n";
    let metrics = extract_metrics(stdout);
    let names = metrics.keys().map(|k| k.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["GAIN_DB", "UGF_HZ", "PM"]);
    assert_relative_eq!(metrics["GAIN_DB"], 45.5);
    assert_relative_eq!(metrics["UGF_HZ"], 1.25e6);
    assert_relative_eq!(metrics["PM"], -0.5);
}

#[test]
fn repeated_metric_keeps_last_value() {
    let metrics = extract_metrics("A: 1\nB: 2\nA: 3\n");
    assert_eq!(metrics.get_index(0).map(|(k, v)| (k.as_str(), *v)), Some(("A", 3.)));
    assert_eq!(metrics.len(), 2);
}

#[test]
fn keyword_filter_is_not_an_error() {
    let metrics = parse_metrics("GAIN: 10\nBW: 20\n", &["BW"]).unwrap();
    assert_eq!(metrics.len(), 1);
    assert!(metrics.contains_key("BW"));

    let metrics = parse_metrics("GAIN: 10\n", &["NOISE"]).unwrap();
    assert!(metrics.is_empty());

    let all = parse_metrics::<&str>("GAIN: 10\n", &[]).unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn no_metrics_keeps_output() {
    let err = parse_metrics("simulation done\n", &["GAIN"]).unwrap_err();
    match err {
        Error::NoMetrics { stdout } => assert_eq!(stdout, "simulation done\n"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn runs_testbench_end_to_end() {
    let fx = Fixture::new(STUB_XSCHEM, Duration::from_secs(10));
    let tb = fx.testbench("amp_tb", "GAIN_DB: 42\nBW_HZ: 1e6\n");

    let out = fx.sim.run(&tb, &["GAIN_DB"]).unwrap();
    assert_eq!(out.metrics.len(), 1);
    assert_relative_eq!(out.metrics["GAIN_DB"], 42.);
    assert!(out.stdout.contains("Circuit: stub"));
    assert!(out.stdout.contains("BW_HZ: 1e6"));

    let netlist = fx.sim.netlist_path(&tb).unwrap();
    assert!(netlist.ends_with("build/spice/amp_tb.spice"));
    assert!(!netlist.exists());
}

#[cfg(unix)]
#[test]
fn empty_output_is_no_metrics() {
    let fx = Fixture::new(STUB_XSCHEM, Duration::from_secs(10));
    let tb = fx.testbench("quiet_tb", "nothing to see\n");
    let err = fx.sim.run::<&str>(&tb, &[]).unwrap_err();
    let stdout = err.stdout().unwrap();
    assert!(stdout.contains("nothing to see"));
}

#[cfg(unix)]
#[test]
fn missing_netlist_is_reported() {
    let fx = Fixture::new(NO_NETLIST, Duration::from_secs(10));
    let tb = fx.testbench("broken_tb", "GAIN: 1\n");
    let err = fx.sim.run::<&str>(&tb, &[]).unwrap_err();
    assert!(matches!(err, Error::Netlist { .. }), "{err:?}");
}

#[cfg(unix)]
#[test]
fn slow_simulation_times_out() {
    let fx = Fixture::new(STUB_XSCHEM, Duration::from_millis(500));
    let tb = fx.testbench("slow_tb", "SLEEP\nGAIN: 1\n");
    let err = fx.sim.run::<&str>(&tb, &[]).unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    assert_eq!(fx.leftovers(), 0);
}

#[cfg(unix)]
#[test]
fn batch_results_are_tagged_by_testbench() {
    let fx = Fixture::new(STUB_XSCHEM, Duration::from_secs(10));
    let tbs = (0..5)
        .map(|i| fx.testbench(&format!("tb_{i}"), &format!("INDEX: {i}\n")))
        .collect::<Vec<_>>();

    let results = fx.sim.run_batch::<&str>(&tbs, &[]);
    assert_eq!(results.len(), 5);

    let seen = results.iter().map(|(tb, _)| tb.clone()).collect::<HashSet<_>>();
    assert_eq!(seen, tbs.iter().cloned().collect::<HashSet<_>>());
    for (tb, result) in results {
        let i = tbs.iter().position(|p| *p == tb).unwrap();
        let out = result.unwrap();
        assert_relative_eq!(out.metrics["INDEX"], i as f64);
    }
    assert_eq!(fx.leftovers(), 0);
}

#[cfg(unix)]
#[test]
fn sequential_runs_leave_no_scratch_files() {
    let fx = Fixture::new(STUB_XSCHEM, Duration::from_secs(10));
    for i in 0..5 {
        let tb = fx.testbench(&format!("run_{i}_tb"), &format!("INDEX: {i}\n"));
        fx.sim.run::<&str>(&tb, &[]).unwrap();
        assert_eq!(fx.leftovers(), 0);
    }
    let quiet = fx.testbench("quiet_tb", "nothing\n");
    assert!(fx.sim.run::<&str>(&quiet, &[]).is_err());
    assert_eq!(fx.leftovers(), 0);
}

#[cfg(unix)]
#[test]
fn failed_netlisting_leaves_no_scratch_files() {
    let fx = Fixture::new(NO_NETLIST, Duration::from_secs(10));
    let tb = fx.testbench("broken_tb", "GAIN: 1\n");
    assert!(fx.sim.run::<&str>(&tb, &[]).is_err());
    assert_eq!(fx.leftovers(), 0);
}

#[cfg(unix)]
#[test]
fn paths_with_shell_metacharacters() {
    let fx = Fixture::in_subdir(
        STUB_XSCHEM,
        Duration::from_secs(10),
        r#"build $HOME "q" `date` it's \x"#,
    );
    let tb = fx.testbench("odd_tb", "GAIN_DB: 7\n");
    let out = fx.sim.run::<&str>(&tb, &[]).unwrap();
    assert_relative_eq!(out.metrics["GAIN_DB"], 7.);
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn shell_quote_keeps_words_literal() {
    use crate::templates::shell_quote;

    assert_eq!(shell_quote(Path::new("/tmp/a b")), "'/tmp/a b'");
    assert_eq!(shell_quote(Path::new("/tmp/$x`y`\"")), "'/tmp/$x`y`\"'");
    assert_eq!(shell_quote(Path::new("/tmp/it's")), r"'/tmp/it'\''s'");
}

#[test]
fn empty_batch_does_nothing() {
    let sim = Simulator::default();
    assert!(sim.run_batch::<&str>(&[], &[]).is_empty());
}
