//! Integration tests for evaluating runs and generating scenarios with a stand-in solver.
#![cfg(unix)]
use anyhow::Result;
use hydrocal::archive::{Scenario, ScenarioKind};
use hydrocal::config::{Config, ObservationSource};
use hydrocal::id::RunID;
use hydrocal::pipeline::{Calibration, Project};
use hydrocal::results::{HistoryData, HistoryReader};
use hydrocal::scoring::SENTINEL_OBJECTIVE;
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

/// A launch script which checks its job configuration and writes an (empty) history file
const FAKE_SOLVER: &str = r#"cfg=config_d_hydro.xml
id=${cfg#config_d_hydro_}
id=${id%.xml}
grep -q "<mdfFile>river_$id.mdf</mdfFile>" "$cfg" || exit 2
test -f "river_$id.mdf" && test -f "river_$id.dis" || exit 3
touch "trih-river_$id.nc"
"#;

/// Number of output times in the demo project's period
const NUM_TIMES: usize = 144;

/// Number of monitoring points in the demo project
const NUM_SLOTS: usize = 8;

/// Returns the same smooth history for the reference store and `sim_times` steps of it for runs
struct FakeReader {
    sim_times: usize,
}

fn history(num_times: usize) -> HistoryData {
    let rows = |offset: f64| -> Vec<Vec<f64>> {
        (0..num_times)
            .map(|t| {
                (0..NUM_SLOTS)
                    .map(|slot| offset + (t as f64 / 10.0 + slot as f64).sin())
                    .collect()
            })
            .collect()
    };

    HistoryData {
        time: (0..num_times).map(|t| t as f64 * 600.0).collect(),
        water_level: rows(12.0),
        concentration: rows(0.02),
    }
}

impl HistoryReader for FakeReader {
    fn read(&self, path: &Path) -> Result<HistoryData> {
        // Reference results are archived under `obs`
        if path.components().any(|c| c.as_os_str() == "obs") {
            return Ok(history(NUM_TIMES));
        }
        anyhow::ensure!(path.exists(), "{} does not exist", path.display());
        Ok(history(self.sim_times))
    }
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let path = entry.unwrap().path();
        let destination = to.join(path.file_name().unwrap());
        if path.is_dir() {
            copy_dir(&path, &destination);
        } else {
            fs::copy(&path, &destination).unwrap();
        }
    }
}

/// A copy of the demo project using the fake solver, with observations from the reference store
fn project(launch_script: &str) -> (TempDir, Config) {
    let dir = tempdir().unwrap();
    copy_dir(Path::new("demos/river"), dir.path());

    let mut config = Config::from_path(dir.path()).unwrap();
    config.observations.source = ObservationSource::ReferenceStore;
    config.observations.folder = Some("reference".into());
    fs::write(config.solver_dir().join("run.bat"), launch_script).unwrap();

    (dir, config)
}

fn calibration(config: Config, sim_times: usize) -> Calibration {
    let project = Project::new(config).unwrap();
    Calibration::new(project, Box::new(FakeReader { sim_times })).unwrap()
}

/// Names of files in `dir` which belong to run 1
fn run_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("_1.") || name.contains("_1_"))
        .collect()
}

#[test]
fn test_solve_perfect_fit() {
    let (_dir, config) = project(FAKE_SOLVER);
    let solver_dir = config.solver_dir();
    let boundary_dir = config.boundary_dir();
    let calibration = calibration(config, NUM_TIMES);

    let objective = calibration.solve(&RunID::new("1")).unwrap();
    assert!((objective + 1.0).abs() < 1e-12);

    // Every file for the run has been cleaned up, templates are left alone
    assert!(run_files(&solver_dir).is_empty());
    assert!(run_files(&boundary_dir).is_empty());
    assert!(solver_dir.join("river.mdf").exists());
}

#[test]
fn test_solve_incomplete_results() {
    let (_dir, config) = project(FAKE_SOLVER);
    let calibration = calibration(config, 100);

    assert_eq!(
        calibration.solve(&RunID::new("1")).unwrap(),
        SENTINEL_OBJECTIVE
    );
}

#[test]
fn test_solve_invalid_marker() {
    let (_dir, config) = project(FAKE_SOLVER);
    let solver_dir = config.solver_dir();
    let calibration = calibration(config, NUM_TIMES);

    assert_eq!(
        calibration.solve(&RunID::new("-1")).unwrap(),
        SENTINEL_OBJECTIVE
    );

    // The solver was never configured
    assert!(
        fs::read_dir(&solver_dir)
            .unwrap()
            .all(|entry| !entry.unwrap().file_name().to_string_lossy().contains("_-1"))
    );
}

#[test]
fn test_solve_solver_failure() {
    let (_dir, config) = project("echo config_d_hydro.xml\nexit 1\n");
    let solver_dir = config.solver_dir();
    let calibration = calibration(config, NUM_TIMES);

    assert!(calibration.solve(&RunID::new("1")).is_err());

    // Files are cleaned up on failure too
    assert!(run_files(&solver_dir).is_empty());
}

#[test]
fn test_generate() {
    let (dir, config) = project(FAKE_SOLVER);
    let project = Project::new(config).unwrap();
    let scenario = Scenario {
        location: "yj5".into(),
        flow: 3.0,
        concentration: 250.0,
        kind: ScenarioKind::Instant,
        release_time: Some(120.0),
    };

    let archived = project
        .generate(&RunID::new("1"), &scenario)
        .unwrap()
        .unwrap();
    assert_eq!(
        archived,
        dir.path().join("obs/yj5_3.0_250.0_120.0/trih-river.nc")
    );
    assert!(archived.exists());
    assert!(run_files(&project.config().solver_dir()).is_empty());
}
