//! The per-run pipeline: configure, execute, read, clean up and score.
//!
//! A [`Calibration`] is built once per process and can then evaluate any number of candidate
//! runs. Runs with different IDs touch disjoint files, so they may be evaluated concurrently.
use crate::archive::{Scenario, archive_results};
use crate::config::Config;
use crate::configurator::control::ControlFile;
use crate::configurator::{
    RunFiles, check_templates, configure, initial_state, prepare_control_file,
};
use crate::executor::execute;
use crate::id::{RunID, is_run_output};
use crate::observation::load_observations;
use crate::results::{HistoryReader, history_file_path, read_results};
use crate::scoring::{SENTINEL_OBJECTIVE, score};
use crate::time_series::{ObservationBundle, TimeGrid};
use anyhow::Result;
use itertools::Itertools;
use log::{debug, info, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Delete a file, returning whether it was deleted.
///
/// A file which does not exist is skipped. Other failures are logged and otherwise ignored.
fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            warn!("Could not delete {}: {err}", path.display());
            false
        }
    }
}

/// Output the solver wrote for a run, found by name in the solver directory.
///
/// Template files are never included, whatever the run ID.
fn solver_outputs(config: &Config, run_id: &RunID) -> Vec<PathBuf> {
    let solver_dir = config.solver_dir();
    let entries = match fs::read_dir(&solver_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Could not list {} for clean-up: {err}", solver_dir.display());
            return Vec::new();
        }
    };

    let templates = config.template_names();
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| {
                        !templates.contains(&name)
                            && is_run_output(name, &config.solver.mdf_name, run_id)
                    })
        })
        .collect()
}

/// Delete every file belonging to a run.
///
/// These are the input files written for the run, its boundary inputs, its history file and any
/// other output the solver named after it. This is best effort: files which cannot be deleted
/// (e.g. because the solver still holds them open) are logged and left behind.
pub fn cleanup(config: &Config, run_id: &RunID) {
    let (inflow, pollution) = config.boundary_files(run_id);
    let removed = RunFiles::new(config, run_id)
        .paths()
        .into_iter()
        .map(Path::to_path_buf)
        .chain([history_file_path(config, run_id), inflow, pollution])
        .chain(solver_outputs(config, run_id))
        .unique()
        .filter(|path| remove_file(path))
        .count();
    debug!("Removed {removed} files for run {run_id}");
}

/// Cleans up a run's files when dropped, whether or not the run succeeded
struct RunGuard<'a> {
    config: &'a Config,
    run_id: &'a RunID,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        cleanup(self.config, self.run_id);
    }
}

/// A project ready to run the solver: configuration plus the shared part of the control file
pub struct Project {
    config: Config,
    control: ControlFile,
}

impl Project {
    /// Check the solver templates, derive the initial conditions and prepare the control file
    /// shared by every run
    pub fn new(config: Config) -> Result<Self> {
        check_templates(&config)?;
        let initial = initial_state(&config)?;
        let control = prepare_control_file(&config, &initial)?;

        Ok(Self { config, control })
    }

    /// The project configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write the input files for a run and run the solver to completion
    fn run_solver(&self, run_id: &RunID) -> Result<()> {
        configure(&self.config, &self.control, run_id)?;
        execute(&self.config, run_id)
    }

    /// Run the solver for a scenario and archive its results.
    ///
    /// # Returns
    ///
    /// The path of the archived results, or `None` if the scenario was already archived.
    pub fn generate(&self, run_id: &RunID, scenario: &Scenario) -> Result<Option<PathBuf>> {
        scenario.validate()?;

        let _guard = RunGuard {
            config: &self.config,
            run_id,
        };
        self.run_solver(run_id)?;
        archive_results(&self.config, run_id, scenario)
    }
}

/// Evaluates candidate runs against the observations
pub struct Calibration {
    project: Project,
    grid: TimeGrid,
    observations: ObservationBundle,
    reader: Box<dyn HistoryReader>,
}

impl Calibration {
    /// Prepare the project and load the observations
    ///
    /// # Arguments
    ///
    /// * `project` - The project to calibrate
    /// * `reader` - Reader for the solver's history files
    pub fn new(project: Project, reader: Box<dyn HistoryReader>) -> Result<Self> {
        let config = project.config();
        let grid = config.grid()?;
        let observations = load_observations(config, reader.as_ref())?;
        if observations.is_empty() {
            warn!("No observations loaded: every run will receive the failure value");
        }

        Ok(Self {
            project,
            grid,
            observations,
            reader,
        })
    }

    /// Evaluate a candidate run.
    ///
    /// The run's input files are written, the solver is run and its results are compared with
    /// the observations. The run's files are deleted afterwards, including when an error occurs.
    ///
    /// # Returns
    ///
    /// The objective value, [`SENTINEL_OBJECTIVE`] if the run is invalid or could not be scored,
    /// or an error if the solver could not be configured, started or its results read.
    pub fn solve(&self, run_id: &RunID) -> Result<f64> {
        if run_id.is_invalid_marker() {
            info!("Run {run_id} marks an invalid candidate; not running the solver");
            return Ok(SENTINEL_OBJECTIVE);
        }

        let config = self.project.config();
        let simulation = {
            let _guard = RunGuard { config, run_id };
            self.project.run_solver(run_id)?;
            read_results(config, self.reader.as_ref(), run_id)?
        };

        let objective = score(&self.observations, &simulation, &config.points, &self.grid);
        info!("Objective for run {run_id}: {objective}");

        Ok(objective)
    }
}
