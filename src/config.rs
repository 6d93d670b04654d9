//! Defines the `Config` struct, which represents the contents of `hydrocal.toml`.
//!
//! The configuration is read once at start-up and is immutable afterwards. It is passed
//! explicitly to every component which needs it.
use crate::id::{PointID, RunID};
use crate::input::{deserialise_datetime, input_err_msg, read_toml};
use crate::time_series::TimeGrid;
use anyhow::{Context, Result, ensure};
use chrono::{Duration, NaiveDateTime};
use itertools::Itertools;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::{Path, PathBuf};

/// The name of the configuration file in the project directory
pub const CONFIG_FILE_NAME: &str = "hydrocal.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_output_interval, u32, 10);
define_param_default!(default_ccofu, f64, 2.929_358_0e-2);
define_param_default!(default_ccofv, f64, 3.331_361_0e-2);
define_param_default!(default_vicouv, f64, 2.429_591_0e1);
define_param_default!(default_dicouv, f64, 2.005_919_0e1);

/// Convert a list of string literals to point IDs
fn point_ids(ids: &[&str]) -> Vec<PointID> {
    ids.iter().map(|id| PointID::new(id)).collect()
}

/// The monitoring points, in the order of the solver's output slots
fn default_points() -> Vec<PointID> {
    point_ids(&["1", "10", "5", "9", "8", "6", "12", "11"])
}

/// Represents the contents of the entire configuration file.
#[derive(Debug, Deserialize, PartialEq)]
pub struct Config {
    /// The reference time of the solver. Solver times are offsets from this.
    #[serde(deserialize_with = "deserialise_datetime")]
    pub reference_time: NaiveDateTime,
    /// Start of the simulation period
    #[serde(deserialize_with = "deserialise_datetime")]
    pub start: NaiveDateTime,
    /// End of the simulation period
    #[serde(deserialize_with = "deserialise_datetime")]
    pub end: NaiveDateTime,
    /// Interval between solver outputs and resampled observations, in minutes
    #[serde(default = "default_output_interval")]
    pub output_interval: u32,
    /// Monitoring points, in the order in which they appear in the solver's output
    #[serde(default = "default_points")]
    pub points: Vec<PointID>,
    /// Settings for the external solver
    #[serde(default)]
    pub solver: SolverConfig,
    /// Settings for the per-run boundary condition inputs
    #[serde(default)]
    pub boundary: BoundaryConfig,
    /// Where the initial conditions are taken from
    #[serde(default)]
    pub initial_conditions: InitialConditionsConfig,
    /// Fixed roughness and viscosity parameters
    #[serde(default)]
    pub roughness: RoughnessConfig,
    /// Where observed data are taken from and where scenarios are archived
    #[serde(default)]
    pub observations: ObservationsConfig,
    /// The directory containing the configuration file. Other paths are relative to this.
    #[serde(skip)]
    pub project_dir: PathBuf,
}

/// Settings for launching the solver and locating its files
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// The solver's working directory, containing the template input files
    pub dir: PathBuf,
    /// Base name for generated control files
    pub mdf_name: String,
    /// Base name for generated discharge files
    pub dis_name: String,
    /// Template control file
    pub mdf_template: String,
    /// Template discharge file
    pub dis_template: String,
    /// Template job configuration file
    pub hydro_config_template: String,
    /// Template launch script
    pub launch_script_template: String,
    /// Program (and arguments) used to run a launch script
    pub launcher: Vec<String>,
    /// Prefix of the solver's history output file
    pub history_prefix: String,
    /// Extension of the solver's history output file
    pub history_extension: String,
    /// Name of the water level variable in the history file
    pub water_level_variable: String,
    /// Name of the concentration variable in the history file
    pub concentration_variable: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let launcher = if cfg!(windows) {
            vec!["cmd".to_string(), "/C".to_string()]
        } else {
            vec!["sh".to_string()]
        };

        Self {
            dir: "dflow".into(),
            mdf_name: "river".into(),
            dis_name: "river".into(),
            mdf_template: "river.mdf".into(),
            dis_template: "river.dis".into(),
            hydro_config_template: "config_d_hydro.xml".into(),
            launch_script_template: "run.bat".into(),
            launcher,
            history_prefix: "trih".into(),
            history_extension: "nc".into(),
            water_level_variable: "ZWL".into(),
            concentration_variable: "GRO".into(),
        }
    }
}

/// Maps a named inflow branch to a discharge slot in the solver's boundary file
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct BranchSlot {
    /// Column name in the boundary CSV files
    pub name: String,
    /// Index of the discharge table in the boundary file
    pub slot: usize,
}

/// Settings for the per-run inflow and pollution inputs
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Directory containing the per-run CSV files
    pub dir: PathBuf,
    /// File name pattern for inflows; `{run}` is replaced with the run ID
    pub inflow_file: String,
    /// File name pattern for pollutant concentrations; `{run}` is replaced with the run ID
    pub pollution_file: String,
    /// Name of the timestamp column
    pub time_column: String,
    /// Branches to copy into the discharge file
    pub branches: Vec<BranchSlot>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        let branches = ["yj3", "yj4", "yj5", "yj6"]
            .into_iter()
            .enumerate()
            .map(|(slot, name)| BranchSlot {
                name: name.into(),
                slot,
            })
            .collect();

        Self {
            dir: "icm_to_delft3d".into(),
            inflow_file: "Link_{run}_ds_flow.csv".into(),
            pollution_file: "Link_{run}_ds_cond.csv".into(),
            time_column: "Time".into(),
            branches,
        }
    }
}

/// Reference points for the initial conditions.
///
/// Each quantity is the mean over a list of reference points. Every reference point is itself a
/// list of candidates: the first with valid data is used.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct InitialConditionsConfig {
    /// Reference points for the initial water level
    pub water_level: Vec<Vec<PointID>>,
    /// Reference points for the initial concentration
    pub concentration: Vec<Vec<PointID>>,
}

impl Default for InitialConditionsConfig {
    fn default() -> Self {
        Self {
            water_level: vec![point_ids(&["1"]), point_ids(&["12"])],
            concentration: vec![point_ids(&["10", "9"]), point_ids(&["12"])],
        }
    }
}

/// Roughness and viscosity parameters written to the control file
#[derive(Debug, Deserialize, PartialEq)]
pub struct RoughnessConfig {
    /// Roughness coefficient in the u direction
    #[serde(default = "default_ccofu")]
    pub ccofu: f64,
    /// Roughness coefficient in the v direction
    #[serde(default = "default_ccofv")]
    pub ccofv: f64,
    /// Horizontal eddy viscosity
    #[serde(default = "default_vicouv")]
    pub vicouv: f64,
    /// Horizontal eddy diffusivity
    #[serde(default = "default_dicouv")]
    pub dicouv: f64,
}

impl Default for RoughnessConfig {
    fn default() -> Self {
        Self {
            ccofu: default_ccofu(),
            ccofv: default_ccofv(),
            vicouv: default_vicouv(),
            dicouv: default_dicouv(),
        }
    }
}

/// Where the observation bundle is built from
#[derive(DeserializeLabeledStringEnum, Debug, PartialEq, Default, Clone, Copy)]
pub enum ObservationSource {
    /// A history file from an earlier solver run, archived under the archive directory
    #[default]
    #[string = "reference_store"]
    ReferenceStore,
    /// Raw monitoring records, resampled onto the output interval
    #[string = "monitoring"]
    Monitoring,
}

/// Settings for observed data and the scenario archive
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservationsConfig {
    /// Where the observation bundle is built from
    pub source: ObservationSource,
    /// Archive subfolder holding the reference history file (reference store only)
    pub folder: Option<String>,
    /// CSV file of raw monitoring records
    pub monitoring_file: PathBuf,
    /// Directory in which scenario results are archived
    pub archive_dir: PathBuf,
    /// Name given to archived history files
    pub archive_file_name: String,
}

impl Default for ObservationsConfig {
    fn default() -> Self {
        Self {
            source: ObservationSource::default(),
            folder: None,
            monitoring_file: "monitoring.csv".into(),
            archive_dir: "obs".into(),
            archive_file_name: "trih-river.nc".into(),
        }
    }
}

/// Check that the simulation period is valid
fn check_times(
    reference_time: NaiveDateTime,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<()> {
    ensure!(start < end, "start ({start}) must be before end ({end})");
    ensure!(
        reference_time <= start,
        "reference_time ({reference_time}) must not be after start ({start})"
    );

    Ok(())
}

/// Check that the monitoring points are valid
fn check_points(points: &[PointID]) -> Result<()> {
    ensure!(!points.is_empty(), "points cannot be empty");
    ensure!(points.iter().all_unique(), "points must be unique");

    Ok(())
}

/// Check that every reference point has at least one candidate
fn check_reference_points(name: &str, reference_points: &[Vec<PointID>]) -> Result<()> {
    ensure!(
        !reference_points.is_empty(),
        "No reference points given for initial {name}"
    );
    ensure!(
        reference_points.iter().all(|candidates| !candidates.is_empty()),
        "Empty list of candidates given for initial {name}"
    );

    Ok(())
}

impl Config {
    /// Read the configuration file from the specified project directory.
    ///
    /// # Arguments
    ///
    /// * `project_dir` - Folder containing `hydrocal.toml`
    ///
    /// # Returns
    ///
    /// The configuration as a [`Config`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(project_dir: P) -> Result<Config> {
        let file_path = project_dir.as_ref().join(CONFIG_FILE_NAME);
        let mut config: Config = read_toml(&file_path)?;
        config.project_dir = project_dir.as_ref().to_path_buf();

        config.validate().with_context(|| input_err_msg(&file_path))?;

        Ok(config)
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        check_times(self.reference_time, self.start, self.end)?;
        ensure!(self.output_interval > 0, "output_interval cannot be zero");
        check_points(&self.points)?;
        ensure!(
            !self.solver.launcher.is_empty(),
            "solver.launcher cannot be empty"
        );
        check_reference_points("water level", &self.initial_conditions.water_level)?;
        check_reference_points("concentration", &self.initial_conditions.concentration)?;

        Ok(())
    }

    /// The interval between outputs
    pub fn output_step(&self) -> Duration {
        Duration::minutes(i64::from(self.output_interval))
    }

    /// The grid of output times covering the simulation period
    pub fn grid(&self) -> Result<TimeGrid> {
        TimeGrid::new(self.start, self.end, self.output_step())
    }

    /// Minutes elapsed between the reference time and `time`
    pub fn minutes_since_reference(&self, time: NaiveDateTime) -> f64 {
        (time - self.reference_time).num_seconds() as f64 / 60.0
    }

    /// The solver's working directory
    pub fn solver_dir(&self) -> PathBuf {
        self.project_dir.join(&self.solver.dir)
    }

    /// The directory holding the per-run boundary inputs
    pub fn boundary_dir(&self) -> PathBuf {
        self.project_dir.join(&self.boundary.dir)
    }

    /// The inflow and pollution CSV files for a run
    pub fn boundary_files(&self, run_id: &RunID) -> (PathBuf, PathBuf) {
        let dir = self.boundary_dir();
        let path = |pattern: &str| dir.join(pattern.replace("{run}", run_id.as_str()));

        (
            path(&self.boundary.inflow_file),
            path(&self.boundary.pollution_file),
        )
    }

    /// Names of the templates in the solver directory, which are shared by every run
    pub fn template_names(&self) -> [&str; 4] {
        let solver = &self.solver;
        [
            solver.mdf_template.as_str(),
            solver.dis_template.as_str(),
            solver.hydro_config_template.as_str(),
            solver.launch_script_template.as_str(),
        ]
    }

    /// The scenario archive directory
    pub fn archive_dir(&self) -> PathBuf {
        self.project_dir.join(&self.observations.archive_dir)
    }

    /// The monitoring records file
    pub fn monitoring_file(&self) -> PathBuf {
        self.project_dir.join(&self.observations.monitoring_file)
    }
}
