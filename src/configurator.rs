//! Writes the solver input files for a run.
//!
//! Each run gets its own copies of the control file, discharge file, job configuration and
//! launch script, all named after the run ID so that concurrent runs never share a file. The
//! templates in the solver directory are only ever read.
use crate::config::Config;
use crate::id::{RunID, run_file_name};
use crate::observation::{load, read_monitoring_records};
use anyhow::{Context, Result, ensure};
use log::debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub mod control;
pub mod discharge;
pub mod initial;
pub mod template;
use control::{ControlFile, ControlValue};
use discharge::{DischargeFile, read_boundary_conditions};
use initial::{InitialState, reference_point_ids};
use template::{Substitution, TextTemplate};

/// Marker for the control file in the job configuration
const MDF_FILE_FIELD: &str = "<mdfFile>";

/// Marker for the URL file in the job configuration
const URL_FILE_FIELD: &str = "<urlFile>";

/// The files written for a run
#[derive(PartialEq, Debug, Clone)]
pub struct RunFiles {
    /// The control file
    pub control: PathBuf,
    /// The discharge file
    pub discharge: PathBuf,
    /// The job configuration
    pub hydro_config: PathBuf,
    /// The launch script
    pub launch_script: PathBuf,
}

impl RunFiles {
    /// The files written for a run, whether or not they exist yet
    pub fn new(config: &Config, run_id: &RunID) -> Self {
        let solver = &config.solver;
        let solver_dir = config.solver_dir();

        Self {
            control: solver_dir.join(run_file_name(&solver.mdf_name, run_id, "mdf")),
            discharge: solver_dir.join(run_file_name(&solver.dis_name, run_id, "dis")),
            hydro_config: solver_dir.join(run_file_name_from_template(
                &solver.hydro_config_template,
                run_id,
            )),
            launch_script: solver_dir.join(launch_script_name(config, run_id)),
        }
    }

    /// The paths of all files written for the run
    pub fn paths(&self) -> [&Path; 4] {
        [
            &self.control,
            &self.discharge,
            &self.hydro_config,
            &self.launch_script,
        ]
    }
}

/// Derive a per-run file name from a template name (e.g. `run.bat` becomes `run_3.bat`)
pub fn run_file_name_from_template(template: &str, run_id: &RunID) -> String {
    match template.rsplit_once('.') {
        Some((base, ext)) => run_file_name(base, run_id, ext),
        None => format!("{template}_{run_id}"),
    }
}

/// The name of the launch script for a run
pub fn launch_script_name(config: &Config, run_id: &RunID) -> String {
    run_file_name_from_template(&config.solver.launch_script_template, run_id)
}

/// Write `contents` to `file_path` so that readers never see a partially written file
pub fn write_atomic(file_path: &Path, contents: &str) -> Result<()> {
    let dir = file_path.parent().unwrap_or(Path::new("."));
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Could not create temporary file in {}", dir.display()))?;
    file.write_all(contents.as_bytes())?;
    file.persist(file_path)
        .with_context(|| format!("Could not write {}", file_path.display()))?;

    Ok(())
}

/// Check that the templates in the solver directory can be used for a run.
///
/// This finds problems with the templates up front, rather than when the first run is
/// configured.
pub fn check_templates(config: &Config) -> Result<()> {
    let solver = &config.solver;
    let solver_dir = config.solver_dir();

    let dis_path = solver_dir.join(&solver.dis_template);
    let discharge = DischargeFile::from_path(&dis_path)?;
    for branch in &config.boundary.branches {
        ensure!(
            branch.slot < discharge.num_tables(),
            "Branch {} is mapped to slot {} but {} only has {} tables",
            branch.name,
            branch.slot,
            dis_path.display(),
            discharge.num_tables()
        );
    }

    TextTemplate::from_path(&solver_dir.join(&solver.hydro_config_template))?
        .render(&[Substitution::line(MDF_FILE_FIELD, MDF_FILE_FIELD)])?;
    TextTemplate::from_path(&solver_dir.join(&solver.launch_script_template))?.render(&[
        Substitution::text(&solver.hydro_config_template, &solver.hydro_config_template),
    ])?;

    Ok(())
}

/// Load monitoring data and derive the initial state of the model from it
pub fn initial_state(config: &Config) -> Result<InitialState> {
    let conditions = &config.initial_conditions;
    let records = read_monitoring_records(&config.monitoring_file())?;
    let bundle = load(&records, &reference_point_ids(conditions), &config.grid()?);

    InitialState::from_monitoring(conditions, &bundle)
}

/// Read the control file template and fill in the values shared by every run.
///
/// # Arguments
///
/// * `config` - The calibration configuration
/// * `initial` - The initial state of the model
pub fn prepare_control_file(config: &Config, initial: &InitialState) -> Result<ControlFile> {
    let template_path = config.solver_dir().join(&config.solver.mdf_template);
    let mut control = ControlFile::from_path(&template_path)?;

    let start = config.minutes_since_reference(config.start);
    let stop = config.minutes_since_reference(config.end);
    let interval = f64::from(config.output_interval);
    let roughness = &config.roughness;
    control
        .set_all([
            (
                "Itdate",
                ControlValue::Text(config.reference_time.format("%Y-%m-%d").to_string()),
            ),
            ("Tstart", ControlValue::Number(start)),
            ("Tstop", ControlValue::Number(stop)),
            ("Flmap", ControlValue::Numbers(vec![start, interval, stop])),
            ("Flhis", ControlValue::Numbers(vec![start, interval, stop])),
            ("Flpp", ControlValue::Numbers(vec![start, 0.0, stop])),
            ("C01", ControlValue::Number(initial.concentration.value())),
            ("Zeta0", ControlValue::Number(initial.water_level.value())),
            ("Ccofu", ControlValue::Number(roughness.ccofu)),
            ("Ccofv", ControlValue::Number(roughness.ccofv)),
            ("Vicouv", ControlValue::Number(roughness.vicouv)),
            ("Dicouv", ControlValue::Number(roughness.dicouv)),
        ])
        .with_context(|| format!("Invalid control file template {}", template_path.display()))?;

    Ok(control)
}

/// Write the solver input files for a run.
///
/// # Arguments
///
/// * `config` - The calibration configuration
/// * `control` - The control file with the values shared by every run filled in
/// * `run_id` - The run to configure
///
/// # Returns
///
/// The paths of the files written. If an error occurs, some files may already have been written.
pub fn configure(config: &Config, control: &ControlFile, run_id: &RunID) -> Result<RunFiles> {
    let solver = &config.solver;
    let solver_dir = config.solver_dir();
    let files = RunFiles::new(config, run_id);

    // Discharge file
    let dis_name = run_file_name(&solver.dis_name, run_id, "dis");
    let mut discharge = DischargeFile::from_path(&solver_dir.join(&solver.dis_template))?;
    for (slot, records) in read_boundary_conditions(config, run_id)? {
        discharge.set_time_series(slot, config.reference_time, &records)?;
    }
    write_atomic(&files.discharge, &discharge.to_string())?;

    // Control file
    let mdf_name = run_file_name(&solver.mdf_name, run_id, "mdf");
    let mut control = control.clone();
    control.set("Fildis", &ControlValue::Text(dis_name))?;
    write_atomic(&files.control, &control.to_string())?;

    // Job configuration
    let url_name = run_file_name(&solver.mdf_name, run_id, "url");
    let hydro_config_name = run_file_name_from_template(&solver.hydro_config_template, run_id);
    let hydro_config = TextTemplate::from_path(&solver_dir.join(&solver.hydro_config_template))?
        .render(&[
            Substitution::line(MDF_FILE_FIELD, &format!("<mdfFile>{mdf_name}</mdfFile>")),
            Substitution::optional_line(URL_FILE_FIELD, &format!("<urlFile>{url_name}</urlFile>")),
        ])?;
    write_atomic(&files.hydro_config, &hydro_config)?;

    // Launch script
    let launch_script = TextTemplate::from_path(&solver_dir.join(&solver.launch_script_template))?
        .render(&[Substitution::text(
            &solver.hydro_config_template,
            &hydro_config_name,
        )])?;
    write_atomic(&files.launch_script, &launch_script)?;

    debug!("Wrote input files for run {run_id} to {}", solver_dir.display());

    Ok(files)
}
