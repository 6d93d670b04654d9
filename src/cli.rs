//! The command line interface for hydrocal.
use crate::archive::{Scenario, ScenarioKind};
use crate::config::{Config, ObservationSource};
use crate::id::RunID;
use crate::log;
use crate::observation::load_monitoring;
use crate::pipeline::{Calibration, Project};
use crate::results::default_history_reader;
use crate::scoring::SENTINEL_OBJECTIVE;
use crate::settings::Settings;
use ::log::info;
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for hydrocal.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options describing a pollution scenario
#[derive(Args)]
pub struct ScenarioOpts {
    /// Where the pollutant is released
    #[arg(long)]
    pub location: String,
    /// Discharge of the release (m3/s)
    #[arg(long)]
    pub flow: f64,
    /// Pollutant concentration of the release
    #[arg(long)]
    pub concentration: f64,
    /// How the pollutant is released
    #[arg(long, value_enum)]
    pub kind: ScenarioKind,
    /// When the pollutant is released (instant releases only)
    #[arg(long)]
    pub release_time: Option<f64>,
}

impl From<ScenarioOpts> for Scenario {
    fn from(opts: ScenarioOpts) -> Self {
        Self {
            location: opts.location,
            flow: opts.flow,
            concentration: opts.concentration,
            kind: opts.kind,
            release_time: opts.release_time,
        }
    }
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Evaluate a candidate run and print its objective value.
    Solve {
        /// Path to the project directory.
        project_dir: PathBuf,
        /// The run to evaluate. The value -1 marks an invalid candidate.
        #[arg(allow_hyphen_values = true)]
        run_id: RunID,
    },
    /// Run the solver for a pollution scenario and archive its results.
    Generate {
        /// Path to the project directory.
        project_dir: PathBuf,
        /// The run whose boundary inputs describe the scenario.
        run_id: RunID,
        /// The scenario being generated
        #[command(flatten)]
        scenario: ScenarioOpts,
    },
    /// Validate a project.
    Validate {
        /// Path to the project directory.
        project_dir: PathBuf,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Solve {
                project_dir,
                run_id,
            } => {
                let objective = handle_solve_command(&project_dir, &run_id, None)?;

                // The optimiser reads the objective from the last line of output
                println!("{objective}");
                Ok(())
            }
            Self::Generate {
                project_dir,
                run_id,
                scenario,
            } => handle_generate_command(&project_dir, &run_id, scenario.into(), None),
            Self::Validate { project_dir } => handle_validate_command(&project_dir, None),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start hydrocal
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ hydrocal --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load settings (if not provided), initialise the logger and read the project configuration
fn start(project_dir: &Path, settings: Option<Settings>, log_to_file: bool) -> Result<Config> {
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    let log_file_path = (log_to_file && settings.log_to_file).then_some(project_dir);
    log::init(&settings.log_level, log_file_path).context("Failed to initialise logging.")?;

    let config = Config::from_path(project_dir).context("Failed to load configuration.")?;
    info!("Loaded configuration from {}", project_dir.display());

    Ok(config)
}

/// Handle the `solve` command.
///
/// # Returns
///
/// The objective value for the run.
pub fn handle_solve_command(
    project_dir: &Path,
    run_id: &RunID,
    settings: Option<Settings>,
) -> Result<f64> {
    let config = start(project_dir, settings, true)?;

    // The optimiser expects a value for invalid candidates, so nothing else may fail first
    if run_id.is_invalid_marker() {
        info!("Run {run_id} marks an invalid candidate; not running the solver");
        return Ok(SENTINEL_OBJECTIVE);
    }

    let reader = default_history_reader(&config)?;
    let project = Project::new(config).context("Failed to prepare project.")?;
    let calibration = Calibration::new(project, reader).context("Failed to load observations.")?;

    calibration
        .solve(run_id)
        .with_context(|| format!("Run {run_id} failed."))
}

/// Handle the `generate` command.
pub fn handle_generate_command(
    project_dir: &Path,
    run_id: &RunID,
    scenario: Scenario,
    settings: Option<Settings>,
) -> Result<()> {
    let config = start(project_dir, settings, true)?;
    let project = Project::new(config).context("Failed to prepare project.")?;

    if project
        .generate(run_id, &scenario)
        .with_context(|| format!("Run {run_id} failed."))?
        .is_some()
    {
        info!("Scenario {} generated", scenario.folder_name());
    }

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(project_dir: &Path, settings: Option<Settings>) -> Result<()> {
    // We don't save log files when running the validate command
    let config = start(project_dir, settings, false)?;

    if config.observations.source == ObservationSource::Monitoring {
        load_monitoring(&config).context("Failed to load observations.")?;
    }
    Project::new(config).context("Failed to validate project.")?;
    info!("Project validation successful!");

    Ok(())
}
