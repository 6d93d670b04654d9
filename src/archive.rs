//! Archiving solver results for pollution scenarios.
//!
//! Results generated for a scenario are kept under the archive directory in a folder named after
//! the scenario, where they can later be used as reference observations.
use crate::config::Config;
use crate::id::RunID;
use crate::results::history_file_path;
use anyhow::{Context, Result, ensure};
use clap::ValueEnum;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// How the pollutant is released in a scenario
#[derive(PartialEq, Eq, Debug, Clone, Copy, ValueEnum)]
pub enum ScenarioKind {
    /// A continuous release
    Continue,
    /// A single release at a given time
    Instant,
}

/// A pollution scenario
#[derive(PartialEq, Debug, Clone)]
pub struct Scenario {
    /// Where the pollutant is released
    pub location: String,
    /// The discharge of the release
    pub flow: f64,
    /// The pollutant concentration of the release
    pub concentration: f64,
    /// How the pollutant is released
    pub kind: ScenarioKind,
    /// When the pollutant is released (instant releases only)
    pub release_time: Option<f64>,
}

impl Scenario {
    /// Check that the release time is given exactly when it is needed
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            ScenarioKind::Continue => ensure!(
                self.release_time.is_none(),
                "A release time cannot be given for a continuous release"
            ),
            ScenarioKind::Instant => ensure!(
                self.release_time.is_some(),
                "A release time is required for an instant release"
            ),
        }
        ensure!(
            !self.location.is_empty() && !self.location.contains(['/', '\\']),
            "Invalid release location '{}'",
            self.location
        );

        Ok(())
    }

    /// The name of the folder the scenario's results are archived in
    pub fn folder_name(&self) -> String {
        let mut name = format!(
            "{}_{:.1}_{:.1}",
            self.location, self.flow, self.concentration
        );
        if let Some(time) = self.release_time {
            name.push_str(&format!("_{time:.1}"));
        }

        name
    }
}

/// Move a file, falling back on copy and delete if it cannot be renamed (e.g. across devices)
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    fs::copy(from, to)?;
    fs::remove_file(from)?;

    Ok(())
}

/// Move the history file for a run into the scenario archive.
///
/// An existing archive for the same scenario is never overwritten.
///
/// # Returns
///
/// The path of the archived file, or `None` if the scenario was already archived.
pub fn archive_results(
    config: &Config,
    run_id: &RunID,
    scenario: &Scenario,
) -> Result<Option<PathBuf>> {
    let source = history_file_path(config, run_id);
    ensure!(
        source.is_file(),
        "No results found for run {run_id} (expected {})",
        source.display()
    );

    let folder = config.archive_dir().join(scenario.folder_name());
    let destination = folder.join(&config.observations.archive_file_name);
    if destination.exists() {
        warn!(
            "Results for scenario {} already archived; keeping existing file",
            scenario.folder_name()
        );
        return Ok(None);
    }

    fs::create_dir_all(&folder)
        .with_context(|| format!("Failed to create directory: {}", folder.display()))?;
    move_file(&source, &destination).with_context(|| {
        format!(
            "Failed to move {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    info!("Archived results for run {run_id} to {}", destination.display());

    Ok(Some(destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::config;
    use rstest::rstest;
    use tempfile::tempdir;

    fn scenario(kind: ScenarioKind, release_time: Option<f64>) -> Scenario {
        Scenario {
            location: "yj4".into(),
            flow: 12.34,
            concentration: 5.0,
            kind,
            release_time,
        }
    }

    #[test]
    fn test_folder_name() {
        assert_eq!(
            scenario(ScenarioKind::Continue, None).folder_name(),
            "yj4_12.3_5.0"
        );
        assert_eq!(
            scenario(ScenarioKind::Instant, Some(90.0)).folder_name(),
            "yj4_12.3_5.0_90.0"
        );
    }

    #[test]
    fn test_validate() {
        assert!(scenario(ScenarioKind::Continue, None).validate().is_ok());
        assert!(scenario(ScenarioKind::Instant, Some(1.0)).validate().is_ok());
        assert!(scenario(ScenarioKind::Continue, Some(1.0)).validate().is_err());
        assert!(scenario(ScenarioKind::Instant, None).validate().is_err());

        let mut bad = scenario(ScenarioKind::Continue, None);
        bad.location = "../x".into();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            ScenarioKind::from_str("instant", false),
            Ok(ScenarioKind::Instant)
        );
        assert!(ScenarioKind::from_str("sudden", false).is_err());
    }

    #[rstest]
    fn test_archive_results(config: Config) {
        let dir = tempdir().unwrap();
        let mut config = config;
        config.project_dir = dir.path().to_path_buf();
        fs::create_dir(config.solver_dir()).unwrap();
        let run_id = RunID::new("6");
        let scenario = scenario(ScenarioKind::Continue, None);

        fs::write(history_file_path(&config, &run_id), "first").unwrap();
        let archived = archive_results(&config, &run_id, &scenario)
            .unwrap()
            .unwrap();
        assert_eq!(
            archived,
            dir.path().join("obs/yj4_12.3_5.0/trih-river.nc")
        );
        assert_eq!(fs::read_to_string(&archived).unwrap(), "first");
        assert!(!history_file_path(&config, &run_id).exists());

        // A second run of the same scenario leaves the archive alone
        fs::write(history_file_path(&config, &run_id), "second").unwrap();
        assert_eq!(archive_results(&config, &run_id, &scenario).unwrap(), None);
        assert_eq!(fs::read_to_string(&archived).unwrap(), "first");
    }

    #[rstest]
    fn test_archive_results_missing(config: Config) {
        let dir = tempdir().unwrap();
        let mut config = config;
        config.project_dir = dir.path().to_path_buf();
        let scenario = scenario(ScenarioKind::Continue, None);

        assert!(archive_results(&config, &"6".into(), &scenario).is_err());
    }
}
