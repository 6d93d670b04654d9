//! Launching the solver for a run.
use crate::config::Config;
use crate::configurator::launch_script_name;
use crate::id::RunID;
use anyhow::{Context, Result, bail, ensure};
use log::{debug, info};
use std::process::Command;
use std::time::Instant;

/// Run the solver for a run whose input files have already been written.
///
/// The launch script is run with the configured launcher in the solver directory and this
/// function blocks until it exits.
///
/// # Arguments
///
/// * `config` - The calibration configuration
/// * `run_id` - The run to execute
///
/// # Returns
///
/// An error if the solver could not be started or exited with a failure status.
pub fn execute(config: &Config, run_id: &RunID) -> Result<()> {
    let solver_dir = config.solver_dir();
    let script = launch_script_name(config, run_id);
    ensure!(
        solver_dir.join(&script).is_file(),
        "Launch script {script} not found in {}",
        solver_dir.display()
    );

    let Some((program, args)) = config.solver.launcher.split_first() else {
        bail!("No launcher configured for the solver");
    };

    info!("Starting solver for run {run_id}");
    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .arg(&script)
        .current_dir(&solver_dir)
        .output()
        .with_context(|| format!("Could not start the solver with '{program}'"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!("Solver output for run {run_id}:\n{}", stdout.trim_end());
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "Solver failed for run {run_id} ({}): {}",
            output.status,
            stderr.trim()
        );
    }

    info!(
        "Solver finished for run {run_id} in {:.1}s",
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fixture::config;
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    fn config_with_script(config: Config, dir: &std::path::Path, script: &str) -> Config {
        let mut config = config;
        config.project_dir = dir.to_path_buf();
        fs::create_dir_all(config.solver_dir()).unwrap();
        fs::write(config.solver_dir().join("run_2.bat"), script).unwrap();
        config
    }

    #[rstest]
    fn test_execute_success(config: Config) {
        let dir = tempdir().unwrap();
        let config = config_with_script(config, dir.path(), "echo done > finished.txt\n");

        execute(&config, &"2".into()).unwrap();
        assert!(config.solver_dir().join("finished.txt").exists());
    }

    #[rstest]
    fn test_execute_failure(config: Config) {
        let dir = tempdir().unwrap();
        let config = config_with_script(config, dir.path(), "echo broken >&2\nexit 3\n");

        let err = execute(&config, &"2".into()).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[rstest]
    fn test_execute_missing_script(config: Config) {
        let dir = tempdir().unwrap();
        let config = config_with_script(config, dir.path(), "exit 0\n");

        assert!(execute(&config, &"3".into()).is_err());
    }
}
