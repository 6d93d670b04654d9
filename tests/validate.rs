//! Integration tests for the `validate` command.
use hydrocal::cli::handle_validate_command;
use hydrocal::log::is_logger_initialised;
use hydrocal::settings::Settings;
use std::path::PathBuf;

/// Get the path to the demo project.
fn get_project_dir() -> PathBuf {
    PathBuf::from("demos/river")
}

/// An integration test for the `validate` command.
///
/// We also check that the logger is initialised after it is run.
#[test]
fn test_handle_validate_command() {
    unsafe { std::env::set_var("HYDROCAL_LOG_LEVEL", "off") };

    assert!(!is_logger_initialised());

    handle_validate_command(&get_project_dir(), Some(Settings::default())).unwrap();

    assert!(is_logger_initialised());

    // Second time will fail because the logging is already initialised
    assert_eq!(
        handle_validate_command(&get_project_dir(), Some(Settings::default()))
            .unwrap_err()
            .chain()
            .next()
            .unwrap()
            .to_string(),
        "Failed to initialise logging."
    );
}
