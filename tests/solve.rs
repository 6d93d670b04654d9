//! Integration tests for the `solve` command.
use hydrocal::cli::handle_solve_command;
use hydrocal::id::RunID;
use hydrocal::scoring::SENTINEL_OBJECTIVE;
use hydrocal::settings::Settings;
use std::path::Path;

/// An invalid candidate is scored without a history reader or solver, so this works on any build.
#[test]
fn test_handle_solve_command_invalid_run() {
    unsafe { std::env::set_var("HYDROCAL_LOG_LEVEL", "off") };

    let objective = handle_solve_command(
        Path::new("demos/river"),
        &RunID::new("-1"),
        Some(Settings::default()),
    )
    .unwrap();
    assert_eq!(objective, SENTINEL_OBJECTIVE);
}
