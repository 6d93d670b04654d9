//! Common functionality for hydrocal.
//!
//! hydrocal drives an external hydrodynamic/water quality solver for calibration and scenario
//! generation. For each run it writes the solver's input files, launches the solver, reads back
//! its history output and reduces the comparison with observed data to a single objective value.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod archive;
pub mod cli;
pub mod config;
pub mod configurator;
pub mod executor;
pub mod id;
pub mod input;
pub mod log;
pub mod observation;
pub mod pipeline;
pub mod results;
pub mod scoring;
pub mod settings;
pub mod time_series;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get the hydrocal config directory
pub fn get_hydrocal_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // No config dir on this platform: fall back on the current directory
        return PathBuf::new();
    };
    config_dir.push("hydrocal");
    config_dir
}
