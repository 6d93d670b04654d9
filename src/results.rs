//! Reading the solver's history output.
//!
//! The solver writes a history file per run containing a relative time axis and, for each tracked
//! variable, a `[time, slot]` array of values at the monitoring points. This module turns that
//! into a [`SimulationBundle`] keyed by monitoring point and absolute time.
use crate::config::Config;
use crate::id::{PointID, RunID, run_file_name};
use crate::time_series::{SimulationBundle, TimeSeries, VariableKind};
use anyhow::{Context, Result, ensure};
use chrono::{Duration, NaiveDateTime};
use log::debug;
use std::path::{Path, PathBuf};

#[cfg(feature = "netcdf")]
mod netcdf_reader;
#[cfg(feature = "netcdf")]
pub use netcdf_reader::NetcdfHistoryReader;

/// The raw contents of a history file
#[derive(PartialEq, Debug, Clone, Default)]
pub struct HistoryData {
    /// Output times, in seconds since the reference time
    pub time: Vec<f64>,
    /// Water levels, indexed by `[time][slot]`
    pub water_level: Vec<Vec<f64>>,
    /// Concentrations, indexed by `[time][slot]`
    pub concentration: Vec<Vec<f64>>,
}

impl HistoryData {
    /// The array for the given variable kind
    fn values(&self, kind: VariableKind) -> &[Vec<f64>] {
        match kind {
            VariableKind::WaterLevel => &self.water_level,
            VariableKind::Concentration => &self.concentration,
        }
    }

    /// The number of slots (monitoring points) in the file, checking all arrays agree
    fn num_slots(&self) -> Result<usize> {
        let num_slots = self.water_level.first().map_or(0, Vec::len);
        for kind in [VariableKind::WaterLevel, VariableKind::Concentration] {
            let values = self.values(kind);
            ensure!(
                values.len() == self.time.len(),
                "{kind} array has {} time steps but the time axis has {}",
                values.len(),
                self.time.len()
            );
            ensure!(
                values.iter().all(|row| row.len() == num_slots),
                "{kind} array has an inconsistent number of monitoring points"
            );
        }

        Ok(num_slots)
    }
}

/// Something which can read a solver history file.
///
/// Implementations must release the file before returning, including when an error occurs: the
/// next run writes a file of the same name and a handle held open would corrupt it.
pub trait HistoryReader: Send + Sync {
    /// Read the time axis and variable arrays from the file at `path`
    fn read(&self, path: &Path) -> Result<HistoryData>;
}

/// Get a reader for the history file format configured for the solver
#[cfg(feature = "netcdf")]
pub fn default_history_reader(config: &Config) -> Result<Box<dyn HistoryReader>> {
    Ok(Box::new(NetcdfHistoryReader::new(
        &config.solver.water_level_variable,
        &config.solver.concentration_variable,
    )))
}

/// Get a reader for the history file format configured for the solver
#[cfg(not(feature = "netcdf"))]
pub fn default_history_reader(_config: &Config) -> Result<Box<dyn HistoryReader>> {
    anyhow::bail!(
        "hydrocal was built without NetCDF support. Rebuild with `--features netcdf` to read \
        solver history files."
    )
}

/// Convert an offset in seconds from the reference time to an absolute time
#[allow(clippy::cast_possible_truncation)]
fn absolute_time(reference_time: NaiveDateTime, seconds: f64) -> Result<NaiveDateTime> {
    ensure!(seconds.is_finite(), "Invalid time offset in history file: {seconds}");
    let offset = Duration::milliseconds((seconds * 1000.0).round() as i64);
    Ok(reference_time + offset)
}

/// Convert the contents of a history file to a [`SimulationBundle`].
///
/// # Arguments
///
/// * `history` - The raw history data
/// * `reference_time` - The time which the history's time axis is relative to
/// * `points` - Monitoring points in slot order
pub fn to_bundle(
    history: &HistoryData,
    reference_time: NaiveDateTime,
    points: &[PointID],
) -> Result<SimulationBundle> {
    let num_slots = history.num_slots()?;
    ensure!(
        num_slots <= points.len(),
        "History file has {num_slots} monitoring points but only {} are configured",
        points.len()
    );

    let times: Vec<_> = history
        .time
        .iter()
        .map(|&seconds| absolute_time(reference_time, seconds))
        .collect::<Result<_>>()?;

    let mut bundle = SimulationBundle::default();
    for (slot, point_id) in points.iter().enumerate().take(num_slots) {
        for kind in [VariableKind::WaterLevel, VariableKind::Concentration] {
            let values = history.values(kind).iter().map(|row| row[slot]);
            let series = TimeSeries::new(kind, times.iter().copied().zip(values));
            bundle.insert(point_id.clone(), series);
        }
    }

    Ok(bundle)
}

/// The name of the history file the solver writes for a run
pub fn history_file_name(config: &Config, run_id: &RunID) -> String {
    let base = format!(
        "{}-{}",
        config.solver.history_prefix, config.solver.mdf_name
    );
    run_file_name(&base, run_id, &config.solver.history_extension)
}

/// The path to the history file the solver writes for a run
pub fn history_file_path(config: &Config, run_id: &RunID) -> PathBuf {
    config.solver_dir().join(history_file_name(config, run_id))
}

/// Read the results of a solver run.
///
/// # Arguments
///
/// * `config` - The calibration configuration
/// * `reader` - Reader for the solver's history file format
/// * `run_id` - The run whose results should be read
pub fn read_results(
    config: &Config,
    reader: &dyn HistoryReader,
    run_id: &RunID,
) -> Result<SimulationBundle> {
    let file_path = history_file_path(config, run_id);
    debug!("Reading results for run {run_id} from {}", file_path.display());

    let history = reader
        .read(&file_path)
        .with_context(|| format!("Failed to read solver output {}", file_path.display()))?;
    to_bundle(&history, config.reference_time, &config.points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, config, time};
    use rstest::rstest;

    fn points(ids: &[&str]) -> Vec<PointID> {
        ids.iter().map(|id| PointID::new(id)).collect()
    }

    fn history() -> HistoryData {
        HistoryData {
            time: vec![0.0, 600.0, 1200.0],
            water_level: vec![vec![1.0, 2.0], vec![1.1, 2.1], vec![1.2, 2.2]],
            concentration: vec![vec![0.1, 0.2], vec![0.11, 0.21], vec![0.12, 0.22]],
        }
    }

    #[test]
    fn test_to_bundle() {
        let bundle = to_bundle(&history(), time(0, 0), &points(&["1", "10", "5"])).unwrap();

        let level = bundle
            .get(VariableKind::WaterLevel, &"10".into())
            .unwrap();
        assert_eq!(level.times(), [time(0, 0), time(0, 10), time(0, 20)]);
        assert_eq!(level.values(), [2.0, 2.1, 2.2]);

        let conc = bundle
            .get(VariableKind::Concentration, &"1".into())
            .unwrap();
        assert_eq!(conc.values(), [0.1, 0.11, 0.12]);

        // Point "5" has no slot in the file
        assert!(bundle.get(VariableKind::WaterLevel, &"5".into()).is_none());
    }

    #[test]
    fn test_to_bundle_reference_offset() {
        let bundle = to_bundle(&history(), time(6, 0), &points(&["1", "10"])).unwrap();
        let level = bundle.get(VariableKind::WaterLevel, &"1".into()).unwrap();
        assert_eq!(level.times()[0], time(6, 0));
        assert_eq!(level.times()[2], time(6, 20));
    }

    #[test]
    fn test_to_bundle_too_many_slots() {
        assert_error!(
            to_bundle(&history(), time(0, 0), &points(&["1"])),
            "History file has 2 monitoring points but only 1 are configured"
        );
    }

    #[test]
    fn test_to_bundle_ragged() {
        let mut history = history();
        history.concentration.pop();
        assert_error!(
            to_bundle(&history, time(0, 0), &points(&["1", "10"])),
            "concentration array has 2 time steps but the time axis has 3"
        );

        let mut history = self::history();
        history.water_level[1].pop();
        assert_error!(
            to_bundle(&history, time(0, 0), &points(&["1", "10"])),
            "water level array has an inconsistent number of monitoring points"
        );
    }

    #[rstest]
    fn test_history_file_name(config: Config) {
        assert_eq!(
            history_file_name(&config, &"7".into()),
            "trih-river_7.nc"
        );
    }

    /// A reader returning canned data, recording which file was requested
    struct CannedReader(HistoryData);

    impl HistoryReader for CannedReader {
        fn read(&self, path: &Path) -> Result<HistoryData> {
            ensure!(
                path.ends_with("dflow/trih-river_7.nc"),
                "Unexpected path {}",
                path.display()
            );
            Ok(self.0.clone())
        }
    }

    #[rstest]
    fn test_read_results(config: Config) {
        let reader = CannedReader(history());
        let bundle = read_results(&config, &reader, &"7".into()).unwrap();
        assert_eq!(bundle.iter_kind(VariableKind::WaterLevel).count(), 2);

        assert!(read_results(&config, &reader, &"8".into()).is_err());
    }
}
