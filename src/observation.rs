//! Loading observed data into an [`ObservationBundle`].
//!
//! Observations come either from a reference history file (the archived output of an earlier
//! solver run) or from raw monitoring records, which are resampled onto the output grid.
use crate::config::{Config, ObservationSource};
use crate::id::PointID;
use crate::input::{deserialise_datetime, read_csv};
use crate::results::{HistoryReader, to_bundle};
use crate::time_series::{ObservationBundle, SeriesBundle, TimeGrid, TimeSeries, VariableKind};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use log::{info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use strum::IntoEnumIterator;

/// A single reading from a monitoring station
#[derive(PartialEq, Debug, Deserialize, Clone)]
pub struct MonitoringRecord {
    /// The monitoring point the reading was taken at
    pub point_id: PointID,
    /// When the reading was taken
    #[serde(deserialize_with = "deserialise_datetime")]
    pub time: NaiveDateTime,
    /// What was measured
    pub kind: VariableKind,
    /// The reading, if one was recorded
    pub value: Option<f64>,
}

/// Read monitoring records from a CSV file with columns `point_id,time,kind,value`
pub fn read_monitoring_records(file_path: &Path) -> Result<Vec<MonitoringRecord>> {
    read_csv(file_path)
}

/// Resample monitoring records onto a fixed-frequency grid.
///
/// The value at each tick is the mean of the finite readings in `[tick, tick + step)`. Ticks
/// with no such readings are left out. Every requested point gets a series of every kind, which is
/// empty if there are no valid readings for it.
///
/// # Arguments
///
/// * `records` - Raw monitoring records, in any order
/// * `point_ids` - The points to load. Records for other points are ignored.
/// * `grid` - The grid to resample onto
pub fn load(records: &[MonitoringRecord], point_ids: &[PointID], grid: &TimeGrid) -> SeriesBundle {
    let mut buckets: HashMap<(&PointID, VariableKind), BTreeMap<NaiveDateTime, (f64, usize)>> =
        HashMap::new();
    for record in records {
        let Some(value) = record.value.filter(|value| value.is_finite()) else {
            continue;
        };
        let Some(tick) = grid.bucket(record.time) else {
            continue;
        };

        let (sum, count) = buckets
            .entry((&record.point_id, record.kind))
            .or_default()
            .entry(tick)
            .or_default();
        *sum += value;
        *count += 1;
    }

    let mut bundle = SeriesBundle::default();
    for point_id in point_ids {
        for kind in VariableKind::iter() {
            let series = match buckets.get(&(point_id, kind)) {
                Some(ticks) => TimeSeries::new(
                    kind,
                    ticks
                        .iter()
                        .map(|(tick, (sum, count))| (*tick, sum / *count as f64)),
                ),
                None => TimeSeries::empty(kind),
            };
            bundle.insert(point_id.clone(), series);
        }
    }

    bundle
}

/// Find the first candidate point with a valid first value of the given kind.
///
/// Candidates are in order of preference. If the preferred point has no valid data a notice is
/// logged and the next candidate is tried.
///
/// # Returns
///
/// The point used and its value, or `None` if no candidate has valid data.
pub fn first_valid<'a>(
    candidates: &'a [PointID],
    kind: VariableKind,
    bundle: &SeriesBundle,
) -> Option<(&'a PointID, f64)> {
    let (index, point_id, value) = candidates.iter().enumerate().find_map(|(index, point_id)| {
        let value = bundle.get(kind, point_id)?.first_finite_value()?;
        Some((index, point_id, value))
    })?;

    if index > 0 {
        warn!(
            "Monitoring point {} has no valid {kind} data; using point {point_id} instead",
            candidates[0]
        );
    }

    Some((point_id, value))
}

/// Load observations from the archived results named in the configuration.
///
/// If no archive folder is configured, the bundle is empty.
pub fn load_reference(config: &Config, reader: &dyn HistoryReader) -> Result<ObservationBundle> {
    let Some(folder) = &config.observations.folder else {
        info!("No reference folder configured; no observations loaded");
        return Ok(ObservationBundle::default());
    };

    let file_path = config
        .archive_dir()
        .join(folder)
        .join(&config.observations.archive_file_name);
    let history = reader
        .read(&file_path)
        .with_context(|| format!("Failed to read reference results {}", file_path.display()))?;
    info!("Loaded observations from {}", file_path.display());

    to_bundle(&history, config.reference_time, &config.points)
}

/// Load observations from monitoring records, resampled onto the output grid
pub fn load_monitoring(config: &Config) -> Result<ObservationBundle> {
    let file_path = config.monitoring_file();
    let records = read_monitoring_records(&file_path)?;
    info!(
        "Loaded {} monitoring records from {}",
        records.len(),
        file_path.display()
    );

    Ok(load(&records, &config.points, &config.grid()?))
}

/// Load the observation bundle for the configured source.
///
/// # Arguments
///
/// * `config` - The calibration configuration
/// * `reader` - Reader for solver history files (used for reference stores)
pub fn load_observations(config: &Config, reader: &dyn HistoryReader) -> Result<ObservationBundle> {
    match config.observations.source {
        ObservationSource::ReferenceStore => load_reference(config, reader),
        ObservationSource::Monitoring => load_monitoring(config),
    }
}
