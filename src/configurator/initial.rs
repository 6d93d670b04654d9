//! Initial conditions for the solver, derived from monitoring data at the start of the period.
use crate::config::InitialConditionsConfig;
use crate::id::PointID;
use crate::observation::first_valid;
use crate::time_series::{SeriesBundle, VariableKind};
use crate::units::{KilogramsPerCubicMetre, Metres, MilligramsPerLitre};
use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;

/// The initial state of the model
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct InitialState {
    /// Initial water level
    pub water_level: Metres,
    /// Initial pollutant concentration
    pub concentration: KilogramsPerCubicMetre,
}

/// The first valid value at each reference point
fn reference_values(
    reference_points: &[Vec<PointID>],
    kind: VariableKind,
    bundle: &SeriesBundle,
) -> Result<Vec<f64>> {
    reference_points
        .iter()
        .map(|candidates| {
            first_valid(candidates, kind, bundle)
                .map(|(_, value)| value)
                .with_context(|| {
                    format!(
                        "No valid {kind} data for initial conditions at point(s) {}",
                        candidates.iter().join(", ")
                    )
                })
        })
        .try_collect()
}

impl InitialState {
    /// Derive the initial state from resampled monitoring data.
    ///
    /// # Arguments
    ///
    /// * `conditions` - Which points to take the initial values from
    /// * `bundle` - Monitoring data resampled onto the output grid, in the units reported by the
    ///   monitoring stations
    pub fn from_monitoring(
        conditions: &InitialConditionsConfig,
        bundle: &SeriesBundle,
    ) -> Result<Self> {
        let water_level =
            reference_values(&conditions.water_level, VariableKind::WaterLevel, bundle)?;
        let water_level = Metres::mean(water_level.into_iter().map(Metres))
            .context("No reference points given for initial water level")?;

        let concentration =
            reference_values(&conditions.concentration, VariableKind::Concentration, bundle)?;
        let concentration =
            MilligramsPerLitre::mean(concentration.into_iter().map(MilligramsPerLitre))
                .context("No reference points given for initial concentration")?;
        info!("Initial water level: {water_level}; initial concentration: {concentration}");

        Ok(Self {
            water_level,
            concentration: concentration.into(),
        })
    }
}

/// Every point referred to by the initial conditions, without duplicates
pub fn reference_point_ids(conditions: &InitialConditionsConfig) -> Vec<PointID> {
    conditions
        .water_level
        .iter()
        .chain(&conditions.concentration)
        .flatten()
        .unique()
        .cloned()
        .collect()
}
