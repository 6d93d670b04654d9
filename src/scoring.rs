//! Alignment of simulated against observed data and reduction to a single objective value.
//!
//! The objective is the negated mean Nash–Sutcliffe efficiency (NSE) over every contributing
//! `(point, kind)` pair, so that an optimiser minimising it maximises the goodness of fit. Any
//! run which cannot be scored (incomplete output, invalid values) gets [`SENTINEL_OBJECTIVE`].
use crate::id::PointID;
use crate::time_series::{ObservationBundle, SimulationBundle, TimeGrid, TimeSeries, VariableKind};
use float_cmp::approx_eq;
use log::{debug, info, warn};

/// The objective value reported for a failed or invalid run
pub const SENTINEL_OBJECTIVE: f64 = 9_999_999_999.0;

/// Variable kinds in the order in which they are aligned
const KINDS: [VariableKind; 2] = [VariableKind::Concentration, VariableKind::WaterLevel];

/// Aligned observed and simulated values for one `(point, kind)` pair
#[derive(PartialEq, Debug, Clone)]
pub struct AlignedPair {
    /// The monitoring point
    pub point_id: PointID,
    /// The variable compared
    pub kind: VariableKind,
    /// `(observed, simulated)` values at the times present in both series
    pub values: Vec<(f64, f64)>,
}

/// Why a run could not be scored
#[derive(PartialEq, Debug, Clone)]
pub enum Rejection {
    /// The simulated series for a point is shorter than the output grid
    Incomplete {
        /// The monitoring point
        point_id: PointID,
        /// The variable
        kind: VariableKind,
        /// Number of simulated entries
        len: usize,
        /// Number of entries required
        expected: usize,
    },
    /// An aligned sequence has no entries
    NoOverlap(PointID, VariableKind),
    /// An aligned sequence contains a NaN or infinite value
    NonFinite(PointID, VariableKind),
    /// No observations are available for any point
    NoData,
    /// The goodness of fit could not be computed
    InvalidEfficiency(PointID, VariableKind),
}

/// Compute the Nash–Sutcliffe efficiency of simulated against observed values.
///
/// Returns NaN if the observed values are constant, as the efficiency is undefined.
pub fn nse(pairs: &[(f64, f64)]) -> f64 {
    let count = pairs.len() as f64;
    let mean = pairs.iter().map(|(obs, _)| obs).sum::<f64>() / count;
    let residual: f64 = pairs.iter().map(|(obs, sim)| (sim - obs).powi(2)).sum();
    let variance: f64 = pairs.iter().map(|(obs, _)| (obs - mean).powi(2)).sum();

    if approx_eq!(f64, variance, 0.0) {
        return f64::NAN;
    }

    1.0 - residual / variance
}

/// Align simulated with observed series, point by point.
///
/// Concentrations are aligned first, then water levels, each in the order of `points`. Points
/// with no observed data of a kind are skipped. The first point with an incomplete simulated
/// series rejects the whole run.
///
/// # Arguments
///
/// * `observations` - Observed data
/// * `simulation` - The results of the run
/// * `points` - Monitoring points to compare
/// * `grid` - The output grid; a complete simulated series has one entry per tick
pub fn align(
    observations: &ObservationBundle,
    simulation: &SimulationBundle,
    points: &[PointID],
    grid: &TimeGrid,
) -> Result<Vec<AlignedPair>, Rejection> {
    let expected = grid.expected_length();
    let mut aligned = Vec::new();
    for kind in KINDS {
        for point_id in points {
            let Some(observed) = observations.get(kind, point_id).filter(|s| !s.is_empty()) else {
                info!("No observed {kind} data for point {point_id}; skipping");
                continue;
            };

            // A missing simulated series counts as having no entries
            let simulated = simulation.get(kind, point_id);
            let Some(simulated) = simulated.filter(|s| s.len() >= expected) else {
                return Err(Rejection::Incomplete {
                    point_id: point_id.clone(),
                    kind,
                    len: simulated.map_or(0, TimeSeries::len),
                    expected,
                });
            };

            aligned.push(AlignedPair {
                point_id: point_id.clone(),
                kind,
                values: observed.inner_join(simulated),
            });
        }
    }

    Ok(aligned)
}

/// Reduce aligned sequences to the objective value
fn objective(aligned: &[AlignedPair]) -> Result<f64, Rejection> {
    for pair in aligned {
        if pair.values.is_empty() {
            return Err(Rejection::NoOverlap(pair.point_id.clone(), pair.kind));
        }
        if !pair
            .values
            .iter()
            .all(|(obs, sim)| obs.is_finite() && sim.is_finite())
        {
            return Err(Rejection::NonFinite(pair.point_id.clone(), pair.kind));
        }
    }

    if aligned.is_empty() {
        return Err(Rejection::NoData);
    }

    let mut total = 0.0;
    for pair in aligned {
        let efficiency = nse(&pair.values);
        if !efficiency.is_finite() {
            return Err(Rejection::InvalidEfficiency(pair.point_id.clone(), pair.kind));
        }
        debug!("NSE for {} at point {}: {efficiency}", pair.kind, pair.point_id);
        total += efficiency;
    }

    Ok(-total / aligned.len() as f64)
}

/// Score a run against the observations.
///
/// # Returns
///
/// The negated mean NSE, or [`SENTINEL_OBJECTIVE`] if the run cannot be scored.
pub fn score(
    observations: &ObservationBundle,
    simulation: &SimulationBundle,
    points: &[PointID],
    grid: &TimeGrid,
) -> f64 {
    let result =
        align(observations, simulation, points, grid).and_then(|aligned| objective(&aligned));
    match result {
        Ok(value) => value,
        Err(rejection) => {
            match rejection {
                Rejection::Incomplete {
                    point_id,
                    kind,
                    len,
                    expected,
                } => warn!(
                    "Simulated {kind} at point {point_id} has {len} entries but {expected} were \
                    expected; the run did not converge"
                ),
                Rejection::NoOverlap(point_id, kind) => {
                    warn!("No common times for {kind} at point {point_id}");
                }
                Rejection::NonFinite(point_id, kind) => {
                    warn!("Invalid {kind} value at point {point_id}");
                }
                Rejection::NoData => warn!("No observations to compare the run against"),
                Rejection::InvalidEfficiency(point_id, kind) => warn!(
                    "Could not compute the efficiency for {kind} at point {point_id}: observed \
                    values are constant"
                ),
            }
            SENTINEL_OBJECTIVE
        }
    }
}
