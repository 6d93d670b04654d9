//! Time series of observed and simulated values at monitoring points.
//!
//! All series are indexed by absolute time. Observed and simulated data share the same
//! representation ([`SeriesBundle`]) so they can be aligned point by point.
use crate::id::PointID;
use anyhow::{Result, ensure};
use chrono::{Duration, NaiveDateTime};
use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::fmt;
use strum::EnumIter;

/// The kind of variable a series holds
#[derive(
    PartialEq,
    Eq,
    Hash,
    Copy,
    Clone,
    Debug,
    EnumIter,
    DeserializeLabeledStringEnum,
)]
pub enum VariableKind {
    /// Water level above datum (m)
    #[string = "water_level"]
    WaterLevel,
    /// Pollutant concentration (mg/L when observed, kg/m³ inside the solver)
    #[string = "concentration"]
    Concentration,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaterLevel => write!(f, "water level"),
            Self::Concentration => write!(f, "concentration"),
        }
    }
}

/// A sequence of `(time, value)` pairs with strictly increasing times
#[derive(PartialEq, Debug, Clone)]
pub struct TimeSeries {
    kind: VariableKind,
    times: Vec<NaiveDateTime>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Create a time series from `(time, value)` pairs in any order.
    ///
    /// Pairs are sorted by time. Where a time appears more than once, the first value is kept.
    pub fn new<I>(kind: VariableKind, pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDateTime, f64)>,
    {
        let mut pairs = pairs.into_iter().collect_vec();
        let len_before = pairs.len();

        // Stable sort so that "first wins" refers to input order
        pairs.sort_by_key(|(time, _)| *time);
        pairs.dedup_by_key(|(time, _)| *time);
        if pairs.len() != len_before {
            debug!(
                "Dropped {} duplicate timestamps from {kind} series",
                len_before - pairs.len()
            );
        }

        let (times, values) = pairs.into_iter().unzip();
        Self {
            kind,
            times,
            values,
        }
    }

    /// An empty series, used where no data is available
    pub fn empty(kind: VariableKind) -> Self {
        Self {
            kind,
            times: Vec::new(),
            values: Vec::new(),
        }
    }

    /// The kind of variable in this series
    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    /// The number of entries in this series
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether the series has no entries
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// The timestamps of the series
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    /// The values of the series
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iterate over `(time, value)` pairs in time order
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// The value of the first entry, if it is finite
    pub fn first_finite_value(&self) -> Option<f64> {
        self.values.first().copied().filter(|value| value.is_finite())
    }

    /// Pair up the values of `self` and `other` at the times present in both (an inner join)
    pub fn inner_join(&self, other: &TimeSeries) -> Vec<(f64, f64)> {
        self.iter()
            .merge_join_by(other.iter(), |(t1, _), (t2, _)| t1.cmp(t2))
            .filter_map(|either| either.both())
            .map(|((_, a), (_, b))| (a, b))
            .collect()
    }
}

/// A fixed-frequency grid of times covering `[start, end]` inclusive
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct TimeGrid {
    start: NaiveDateTime,
    end: NaiveDateTime,
    step: Duration,
}

impl TimeGrid {
    /// Create a new grid, checking that it contains at least one tick
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, step: Duration) -> Result<Self> {
        ensure!(step > Duration::zero(), "Time step must be positive");
        ensure!(start <= end, "Start time {start} is after end time {end}");

        Ok(Self { start, end, step })
    }

    /// The number of ticks in `[start, end]`.
    ///
    /// This is the number of entries a complete simulated series must have.
    pub fn expected_length(&self) -> usize {
        let span = (self.end - self.start).num_milliseconds();
        let step = self.step.num_milliseconds();

        // Both are non-negative by construction
        usize::try_from(span / step).unwrap_or(0) + 1
    }

    /// Iterate over the ticks of the grid
    pub fn ticks(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        (0..self.expected_length()).map(|i| {
            let i = i32::try_from(i).unwrap_or(i32::MAX);
            self.start + self.step * i
        })
    }

    /// The tick whose interval `[tick, tick + step)` contains `time`, if any
    pub fn bucket(&self, time: NaiveDateTime) -> Option<NaiveDateTime> {
        if time < self.start || time > self.end + self.step {
            return None;
        }

        let offset = (time - self.start).num_milliseconds() / self.step.num_milliseconds();
        let tick = self.start + Duration::milliseconds(offset * self.step.num_milliseconds());
        (tick <= self.end).then_some(tick)
    }
}

/// Time series for every monitoring point, partitioned by variable kind
#[derive(PartialEq, Debug, Clone, Default)]
pub struct SeriesBundle {
    series: IndexMap<VariableKind, IndexMap<PointID, TimeSeries>>,
}

/// Observed data, built once per process and never modified afterwards
pub type ObservationBundle = SeriesBundle;

/// Simulated data for a single run
pub type SimulationBundle = SeriesBundle;

impl SeriesBundle {
    /// Add a series for the given point, replacing any existing series of the same kind
    pub fn insert(&mut self, point_id: PointID, series: TimeSeries) {
        self.series
            .entry(series.kind())
            .or_default()
            .insert(point_id, series);
    }

    /// Get the series of the given kind for a point
    pub fn get(&self, kind: VariableKind, point_id: &PointID) -> Option<&TimeSeries> {
        self.series.get(&kind)?.get(point_id)
    }

    /// Iterate over the points with a series of the given kind
    pub fn iter_kind(&self, kind: VariableKind) -> impl Iterator<Item = (&PointID, &TimeSeries)> {
        self.series.get(&kind).into_iter().flat_map(IndexMap::iter)
    }

    /// Whether the bundle contains no series at all
    pub fn is_empty(&self) -> bool {
        self.series.values().all(IndexMap::is_empty)
    }
}
