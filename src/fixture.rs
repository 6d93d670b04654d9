//! Fixtures for tests
use crate::config::Config;
use crate::id::PointID;
use crate::time_series::{SeriesBundle, TimeGrid, TimeSeries, VariableKind};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// A time on 1 January 2019
pub fn time(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 1, 1)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// A grid covering one day in ten-minute steps (144 ticks)
#[fixture]
pub fn grid() -> TimeGrid {
    TimeGrid::new(time(0, 0), time(23, 50), Duration::minutes(10)).unwrap()
}

/// A series with one value per tick of `grid`, generated by `f(tick_index)`
pub fn series_on_grid<F>(grid: &TimeGrid, kind: VariableKind, f: F) -> TimeSeries
where
    F: Fn(usize) -> f64,
{
    TimeSeries::new(kind, grid.ticks().enumerate().map(|(i, t)| (t, f(i))))
}

/// Build a bundle holding a single series
pub fn single_series_bundle(point_id: &str, series: TimeSeries) -> SeriesBundle {
    let mut bundle = SeriesBundle::default();
    bundle.insert(PointID::new(point_id), series);
    bundle
}

/// A configuration with the default monitoring points, covering one day
#[fixture]
pub fn config() -> Config {
    toml::from_str(
        r#"
        reference_time = "2019-01-01 00:00:00"
        start = "2019-01-01 00:00:00"
        end = "2019-01-01 23:50:00"
        "#,
    )
    .unwrap()
}
