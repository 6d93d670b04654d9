//! Reading history files in NetCDF format.
use super::{HistoryData, HistoryReader};
use anyhow::{Context, Result, ensure};
use std::path::Path;

/// The name of the time axis variable
const TIME_VARIABLE: &str = "time";

/// Reads the solver's NetCDF history files
pub struct NetcdfHistoryReader {
    water_level_variable: String,
    concentration_variable: String,
}

impl NetcdfHistoryReader {
    /// Create a reader for the given variable names
    pub fn new(water_level_variable: &str, concentration_variable: &str) -> Self {
        Self {
            water_level_variable: water_level_variable.to_string(),
            concentration_variable: concentration_variable.to_string(),
        }
    }
}

/// Read a variable as a flat array along with its dimension lengths
fn read_variable(file: &::netcdf::File, name: &str) -> Result<(Vec<f64>, Vec<usize>)> {
    let variable = file
        .variable(name)
        .with_context(|| format!("Variable {name} not found"))?;
    let shape = variable.dimensions().iter().map(|dim| dim.len()).collect();
    let values = variable
        .get_values::<f64, _>(..)
        .with_context(|| format!("Could not read variable {name}"))?;

    Ok((values, shape))
}

/// Split a flat array whose first dimension is time and last is the monitoring point into
/// `[time][slot]` rows.
///
/// Any dimensions in between (e.g. substance and layer for concentrations) are fixed at index 0.
fn to_rows(name: &str, values: &[f64], shape: &[usize]) -> Result<Vec<Vec<f64>>> {
    ensure!(
        shape.len() >= 2,
        "Variable {name} should have time and station dimensions"
    );
    let num_times = shape[0];
    let num_slots = shape[shape.len() - 1];
    let stride: usize = shape[1..].iter().product();
    ensure!(
        values.len() == num_times * stride,
        "Variable {name} has unexpected size"
    );

    Ok(values
        .chunks(stride.max(1))
        .take(num_times)
        .map(|chunk| chunk[..num_slots].to_vec())
        .collect())
}

impl HistoryReader for NetcdfHistoryReader {
    fn read(&self, path: &Path) -> Result<HistoryData> {
        // The file is closed when it goes out of scope at the end of this function, on every path
        let file = ::netcdf::open(path)?;

        let (time, _) = read_variable(&file, TIME_VARIABLE)?;
        let (values, shape) = read_variable(&file, &self.water_level_variable)?;
        let water_level = to_rows(&self.water_level_variable, &values, &shape)?;
        let (values, shape) = read_variable(&file, &self.concentration_variable)?;
        let concentration = to_rows(&self.concentration_variable, &values, &shape)?;

        Ok(HistoryData {
            time,
            water_level,
            concentration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_rows_2d() {
        let rows = to_rows("ZWL", &[1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        assert_eq!(rows, [vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_to_rows_4d() {
        // [time=2, substance=2, layer=1, station=2]: only substance 0 is kept
        let values = [1.0, 2.0, 9.0, 9.0, 3.0, 4.0, 9.0, 9.0];
        let rows = to_rows("GRO", &values, &[2, 2, 1, 2]).unwrap();
        assert_eq!(rows, [vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_to_rows_invalid() {
        assert!(to_rows("ZWL", &[1.0], &[1]).is_err());
        assert!(to_rows("ZWL", &[1.0, 2.0, 3.0], &[2, 2]).is_err());
    }
}
