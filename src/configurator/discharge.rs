//! The solver's discharge file (`.dis`) and the per-run boundary inputs which fill it.
//!
//! A discharge file is a list of tables, one per discharge location. Each table has a keyword
//! header ending in `records-in-table N`, followed by `N` rows of `time discharge concentration`.
use super::control::format_scientific;
use crate::config::Config;
use crate::id::RunID;
use crate::input::{input_err_msg, parse_datetime};
use crate::units::CubicMetresPerSecond;
use anyhow::{Context, Result, bail, ensure};
use chrono::NaiveDateTime;
use itertools::Itertools;
use std::fmt::{self, Write};
use std::fs;
use std::path::Path;
use unicase::UniCase;

const TABLE_NAME: &str = "table-name";
const PARAMETER: &str = "parameter";
const REFERENCE_TIME: &str = "reference-time";
const RECORDS_IN_TABLE: &str = "records-in-table";

/// The number of parameters in a table: time, discharge and concentration
const NUM_PARAMETERS: usize = 3;

/// One row of a discharge table
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct DischargeRecord {
    /// Minutes since the reference time
    pub minutes: f64,
    /// Discharge into the model
    pub flow: CubicMetresPerSecond,
    /// Pollutant concentration of the discharge
    pub concentration: f64,
}

impl fmt::Display for DischargeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " {}  {}  {}",
            format_scientific(self.minutes),
            format_scientific(self.flow.value()),
            format_scientific(self.concentration)
        )
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
struct Table {
    header: Vec<String>,
    records: Vec<String>,
}

impl Table {
    fn num_parameters(&self) -> usize {
        self.header
            .iter()
            .filter(|line| keyword(line) == PARAMETER)
            .count()
    }
}

/// The first whitespace-separated token of a line
fn keyword(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// The contents of a discharge file
#[derive(PartialEq, Debug, Clone)]
pub struct DischargeFile {
    preamble: Vec<String>,
    tables: Vec<Table>,
}

impl DischargeFile {
    /// Parse the contents of a discharge file
    pub fn parse(contents: &str) -> Result<Self> {
        let mut preamble = Vec::new();
        let mut tables: Vec<Table> = Vec::new();
        let mut remaining_records: usize = 0;

        for line in contents.lines() {
            if remaining_records > 0 {
                if let Some(table) = tables.last_mut() {
                    table.records.push(line.to_string());
                }
                remaining_records -= 1;
                continue;
            }

            match keyword(line) {
                TABLE_NAME => tables.push(Table {
                    header: vec![line.to_string()],
                    records: Vec::new(),
                }),
                kw => {
                    let Some(table) = tables.last_mut() else {
                        preamble.push(line.to_string());
                        continue;
                    };
                    table.header.push(line.to_string());

                    if kw == RECORDS_IN_TABLE {
                        let count = line.split_whitespace().nth(1).unwrap_or("");
                        remaining_records = count
                            .parse()
                            .with_context(|| format!("Invalid record count '{count}'"))?;
                    }
                }
            }
        }

        ensure!(
            remaining_records == 0,
            "Discharge file ended before all records were read"
        );

        Ok(Self { preamble, tables })
    }

    /// Read a discharge file from disk
    pub fn from_path(file_path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
        Self::parse(&contents).with_context(|| input_err_msg(file_path))
    }

    /// The number of discharge tables
    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    /// Replace the time series of the table in position `slot`.
    ///
    /// # Arguments
    ///
    /// * `slot` - Index of the table
    /// * `reference_time` - The solver's reference time, which record times are relative to
    /// * `records` - The new rows of the table
    pub fn set_time_series(
        &mut self,
        slot: usize,
        reference_time: NaiveDateTime,
        records: &[DischargeRecord],
    ) -> Result<()> {
        let num_tables = self.tables.len();
        let Some(table) = self.tables.get_mut(slot) else {
            bail!("Discharge file has {num_tables} tables but slot {slot} was requested");
        };
        ensure!(
            table.num_parameters() == NUM_PARAMETERS,
            "Discharge table {slot} must have {NUM_PARAMETERS} parameters (time, discharge and \
            concentration)"
        );

        for line in &mut table.header {
            match keyword(line) {
                REFERENCE_TIME => {
                    *line = format!("{REFERENCE_TIME:<21}{}", reference_time.format("%Y%m%d"));
                }
                RECORDS_IN_TABLE => *line = format!("{RECORDS_IN_TABLE:<21}{}", records.len()),
                _ => {}
            }
        }
        table.records = records.iter().map(ToString::to_string).collect();

        Ok(())
    }
}

impl fmt::Display for DischargeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        let lines = self.preamble.iter().chain(
            self.tables
                .iter()
                .flat_map(|table| table.header.iter().chain(&table.records)),
        );
        for line in lines {
            writeln!(out, "{line}")?;
        }

        f.write_str(&out)
    }
}

/// Selected columns of a boundary input CSV file
#[derive(PartialEq, Debug, Clone)]
pub struct BoundaryTable {
    times: Vec<NaiveDateTime>,
    columns: Vec<(String, Vec<f64>)>,
}

impl BoundaryTable {
    /// The timestamps of the rows
    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    /// The values of a column. Names are matched case-insensitively.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(column, _)| UniCase::new(column.as_str()) == UniCase::new(name))
            .map(|(_, values)| values.as_slice())
    }
}

/// Find the index of a column by name, ignoring case
fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|header| UniCase::new(header.trim()) == UniCase::new(name))
        .with_context(|| format!("Column {name} not found"))
}

/// Read the given columns from a boundary input file.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
/// * `time_column` - Name of the timestamp column
/// * `columns` - Names of the value columns to read. Other columns are ignored.
pub fn read_boundary_table(
    file_path: &Path,
    time_column: &str,
    columns: &[&str],
) -> Result<BoundaryTable> {
    let read = || -> Result<BoundaryTable> {
        let mut reader = csv::Reader::from_path(file_path)?;
        let headers = reader.headers()?.clone();
        let time_index = column_index(&headers, time_column)?;
        let indices: Vec<_> = columns
            .iter()
            .map(|name| column_index(&headers, name))
            .try_collect()?;

        let mut times = Vec::new();
        let mut values = vec![Vec::new(); columns.len()];
        for record in reader.records() {
            let record = record?;
            times.push(parse_datetime(record.get(time_index).unwrap_or(""))?);

            for (index, (column, name)) in indices.iter().zip(columns).enumerate() {
                let value = record.get(*column).unwrap_or("").trim();
                let value: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid value '{value}' in column {name}"))?;
                values[index].push(value);
            }
        }
        ensure!(!times.is_empty(), "CSV file cannot be empty");

        Ok(BoundaryTable {
            times,
            columns: columns.iter().map(ToString::to_string).zip(values).collect(),
        })
    };

    read().with_context(|| input_err_msg(file_path))
}

/// Build the discharge records for every configured branch from the run's boundary inputs.
///
/// Negative inflows are clamped to zero.
///
/// # Returns
///
/// The records for each discharge slot, in the order the branches are configured.
pub fn read_boundary_conditions(
    config: &Config,
    run_id: &RunID,
) -> Result<Vec<(usize, Vec<DischargeRecord>)>> {
    let boundary = &config.boundary;
    let names = boundary.branches.iter().map(|b| b.name.as_str()).collect_vec();

    let (inflow_path, pollution_path) = config.boundary_files(run_id);
    let inflows = read_boundary_table(&inflow_path, &boundary.time_column, &names)?;
    let pollution = read_boundary_table(&pollution_path, &boundary.time_column, &names)?;
    ensure!(
        inflows.times() == pollution.times(),
        "Timestamps in {} do not match those in {}",
        inflow_path.display(),
        pollution_path.display()
    );

    let minutes = inflows
        .times()
        .iter()
        .map(|time| config.minutes_since_reference(*time))
        .collect_vec();

    let mut conditions = Vec::new();
    for branch in &boundary.branches {
        // Both tables were read with these columns
        let (Some(flows), Some(concentrations)) =
            (inflows.column(&branch.name), pollution.column(&branch.name))
        else {
            bail!("Branch {} missing from boundary inputs", branch.name);
        };

        let records = itertools::izip!(&minutes, flows, concentrations)
            .map(|(minutes, flow, concentration)| DischargeRecord {
                minutes: *minutes,
                flow: CubicMetresPerSecond(*flow).non_negative(),
                concentration: *concentration,
            })
            .collect();
        conditions.push((branch.slot, records));
    }

    Ok(conditions)
}
