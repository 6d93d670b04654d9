//! Common routines for handling input data.
use anyhow::{Context, Result, ensure};
use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::de::{Deserialize, DeserializeOwned, Deserializer, Error};
use std::fs;
use std::path::Path;

/// The format used for date-times in all input files
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Read a series of type `T`s from a CSV file.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
///
/// # Returns
///
/// The records in the file or an error if the file is missing, invalid or empty.
pub fn read_csv<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(file_path).with_context(|| input_err_msg(file_path))?;

    let records: Vec<T> = reader
        .deserialize()
        .try_collect()
        .with_context(|| input_err_msg(file_path))?;
    ensure!(
        !records.is_empty(),
        "{}: CSV file cannot be empty",
        input_err_msg(file_path)
    );

    Ok(records)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Parse a date-time string in the format used by input files
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT)
        .with_context(|| format!("Invalid date-time '{s}': expected format {DATETIME_FORMAT}"))
}

/// Read a date-time in the format used by input files
pub fn deserialise_datetime<'de, D>(deserialiser: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let value: String = Deserialize::deserialize(deserialiser)?;
    parse_datetime(&value).map_err(|err| D::Error::custom(format!("{err:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use chrono::NaiveDate;
    use serde::Deserialize;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Record {
        id: String,
        value: u32,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Timed {
        #[serde(deserialize_with = "deserialise_datetime")]
        time: NaiveDateTime,
    }

    /// Create an example CSV file in dir_path
    fn create_csv_file(dir_path: &Path, contents: &str) -> std::path::PathBuf {
        let file_path = dir_path.join("test.csv");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{contents}").unwrap();
        file_path
    }

    #[test]
    fn test_read_csv() {
        let dir = tempdir().unwrap();
        let file_path = create_csv_file(dir.path(), "id,value\nhello,1\nworld,2\n");
        let records: Vec<Record> = read_csv(&file_path).unwrap();
        assert_eq!(
            records,
            &[
                Record {
                    id: "hello".to_string(),
                    value: 1,
                },
                Record {
                    id: "world".to_string(),
                    value: 2,
                }
            ]
        );

        // File with no data (only column headers)
        let file_path = create_csv_file(dir.path(), "id,value\n");
        assert!(read_csv::<Record>(&file_path).is_err());
    }

    #[test]
    fn test_read_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.toml");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "id = \"hello\"\nvalue = 1").unwrap();
        }

        assert_eq!(
            read_toml::<Record>(&file_path).unwrap(),
            Record {
                id: "hello".to_string(),
                value: 1,
            }
        );

        // Missing file
        assert!(read_toml::<Record>(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_parse_datetime() {
        assert_eq!(
            parse_datetime(" 2019-01-01 06:30:00 ").unwrap(),
            NaiveDate::from_ymd_opt(2019, 1, 1)
                .unwrap()
                .and_hms_opt(6, 30, 0)
                .unwrap()
        );
        assert_error!(
            parse_datetime("2019/01/01"),
            "Invalid date-time '2019/01/01': expected format %Y-%m-%d %H:%M:%S"
        );
    }

    #[test]
    fn test_deserialise_datetime() {
        let timed: Timed = toml::from_str("time = \"2019-01-02 00:00:00\"").unwrap();
        assert_eq!(
            timed.time,
            NaiveDate::from_ymd_opt(2019, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert!(toml::from_str::<Timed>("time = \"yesterday\"").is_err());
    }
}
