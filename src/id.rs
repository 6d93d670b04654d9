//! Code for handling IDs
use anyhow::{Result, ensure};
use std::fmt::Display;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            std::hash::Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            serde::Deserialize,
            Debug,
            serde::Serialize,
        )]
        /// An ID type (e.g. `PointID`, `RunID`, etc.)
        pub struct $name(pub std::sync::Arc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(std::sync::Arc::from(id))
            }

            /// The ID as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id_type! {PointID}
define_id_type! {RunID}

/// The run ID passed by the optimiser to mark a candidate that cannot be evaluated
const INVALID_RUN_MARKER: &str = "-1";

impl RunID {
    /// Create a run ID, checking that it can be embedded in file names
    pub fn parse(id: &str) -> Result<Self> {
        ensure!(!id.is_empty(), "Run ID cannot be empty");
        ensure!(
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "Invalid run ID '{id}': only ASCII letters, digits, '-' and '_' are allowed"
        );

        Ok(Self::new(id))
    }

    /// Whether this ID marks a candidate which the optimiser knows is invalid
    pub fn is_invalid_marker(&self) -> bool {
        self.as_str() == INVALID_RUN_MARKER
    }
}

impl std::str::FromStr for RunID {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Build a file name for a per-run artefact, in the form `<base>_<run_id>.<ext>`
pub fn run_file_name(base: &str, run_id: &RunID, ext: impl Display) -> String {
    format!("{base}_{run_id}.{ext}")
}

/// Whether `file_name` is output the solver wrote for the given run.
///
/// The solver names its output after the run's control file, e.g. `trih-river_3.nc` or
/// `tri-diag.river_3` for base name `river`. `<base>_<run_id>` must therefore start the name or
/// follow a `-` or `.`, and be followed by a `.` or the end of the name. A following `_` is not
/// accepted: run IDs may contain `_`, and run `3` must not claim the files of run `3_b`.
pub fn is_run_output(file_name: &str, base: &str, run_id: &RunID) -> bool {
    let stem = format!("{base}_{run_id}");
    file_name.match_indices(&stem).any(|(start, _)| {
        let preceded = file_name[..start]
            .chars()
            .next_back()
            .is_none_or(|c| c == '-' || c == '.');
        let rest = &file_name[start + stem.len()..];

        preceded && (rest.is_empty() || rest.starts_with('.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use rstest::rstest;

    #[rstest]
    #[case("17")]
    #[case("-1")]
    #[case("run_a-3")]
    fn test_run_id_parse_valid(#[case] id: &str) {
        assert_eq!(RunID::parse(id).unwrap().as_str(), id);
    }

    #[test]
    fn test_run_id_parse_invalid() {
        assert_error!(RunID::parse(""), "Run ID cannot be empty");
        assert_error!(
            RunID::parse("../x"),
            "Invalid run ID '../x': only ASCII letters, digits, '-' and '_' are allowed"
        );
    }

    #[test]
    fn test_is_invalid_marker() {
        assert!(RunID::new("-1").is_invalid_marker());
        assert!(!RunID::new("1").is_invalid_marker());
    }

    #[test]
    fn test_run_file_name() {
        assert_eq!(run_file_name("river", &"42".into(), "mdf"), "river_42.mdf");
    }

    #[rstest]
    #[case("river_12.mdf", "12", true)]
    #[case("river_12.dis", "12", true)]
    #[case("trih-river_12.nc", "12", true)]
    #[case("tri-diag.river_12", "12", true)]
    #[case("river_run_a-3.mdf", "run_a-3", true)]
    #[case("river_12.mdf", "1", false)]
    #[case("river_121.mdf", "12", false)]
    #[case("river_3_b.mdf", "3", false)]
    #[case("myriver_3.nc", "3", false)]
    #[case("river.mdf", "1", false)]
    #[case("config_d_hydro.xml", "hydro", false)]
    #[case("Link_7_ds_flow.csv", "ds", false)]
    fn test_is_run_output(#[case] file_name: &str, #[case] id: &str, #[case] expected: bool) {
        assert_eq!(is_run_output(file_name, "river", &id.into()), expected);
    }
}
