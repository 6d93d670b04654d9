//! The solver's control file (`.mdf`), a list of `Key = value` entries.
//!
//! Only the values of existing keys are changed; everything else in the template, including
//! comments, key padding and entry order, is written back unchanged.
use crate::input::input_err_msg;
use anyhow::{Context, Result, bail};
use itertools::Itertools;
use std::fmt::{self, Write};
use std::fs;
use std::path::Path;
use unicase::UniCase;

/// Format a number the way the solver writes them (e.g. `1.4400000e+003`)
pub fn format_scientific(value: f64) -> String {
    let formatted = format!("{value:.7e}");
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        // inf and NaN have no exponent
        return formatted;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return formatted;
    };

    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:03}", exponent.abs())
}

/// A value in the control file
#[derive(PartialEq, Debug, Clone)]
pub enum ControlValue {
    /// A string, written between `#` delimiters
    Text(String),
    /// A single number
    Number(f64),
    /// A list of numbers separated by spaces
    Numbers(Vec<f64>),
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "#{s}#"),
            Self::Number(x) => write!(f, " {}", format_scientific(*x)),
            Self::Numbers(xs) => {
                write!(f, " {}", xs.iter().map(|x| format_scientific(*x)).join(" "))
            }
        }
    }
}

/// An entry in the control file
#[derive(PartialEq, Debug, Clone)]
struct Entry {
    /// The key as written, including any padding
    raw_key: String,
    /// The value as written
    value: String,
    /// Continuation lines for multi-line values
    continuation: Vec<String>,
}

impl Entry {
    fn key(&self) -> UniCase<&str> {
        UniCase::new(self.raw_key.trim())
    }
}

/// A line of the control file
#[derive(PartialEq, Debug, Clone)]
enum Line {
    Entry(Entry),
    /// Any line before the first entry
    Other(String),
}

/// The contents of a control file
#[derive(PartialEq, Debug, Clone)]
pub struct ControlFile {
    lines: Vec<Line>,
}

impl ControlFile {
    /// Parse the contents of a control file
    pub fn parse(contents: &str) -> Self {
        let mut lines = Vec::new();
        for line in contents.lines() {
            if let Some((raw_key, value)) = line.split_once('=') {
                lines.push(Line::Entry(Entry {
                    raw_key: raw_key.to_string(),
                    value: value.to_string(),
                    continuation: Vec::new(),
                }));
            } else if let Some(Line::Entry(entry)) = lines.last_mut() {
                entry.continuation.push(line.to_string());
            } else {
                lines.push(Line::Other(line.to_string()));
            }
        }

        Self { lines }
    }

    /// Read a control file from disk
    pub fn from_path(file_path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
        Ok(Self::parse(&contents))
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut Entry> {
        let key = UniCase::new(key);
        self.lines.iter_mut().find_map(|line| match line {
            Line::Entry(entry) if entry.key() == key => Some(entry),
            _ => None,
        })
    }

    /// Get the raw value for a key (keys are case-insensitive)
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = UniCase::new(key);
        self.lines.iter().find_map(|line| match line {
            Line::Entry(entry) if entry.key() == key => Some(entry.value.as_str()),
            _ => None,
        })
    }

    /// Set the value for an existing key.
    ///
    /// It is an error if the key is not present in the file.
    pub fn set(&mut self, key: &str, value: &ControlValue) -> Result<()> {
        let Some(entry) = self.entry_mut(key) else {
            bail!("Key {key} not found in control file");
        };
        entry.value = value.to_string();
        entry.continuation.clear();

        Ok(())
    }

    /// Set several values at once
    pub fn set_all<'a, I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, ControlValue)>,
    {
        for (key, value) in values {
            self.set(key, &value)?;
        }

        Ok(())
    }
}

impl fmt::Display for ControlFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Other(text) => writeln!(out, "{text}")?,
                Line::Entry(entry) => {
                    writeln!(out, "{}={}", entry.raw_key, entry.value)?;
                    for text in &entry.continuation {
                        writeln!(out, "{text}")?;
                    }
                }
            }
        }

        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use rstest::rstest;

    const TEMPLATE: &str = "Ident  = #Delft3D-FLOW 3.59.01.57433#
Runtxt = #River model    #
         #second line    #
Itdate = #2018-06-01#
Tstart =  0.0000000e+000
Flmap  =  0.0000000e+000 10 1.4400000e+003
Fildis = #river.dis#
";

    #[rstest]
    #[case(1440.0, "1.4400000e+003")]
    #[case(0.0, "0.0000000e+000")]
    #[case(2.929_358e-2, "2.9293580e-002")]
    #[case(-24.29591, "-2.4295910e+001")]
    fn test_format_scientific(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(format_scientific(value), expected);
    }

    #[test]
    fn test_round_trip_unchanged() {
        assert_eq!(ControlFile::parse(TEMPLATE).to_string(), TEMPLATE);
    }

    #[test]
    fn test_set() {
        let mut control = ControlFile::parse(TEMPLATE);
        control
            .set_all([
                ("itdate", ControlValue::Text("2019-01-01".into())),
                ("Tstart", ControlValue::Number(60.0)),
                ("Flmap", ControlValue::Numbers(vec![60.0, 10.0, 1440.0])),
                ("Runtxt", ControlValue::Text("Run".into())),
            ])
            .unwrap();

        assert_eq!(control.get("Itdate"), Some("#2019-01-01#"));
        assert_eq!(control.get("TSTART"), Some(" 6.0000000e+001"));
        assert_eq!(
            control.to_string(),
            "Ident  = #Delft3D-FLOW 3.59.01.57433#
Runtxt =#Run#
Itdate =#2019-01-01#
Tstart = 6.0000000e+001
Flmap  = 6.0000000e+001 1.0000000e+001 1.4400000e+003
Fildis = #river.dis#
"
        );
    }

    #[test]
    fn test_set_missing_key() {
        let mut control = ControlFile::parse(TEMPLATE);
        assert_error!(
            control.set("Zeta0", &ControlValue::Number(1.0)),
            "Key Zeta0 not found in control file"
        );
    }
}
