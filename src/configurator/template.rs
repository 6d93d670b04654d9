//! Line-based substitution into plain text templates (job configuration, launch script).
use crate::input::input_err_msg;
use anyhow::{Context, Result, ensure};
use std::fs;
use std::path::Path;

/// A change to make to a template
#[derive(PartialEq, Debug, Clone)]
pub enum Substitution {
    /// Replace every line containing `marker` with `line`, keeping the original indentation
    Line {
        /// Text identifying the line(s) to replace
        marker: String,
        /// The new line contents
        line: String,
        /// Whether it is an error for no line to contain the marker
        required: bool,
    },
    /// Replace `from` with `to` in the first line containing it
    Text {
        /// The text to replace
        from: String,
        /// Its replacement
        to: String,
    },
}

impl Substitution {
    /// Replace a whole line containing `marker`, failing if there is none
    pub fn line(marker: &str, line: &str) -> Self {
        Self::Line {
            marker: marker.to_string(),
            line: line.to_string(),
            required: true,
        }
    }

    /// Like [`Substitution::line`], but a template without the marker is left unchanged
    pub fn optional_line(marker: &str, line: &str) -> Self {
        Self::Line {
            marker: marker.to_string(),
            line: line.to_string(),
            required: false,
        }
    }

    /// Replace the first occurrence of `from`
    pub fn text(from: &str, to: &str) -> Self {
        Self::Text {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Apply to `lines`, returning whether anything was changed
    fn apply(&self, lines: &mut [String]) -> bool {
        match self {
            Self::Line { marker, line, .. } => {
                let mut found = false;
                for current in lines.iter_mut().filter(|l| l.contains(marker.as_str())) {
                    let indent_len = current.len() - current.trim_start().len();
                    *current = format!("{}{line}", &current[..indent_len]);
                    found = true;
                }
                found
            }
            Self::Text { from, to } => {
                match lines.iter_mut().find(|l| l.contains(from.as_str())) {
                    Some(current) => {
                        *current = current.replacen(from.as_str(), to, 1);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    fn is_required(&self) -> bool {
        match self {
            Self::Line { required, .. } => *required,
            Self::Text { .. } => true,
        }
    }

    fn target(&self) -> &str {
        match self {
            Self::Line { marker, .. } => marker,
            Self::Text { from, .. } => from,
        }
    }
}

/// A text file into which run-specific values are substituted
#[derive(PartialEq, Debug, Clone)]
pub struct TextTemplate {
    name: String,
    contents: String,
}

impl TextTemplate {
    /// Create a template from its contents. `name` is used in error messages.
    pub fn new(name: &str, contents: &str) -> Self {
        Self {
            name: name.to_string(),
            contents: contents.to_string(),
        }
    }

    /// Read a template from disk
    pub fn from_path(file_path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
        Ok(Self::new(&file_path.display().to_string(), &contents))
    }

    /// Apply the substitutions in order and return the result.
    ///
    /// Line endings of the template are preserved. A required substitution which matches
    /// nothing means the template is not what we expect, so it is an error.
    pub fn render(&self, substitutions: &[Substitution]) -> Result<String> {
        let newline = if self.contents.contains("\r\n") {
            "\r\n"
        } else {
            "\n"
        };
        let mut lines: Vec<String> = self.contents.lines().map(str::to_string).collect();

        for substitution in substitutions {
            let found = substitution.apply(&mut lines);
            ensure!(
                found || !substitution.is_required(),
                "Field '{}' not found in template {}",
                substitution.target(),
                self.name
            );
        }

        let mut rendered = lines.join(newline);
        if self.contents.ends_with('\n') {
            rendered.push_str(newline);
        }

        Ok(rendered)
    }
}
