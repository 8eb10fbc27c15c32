//! Streaming reader for solver solution files.
//!
//! Each line of a solution file holds a variable name and its value separated by whitespace.
//! Comment lines start with `#`; one of them usually carries the objective value. The reader yields
//! exactly one [`SolutionLine`] per input line, so the number of assignments plus the number of
//! rejected lines always equals the number of lines in the file.
use crate::config::{AnalysisConfig, Strictness};
use crate::input::input_err_msg;
use crate::variable::{Decoder, VariableToken};
use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A decoded variable paired with its value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    /// The decoded variable name
    pub token: VariableToken,
    /// The variable's value in the solution (always finite)
    pub value: f64,
}

/// Why a line of a solution file did not yield an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    /// The line is empty or whitespace
    Blank,
    /// The line is a comment
    Comment,
    /// The line is not valid UTF-8 or does not have exactly two fields
    Malformed,
    /// The value could not be parsed as a number
    InvalidValue,
    /// The value is infinite or NaN
    NonFinite,
    /// The variable name could not be decoded (strict mode only)
    UnknownVariable,
}

/// A line of a solution file which did not yield an assignment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedLine {
    /// One-based line number in the file
    pub line_number: usize,
    /// The line as it appeared in the file
    pub raw: String,
    /// Why the line was rejected
    pub reason: RejectReason,
}

/// The outcome of reading one line of a solution file
#[derive(Debug, Clone, PartialEq)]
pub enum SolutionLine {
    /// The line held a variable and its value
    Assignment(Assignment),
    /// The line could not be used
    Rejected(RejectedLine),
}

/// Extract the objective value from a comment line such as `# Objective value = 1234.5`
pub fn parse_objective_value(line: &str) -> Option<f64> {
    let comment = line.trim().strip_prefix('#')?;
    let (key, value) = comment.split_once('=')?;
    if !key.trim().eq_ignore_ascii_case("objective value") {
        return None;
    }

    value.trim().parse().ok().filter(|value: &f64| value.is_finite())
}

/// A lazy, consume-once iterator over the lines of a solution file.
///
/// An I/O error part way through the input is yielded as an `Err` item. The reader can be dropped
/// at any point.
pub struct SolutionReader<R> {
    lines: std::io::Split<R>,
    decoder: Decoder,
    strictness: Strictness,
    line_number: usize,
}

impl<R: BufRead> SolutionReader<R> {
    /// Create a reader over `reader`, decoding variable names according to `config`
    pub fn new(reader: R, config: &AnalysisConfig) -> Self {
        Self {
            lines: reader.split(b'\n'),
            decoder: Decoder::new(config),
            strictness: config.strictness,
            line_number: 0,
        }
    }

    fn parse_line(&self, bytes: Vec<u8>) -> SolutionLine {
        let line_number = self.line_number;
        let reject = |raw: String, reason| {
            SolutionLine::Rejected(RejectedLine {
                line_number,
                raw,
                reason,
            })
        };

        let raw = match String::from_utf8(bytes) {
            Ok(mut raw) => {
                if raw.ends_with('\r') {
                    raw.pop();
                }
                raw
            }
            Err(err) => {
                let raw = String::from_utf8_lossy(err.as_bytes()).into_owned();
                return reject(raw, RejectReason::Malformed);
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return reject(raw, RejectReason::Blank);
        }
        if trimmed.starts_with('#') {
            return reject(raw, RejectReason::Comment);
        }

        let mut fields = trimmed.split_whitespace();
        let (Some(name), Some(value), None) = (fields.next(), fields.next(), fields.next()) else {
            return reject(raw, RejectReason::Malformed);
        };
        let Ok(value) = value.parse::<f64>() else {
            return reject(raw, RejectReason::InvalidValue);
        };
        if !value.is_finite() {
            return reject(raw, RejectReason::NonFinite);
        }

        let token = self.decoder.decode(name);
        if !token.is_known() && self.strictness == Strictness::Strict {
            return reject(raw, RejectReason::UnknownVariable);
        }

        SolutionLine::Assignment(Assignment { token, value })
    }
}

impl<R: BufRead> Iterator for SolutionReader<R> {
    type Item = Result<SolutionLine>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = match self.lines.next()? {
            Ok(bytes) => bytes,
            Err(err) => {
                return Some(Err(err).with_context(|| {
                    format!("Failed to read line {} of solution", self.line_number + 1)
                }));
            }
        };
        self.line_number += 1;

        Some(Ok(self.parse_line(bytes)))
    }
}

/// Open a solution file for streaming.
///
/// Failing to open the file is an error. Problems with the file's contents are reported per line.
pub fn read_solution_file(
    file_path: &Path,
    config: &AnalysisConfig,
) -> Result<SolutionReader<BufReader<File>>> {
    let file = File::open(file_path).with_context(|| input_err_msg(file_path))?;
    debug!("Reading solution from {}", file_path.display());

    Ok(SolutionReader::new(BufReader::new(file), config))
}

/// A fully materialised solution file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSolution {
    /// Lines which yielded an assignment, in file order
    pub assignments: Vec<Assignment>,
    /// Lines which did not yield an assignment, in file order
    pub rejects: Vec<RejectedLine>,
    /// The objective value, if a comment line carried one
    pub objective_value: Option<f64>,
    /// The number of lines read
    pub line_count: usize,
}

impl ParsedSolution {
    /// Consume a stream of solution lines, stopping at the first I/O error
    pub fn collect<I>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<SolutionLine>>,
    {
        let mut solution = Self::default();
        for line in lines {
            solution.push(line?);
        }

        Ok(solution)
    }

    /// Add a line to the solution
    fn push(&mut self, line: SolutionLine) {
        self.line_count += 1;
        match line {
            SolutionLine::Assignment(assignment) => self.assignments.push(assignment),
            SolutionLine::Rejected(rejected) => {
                if rejected.reason == RejectReason::Comment {
                    self.objective_value =
                        parse_objective_value(&rejected.raw).or(self.objective_value);
                }
                self.rejects.push(rejected);
            }
        }
    }
}
