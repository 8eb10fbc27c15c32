//! Common routines for handling input data.
use anyhow::{Context, Result};
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use std::fs;
use std::path::Path;

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Read the full contents of a text file.
///
/// Failing to open or read the file is an error. Interpreting its contents is up to the caller.
pub fn read_text_file(file_path: &Path) -> Result<String> {
    fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))
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
    let toml_str = read_text_file(file_path)?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Read an f64, checking that it is in the range [0, 1)
pub fn deserialise_tolerance<'de, D>(deserialiser: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Deserialize::deserialize(deserialiser)?;
    if !(0.0..1.0).contains(&value) {
        Err(serde::de::Error::custom(
            "Value must be at least 0 and less than 1",
        ))?;
    }

    Ok(value)
}

/// Count the occurrences of `needle` outside of double-quoted sections of `line`
fn count_unquoted(line: &str, needle: char) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == needle && !in_quotes {
            count += 1;
        }
    }

    count
}

/// Choose a CSV delimiter by inspecting the header line.
///
/// Whichever of `,` and `;` occurs more often in the header wins. Ties go to `preferred`.
pub fn sniff_delimiter(contents: &str, preferred: u8) -> u8 {
    let header = contents.lines().next().unwrap_or_default();
    let commas = count_unquoted(header, ',');
    let semicolons = count_unquoted(header, ';');
    match commas.cmp(&semicolons) {
        std::cmp::Ordering::Greater => b',',
        std::cmp::Ordering::Less => b';',
        std::cmp::Ordering::Equal => preferred,
    }
}
