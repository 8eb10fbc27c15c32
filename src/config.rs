//! Defines the `AnalysisConfig` struct, which represents the contents of `analysis.toml`.
//!
//! The configuration is an immutable value which is handed to the decoder, the model builder and
//! the aggregation functions, so several instances can be analysed with different schemas at the
//! same time.
use crate::input::{deserialise_tolerance, input_err_msg, read_toml};
use crate::technology::{CategoryTable, DEFAULT_TECHNOLOGIES, TechnologyID};
use crate::variable::VariableKind;
use anyhow::{Context, Result, ensure};
use indexmap::IndexSet;
use itertools::Itertools;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;

const ANALYSIS_CONFIG_FILE_NAME: &str = "analysis.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_delimiter, char, '_');
define_param_default!(default_installation_tolerance, f64, 1e-3);
define_param_default!(default_period_base, u32, 0);

fn default_technologies() -> IndexSet<TechnologyID> {
    DEFAULT_TECHNOLOGIES.iter().map(|&t| t.into()).collect()
}

fn default_prefixes() -> Vec<PrefixRule> {
    vec![
        PrefixRule::fixed("X_in", VariableKind::Installation),
        PrefixRule::fixed("X_out", VariableKind::Removal),
        PrefixRule::fixed("E_in", VariableKind::EnergyCapacity),
        PrefixRule::fixed("C_dep", VariableKind::Depreciation),
        PrefixRule::fixed("C_rent", VariableKind::RentCost),
        PrefixRule::fixed("C_en", VariableKind::EnergyCost),
        PrefixRule::fixed("Q", VariableKind::Equity),
        PrefixRule::fixed("D", VariableKind::Debt),
        PrefixRule::fixed("L", VariableKind::Liquidity),
        PrefixRule::labelled("P", VariableKind::PowerFlow),
        PrefixRule::labelled("Q", VariableKind::AuxiliaryFlow),
    ]
}

/// How the solution reader treats variable names which cannot be decoded
#[derive(DeserializeLabeledStringEnum, Debug, PartialEq, Eq, Default, Clone, Copy)]
pub enum Strictness {
    /// Keep undecoded variables as assignments of unknown kind, for diagnostics
    #[default]
    #[string = "permissive"]
    Permissive,
    /// Reject lines whose variable name cannot be decoded
    #[string = "strict"]
    Strict,
}

/// Associates a variable name prefix with a kind of variable.
///
/// The prefix is written with the configured delimiter between its fields (e.g. `X_in`). A
/// labelled prefix is followed by one extra field naming the flow (e.g. `P_in_...`, `P_el_...`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrefixRule {
    /// The leading fields of the variable name
    pub prefix: String,
    /// The kind of variable the prefix denotes
    pub kind: VariableKind,
    /// Whether the prefix is followed by a flow label field
    #[serde(default)]
    pub labelled: bool,
}

impl PrefixRule {
    /// A prefix with no label field
    pub fn fixed(prefix: &str, kind: VariableKind) -> Self {
        Self {
            prefix: prefix.to_string(),
            kind,
            labelled: false,
        }
    }

    /// A prefix followed by a flow label field
    pub fn labelled(prefix: &str, kind: VariableKind) -> Self {
        Self {
            prefix: prefix.to_string(),
            kind,
            labelled: true,
        }
    }
}

/// Represents the contents of the analysis configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisConfig {
    /// The character separating the fields of a variable name
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// How far below 1 a binary decision may be and still count as taken
    #[serde(default = "default_installation_tolerance")]
    #[serde(deserialize_with = "deserialise_tolerance")]
    pub installation_tolerance: f64,
    /// Whether undecodable variable names are rejected by the reader
    #[serde(default)]
    pub strictness: Strictness,
    /// The index of the first period (usually 0 or 1)
    #[serde(default = "default_period_base")]
    pub period_base: u32,
    /// Technology names which contain the delimiter
    #[serde(default = "default_technologies")]
    pub technologies: IndexSet<TechnologyID>,
    /// Recognised variable name prefixes
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<PrefixRule>,
    /// Grouping of technologies into categories
    #[serde(default)]
    pub categories: CategoryTable,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            installation_tolerance: default_installation_tolerance(),
            strictness: Strictness::default(),
            period_base: default_period_base(),
            technologies: default_technologies(),
            prefixes: default_prefixes(),
            categories: CategoryTable::default(),
        }
    }
}

/// Check that the `delimiter` parameter is valid
fn check_delimiter(delimiter: char) -> Result<()> {
    ensure!(
        !delimiter.is_whitespace(),
        "delimiter cannot be a whitespace character"
    );

    Ok(())
}

/// Check that the `prefixes` parameter is valid
fn check_prefixes(prefixes: &[PrefixRule], delimiter: char) -> Result<()> {
    ensure!(!prefixes.is_empty(), "prefixes cannot be empty");

    for rule in prefixes {
        ensure!(
            rule.kind != VariableKind::Unknown,
            "Prefix {} cannot map to the unknown kind",
            rule.prefix
        );
        ensure!(
            rule.prefix.split(delimiter).all(|field| !field.is_empty()),
            "Prefix {} contains an empty field",
            rule.prefix
        );
        ensure!(
            !rule.labelled || rule.kind.is_flow(),
            "Only flow prefixes can be labelled (prefix {})",
            rule.prefix
        );
    }

    let duplicates = prefixes
        .iter()
        .map(|rule| (&rule.prefix, rule.labelled))
        .duplicates()
        .collect_vec();
    ensure!(
        duplicates.is_empty(),
        "Prefix {} defined more than once",
        duplicates.first().map_or("", |(prefix, _)| prefix.as_str())
    );

    Ok(())
}

impl AnalysisConfig {
    /// Read the analysis configuration from the specified instance directory.
    ///
    /// If the file is not present, default values will be used.
    ///
    /// # Arguments
    ///
    /// * `instance_dir` - Folder containing the instance's configuration files
    ///
    /// # Returns
    ///
    /// The configuration as an [`AnalysisConfig`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(instance_dir: P) -> Result<AnalysisConfig> {
        let file_path = instance_dir.as_ref().join(ANALYSIS_CONFIG_FILE_NAME);
        if !file_path.is_file() {
            return Ok(AnalysisConfig::default());
        }

        let config: AnalysisConfig = read_toml(&file_path)?;
        config
            .validate()
            .with_context(|| input_err_msg(&file_path))?;

        Ok(config)
    }

    /// Validate parameters after reading in file
    pub fn validate(&self) -> Result<()> {
        check_delimiter(self.delimiter)?;
        check_prefixes(&self.prefixes, self.delimiter)?;

        // installation_tolerance already validated with deserialise_tolerance

        Ok(())
    }

    /// The smallest value of a binary decision variable which counts as the decision being taken
    pub fn decision_threshold(&self) -> f64 {
        1.0 - self.installation_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_from_path_no_file() {
        let dir = tempdir().unwrap();
        assert_eq!(
            AnalysisConfig::from_path(dir.path()).unwrap(),
            AnalysisConfig::default()
        );
    }

    #[test]
    fn test_from_path() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(ANALYSIS_CONFIG_FILE_NAME)).unwrap();
            writeln!(
                file,
                "installation_tolerance = 0.5
strictness = \"strict\"
period_base = 1
technologies = [\"hp_air\"]

[[prefixes]]
prefix = \"X_in\"
kind = \"installation\"

[[prefixes]]
prefix = \"F\"
kind = \"power_flow\"
labelled = true

[categories]
heating = [\"hp\"]
envelope = [\"wall\"]"
            )
            .unwrap();
        }

        let config = AnalysisConfig::from_path(dir.path()).unwrap();
        assert_eq!(config.delimiter, '_');
        assert_eq!(config.installation_tolerance, 0.5);
        assert_eq!(config.decision_threshold(), 0.5);
        assert_eq!(config.strictness, Strictness::Strict);
        assert_eq!(config.period_base, 1);
        assert_eq!(config.technologies.len(), 1);
        assert_eq!(
            config.prefixes,
            [
                PrefixRule::fixed("X_in", VariableKind::Installation),
                PrefixRule::labelled("F", VariableKind::PowerFlow)
            ]
        );
        assert_eq!(config.categories.categorise("hp_air"), "heating".into());
        assert_eq!(
            config
                .categories
                .categories()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            ["heating", "envelope"]
        );
    }

    #[test]
    fn test_from_path_invalid_tolerance() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(ANALYSIS_CONFIG_FILE_NAME)).unwrap();
            writeln!(file, "installation_tolerance = 1.5").unwrap();
        }

        assert!(AnalysisConfig::from_path(dir.path()).is_err());
    }

    #[test]
    fn test_check_delimiter() {
        assert!(check_delimiter('_').is_ok());
        assert!(check_delimiter('.').is_ok());
        assert!(check_delimiter(' ').is_err());
        assert!(check_delimiter('\t').is_err());
    }

    #[test]
    fn test_check_prefixes() {
        assert!(check_prefixes(&default_prefixes(), '_').is_ok());
        assert_error!(check_prefixes(&[], '_'), "prefixes cannot be empty");
        assert_error!(
            check_prefixes(
                &[
                    PrefixRule::fixed("X_in", VariableKind::Installation),
                    PrefixRule::fixed("X_in", VariableKind::Removal)
                ],
                '_'
            ),
            "Prefix X_in defined more than once"
        );
        assert_error!(
            check_prefixes(&[PrefixRule::fixed("X__in", VariableKind::Installation)], '_'),
            "Prefix X__in contains an empty field"
        );
        assert_error!(
            check_prefixes(&[PrefixRule::labelled("X", VariableKind::Installation)], '_'),
            "Only flow prefixes can be labelled (prefix X)"
        );
        assert_error!(
            check_prefixes(&[PrefixRule::fixed("U", VariableKind::Unknown)], '_'),
            "Prefix U cannot map to the unknown kind"
        );
    }
}
