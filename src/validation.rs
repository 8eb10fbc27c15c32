//! Checks that an instance provides the files and columns needed for analysis.
//!
//! The files and columns which are required are data ([`RequiredSchema`]), so the schema can be
//! extended without changing the validator.
use crate::input::read_toml;
use crate::instance::{ConfigTable, ConfigTableKind, InstanceDescriptor};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A configuration table which must be present, with the columns it must provide
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequiredFile {
    /// The table which is required
    pub table: ConfigTableKind,
    /// Required column names (or dotted key paths for structured tables)
    #[serde(default)]
    pub columns: Vec<String>,
}

/// The files and columns an instance must provide
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequiredSchema {
    /// The required files
    pub files: Vec<RequiredFile>,
}

impl RequiredSchema {
    /// Read a schema from a TOML file
    pub fn from_path(file_path: &Path) -> Result<Self> {
        read_toml(file_path)
    }
}

impl Default for RequiredSchema {
    fn default() -> Self {
        let required = |table, columns: &[&str]| RequiredFile {
            table,
            columns: columns.iter().map(ToString::to_string).collect(),
        };

        Self {
            files: vec![
                required(
                    ConfigTableKind::StockProperties,
                    &[
                        "id",
                        "type",
                        "year",
                        "location",
                        "region",
                        "num",
                        "area",
                        "num_floors",
                        "num_flats",
                        "persons_per_apartment",
                    ],
                ),
                required(
                    ConfigTableKind::FinancialProperties,
                    &[
                        "id",
                        "c_comp",
                        "c_comp_increase",
                        "rent-1",
                        "rent-2",
                        "rent-3",
                        "cap_rent",
                        "cap_warm_rent",
                        "En_Gas_cost",
                        "En_HP_cost",
                        "En_El_cost",
                    ],
                ),
                required(ConfigTableKind::BuildingConstraints, &["id"]),
                required(
                    ConfigTableKind::GeneralFinances,
                    &["equity.initial_equity", "liabilities.initial_liabilities"],
                ),
            ],
        }
    }
}

/// The outcome of validating an instance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Required tables which were not found (or could not be parsed)
    pub missing_files: BTreeSet<ConfigTableKind>,
    /// Required columns absent from tables which were found
    pub missing_columns: BTreeMap<ConfigTableKind, BTreeSet<String>>,
    /// Tables whose contents could not be parsed, with the reason
    pub unreadable: BTreeMap<ConfigTableKind, String>,
    /// Whether a solution was found
    pub has_solution: bool,
}

impl ValidationReport {
    /// Whether all required files and columns are present.
    ///
    /// The presence of a solution does not affect validity.
    pub fn is_valid(&self) -> bool {
        self.missing_files.is_empty() && self.missing_columns.is_empty()
    }
}

/// Check an instance against a schema of required files and columns.
///
/// This never fails: all problems are reported in the returned [`ValidationReport`]. An unreadable
/// table counts as missing if it is required.
pub fn validate_instance(
    descriptor: &InstanceDescriptor,
    schema: &RequiredSchema,
) -> ValidationReport {
    let mut report = ValidationReport {
        has_solution: descriptor.solution_path.is_some() || descriptor.solution.is_some(),
        ..ValidationReport::default()
    };

    for (&kind, table) in &descriptor.tables {
        if let ConfigTable::Unreadable(reason) = table {
            report.unreadable.insert(kind, reason.clone());
        }
    }

    for required in &schema.files {
        let table = match descriptor.table(required.table) {
            None | Some(ConfigTable::Unreadable(_)) => {
                report.missing_files.insert(required.table);
                continue;
            }
            Some(table) => table,
        };

        let missing: BTreeSet<_> = required
            .columns
            .iter()
            .filter(|column| !table.has_column(column))
            .cloned()
            .collect();
        if !missing.is_empty() {
            report
                .missing_columns
                .entry(required.table)
                .or_default()
                .extend(missing);
        }
    }

    report
}
