//! Code for loading an optimisation instance: its configuration tables, metadata and solution.
use crate::building::{BuildingID, Period, Universe};
use crate::config::AnalysisConfig;
use crate::input::{read_text_file, sniff_delimiter};
use crate::solution::{ParsedSolution, read_solution_file};
use anyhow::{Context, Result, ensure};
use chrono::{DateTime, Local};
use indexmap::IndexSet;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;

/// Keys of `general_finances` which may hold the number of periods, in order of preference
const PERIOD_KEYS: [&str; 4] = ["time_periods", "num_time_periods", "periods", "time_horizon"];

/// The name of the column holding building IDs
const BUILDING_ID_COLUMN: &str = "id";

/// The configuration tables which make up an instance
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfigTableKind {
    /// Limits on what may be installed in each building
    BuildingConstraints,
    /// Costs and rents per building
    FinancialProperties,
    /// Portfolio-wide financial parameters
    GeneralFinances,
    /// Portfolio-wide caps on investments
    PortfolioCaps,
    /// Physical properties of each building
    StockProperties,
}

impl ConfigTableKind {
    /// Candidate file names for this table, in order of preference
    pub fn file_names(self) -> &'static [&'static str] {
        match self {
            Self::BuildingConstraints => &["building_constraints.csv"],
            Self::FinancialProperties => &["financial_properties.csv"],
            Self::GeneralFinances => &["general_finances.json"],
            Self::PortfolioCaps => &["portfolio_caps.json", "portfolio_caps.csv"],
            Self::StockProperties => &["stock_properties.csv"],
        }
    }

    /// The CSV delimiter to assume when the header is ambiguous
    pub fn preferred_delimiter(self) -> u8 {
        match self {
            Self::FinancialProperties => b';',
            _ => b',',
        }
    }
}

/// Resolved paths of the files belonging to one instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceFiles {
    /// The instance name
    pub name: String,
    /// The instance directory
    pub root_path: PathBuf,
    /// Paths of the configuration tables which were found
    pub tables: BTreeMap<ConfigTableKind, PathBuf>,
    /// Path of the solution file, if one was found
    pub solution: Option<PathBuf>,
}

impl InstanceFiles {
    /// Look for the files of the instance in `dir`.
    ///
    /// The solution is looked for at `results/<name>.sol` and then at `<name>.sol`, where `<name>`
    /// is the name of the directory. Subdirectories are not searched.
    pub fn resolve(dir: &Path) -> Result<Self> {
        ensure!(
            dir.is_dir(),
            "{} is not a directory",
            dir.to_string_lossy()
        );

        let name = dir
            .canonicalize()
            .with_context(|| format!("Could not resolve path {}", dir.display()))?
            .file_name()
            .map_or_else(|| "instance".to_string(), |name| name.to_string_lossy().into_owned());

        let tables = ConfigTableKind::iter()
            .filter_map(|kind| {
                kind.file_names()
                    .iter()
                    .map(|file_name| dir.join(file_name))
                    .find(|path| path.is_file())
                    .map(|path| (kind, path))
            })
            .collect();

        let solution_name = format!("{name}.sol");
        let solution = [dir.join("results").join(&solution_name), dir.join(&solution_name)]
            .into_iter()
            .find(|path| path.is_file());

        Ok(Self {
            name,
            root_path: dir.to_path_buf(),
            tables,
            solution,
        })
    }
}

/// A table of string values with named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Column names, in file order
    pub columns: Vec<String>,
    /// The rows of the table
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Iterate over the values of the named column, if present
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        let index = self.columns.iter().position(|column| column == name)?;
        Some(self.rows.iter().filter_map(move |row| row.get(index).map(String::as_str)))
    }
}

/// The parsed contents of a configuration file
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigTable {
    /// A CSV file
    Tabular(Table),
    /// A JSON file
    Structured(Value),
    /// A file whose contents could not be parsed, with the reason
    Unreadable(String),
}

impl ConfigTable {
    /// Whether the table provides the given column.
    ///
    /// For structured tables, `column` is a dotted path of keys (e.g. `equity.initial_equity`) and
    /// counts as present only if its value is neither null nor an empty string.
    pub fn has_column(&self, column: &str) -> bool {
        match self {
            Self::Tabular(table) => table.columns.iter().any(|name| name == column),
            Self::Structured(value) => {
                lookup(value, column).is_some_and(|value| !value.is_null() && value != "")
            }
            Self::Unreadable(_) => false,
        }
    }

    /// The table's rows, if it is tabular
    pub fn as_tabular(&self) -> Option<&Table> {
        match self {
            Self::Tabular(table) => Some(table),
            _ => None,
        }
    }

    /// The table's contents, if it is structured
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            _ => None,
        }
    }
}

/// Look up a dotted path of keys in a JSON value
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    value.pointer(&format!("/{}", path.replace('.', "/")))
}

/// Parse CSV data into a [`Table`]
fn parse_csv(contents: &str, delimiter: u8) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let columns = reader.headers()?.iter().map(ToString::to_string).collect();
    let rows = reader
        .records()
        .map(|record| record.map(|record| record.iter().map(ToString::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;

    Ok(Table { columns, rows })
}

/// Read a configuration table from `file_path`.
///
/// Failing to read the file is an error. Content which cannot be parsed is returned as
/// [`ConfigTable::Unreadable`].
pub fn read_config_table(kind: ConfigTableKind, file_path: &Path) -> Result<ConfigTable> {
    let contents = read_text_file(file_path)?;
    let contents = contents.trim_start_matches('\u{feff}');

    let is_json = file_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let table = if is_json {
        serde_json::from_str(contents)
            .map_or_else(|err| ConfigTable::Unreadable(err.to_string()), ConfigTable::Structured)
    } else {
        let delimiter = sniff_delimiter(contents, kind.preferred_delimiter());
        parse_csv(contents, delimiter)
            .map_or_else(|err| ConfigTable::Unreadable(format!("{err:#}")), ConfigTable::Tabular)
    };

    if let ConfigTable::Unreadable(reason) = &table {
        warn!("Could not parse {}: {reason}", file_path.display());
    }

    Ok(table)
}

/// Get the number of periods from the contents of `general_finances`.
///
/// The value may be given either as a count or as a list of periods.
fn num_periods(general_finances: &Value) -> Option<u32> {
    PERIOD_KEYS.iter().find_map(|key| match general_finances.get(key)? {
        Value::Array(periods) => u32::try_from(periods.len()).ok(),
        Value::Number(count) => count.as_u64().and_then(|count| u32::try_from(count).ok()),
        _ => None,
    })
}

/// Descriptive information about an instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceMetadata {
    /// Free-text description from `general_finances`
    pub description: Option<String>,
    /// The number of rows in `stock_properties`
    pub num_buildings: Option<usize>,
    /// The number of periods in the optimisation horizon
    pub num_periods: Option<u32>,
    /// When the instance directory was last modified
    pub modified: Option<DateTime<Local>>,
}

/// One optimisation instance, with its configuration tables and (optionally) its solution.
///
/// A descriptor is a snapshot of the instance directory and is never modified. Loading the
/// solution consumes the descriptor and returns a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceDescriptor {
    /// The instance name
    pub name: String,
    /// The instance directory
    pub root_path: PathBuf,
    /// The configuration tables which were found
    pub tables: BTreeMap<ConfigTableKind, ConfigTable>,
    /// Path of the solution file, if one was found
    pub solution_path: Option<PathBuf>,
    /// The parsed solution, once loaded
    pub solution: Option<ParsedSolution>,
    /// Descriptive information about the instance
    pub metadata: InstanceMetadata,
}

impl InstanceDescriptor {
    /// Read the configuration tables of an instance.
    ///
    /// The solution is not read until [`InstanceDescriptor::load_solution`] is called.
    pub fn load(files: &InstanceFiles) -> Result<Self> {
        info!("Loading instance {}", files.name);
        let tables = files
            .tables
            .iter()
            .map(|(&kind, path)| Ok((kind, read_config_table(kind, path)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let general_finances = tables
            .get(&ConfigTableKind::GeneralFinances)
            .and_then(ConfigTable::as_structured);
        let metadata = InstanceMetadata {
            description: general_finances
                .and_then(|value| value.get("description"))
                .and_then(Value::as_str)
                .map(ToString::to_string),
            num_buildings: tables
                .get(&ConfigTableKind::StockProperties)
                .and_then(ConfigTable::as_tabular)
                .map(|table| table.rows.len()),
            num_periods: general_finances.and_then(num_periods),
            modified: fs::metadata(&files.root_path)
                .and_then(|metadata| metadata.modified())
                .ok()
                .map(DateTime::from),
        };

        Ok(Self {
            name: files.name.clone(),
            root_path: files.root_path.clone(),
            tables,
            solution_path: files.solution.clone(),
            solution: None,
            metadata,
        })
    }

    /// Resolve and load the instance in `dir`, including its solution if present
    pub fn from_dir(dir: &Path, config: &AnalysisConfig) -> Result<Self> {
        let files = InstanceFiles::resolve(dir)?;
        Self::load(&files)?.load_solution(config)
    }

    /// Read the solution file, if there is one
    pub fn load_solution(self, config: &AnalysisConfig) -> Result<Self> {
        let Some(path) = &self.solution_path else {
            info!("No solution found for instance {}", self.name);
            return Ok(self);
        };

        let solution = ParsedSolution::collect(read_solution_file(path, config)?)?;
        info!(
            "Read {} assignments from {} ({} lines rejected)",
            solution.assignments.len(),
            path.display(),
            solution.rejects.len()
        );

        Ok(self.with_solution(solution))
    }

    /// Attach an already-parsed solution
    pub fn with_solution(self, solution: ParsedSolution) -> Self {
        Self {
            solution: Some(solution),
            ..self
        }
    }

    /// Get a configuration table, if it was found
    pub fn table(&self, kind: ConfigTableKind) -> Option<&ConfigTable> {
        self.tables.get(&kind)
    }

    /// The buildings and periods the configuration tables declare.
    ///
    /// Buildings come from the `id` column of `stock_properties`, or failing that
    /// `financial_properties`. Periods start at `period_base`.
    pub fn universe(&self, period_base: Period) -> Universe {
        let buildings = [
            ConfigTableKind::StockProperties,
            ConfigTableKind::FinancialProperties,
        ]
        .into_iter()
        .find_map(|kind| {
            let column = self.table(kind)?.as_tabular()?.column(BUILDING_ID_COLUMN)?;
            Some(column.map(BuildingID::from).collect::<IndexSet<_>>())
        });

        let periods = self
            .metadata
            .num_periods
            .map(|count| period_base..period_base.saturating_add(count));

        Universe { buildings, periods }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{instance_dir, write_file};
    use rstest::rstest;
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    #[rstest]
    fn test_resolve(instance_dir: TempDir) {
        let files = InstanceFiles::resolve(instance_dir.path()).unwrap();
        assert_eq!(files.tables.len(), 5);
        assert_eq!(
            files.tables[&ConfigTableKind::PortfolioCaps],
            instance_dir.path().join("portfolio_caps.json")
        );
        assert_eq!(
            files.solution,
            Some(
                instance_dir
                    .path()
                    .join("results")
                    .join(format!("{}.sol", files.name))
            )
        );
    }

    #[test]
    fn test_resolve_empty_dir() {
        let dir = tempdir().unwrap();
        let files = InstanceFiles::resolve(dir.path()).unwrap();
        assert!(files.tables.is_empty());
        assert_eq!(files.solution, None);

        assert!(InstanceFiles::resolve(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_resolve_solution_in_root() {
        let dir = tempdir().unwrap();
        let files = InstanceFiles::resolve(dir.path()).unwrap();
        let path = dir.path().join(format!("{}.sol", files.name));
        write_file(&path, "X_in_0_0_hp_air 1");
        assert_eq!(InstanceFiles::resolve(dir.path()).unwrap().solution, Some(path));
    }

    #[test]
    fn test_read_config_table_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("financial_properties.csv");
        write_file(&path, "\u{feff}id; c_comp\n0;1.5\n1;2\n");
        let table = read_config_table(ConfigTableKind::FinancialProperties, &path).unwrap();
        let table = table.as_tabular().unwrap();
        assert_eq!(table.columns, ["id", "c_comp"]);
        assert_eq!(table.column("c_comp").unwrap().collect::<Vec<_>>(), ["1.5", "2"]);
        assert!(table.column("rent-1").is_none());
    }

    #[test]
    fn test_read_config_table_unreadable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stock_properties.csv");
        write_file(&path, "id,type\n0,a,extra\n");
        assert!(matches!(
            read_config_table(ConfigTableKind::StockProperties, &path).unwrap(),
            ConfigTable::Unreadable(_)
        ));

        let path = dir.path().join("general_finances.json");
        write_file(&path, "{ not json");
        assert!(matches!(
            read_config_table(ConfigTableKind::GeneralFinances, &path).unwrap(),
            ConfigTable::Unreadable(_)
        ));

        assert!(
            read_config_table(ConfigTableKind::GeneralFinances, &dir.path().join("x.json"))
                .is_err()
        );
    }

    #[rstest]
    #[case("equity.initial_equity", true)]
    #[case("liabilities.initial_liabilities", false)]
    #[case("liabilities.rate", false)]
    #[case("description", true)]
    #[case("missing", false)]
    fn test_has_column_structured(#[case] column: &str, #[case] expected: bool) {
        let table = ConfigTable::Structured(json!({
            "description": "test",
            "equity": {"initial_equity": 1000},
            "liabilities": {"initial_liabilities": null, "rate": ""}
        }));
        assert_eq!(table.has_column(column), expected);
    }

    #[rstest]
    #[case(json!({"time_periods": [2025, 2030, 2035]}), Some(3))]
    #[case(json!({"num_time_periods": 4}), Some(4))]
    #[case(json!({"periods": "many", "time_horizon": 5}), Some(5))]
    #[case(json!({"num_time_periods": -1}), None)]
    #[case(json!({}), None)]
    fn test_num_periods(#[case] value: Value, #[case] expected: Option<u32>) {
        assert_eq!(num_periods(&value), expected);
    }

    #[rstest]
    fn test_load(instance_dir: TempDir) {
        let config = AnalysisConfig::default();
        let descriptor = InstanceDescriptor::from_dir(instance_dir.path(), &config).unwrap();
        assert_eq!(descriptor.tables.len(), 5);
        assert_eq!(descriptor.metadata.num_buildings, Some(3));
        assert_eq!(descriptor.metadata.num_periods, Some(3));
        assert_eq!(
            descriptor.metadata.description.as_deref(),
            Some("Test portfolio")
        );
        assert!(descriptor.metadata.modified.is_some());

        let solution = descriptor.solution.as_ref().unwrap();
        assert!(!solution.assignments.is_empty());

        let universe = descriptor.universe(1);
        assert_eq!(
            universe
                .iter_buildings()
                .map(BuildingID::as_str)
                .collect::<Vec<_>>(),
            ["0", "1", "2"]
        );
        assert_eq!(universe.periods, Some(1..4));
    }

    #[test]
    fn test_universe_falls_back_to_financial_properties() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("financial_properties.csv"), "id;c_comp\nB1;1\n");
        let files = InstanceFiles::resolve(dir.path()).unwrap();
        let descriptor = InstanceDescriptor::load(&files).unwrap();
        let universe = descriptor.universe(0);
        assert_eq!(universe.iter_buildings().count(), 1);
        assert_eq!(universe.periods, None);
        assert_eq!(descriptor.solution, None);
    }
}
