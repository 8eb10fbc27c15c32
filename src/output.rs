//! The module responsible for writing analysis results to disk.
use crate::aggregate::{
    BUILDING_COSTS, FinancePoint, IntensityPoint, SolutionSummary, building_rollups,
    category_hierarchy, financial_series, investment_intensity, summary, technology_mix, timeline,
};
use crate::building::{BuildingID, Period};
use crate::model::SolutionModel;
use crate::technology::{CategoryID, CategoryTable, FlowKind, TechnologyID};
use crate::units::Capacity;
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which instance-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "optiport_results";

/// The output file name for the installation/removal timeline
const TIMELINE_FILE_NAME: &str = "timeline.csv";

/// The output file name for the technology mix
const TECHNOLOGY_MIX_FILE_NAME: &str = "technology_mix.csv";

/// The output file name for per-building rollups
const BUILDING_ROLLUP_FILE_NAME: &str = "building_rollup.csv";

/// The leading columns of the building rollup file, before one column per flow kind and cost
const BUILDING_ROLLUP_COLUMNS: [&str; 4] =
    ["building_id", "installed", "installations", "total_capacity"];

/// The output file name for the portfolio's finances
const FINANCES_FILE_NAME: &str = "finances.csv";

/// The output file name for the category hierarchy
const CATEGORY_MIX_FILE_NAME: &str = "category_mix.csv";

/// The output file name for investment intensity
const INVESTMENT_INTENSITY_FILE_NAME: &str = "investment_intensity.csv";

/// The output file name for conflicts, anomalies, unknown variables and rejected lines
const DIAGNOSTICS_FILE_NAME: &str = "diagnostics.csv";

/// The output file name for headline figures
const SUMMARY_FILE_NAME: &str = "summary.toml";

/// Get the default output directory for the instance at `instance_dir`
pub fn get_output_dir(instance_dir: &Path) -> Result<PathBuf> {
    let instance_dir = instance_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to instance")?;

    let instance_name = instance_dir
        .file_name()
        .context("Instance cannot be in root folder")?
        .to_str()
        .context("Invalid chars in instance dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, instance_name].iter().collect())
}

/// Create a new output directory, clearing out an existing one if `allow_overwrite` is set.
///
/// # Returns
///
/// Whether an existing, non-empty directory is being overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if output_dir.is_dir() {
        let is_empty = fs::read_dir(output_dir)?.next().is_none();
        if !is_empty {
            ensure!(
                allow_overwrite,
                "Output folder already exists and is not empty. Use --overwrite to replace it."
            );
            fs::remove_dir_all(output_dir)?;
        }
        !is_empty
    } else {
        false
    };

    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Represents a row in the timeline CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TimelineRow {
    period: Period,
    building_id: BuildingID,
    technology: TechnologyID,
    event: String,
    non_monotonic: bool,
}

/// Represents a row in the technology mix CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TechnologyMixRow {
    technology: TechnologyID,
    category: CategoryID,
    installations: usize,
    buildings: usize,
    total_capacity: Capacity,
}

/// Represents a row in the category mix CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CategoryMixRow {
    category: CategoryID,
    technology: TechnologyID,
    installations: usize,
    total_capacity: Capacity,
}

/// Represents a row in the diagnostics CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DiagnosticRow {
    diagnostic: String,
    line_number: Option<usize>,
    raw: String,
    detail: String,
}

impl DiagnosticRow {
    fn new(diagnostic: &str, line_number: Option<usize>, raw: &str, detail: String) -> Self {
        Self {
            diagnostic: diagnostic.to_string(),
            line_number,
            raw: raw.to_string(),
            detail,
        }
    }
}

/// An object for writing analysis results to a folder
pub struct DataWriter {
    output_path: PathBuf,
}

impl DataWriter {
    /// Prepare to write output files to `output_path`, which must already exist
    pub fn create(output_path: &Path) -> Result<Self> {
        ensure!(
            output_path.is_dir(),
            "Output folder {} does not exist",
            output_path.display()
        );

        Ok(Self {
            output_path: output_path.to_path_buf(),
        })
    }

    fn new_writer(&self, file_name: &str) -> Result<csv::Writer<File>> {
        let file_path = self.output_path.join(file_name);
        csv::Writer::from_path(&file_path)
            .with_context(|| format!("Could not create {}", file_path.display()))
    }

    /// Write every output file for the model
    pub fn write_all(&self, model: &SolutionModel, categories: &CategoryTable) -> Result<()> {
        self.write_timeline(model)?;
        self.write_technology_mix(model, categories)?;
        self.write_building_rollups(model)?;
        self.write_category_mix(model, categories)?;
        self.write_investment_intensity(model)?;
        self.write_finances(model)?;
        self.write_diagnostics(model)?;
        self.write_summary(&summary(model, categories))?;

        Ok(())
    }

    /// Write the installation and removal timeline to a CSV file
    pub fn write_timeline(&self, model: &SolutionModel) -> Result<()> {
        let timeline = timeline(model);
        let mut writer = self.new_writer(TIMELINE_FILE_NAME)?;
        for entry in &timeline.periods {
            let events = entry
                .installed
                .iter()
                .map(|placement| ("installed", placement, &timeline.non_monotonic))
                .chain(
                    entry
                        .removed
                        .iter()
                        .map(|placement| ("removed", placement, &timeline.non_monotonic_removals)),
                );
            for (event, placement, non_monotonic) in events {
                writer.serialize(TimelineRow {
                    period: entry.period,
                    building_id: placement.building_id.clone(),
                    technology: placement.technology.clone(),
                    event: event.to_string(),
                    non_monotonic: non_monotonic.contains(placement),
                })?;
            }
        }
        writer.flush()?;

        Ok(())
    }

    /// Write the technology mix to a CSV file
    pub fn write_technology_mix(
        &self,
        model: &SolutionModel,
        categories: &CategoryTable,
    ) -> Result<()> {
        let mut writer = self.new_writer(TECHNOLOGY_MIX_FILE_NAME)?;
        for mix in technology_mix(model) {
            writer.serialize(TechnologyMixRow {
                category: categories.categorise(mix.technology.as_str()),
                technology: mix.technology,
                installations: mix.installations,
                buildings: mix.buildings,
                total_capacity: mix.total_capacity,
            })?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Write one row per building to a CSV file.
    ///
    /// Each kind of flow in the model gets its own column, followed by one column per building
    /// cost.
    pub fn write_building_rollups(&self, model: &SolutionModel) -> Result<()> {
        let rollups = building_rollups(model);
        let flow_kinds: BTreeSet<FlowKind> = rollups
            .iter()
            .flat_map(|rollup| rollup.flow_by_kind.keys().cloned())
            .collect();

        let mut writer = self.new_writer(BUILDING_ROLLUP_FILE_NAME)?;
        let header = BUILDING_ROLLUP_COLUMNS
            .iter()
            .map(ToString::to_string)
            .chain(flow_kinds.iter().map(ToString::to_string))
            .chain(BUILDING_COSTS.iter().map(ToString::to_string));
        writer.write_record(header)?;
        for rollup in rollups {
            let installations: usize = rollup.installations_per_period.values().sum();
            let flows = flow_kinds.iter().map(|flow_kind| {
                let flow = rollup.flow_by_kind.get(flow_kind).copied();
                flow.unwrap_or_default().to_string()
            });
            let costs = BUILDING_COSTS.iter().map(|kind| {
                let cost = rollup.cost_by_kind.get(kind).copied();
                cost.unwrap_or_default().to_string()
            });
            let record = [
                rollup.building_id.to_string(),
                rollup.installed.iter().join(";"),
                installations.to_string(),
                rollup.total_capacity.to_string(),
            ]
            .into_iter()
            .chain(flows)
            .chain(costs);
            writer.write_record(record)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Write the category hierarchy to a CSV file
    pub fn write_category_mix(
        &self,
        model: &SolutionModel,
        categories: &CategoryTable,
    ) -> Result<()> {
        let mut writer = self.new_writer(CATEGORY_MIX_FILE_NAME)?;
        for node in category_hierarchy(model, categories) {
            for mix in node.technologies {
                writer.serialize(CategoryMixRow {
                    category: node.category.clone(),
                    technology: mix.technology,
                    installations: mix.installations,
                    total_capacity: mix.total_capacity,
                })?;
            }
        }
        writer.flush()?;

        Ok(())
    }

    /// Write investment intensity to a CSV file
    pub fn write_investment_intensity(&self, model: &SolutionModel) -> Result<()> {
        let mut writer = self.new_writer(INVESTMENT_INTENSITY_FILE_NAME)?;
        for point in investment_intensity(model) {
            writer.serialize::<IntensityPoint>(point)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Write the portfolio's equity, debt, liquidity and costs in each period to a CSV file
    pub fn write_finances(&self, model: &SolutionModel) -> Result<()> {
        let mut writer = self.new_writer(FINANCES_FILE_NAME)?;
        for point in financial_series(model) {
            writer.serialize::<FinancePoint>(point)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Write conflicts, anomalies, unknown variables and rejected lines to a CSV file
    pub fn write_diagnostics(&self, model: &SolutionModel) -> Result<()> {
        let diagnostics = &model.diagnostics;
        let conflicts = diagnostics.conflicts.iter().map(|conflict| {
            DiagnosticRow::new(
                "conflict",
                None,
                &conflict.raw_name,
                format!(
                    "{} value {} replaced by {}",
                    conflict.kind, conflict.previous, conflict.replacement
                ),
            )
        });
        let anomalies = diagnostics.anomalies.iter().map(|anomaly| {
            let mut problems = Vec::new();
            if let (true, Some(building_id)) = (anomaly.unknown_building, &anomaly.building_id) {
                problems.push(format!("unknown building {building_id}"));
            }
            if anomaly.period_out_of_range {
                problems.push(format!("period {} out of range", anomaly.period));
            }
            DiagnosticRow::new("anomaly", None, &anomaly.raw_name, problems.join("; "))
        });
        let unknown = diagnostics.unknown.iter().map(|variable| {
            DiagnosticRow::new(
                "unknown",
                None,
                &variable.raw_name,
                format!("value {}", variable.value),
            )
        });
        let rejects = diagnostics.malformed_lines().map(|rejected| {
            DiagnosticRow::new(
                "rejected",
                Some(rejected.line_number),
                &rejected.raw,
                rejected.reason.to_string(),
            )
        });

        let mut writer = self.new_writer(DIAGNOSTICS_FILE_NAME)?;
        for row in conflicts.chain(anomalies).chain(unknown).chain(rejects) {
            writer.serialize(row)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Write headline figures to a TOML file
    pub fn write_summary(&self, summary: &SolutionSummary) -> Result<()> {
        let file_path = self.output_path.join(SUMMARY_FILE_NAME);
        fs::write(&file_path, toml::to_string(summary)?)
            .with_context(|| format!("Could not write {}", file_path.display()))?;

        Ok(())
    }
}
