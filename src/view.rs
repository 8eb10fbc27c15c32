//! Analytical views of a solution.
//!
//! A [`View`] turns a [`SolutionModel`] into a [`Chart`]: plain data (labels, series or a
//! hierarchy) which any front end can render. Views are looked up by name in a [`ViewRegistry`].
use crate::aggregate::{
    FinancePoint, IntensityPoint, building_rollups, category_hierarchy, financial_series,
    installed_counts_by_period, investment_intensity, timeline,
};
use crate::config::AnalysisConfig;
use crate::model::SolutionModel;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

/// Shown in place of a chart when the model has no decoded variables
const NO_SOLUTION_MESSAGE: &str = "No solution data available for this instance";

/// How a chart is meant to be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    /// Bars stacked per category
    StackedBar,
    /// Lines over periods
    Line,
    /// Nested rectangles
    Treemap,
    /// A plain table
    Table,
}

/// A named sequence of values, one per label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    /// The series name (shown in the legend)
    pub name: String,
    /// One value per label of the chart
    pub values: Vec<f64>,
}

/// A node of a hierarchical chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyNode {
    /// The node's label
    pub label: String,
    /// The label of the parent node (empty for top-level nodes)
    pub parent: String,
    /// The node's size
    pub value: f64,
}

/// The data of a chart
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartData {
    /// Labelled series
    Series {
        /// Labels along the category axis
        labels: Vec<String>,
        /// The series
        series: Vec<Series>,
    },
    /// A hierarchy of labelled values
    Hierarchy {
        /// The nodes, parents before children
        nodes: Vec<HierarchyNode>,
    },
    /// A table of values
    Table {
        /// Column headings
        columns: Vec<String>,
        /// Rows of values
        rows: Vec<Vec<serde_json::Value>>,
    },
}

/// Rendering-agnostic chart data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    /// The chart title
    pub title: String,
    /// How the chart is meant to be drawn
    pub chart_type: ChartType,
    /// The data to draw
    pub data: ChartData,
    /// A note to show alongside (or instead of) the chart
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Chart {
    fn new(title: &str, chart_type: ChartType, data: ChartData) -> Self {
        Self {
            title: title.to_string(),
            chart_type,
            data,
            message: None,
        }
    }

    fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    /// Mark the chart as empty if the model has no data
    fn note_if_empty(self, model: &SolutionModel) -> Self {
        if model.is_empty() {
            self.with_message(NO_SOLUTION_MESSAGE)
        } else {
            self
        }
    }

    /// Serialise the chart as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialise chart")
    }
}

/// Something which produces a chart from a solution
pub trait View: Send + Sync {
    /// The name the view is registered under
    fn name(&self) -> &'static str;

    /// A human-readable title
    fn title(&self) -> &'static str;

    /// Produce the chart for the given model
    fn produce(&self, model: &SolutionModel, config: &AnalysisConfig) -> Result<Chart>;
}

/// Convert a count into a chart value, saturating at `u32::MAX`
fn count_value(count: usize) -> f64 {
    f64::from(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Build stacked series with one series per technology from per-period counts
fn series_by_technology<I>(periods: I) -> ChartData
where
    I: IntoIterator<Item = (u32, BTreeMap<String, usize>)>,
{
    let periods = periods.into_iter().collect_vec();
    let technologies = periods
        .iter()
        .flat_map(|(_, counts)| counts.keys().cloned())
        .sorted()
        .dedup()
        .collect_vec();

    ChartData::Series {
        labels: periods.iter().map(|(period, _)| period.to_string()).collect(),
        series: technologies
            .into_iter()
            .map(|technology| Series {
                values: periods
                    .iter()
                    .map(|(_, counts)| {
                        count_value(counts.get(&technology).copied().unwrap_or_default())
                    })
                    .collect(),
                name: technology,
            })
            .collect(),
    }
}

/// New installations per period, by technology
pub struct InstallationPathway;

impl View for InstallationPathway {
    fn name(&self) -> &'static str {
        "installation_pathway"
    }

    fn title(&self) -> &'static str {
        "New installations per period"
    }

    fn produce(&self, model: &SolutionModel, _config: &AnalysisConfig) -> Result<Chart> {
        let periods = timeline(model).periods.into_iter().map(|entry| {
            let counts: BTreeMap<_, _> = entry
                .installed
                .iter()
                .map(|placement| placement.technology.to_string())
                .counts()
                .into_iter()
                .collect();
            (entry.period, counts)
        });

        Ok(
            Chart::new(self.title(), ChartType::StackedBar, series_by_technology(periods))
                .note_if_empty(model),
        )
    }
}

/// Removals per period, by technology
pub struct RemovalPathway;

impl View for RemovalPathway {
    fn name(&self) -> &'static str {
        "removal_pathway"
    }

    fn title(&self) -> &'static str {
        "Removals per period"
    }

    fn produce(&self, model: &SolutionModel, _config: &AnalysisConfig) -> Result<Chart> {
        let periods = timeline(model).periods.into_iter().map(|entry| {
            let counts: BTreeMap<_, _> = entry
                .removed
                .iter()
                .map(|placement| placement.technology.to_string())
                .counts()
                .into_iter()
                .collect();
            (entry.period, counts)
        });

        Ok(
            Chart::new(self.title(), ChartType::StackedBar, series_by_technology(periods))
                .note_if_empty(model),
        )
    }
}

/// The number of buildings with each technology installed, per period
pub struct TechnologyMixView;

impl View for TechnologyMixView {
    fn name(&self) -> &'static str {
        "technology_mix"
    }

    fn title(&self) -> &'static str {
        "Technology mix per period"
    }

    fn produce(&self, model: &SolutionModel, _config: &AnalysisConfig) -> Result<Chart> {
        let periods = installed_counts_by_period(model)
            .into_iter()
            .map(|(period, counts)| {
                let counts: BTreeMap<_, _> = counts
                    .into_iter()
                    .map(|(technology, count)| (technology.to_string(), count))
                    .collect();
                (period, counts)
            });

        Ok(
            Chart::new(self.title(), ChartType::StackedBar, series_by_technology(periods))
                .note_if_empty(model),
        )
    }
}

/// Installations grouped by technology category
pub struct TechnologyTreemap;

impl View for TechnologyTreemap {
    fn name(&self) -> &'static str {
        "technology_treemap"
    }

    fn title(&self) -> &'static str {
        "Installations by category"
    }

    fn produce(&self, model: &SolutionModel, config: &AnalysisConfig) -> Result<Chart> {
        let mut nodes = Vec::new();
        for category in category_hierarchy(model, &config.categories) {
            let label = category.category.to_string();
            nodes.push(HierarchyNode {
                label: label.clone(),
                parent: String::new(),
                value: count_value(category.installations),
            });
            nodes.extend(category.technologies.into_iter().map(|mix| HierarchyNode {
                label: mix.technology.to_string(),
                parent: label.clone(),
                value: count_value(mix.installations),
            }));
        }

        Ok(
            Chart::new(self.title(), ChartType::Treemap, ChartData::Hierarchy { nodes })
                .note_if_empty(model),
        )
    }
}

/// New installations, removals and new capacity over time
pub struct InvestmentIntensity;

impl View for InvestmentIntensity {
    fn name(&self) -> &'static str {
        "investment_intensity"
    }

    fn title(&self) -> &'static str {
        "Investment intensity"
    }

    fn produce(&self, model: &SolutionModel, _config: &AnalysisConfig) -> Result<Chart> {
        let points = investment_intensity(model);
        let series = |name: &str, value: fn(&IntensityPoint) -> f64| Series {
            name: name.to_string(),
            values: points.iter().map(value).collect(),
        };

        let data = ChartData::Series {
            labels: points.iter().map(|point| point.period.to_string()).collect(),
            series: vec![
                series("new_installations", |point| count_value(point.new_installations)),
                series("removals", |point| count_value(point.removals)),
                series("new_capacity", |point| point.new_capacity.value()),
            ],
        };

        Ok(Chart::new(self.title(), ChartType::Line, data).note_if_empty(model))
    }
}

/// One row per building with its installed technologies and capacity
pub struct BuildingTable;

impl View for BuildingTable {
    fn name(&self) -> &'static str {
        "building_table"
    }

    fn title(&self) -> &'static str {
        "Buildings"
    }

    fn produce(&self, model: &SolutionModel, _config: &AnalysisConfig) -> Result<Chart> {
        let columns = ["building", "installed", "installations", "total_capacity"]
            .map(ToString::to_string)
            .to_vec();
        let rows = building_rollups(model)
            .into_iter()
            .map(|rollup| {
                vec![
                    json!(rollup.building_id),
                    json!(rollup.installed.iter().join(", ")),
                    json!(rollup.installations_per_period.values().sum::<usize>()),
                    json!(rollup.total_capacity),
                ]
            })
            .collect();

        Ok(
            Chart::new(self.title(), ChartType::Table, ChartData::Table { columns, rows })
                .note_if_empty(model),
        )
    }
}

/// Build a series of one amount from the financial series
fn amount_series(points: &[FinancePoint], name: &str, amount: fn(&FinancePoint) -> f64) -> Series {
    Series {
        name: name.to_string(),
        values: points.iter().map(amount).collect(),
    }
}

/// The period labels of the financial series
fn finance_labels(points: &[FinancePoint]) -> Vec<String> {
    points.iter().map(|point| point.period.to_string()).collect()
}

/// Equity, debt and liquidity of the portfolio over time
pub struct PortfolioFinances;

impl View for PortfolioFinances {
    fn name(&self) -> &'static str {
        "portfolio_finances"
    }

    fn title(&self) -> &'static str {
        "Equity, debt and liquidity"
    }

    fn produce(&self, model: &SolutionModel, _config: &AnalysisConfig) -> Result<Chart> {
        let points = financial_series(model);
        let data = ChartData::Series {
            labels: finance_labels(&points),
            series: vec![
                amount_series(&points, "equity", |point| point.equity.value()),
                amount_series(&points, "debt", |point| point.debt.value()),
                amount_series(&points, "liquidity", |point| point.liquidity.value()),
            ],
        };

        Ok(Chart::new(self.title(), ChartType::Line, data).note_if_empty(model))
    }
}

/// Rent, energy and depreciation costs per period
pub struct CostBreakdown;

impl View for CostBreakdown {
    fn name(&self) -> &'static str {
        "cost_breakdown"
    }

    fn title(&self) -> &'static str {
        "Costs per period"
    }

    fn produce(&self, model: &SolutionModel, _config: &AnalysisConfig) -> Result<Chart> {
        let points = financial_series(model);
        let data = ChartData::Series {
            labels: finance_labels(&points),
            series: vec![
                amount_series(&points, "rent_cost", |point| point.rent_cost.value()),
                amount_series(&points, "energy_cost", |point| point.energy_cost.value()),
                amount_series(&points, "depreciation", |point| point.depreciation.value()),
            ],
        };

        Ok(Chart::new(self.title(), ChartType::StackedBar, data).note_if_empty(model))
    }
}

/// A collection of views, looked up by name
pub struct ViewRegistry {
    views: IndexMap<&'static str, Box<dyn View>>,
}

impl ViewRegistry {
    /// Create a registry with no views
    pub fn new() -> Self {
        Self {
            views: IndexMap::new(),
        }
    }

    /// Add a view, replacing any existing view with the same name
    pub fn register(mut self, view: impl View + 'static) -> Self {
        self.views.insert(view.name(), Box::new(view));
        self
    }

    /// Get a view by name
    pub fn get(&self, name: &str) -> Option<&dyn View> {
        self.views.get(name).map(Box::as_ref)
    }

    /// Iterate over the registered views in the order they were added
    pub fn iter(&self) -> impl Iterator<Item = &dyn View> {
        self.views.values().map(Box::as_ref)
    }

    /// Produce the chart of the named view
    pub fn produce(
        &self,
        name: &str,
        model: &SolutionModel,
        config: &AnalysisConfig,
    ) -> Result<Chart> {
        let view = self.get(name).with_context(|| {
            format!(
                "Unknown view {name}. Available views: {}",
                self.views.keys().join(", ")
            )
        })?;

        view.produce(model, config)
    }
}

impl Default for ViewRegistry {
    /// A registry containing the built-in views
    fn default() -> Self {
        Self::new()
            .register(InstallationPathway)
            .register(RemovalPathway)
            .register(TechnologyMixView)
            .register(TechnologyTreemap)
            .register(InvestmentIntensity)
            .register(BuildingTable)
            .register(PortfolioFinances)
            .register(CostBreakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::Universe;
    use crate::fixture::{model, model_from_str};
    use rstest::{fixture, rstest};

    #[fixture]
    fn registry() -> ViewRegistry {
        ViewRegistry::default()
    }

    #[rstest]
    fn test_default_views(registry: ViewRegistry) {
        assert_eq!(
            registry.iter().map(View::name).collect_vec(),
            [
                "installation_pathway",
                "removal_pathway",
                "technology_mix",
                "technology_treemap",
                "investment_intensity",
                "building_table",
                "portfolio_finances",
                "cost_breakdown"
            ]
        );
    }

    #[rstest]
    fn test_unknown_view(registry: ViewRegistry, model: SolutionModel) {
        let result = registry.produce("pie", &model, &AnalysisConfig::default());
        assert!(result.unwrap_err().to_string().starts_with("Unknown view pie"));
    }

    #[rstest]
    fn test_installation_pathway(registry: ViewRegistry, model: SolutionModel) {
        let chart = registry
            .produce("installation_pathway", &model, &AnalysisConfig::default())
            .unwrap();
        assert_eq!(chart.chart_type, ChartType::StackedBar);
        assert_eq!(chart.message, None);
        assert_eq!(
            chart.data,
            ChartData::Series {
                labels: vec!["0".into(), "1".into(), "2".into()],
                series: vec![
                    Series {
                        name: "hp_air".into(),
                        values: vec![1.0, 0.0, 0.0]
                    },
                    Series {
                        name: "tes_dhw".into(),
                        values: vec![1.0, 0.0, 1.0]
                    },
                    Series {
                        name: "wall_1".into(),
                        values: vec![0.0, 1.0, 0.0]
                    },
                ]
            }
        );
    }

    #[rstest]
    fn test_technology_treemap(model: SolutionModel) {
        let chart = TechnologyTreemap
            .produce(&model, &AnalysisConfig::default())
            .unwrap();
        let ChartData::Hierarchy { nodes } = chart.data else {
            panic!("Expected hierarchy");
        };
        assert_eq!(nodes[0].label, "heating");
        assert_eq!(nodes[0].parent, "");
        assert_eq!(nodes[0].value, 3.0);
        assert!(
            nodes
                .iter()
                .any(|node| node.label == "hp_air" && node.parent == "heating")
        );
    }

    #[rstest]
    fn test_building_table(model: SolutionModel) {
        let chart = BuildingTable
            .produce(&model, &AnalysisConfig::default())
            .unwrap();
        let ChartData::Table { columns, rows } = chart.data else {
            panic!("Expected table");
        };
        assert_eq!(columns.len(), 4);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], [json!("0"), json!("hp_air"), json!(3), json!(30.0)]);
    }

    #[test]
    fn test_portfolio_finances() {
        let model = model_from_str("Q_0 2\nD_0 6\nQ_1 3\nL_1 1\n", Universe::default());
        let chart = PortfolioFinances
            .produce(&model, &AnalysisConfig::default())
            .unwrap();
        assert_eq!(chart.chart_type, ChartType::Line);
        assert_eq!(
            chart.data,
            ChartData::Series {
                labels: vec!["0".into(), "1".into()],
                series: vec![
                    Series {
                        name: "equity".into(),
                        values: vec![2.0, 3.0]
                    },
                    Series {
                        name: "debt".into(),
                        values: vec![6.0, 0.0]
                    },
                    Series {
                        name: "liquidity".into(),
                        values: vec![0.0, 1.0]
                    },
                ]
            }
        );
    }

    #[test]
    fn test_cost_breakdown() {
        let model = model_from_str(
            "C_rent_0_0 2\nC_rent_1_0 3\nC_en_0_0 1\nC_dep_1_0_hp_air 4\n",
            Universe::default(),
        );
        let chart = CostBreakdown
            .produce(&model, &AnalysisConfig::default())
            .unwrap();
        assert_eq!(chart.chart_type, ChartType::StackedBar);
        let ChartData::Series { labels, series } = chart.data else {
            panic!("Expected series");
        };
        assert_eq!(labels, ["0"]);
        assert_eq!(
            series
                .iter()
                .map(|series| (series.name.as_str(), series.values[0]))
                .collect_vec(),
            [("rent_cost", 5.0), ("energy_cost", 1.0), ("depreciation", 4.0)]
        );
    }

    #[rstest]
    fn test_finance_views_without_financial_variables(model: SolutionModel) {
        let chart = CostBreakdown
            .produce(&model, &AnalysisConfig::default())
            .unwrap();
        assert_eq!(chart.message, None);
        let ChartData::Series { series, .. } = chart.data else {
            panic!("Expected series");
        };
        assert!(series.iter().all(|series| series.values == [0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_count_value() {
        assert_eq!(count_value(3), 3.0);
        assert_eq!(count_value(usize::MAX), f64::from(u32::MAX));
    }

    #[rstest]
    fn test_views_of_empty_model(registry: ViewRegistry) {
        let config = AnalysisConfig::default();
        let model = SolutionModel::empty(Universe::default(), &config);
        for view in registry.iter() {
            let chart = view.produce(&model, &config).unwrap();
            assert_eq!(chart.message.as_deref(), Some(NO_SOLUTION_MESSAGE));
        }
    }

    #[rstest]
    fn test_chart_json(model: SolutionModel) {
        let chart = InvestmentIntensity
            .produce(&model, &AnalysisConfig::default())
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&chart.to_json().unwrap()).unwrap();
        assert_eq!(value["chart_type"], "line");
        assert_eq!(value["data"]["kind"], "series");
        assert_eq!(value["data"]["series"][2]["values"], json!([10.0, 5.0, 0.0]));
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let registry = ViewRegistry::new()
            .register(BuildingTable)
            .register(BuildingTable);
        assert_eq!(registry.iter().count(), 1);
        assert!(registry.get("technology_mix").is_none());
    }
}
