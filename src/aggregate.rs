//! Summaries and cross-tabulations of a [`SolutionModel`].
//!
//! All functions here are pure: they never modify the model and return the same result when called
//! repeatedly. Each covers the whole key space of the model (plus the declared universe, where
//! known), not just the keys which happen to be present.
use crate::building::{BuildingID, Period};
use crate::id::IDCollection;
use crate::model::{SolutionKey, SolutionModel};
use crate::technology::{CategoryID, CategoryTable, FlowKind, OTHER_CATEGORY, TechnologyID};
use crate::units::{Capacity, Flow, Money};
use crate::variable::VariableKind;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A technology in a building
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Placement {
    /// The building
    pub building_id: BuildingID,
    /// The technology
    pub technology: TechnologyID,
}

impl Placement {
    fn from_key(key: &SolutionKey) -> Self {
        Self {
            building_id: key.building_id.clone(),
            technology: key.technology.clone(),
        }
    }

    fn at(&self, period: Period) -> SolutionKey {
        SolutionKey {
            building_id: self.building_id.clone(),
            period,
            technology: self.technology.clone(),
        }
    }
}

/// The decisions which take effect in one period
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelinePeriod {
    /// The period
    pub period: Period,
    /// Technologies newly installed in this period
    pub installed: Vec<Placement>,
    /// Technologies newly removed in this period
    pub removed: Vec<Placement>,
}

/// When each technology was installed in (or removed from) each building
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    /// One entry per period, in order
    pub periods: Vec<TimelinePeriod>,
    /// Placements whose installation switches off again after being on
    pub non_monotonic: BTreeSet<Placement>,
    /// Placements whose removal switches off again after being on
    pub non_monotonic_removals: BTreeSet<Placement>,
}

/// The periods in which each placement's decision newly takes effect.
///
/// A decision which never switches off again takes effect in the first period it is on. A period
/// with no variable counts as off, so a gap between two periods in which the decision is on is a
/// switch-off too. If it does switch off again, every period in which it is on is reported and the
/// placement is flagged.
fn decision_events(
    decisions: &BTreeMap<SolutionKey, bool>,
) -> (BTreeMap<Period, Vec<Placement>>, BTreeSet<Placement>) {
    let mut by_placement: BTreeMap<Placement, BTreeMap<Period, bool>> = BTreeMap::new();
    for (key, &on) in decisions {
        by_placement
            .entry(Placement::from_key(key))
            .or_default()
            .insert(key.period, on);
    }

    let mut events: BTreeMap<Period, Vec<Placement>> = BTreeMap::new();
    let mut non_monotonic = BTreeSet::new();
    for (placement, periods) in by_placement {
        let on_periods = periods
            .iter()
            .filter(|&(_, &on)| on)
            .map(|(&period, _)| period)
            .collect_vec();
        let Some(&first_on) = on_periods.first() else {
            continue;
        };

        let switches_off = periods.range(first_on..).any(|(_, &on)| !on)
            || on_periods.iter().tuple_windows().any(|(a, b)| b - a > 1);
        if switches_off {
            for period in on_periods {
                events.entry(period).or_default().push(placement.clone());
            }
            non_monotonic.insert(placement);
        } else {
            events.entry(first_on).or_default().push(placement);
        }
    }

    (events, non_monotonic)
}

/// Get the periods in which technologies are newly installed and removed
pub fn timeline(model: &SolutionModel) -> Timeline {
    let (mut installed, non_monotonic) = decision_events(&model.installations);
    let (mut removed, non_monotonic_removals) = decision_events(&model.removals);

    let periods = model
        .periods()
        .into_iter()
        .chain(installed.keys().copied())
        .chain(removed.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|period| TimelinePeriod {
            period,
            installed: installed.remove(&period).unwrap_or_default(),
            removed: removed.remove(&period).unwrap_or_default(),
        })
        .collect();

    Timeline {
        periods,
        non_monotonic,
        non_monotonic_removals,
    }
}

/// How much of one technology the solution installs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnologyMix {
    /// The technology
    pub technology: TechnologyID,
    /// The number of (building, period) pairs in which it is installed
    pub installations: usize,
    /// The number of buildings in which it is installed in some period
    pub buildings: usize,
    /// Its capacity summed over all buildings and periods
    pub total_capacity: Capacity,
}

/// Get the installation count and total capacity of every technology in the model
pub fn technology_mix(model: &SolutionModel) -> Vec<TechnologyMix> {
    model
        .technologies()
        .into_iter()
        .map(|technology| {
            let installed = model
                .installations
                .iter()
                .filter(|&(key, &on)| on && key.technology == technology)
                .map(|(key, _)| &key.building_id)
                .collect_vec();
            let total_capacity = model
                .capacities
                .iter()
                .filter(|(key, _)| key.technology == technology)
                .map(|(_, capacity)| capacity)
                .sum();

            TechnologyMix {
                installations: installed.len(),
                buildings: installed.into_iter().unique().count(),
                total_capacity,
                technology,
            }
        })
        .collect()
}

/// Count the buildings in which each technology is installed, per period.
///
/// Every period of the model is present, even if nothing is installed in it.
pub fn installed_counts_by_period(
    model: &SolutionModel,
) -> BTreeMap<Period, BTreeMap<TechnologyID, usize>> {
    let mut counts: BTreeMap<Period, BTreeMap<TechnologyID, usize>> = model
        .periods()
        .into_iter()
        .map(|period| (period, BTreeMap::new()))
        .collect();
    for key in model.installations.iter().filter(|&(_, &on)| on).map(|(key, _)| key) {
        *counts
            .entry(key.period)
            .or_default()
            .entry(key.technology.clone())
            .or_default() += 1;
    }

    counts
}

/// Everything the solution does in one building
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingRollup {
    /// The building
    pub building_id: BuildingID,
    /// Technologies installed in some period
    pub installed: BTreeSet<TechnologyID>,
    /// The number of technologies installed in each period
    pub installations_per_period: BTreeMap<Period, usize>,
    /// Capacity summed over all technologies and periods
    pub total_capacity: Capacity,
    /// Capacity of each technology summed over all periods
    pub capacity_by_technology: BTreeMap<TechnologyID, Capacity>,
    /// Each kind of flow summed over all technologies and periods
    pub flow_by_kind: BTreeMap<FlowKind, Flow>,
    /// Rent, energy and depreciation costs summed over all periods
    pub cost_by_kind: BTreeMap<VariableKind, Money>,
}

/// The kinds of cost which are attributed to a building
pub const BUILDING_COSTS: [VariableKind; 3] = [
    VariableKind::RentCost,
    VariableKind::EnergyCost,
    VariableKind::Depreciation,
];

fn rollup(model: &SolutionModel, building_id: BuildingID) -> BuildingRollup {
    let mut installations_per_period: BTreeMap<Period, usize> =
        model.periods().into_iter().map(|period| (period, 0)).collect();
    let mut installed = BTreeSet::new();
    for (key, _) in model
        .installations
        .iter()
        .filter(|&(key, &on)| on && key.building_id == building_id)
    {
        *installations_per_period.entry(key.period).or_default() += 1;
        installed.insert(key.technology.clone());
    }

    let mut capacity_by_technology: BTreeMap<TechnologyID, Capacity> = BTreeMap::new();
    for (key, &capacity) in &model.capacities {
        if key.building_id == building_id {
            *capacity_by_technology
                .entry(key.technology.clone())
                .or_default() += capacity;
        }
    }

    let mut flow_by_kind: BTreeMap<FlowKind, Flow> = BTreeMap::new();
    for (key, &flow) in &model.flows {
        if key.building_id == building_id {
            *flow_by_kind.entry(key.flow_kind.clone()).or_default() += flow;
        }
    }

    let mut cost_by_kind: BTreeMap<VariableKind, Money> = BUILDING_COSTS
        .iter()
        .map(|&kind| (kind, Money::default()))
        .collect();
    for (key, &amount) in &model.finances {
        if key.building_id.as_ref() == Some(&building_id) {
            *cost_by_kind.entry(key.kind).or_default() += amount;
        }
    }

    BuildingRollup {
        total_capacity: capacity_by_technology.values().sum(),
        building_id,
        installed,
        installations_per_period,
        capacity_by_technology,
        flow_by_kind,
        cost_by_kind,
    }
}

/// Summarise everything the solution does in the named building.
///
/// Buildings which are declared but have no variables get an empty rollup. An error is returned if
/// the building is unknown.
pub fn building_rollup(model: &SolutionModel, building_id: &str) -> Result<BuildingRollup> {
    let building_id = model
        .buildings()
        .get_id_by_str(building_id)
        .context("No such building in the instance or solution")?;

    Ok(rollup(model, building_id))
}

/// Summarise every building, including inactive ones
pub fn building_rollups(model: &SolutionModel) -> Vec<BuildingRollup> {
    model
        .buildings()
        .into_iter()
        .map(|building_id| rollup(model, building_id))
        .collect()
}

/// A category of technologies with the technologies it contains
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryNode {
    /// The category
    pub category: CategoryID,
    /// Installations summed over the category's technologies
    pub installations: usize,
    /// Capacity summed over the category's technologies
    pub total_capacity: Capacity,
    /// The technologies in this category
    pub technologies: Vec<TechnologyMix>,
}

/// Group the technology mix by category.
///
/// Categories appear in the order the table declares them, with `other` last. Categories with no
/// technologies in the model are omitted.
pub fn category_hierarchy(model: &SolutionModel, categories: &CategoryTable) -> Vec<CategoryNode> {
    let mut groups: IndexMap<CategoryID, Vec<TechnologyMix>> = categories
        .categories()
        .cloned()
        .chain(std::iter::once(OTHER_CATEGORY.into()))
        .map(|category| (category, Vec::new()))
        .collect();
    for mix in technology_mix(model) {
        groups
            .entry(categories.categorise(mix.technology.as_str()))
            .or_default()
            .push(mix);
    }

    groups
        .into_iter()
        .filter(|(_, technologies)| !technologies.is_empty())
        .map(|(category, technologies)| CategoryNode {
            category,
            installations: technologies.iter().map(|mix| mix.installations).sum(),
            total_capacity: technologies.iter().map(|mix| mix.total_capacity).sum(),
            technologies,
        })
        .collect()
}

/// Investment activity in one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntensityPoint {
    /// The period
    pub period: Period,
    /// The number of technologies newly installed
    pub new_installations: usize,
    /// The number of technologies newly removed
    pub removals: usize,
    /// Capacity of the newly installed technologies
    pub new_capacity: Capacity,
    /// Capacity of all technologies in this period
    pub total_capacity: Capacity,
}

/// Get the investment activity in each period
pub fn investment_intensity(model: &SolutionModel) -> Vec<IntensityPoint> {
    let mut total_by_period: BTreeMap<Period, Capacity> = BTreeMap::new();
    for (key, &capacity) in &model.capacities {
        *total_by_period.entry(key.period).or_default() += capacity;
    }

    timeline(model)
        .periods
        .into_iter()
        .map(|entry| IntensityPoint {
            period: entry.period,
            new_installations: entry.installed.len(),
            removals: entry.removed.len(),
            new_capacity: entry
                .installed
                .iter()
                .map(|placement| model.capacity(&placement.at(entry.period)))
                .sum(),
            total_capacity: total_by_period
                .get(&entry.period)
                .copied()
                .unwrap_or_default(),
        })
        .collect()
}

/// The portfolio's finances in one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancePoint {
    /// The period
    pub period: Period,
    /// Equity of the portfolio
    pub equity: Money,
    /// Debt of the portfolio
    pub debt: Money,
    /// Liquidity of the portfolio
    pub liquidity: Money,
    /// Share of equity in equity plus debt, if that is positive
    pub equity_ratio: Option<f64>,
    /// Rent cost summed over all buildings
    pub rent_cost: Money,
    /// Energy cost summed over all buildings
    pub energy_cost: Money,
    /// Depreciation summed over all buildings and technologies
    pub depreciation: Money,
}

/// Get the portfolio's finances in each period.
///
/// Periods without financial variables have zero amounts and no equity ratio.
pub fn financial_series(model: &SolutionModel) -> Vec<FinancePoint> {
    let mut totals: BTreeMap<(Period, VariableKind), Money> = BTreeMap::new();
    for (key, &amount) in &model.finances {
        *totals.entry((key.period, key.kind)).or_default() += amount;
    }
    let total = |period, kind| totals.get(&(period, kind)).copied().unwrap_or_default();

    model
        .periods()
        .into_iter()
        .map(|period| {
            let equity = total(period, VariableKind::Equity);
            let debt = total(period, VariableKind::Debt);
            let capital = equity.value() + debt.value();
            FinancePoint {
                period,
                equity,
                debt,
                liquidity: total(period, VariableKind::Liquidity),
                equity_ratio: (capital > 0.0).then_some(equity.value() / capital),
                rent_cost: total(period, VariableKind::RentCost),
                energy_cost: total(period, VariableKind::EnergyCost),
                depreciation: total(period, VariableKind::Depreciation),
            }
        })
        .collect()
}

/// Headline figures for a solution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionSummary {
    /// The objective value, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective_value: Option<f64>,
    /// The number of buildings (declared or found in the solution)
    pub num_buildings: usize,
    /// The number of periods (declared or found in the solution)
    pub num_periods: usize,
    /// The number of placements installed in some period
    pub num_installed: usize,
    /// The number of placements removed in some period
    pub num_removed: usize,
    /// The number of assignments of each kind of variable
    pub variable_counts: BTreeMap<String, usize>,
    /// The number of placements installed in some period, by category
    pub installed_by_category: BTreeMap<String, usize>,
    /// The number of variables assigned more than once
    pub num_conflicts: usize,
    /// The number of variables outside the declared universe
    pub num_anomalies: usize,
    /// The number of variable names which could not be decoded
    pub num_unknown: usize,
    /// The number of rejected lines other than blanks and comments
    pub num_rejected: usize,
}

/// Get headline figures for a solution
pub fn summary(model: &SolutionModel, categories: &CategoryTable) -> SolutionSummary {
    let installed: BTreeSet<_> = model
        .installations
        .iter()
        .filter(|&(_, &on)| on)
        .map(|(key, _)| Placement::from_key(key))
        .collect();
    let num_removed = model
        .removals
        .iter()
        .filter(|&(_, &on)| on)
        .map(|(key, _)| Placement::from_key(key))
        .unique()
        .count();

    let mut installed_by_category = BTreeMap::new();
    for placement in &installed {
        *installed_by_category
            .entry(categories.categorise(placement.technology.as_str()).to_string())
            .or_default() += 1;
    }

    let diagnostics = &model.diagnostics;
    SolutionSummary {
        objective_value: model.objective_value,
        num_buildings: model.buildings().len(),
        num_periods: model.periods().len(),
        num_installed: installed.len(),
        num_removed,
        variable_counts: model
            .variable_counts
            .iter()
            .map(|(kind, &count)| (kind.to_string(), count))
            .collect(),
        installed_by_category,
        num_conflicts: diagnostics.conflicts.len(),
        num_anomalies: diagnostics.anomalies.len(),
        num_unknown: diagnostics.unknown.len(),
        num_rejected: diagnostics.malformed_lines().count(),
    }
}
