//! The solution model: decoded assignments merged into maps keyed by building, period and
//! technology, together with the diagnostics gathered while building them.
use crate::building::{BuildingID, Period, Universe};
use crate::config::AnalysisConfig;
use crate::instance::InstanceDescriptor;
use crate::solution::{
    Assignment, RejectReason, RejectedLine, SolutionLine, parse_objective_value,
    read_solution_file,
};
use crate::technology::{FlowKind, TechnologyID};
use crate::units::{Capacity, Flow, Money};
use crate::variable::{VariableKind, VariableToken};
use anyhow::Result;
use float_cmp::approx_eq;
use indexmap::IndexSet;
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Identifies a technology in a building in a period
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SolutionKey {
    /// The building
    pub building_id: BuildingID,
    /// The period
    pub period: Period,
    /// The technology
    pub technology: TechnologyID,
}

/// Identifies a flow of a technology in a building in a period
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FlowKey {
    /// The building
    pub building_id: BuildingID,
    /// The period
    pub period: Period,
    /// The technology
    pub technology: TechnologyID,
    /// The flow label (e.g. `P_el`)
    pub flow_kind: FlowKind,
}

impl FlowKey {
    /// Create a flow key from a solution key and a flow label
    pub fn new(key: SolutionKey, flow_kind: FlowKind) -> Self {
        Self {
            building_id: key.building_id,
            period: key.period,
            technology: key.technology,
            flow_kind,
        }
    }

    /// The key without the flow label
    pub fn solution_key(&self) -> SolutionKey {
        SolutionKey {
            building_id: self.building_id.clone(),
            period: self.period,
            technology: self.technology.clone(),
        }
    }
}

/// Identifies a monetary quantity in a period.
///
/// Portfolio series (equity, debt, liquidity) have no building. Only depreciation has a
/// technology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FinanceKey {
    /// What the amount represents
    pub kind: VariableKind,
    /// The period
    pub period: Period,
    /// The building, for building costs
    pub building_id: Option<BuildingID>,
    /// The technology, for depreciation
    pub technology: Option<TechnologyID>,
}

impl FinanceKey {
    /// The key of a portfolio-wide quantity
    pub fn portfolio(kind: VariableKind, period: Period) -> Self {
        Self {
            kind,
            period,
            building_id: None,
            technology: None,
        }
    }
}

/// A variable which was assigned more than once. The later value is the one kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    /// The kind of variable
    pub kind: VariableKind,
    /// The variable name
    pub raw_name: String,
    /// The value which was overwritten
    pub previous: f64,
    /// The value which was kept
    pub replacement: f64,
    /// Whether the two values are (approximately) equal
    pub identical: bool,
}

/// A variable whose building or period lies outside the instance's declared universe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaAnomaly {
    /// The variable name
    pub raw_name: String,
    /// The variable's building (portfolio variables have none)
    pub building_id: Option<BuildingID>,
    /// The variable's period
    pub period: Period,
    /// Whether the building is not among the declared buildings
    pub unknown_building: bool,
    /// Whether the period is outside the declared period range
    pub period_out_of_range: bool,
}

/// A variable whose name could not be decoded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownVariable {
    /// The variable name
    pub raw_name: String,
    /// The variable's value
    pub value: f64,
}

/// Everything noteworthy found while building a [`SolutionModel`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    /// Variables assigned more than once
    pub conflicts: Vec<Conflict>,
    /// Variables outside the declared universe (still included in the model)
    pub anomalies: Vec<SchemaAnomaly>,
    /// Variables whose names could not be decoded (not included in the model)
    pub unknown: Vec<UnknownVariable>,
    /// Lines of the solution file which did not yield an assignment
    pub rejects: Vec<RejectedLine>,
}

impl Diagnostics {
    /// Rejected lines other than blanks and comments
    pub fn malformed_lines(&self) -> impl Iterator<Item = &RejectedLine> {
        self.rejects.iter().filter(|rejected| {
            !matches!(rejected.reason, RejectReason::Blank | RejectReason::Comment)
        })
    }
}

/// The decoded solution of one instance.
///
/// Lookups of keys which are not present return the default value (not installed, zero capacity,
/// zero flow). The model is never modified once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionModel {
    /// The buildings and periods declared by the instance
    pub universe: Universe,
    /// The smallest value of a decision variable which counts as the decision being taken
    pub threshold: f64,
    /// Whether each technology is installed in each building and period
    pub installations: BTreeMap<SolutionKey, bool>,
    /// Whether each technology is removed from each building in each period
    pub removals: BTreeMap<SolutionKey, bool>,
    /// Installed energy capacities
    pub capacities: BTreeMap<SolutionKey, Capacity>,
    /// Flows, summed over sub-indices
    pub flows: BTreeMap<FlowKey, Flow>,
    /// Costs, equity, debt and liquidity
    pub finances: BTreeMap<FinanceKey, Money>,
    /// The objective value of the solution, if known
    pub objective_value: Option<f64>,
    /// The number of assignments of each kind of variable
    pub variable_counts: BTreeMap<VariableKind, usize>,
    /// Problems found while building the model
    pub diagnostics: Diagnostics,
}

impl SolutionModel {
    /// Create a model with no assignments
    pub fn empty(universe: Universe, config: &AnalysisConfig) -> Self {
        Self {
            universe,
            threshold: config.decision_threshold(),
            installations: BTreeMap::new(),
            removals: BTreeMap::new(),
            capacities: BTreeMap::new(),
            flows: BTreeMap::new(),
            finances: BTreeMap::new(),
            objective_value: None,
            variable_counts: BTreeMap::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Build the model for an instance from its loaded solution, consuming the descriptor.
    ///
    /// If no solution has been loaded, the model is empty.
    pub fn from_descriptor(descriptor: InstanceDescriptor, config: &AnalysisConfig) -> Self {
        let mut builder = ModelBuilder::new(descriptor.universe(config.period_base), config);
        if let Some(solution) = descriptor.solution {
            for assignment in solution.assignments {
                builder.add(assignment);
            }
            for rejected in solution.rejects {
                builder.reject(rejected);
            }
            builder.model.objective_value = solution.objective_value;
        }

        builder.finish()
    }

    /// Build the model for an instance by streaming its solution file.
    ///
    /// The solution is read one line at a time and never held in memory as a whole. If the
    /// instance has no solution file, the model is empty.
    pub fn from_solution_file(
        descriptor: &InstanceDescriptor,
        config: &AnalysisConfig,
    ) -> Result<Self> {
        let universe = descriptor.universe(config.period_base);
        match &descriptor.solution_path {
            Some(path) => Self::from_lines(universe, read_solution_file(path, config)?, config),
            None => Ok(Self::empty(universe, config)),
        }
    }

    /// Build a model in one pass over a stream of solution lines
    pub fn from_lines<I>(universe: Universe, lines: I, config: &AnalysisConfig) -> Result<Self>
    where
        I: IntoIterator<Item = Result<SolutionLine>>,
    {
        let mut builder = ModelBuilder::new(universe, config);
        for line in lines {
            builder.add_line(line?);
        }

        Ok(builder.finish())
    }

    /// Whether the technology is installed (false if there is no such variable)
    pub fn is_installed(&self, key: &SolutionKey) -> bool {
        self.installations.get(key).copied().unwrap_or_default()
    }

    /// Whether the technology is removed (false if there is no such variable)
    pub fn is_removed(&self, key: &SolutionKey) -> bool {
        self.removals.get(key).copied().unwrap_or_default()
    }

    /// The installed capacity (zero if there is no such variable)
    pub fn capacity(&self, key: &SolutionKey) -> Capacity {
        self.capacities.get(key).copied().unwrap_or_default()
    }

    /// The value of a flow (zero if there is no such variable)
    pub fn flow(&self, key: &FlowKey) -> Flow {
        self.flows.get(key).copied().unwrap_or_default()
    }

    /// A monetary amount (zero if there is no such variable)
    pub fn finance(&self, key: &FinanceKey) -> Money {
        self.finances.get(key).copied().unwrap_or_default()
    }

    /// Whether the model contains no decoded variables
    pub fn is_empty(&self) -> bool {
        self.installations.is_empty()
            && self.removals.is_empty()
            && self.capacities.is_empty()
            && self.flows.is_empty()
            && self.finances.is_empty()
    }

    /// Iterate over the keys of all decoded variables (may contain repeats)
    fn keys(&self) -> impl Iterator<Item = SolutionKey> + '_ {
        self.installations
            .keys()
            .chain(self.removals.keys())
            .chain(self.capacities.keys())
            .cloned()
            .chain(self.flows.keys().map(FlowKey::solution_key))
    }

    /// All buildings: the declared ones followed by any others found in the solution
    pub fn buildings(&self) -> IndexSet<BuildingID> {
        let mut buildings: IndexSet<_> = self.universe.iter_buildings().cloned().collect();
        let extra: BTreeSet<_> = self
            .keys()
            .map(|key| key.building_id)
            .chain(self.finances.keys().filter_map(|key| key.building_id.clone()))
            .filter(|building_id| !buildings.contains(building_id))
            .collect();
        buildings.extend(extra);

        buildings
    }

    /// All periods: the declared ones together with any others found in the solution
    pub fn periods(&self) -> BTreeSet<Period> {
        self.universe
            .iter_periods()
            .chain(self.keys().map(|key| key.period))
            .chain(self.finances.keys().map(|key| key.period))
            .collect()
    }

    /// All technologies found in the solution
    pub fn technologies(&self) -> BTreeSet<TechnologyID> {
        self.keys().map(|key| key.technology).collect()
    }
}

/// Identifies one solver variable, for detecting repeated assignments
#[derive(PartialEq, Eq, Hash)]
struct VariableIdentity {
    kind: VariableKind,
    building_id: Option<BuildingID>,
    period: Option<Period>,
    technology: Option<TechnologyID>,
    flow_kind: Option<FlowKind>,
    sub_index: Option<u32>,
}

impl From<&VariableToken> for VariableIdentity {
    fn from(token: &VariableToken) -> Self {
        Self {
            kind: token.kind,
            building_id: token.building_id.clone(),
            period: token.period,
            technology: token.technology.clone(),
            flow_kind: token.flow_kind.clone(),
            sub_index: token.sub_index,
        }
    }
}

/// Accumulates assignments into a [`SolutionModel`]
pub struct ModelBuilder {
    model: SolutionModel,
    values: HashMap<VariableIdentity, f64>,
    flow_parts: BTreeMap<(FlowKey, Option<u32>), Flow>,
}

impl ModelBuilder {
    /// Start building a model for the given universe
    pub fn new(universe: Universe, config: &AnalysisConfig) -> Self {
        Self {
            model: SolutionModel::empty(universe, config),
            values: HashMap::new(),
            flow_parts: BTreeMap::new(),
        }
    }

    /// Add a line of a solution file
    pub fn add_line(&mut self, line: SolutionLine) {
        match line {
            SolutionLine::Assignment(assignment) => self.add(assignment),
            SolutionLine::Rejected(rejected) => {
                if rejected.reason == RejectReason::Comment {
                    self.model.objective_value =
                        parse_objective_value(&rejected.raw).or(self.model.objective_value);
                }
                self.reject(rejected);
            }
        }
    }

    /// Record a line which did not yield an assignment
    pub fn reject(&mut self, rejected: RejectedLine) {
        self.model.diagnostics.rejects.push(rejected);
    }

    /// Add an assignment.
    ///
    /// Undecoded variables are recorded as diagnostics only. If the same variable was assigned
    /// before, the new value replaces the old one and a conflict is recorded.
    pub fn add(&mut self, assignment: Assignment) {
        let Assignment { token, value } = assignment;
        *self.model.variable_counts.entry(token.kind).or_default() += 1;

        let period = match token.period {
            Some(period) if token.is_known() => period,
            _ => {
                self.model.diagnostics.unknown.push(UnknownVariable {
                    raw_name: token.raw_name,
                    value,
                });
                return;
            }
        };

        let unknown_building = token
            .building_id
            .as_ref()
            .is_some_and(|building_id| !self.model.universe.contains_building(building_id));
        let period_out_of_range = !self.model.universe.contains_period(period);
        if unknown_building || period_out_of_range {
            self.model.diagnostics.anomalies.push(SchemaAnomaly {
                raw_name: token.raw_name.clone(),
                building_id: token.building_id.clone(),
                period,
                unknown_building,
                period_out_of_range,
            });
        }

        if let Some(previous) = self.values.insert(VariableIdentity::from(&token), value) {
            self.model.diagnostics.conflicts.push(Conflict {
                kind: token.kind,
                raw_name: token.raw_name.clone(),
                previous,
                replacement: value,
                identical: approx_eq!(f64, previous, value),
            });
        }

        let threshold = self.model.threshold;
        // Technology variables always decode with a key
        match (token.kind, token.key()) {
            (VariableKind::Installation, Some(key)) => {
                self.model.installations.insert(key, value >= threshold);
            }
            (VariableKind::Removal, Some(key)) => {
                self.model.removals.insert(key, value >= threshold);
            }
            (VariableKind::EnergyCapacity, Some(key)) => {
                self.model.capacities.insert(key, Capacity(value));
            }
            (kind, Some(key)) if kind.is_flow() => {
                let flow_kind = token.flow_kind.unwrap_or_else(|| kind.to_string().into());
                self.flow_parts
                    .insert((FlowKey::new(key, flow_kind), token.sub_index), Flow(value));
            }
            (kind, _) if kind.is_financial() => {
                let key = FinanceKey {
                    kind,
                    period,
                    building_id: token.building_id,
                    technology: token.technology,
                };
                self.model.finances.insert(key, Money(value));
            }
            _ => {}
        }
    }

    /// Finish building the model, logging a summary of any problems found
    pub fn finish(mut self) -> SolutionModel {
        for ((key, _), flow) in self.flow_parts {
            *self.model.flows.entry(key).or_default() += flow;
        }

        let model = self.model;
        let diagnostics = &model.diagnostics;
        info!(
            "Built solution model with {} installation, {} capacity, {} flow and {} financial \
             variables",
            model.installations.len(),
            model.capacities.len(),
            model.flows.len(),
            model.finances.len()
        );
        if !diagnostics.conflicts.is_empty() {
            warn!(
                "{} variables were assigned more than once; later values were kept",
                diagnostics.conflicts.len()
            );
        }
        if !diagnostics.anomalies.is_empty() {
            warn!(
                "{} variables refer to buildings or periods not declared by the instance",
                diagnostics.anomalies.len()
            );
        }
        if !diagnostics.unknown.is_empty() {
            warn!(
                "{} variable names could not be decoded",
                diagnostics.unknown.len()
            );
        }
        let malformed = diagnostics.malformed_lines().count();
        if malformed > 0 {
            warn!("{malformed} lines of the solution file were rejected");
        }

        model
    }
}
