//! Buildings and the declared universe of buildings and periods for an instance.
use crate::id::define_id_type;
use indexmap::IndexSet;
use serde::Serialize;
use std::ops::Range;

define_id_type! {BuildingID}

/// A discrete time period in the optimisation horizon
pub type Period = u32;

/// The buildings and periods an instance declares in its configuration tables.
///
/// Either part may be unknown, in which case nothing is checked against it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Universe {
    /// Declared buildings, if a building table was available
    pub buildings: Option<IndexSet<BuildingID>>,
    /// Declared periods, if the number of periods could be determined
    pub periods: Option<Range<Period>>,
}

impl Universe {
    /// Whether `building_id` is consistent with the declared buildings
    pub fn contains_building(&self, building_id: &BuildingID) -> bool {
        self.buildings
            .as_ref()
            .is_none_or(|buildings| buildings.contains(building_id))
    }

    /// Whether `period` is consistent with the declared period range
    pub fn contains_period(&self, period: Period) -> bool {
        self.periods
            .as_ref()
            .is_none_or(|periods| periods.contains(&period))
    }

    /// Iterate over the declared buildings (empty if unknown)
    pub fn iter_buildings(&self) -> impl Iterator<Item = &BuildingID> {
        self.buildings.iter().flatten()
    }

    /// Iterate over the declared periods (empty if unknown)
    pub fn iter_periods(&self) -> impl Iterator<Item = Period> {
        self.periods.clone().into_iter().flatten()
    }
}
