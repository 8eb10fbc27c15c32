//! Technologies are the measures which can be installed in buildings (heat pumps, insulation etc.).
use crate::id::define_id_type;
use indexmap::IndexMap;
use serde::Deserialize;
use unicase::UniCase;

define_id_type! {TechnologyID}
define_id_type! {CategoryID}
define_id_type! {FlowKind}

/// The category assigned to technologies which match no entry in a [`CategoryTable`]
pub const OTHER_CATEGORY: &str = "other";

/// Technology names which contain the delimiter and so span several fields of a variable name
pub const DEFAULT_TECHNOLOGIES: &[&str] = &[
    "boi_gas",
    "boi_oil",
    "boi_pel",
    "hp_air",
    "hp_geo_probe",
    "hp_geo_col",
    "wall_1",
    "wall_2",
    "wall_3",
    "roof_1",
    "roof_2",
    "roof_3",
    "win_1",
    "win_2",
    "win_3",
    "rad_11",
    "rad_22",
    "rad_33",
    "tes_dhw",
    "pv_0",
    "stc_vt_0",
    "stc_fp_0",
    "dh_connection",
    "gas_connection",
];

/// Maps categories to the technology name fragments which belong to them.
///
/// A technology belongs to the first category with a keyword equal to its name (ignoring case).
/// Failing that, it belongs to the first category with a keyword contained in its name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "IndexMap<String, Vec<String>>")]
pub struct CategoryTable(pub IndexMap<CategoryID, Vec<String>>);

impl From<IndexMap<String, Vec<String>>> for CategoryTable {
    fn from(table: IndexMap<String, Vec<String>>) -> Self {
        Self(
            table
                .into_iter()
                .map(|(category, keywords)| (category.into(), keywords))
                .collect(),
        )
    }
}

impl CategoryTable {
    /// Get the category for the given technology
    pub fn categorise(&self, technology: &str) -> CategoryID {
        let name = UniCase::new(technology);
        let exact = self.0.iter().find(|(_, keywords)| {
            keywords
                .iter()
                .any(|keyword| UniCase::new(keyword.as_str()) == name)
        });
        if let Some((category, _)) = exact {
            return category.clone();
        }

        let lower = technology.to_lowercase();
        self.0
            .iter()
            .find(|(_, keywords)| {
                keywords
                    .iter()
                    .any(|keyword| lower.contains(&keyword.to_lowercase()))
            })
            .map_or_else(|| OTHER_CATEGORY.into(), |(category, _)| category.clone())
    }

    /// Iterate over the category IDs in the order they were declared
    pub fn categories(&self) -> impl Iterator<Item = &CategoryID> {
        self.0.keys()
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        let table = [
            (
                "heating",
                &[
                    "boi_gas",
                    "boi_oil",
                    "boi_pel",
                    "hp_air",
                    "hp_geo_probe",
                    "hp_geo_col",
                    "heatpump",
                    "chp",
                    "eh",
                ][..],
            ),
            (
                "envelope",
                &[
                    "wall_1", "wall_2", "wall_3", "roof_1", "roof_2", "roof_3", "win_1", "win_2",
                    "win_3",
                ][..],
            ),
            ("distribution", &["rad_11", "rad_22", "rad_33", "ufh"][..]),
            ("storage", &["tes", "tes_dhw", "bat"][..]),
            ("renewable", &["pv_0", "stc_vt_0", "stc_fp_0"][..]),
            ("connection", &["_connection"][..]),
        ];

        Self(
            table
                .into_iter()
                .map(|(category, keywords)| {
                    (
                        category.into(),
                        keywords.iter().map(ToString::to_string).collect(),
                    )
                })
                .collect(),
        )
    }
}
