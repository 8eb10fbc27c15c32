//! Decoding of solver variable names into typed, dimensioned tokens.
//!
//! A variable name such as `X_in_B12_3_HeatPump` packs a prefix, a building, a period and a
//! technology into a single delimited identifier. The [`Decoder`] recovers these fields according
//! to the prefix table in the [`AnalysisConfig`].
use crate::building::{BuildingID, Period};
use crate::config::AnalysisConfig;
use crate::model::SolutionKey;
use crate::technology::{FlowKind, TechnologyID};
use indexmap::IndexSet;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// The kind of quantity a solver variable represents
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
pub enum VariableKind {
    /// Binary decision to install a technology
    Installation,
    /// Binary decision to remove a technology
    Removal,
    /// Installed energy capacity of a technology
    EnergyCapacity,
    /// Power flow into or out of a technology
    PowerFlow,
    /// Auxiliary (e.g. heat) flow into or out of a technology
    AuxiliaryFlow,
    /// Depreciation cost of a technology in a building
    Depreciation,
    /// Rent cost of a building
    RentCost,
    /// Energy cost of a building
    EnergyCost,
    /// Equity of the portfolio
    Equity,
    /// Debt of the portfolio
    Debt,
    /// Liquidity of the portfolio
    Liquidity,
    /// A variable name which matched no recognised pattern
    Unknown,
}

/// The fields which follow the prefix of a variable name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimensions {
    /// Building, period and technology
    Technology,
    /// Building and period
    Building,
    /// Period only
    Portfolio,
}

impl VariableKind {
    /// Whether variables of this kind are flows, which may carry a label and a sub-index
    pub fn is_flow(self) -> bool {
        matches!(self, Self::PowerFlow | Self::AuxiliaryFlow)
    }

    /// Whether variables of this kind are monetary amounts
    pub fn is_financial(self) -> bool {
        matches!(
            self,
            Self::Depreciation
                | Self::RentCost
                | Self::EnergyCost
                | Self::Equity
                | Self::Debt
                | Self::Liquidity
        )
    }

    /// The fields a variable name of this kind carries after its prefix
    pub fn dimensions(self) -> Dimensions {
        match self {
            Self::RentCost | Self::EnergyCost => Dimensions::Building,
            Self::Equity | Self::Debt | Self::Liquidity => Dimensions::Portfolio,
            _ => Dimensions::Technology,
        }
    }
}

/// The decoded identity of one solver variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableToken {
    /// What the variable represents
    pub kind: VariableKind,
    /// The building the variable refers to
    pub building_id: Option<BuildingID>,
    /// The period the variable refers to
    pub period: Option<Period>,
    /// The technology the variable refers to
    pub technology: Option<TechnologyID>,
    /// The flow label, for flow variables (e.g. `P_in`)
    pub flow_kind: Option<FlowKind>,
    /// Optional trailing index of a flow variable
    pub sub_index: Option<u32>,
    /// The variable name as it appeared in the solution file
    pub raw_name: String,
}

impl VariableToken {
    /// The (building, period, technology) key of this token, if all three fields are known
    pub fn key(&self) -> Option<SolutionKey> {
        Some(SolutionKey {
            building_id: self.building_id.clone()?,
            period: self.period?,
            technology: self.technology.clone()?,
        })
    }

    /// Whether the token was decoded against a recognised pattern
    pub fn is_known(&self) -> bool {
        self.kind != VariableKind::Unknown
    }
}

/// A prefix rule split into its fields
#[derive(Debug, Clone)]
struct CompiledRule {
    prefix: String,
    fields: Vec<String>,
    kind: VariableKind,
    labelled: bool,
}

impl CompiledRule {
    /// Whether the leading fields of a variable name are this rule's prefix
    fn matches(&self, fields: &[&str]) -> bool {
        fields.len() >= self.fields.len()
            && self.fields.iter().zip(fields).all(|(prefix, field)| prefix == field)
    }
}

/// The fields which follow a matched prefix
struct DecodedFields {
    building_id: Option<BuildingID>,
    period: Period,
    technology: Option<TechnologyID>,
    sub_index: Option<u32>,
}

/// Parse a period or sub-index field. Only plain digits are accepted.
fn parse_index(field: &str) -> Option<u32> {
    if field.is_empty() || !field.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    field.parse().ok()
}

/// Decodes variable names according to an [`AnalysisConfig`].
///
/// The decoder is immutable once built, so it can be shared freely between threads.
#[derive(Debug, Clone)]
pub struct Decoder {
    delimiter: char,
    rules: Vec<CompiledRule>,
    technologies: IndexSet<TechnologyID>,
}

impl Decoder {
    /// Create a decoder from the prefix table and technology vocabulary of `config`.
    ///
    /// Fixed prefixes are tried before labelled families and longer prefixes before shorter ones.
    pub fn new(config: &AnalysisConfig) -> Self {
        let mut rules = config
            .prefixes
            .iter()
            .map(|rule| CompiledRule {
                prefix: rule.prefix.clone(),
                fields: rule
                    .prefix
                    .split(config.delimiter)
                    .map(ToString::to_string)
                    .collect(),
                kind: rule.kind,
                labelled: rule.labelled,
            })
            .collect_vec();
        rules.sort_by_key(|rule| (rule.labelled, Reverse(rule.fields.len())));

        Self {
            delimiter: config.delimiter,
            rules,
            technologies: config.technologies.clone(),
        }
    }

    /// Decode a single variable name.
    ///
    /// The prefix rules which match the leading fields are tried in order and the first one which
    /// can consume the remaining fields exactly is used. If none can, the result has kind
    /// [`VariableKind::Unknown`], with the other fields filled in on a best-effort basis for
    /// diagnostics.
    pub fn decode(&self, name: &str) -> VariableToken {
        let fields = name.split(self.delimiter).collect_vec();
        self.rules
            .iter()
            .filter(|rule| rule.matches(&fields))
            .find_map(|rule| self.decode_with(rule, name, &fields))
            .unwrap_or_else(|| self.unknown(name, &fields))
    }

    /// Decode a variable name whose leading fields match `rule`
    fn decode_with(
        &self,
        rule: &CompiledRule,
        name: &str,
        fields: &[&str],
    ) -> Option<VariableToken> {
        let mut rest = &fields[rule.fields.len()..];
        let mut flow_kind: Option<FlowKind> =
            rule.kind.is_flow().then(|| rule.prefix.as_str().into());
        if rule.labelled {
            let (label, tail) = rest.split_first()?;
            if label.is_empty() {
                return None;
            }
            flow_kind = Some(format!("{}{}{label}", rule.prefix, self.delimiter).into());
            rest = tail;
        }

        let decoded = match rule.kind.dimensions() {
            Dimensions::Technology => self.decode_technology_fields(rule.kind, rest)?,
            Dimensions::Building => match rest {
                [building, period] if !building.is_empty() => DecodedFields {
                    building_id: Some((*building).into()),
                    period: parse_index(period)?,
                    technology: None,
                    sub_index: None,
                },
                _ => return None,
            },
            Dimensions::Portfolio => match rest {
                [period] => DecodedFields {
                    building_id: None,
                    period: parse_index(period)?,
                    technology: None,
                    sub_index: None,
                },
                _ => return None,
            },
        };

        Some(VariableToken {
            kind: rule.kind,
            building_id: decoded.building_id,
            period: Some(decoded.period),
            technology: decoded.technology,
            flow_kind,
            sub_index: decoded.sub_index,
            raw_name: name.to_string(),
        })
    }

    /// Consume the building, period, technology and optional sub-index fields
    fn decode_technology_fields(
        &self,
        kind: VariableKind,
        fields: &[&str],
    ) -> Option<DecodedFields> {
        let [building, period, tech_fields @ ..] = fields else {
            return None;
        };
        if building.is_empty() {
            return None;
        }
        let period = parse_index(period)?;

        let (technology, sub_index) = match self.technology(tech_fields) {
            Some(technology) => (technology, None),
            None if kind.is_flow() => {
                let (sub_index, tech_fields) = tech_fields.split_last()?;
                let sub_index = parse_index(sub_index)?;
                (self.technology(tech_fields)?, Some(sub_index))
            }
            None => return None,
        };

        Some(DecodedFields {
            building_id: Some((*building).into()),
            period,
            technology: Some(technology),
            sub_index,
        })
    }

    /// Interpret `fields` as a technology name.
    ///
    /// A single non-empty field is always accepted. Several fields are accepted only if their
    /// joined name is in the technology vocabulary.
    fn technology(&self, fields: &[&str]) -> Option<TechnologyID> {
        match fields {
            [] => None,
            [single] => (!single.is_empty()).then(|| (*single).into()),
            _ => {
                let joined = fields.join(&self.delimiter.to_string());
                self.technologies.get(joined.as_str()).cloned()
            }
        }
    }

    /// Build an unknown token, guessing at its dimensions.
    ///
    /// The first integer field after the leading one is taken as the period, the field before it
    /// as the building and everything after it as the technology.
    fn unknown(&self, name: &str, fields: &[&str]) -> VariableToken {
        let period_pos = fields
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(pos, field)| parse_index(field).map(|period| (pos, period)));

        let (building_id, period, technology) = match period_pos {
            Some((pos, period)) => {
                let building = fields[pos - 1];
                let tail = &fields[pos + 1..];
                (
                    (!building.is_empty()).then(|| building.into()),
                    Some(period),
                    (!tail.is_empty()).then(|| tail.join(&self.delimiter.to_string()).into()),
                )
            }
            None => (None, None, None),
        };

        VariableToken {
            kind: VariableKind::Unknown,
            building_id,
            period,
            technology,
            flow_kind: None,
            sub_index: None,
            raw_name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn decoder() -> Decoder {
        Decoder::new(&AnalysisConfig::default())
    }

    /// Assemble a variable name from its parts
    fn encode(
        prefix: &str,
        building: &str,
        period: Period,
        technology: &str,
        sub_index: Option<u32>,
    ) -> String {
        match sub_index {
            Some(sub_index) => format!("{prefix}_{building}_{period}_{technology}_{sub_index}"),
            None => format!("{prefix}_{building}_{period}_{technology}"),
        }
    }

    #[test]
    fn test_decode_installation() {
        let token = decoder().decode("X_in_B12_3_HeatPump");
        assert_eq!(
            token,
            VariableToken {
                kind: VariableKind::Installation,
                building_id: Some("B12".into()),
                period: Some(3),
                technology: Some("HeatPump".into()),
                flow_kind: None,
                sub_index: None,
                raw_name: "X_in_B12_3_HeatPump".into(),
            }
        );
        assert_eq!(
            token.key(),
            Some(SolutionKey {
                building_id: "B12".into(),
                period: 3,
                technology: "HeatPump".into()
            })
        );
    }

    #[rstest]
    #[case("X_in", VariableKind::Installation, None)]
    #[case("X_out", VariableKind::Removal, None)]
    #[case("E_in", VariableKind::EnergyCapacity, None)]
    #[case("P_in", VariableKind::PowerFlow, Some(2))]
    #[case("P_el", VariableKind::PowerFlow, None)]
    #[case("Q_out", VariableKind::AuxiliaryFlow, Some(0))]
    fn test_decode_recovers_fields(
        decoder: Decoder,
        #[case] prefix: &str,
        #[case] kind: VariableKind,
        #[case] sub_index: Option<u32>,
        #[values("0", "B7", "building-12")] building: &str,
        #[values(0, 1, 25)] period: Period,
        #[values("HeatPump", "hp_air", "stc_vt_0")] technology: &str,
    ) {
        let name = encode(prefix, building, period, technology, sub_index);
        let token = decoder.decode(&name);
        assert_eq!(token.kind, kind);
        assert_eq!(token.building_id, Some(building.into()));
        assert_eq!(token.period, Some(period));
        assert_eq!(token.technology, Some(technology.into()));
        assert_eq!(token.sub_index, sub_index);
        assert_eq!(token.flow_kind.is_some(), kind.is_flow());
        assert_eq!(token.raw_name, name);
    }

    #[test]
    fn test_decode_flow_label() {
        let token = decoder().decode("P_el_B1_2_pv_0");
        assert_eq!(token.flow_kind, Some("P_el".into()));
        assert_eq!(token.technology, Some("pv_0".into()));
        assert_eq!(token.sub_index, None);
    }

    #[rstest]
    #[case("X_in_B12_3")] // too few fields
    #[case("X_in_B12_3_HeatPump_1")] // sub-index on a decision
    #[case("X_in_B12_x_HeatPump")] // non-integer period
    #[case("X_in_B12_-1_HeatPump")] // negative period
    #[case("X_in__3_HeatPump")] // empty building
    #[case("X_in_B12_3_")] // empty technology
    #[case("E_in_B12_3_foo_bar")] // multi-field technology not in vocabulary
    #[case("P_in_B12_3_HeatPump_x")] // non-integer sub-index
    #[case("P_in_B12_3_foo_bar_1")] // sub-index after unknown technology
    #[case("P__B12_3_HeatPump")] // empty flow label
    #[case("P")] // nothing after family prefix
    #[case("X_in_B12_+3_HeatPump")] // signed period
    #[case("P_in_B12_3_HeatPump_+1")] // signed sub-index
    #[case("Q_+3")] // signed portfolio period
    #[case("D_1_2")] // too many fields for a portfolio variable
    #[case("C_rent_B1")] // building cost without a period
    #[case("C_rent_B1_2_hp_air")] // building cost with a technology
    #[case("Y_in_B12_3_HeatPump")] // unrecognised prefix
    #[case("garbled_entry")]
    #[case("")]
    fn test_decode_unknown(decoder: Decoder, #[case] name: &str) {
        let token = decoder.decode(name);
        assert_eq!(token.kind, VariableKind::Unknown);
        assert!(!token.is_known());
        assert_eq!(token.flow_kind, None);
        assert_eq!(token.raw_name, name);
    }

    #[rstest]
    #[case("Q_3", VariableKind::Equity, None, 3, None)]
    #[case("D_0", VariableKind::Debt, None, 0, None)]
    #[case("L_12", VariableKind::Liquidity, None, 12, None)]
    #[case("C_rent_B1_2", VariableKind::RentCost, Some("B1"), 2, None)]
    #[case("C_en_7_0", VariableKind::EnergyCost, Some("7"), 0, None)]
    #[case("C_dep_B1_2_hp_air", VariableKind::Depreciation, Some("B1"), 2, Some("hp_air"))]
    fn test_decode_financial(
        decoder: Decoder,
        #[case] name: &str,
        #[case] kind: VariableKind,
        #[case] building: Option<&str>,
        #[case] period: Period,
        #[case] technology: Option<&str>,
    ) {
        let token = decoder.decode(name);
        assert_eq!(token.kind, kind);
        assert!(kind.is_financial());
        assert_eq!(token.building_id, building.map(BuildingID::from));
        assert_eq!(token.period, Some(period));
        assert_eq!(token.technology, technology.map(TechnologyID::from));
        assert_eq!(token.flow_kind, None);
    }

    #[rstest]
    fn test_equity_and_auxiliary_flow_share_prefix(decoder: Decoder) {
        let token = decoder.decode("Q_in_B2_2_wall_2");
        assert_eq!(token.kind, VariableKind::AuxiliaryFlow);
        assert_eq!(token.flow_kind, Some("Q_in".into()));
        assert_eq!(token.technology, Some("wall_2".into()));

        let token = decoder.decode("Q_2");
        assert_eq!(token.kind, VariableKind::Equity);
        assert_eq!(token.key(), None);
    }

    #[test]
    fn test_decode_unknown_best_effort() {
        let token = decoder().decode("Y_in_B12_3_HeatPump");
        assert_eq!(token.building_id, Some("B12".into()));
        assert_eq!(token.period, Some(3));
        assert_eq!(token.technology, Some("HeatPump".into()));
        assert_eq!(token.key().map(|key| key.period), Some(3));

        let token = decoder().decode("garbled_entry");
        assert_eq!(token.key(), None);
    }

    #[test]
    fn test_fixed_prefix_wins_over_family() {
        let mut config = AnalysisConfig::default();
        config.prefixes.push(crate::config::PrefixRule::fixed(
            "P_total",
            VariableKind::EnergyCapacity,
        ));
        let token = Decoder::new(&config).decode("P_total_B1_0_HeatPump");
        assert_eq!(token.kind, VariableKind::EnergyCapacity);
        assert_eq!(token.flow_kind, None);
    }

    #[test]
    fn test_fixed_flow_prefix() {
        let mut config = AnalysisConfig::default();
        config.prefixes.push(crate::config::PrefixRule::fixed(
            "H",
            VariableKind::AuxiliaryFlow,
        ));
        let token = Decoder::new(&config).decode("H_B1_0_HeatPump_2");
        assert_eq!(token.kind, VariableKind::AuxiliaryFlow);
        assert_eq!(token.flow_kind, Some("H".into()));
        assert_eq!(token.sub_index, Some(2));
    }

    #[test]
    fn test_custom_delimiter() {
        let config = AnalysisConfig {
            delimiter: '.',
            prefixes: vec![crate::config::PrefixRule::fixed(
                "X.in",
                VariableKind::Installation,
            )],
            ..AnalysisConfig::default()
        };
        let token = Decoder::new(&config).decode("X.in.B_1.4.hp_air");
        assert_eq!(token.kind, VariableKind::Installation);
        assert_eq!(token.building_id, Some("B_1".into()));
        assert_eq!(token.technology, Some("hp_air".into()));
    }

    #[rstest]
    #[case(VariableKind::Installation, "installation")]
    #[case(VariableKind::EnergyCapacity, "energy_capacity")]
    #[case(VariableKind::AuxiliaryFlow, "auxiliary_flow")]
    #[case(VariableKind::RentCost, "rent_cost")]
    fn test_kind_display(#[case] kind: VariableKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
    }
}
