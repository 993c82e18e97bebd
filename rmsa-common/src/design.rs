//! Study design table
//!
//! Single source of truth for the study vocabulary: the condition alphabet,
//! the Likert items with their phase and keying direction, the composite
//! constructs, the session-level section names and the controlled vocabulary
//! for parameter-influence selections.
//!
//! A `StudyDesign` is built once (compiled default or `[design]` TOML table),
//! validated, and then passed by reference into every pipeline stage. Nothing
//! in the workspace reads the vocabulary from global state.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Survey phase of a block section
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Rated before the modality reveal
    Pre,
    /// Rated after the modality reveal
    Post,
    /// End-of-session ranking/choice questions
    End,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
            Phase::End => "end",
        }
    }

    /// Parse a block phase suffix (`pre` or `post` only)
    pub fn from_block_suffix(s: &str) -> Option<Self> {
        match s {
            "pre" => Some(Phase::Pre),
            "post" => Some(Phase::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer Likert scale bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub min: i32,
    pub max: i32,
}

impl Scale {
    /// Mirror a value across the scale: `max + min - v`
    pub fn reverse(&self, value: f64) -> f64 {
        (self.max + self.min) as f64 - value
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min as f64 && value <= self.max as f64
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self { min: 1, max: 7 }
    }
}

/// One experimental condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub code: String,
    pub label: String,
}

/// One Likert item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub code: String,
    pub label: String,
    pub phase: Phase,
    /// +1 normally keyed, -1 reverse keyed
    #[serde(default = "default_direction")]
    pub direction: i8,
}

fn default_direction() -> i8 {
    1
}

impl Item {
    pub fn is_reverse_keyed(&self) -> bool {
        self.direction < 0
    }
}

/// Composite index over a set of items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Construct {
    pub name: String,
    pub items: Vec<String>,
    #[serde(default)]
    pub reverse: Vec<String>,
    #[serde(default)]
    pub formula: String,
    #[serde(default)]
    pub interpretation: String,
}

/// End-of-session section layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndSection {
    /// Per-condition rank fields are `<rank_prefix><condition>`
    pub rank_prefix: String,
    /// Item name used for rank rows in the long table
    pub rank_item: String,
    /// Single-choice fields whose value names a condition
    pub choice_fields: Vec<String>,
}

impl Default for EndSection {
    fn default() -> Self {
        Self {
            rank_prefix: "rank_".to_string(),
            rank_item: "rank".to_string(),
            choice_fields: vec!["most_intermedial".to_string(), "biggest_mismatch".to_string()],
        }
    }
}

/// Complete declarative study design
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyDesign {
    #[serde(default)]
    pub scale: Scale,
    pub conditions: Vec<Condition>,
    pub items: Vec<Item>,
    #[serde(default)]
    pub constructs: Vec<Construct>,
    /// Literal section keys recognised as session-level sections
    #[serde(default = "default_session_sections")]
    pub session_sections: Vec<String>,
    /// Payload field in the `meta` section holding the declared block order
    #[serde(default = "default_order_field")]
    pub order_field: String,
    /// Post-phase multi-select field naming influential parameters
    #[serde(default = "default_param_field")]
    pub param_field: String,
    /// Post-phase free-text "other parameter" field
    #[serde(default = "default_param_other_field")]
    pub param_other_field: String,
    /// Controlled vocabulary for `param_field`
    #[serde(default)]
    pub known_params: Vec<String>,
    /// Free-text fields collected from block payloads
    #[serde(default = "default_block_text_fields")]
    pub block_text_fields: Vec<String>,
    /// Free-text fields collected from the end payload
    #[serde(default = "default_end_text_fields")]
    pub end_text_fields: Vec<String>,
    #[serde(default)]
    pub end: EndSection,
}

fn default_session_sections() -> Vec<String> {
    ["meta", "background", "end", "dyad", "dyad_gate"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_order_field() -> String {
    "order".to_string()
}

fn default_param_field() -> String {
    "param_influence".to_string()
}

fn default_param_other_field() -> String {
    "param_other".to_string()
}

fn default_block_text_fields() -> Vec<String> {
    ["aim", "strategy", "expectation_vs_outcome", "interference_notes", "param_other"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_end_text_fields() -> Vec<String> {
    ["one_change", "reflection"].iter().map(|s| s.to_string()).collect()
}

/// Label for the synthetic "Other" parameter selection
pub const OTHER_PARAM: &str = "Other";

impl StudyDesign {
    /// Look up a condition by code
    pub fn condition(&self, code: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.code == code)
    }

    pub fn is_condition(&self, code: &str) -> bool {
        self.condition(code).is_some()
    }

    /// Condition codes in declared order
    pub fn condition_codes(&self) -> Vec<&str> {
        self.conditions.iter().map(|c| c.code.as_str()).collect()
    }

    /// Index of an item in declared order
    pub fn item_index(&self, code: &str) -> Option<usize> {
        self.items.iter().position(|i| i.code == code)
    }

    pub fn item(&self, code: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.code == code)
    }

    /// Items for one phase, in declared order
    pub fn items_for_phase(&self, phase: Phase) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |i| i.phase == phase)
    }

    /// First declared construct containing the item
    pub fn construct_for_item(&self, code: &str) -> Option<&Construct> {
        self.constructs.iter().find(|c| c.items.iter().any(|i| i == code))
    }

    pub fn is_session_section(&self, key: &str) -> bool {
        self.session_sections.iter().any(|s| s == key)
    }

    pub fn is_known_param(&self, label: &str) -> bool {
        label == OTHER_PARAM || self.known_params.iter().any(|p| p == label)
    }

    /// Keys that are meaningful on a record even outside a payload mapping
    pub fn auxiliary_keys(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = BTreeSet::new();
        keys.insert(self.order_field.clone());
        keys.insert(self.param_field.clone());
        keys.insert(self.param_other_field.clone());
        keys.extend(self.block_text_fields.iter().cloned());
        keys.extend(self.end_text_fields.iter().cloned());
        keys.extend(self.end.choice_fields.iter().cloned());
        for c in &self.conditions {
            keys.insert(format!("{}{}", self.end.rank_prefix, c.code));
        }
        keys
    }

    /// Validate internal consistency
    ///
    /// Reversal subsets that disagree with the items' declared direction are
    /// reported as warnings only: the construct table is authoritative.
    pub fn validate(&self) -> Result<()> {
        if self.scale.min >= self.scale.max {
            return Err(Error::Config(format!(
                "scale.min ({}) must be below scale.max ({})",
                self.scale.min, self.scale.max
            )));
        }

        if self.conditions.is_empty() {
            return Err(Error::Config("at least one condition is required".to_string()));
        }
        let mut seen = BTreeSet::new();
        for c in &self.conditions {
            if c.code.is_empty() || c.code.contains('_') {
                return Err(Error::Config(format!(
                    "condition code {:?} must be non-empty and contain no '_'",
                    c.code
                )));
            }
            if !seen.insert(c.code.as_str()) {
                return Err(Error::Config(format!("duplicate condition code {:?}", c.code)));
            }
        }

        let mut item_codes: HashMap<&str, &Item> = HashMap::new();
        for item in &self.items {
            if item.phase == Phase::End {
                return Err(Error::Config(format!(
                    "item {} must be declared in phase pre or post",
                    item.code
                )));
            }
            if item.direction != 1 && item.direction != -1 {
                return Err(Error::Config(format!(
                    "item {} has direction {} (expected 1 or -1)",
                    item.code, item.direction
                )));
            }
            if item_codes.insert(item.code.as_str(), item).is_some() {
                return Err(Error::Config(format!("duplicate item code {:?}", item.code)));
            }
        }

        let mut construct_names = BTreeSet::new();
        for construct in &self.constructs {
            if !construct_names.insert(construct.name.as_str()) {
                return Err(Error::Config(format!("duplicate construct {:?}", construct.name)));
            }
            if construct.items.is_empty() {
                return Err(Error::Config(format!("construct {:?} has no items", construct.name)));
            }
            for code in &construct.items {
                if !item_codes.contains_key(code.as_str()) {
                    return Err(Error::Config(format!(
                        "construct {:?} references undeclared item {}",
                        construct.name, code
                    )));
                }
            }
            for code in &construct.reverse {
                if !construct.items.contains(code) {
                    return Err(Error::Config(format!(
                        "construct {:?} reverses {} which is not one of its items",
                        construct.name, code
                    )));
                }
            }
            for code in &construct.items {
                let reversed = construct.reverse.contains(code);
                let keyed_reverse = item_codes[code.as_str()].is_reverse_keyed();
                if reversed != keyed_reverse {
                    tracing::warn!(
                        construct = %construct.name,
                        item = %code,
                        "Reversal subset disagrees with item direction"
                    );
                }
            }
        }

        Ok(())
    }

    /// Compiled default: three-condition reveal study, A1-A7 pre, B1-B12 post
    pub fn builtin() -> Self {
        let conditions = [("A", "Visual Only"), ("B", "Audio Only"), ("C", "Audiovisual")]
            .iter()
            .map(|(code, label)| Condition {
                code: code.to_string(),
                label: label.to_string(),
            })
            .collect();

        let item_table: &[(&str, &str, Phase, i8)] = &[
            ("A_1", "A1 satisfaction", Phase::Pre, 1),
            ("A_2", "A2 intention clarity", Phase::Pre, 1),
            ("A_3", "A3 steerability", Phase::Pre, 1),
            ("A_4", "A4 interface workable", Phase::Pre, 1),
            ("A_5", "A5 useful surprise", Phase::Pre, 1),
            ("A_6", "A6 frustrating unpredictability", Phase::Pre, -1),
            ("A_7", "A7 others would find interesting", Phase::Pre, 1),
            ("B_1", "B1 same-process", Phase::Post, 1),
            ("B_2", "B2 balanced modalities", Phase::Post, 1),
            ("B_3", "B3 coherent/legible relationship", Phase::Post, 1),
            ("B_4", "B4 constructive interference", Phase::Post, 1),
            ("B_5", "B5 destructive interference", Phase::Post, -1),
            ("B_6", "B6 overload", Phase::Post, -1),
            ("B_7", "B7 expectation match", Phase::Post, 1),
            ("B_8", "B8 interpretation change", Phase::Post, 1),
            ("B_9", "B9 plausible causal story", Phase::Post, 1),
            ("B_10", "B10 system autonomy", Phase::Post, 1),
            ("B_11", "B11 relied on visual cues", Phase::Post, 1),
            ("B_12", "B12 relied on theory cues", Phase::Post, 1),
        ];
        let items = item_table
            .iter()
            .map(|(code, label, phase, direction)| Item {
                code: code.to_string(),
                label: label.to_string(),
                phase: *phase,
                direction: *direction,
            })
            .collect();

        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let constructs = vec![
            Construct {
                name: "Intermediality Index".to_string(),
                items: strings(&["B_1", "B_2", "B_3", "B_4", "B_5", "B_6"]),
                reverse: strings(&["B_5", "B_6"]),
                formula: "mean(reverse-coded B1-B6)".to_string(),
                interpretation: "Higher values indicate stronger intermedial coherence".to_string(),
            },
            Construct {
                name: "Agency Index".to_string(),
                items: strings(&["A_2", "A_3", "A_4", "A_6"]),
                reverse: strings(&["A_6"]),
                formula: "mean(A2, A3, A4, reverse-coded A6)".to_string(),
                interpretation: "Higher values indicate stronger perceived agency".to_string(),
            },
            Construct {
                name: "Mismatch Index".to_string(),
                items: strings(&["B_7", "B_8"]),
                reverse: Vec::new(),
                formula: "mean(B7, B8)".to_string(),
                interpretation: "Higher values indicate stronger expectation shifts".to_string(),
            },
        ];

        let known_params = strings(&[
            "Rate",
            "Loop On/Off",
            "Loop Length",
            "Life Length",
            "Min Population",
            "Max Population",
            "Neighbourhood (Local/Extended)",
            "Min Neighbours",
            "Max Neighbours",
            "Scale",
        ]);

        Self {
            scale: Scale::default(),
            conditions,
            items,
            constructs,
            session_sections: default_session_sections(),
            order_field: default_order_field(),
            param_field: default_param_field(),
            param_other_field: default_param_other_field(),
            known_params,
            block_text_fields: default_block_text_fields(),
            end_text_fields: default_end_text_fields(),
            end: EndSection::default(),
        }
    }
}

impl Default for StudyDesign {
    fn default() -> Self {
        Self::builtin()
    }
}
