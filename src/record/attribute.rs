//! Journal attributes: named values the user records about a night.

use serde::{Deserialize, Serialize};

use super::event::LifeStage;

/// Definition of an attribute the journal can hold.
///
/// Attributes with a `fixed_slot` live in the record's fixed-slot
/// collection at that index; the rest are appended to the variable list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub stage: LifeStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_slot: Option<usize>,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, stage: LifeStage) -> Self {
        Self {
            name: name.into(),
            stage,
            fixed_slot: None,
        }
    }

    pub fn fixed(name: impl Into<String>, stage: LifeStage, slot: usize) -> Self {
        Self {
            name: name.into(),
            stage,
            fixed_slot: Some(slot),
        }
    }
}

/// A recorded attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub stage: LifeStage,
    pub name: String,
    pub value: String,
    /// Optional 1..=5 rating; 0 when not rated
    #[serde(default)]
    pub likert: f32,
}

impl AttributeValue {
    pub fn matches(&self, def: &AttributeDef) -> bool {
        self.stage == def.stage && self.name == def.name
    }

    pub fn summary(&self) -> String {
        if self.likert > 0.0 {
            format!("{}={} ({:.1})", self.name, self.value, self.likert)
        } else {
            format!("{}={}", self.name, self.value)
        }
    }
}
