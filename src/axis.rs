//! The six ISI axes.
//!
//! Each axis measures external supplier concentration along one
//! dependency dimension. Axis ids (1-6) and slugs are frozen; adding or
//! renaming an axis requires a new methodology version.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the six ISI dependency axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Axis 1: financial external supplier concentration.
    Financial,
    /// Axis 2: energy external supplier concentration.
    Energy,
    /// Axis 3: semiconductor/technology external supplier concentration.
    Technology,
    /// Axis 4: defense external supplier concentration.
    Defense,
    /// Axis 5: critical raw-materials external supplier concentration.
    CriticalInputs,
    /// Axis 6: freight/logistics external supplier concentration.
    Logistics,
}

impl Axis {
    /// All six axes in axis-id order.
    pub const ALL: [Axis; 6] = [
        Axis::Financial,
        Axis::Energy,
        Axis::Technology,
        Axis::Defense,
        Axis::CriticalInputs,
        Axis::Logistics,
    ];

    /// Stable numeric id, 1-6.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Axis::Financial => 1,
            Axis::Energy => 2,
            Axis::Technology => 3,
            Axis::Defense => 4,
            Axis::CriticalInputs => 5,
            Axis::Logistics => 6,
        }
    }

    /// Short slug used in hash inputs, scenario requests, and detail files.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Axis::Financial => "financial",
            Axis::Energy => "energy",
            Axis::Technology => "technology",
            Axis::Defense => "defense",
            Axis::CriticalInputs => "critical_inputs",
            Axis::Logistics => "logistics",
        }
    }

    /// Key under which this axis appears in summary rows
    /// (`axis_1_financial` ... `axis_6_logistics`).
    #[must_use]
    pub const fn summary_key(self) -> &'static str {
        match self {
            Axis::Financial => "axis_1_financial",
            Axis::Energy => "axis_2_energy",
            Axis::Technology => "axis_3_technology",
            Axis::Defense => "axis_4_defense",
            Axis::CriticalInputs => "axis_5_critical_inputs",
            Axis::Logistics => "axis_6_logistics",
        }
    }

    /// Looks up an axis by numeric id.
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Axis> {
        match id {
            1 => Some(Axis::Financial),
            2 => Some(Axis::Energy),
            3 => Some(Axis::Technology),
            4 => Some(Axis::Defense),
            5 => Some(Axis::CriticalInputs),
            6 => Some(Axis::Logistics),
            _ => None,
        }
    }

    /// Looks up an axis by slug.
    #[must_use]
    pub fn from_slug(slug: &str) -> Option<Axis> {
        Axis::ALL.into_iter().find(|a| a.slug() == slug)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}
