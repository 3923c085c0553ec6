//! Engine configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tunable policy constants for the validation engine.
///
/// Every field has a default, so an empty TOML table is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Units assumed for a course whose unit value cannot be fetched.
    pub default_units: Decimal,
    /// Requirement attributions a single course may hold (triple-count guard).
    pub max_attributions: u32,
    /// Programmes a single course may be double counted into.
    pub max_double_count_programmes: usize,
    /// Minors allowed in one programme selection.
    pub max_minors: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_units: Decimal::from(4),
            max_attributions: 2,
            max_double_count_programmes: 2,
            max_minors: 3,
        }
    }
}
