//! Engine Configuration
//!
//! Everything the engine needs that is not part of a snapshot's graph or
//! grid: the initial grid size, how many value channels each cell carries,
//! the initial staged-evaluation limits, and the two static lookup tables
//! used by `List A` / `List B` nodes.
//!
//! The lookup tables live here rather than in global state so evaluation
//! stays a pure function of `(State, EngineConfig)`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The maximum number of value channels a cell can carry.
pub const MAX_CHANNELS: usize = 3;

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("grid dimensions must be positive, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },

    #[error("channel count must be between 1 and 3, got {0}")]
    ChannelCount(usize),
}

/// The two fixed numeric tables indexed by `List A` and `List B` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupTables {
    pub list_a: Vec<f64>,
    pub list_b: Vec<f64>,
}

impl LookupTables {
    /// Create tables from explicit contents.
    pub fn new(list_a: Vec<f64>, list_b: Vec<f64>) -> Self {
        Self { list_a, list_b }
    }

    /// Look up `index` in table A. Non-integral, negative, or out-of-range
    /// indices yield `None`.
    pub fn a(&self, index: f64) -> Option<f64> {
        lookup(&self.list_a, index)
    }

    /// Look up `index` in table B.
    pub fn b(&self, index: f64) -> Option<f64> {
        lookup(&self.list_b, index)
    }
}

fn lookup(table: &[f64], index: f64) -> Option<f64> {
    if !index.is_finite() || index < 0.0 || index.fract() != 0.0 {
        return None;
    }
    table.get(index as usize).copied()
}

impl Default for LookupTables {
    fn default() -> Self {
        Self {
            list_a: vec![3.0, 7.0, 1.0, 9.0, 4.0, 6.0, 2.0, 8.0, 5.0, 0.0],
            list_b: vec![12.0, 5.0, 17.0, 8.0, 3.0, 14.0, 10.0, 1.0, 19.0, 6.0],
        }
    }
}

/// Configuration for a fresh engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial grid width (number of columns).
    pub width: usize,
    /// Initial grid height (number of rows).
    pub height: usize,
    /// Number of value channels per cell, 1..=3.
    pub channels: usize,
    /// Initial preview budget. `None` evaluates the whole program.
    pub lhs_step: Option<usize>,
    /// Initial per-cell budget. `None` evaluates every cell.
    pub rhs_step: Option<usize>,
    /// Tables used by `List A` / `List B` nodes.
    pub lookup: LookupTables,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 12,
            channels: 1,
            lhs_step: None,
            rhs_step: None,
            lookup: LookupTables::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a configuration from JSON. Missing fields take
    /// their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants a fresh state relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::ChannelCount(self.channels));
        }
        Ok(())
    }

    /// Builder-style override of the grid size.
    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Builder-style override of the channel count.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let config = EngineConfig::from_json(r#"{"width": 6, "height": 1}"#).unwrap();
        assert_eq!(config.width, 6);
        assert_eq!(config.height, 1);
        assert_eq!(config.channels, 1);
        assert_eq!(config.lookup, LookupTables::default());
    }

    #[test]
    fn rejects_bad_channel_count() {
        let err = EngineConfig::from_json(r#"{"channels": 4}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ChannelCount(4)));
    }

    #[test]
    fn rejects_empty_grid() {
        let err = EngineConfig::from_json(r#"{"width": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyGrid { width: 0, .. }));
    }

    #[test]
    fn lookup_requires_integral_in_range_index() {
        let tables = LookupTables::new(vec![10.0, 20.0], vec![]);
        assert_eq!(tables.a(1.0), Some(20.0));
        assert_eq!(tables.a(2.0), None);
        assert_eq!(tables.a(0.5), None);
        assert_eq!(tables.a(-1.0), None);
        assert_eq!(tables.a(f64::NAN), None);
        assert_eq!(tables.b(0.0), None);
    }
}
