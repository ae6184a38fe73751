//! Pipeline configuration types
//!
//! Everything the transformation pipeline can be tuned with lives here. All
//! fields have serde defaults so an empty table deserializes to the defaults.

use crate::align::Interpolation;
use serde::{Deserialize, Serialize};

/// Default maximum number of rendered points per channel
pub const DEFAULT_POINT_BUDGET: usize = 2000;

/// Configuration for the transformation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of data points emitted per rendered channel
    #[serde(default = "default_point_budget")]
    pub point_budget: usize,

    /// How math channel inputs are resampled onto input A's timestamps
    #[serde(default)]
    pub math_interpolation: Interpolation,

    /// How filter inputs are resampled onto input A's timestamps
    #[serde(default)]
    pub filter_interpolation: Interpolation,

    /// Smallest accepted filter buffer in seconds
    #[serde(default)]
    pub min_buffer_secs: f64,

    /// Largest accepted filter buffer in seconds (default: 10 minutes)
    #[serde(default = "default_max_buffer")]
    pub max_buffer_secs: f64,
}

fn default_point_budget() -> usize {
    DEFAULT_POINT_BUDGET
}

fn default_max_buffer() -> f64 {
    600.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            point_budget: DEFAULT_POINT_BUDGET,
            math_interpolation: Interpolation::default(),
            filter_interpolation: Interpolation::default(),
            min_buffer_secs: 0.0,
            max_buffer_secs: default_max_buffer(),
        }
    }
}

/// Inclusive range a filter buffer must fall in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferLimits {
    pub min: f64,
    pub max: f64,
}

impl BufferLimits {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, buffer: f64) -> bool {
        buffer >= self.min && buffer <= self.max
    }
}

impl Default for BufferLimits {
    fn default() -> Self {
        PipelineConfig::default().buffer_limits()
    }
}

impl PipelineConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the per-channel point budget
    pub fn with_point_budget(mut self, budget: usize) -> Self {
        self.point_budget = budget;
        self
    }

    /// Builder method: set math channel interpolation
    pub fn with_math_interpolation(mut self, mode: Interpolation) -> Self {
        self.math_interpolation = mode;
        self
    }

    /// Builder method: set filter input interpolation
    pub fn with_filter_interpolation(mut self, mode: Interpolation) -> Self {
        self.filter_interpolation = mode;
        self
    }

    /// Builder method: set the accepted filter buffer range
    pub fn with_buffer_range(mut self, min_secs: f64, max_secs: f64) -> Self {
        self.min_buffer_secs = min_secs;
        self.max_buffer_secs = max_secs;
        self
    }

    pub fn buffer_limits(&self) -> BufferLimits {
        BufferLimits::new(self.min_buffer_secs, self.max_buffer_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_builder() {
        let config = PipelineConfig::new()
            .with_point_budget(500)
            .with_math_interpolation(Interpolation::Linear)
            .with_buffer_range(0.1, 60.0);

        assert_eq!(config.point_budget, 500);
        assert_eq!(config.math_interpolation, Interpolation::Linear);
        assert_eq!(config.filter_interpolation, Interpolation::Nearest);
        assert_eq!(config.buffer_limits(), BufferLimits::new(0.1, 60.0));
    }

    #[test]
    fn test_buffer_limits() {
        let limits = BufferLimits::default();
        assert!(limits.contains(0.0));
        assert!(limits.contains(600.0));
        assert!(!limits.contains(600.5));
        assert!(!limits.contains(-0.1));
        assert!(!limits.contains(f64::NAN));
    }
}
