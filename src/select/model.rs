//! Calibrated branch-miss model between the two selectivity crossover points.
//!
//! At the lower crossover `l` a branching scan of `len` rows is expected to mispredict
//! about `l * len` times, at the upper crossover `u` about `(1 - u) * len` times. The
//! model is the line through those two points. It is only trusted near the extremes:
//! measured misses above the line mean branching has become costly.

use crate::config::AdaptiveConfig;

/// Linear branch-miss prediction for chunks of a fixed length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossoverModel {
    lower_selectivity: f64,
    upper_selectivity: f64,
    lower_misses: f64,
    upper_misses: f64,
    slope: f64,
    chunk_rows: usize,
}

impl CrossoverModel {
    /// Builds the model for chunks of `chunk_rows` rows.
    ///
    /// Callers guarantee `lower_selectivity < upper_selectivity`; [`AdaptiveConfig`]
    /// validation enforces it.
    #[must_use]
    pub fn new(lower_selectivity: f64, upper_selectivity: f64, chunk_rows: usize) -> Self {
        let rows = chunk_rows as f64;
        let lower_misses = lower_selectivity * rows;
        let upper_misses = (1.0 - upper_selectivity) * rows;
        let slope = (upper_misses - lower_misses) / (upper_selectivity - lower_selectivity);
        Self { lower_selectivity, upper_selectivity, lower_misses, upper_misses, slope, chunk_rows }
    }

    /// Model for normal adaptation chunks.
    #[must_use]
    pub fn for_chunks(config: &AdaptiveConfig) -> Self {
        Self::new(config.lower_crossover, config.upper_crossover, config.chunk_rows)
    }

    /// Model for branch probe bursts.
    #[must_use]
    pub fn for_bursts(config: &AdaptiveConfig) -> Self {
        Self::new(config.lower_crossover, config.upper_crossover, config.burst_rows)
    }

    /// Predicted branch misses of a branching scan at `selectivity`.
    #[must_use]
    pub fn predicted_misses(&self, selectivity: f64) -> f64 {
        (selectivity - self.lower_selectivity) * self.slope + self.lower_misses
    }

    /// Returns true if `misses` measured at `selectivity` exceed the prediction.
    #[must_use]
    pub fn misses_exceed(&self, misses: i64, selectivity: f64) -> bool {
        misses as f64 > self.predicted_misses(selectivity)
    }

    /// Returns true if `selectivity` lies outside `[lower, upper]`.
    #[must_use]
    pub fn is_extreme(&self, selectivity: f64) -> bool {
        selectivity < self.lower_selectivity || selectivity > self.upper_selectivity
    }

    /// Misses predicted at the lower crossover.
    #[must_use]
    pub fn lower_misses(&self) -> f64 {
        self.lower_misses
    }

    /// Misses predicted at the upper crossover.
    #[must_use]
    pub fn upper_misses(&self) -> f64 {
        self.upper_misses
    }

    /// Change in predicted misses per unit of selectivity.
    #[must_use]
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Chunk length the model was calibrated for.
    #[must_use]
    pub fn chunk_rows(&self) -> usize {
        self.chunk_rows
    }
}
