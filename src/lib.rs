//! # Adaptive-Select
//!
//! Adaptive row selection for integer key columns.
//!
//! Given keys and a threshold, a select produces the qualifying rows (`key <= threshold`)
//! either as row positions or as payload values. Three scan strategies trade off
//! differently against selectivity: a branching scan, a branch-free predicated scan and a
//! SIMD-vectorized scan. The adaptive strategy runs chunk by chunk and switches between
//! branching and predication from live branch-misprediction counts.
//!
//! ## Features
//!
//! - **Static strategies**: Branch, Predication, Vectorized (SSE2/AVX2/NEON with scalar fallback)
//! - **Adaptive controller**: crossover model, hysteresis and forced branch probes
//! - **Pluggable counters**: Linux `perf_event_open` or a scripted deterministic source
//! - **Registry**: closed strategy identifiers with display-name parsing and dispatch
//!
//! ## Quick Start
//!
//! ```rust
//! use adaptive_select::prelude::*;
//!
//! let keys: Vec<i32> = (1..=10).collect();
//! let mut selection = vec![0; keys.len()];
//! let mut ctx = SelectContext::new();
//!
//! let k = run_strategy(StrategyId::IndexesBranch, SelectInput::keys(&keys), &mut selection, 5, &mut ctx)?;
//! assert_eq!(&selection[..k], &[0, 1, 2, 3, 4]);
//! # Ok::<(), adaptive_select::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `simd` (default): compile the SSE2/AVX2/NEON backends of the vectorized scan

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
// Allow unwrap() in tests only - banned in production code
#![cfg_attr(test, allow(clippy::unwrap_used))]
// Row counts and positions move between usize, i32 and f64 throughout
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Core Modules
// ============================================================================

/// Error types for selection, counters and configuration.
pub mod error;

/// YAML configuration and adaptive tuning.
pub mod config;

/// Hardware performance counter sources.
pub mod counters;

/// Scan strategies, the adaptive controller and the strategy registry.
pub mod select;

// ============================================================================
// Harness Modules
// ============================================================================

/// Deterministic synthetic key distributions.
pub mod datagen;

/// Selectivity sweeps measuring a counter per strategy and threshold.
pub mod sweep;

pub use error::{Error, Result};

// ============================================================================
// Prelude
// ============================================================================

/// Commonly used types and traits for convenient imports.
///
/// ```rust
/// use adaptive_select::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{AdaptiveConfig, Config};
    pub use crate::counters::{CounterSource, CounterValues, HardwareEvent, PerfCounters, ScriptedCounters};
    pub use crate::error::{Error, Result};
    pub use crate::select::{
        dispatch, run_strategy, ActiveStrategy, AdaptiveController, AdaptiveOutcome, ChunkKind, ChunkRecord,
        SelectContext, SelectFamily, SelectInput, SelectStrategy, SimdBackend, StrategyId,
    };
}
