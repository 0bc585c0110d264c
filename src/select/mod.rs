//! Threshold selection over an integer key column.
//!
//! A row qualifies iff its key is `<= threshold`. Every strategy writes the qualifying
//! row positions (index select) or payload values (value select) into a caller buffer
//! of capacity `>= n`, in input order, and returns the count `k`.
//!
//! | Strategy | Module | Cost profile |
//! |---|---|---|
//! | Branch | [`scalar`] | cheap at extreme selectivity, mispredicts in between |
//! | Predication | [`scalar`] | one unconditional write per row, no data-dependent branch |
//! | Vectorized | [`vectorized`] | lane-mask compare, compaction per set bit |
//! | Adaptive | [`adaptive`] | switches Branch/Predication per chunk on branch-miss feedback |
//!
//! Buffers beyond position `k` hold scratch writes from predicated strategies; only
//! `selection[..k]` is meaningful.

pub mod adaptive;
pub mod model;
pub mod registry;
pub mod scalar;
pub mod vectorized;

pub use adaptive::{AdaptiveController, AdaptiveOutcome, ActiveStrategy, ChunkKind, ChunkRecord};
pub use model::CrossoverModel;
pub use registry::{dispatch, run_strategy, SelectContext, SelectFamily, SelectStrategy, StrategyId};
pub use vectorized::SimdBackend;

use crate::counters::CounterSource;
use crate::error::{Error, Result};
use std::ops::Range;

/// Largest input whose row positions fit the `i32` selection buffer.
pub const MAX_ROWS: usize = i32::MAX as usize + 1;

/// Read-only input of one selection call.
///
/// `filter` holds the keys compared against the threshold; `values` holds the payload
/// emitted by value select. Index select and single-column value select use the same
/// slice for both.
#[derive(Debug, Clone, Copy)]
pub struct SelectInput<'a> {
    values: &'a [i32],
    filter: &'a [i32],
}

impl<'a> SelectInput<'a> {
    /// Uses one column as both keys and payload.
    #[must_use]
    pub fn keys(keys: &'a [i32]) -> Self {
        Self { values: keys, filter: keys }
    }

    /// Filters on `filter` and emits from `values`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InputLengthMismatch`] if the columns differ in length.
    pub fn split(values: &'a [i32], filter: &'a [i32]) -> Result<Self> {
        if values.len() != filter.len() {
            return Err(Error::InputLengthMismatch { values: values.len(), filter: filter.len() });
        }
        Ok(Self { values, filter })
    }

    /// Number of input rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filter.len()
    }

    /// Returns true if there are no input rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }

    /// The payload column.
    #[must_use]
    pub fn values(&self) -> &'a [i32] {
        self.values
    }

    /// The key column.
    #[must_use]
    pub fn filter(&self) -> &'a [i32] {
        self.filter
    }

    /// Returns the rows in `range` of both columns.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self { values: &self.values[range.clone()], filter: &self.filter[range] }
    }

    /// Counts qualifying rows without writing anything.
    #[must_use]
    pub fn count_qualifying(&self, threshold: i32) -> usize {
        self.filter.iter().filter(|&&key| key <= threshold).count()
    }
}

/// Checks the buffer contract shared by all strategies.
pub(crate) fn check_capacity(rows: usize, selection: &[i32]) -> Result<()> {
    if selection.len() < rows {
        return Err(Error::BufferTooSmall { rows, capacity: selection.len() });
    }
    Ok(())
}

/// Checks that every row position of an index select fits in an `i32`.
pub(crate) fn check_index_capacity(rows: usize, selection: &[i32]) -> Result<()> {
    check_capacity(rows, selection)?;
    if rows > MAX_ROWS {
        return Err(Error::InputTooLarge { rows, max: MAX_ROWS });
    }
    Ok(())
}

/// Branching index select: positions of keys `<= threshold`.
///
/// # Errors
///
/// Returns [`Error::BufferTooSmall`] if `selection` is shorter than `keys`.
///
/// # Example
///
/// ```rust
/// use adaptive_select::select::select_indexes_branch;
///
/// let keys: Vec<i32> = (1..=10).collect();
/// let mut selection = vec![0; keys.len()];
///
/// let k = select_indexes_branch(&keys, &mut selection, 5).unwrap();
/// assert_eq!(&selection[..k], &[0, 1, 2, 3, 4]);
/// ```
pub fn select_indexes_branch(keys: &[i32], selection: &mut [i32], threshold: i32) -> Result<usize> {
    check_index_capacity(keys.len(), selection)?;
    Ok(scalar::indexes_branch(keys, 0, selection, threshold))
}

/// Predicated index select; same result as [`select_indexes_branch`].
///
/// # Errors
///
/// Returns [`Error::BufferTooSmall`] if `selection` is shorter than `keys`.
pub fn select_indexes_predication(keys: &[i32], selection: &mut [i32], threshold: i32) -> Result<usize> {
    check_index_capacity(keys.len(), selection)?;
    Ok(scalar::indexes_predication(keys, 0, selection, threshold))
}

/// Branching value select: payload values of rows whose key is `<= threshold`.
///
/// # Errors
///
/// Returns [`Error::BufferTooSmall`] if `selection` is shorter than the input.
pub fn select_values_branch(input: SelectInput<'_>, selection: &mut [i32], threshold: i32) -> Result<usize> {
    check_capacity(input.len(), selection)?;
    Ok(scalar::values_branch(input, selection, threshold))
}

/// Predicated value select; same result as [`select_values_branch`].
///
/// # Errors
///
/// Returns [`Error::BufferTooSmall`] if `selection` is shorter than the input.
pub fn select_values_predication(
    input: SelectInput<'_>,
    selection: &mut [i32],
    threshold: i32,
) -> Result<usize> {
    check_capacity(input.len(), selection)?;
    Ok(scalar::values_predication(input, selection, threshold))
}

/// Vectorized value select on the best backend detected at startup.
///
/// # Errors
///
/// Returns [`Error::BufferTooSmall`] if `selection` is shorter than the input.
pub fn select_values_vectorized(
    input: SelectInput<'_>,
    selection: &mut [i32],
    threshold: i32,
) -> Result<usize> {
    vectorized::select_values_vectorized_with(SimdBackend::active(), input, selection, threshold)
}

/// Adaptive index select with default tuning.
///
/// # Errors
///
/// Returns a counter error if `counters` cannot deliver branch misses, or
/// [`Error::BufferTooSmall`] for an undersized buffer.
pub fn select_indexes_adaptive(
    keys: &[i32],
    selection: &mut [i32],
    threshold: i32,
    counters: &mut dyn CounterSource,
) -> Result<usize> {
    let controller = AdaptiveController::default();
    Ok(controller.select_indexes(keys, selection, threshold, counters)?.selected)
}

/// Adaptive value select with default tuning.
///
/// # Errors
///
/// Returns a counter error if `counters` cannot deliver branch misses, or
/// [`Error::BufferTooSmall`] for an undersized buffer.
pub fn select_values_adaptive(
    input: SelectInput<'_>,
    selection: &mut [i32],
    threshold: i32,
    counters: &mut dyn CounterSource,
) -> Result<usize> {
    let controller = AdaptiveController::default();
    Ok(controller.select_values(input, selection, threshold, counters)?.selected)
}
