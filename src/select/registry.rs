//! Strategy identifiers and dispatch.

use super::adaptive::{AdaptiveController, AdaptiveOutcome};
use super::{check_capacity, check_index_capacity, scalar, vectorized, SelectInput, SimdBackend};
use crate::config::AdaptiveConfig;
use crate::counters::{CounterSource, HardwareEvent};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Output family of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectFamily {
    /// Emits qualifying row positions.
    Indexes,
    /// Emits qualifying payload values.
    Values,
}

/// Closed set of selection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyId {
    /// Branching index select.
    IndexesBranch,
    /// Predicated index select.
    IndexesPredication,
    /// Adaptive index select.
    IndexesAdaptive,
    /// Branching value select.
    ValuesBranch,
    /// Predicated value select.
    ValuesPredication,
    /// Vectorized value select.
    ValuesVectorized,
    /// Adaptive value select.
    ValuesAdaptive,
}

impl StrategyId {
    /// All strategies in registry order.
    pub const ALL: [Self; 7] = [
        Self::IndexesBranch,
        Self::IndexesPredication,
        Self::IndexesAdaptive,
        Self::ValuesBranch,
        Self::ValuesPredication,
        Self::ValuesVectorized,
        Self::ValuesAdaptive,
    ];

    /// Display name, e.g. `Select_Indexes_Branch`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IndexesBranch => "Select_Indexes_Branch",
            Self::IndexesPredication => "Select_Indexes_Predication",
            Self::IndexesAdaptive => "Select_Indexes_Adaptive",
            Self::ValuesBranch => "Select_Values_Branch",
            Self::ValuesPredication => "Select_Values_Predication",
            Self::ValuesVectorized => "Select_Values_Vectorized",
            Self::ValuesAdaptive => "Select_Values_Adaptive",
        }
    }

    /// Kebab-case identifier, e.g. `indexes-branch`.
    #[must_use]
    pub const fn kebab_name(self) -> &'static str {
        match self {
            Self::IndexesBranch => "indexes-branch",
            Self::IndexesPredication => "indexes-predication",
            Self::IndexesAdaptive => "indexes-adaptive",
            Self::ValuesBranch => "values-branch",
            Self::ValuesPredication => "values-predication",
            Self::ValuesVectorized => "values-vectorized",
            Self::ValuesAdaptive => "values-adaptive",
        }
    }

    /// Output family.
    #[must_use]
    pub const fn family(self) -> SelectFamily {
        match self {
            Self::IndexesBranch | Self::IndexesPredication | Self::IndexesAdaptive => SelectFamily::Indexes,
            Self::ValuesBranch | Self::ValuesPredication | Self::ValuesVectorized | Self::ValuesAdaptive => {
                SelectFamily::Values
            }
        }
    }

    /// Returns true for strategies driven by branch-miss feedback.
    #[must_use]
    pub const fn is_adaptive(self) -> bool {
        matches!(self, Self::IndexesAdaptive | Self::ValuesAdaptive)
    }

    /// Strategies of one family.
    pub fn of_family(family: SelectFamily) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |id| id.family() == family)
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyId {
    type Err = Error;

    /// Accepts display names and kebab-case identifiers, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let short = normalized.strip_prefix("select-").unwrap_or(&normalized);
        Self::ALL
            .into_iter()
            .find(|id| id.kebab_name() == short)
            .ok_or_else(|| Error::UnknownStrategy(s.to_string()))
    }
}

/// Per-call execution context.
///
/// Static strategies ignore it. Adaptive strategies take their tuning from `config` and
/// require a counter source; the per-chunk trace of the last adaptive run is kept for
/// inspection.
pub struct SelectContext<'a> {
    config: AdaptiveConfig,
    counters: Option<&'a mut dyn CounterSource>,
    last_outcome: Option<AdaptiveOutcome>,
}

impl Default for SelectContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SelectContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectContext")
            .field("config", &self.config)
            .field("counters", &self.counters.as_ref().map(|c| c.display_name()))
            .field("last_outcome", &self.last_outcome.as_ref().map(|o| o.chunks.len()))
            .finish()
    }
}

impl<'a> SelectContext<'a> {
    /// Context with default tuning and no counters.
    #[must_use]
    pub fn new() -> Self {
        Self { config: AdaptiveConfig::default(), counters: None, last_outcome: None }
    }

    /// Replaces the adaptive tuning.
    #[must_use]
    pub fn with_config(mut self, config: AdaptiveConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches the counter source used by adaptive strategies.
    #[must_use]
    pub fn with_counters(mut self, counters: &'a mut dyn CounterSource) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Returns the adaptive tuning.
    #[must_use]
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Returns true if a counter source is attached.
    #[must_use]
    pub fn has_counters(&self) -> bool {
        self.counters.is_some()
    }

    /// Trace of the most recent adaptive run through this context.
    #[must_use]
    pub fn last_outcome(&self) -> Option<&AdaptiveOutcome> {
        self.last_outcome.as_ref()
    }

    /// Takes the trace of the most recent adaptive run.
    pub fn take_outcome(&mut self) -> Option<AdaptiveOutcome> {
        self.last_outcome.take()
    }

    fn counters(&mut self) -> Result<&mut (dyn CounterSource + 'a)> {
        self.counters.as_deref_mut().ok_or_else(|| Error::CounterUnavailable {
            counter: HardwareEvent::BranchMisses.name(),
            message: "no counter source attached to the select context".to_string(),
        })
    }
}

/// A selection strategy reachable through the registry.
pub trait SelectStrategy: Sync {
    /// Registry identifier.
    fn id(&self) -> StrategyId;

    /// Display name.
    fn name(&self) -> &'static str {
        self.id().name()
    }

    /// Returns true if the strategy needs a counter source.
    fn requires_counters(&self) -> bool {
        self.id().is_adaptive()
    }

    /// Runs the strategy. Index strategies report positions of `input.filter()`.
    ///
    /// # Errors
    ///
    /// Returns precondition errors before any write, and counter errors for adaptive
    /// strategies.
    fn select(
        &self,
        input: SelectInput<'_>,
        selection: &mut [i32],
        threshold: i32,
        ctx: &mut SelectContext<'_>,
    ) -> Result<usize>;
}

struct IndexesBranch;
struct IndexesPredication;
struct IndexesAdaptive;
struct ValuesBranch;
struct ValuesPredication;
struct ValuesVectorized;
struct ValuesAdaptive;

impl SelectStrategy for IndexesBranch {
    fn id(&self) -> StrategyId {
        StrategyId::IndexesBranch
    }

    fn select(
        &self,
        input: SelectInput<'_>,
        selection: &mut [i32],
        threshold: i32,
        _: &mut SelectContext<'_>,
    ) -> Result<usize> {
        check_index_capacity(input.len(), selection)?;
        Ok(scalar::indexes_branch(input.filter(), 0, selection, threshold))
    }
}

impl SelectStrategy for IndexesPredication {
    fn id(&self) -> StrategyId {
        StrategyId::IndexesPredication
    }

    fn select(
        &self,
        input: SelectInput<'_>,
        selection: &mut [i32],
        threshold: i32,
        _: &mut SelectContext<'_>,
    ) -> Result<usize> {
        check_index_capacity(input.len(), selection)?;
        Ok(scalar::indexes_predication(input.filter(), 0, selection, threshold))
    }
}

impl SelectStrategy for IndexesAdaptive {
    fn id(&self) -> StrategyId {
        StrategyId::IndexesAdaptive
    }

    fn select(
        &self,
        input: SelectInput<'_>,
        selection: &mut [i32],
        threshold: i32,
        ctx: &mut SelectContext<'_>,
    ) -> Result<usize> {
        let controller = AdaptiveController::new(ctx.config)?;
        let outcome = controller.select_indexes(input.filter(), selection, threshold, ctx.counters()?)?;
        let selected = outcome.selected;
        ctx.last_outcome = Some(outcome);
        Ok(selected)
    }
}

impl SelectStrategy for ValuesBranch {
    fn id(&self) -> StrategyId {
        StrategyId::ValuesBranch
    }

    fn select(
        &self,
        input: SelectInput<'_>,
        selection: &mut [i32],
        threshold: i32,
        _: &mut SelectContext<'_>,
    ) -> Result<usize> {
        check_capacity(input.len(), selection)?;
        Ok(scalar::values_branch(input, selection, threshold))
    }
}

impl SelectStrategy for ValuesPredication {
    fn id(&self) -> StrategyId {
        StrategyId::ValuesPredication
    }

    fn select(
        &self,
        input: SelectInput<'_>,
        selection: &mut [i32],
        threshold: i32,
        _: &mut SelectContext<'_>,
    ) -> Result<usize> {
        check_capacity(input.len(), selection)?;
        Ok(scalar::values_predication(input, selection, threshold))
    }
}

impl SelectStrategy for ValuesVectorized {
    fn id(&self) -> StrategyId {
        StrategyId::ValuesVectorized
    }

    fn select(
        &self,
        input: SelectInput<'_>,
        selection: &mut [i32],
        threshold: i32,
        _: &mut SelectContext<'_>,
    ) -> Result<usize> {
        vectorized::select_values_vectorized_with(SimdBackend::active(), input, selection, threshold)
    }
}

impl SelectStrategy for ValuesAdaptive {
    fn id(&self) -> StrategyId {
        StrategyId::ValuesAdaptive
    }

    fn select(
        &self,
        input: SelectInput<'_>,
        selection: &mut [i32],
        threshold: i32,
        ctx: &mut SelectContext<'_>,
    ) -> Result<usize> {
        let controller = AdaptiveController::new(ctx.config)?;
        let outcome = controller.select_values(input, selection, threshold, ctx.counters()?)?;
        let selected = outcome.selected;
        ctx.last_outcome = Some(outcome);
        Ok(selected)
    }
}

/// Returns the implementation registered for `id`.
#[must_use]
pub fn dispatch(id: StrategyId) -> &'static dyn SelectStrategy {
    match id {
        StrategyId::IndexesBranch => &IndexesBranch,
        StrategyId::IndexesPredication => &IndexesPredication,
        StrategyId::IndexesAdaptive => &IndexesAdaptive,
        StrategyId::ValuesBranch => &ValuesBranch,
        StrategyId::ValuesPredication => &ValuesPredication,
        StrategyId::ValuesVectorized => &ValuesVectorized,
        StrategyId::ValuesAdaptive => &ValuesAdaptive,
    }
}

/// Runs the strategy registered for `id`.
///
/// # Errors
///
/// See [`SelectStrategy::select`].
///
/// # Example
///
/// ```rust
/// use adaptive_select::select::{run_strategy, SelectContext, SelectInput, StrategyId};
///
/// let keys = [10, 1, 10, 1];
/// let mut selection = vec![0; 4];
/// let mut ctx = SelectContext::new();
///
/// let id: StrategyId = "Select_Indexes_Predication".parse().unwrap();
/// let k = run_strategy(id, SelectInput::keys(&keys), &mut selection, 1, &mut ctx).unwrap();
/// assert_eq!(&selection[..k], &[1, 3]);
/// ```
pub fn run_strategy(
    id: StrategyId,
    input: SelectInput<'_>,
    selection: &mut [i32],
    threshold: i32,
    ctx: &mut SelectContext<'_>,
) -> Result<usize> {
    dispatch(id).select(input, selection, threshold, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::ScriptedCounters;

    #[test]
    fn test_dispatch_table_is_consistent() {
        for id in StrategyId::ALL {
            let strategy = dispatch(id);
            assert_eq!(strategy.id(), id);
            assert_eq!(strategy.name(), id.name());
            assert_eq!(strategy.requires_counters(), id.is_adaptive());
        }
    }

    #[test]
    fn test_parse_display_and_kebab_names() {
        for id in StrategyId::ALL {
            assert_eq!(id.name().parse::<StrategyId>().unwrap(), id);
            assert_eq!(id.kebab_name().parse::<StrategyId>().unwrap(), id);
            assert_eq!(id.to_string(), id.name());
        }
        assert_eq!("values_vectorized".parse::<StrategyId>().unwrap(), StrategyId::ValuesVectorized);
        assert_eq!(" SELECT_VALUES_BRANCH ".parse::<StrategyId>().unwrap(), StrategyId::ValuesBranch);
    }

    #[test]
    fn test_unknown_strategy_is_configuration_error() {
        let err = "Select_Rows_Magic".parse::<StrategyId>().unwrap_err();
        assert!(matches!(&err, Error::UnknownStrategy(name) if name == "Select_Rows_Magic"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_families() {
        assert_eq!(StrategyId::of_family(SelectFamily::Indexes).count(), 3);
        assert_eq!(StrategyId::of_family(SelectFamily::Values).count(), 4);
        assert_eq!(StrategyId::ValuesVectorized.family(), SelectFamily::Values);
    }

    #[test]
    fn test_static_strategies_need_no_counters() {
        let keys = [5, 1, 9, 3];
        let mut ctx = SelectContext::new();
        for id in StrategyId::ALL.into_iter().filter(|id| !id.is_adaptive()) {
            let mut selection = vec![0; 4];
            let k = run_strategy(id, SelectInput::keys(&keys), &mut selection, 4, &mut ctx).unwrap();
            assert_eq!(k, 2, "strategy {id}");
        }
        assert!(ctx.last_outcome().is_none());
    }

    #[test]
    fn test_adaptive_without_counters_fails() {
        let keys = [5, 1, 9, 3];
        let mut selection = vec![0; 4];
        let mut ctx = SelectContext::new();

        for id in [StrategyId::IndexesAdaptive, StrategyId::ValuesAdaptive] {
            let err = run_strategy(id, SelectInput::keys(&keys), &mut selection, 4, &mut ctx).unwrap_err();
            assert!(matches!(err, Error::CounterUnavailable { .. }), "strategy {id}: {err}");
        }
    }

    #[test]
    fn test_adaptive_through_context_records_outcome() {
        let keys: Vec<i32> = (0..250).map(|i| i % 10).collect();
        let mut selection = vec![0; 250];
        let mut counters = ScriptedCounters::constant(0);
        let config = AdaptiveConfig::new(100, 10, 10, 0.03, 0.98).unwrap();
        let mut ctx = SelectContext::new().with_config(config).with_counters(&mut counters);

        let k = run_strategy(StrategyId::IndexesAdaptive, SelectInput::keys(&keys), &mut selection, 4, &mut ctx)
            .unwrap();

        assert_eq!(k, 125);
        let outcome = ctx.take_outcome().unwrap();
        assert_eq!(outcome.chunks.len(), 3);
        assert!(ctx.last_outcome().is_none());
    }

    #[test]
    fn test_index_strategies_report_filter_positions() {
        let values = [100, 200, 300];
        let filter = [9, 1, 9];
        let input = SelectInput::split(&values, &filter).unwrap();
        let mut selection = vec![0; 3];
        let mut ctx = SelectContext::new();

        let k = run_strategy(StrategyId::IndexesBranch, input, &mut selection, 1, &mut ctx).unwrap();
        assert_eq!(&selection[..k], &[1]);

        let k = run_strategy(StrategyId::ValuesPredication, input, &mut selection, 1, &mut ctx).unwrap();
        assert_eq!(&selection[..k], &[200]);
    }
}
