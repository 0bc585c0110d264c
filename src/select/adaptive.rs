//! Chunked adaptive selection.
//!
//! The controller splits the input into chunks and runs either the branching or the
//! predicated kernel on each, bracketing every chunk with a counter window
//! ([`CounterSource::reset`] then [`CounterSource::read_delta`]). After each chunk the
//! measured branch misses and the chunk's selectivity drive a two-state machine:
//!
//! - on `Branch`, misses above the [`CrossoverModel`] prediction switch to `Predication`
//! - on `Predication`, selectivity outside `[lower, upper]` switches to `Branch`
//!
//! Predication produces few branch misses at any selectivity, so it gives no signal that
//! branching has become cheap again. After `max_consecutive_predications` Predication
//! chunks the controller therefore forces a short `Branch` probe judged by the
//! burst-length model.
//!
//! The outcome equals a single branching scan over the whole input: chunking only
//! decides which kernel produces each slice of the output.

use super::model::CrossoverModel;
use super::{check_capacity, check_index_capacity, scalar, SelectInput};
use crate::config::AdaptiveConfig;
use crate::counters::{CounterSource, HardwareEvent};
use crate::error::{Error, Result};
use std::fmt;
use std::ops::Range;

/// Kernel the controller runs on a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActiveStrategy {
    /// Branch per row.
    Branch,
    /// Unconditional write, conditional advance.
    Predication,
}

impl ActiveStrategy {
    /// Returns the lowercase strategy name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Predication => "predication",
        }
    }
}

impl fmt::Display for ActiveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a chunk had its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// Regular adaptation chunk of `chunk_rows` (or the remaining rows).
    Normal,
    /// Forced branching probe of `burst_rows` (or the remaining rows).
    BranchBurst,
}

/// What happened on one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkRecord {
    /// First input row of the chunk.
    pub offset: usize,
    /// Rows scanned.
    pub rows: usize,
    /// Rows that qualified.
    pub selected: usize,
    /// Kernel that ran.
    pub strategy: ActiveStrategy,
    /// Normal chunk or forced probe.
    pub kind: ChunkKind,
    /// Branch misses measured over the chunk.
    pub branch_misses: i64,
    /// Kernel chosen by the crossover model for the following chunk.
    pub next: ActiveStrategy,
}

impl ChunkRecord {
    /// Fraction of the chunk's rows that qualified.
    #[must_use]
    pub fn selectivity(&self) -> f64 {
        if self.rows == 0 {
            return 0.0;
        }
        self.selected as f64 / self.rows as f64
    }

    /// Returns true if the crossover model changed strategy after this chunk.
    #[must_use]
    pub fn switched(&self) -> bool {
        self.strategy != self.next
    }
}

/// Result of an adaptive call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptiveOutcome {
    /// Total qualifying rows `k`.
    pub selected: usize,
    /// Per-chunk trace in execution order.
    pub chunks: Vec<ChunkRecord>,
}

impl AdaptiveOutcome {
    /// Number of model-driven strategy switches. Forced probes are not counted.
    #[must_use]
    pub fn switches(&self) -> usize {
        self.chunks.iter().filter(|chunk| chunk.switched()).count()
    }

    /// Rows scanned by `strategy`.
    #[must_use]
    pub fn rows_under(&self, strategy: ActiveStrategy) -> usize {
        self.chunks.iter().filter(|chunk| chunk.strategy == strategy).map(|chunk| chunk.rows).sum()
    }

    /// Number of forced branching probes.
    #[must_use]
    pub fn bursts(&self) -> usize {
        self.chunks.iter().filter(|chunk| chunk.kind == ChunkKind::BranchBurst).count()
    }
}

/// Call-local controller state.
#[derive(Debug)]
struct AdaptiveState {
    active: ActiveStrategy,
    consecutive_predications: u32,
    offset: usize,
    selected: usize,
}

impl AdaptiveState {
    fn new() -> Self {
        Self { active: ActiveStrategy::Predication, consecutive_predications: 0, offset: 0, selected: 0 }
    }

    fn advance(&mut self, strategy: ActiveStrategy, rows: usize, selected: usize) {
        self.offset += rows;
        self.selected += selected;
        match strategy {
            ActiveStrategy::Predication => self.consecutive_predications += 1,
            ActiveStrategy::Branch => self.consecutive_predications = 0,
        }
    }

    /// Applies both crossover rules in order; a Branch chunk with excess misses at an
    /// extreme selectivity ends up on Branch again.
    fn adapt(&mut self, model: &CrossoverModel, branch_misses: i64, selectivity: f64) -> ActiveStrategy {
        if self.active == ActiveStrategy::Branch && model.misses_exceed(branch_misses, selectivity) {
            self.active = ActiveStrategy::Predication;
        }
        if self.active == ActiveStrategy::Predication && model.is_extreme(selectivity) {
            self.active = ActiveStrategy::Branch;
            self.consecutive_predications = 0;
        }
        self.active
    }
}

/// Adaptive Branch/Predication controller.
///
/// # Example
///
/// ```rust
/// use adaptive_select::counters::ScriptedCounters;
/// use adaptive_select::select::AdaptiveController;
///
/// let keys: Vec<i32> = (0..120_000).map(|i| i % 100).collect();
/// let mut selection = vec![0; keys.len()];
/// let mut counters = ScriptedCounters::constant(0);
///
/// let outcome = AdaptiveController::default()
///     .select_indexes(&keys, &mut selection, 49, &mut counters)
///     .unwrap();
///
/// assert_eq!(outcome.selected, 60_000);
/// assert_eq!(outcome.chunks.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct AdaptiveController {
    config: AdaptiveConfig,
    chunk_model: CrossoverModel,
    burst_model: CrossoverModel,
}

impl Default for AdaptiveController {
    fn default() -> Self {
        let config = AdaptiveConfig::default();
        Self {
            chunk_model: CrossoverModel::for_chunks(&config),
            burst_model: CrossoverModel::for_bursts(&config),
            config,
        }
    }
}

impl AdaptiveController {
    /// Creates a controller with custom tuning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if `config` fails validation.
    pub fn new(config: AdaptiveConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chunk_model: CrossoverModel::for_chunks(&config),
            burst_model: CrossoverModel::for_bursts(&config),
            config,
        })
    }

    /// Returns the tuning in use.
    #[must_use]
    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Model used for normal chunks.
    #[must_use]
    pub fn chunk_model(&self) -> &CrossoverModel {
        &self.chunk_model
    }

    /// Model used for forced probes.
    #[must_use]
    pub fn burst_model(&self) -> &CrossoverModel {
        &self.burst_model
    }

    /// Adaptive index select writing global row positions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferTooSmall`] or [`Error::InputTooLarge`] before any write,
    /// [`Error::CounterUnavailable`] if `counters` does not measure branch misses, or the
    /// source's error if a counter window fails.
    pub fn select_indexes(
        &self,
        keys: &[i32],
        selection: &mut [i32],
        threshold: i32,
        counters: &mut dyn CounterSource,
    ) -> Result<AdaptiveOutcome> {
        check_index_capacity(keys.len(), selection)?;
        self.run(keys.len(), selection, counters, |strategy, rows, out| {
            let first_row = rows.start;
            let chunk = &keys[rows];
            match strategy {
                ActiveStrategy::Branch => scalar::indexes_branch(chunk, first_row, out, threshold),
                ActiveStrategy::Predication => scalar::indexes_predication(chunk, first_row, out, threshold),
            }
        })
    }

    /// Adaptive value select.
    ///
    /// # Errors
    ///
    /// Same as [`select_indexes`](Self::select_indexes), without the `i32` row limit.
    pub fn select_values(
        &self,
        input: SelectInput<'_>,
        selection: &mut [i32],
        threshold: i32,
        counters: &mut dyn CounterSource,
    ) -> Result<AdaptiveOutcome> {
        check_capacity(input.len(), selection)?;
        self.run(input.len(), selection, counters, |strategy, rows, out| {
            let chunk = input.slice(rows);
            match strategy {
                ActiveStrategy::Branch => scalar::values_branch(chunk, out, threshold),
                ActiveStrategy::Predication => scalar::values_predication(chunk, out, threshold),
            }
        })
    }

    /// Drives `kernel` over `0..rows`. The kernel receives the output slice starting at
    /// the running total and returns the chunk's qualifying count.
    fn run<K>(
        &self,
        rows: usize,
        selection: &mut [i32],
        counters: &mut dyn CounterSource,
        mut kernel: K,
    ) -> Result<AdaptiveOutcome>
    where
        K: FnMut(ActiveStrategy, Range<usize>, &mut [i32]) -> usize,
    {
        require_branch_misses(counters)?;

        let mut state = AdaptiveState::new();
        let mut chunks = Vec::with_capacity(rows.div_ceil(self.config.chunk_rows));

        while state.offset < rows {
            let remaining = rows - state.offset;
            let (kind, len, model) =
                if state.consecutive_predications >= self.config.max_consecutive_predications {
                    state.active = ActiveStrategy::Branch;
                    state.consecutive_predications = 0;
                    let len = remaining.min(self.config.burst_rows);
                    log::debug!("Adaptive select probing branch on rows {}..{}", state.offset, state.offset + len);
                    (ChunkKind::BranchBurst, len, &self.burst_model)
                } else {
                    (ChunkKind::Normal, remaining.min(self.config.chunk_rows), &self.chunk_model)
                };

            let strategy = state.active;
            let offset = state.offset;

            counters.reset()?;
            let selected = kernel(strategy, offset..offset + len, &mut selection[state.selected..]);
            let branch_misses = counters.read_delta()?.require(HardwareEvent::BranchMisses)?;

            state.advance(strategy, len, selected);
            let selectivity = selected as f64 / len as f64;
            let next = state.adapt(model, branch_misses, selectivity);

            log::trace!(
                "Adaptive chunk {}..{} ran {} ({:?}): selectivity {:.4}, {} branch misses",
                offset,
                offset + len,
                strategy,
                kind,
                selectivity,
                branch_misses
            );
            if next != strategy {
                log::debug!(
                    "Adaptive select switched from {} to {} after row {} (selectivity {:.4}, {} branch misses, {:.1} predicted)",
                    strategy,
                    next,
                    offset + len,
                    selectivity,
                    branch_misses,
                    model.predicted_misses(selectivity)
                );
            }

            chunks.push(ChunkRecord { offset, rows: len, selected, strategy, kind, branch_misses, next });
        }

        Ok(AdaptiveOutcome { selected: state.selected, chunks })
    }
}

/// Adaptive decisions are meaningless without branch misses; refuse up front.
fn require_branch_misses(counters: &dyn CounterSource) -> Result<()> {
    if counters.events().contains(&HardwareEvent::BranchMisses) {
        return Ok(());
    }
    Err(Error::CounterUnavailable {
        counter: HardwareEvent::BranchMisses.name(),
        message: format!("{} does not measure branch misses", counters.display_name()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::{CounterValues, ScriptedCounters};

    fn small_config() -> AdaptiveConfig {
        AdaptiveConfig::new(100, 3, 10, 0.03, 0.98).unwrap()
    }

    /// Alternating 1/10 keys: selectivity 0.5 at threshold 5.
    fn half_selective(n: usize) -> Vec<i32> {
        (0..n).map(|i| if i % 2 == 0 { 1 } else { 10 }).collect()
    }

    fn branch_reference(keys: &[i32], threshold: i32) -> Vec<i32> {
        let mut out = vec![0; keys.len()];
        let k = scalar::indexes_branch(keys, 0, &mut out, threshold);
        out.truncate(k);
        out
    }

    // ========================================================================
    // State machine
    // ========================================================================

    #[test]
    fn test_starts_on_predication() {
        let keys = half_selective(50);
        let mut selection = vec![0; 50];
        let mut counters = ScriptedCounters::constant(0);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap();

        assert_eq!(outcome.chunks.len(), 1);
        assert_eq!(outcome.chunks[0].strategy, ActiveStrategy::Predication);
        assert_eq!(outcome.chunks[0].next, ActiveStrategy::Predication);
    }

    #[test]
    fn test_extreme_selectivity_switches_to_branch() {
        let keys = vec![1; 300];
        let mut selection = vec![0; 300];
        let mut counters = ScriptedCounters::constant(0);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap();

        assert_eq!(outcome.chunks[0].strategy, ActiveStrategy::Predication);
        assert_eq!(outcome.chunks[0].next, ActiveStrategy::Branch);
        assert!(outcome.chunks[1..].iter().all(|c| c.strategy == ActiveStrategy::Branch));
        assert_eq!(outcome.switches(), 1);
    }

    #[test]
    fn test_excess_misses_switch_back_to_predication() {
        let keys: Vec<i32> = vec![1; 100].into_iter().chain(half_selective(200)).collect();
        let mut selection = vec![0; 300];
        // chunk 0 runs predication at selectivity 1.0, chunk 1 runs branch at 0.5
        let mut counters = ScriptedCounters::new([0, 1000, 0]);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap();

        let strategies: Vec<_> = outcome.chunks.iter().map(|c| c.strategy).collect();
        assert_eq!(
            strategies,
            vec![ActiveStrategy::Predication, ActiveStrategy::Branch, ActiveStrategy::Predication]
        );
        assert_eq!(outcome.switches(), 2);
    }

    #[test]
    fn test_excess_misses_at_extreme_stay_on_branch() {
        let keys = vec![1; 200];
        let mut selection = vec![0; 200];
        let mut counters = ScriptedCounters::new([0, 1_000_000]);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap();

        assert_eq!(outcome.chunks[1].strategy, ActiveStrategy::Branch);
        assert_eq!(outcome.chunks[1].next, ActiveStrategy::Branch);
    }

    #[test]
    fn test_forced_probe_after_consecutive_predications() {
        let keys = half_selective(1000);
        let mut selection = vec![0; 1000];
        let mut counters = ScriptedCounters::constant(0);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap();

        let probe = outcome.chunks[3];
        assert!(outcome.chunks[..3].iter().all(|c| c.strategy == ActiveStrategy::Predication));
        assert_eq!(probe.kind, ChunkKind::BranchBurst);
        assert_eq!(probe.strategy, ActiveStrategy::Branch);
        assert_eq!(probe.rows, 10);
        assert_eq!(probe.offset, 300);
        // zero misses: branching stays
        assert_eq!(probe.next, ActiveStrategy::Branch);
        assert_eq!(outcome.chunks[4].offset, 310);
        assert_eq!(outcome.bursts(), 1);
    }

    #[test]
    fn test_probe_with_excess_misses_returns_to_predication() {
        let keys = half_selective(1000);
        let mut selection = vec![0; 1000];
        let mut counters = ScriptedCounters::new([0, 0, 0, 500, 0]);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap();

        assert_eq!(outcome.chunks[3].kind, ChunkKind::BranchBurst);
        assert_eq!(outcome.chunks[3].next, ActiveStrategy::Predication);
        assert!(outcome.bursts() >= 2, "expected repeated probes, got {}", outcome.bursts());
        assert_eq!(outcome.selected, 500);
    }

    #[test]
    fn test_short_final_chunk_and_probe() {
        let keys = half_selective(305);
        let mut selection = vec![0; 305];
        let mut counters = ScriptedCounters::constant(0);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap();

        let last = outcome.chunks.last().unwrap();
        assert_eq!(last.kind, ChunkKind::BranchBurst);
        assert_eq!(last.rows, 5);
        assert_eq!(outcome.chunks.iter().map(|c| c.rows).sum::<usize>(), 305);
    }

    // ========================================================================
    // Output equivalence
    // ========================================================================

    #[test]
    fn test_indexes_are_global_positions() {
        let keys = half_selective(1000);
        let mut selection = vec![0; 1000];
        let mut counters = ScriptedCounters::new([0, 0, 0, 500, 0, 900, 0]);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap();

        assert_eq!(&selection[..outcome.selected], branch_reference(&keys, 5).as_slice());
    }

    #[test]
    fn test_values_match_branch() {
        let values: Vec<i32> = (0..777).collect();
        let filter: Vec<i32> = (0..777).map(|i| (i * 7919) % 13).collect();
        let input = SelectInput::split(&values, &filter).unwrap();
        let mut selection = vec![0; 777];
        let mut counters = ScriptedCounters::new([0, 40, 0, 0, 90]);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_values(input, &mut selection, 6, &mut counters)
            .unwrap();

        let mut reference = vec![0; 777];
        let k = scalar::values_branch(input, &mut reference, 6);
        assert_eq!(outcome.selected, k);
        assert_eq!(&selection[..k], &reference[..k]);
    }

    #[test]
    fn test_empty_input_reads_no_counters() {
        let mut counters = ScriptedCounters::constant(0);
        let outcome = AdaptiveController::default().select_indexes(&[], &mut [], 0, &mut counters).unwrap();

        assert_eq!(outcome, AdaptiveOutcome::default());
        assert_eq!(counters.reads(), 0);
    }

    // ========================================================================
    // Counter contract
    // ========================================================================

    #[test]
    fn test_windows_are_paired() {
        let keys = half_selective(1000);
        let mut selection = vec![0; 1000];
        let mut counters = ScriptedCounters::constant(0);

        let outcome = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap();

        assert_eq!(counters.reads(), outcome.chunks.len());
        assert_eq!(counters.resets(), outcome.chunks.len());
        assert_eq!(counters.unpaired_reads(), 0);
    }

    #[test]
    fn test_source_without_branch_misses_rejected() {
        struct CyclesOnly;
        impl CounterSource for CyclesOnly {
            fn id(&self) -> &'static str {
                "cycles"
            }
            fn events(&self) -> &[HardwareEvent] {
                &[HardwareEvent::CpuCycles]
            }
            fn read_delta(&mut self) -> Result<CounterValues> {
                Ok(CounterValues::new())
            }
        }

        let keys = [1, 2, 3];
        let mut selection = vec![-1; 3];
        let err = AdaptiveController::default().select_indexes(&keys, &mut selection, 2, &mut CyclesOnly).unwrap_err();

        assert!(matches!(err, Error::CounterUnavailable { .. }));
        assert_eq!(selection, vec![-1, -1, -1]);
    }

    #[test]
    fn test_read_failure_propagates() {
        let keys = half_selective(300);
        let mut selection = vec![0; 300];
        let mut counters = ScriptedCounters::exact([0]);

        let err = AdaptiveController::new(small_config())
            .unwrap()
            .select_indexes(&keys, &mut selection, 5, &mut counters)
            .unwrap_err();

        assert!(err.is_counter(), "unexpected error: {err}");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AdaptiveConfig { burst_rows: 500, chunk_rows: 100, ..AdaptiveConfig::default() };
        assert!(AdaptiveController::new(config).is_err());
    }
}
