//! Selectivity sweeps.
//!
//! A sweep runs every requested strategy at thresholds `0, stride, 2 * stride, ..`
//! up to 100, each on a fresh copy of the input, and records the deltas of one or more
//! counter events around the call. On uniform `1..=100` keys the threshold is the selectivity in
//! percent, which is how the crossover points of the adaptive model are found.

use crate::counters::{CounterSource, CounterValues, HardwareEvent};
use crate::error::{Error, Result};
use crate::select::{run_strategy, SelectContext, SelectInput, StrategyId};

/// One measured strategy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPoint {
    /// Strategy that ran.
    pub strategy: StrategyId,
    /// Threshold used.
    pub threshold: i32,
    /// Zero-based repetition.
    pub iteration: usize,
    /// Input rows.
    pub rows: usize,
    /// Qualifying rows.
    pub selected: usize,
    /// Delta of the sweep's first event.
    pub counter_delta: i64,
    /// Deltas of every event the sweep records.
    pub counters: CounterValues,
}

impl SweepPoint {
    /// Fraction of rows that qualified.
    #[must_use]
    pub fn selectivity(&self) -> f64 {
        if self.rows == 0 {
            return 0.0;
        }
        self.selected as f64 / self.rows as f64
    }
}

/// Threshold sweep over a set of strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectivitySweep {
    stride: i32,
    iterations: usize,
    events: Vec<HardwareEvent>,
}

impl SelectivitySweep {
    /// Creates a sweep measuring CPU cycles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if `stride` is outside `1..=100` or `iterations`
    /// is 0.
    pub fn new(stride: i32, iterations: usize) -> Result<Self> {
        if !(1..=100).contains(&stride) {
            return Err(Error::ConfigInvalid {
                key: "stride".to_string(),
                message: "must be within 1..=100".to_string(),
            });
        }
        if iterations == 0 {
            return Err(Error::ConfigInvalid {
                key: "iterations".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(Self { stride, iterations, events: vec![HardwareEvent::CpuCycles] })
    }

    /// Measures `event` instead of CPU cycles.
    #[must_use]
    pub fn with_event(mut self, event: HardwareEvent) -> Self {
        self.events = vec![event];
        self
    }

    /// Measures every event in `events`; the first one fills
    /// [`SweepPoint::counter_delta`]. Duplicates are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if `events` is empty.
    pub fn with_events(mut self, events: &[HardwareEvent]) -> Result<Self> {
        if events.is_empty() {
            return Err(Error::ConfigInvalid {
                key: "events".to_string(),
                message: "at least one counter event is required".to_string(),
            });
        }
        self.events.clear();
        for &event in events {
            if !self.events.contains(&event) {
                self.events.push(event);
            }
        }
        Ok(self)
    }

    /// First event recorded per run.
    #[must_use]
    pub fn event(&self) -> HardwareEvent {
        self.events[0]
    }

    /// All events recorded per run.
    #[must_use]
    pub fn events(&self) -> &[HardwareEvent] {
        &self.events
    }

    /// Thresholds visited, in order.
    pub fn thresholds(&self) -> impl Iterator<Item = i32> {
        (0..=100).step_by(self.stride as usize)
    }

    /// Runs the sweep.
    ///
    /// `measure` brackets every call; adaptive strategies take their own branch-miss
    /// source and tuning from `ctx`. Points are ordered by threshold, then iteration, then
    /// strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CounterUnavailable`] if `measure` does not report every event of
    /// the sweep, and propagates strategy and counter errors.
    pub fn run(
        &self,
        data: &[i32],
        strategies: &[StrategyId],
        measure: &mut dyn CounterSource,
        ctx: &mut SelectContext<'_>,
    ) -> Result<Vec<SweepPoint>> {
        if let Some(&missing) = self.events.iter().find(|event| !measure.events().contains(event)) {
            return Err(Error::CounterUnavailable {
                counter: missing.name(),
                message: format!("{} does not measure this event", measure.display_name()),
            });
        }

        log::info!(
            "Sweeping {} strategies over {} rows (stride {}, {} iterations, measuring {} events from {})",
            strategies.len(),
            data.len(),
            self.stride,
            self.iterations,
            self.events.len(),
            self.event()
        );

        let mut points = Vec::with_capacity(self.thresholds().count() * self.iterations * strategies.len());
        let mut selection = vec![0; data.len()];

        for threshold in self.thresholds() {
            for iteration in 0..self.iterations {
                for &strategy in strategies {
                    let input = data.to_vec();

                    measure.reset()?;
                    let selected = run_strategy(strategy, SelectInput::keys(&input), &mut selection, threshold, ctx)?;
                    let read = measure.read_delta()?;
                    let counters = self
                        .events
                        .iter()
                        .map(|&event| read.require(event).map(|delta| (event, delta)))
                        .collect::<Result<CounterValues>>()?;
                    let counter_delta = counters.require(self.event())?;

                    log::debug!(
                        "{} threshold {} iteration {}: {} selected, {} {}",
                        strategy,
                        threshold,
                        iteration + 1,
                        selected,
                        counter_delta,
                        self.event()
                    );
                    points.push(SweepPoint {
                        strategy,
                        threshold,
                        iteration,
                        rows: data.len(),
                        selected,
                        counter_delta,
                        counters,
                    });
                }
            }
        }

        Ok(points)
    }
}
