//! Hardware counter sources consumed by the adaptive controller.
//!
//! This module defines the counter contract the controller depends on:
//!
//! - [`HardwareEvent`]: the closed set of countable hardware events
//! - [`CounterValues`]: a delta read, keyed by event
//! - [`CounterSource`]: trait for anything that can produce counter deltas
//!
//! # Lifecycle
//!
//! A source is configured once (e.g. [`PerfCounters::configure`]), read repeatedly, and shut
//! down once. Counter windows are per source, so concurrent selections must each own a source
//! or serialize access to a shared one.

pub mod perf;
pub mod scripted;

pub use perf::PerfCounters;
pub use scripted::ScriptedCounters;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A countable hardware event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareEvent {
    /// Total CPU cycles.
    CpuCycles,
    /// Retired instructions.
    Instructions,
    /// Last level cache accesses.
    CacheReferences,
    /// Last level cache misses.
    CacheMisses,
    /// Retired branch instructions.
    BranchInstructions,
    /// Mispredicted branch instructions.
    BranchMisses,
}

impl HardwareEvent {
    /// All supported events.
    pub const ALL: [Self; 6] = [
        Self::CpuCycles,
        Self::Instructions,
        Self::CacheReferences,
        Self::CacheMisses,
        Self::BranchInstructions,
        Self::BranchMisses,
    ];

    /// Returns the canonical counter name, e.g. `PERF_COUNT_HW_BRANCH_MISSES`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CpuCycles => "PERF_COUNT_HW_CPU_CYCLES",
            Self::Instructions => "PERF_COUNT_HW_INSTRUCTIONS",
            Self::CacheReferences => "PERF_COUNT_HW_CACHE_REFERENCES",
            Self::CacheMisses => "PERF_COUNT_HW_CACHE_MISSES",
            Self::BranchInstructions => "PERF_COUNT_HW_BRANCH_INSTRUCTIONS",
            Self::BranchMisses => "PERF_COUNT_HW_BRANCH_MISSES",
        }
    }

    /// Parses a canonical counter name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCounter`] for names outside the supported set.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|event| event.name() == name)
            .ok_or_else(|| Error::UnknownCounter(name.to_string()))
    }
}

impl fmt::Display for HardwareEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HardwareEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Counter deltas accumulated since the previous read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterValues {
    values: HashMap<HardwareEvent, i64>,
}

impl CounterValues {
    /// Creates an empty set of counter values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a delta for an event.
    pub fn insert(&mut self, event: HardwareEvent, delta: i64) {
        self.values.insert(event, delta);
    }

    /// Gets the delta for an event.
    #[must_use]
    pub fn get(&self, event: HardwareEvent) -> Option<i64> {
        self.values.get(&event).copied()
    }

    /// Gets the delta for a counter by its canonical name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<i64> {
        HardwareEvent::from_name(name).ok().and_then(|event| self.get(event))
    }

    /// Gets the delta for an event the caller cannot work without.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CounterUnavailable`] if the source did not report the event.
    pub fn require(&self, event: HardwareEvent) -> Result<i64> {
        self.get(event).ok_or_else(|| Error::CounterUnavailable {
            counter: event.name(),
            message: "counter source did not report this event".to_string(),
        })
    }

    /// Returns the number of events in this read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no events were read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns an iterator over events and their deltas.
    pub fn iter(&self) -> impl Iterator<Item = (HardwareEvent, i64)> + '_ {
        self.values.iter().map(|(&event, &delta)| (event, delta))
    }
}

impl FromIterator<(HardwareEvent, i64)> for CounterValues {
    fn from_iter<I: IntoIterator<Item = (HardwareEvent, i64)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

/// Trait for hardware counter sources.
///
/// A source measures a window: [`reset`](CounterSource::reset) opens it and
/// [`read_delta`](CounterSource::read_delta) closes it, returning what happened in
/// between and starting the next window.
///
/// # Example
///
/// ```rust
/// use adaptive_select::counters::{CounterSource, CounterValues, HardwareEvent};
/// use adaptive_select::Result;
///
/// struct Quiet;
///
/// impl CounterSource for Quiet {
///     fn id(&self) -> &'static str {
///         "quiet"
///     }
///
///     fn events(&self) -> &[HardwareEvent] {
///         &[HardwareEvent::BranchMisses]
///     }
///
///     fn read_delta(&mut self) -> Result<CounterValues> {
///         Ok([(HardwareEvent::BranchMisses, 0)].into_iter().collect())
///     }
/// }
///
/// let mut source = Quiet;
/// let values = source.read_delta().unwrap();
/// assert_eq!(values.get(HardwareEvent::BranchMisses), Some(0));
/// ```
pub trait CounterSource: Send {
    /// Returns the unique identifier for this source.
    fn id(&self) -> &'static str;

    /// Returns the events this source was configured with.
    fn events(&self) -> &[HardwareEvent];

    /// Starts a new measurement window, discarding anything counted so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying counters cannot be reset.
    fn reset(&mut self) -> Result<()> {
        self.read_delta().map(|_| ())
    }

    /// Returns the deltas since the last read or reset and starts a new window.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured counter cannot be read.
    fn read_delta(&mut self) -> Result<CounterValues>;

    /// Releases the counters. Reads after shutdown fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the counters cannot be released cleanly.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns a human-readable name for this source.
    fn display_name(&self) -> &'static str {
        self.id()
    }
}

/// A boxed counter source for dynamic dispatch.
pub type BoxedCounterSource = Box<dyn CounterSource>;

/// Parses a list of counter names into events.
///
/// # Errors
///
/// Returns [`Error::UnknownCounter`] for the first unrecognized name.
pub fn parse_events<S: AsRef<str>>(names: &[S]) -> Result<Vec<HardwareEvent>> {
    names.iter().map(|name| HardwareEvent::from_name(name.as_ref())).collect()
}
