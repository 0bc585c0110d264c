//! Deterministic counter source that replays a scripted branch-miss sequence.
//!
//! Real hardware counters are non-deterministic, so the controller's switching logic is
//! exercised against this source: each [`read_delta`](CounterSource::read_delta) returns
//! the next scripted value, [`reset`](CounterSource::reset) only opens a window.

use super::{CounterSource, CounterValues, HardwareEvent};
use crate::error::{Error, Result};
use std::collections::VecDeque;

/// A counter source returning scripted deltas.
#[derive(Debug, Clone)]
pub struct ScriptedCounters {
    script: VecDeque<i64>,
    fallback: Option<i64>,
    extra: Vec<(HardwareEvent, i64)>,
    events: Vec<HardwareEvent>,
    reads: usize,
    resets: usize,
    window_open: bool,
    unpaired_reads: usize,
    shut_down: bool,
}

impl ScriptedCounters {
    /// Creates a source returning `branch_misses` in order, then the last value forever.
    #[must_use]
    pub fn new(branch_misses: impl IntoIterator<Item = i64>) -> Self {
        let script: VecDeque<i64> = branch_misses.into_iter().collect();
        let fallback = script.back().copied();
        Self {
            script,
            fallback,
            extra: Vec::new(),
            events: vec![HardwareEvent::BranchMisses],
            reads: 0,
            resets: 0,
            window_open: false,
            unpaired_reads: 0,
            shut_down: false,
        }
    }

    /// Creates a source reporting the same branch-miss count for every window.
    #[must_use]
    pub fn constant(branch_misses: i64) -> Self {
        Self::new([branch_misses])
    }

    /// Creates a source that fails once its script is exhausted.
    #[must_use]
    pub fn exact(branch_misses: impl IntoIterator<Item = i64>) -> Self {
        Self { fallback: None, ..Self::new(branch_misses) }
    }

    /// Also reports a fixed delta for another event on every read. Branch misses always
    /// follow the script.
    #[must_use]
    pub fn with_event(mut self, event: HardwareEvent, delta: i64) -> Self {
        if event == HardwareEvent::BranchMisses {
            return self;
        }
        self.extra.retain(|(e, _)| *e != event);
        self.extra.push((event, delta));
        if !self.events.contains(&event) {
            self.events.push(event);
        }
        self
    }

    /// Returns how many delta reads have been served.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns how many windows have been opened.
    #[must_use]
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Returns how many reads closed a window that was never opened.
    #[must_use]
    pub fn unpaired_reads(&self) -> usize {
        self.unpaired_reads
    }

    /// Returns the number of scripted values not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl CounterSource for ScriptedCounters {
    fn id(&self) -> &'static str {
        "scripted"
    }

    fn events(&self) -> &[HardwareEvent] {
        &self.events
    }

    fn reset(&mut self) -> Result<()> {
        if self.shut_down {
            return Err(Error::CounterReadFailed {
                counter: HardwareEvent::BranchMisses.name(),
                message: "scripted source was shut down".to_string(),
            });
        }
        self.resets += 1;
        self.window_open = true;
        Ok(())
    }

    fn read_delta(&mut self) -> Result<CounterValues> {
        let counter = HardwareEvent::BranchMisses.name();
        if self.shut_down {
            return Err(Error::CounterReadFailed {
                counter,
                message: "scripted source was shut down".to_string(),
            });
        }

        let misses = match self.script.pop_front() {
            Some(value) => value,
            None => self.fallback.ok_or_else(|| Error::CounterReadFailed {
                counter,
                message: format!("script exhausted after {} reads", self.reads),
            })?,
        };

        if !self.window_open {
            self.unpaired_reads += 1;
        }
        self.window_open = false;
        self.reads += 1;

        let mut values: CounterValues = self.extra.iter().copied().collect();
        values.insert(HardwareEvent::BranchMisses, misses);
        Ok(values)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.shut_down = true;
        Ok(())
    }

    fn display_name(&self) -> &'static str {
        "Scripted counters"
    }
}
