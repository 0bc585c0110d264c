//! Seeded synthetic key distributions.
//!
//! All generators draw keys in `1..=100` unless stated otherwise, so a threshold `t` in
//! `0..=100` selects roughly `t%` of a uniform column. Every generator starts from
//! [`SEED`], making runs reproducible across test and benchmark invocations.
//!
//! Sectioned generators split `n` into equal sections; rows left over by the division
//! continue the last section's distribution.

use crate::error::{Error, Result};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;

/// Default generator seed.
pub const SEED: u64 = 1;

/// Largest key of the bounded generators.
pub const KEY_MAX: i32 = 100;

fn invalid(key: &str, message: impl Into<String>) -> Error {
    Error::ConfigInvalid { key: key.to_string(), message: message.into() }
}

/// Deterministic key generator.
#[derive(Debug, Clone)]
pub struct DataGenerator {
    rng: StdRng,
}

impl Default for DataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataGenerator {
    /// Generator seeded with [`SEED`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(SEED)
    }

    /// Generator with an explicit seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Uniform keys in `1..=upper`. When `upper == n` the keys are a shuffled permutation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if `upper < 1`.
    pub fn uniform(&mut self, n: usize, upper: i32) -> Result<Vec<i32>> {
        if upper < 1 {
            return Err(invalid("upper", "must be at least 1"));
        }
        if usize::try_from(upper).is_ok_and(|upper| upper == n) {
            return self.unique_shuffled(n);
        }
        let keys = Uniform::new_inclusive(1, upper);
        Ok(keys.sample_iter(&mut self.rng).take(n).collect())
    }

    /// The keys `1..=n` in random order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InputTooLarge`] if `n` exceeds `i32::MAX`.
    pub fn unique_shuffled(&mut self, n: usize) -> Result<Vec<i32>> {
        let max = i32::MAX as usize;
        if n > max {
            return Err(Error::InputTooLarge { rows: n, max });
        }
        let mut keys: Vec<i32> = (1..=n as i32).collect();
        keys.shuffle(&mut self.rng);
        Ok(keys)
    }

    /// Selectivity that ramps up and down.
    ///
    /// Each of `sections` sections holds `minimum` steps. Within a section the lower key
    /// bound moves by one per step, rising in even sections and falling in odd ones, so
    /// a fixed threshold sees its selectivity drift smoothly between `100%` and roughly
    /// `(100 - minimum)%`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if `minimum` is not in `1..=100`, `sections` is 0
    /// or `sections * minimum` overflows.
    pub fn varying_selectivity(&mut self, n: usize, minimum: usize, sections: usize) -> Result<Vec<i32>> {
        if !(1..=KEY_MAX as usize).contains(&minimum) {
            return Err(invalid("minimum", "must be within 1..=100"));
        }
        if sections == 0 {
            return Err(invalid("sections", "must be positive"));
        }

        let steps = sections
            .checked_mul(minimum)
            .ok_or_else(|| invalid("sections", "sections * minimum overflows"))?;
        let rows_per_step = n / steps;
        let mut keys = Vec::with_capacity(n);
        let mut lower = 1;
        let mut increasing = true;

        for _ in 0..sections {
            for step in 0..minimum {
                if step > 0 {
                    lower += if increasing { 1 } else { -1 };
                }
                self.fill(&mut keys, rows_per_step, lower, KEY_MAX);
            }
            increasing = !increasing;
        }
        let rest = n - keys.len();
        self.fill(&mut keys, rest, lower, KEY_MAX);
        Ok(keys)
    }

    /// Alternating sections of keys in `1..=100` and `1..=step`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] for a step outside `1..=100` or zero sections.
    pub fn upper_step(&mut self, n: usize, step: i32, sections: usize) -> Result<Vec<i32>> {
        Self::check_step(step, sections)?;
        Ok(self.alternating(n, sections, |on_step| if on_step { (1, step) } else { (1, KEY_MAX) }))
    }

    /// Alternating sections of keys in `1..=100` and `step..=100`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] for a step outside `1..=100` or zero sections.
    pub fn lower_step(&mut self, n: usize, step: i32, sections: usize) -> Result<Vec<i32>> {
        Self::check_step(step, sections)?;
        Ok(self.alternating(n, sections, |on_step| if on_step { (step, KEY_MAX) } else { (1, KEY_MAX) }))
    }

    /// Lower-step sections where the stepped part is `ratio` times longer than the
    /// unstepped part.
    ///
    /// Each of `sections` periods holds an unstepped run of keys in `1..=100` followed by a
    /// stepped run of keys in `step..=100`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] for a step outside `1..=100`, zero sections or a
    /// zero or oversized ratio.
    pub fn unequal_lower_step(&mut self, n: usize, step: i32, sections: usize, ratio: usize) -> Result<Vec<i32>> {
        Self::check_step(step, sections)?;
        if ratio == 0 {
            return Err(invalid("ratio", "must be positive"));
        }

        let period = n / sections;
        let stepped = period
            .checked_mul(ratio)
            .zip(ratio.checked_add(1))
            .map(|(scaled, parts)| scaled / parts)
            .ok_or_else(|| invalid("ratio", "too large for the section length"))?;
        let unstepped = period - stepped;

        let mut keys = Vec::with_capacity(n);
        for _ in 0..sections {
            self.fill(&mut keys, unstepped, 1, KEY_MAX);
            self.fill(&mut keys, stepped, step, KEY_MAX);
        }
        let rest = n - keys.len();
        self.fill(&mut keys, rest, step, KEY_MAX);
        Ok(keys)
    }

    /// Sorted runs with random swaps.
    ///
    /// Each section counts `1..=100` (ascending, then descending in the next section),
    /// repeating every key `repeats` times. Then `percent_random`% of the section's rows
    /// are swapped pairwise at distinct random positions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if `repeats` is 0 or too large, or `percent_random`
    /// is outside `0..=100`.
    pub fn partially_sorted(&mut self, n: usize, repeats: usize, percent_random: f64) -> Result<Vec<i32>> {
        if repeats == 0 {
            return Err(invalid("repeats", "must be positive"));
        }
        if !(0.0..=100.0).contains(&percent_random) {
            return Err(invalid("percent_random", "must be within 0..=100"));
        }

        let section_rows = repeats
            .checked_mul(KEY_MAX as usize)
            .ok_or_else(|| invalid("repeats", "too large"))?;
        let swaps = (0.5 * percent_random / 100.0 * section_rows as f64) as usize;
        let mut keys = Vec::with_capacity(n.div_ceil(section_rows) * section_rows);
        let mut ascending = true;

        while keys.len() < n {
            let start = keys.len();
            for i in 0..KEY_MAX {
                let key = if ascending { 1 + i } else { KEY_MAX - i };
                keys.extend(std::iter::repeat(key).take(repeats));
            }
            ascending = !ascending;

            let section = &mut keys[start..];
            let positions = index::sample(&mut self.rng, section_rows, 2 * swaps).into_vec();
            for pair in positions.chunks_exact(2) {
                section.swap(pair[0], pair[1]);
            }
        }
        keys.truncate(n);
        Ok(keys)
    }

    fn check_step(step: i32, sections: usize) -> Result<()> {
        if !(1..=KEY_MAX).contains(&step) {
            return Err(invalid("step", "must be within 1..=100"));
        }
        if sections == 0 {
            return Err(invalid("sections", "must be positive"));
        }
        Ok(())
    }

    fn alternating(&mut self, n: usize, sections: usize, bounds: impl Fn(bool) -> (i32, i32)) -> Vec<i32> {
        let rows_per_section = n / sections;
        let mut keys = Vec::with_capacity(n);
        let mut on_step = false;
        for _ in 0..sections {
            let (low, high) = bounds(on_step);
            self.fill(&mut keys, rows_per_section, low, high);
            on_step = !on_step;
        }
        let (low, high) = bounds(!on_step);
        let rest = n - keys.len();
        self.fill(&mut keys, rest, low, high);
        keys
    }

    fn fill(&mut self, keys: &mut Vec<i32>, rows: usize, low: i32, high: i32) {
        let dist = Uniform::new_inclusive(low, high);
        keys.extend(dist.sample_iter(&mut self.rng).take(rows));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectivity(keys: &[i32], threshold: i32) -> f64 {
        keys.iter().filter(|&&k| k <= threshold).count() as f64 / keys.len() as f64
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = DataGenerator::new().uniform(1000, 100).unwrap();
        let b = DataGenerator::new().uniform(1000, 100).unwrap();
        let c = DataGenerator::with_seed(7).uniform(1000, 100).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_uniform_range_and_selectivity() {
        let keys = DataGenerator::new().uniform(100_000, 100).unwrap();

        assert_eq!(keys.len(), 100_000);
        assert!(keys.iter().all(|k| (1..=100).contains(k)));
        let s = selectivity(&keys, 50);
        assert!((s - 0.5).abs() < 0.02, "selectivity {s}");
    }

    #[test]
    fn test_unique_shuffled_is_permutation() {
        let mut keys = DataGenerator::new().unique_shuffled(500).unwrap();
        assert_ne!(keys, (1..=500).collect::<Vec<_>>());

        keys.sort_unstable();
        assert_eq!(keys, (1..=500).collect::<Vec<_>>());
    }

    #[test]
    fn test_uniform_with_upper_n_is_permutation() {
        let mut keys = DataGenerator::new().uniform(64, 64).unwrap();
        keys.sort_unstable();
        assert_eq!(keys, (1..=64).collect::<Vec<_>>());
    }

    #[test]
    fn test_upper_step_sections() {
        let keys = DataGenerator::new().upper_step(40_000, 10, 4).unwrap();

        assert_eq!(keys.len(), 40_000);
        // even sections span 1..=100, odd sections 1..=10
        assert!(keys[10_000..20_000].iter().all(|&k| k <= 10));
        assert!(selectivity(&keys[..10_000], 10) < 0.2);
        assert!(keys[30_000..].iter().all(|&k| k <= 10));
    }

    #[test]
    fn test_lower_step_sections() {
        let keys = DataGenerator::new().lower_step(40_000, 50, 4).unwrap();

        assert!(keys[10_000..20_000].iter().all(|&k| k >= 50));
        assert!(keys[..10_000].iter().any(|&k| k < 50));
    }

    #[test]
    fn test_unequal_lower_step_ratio() {
        let keys = DataGenerator::new().unequal_lower_step(10_000, 50, 2, 4).unwrap();

        assert_eq!(keys.len(), 10_000);
        // period 5000: 1000 unstepped rows then 4000 stepped rows
        assert!(keys[1000..5000].iter().all(|&k| k >= 50));
        assert!(keys[6000..10_000].iter().all(|&k| k >= 50));
    }

    #[test]
    fn test_varying_selectivity_ramps() {
        let keys = DataGenerator::new().varying_selectivity(100_000, 50, 2).unwrap();

        assert_eq!(keys.len(), 100_000);
        assert!(keys.iter().all(|k| (1..=100).contains(k)));
        // first step spans 1..=100, last step of the rising section starts at 50
        assert!(keys[..1000].iter().any(|&k| k < 10));
        assert!(keys[49_000..50_000].iter().all(|&k| k >= 50));
    }

    #[test]
    fn test_partially_sorted_without_swaps_is_sorted_runs() {
        let keys = DataGenerator::new().partially_sorted(450, 2, 0.0).unwrap();

        assert_eq!(keys.len(), 450);
        assert_eq!(&keys[..4], &[1, 1, 2, 2]);
        assert_eq!(&keys[198..202], &[100, 100, 100, 100]);
        assert_eq!(&keys[398..402], &[1, 1, 1, 1]);
    }

    #[test]
    fn test_partially_sorted_swaps_preserve_multiset() {
        let keys = DataGenerator::new().partially_sorted(1000, 1, 40.0).unwrap();
        let sorted: Vec<i32> = (1..=100).collect();

        assert_ne!(&keys[..100], sorted.as_slice());
        let mut section = keys[..100].to_vec();
        section.sort_unstable();
        assert_eq!(section, sorted);
    }

    #[test]
    fn test_invalid_parameters() {
        let mut generator = DataGenerator::new();

        assert!(generator.uniform(10, 0).is_err());
        assert!(generator.upper_step(10, 0, 2).is_err());
        assert!(generator.lower_step(10, 50, 0).is_err());
        assert!(generator.unequal_lower_step(10, 50, 2, 0).is_err());
        assert!(generator.varying_selectivity(10, 101, 1).is_err());
        assert!(generator.partially_sorted(10, 1, 120.0).is_err());
    }

    #[test]
    fn test_oversized_parameters_rejected() {
        let mut generator = DataGenerator::new();

        let err = generator.varying_selectivity(10, 100, usize::MAX).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
        let err = generator.unequal_lower_step(1_000, 50, 1, usize::MAX).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
        let err = generator.partially_sorted(10, usize::MAX, 0.0).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid { .. }));
    }

    #[test]
    fn test_remainder_rows_filled() {
        let mut generator = DataGenerator::new();

        assert_eq!(generator.varying_selectivity(1_003, 7, 3).unwrap().len(), 1_003);
        assert_eq!(generator.upper_step(1_003, 40, 4).unwrap().len(), 1_003);
        assert_eq!(generator.lower_step(1_003, 40, 4).unwrap().len(), 1_003);

        let keys = generator.unequal_lower_step(1_003, 60, 3, 4).unwrap();
        assert_eq!(keys.len(), 1_003);
        assert!(keys[keys.len() - 3..].iter().all(|&k| (60..=KEY_MAX).contains(&k)));
    }
}
