//! Scalar scan kernels.
//!
//! Kernels assume the caller validated `selection.len() >= rows`. Index kernels take the
//! position of their first row so chunked callers emit global row positions.

use super::SelectInput;

/// Writes `first_row + i` for every key `<= threshold`, branching per row.
#[inline]
pub(crate) fn indexes_branch(keys: &[i32], first_row: usize, selection: &mut [i32], threshold: i32) -> usize {
    let mut k = 0;
    for (i, &key) in keys.iter().enumerate() {
        if key <= threshold {
            selection[k] = (first_row + i) as i32;
            k += 1;
        }
    }
    k
}

/// Writes every row position unconditionally and advances only on a match.
///
/// A non-matching write is overwritten by the next row, so `selection[..k]` ends up
/// identical to [`indexes_branch`].
#[inline]
pub(crate) fn indexes_predication(
    keys: &[i32],
    first_row: usize,
    selection: &mut [i32],
    threshold: i32,
) -> usize {
    let selection = &mut selection[..keys.len()];
    let mut k = 0;
    for (i, &key) in keys.iter().enumerate() {
        selection[k] = (first_row + i) as i32;
        k += usize::from(key <= threshold);
    }
    k
}

/// Writes the payload of every row whose key is `<= threshold`, branching per row.
#[inline]
pub(crate) fn values_branch(input: SelectInput<'_>, selection: &mut [i32], threshold: i32) -> usize {
    let mut k = 0;
    for (&value, &key) in input.values().iter().zip(input.filter()) {
        if key <= threshold {
            selection[k] = value;
            k += 1;
        }
    }
    k
}

/// Branch-free value select.
#[inline]
pub(crate) fn values_predication(input: SelectInput<'_>, selection: &mut [i32], threshold: i32) -> usize {
    let selection = &mut selection[..input.len()];
    let mut k = 0;
    for (&value, &key) in input.values().iter().zip(input.filter()) {
        selection[k] = value;
        k += usize::from(key <= threshold);
    }
    k
}
