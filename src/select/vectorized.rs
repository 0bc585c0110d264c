//! Vectorized value select.
//!
//! The scan has three phases, shared by every backend:
//!
//! 1. a scalar predicated prefix until the key pointer reaches vector alignment
//! 2. aligned groups of `LANES` keys compared at once into a lane bitmask; empty masks
//!    are skipped by population count, full masks copy the whole group, anything else
//!    compacts one set bit at a time in lane order
//! 3. a scalar predicated tail for the remaining `< LANES` keys
//!
//! [`SimdBackend::Scalar`] computes the lane mask in plain Rust and is always available,
//! so the phase logic is testable on any platform.
//!
//! # Safety
//!
//! This module uses `unsafe` for SIMD intrinsics which are sound when:
//! - the backend was detected on the running CPU before dispatch
//! - every vector load covers `LANES` in-bounds keys at an aligned address
#![allow(unsafe_code)]

use super::{check_capacity, SelectInput};
use crate::error::{Error, Result};
use std::ops::Range;
use std::sync::OnceLock;

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
use std::arch::x86_64::*;

#[cfg(all(feature = "simd", target_arch = "aarch64"))]
use std::arch::aarch64::*;

/// Backend selection for the vectorized scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimdBackend {
    /// Portable lane mask computed in scalar code (4 lanes).
    Scalar,
    /// SSE2 (128-bit, x86_64 baseline).
    Sse2,
    /// AVX2 (256-bit, Haswell 2013+).
    Avx2,
    /// ARM NEON (128-bit).
    Neon,
}

impl SimdBackend {
    /// All backends, compiled in or not.
    pub const ALL: [Self; 4] = [Self::Scalar, Self::Sse2, Self::Avx2, Self::Neon];

    /// Detects the best available backend for the current CPU.
    #[must_use]
    #[allow(unreachable_code)]
    pub fn detect() -> Self {
        #[cfg(all(feature = "simd", target_arch = "x86_64"))]
        {
            if is_x86_feature_detected!("avx2") {
                return Self::Avx2;
            }
            if is_x86_feature_detected!("sse2") {
                return Self::Sse2;
            }
        }

        #[cfg(all(feature = "simd", target_arch = "aarch64"))]
        {
            // NEON is mandatory on AArch64
            return Self::Neon;
        }

        Self::Scalar
    }

    /// The backend detected once per process.
    pub fn active() -> Self {
        static ACTIVE: OnceLock<SimdBackend> = OnceLock::new();
        *ACTIVE.get_or_init(|| {
            let backend = Self::detect();
            log::debug!("Vectorized select backend: {} ({} lanes)", backend.name(), backend.lanes());
            backend
        })
    }

    /// Returns true if this backend is compiled in and supported by the CPU.
    #[must_use]
    pub fn is_supported(self) -> bool {
        match self {
            Self::Scalar => true,
            #[cfg(all(feature = "simd", target_arch = "x86_64"))]
            Self::Sse2 => is_x86_feature_detected!("sse2"),
            #[cfg(all(feature = "simd", target_arch = "x86_64"))]
            Self::Avx2 => is_x86_feature_detected!("avx2"),
            #[cfg(all(feature = "simd", target_arch = "aarch64"))]
            Self::Neon => true,
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Backends usable on this machine.
    #[must_use]
    pub fn supported() -> Vec<Self> {
        Self::ALL.into_iter().filter(|backend| backend.is_supported()).collect()
    }

    /// Number of `i32` keys compared per vector.
    #[must_use]
    pub const fn lanes(self) -> usize {
        match self {
            Self::Scalar | Self::Sse2 | Self::Neon => 4,
            Self::Avx2 => 8,
        }
    }

    /// Byte alignment of vector loads.
    #[must_use]
    pub const fn alignment(self) -> usize {
        self.lanes() * std::mem::size_of::<i32>()
    }

    /// Returns a short backend name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Sse2 => "sse2",
            Self::Avx2 => "avx2",
            Self::Neon => "neon",
        }
    }
}

/// Vectorized value select on an explicit backend.
///
/// # Errors
///
/// Returns [`Error::BufferTooSmall`] for an undersized buffer, or
/// [`Error::BackendUnsupported`] if `backend` cannot run here.
pub fn select_values_vectorized_with(
    backend: SimdBackend,
    input: SelectInput<'_>,
    selection: &mut [i32],
    threshold: i32,
) -> Result<usize> {
    check_capacity(input.len(), selection)?;
    if !backend.is_supported() {
        return Err(Error::BackendUnsupported(backend.name()));
    }

    // SAFETY: capacity was checked above and the backend is supported by this CPU.
    let selected = unsafe {
        match backend {
            SimdBackend::Scalar => select_lanes::<ScalarLanes>(input, selection, threshold),
            #[cfg(all(feature = "simd", target_arch = "x86_64"))]
            SimdBackend::Sse2 => select_sse2(input, selection, threshold),
            #[cfg(all(feature = "simd", target_arch = "x86_64"))]
            SimdBackend::Avx2 => select_avx2(input, selection, threshold),
            #[cfg(all(feature = "simd", target_arch = "aarch64"))]
            SimdBackend::Neon => select_neon(input, selection, threshold),
            #[allow(unreachable_patterns)]
            _ => return Err(Error::BackendUnsupported(backend.name())),
        }
    };
    Ok(selected)
}

// ============================================================================
// Portable phases
// ============================================================================

/// Rows before `filter` reaches an `align`-byte boundary (at most `filter.len()`).
pub(crate) fn aligned_prefix_len(filter: &[i32], align: usize) -> usize {
    filter.as_ptr().align_offset(align).min(filter.len())
}

/// Predicated scalar scan over `rows`, appending at `k`.
#[inline(always)]
fn predicated_rows(
    input: SelectInput<'_>,
    rows: Range<usize>,
    selection: &mut [i32],
    mut k: usize,
    threshold: i32,
) -> usize {
    let values = input.values();
    let filter = input.filter();
    for i in rows {
        selection[k] = values[i];
        k += usize::from(filter[i] <= threshold);
    }
    k
}

/// Appends the payload of every set lane of `mask`, lowest lane first.
#[inline(always)]
pub(crate) fn compact_lanes(
    mask: u32,
    lanes: usize,
    values: &[i32],
    base: usize,
    selection: &mut [i32],
    k: usize,
) -> usize {
    match mask.count_ones() as usize {
        0 => k,
        full if full == lanes => {
            selection[k..k + lanes].copy_from_slice(&values[base..base + lanes]);
            k + lanes
        }
        _ => {
            let mut bits = mask;
            let mut k = k;
            while bits != 0 {
                let lane = bits.trailing_zeros() as usize;
                selection[k] = values[base + lane];
                k += 1;
                bits &= bits - 1;
            }
            k
        }
    }
}

/// A lane-parallel `key <= threshold` compare.
trait LaneMask {
    const LANES: usize;

    /// Bit `i` of the result is set iff lane `i` is `<= threshold`.
    ///
    /// # Safety
    ///
    /// `keys` must point to `LANES` readable `i32`s aligned to `LANES * 4` bytes, and the
    /// running CPU must support the implementation's instructions.
    unsafe fn le_mask(keys: *const i32, threshold: i32) -> u32;
}

/// Runs the three scan phases with lane compares from `L`.
///
/// # Safety
///
/// `selection.len() >= input.len()` and `L` must be supported by the running CPU.
#[inline(always)]
unsafe fn select_lanes<L: LaneMask>(input: SelectInput<'_>, selection: &mut [i32], threshold: i32) -> usize {
    let filter = input.filter();
    let n = filter.len();

    let prefix = aligned_prefix_len(filter, L::LANES * std::mem::size_of::<i32>());
    let mut k = predicated_rows(input, 0..prefix, selection, 0, threshold);

    let body_end = prefix + (n - prefix) / L::LANES * L::LANES;
    let mut i = prefix;
    while i < body_end {
        // SAFETY: i + LANES <= body_end <= n, and i starts aligned and advances by a
        // whole vector, so every load is in bounds and aligned.
        let mask = unsafe { L::le_mask(filter.as_ptr().add(i), threshold) };
        k = compact_lanes(mask, L::LANES, input.values(), i, selection, k);
        i += L::LANES;
    }

    predicated_rows(input, body_end..n, selection, k, threshold)
}

struct ScalarLanes;

impl LaneMask for ScalarLanes {
    const LANES: usize = 4;

    #[inline(always)]
    unsafe fn le_mask(keys: *const i32, threshold: i32) -> u32 {
        // SAFETY: the caller guarantees LANES readable keys.
        let keys = unsafe { std::slice::from_raw_parts(keys, Self::LANES) };
        keys.iter()
            .enumerate()
            .fold(0, |mask, (lane, &key)| mask | (u32::from(key <= threshold) << lane))
    }
}

// ============================================================================
// x86_64 backends
// ============================================================================

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
struct Sse2Lanes;

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
impl LaneMask for Sse2Lanes {
    const LANES: usize = 4;

    #[inline(always)]
    unsafe fn le_mask(keys: *const i32, threshold: i32) -> u32 {
        // SAFETY: forwarded caller contract.
        unsafe { sse2_le_mask(keys, threshold) }
    }
}

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
#[target_feature(enable = "sse2")]
#[inline]
unsafe fn sse2_le_mask(keys: *const i32, threshold: i32) -> u32 {
    // SAFETY: aligned in-bounds load guaranteed by the caller; SSE2 detected.
    unsafe {
        let keys = _mm_load_si128(keys.cast::<__m128i>());
        let greater = _mm_cmpgt_epi32(keys, _mm_set1_epi32(threshold));
        !(_mm_movemask_ps(_mm_castsi128_ps(greater)) as u32) & 0xF
    }
}

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
struct Avx2Lanes;

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
impl LaneMask for Avx2Lanes {
    const LANES: usize = 8;

    #[inline(always)]
    unsafe fn le_mask(keys: *const i32, threshold: i32) -> u32 {
        // SAFETY: forwarded caller contract.
        unsafe { avx2_le_mask(keys, threshold) }
    }
}

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn avx2_le_mask(keys: *const i32, threshold: i32) -> u32 {
    // SAFETY: aligned in-bounds load guaranteed by the caller; AVX2 detected.
    unsafe {
        let keys = _mm256_load_si256(keys.cast::<__m256i>());
        let greater = _mm256_cmpgt_epi32(keys, _mm256_set1_epi32(threshold));
        !(_mm256_movemask_ps(_mm256_castsi256_ps(greater)) as u32) & 0xFF
    }
}

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
#[target_feature(enable = "sse2")]
unsafe fn select_sse2(input: SelectInput<'_>, selection: &mut [i32], threshold: i32) -> usize {
    // SAFETY: forwarded caller contract.
    unsafe { select_lanes::<Sse2Lanes>(input, selection, threshold) }
}

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
#[target_feature(enable = "avx2")]
unsafe fn select_avx2(input: SelectInput<'_>, selection: &mut [i32], threshold: i32) -> usize {
    // SAFETY: forwarded caller contract.
    unsafe { select_lanes::<Avx2Lanes>(input, selection, threshold) }
}

// ============================================================================
// aarch64 backend
// ============================================================================

#[cfg(all(feature = "simd", target_arch = "aarch64"))]
struct NeonLanes;

#[cfg(all(feature = "simd", target_arch = "aarch64"))]
impl LaneMask for NeonLanes {
    const LANES: usize = 4;

    #[inline(always)]
    unsafe fn le_mask(keys: *const i32, threshold: i32) -> u32 {
        // SAFETY: forwarded caller contract.
        unsafe { neon_le_mask(keys, threshold) }
    }
}

#[cfg(all(feature = "simd", target_arch = "aarch64"))]
#[target_feature(enable = "neon")]
#[inline]
unsafe fn neon_le_mask(keys: *const i32, threshold: i32) -> u32 {
    const LANE_BITS: [u32; 4] = [1, 2, 4, 8];
    // SAFETY: in-bounds load guaranteed by the caller; NEON is mandatory on AArch64.
    unsafe {
        let keys = vld1q_s32(keys);
        let le = vcleq_s32(keys, vdupq_n_s32(threshold));
        vaddvq_u32(vandq_u32(le, vld1q_u32(LANE_BITS.as_ptr())))
    }
}

#[cfg(all(feature = "simd", target_arch = "aarch64"))]
#[target_feature(enable = "neon")]
unsafe fn select_neon(input: SelectInput<'_>, selection: &mut [i32], threshold: i32) -> usize {
    // SAFETY: forwarded caller contract.
    unsafe { select_lanes::<NeonLanes>(input, selection, threshold) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::scalar;

    fn reference(input: SelectInput<'_>, threshold: i32) -> Vec<i32> {
        let mut out = vec![0; input.len()];
        let k = scalar::values_branch(input, &mut out, threshold);
        out.truncate(k);
        out
    }

    fn keys(n: usize) -> Vec<i32> {
        (0..n).map(|i| ((i * 37 + 11) % 100) as i32).collect()
    }

    #[test]
    fn test_backend_detection() {
        let backend = SimdBackend::detect();
        assert!(backend.is_supported());
        assert!(backend.lanes() >= 4);
        assert_eq!(SimdBackend::active(), backend);
        assert!(SimdBackend::supported().contains(&SimdBackend::Scalar));
    }

    #[test]
    fn test_alignment_matches_lanes() {
        assert_eq!(SimdBackend::Scalar.alignment(), 16);
        assert_eq!(SimdBackend::Sse2.alignment(), 16);
        assert_eq!(SimdBackend::Avx2.alignment(), 32);
        assert_eq!(SimdBackend::Neon.alignment(), 16);
    }

    #[test]
    fn test_every_backend_every_offset() {
        let data = keys(300);
        for backend in SimdBackend::supported() {
            for offset in 0..2 * backend.lanes() {
                for len in [0, 1, 3, 7, 8, 9, 31, 64, 200] {
                    let filter = &data[offset..offset + len];
                    let input = SelectInput::keys(filter);
                    for threshold in [-1, 0, 10, 49, 50, 98, 99, 100] {
                        let mut out = vec![0; len];
                        let k = select_values_vectorized_with(backend, input, &mut out, threshold).unwrap();
                        assert_eq!(
                            &out[..k],
                            reference(input, threshold).as_slice(),
                            "backend {} offset {} len {} threshold {}",
                            backend.name(),
                            offset,
                            len,
                            threshold
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_split_columns_with_different_alignment() {
        let values: Vec<i32> = (1000..1100).collect();
        let filter = keys(101);
        for backend in SimdBackend::supported() {
            let input = SelectInput::split(&values[..99], &filter[1..100]).unwrap();
            let mut out = vec![0; 99];
            let k = select_values_vectorized_with(backend, input, &mut out, 30).unwrap();
            assert_eq!(&out[..k], reference(input, 30).as_slice());
        }
    }

    #[test]
    fn test_nothing_qualifies_touches_only_first_slot() {
        let data = vec![50; 64];
        for backend in SimdBackend::supported() {
            let mut out = vec![-1; 64];
            let k = select_values_vectorized_with(backend, SelectInput::keys(&data[1..]), &mut out, 0).unwrap();
            assert_eq!(k, 0);
            assert!(out[1..].iter().all(|&v| v == -1), "backend {}", backend.name());
        }
    }

    #[test]
    fn test_unsupported_backend_rejected() {
        for backend in SimdBackend::ALL {
            if !backend.is_supported() {
                let mut out = vec![0; 4];
                let err = select_values_vectorized_with(backend, SelectInput::keys(&[1, 2, 3, 4]), &mut out, 2)
                    .unwrap_err();
                assert!(matches!(err, Error::BackendUnsupported(_)));
            }
        }
    }

    #[test]
    fn test_compact_lanes_preserves_order() {
        let values = [10, 11, 12, 13, 14, 15, 16, 17];
        let mut out = vec![0; 8];

        assert_eq!(compact_lanes(0, 8, &values, 0, &mut out, 0), 0);
        assert_eq!(compact_lanes(0b1010_0101, 8, &values, 0, &mut out, 0), 4);
        assert_eq!(&out[..4], &[10, 12, 15, 17]);
        assert_eq!(compact_lanes(0xFF, 8, &values, 0, &mut out, 0), 8);
        assert_eq!(out, values.to_vec());
        assert_eq!(compact_lanes(0b0110, 4, &values, 4, &mut out, 1), 3);
        assert_eq!(&out[..3], &[10, 15, 16]);
    }

    #[test]
    fn test_aligned_prefix_len() {
        let data = vec![0i32; 32];
        for offset in 0..8 {
            let slice = &data[offset..];
            let prefix = aligned_prefix_len(slice, 16);
            assert!(prefix < 4);
            assert_eq!((slice.as_ptr() as usize + prefix * 4) % 16, 0);
        }
        assert!(aligned_prefix_len(&data[1..2], 16) <= 1);
    }

    #[test]
    fn test_scalar_lane_mask() {
        let keys = [5, -3, 9, 5];
        // SAFETY: four readable keys; the scalar backend has no CPU requirement.
        let mask = unsafe { ScalarLanes::le_mask(keys.as_ptr(), 5) };
        assert_eq!(mask, 0b1011);
    }

    #[cfg(all(feature = "simd", any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[repr(align(32))]
    struct AlignedKeys([i32; 8]);

    #[test]
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    fn test_x86_lane_masks() {
        let keys = AlignedKeys([5, -3, 9, 5, 6, i32::MIN, i32::MAX, 4]);

        if SimdBackend::Sse2.is_supported() {
            // SAFETY: 32-byte aligned array of eight keys; SSE2 detected.
            let mask = unsafe { Sse2Lanes::le_mask(keys.0.as_ptr(), 5) };
            assert_eq!(mask, 0b1011);
        }
        if SimdBackend::Avx2.is_supported() {
            // SAFETY: 32-byte aligned array of eight keys; AVX2 detected.
            let mask = unsafe { Avx2Lanes::le_mask(keys.0.as_ptr(), 5) };
            assert_eq!(mask, 0b1010_1011);
        }
    }

    #[test]
    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    fn test_neon_lane_mask() {
        let keys = AlignedKeys([5, -3, 9, 5, 0, 0, 0, 0]);
        // SAFETY: aligned array with four readable keys; NEON is mandatory on AArch64.
        let mask = unsafe { NeonLanes::le_mask(keys.0.as_ptr(), 5) };
        assert_eq!(mask, 0b1011);
    }
}
