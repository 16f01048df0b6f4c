// `avx2` is not assumed at compile time: these kernels are compiled
// unconditionally and must only be called after runtime detection, e.g.
//
//   if std::arch::is_x86_feature_detected!("avx2") { ... }

use core::arch::x86_64::{
  __m256i, _mm256_add_epi32, _mm256_loadu_si256, _mm256_min_epi32, _mm256_mullo_epi32,
  _mm256_set1_epi32, _mm256_storeu_si256,
};

use crate::executor::{TRANSFORM_CLAMP, TRANSFORM_SCALE};

/// Register width of these kernels, in bits.
pub const WIDTH_BITS: u32 = 256;

/// Number of `i32` lanes per vector.
pub const I32_LANES: usize = (WIDTH_BITS / i32::BITS) as usize;

#[derive(Clone, Copy)]
#[repr(transparent)]
struct Vector(__m256i);

impl Vector {
  #[inline(always)]
  unsafe fn splat(v: i32) -> Self {
    Self(_mm256_set1_epi32(v))
  }

  /// Load 8 lanes from the given slice.
  ///
  /// `data[offset..].len()` must be at least 8 elements.
  #[inline(always)]
  unsafe fn load_unaligned(data: &[i32], offset: usize) -> Self {
    debug_assert!(data[offset..].len() >= I32_LANES);
    Self(_mm256_loadu_si256(
      data.as_ptr().add(offset) as *const __m256i
    ))
  }

  /// Store 8 lanes into the given slice.
  ///
  /// `data[offset..].len()` must be at least 8 elements.
  #[inline(always)]
  unsafe fn store_unaligned(self, data: &mut [i32], offset: usize) {
    debug_assert!(data[offset..].len() >= I32_LANES);
    _mm256_storeu_si256(data.as_mut_ptr().add(offset) as *mut __m256i, self.0)
  }

  /// Lanewise wrapping addition.
  #[inline(always)]
  unsafe fn add(self, other: Self) -> Self {
    Self(_mm256_add_epi32(self.0, other.0))
  }

  /// Lanewise wrapping multiplication, keeping the low 32 bits.
  #[inline(always)]
  unsafe fn mul(self, other: Self) -> Self {
    Self(_mm256_mullo_epi32(self.0, other.0))
  }

  /// Lanewise signed minimum.
  #[inline(always)]
  unsafe fn min(self, other: Self) -> Self {
    Self(_mm256_min_epi32(self.0, other.0))
  }
}

/// `out[i] = a[i] + b[i]` (wrapping) over a lane-aligned region.
///
/// All three slices must have the same length, a multiple of
/// [`I32_LANES`].
///
/// # Safety
///
/// The caller must have verified that the CPU supports AVX2.
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn add_chunks(a: &[i32], b: &[i32], out: &mut [i32]) {
  debug_assert_eq!(a.len(), b.len());
  debug_assert_eq!(a.len(), out.len());
  debug_assert_eq!(a.len() % I32_LANES, 0);

  let mut i = 0;
  while i < a.len() {
    let va = Vector::load_unaligned(a, i);
    let vb = Vector::load_unaligned(b, i);
    va.add(vb).store_unaligned(out, i);
    i += I32_LANES;
  }
}

/// `data[i] = min(data[i] * data[i] + 4 * data[i], 1000)` over a
/// lane-aligned region.
///
/// `data.len()` must be a multiple of [`I32_LANES`].
///
/// # Safety
///
/// The caller must have verified that the CPU supports AVX2.
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn transform_chunks(data: &mut [i32]) {
  debug_assert_eq!(data.len() % I32_LANES, 0);

  let scale = Vector::splat(TRANSFORM_SCALE);
  let clamp = Vector::splat(TRANSFORM_CLAMP);

  let mut i = 0;
  while i < data.len() {
    let x = Vector::load_unaligned(data, i);
    let squared = x.mul(x);
    let scaled = x.mul(scale);
    squared.add(scaled).min(clamp).store_unaligned(data, i);
    i += I32_LANES;
  }
}
