//! Capability-gated elementwise vector operations.
//!
//! The entrypoint to this module is [`Executor`], constructed from a
//! [`VectorCapability`]. Operations process the lane-aligned prefix of
//! their buffers in lane-sized strides and the remainder through a scalar
//! tail loop, so any buffer length is valid.
//!
//! Vectorization is never an observable semantic change: every operation
//! is bit-for-bit equal to its scalar equivalent.

use crate::capability::VectorCapability;
use std::fmt::Display;

/// Upper clamp of the compound transform.
pub(crate) const TRANSFORM_CLAMP: i32 = 1000;

/// Linear scale of the compound transform.
pub(crate) const TRANSFORM_SCALE: i32 = 4;

/// Executes elementwise integer operations at the vector width its
/// capability was detected for.
pub struct Executor {
  capability: VectorCapability,
  kernel: Kernel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
  /// AVX2 intrinsics, 8 `i32` lanes per op.
  #[cfg(all(target_arch = "x86_64", feature = "simd"))]
  Avx2,
  /// Lane-stride loop with the same observable semantics as the
  /// vectorized kernels. The only path on hosts without a matching
  /// kernel, and for synthetic capabilities.
  Portable,
}

impl Kernel {
  fn select(capability: &VectorCapability) -> Kernel {
    #[cfg(all(target_arch = "x86_64", feature = "simd"))]
    if capability.required_bits == crate::wide::x86_64::WIDTH_BITS
      && capability.effective_bits >= crate::wide::x86_64::WIDTH_BITS
      && std::arch::is_x86_feature_detected!("avx2")
    {
      return Kernel::Avx2;
    }

    let _ = capability;
    Kernel::Portable
  }
}

impl Executor {
  /// Construct an executor for the given capability.
  ///
  /// The capability is explicit input rather than ambient state so the
  /// gate and the executor stay testable with synthetic widths.
  pub fn new(capability: VectorCapability) -> Self {
    debug_assert!(capability.lanes() >= 1);
    let kernel = Kernel::select(&capability);
    trace!(?kernel, "selected kernel");
    Self { capability, kernel }
  }

  /// The capability this executor was constructed with.
  pub fn capability(&self) -> &VectorCapability {
    &self.capability
  }

  /// `out[i] = a[i] + b[i]` (wrapping) for every index.
  ///
  /// All three buffers must have the same length.
  pub fn add(&self, a: &[i32], b: &[i32], out: &mut [i32]) -> Result<(), ExecuteError> {
    if a.len() != b.len() {
      return Err(ExecuteError::LengthMismatch {
        left: a.len(),
        right: b.len(),
      });
    }
    if out.len() != a.len() {
      return Err(ExecuteError::LengthMismatch {
        left: a.len(),
        right: out.len(),
      });
    }

    let lanes = self.capability.lanes();
    let bound = a.len() / lanes * lanes;
    self.check_effective_width(bound)?;

    match self.kernel {
      #[cfg(all(target_arch = "x86_64", feature = "simd"))]
      // SAFETY: kernel selection verified AVX2 support at runtime.
      Kernel::Avx2 => unsafe {
        crate::wide::x86_64::add_chunks(&a[..bound], &b[..bound], &mut out[..bound]);
      },
      Kernel::Portable => {
        for i in (0..bound).step_by(lanes) {
          for j in i..i + lanes {
            out[j] = a[j].wrapping_add(b[j]);
          }
        }
      }
    }

    // Scalar tail: always scalar, the remainder is smaller than one lane.
    for i in bound..a.len() {
      out[i] = a[i].wrapping_add(b[i]);
    }

    Ok(())
  }

  /// In-place compound transform: `min(x*x + 4*x, 1000)` per element.
  ///
  /// Deterministic, no side effects beyond the buffer. The length does
  /// not have to be a multiple of the lane count.
  pub fn transform(&self, data: &mut [i32]) -> Result<(), ExecuteError> {
    let lanes = self.capability.lanes();
    let bound = data.len() / lanes * lanes;
    self.check_effective_width(bound)?;

    match self.kernel {
      #[cfg(all(target_arch = "x86_64", feature = "simd"))]
      // SAFETY: kernel selection verified AVX2 support at runtime.
      Kernel::Avx2 => unsafe {
        crate::wide::x86_64::transform_chunks(&mut data[..bound]);
      },
      Kernel::Portable => {
        for i in (0..bound).step_by(lanes) {
          for x in &mut data[i..i + lanes] {
            *x = transform_scalar(*x);
          }
        }
      }
    }

    for x in &mut data[bound..] {
      *x = transform_scalar(*x);
    }

    Ok(())
  }

  /// Use-time re-check of the gate's optimistic assumption.
  ///
  /// An environment override can cap the honored width below the required
  /// width even though detection reported support. That failure surfaces
  /// here, at the first vector use, and must propagate: it is never
  /// downgraded to a scalar fallback. Tail-only inputs (`bound == 0`)
  /// execute no vector instruction and are unaffected.
  fn check_effective_width(&self, bound: usize) -> Result<(), ExecuteError> {
    if bound > 0 && self.capability.effective_bits < self.capability.required_bits {
      return Err(ExecuteError::WidthDowngrade {
        required_bits: self.capability.required_bits,
        effective_bits: self.capability.effective_bits,
        arch: self.capability.arch,
      });
    }
    Ok(())
  }
}

#[inline(always)]
fn transform_scalar(x: i32) -> i32 {
  x.wrapping_mul(x)
    .wrapping_add(x.wrapping_mul(TRANSFORM_SCALE))
    .min(TRANSFORM_CLAMP)
}

/// Failed to execute a vectorized operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteError {
  /// Buffer lengths do not match. Lengths are a precondition: the
  /// operation fails fast instead of silently truncating.
  LengthMismatch {
    /// Length of the first buffer.
    left: usize,
    /// Length of the mismatched buffer.
    right: usize,
  },

  /// The width honored at the point of first vector use is below the
  /// width the executor was gated for.
  WidthDowngrade {
    /// Width the program requires, in bits.
    required_bits: u32,
    /// Width actually honored, in bits.
    effective_bits: u32,
    /// Host architecture string.
    arch: &'static str,
  },
}

impl Display for ExecuteError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ExecuteError::LengthMismatch { left, right } => {
        write!(f, "buffer length mismatch: {left} vs {right}")
      }
      ExecuteError::WidthDowngrade {
        required_bits,
        effective_bits,
        arch,
      } => write!(
        f,
        "effective vector width on {arch} is {effective_bits} bits, below the required {required_bits} bits"
      ),
    }
  }
}

impl std::error::Error for ExecuteError {}

#[cfg(test)]
mod tests {
  use super::*;

  fn capability(required_bits: u32, preferred_bits: u32, effective_bits: u32) -> VectorCapability {
    VectorCapability {
      required_bits,
      preferred_bits,
      effective_bits,
      arch: "test",
    }
  }

  fn executor() -> Executor {
    Executor::new(capability(256, 256, 256))
  }

  fn inputs(len: usize) -> (Vec<i32>, Vec<i32>) {
    // Mix of signs and magnitudes, including values that wrap on add.
    let a: Vec<i32> = (0..len)
      .map(|i| (i as i32).wrapping_mul(31).wrapping_sub(7))
      .collect();
    let b: Vec<i32> = (0..len)
      .map(|i| i32::MAX.wrapping_sub((i as i32).wrapping_mul(13)))
      .collect();
    (a, b)
  }

  #[test]
  fn add_matches_scalar_on_every_index() {
    let executor = executor();
    // Lengths around lane boundaries: empty, tail-only, exact, and mixed.
    for len in [0, 1, 7, 8, 9, 16, 100, 1003] {
      let (a, b) = inputs(len);
      let mut out = vec![0; len];
      executor.add(&a, &b, &mut out).unwrap();
      for i in 0..len {
        assert_eq!(out[i], a[i].wrapping_add(b[i]), "index {i}, len {len}");
      }
    }
  }

  #[test]
  fn add_partitions_lanes_and_tail_for_other_widths() {
    // 128-bit capability: 4 lanes, always the portable kernel.
    let executor = Executor::new(capability(128, 128, 128));
    for len in [3, 4, 10, 21] {
      let (a, b) = inputs(len);
      let mut out = vec![0; len];
      executor.add(&a, &b, &mut out).unwrap();
      for i in 0..len {
        assert_eq!(out[i], a[i].wrapping_add(b[i]), "index {i}, len {len}");
      }
    }
  }

  #[test]
  fn add_rejects_mismatched_inputs() {
    let executor = executor();
    let mut out = vec![0; 3];
    assert_eq!(
      executor.add(&[1, 2, 3], &[1, 2], &mut out),
      Err(ExecuteError::LengthMismatch { left: 3, right: 2 })
    );
    assert_eq!(
      executor.add(&[1, 2], &[1, 2], &mut out),
      Err(ExecuteError::LengthMismatch { left: 2, right: 3 })
    );
  }

  #[test]
  fn add_checksum_scenario() {
    let executor = executor();
    let a: Vec<i32> = (0..100).collect();
    let b: Vec<i32> = (0..100).map(|i| i * 2).collect();
    let mut out = vec![0; 100];
    executor.add(&a, &b, &mut out).unwrap();

    for (i, v) in out.iter().enumerate() {
      assert_eq!(*v, 3 * i as i32);
    }
    let checksum: i64 = out.iter().take(100).map(|&v| v as i64).sum();
    assert_eq!(checksum, 14850);
  }

  #[test]
  fn transform_one_full_lane() {
    let executor = executor();
    let mut data: Vec<i32> = (1..=8).collect();
    executor.transform(&mut data).unwrap();
    assert_eq!(data, [5, 12, 21, 32, 45, 60, 77, 96]);
  }

  #[test]
  fn transform_clamps_at_1000() {
    let executor = executor();
    let mut data: Vec<i32> = (25..=32).collect();
    executor.transform(&mut data).unwrap();
    // 29 is the largest input below the clamp: 29*29 + 4*29 = 957.
    assert_eq!(data, [725, 780, 837, 896, 957, 1000, 1000, 1000]);
  }

  #[test]
  fn transform_handles_tails() {
    let executor = executor();
    let mut data: Vec<i32> = (1..=11).collect();
    executor.transform(&mut data).unwrap();
    assert_eq!(data, [5, 12, 21, 32, 45, 60, 77, 96, 117, 140, 165]);
  }

  #[test]
  fn transform_is_deterministic() {
    let executor = executor();
    let fresh: Vec<i32> = (0..100).map(|i| i - 50).collect();

    let mut first = fresh.clone();
    executor.transform(&mut first).unwrap();
    let mut second = fresh;
    executor.transform(&mut second).unwrap();

    assert_eq!(first, second);
  }

  #[test]
  fn width_downgrade_fails_at_first_vector_use() {
    // Passes the gate (preferred = 256) but is capped at 128 bits.
    let capability = capability(256, 256, 128);
    assert!(capability.ensure().is_ok());

    let executor = Executor::new(capability);
    let (a, b) = inputs(16);
    let mut out = vec![0; 16];
    assert_eq!(
      executor.add(&a, &b, &mut out),
      Err(ExecuteError::WidthDowngrade {
        required_bits: 256,
        effective_bits: 128,
        arch: "test",
      })
    );
    // The output must be untouched, not partially written.
    assert_eq!(out, vec![0; 16]);

    let mut data = vec![1; 8];
    assert!(executor.transform(&mut data).is_err());
  }

  #[test]
  fn tail_only_inputs_never_touch_the_vector_path() {
    let executor = Executor::new(capability(256, 256, 128));
    let (a, b) = inputs(7);
    let mut out = vec![0; 7];
    executor.add(&a, &b, &mut out).unwrap();
    for i in 0..7 {
      assert_eq!(out[i], a[i].wrapping_add(b[i]));
    }
  }
}
