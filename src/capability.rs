//! Vector capability detection and the pre-execution gate.
//!
//! The entrypoint to this module is [`VectorCapability::detect`], which
//! reads the host's supported integer vector width once at startup.
//! [`VectorCapability::ensure`] is the gate: it compares the width the
//! host reports against the width the program requires.
//!
//! ⚠ The gate is an optimistic pre-check, not a guarantee! An execution
//! environment can cap the width that is actually honored below what the
//! hardware advertises (see [`MAX_VECTOR_BITS_VAR`]), in which case the
//! vectorized operation itself fails at first use instead.

use std::env;
use std::fmt::Display;

/// Environment variable holding a simulated CPU feature list,
/// e.g. `sse4.1,avx2`.
///
/// When set, it replaces hardware introspection entirely: the preferred
/// width is derived from the listed features alone. Used to demonstrate
/// the failure mode of running on hardware without the required features.
pub const CPU_FEATURES_VAR: &str = "LANEGATE_CPU_FEATURES";

/// Environment variable capping the vector width honored at the point of
/// first vector use, in bits.
///
/// This does *not* affect the preferred width reported by detection, so a
/// capability gate may pass and the vectorized operation still fail.
/// Unparseable values are ignored.
pub const MAX_VECTOR_BITS_VAR: &str = "LANEGATE_MAX_VECTOR_BITS";

/// The smallest width assumed when the host cannot report one.
///
/// 128-bit vectors are the baseline on every architecture this crate
/// cares about (SSE2 on x86_64, NEON on aarch64).
const BASELINE_BITS: u32 = 128;

/// Integer vector capability of the host, computed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorCapability {
  /// Width the program was built to require, in bits.
  pub required_bits: u32,

  /// Widest integer vector the host claims to support, in bits.
  pub preferred_bits: u32,

  /// Width actually honored at the point of first vector use, in bits.
  ///
  /// Equal to [`preferred_bits`][Self::preferred_bits] unless an
  /// environment override caps it lower.
  pub effective_bits: u32,

  /// Host architecture string.
  pub arch: &'static str,
}

impl VectorCapability {
  /// Detect the host's vector capability for the given required width.
  ///
  /// Never fails: hosts that cannot report a width are assumed to support
  /// the 128-bit baseline.
  pub fn detect(required_bits: u32) -> Self {
    let features = env::var(CPU_FEATURES_VAR).ok();
    let width_cap = env::var(MAX_VECTOR_BITS_VAR).ok();
    let capability = Self::detect_with(required_bits, features.as_deref(), width_cap.as_deref());
    trace!(?capability, "detected vector capability");
    capability
  }

  fn detect_with(
    required_bits: u32,
    features: Option<&str>,
    width_cap: Option<&str>,
  ) -> Self {
    let preferred_bits = match features {
      Some(features) => width_from_features(features),
      None => introspect(),
    };

    let effective_bits = match width_cap.and_then(|v| v.trim().parse::<u32>().ok()) {
      Some(cap) => preferred_bits.min(cap),
      None => preferred_bits,
    };

    Self {
      required_bits,
      preferred_bits,
      effective_bits,
      arch: env::consts::ARCH,
    }
  }

  /// Number of elements a single vector op processes at the required
  /// width, for `i32` elements.
  pub const fn lanes(&self) -> usize {
    (self.required_bits / i32::BITS) as usize
  }

  /// The capability gate.
  ///
  /// Compares the preferred width against the required width. This is an
  /// optimistic pre-check: it does not consult the effective width, so a
  /// passing gate can still be followed by a use-time failure.
  pub fn ensure(&self) -> Result<(), CapabilityGateError> {
    if self.preferred_bits < self.required_bits {
      return Err(CapabilityGateError {
        required_bits: self.required_bits,
        actual_bits: self.preferred_bits,
        arch: self.arch,
      });
    }
    Ok(())
  }
}

/// Query the actual CPU for its widest integer vector.
///
/// On x86_64 this asks the CPU directly. aarch64 NEON is mandatory and
/// fixed at 128 bits, so it reports the baseline, as does anything else.
fn introspect() -> u32 {
  #[cfg(target_arch = "x86_64")]
  {
    if std::arch::is_x86_feature_detected!("avx512f") {
      return 512;
    }
    if std::arch::is_x86_feature_detected!("avx2") {
      return 256;
    }
  }

  BASELINE_BITS
}

/// Map a simulated CPU feature list to an integer vector width.
///
/// Unknown features are skipped; an empty or unrecognized list yields the
/// baseline width.
fn width_from_features(features: &str) -> u32 {
  let mut width = BASELINE_BITS;
  for feature in features.split([',', ' ']).map(str::trim) {
    let bits = match feature {
      "avx512f" | "avx512" => 512,
      "avx2" => 256,
      // AVX widens floating-point only; integer ops stay at 128 bits
      // until AVX2.
      "sse2" | "sse3" | "ssse3" | "sse4.1" | "sse4.2" | "avx" | "neon" => 128,
      _ => continue,
    };
    width = width.max(bits);
  }
  width
}

/// The host cannot satisfy the required vector width.
///
/// Raised before any vector instruction executes. Fatal: callers are
/// expected to render a diagnostic and terminate with a non-zero status
/// rather than attempt the vectorized path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityGateError {
  /// Width the program requires, in bits.
  pub required_bits: u32,
  /// Widest integer vector the host reports, in bits.
  pub actual_bits: u32,
  /// Host architecture string.
  pub arch: &'static str,
}

impl Display for CapabilityGateError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} host supports at most {}-bit integer vectors, but {}-bit vectors are required",
      self.arch, self.actual_bits, self.required_bits
    )
  }
}

impl std::error::Error for CapabilityGateError {}
