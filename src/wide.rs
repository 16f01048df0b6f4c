//! Arch-specific vector kernels.
//!
//! Kernels are compiled whenever the target architecture can express them
//! and selected at runtime, after feature detection. Hosts without a
//! matching kernel use the portable lane loop in [`crate::executor`].

cfg_if::cfg_if! {
  if #[cfg(target_arch = "x86_64")] {
    pub(crate) mod x86_64;
  }
}
