//! Rendering of capability failures for humans and for the log sink.

use crate::capability::CapabilityGateError;
use std::fmt::Display;

/// Diagnostic report for a failed capability gate.
///
/// [`Display`] renders the human-readable block callers print to stderr
/// before terminating; [`GateReport::log`] emits the same failure as a
/// structured event for the log sink.
pub struct GateReport<'a> {
  error: &'a CapabilityGateError,
}

impl<'a> GateReport<'a> {
  pub fn new(error: &'a CapabilityGateError) -> Self {
    Self { error }
  }

  /// Emit the failure as a structured log event.
  pub fn log(&self) {
    error!(
      required_bits = self.error.required_bits,
      actual_bits = self.error.actual_bits,
      arch = self.error.arch,
      "vector capability gate failed"
    );
  }
}

impl Display for GateReport<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let e = self.error;
    writeln!(
      f,
      "FAILURE: this program requires {}-bit integer vector instructions",
      e.required_bits
    )?;
    writeln!(f, "  required:  {}-bit vectors", e.required_bits)?;
    writeln!(f, "  available: {}-bit vectors", e.actual_bits)?;
    writeln!(f, "  host:      {}", e.arch)?;
    writeln!(f)?;
    writeln!(f, "hardware that typically reports this:")?;
    writeln!(f, "  - Intel CPUs before Haswell (2013)")?;
    writeln!(f, "  - AMD CPUs before Excavator (2015)")?;
    write!(
      f,
      "  - cloud or embedded instances exposing a reduced feature set"
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn report_rendering() {
    let error = CapabilityGateError {
      required_bits: 256,
      actual_bits: 128,
      arch: "x86_64",
    };

    insta::assert_snapshot!(GateReport::new(&error).to_string(), @r"
    FAILURE: this program requires 256-bit integer vector instructions
      required:  256-bit vectors
      available: 128-bit vectors
      host:      x86_64

    hardware that typically reports this:
      - Intel CPUs before Haswell (2013)
      - AMD CPUs before Excavator (2015)
      - cloud or embedded instances exposing a reduced feature set
    ");
  }
}
