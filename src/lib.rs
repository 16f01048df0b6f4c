#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

pub mod capability;
pub mod executor;
pub mod report;

#[cfg(feature = "simd")]
mod wide;

pub use capability::{CapabilityGateError, VectorCapability};
pub use executor::{ExecuteError, Executor};
pub use report::GateReport;
