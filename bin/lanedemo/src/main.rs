//! Demonstrates capability-gated 256-bit integer vector execution.
//!
//! ```text,ignore
//! $ cargo run -p lanedemo --release
//! $ LANEGATE_CPU_FEATURES=sse4.1 cargo run -p lanedemo; echo $?
//! $ LANEGATE_MAX_VECTOR_BITS=128 cargo run -p lanedemo; echo $?
//! ```

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use lanegate::{Executor, GateReport, VectorCapability};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// Explicitly require 256-bit integer vectors (the AVX2 class).
const REQUIRED_WIDTH_BITS: u32 = 256;

#[derive(Parser)]
#[command(version)]
struct Args {
  /// Number of elements per input buffer
  #[arg(long, default_value_t = 1_000_000)]
  size: usize,

  /// Untimed warmup iterations
  #[arg(long, default_value_t = 100)]
  warmup: u32,

  /// Timed benchmark iterations
  #[arg(long, default_value_t = 1000)]
  rounds: u32,
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  if let Err(e) = try_main(Args::parse()) {
    tracing::error!("{e:#}");
    return ExitCode::FAILURE;
  }

  ExitCode::SUCCESS
}

fn try_main(args: Args) -> anyhow::Result<()> {
  println!("=== capability-gated vector execution ===");

  let capability = VectorCapability::detect(REQUIRED_WIDTH_BITS);
  println!("> host architecture: {}", capability.arch);
  println!("> preferred vector width: {}-bit", capability.preferred_bits);
  println!(
    "> required vector width: {}-bit ({} x i32 per op)",
    capability.required_bits,
    capability.lanes()
  );

  if let Err(e) = capability.ensure() {
    let report = GateReport::new(&e);
    eprintln!("{report}");
    report.log();
    return Err(e.into());
  }

  println!(
    "> {}-bit vector support confirmed",
    capability.required_bits
  );

  let executor = Executor::new(capability);

  let a: Vec<i32> = (0..args.size).map(|i| i as i32).collect();
  let b: Vec<i32> = a.iter().map(|v| v.wrapping_mul(2)).collect();
  let mut result = vec![0i32; args.size];

  println!(
    "> adding {} elements, {} rounds ({} warmup)",
    args.size, args.rounds, args.warmup
  );

  for _ in 0..args.warmup {
    run_add(&executor, &a, &b, &mut result)?;
  }

  let start = Instant::now();
  for _ in 0..args.rounds {
    run_add(&executor, &a, &b, &mut result)?;
  }
  let elapsed = start.elapsed();

  let checksum: i64 = result.iter().take(100).map(|&v| v as i64).sum();
  let expected: i64 = (0..100).map(|i| 3 * i).sum();

  println!("> done in {:.2} ms", elapsed.as_secs_f64() * 1000.0);
  println!("> checksum (first 100 elements): {checksum}");
  println!("> expected checksum: {expected}");

  // Compound transform over a few full lanes: min(x*x + 4*x, 1000).
  let mut data: Vec<i32> = (1..=(executor.capability().lanes() as i32 * 4)).collect();
  executor
    .transform(&mut data)
    .context("architecture mismatch")?;
  println!(
    "> compound transform sample: {}, {}, {}...",
    data[0], data[1], data[2]
  );

  Ok(())
}

fn run_add(executor: &Executor, a: &[i32], b: &[i32], out: &mut [i32]) -> anyhow::Result<()> {
  executor.add(a, b, out).context("architecture mismatch")
}
