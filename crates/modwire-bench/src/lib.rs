#![deny(clippy::all)]
#![warn(clippy::pedantic)]

//! Benchmark harness for modwire.
//!
//! Run benchmarks with: `cargo bench -p modwire-bench`
