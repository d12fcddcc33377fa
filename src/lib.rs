//! pic-e2e: statistical regression harness for a PiC plasma simulation.
//!
//! Builds and runs the simulation under test, compares aggregate statistics
//! of its output against reference baselines within tolerance, and retries
//! whole attempts to absorb run-to-run floating-point nondeterminism.

pub mod compare;
pub mod error;
pub mod process;
pub mod reader;
pub mod render;
pub mod scenario;
pub mod stats;
pub mod template;
pub mod types;
pub mod workspace;
