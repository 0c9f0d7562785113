//! Field I/O for row-decomposed runs.
//!
//! - [`snapshot`]: gather interior tiles on rank 0 for visualization.
//! - [`initial`]: parse a text initial condition on rank 0 and scatter it.
//! - [`checkpoint`]: collective binary checkpoint write and restart.
//! - [`startup`]: choose between restart and initial load.

pub mod checkpoint;
pub mod initial;
pub mod snapshot;
pub mod startup;

pub use checkpoint::{CheckpointLayout, CheckpointPhase, Restart, read_restart, write_restart};
pub use initial::{LoadedField, parse_initial_condition, read_field};
pub use snapshot::{ImageEncoder, gather_field, snapshot_name, write_field};
pub use startup::{RunStart, StartSource, start_run};
