#![cfg_attr(docsrs, feature(doc_cfg))]
//! # heat-restart
//!
//! Parallel field I/O and collective checkpoint/restart for 2D finite-difference
//! solvers whose grid is split into contiguous row blocks, one per process.
//!
//! ## Features
//! - Padded [`Tile`](data::tile::Tile) storage with zero-gradient ghost filling
//! - Rank-ordered gather of interior tiles for visualization snapshots
//! - Text initial-condition loading on rank 0 with a scatter to every rank
//! - One shared binary checkpoint file written and read collectively, each rank
//!   owning a disjoint byte range
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Error policy
//!
//! Failures detected on one rank that would leave its peers waiting in a
//! collective abort the whole group through
//! [`Communicator::abort`](algs::communicator::Communicator::abort). Failures
//! every rank detects identically (bad decomposition, mismatched restart) are
//! returned as plain errors on every rank.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! heat-restart = "0.1"
//! # features = ["mpi-support"]
//! ```

pub mod algs;
pub mod config;
pub mod data;
pub mod heat_error;
pub mod io;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::decomposition::{Decomposition, ParallelContext};
    pub use crate::config::IoConfig;
    pub use crate::data::field::{FieldPair, GlobalField};
    pub use crate::data::tile::Tile;
    pub use crate::heat_error::HeatIoError;
    pub use crate::io::{
        ImageEncoder, read_field, read_restart, start_run, write_field, write_restart,
    };
}
