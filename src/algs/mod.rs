//! Group communication, decomposition and wire layout.

pub mod communicator;
pub mod decomposition;
pub mod wire;
