//! Owned field storage: padded tiles, global fields and double buffers.

pub mod field;
pub mod tile;
