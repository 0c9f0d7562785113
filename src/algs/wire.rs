//! Fixed, little-endian wire and disk types for field transfers and checkpoints.

use crate::heat_error::HeatIoError;
use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Size in bytes of one stored field value.
pub const VALUE_BYTES: u64 = size_of::<f64>() as u64;

/// Size in bytes of the checkpoint header.
pub const HEADER_BYTES: u64 = size_of::<CheckpointHeader>() as u64;

/// All fields are stored pre-LE with `.to_le()` and decoded with `.from_le()`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CheckpointHeader {
    pub rows_full_le: i32,
    pub cols_full_le: i32,
    pub iteration_le: i32,
}

impl CheckpointHeader {
    pub fn new(rows_full: usize, cols_full: usize, iteration: u32) -> Result<Self, HeatIoError> {
        Ok(Self {
            rows_full_le: to_header_field("rows_full", rows_full as u64)?.to_le(),
            cols_full_le: to_header_field("cols_full", cols_full as u64)?.to_le(),
            iteration_le: to_header_field("iteration", u64::from(iteration))?.to_le(),
        })
    }

    pub fn rows_full(&self) -> Result<usize, HeatIoError> {
        from_header_field("rows_full", self.rows_full_le).map(|v| v as usize)
    }

    pub fn cols_full(&self) -> Result<usize, HeatIoError> {
        from_header_field("cols_full", self.cols_full_le).map(|v| v as usize)
    }

    pub fn iteration(&self) -> Result<u32, HeatIoError> {
        from_header_field("iteration", self.iteration_le)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(self)
    }
}

fn to_header_field(field: &'static str, value: u64) -> Result<i32, HeatIoError> {
    i32::try_from(value).map_err(|_| HeatIoError::HeaderOverflow { field, value })
}

fn from_header_field(field: &'static str, stored_le: i32) -> Result<u32, HeatIoError> {
    let value = i32::from_le(stored_le);
    u32::try_from(value).map_err(|_| {
        HeatIoError::CorruptCheckpoint(format!("negative `{field}` in header: {value}"))
    })
}

/// View `values` as little-endian bytes (borrowed on little-endian targets).
pub fn f64s_to_le_bytes(values: &[f64]) -> Cow<'_, [u8]> {
    if cfg!(target_endian = "little") {
        Cow::Borrowed(cast_slice(values))
    } else {
        Cow::Owned(values.iter().flat_map(|v| v.to_le_bytes()).collect())
    }
}

/// Reinterpret little-endian bytes already copied into `values` in place.
pub fn f64s_from_le_in_place(values: &mut [f64]) {
    if cfg!(target_endian = "big") {
        for v in values.iter_mut() {
            *v = f64::from_bits(u64::from_le(v.to_bits()));
        }
    }
}
