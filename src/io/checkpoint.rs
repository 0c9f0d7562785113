//! Collective checkpoint/restart of the distributed field.
//!
//! File layout:
//!
//! ```text
//! offset 0      rows_full:i32  cols_full:i32  iteration:i32      (little-endian)
//! offset 12     rank 0 padded tile  ((local_rows+2) * (local_cols+2) f64)
//! ...           rank 1 padded tile
//! ...           ...
//! ```
//!
//! Every rank writes and reads its own block at
//! `HEADER_BYTES + rank * tile_bytes`. The formula assumes every block has the
//! same size, so both directions require a uniform row split. Writer and reader
//! share [`CheckpointLayout`] so their offsets cannot drift apart.

use crate::algs::communicator::{Communicator, FileMode, SharedFile};
use crate::algs::decomposition::{Decomposition, ParallelContext};
use crate::algs::wire::{
    CheckpointHeader, HEADER_BYTES, VALUE_BYTES, cast_slice_mut, f64s_from_le_in_place,
    f64s_to_le_bytes,
};
use crate::data::tile::{GHOST_WIDTH, Tile};
use crate::heat_error::HeatIoError;
use std::ops::Range;
use std::path::Path;

/// Byte layout of a checkpoint for one decomposition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CheckpointLayout {
    ranks: usize,
    tile_bytes: u64,
}

impl CheckpointLayout {
    /// Layout of `ranks` padded tiles of `local_rows × local_cols` interior cells.
    pub fn new(ranks: usize, local_rows: usize, local_cols: usize) -> Result<Self, HeatIoError> {
        let padded = |n: usize| (n as u64).checked_add(2 * GHOST_WIDTH as u64);
        let tile_bytes = padded(local_rows)
            .zip(padded(local_cols))
            .and_then(|(r, c)| r.checked_mul(c))
            .and_then(|cells| cells.checked_mul(VALUE_BYTES))
            .ok_or(HeatIoError::TileSizeOverflow {
                local_rows,
                local_cols,
            })?;
        let layout = Self { ranks, tile_bytes };
        layout.total_len()?;
        Ok(layout)
    }

    /// Layout for a uniform decomposition.
    pub fn for_decomposition(decomposition: &Decomposition) -> Result<Self, HeatIoError> {
        decomposition.require_uniform()?;
        Self::new(
            decomposition.size(),
            decomposition.local_rows(),
            decomposition.local_cols(),
        )
    }

    pub fn header_bytes(&self) -> u64 {
        HEADER_BYTES
    }

    pub fn tile_bytes(&self) -> u64 {
        self.tile_bytes
    }

    pub fn ranks(&self) -> usize {
        self.ranks
    }

    /// Byte offset of `rank`'s tile.
    pub fn offset(&self, rank: usize) -> Result<u64, HeatIoError> {
        (rank as u64)
            .checked_mul(self.tile_bytes)
            .and_then(|o| o.checked_add(HEADER_BYTES))
            .ok_or(HeatIoError::OffsetOverflow { rank })
    }

    /// Byte range occupied by `rank`'s tile.
    pub fn range(&self, rank: usize) -> Result<Range<u64>, HeatIoError> {
        if rank >= self.ranks {
            return Err(HeatIoError::InvalidDecomposition(format!(
                "rank {rank} outside a {}-rank checkpoint",
                self.ranks
            )));
        }
        let start = self.offset(rank)?;
        let end = start
            .checked_add(self.tile_bytes)
            .ok_or(HeatIoError::OffsetOverflow { rank })?;
        Ok(start..end)
    }

    /// Length of a complete checkpoint file.
    pub fn total_len(&self) -> Result<u64, HeatIoError> {
        self.offset(self.ranks)
    }
}

/// Collective progress through a checkpoint file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CheckpointPhase {
    Unopened,
    Open,
    HeaderDone,
    TileDone,
    Closed,
}

/// One rank's handle on a checkpoint being written or read.
///
/// Steps must run in the order `open → header → tile → close`; anything else
/// is a [`HeatIoError::PhaseViolation`]. Each step is collective.
pub struct CheckpointSession<'c, C: Communicator> {
    comm: &'c C,
    file: Option<SharedFile>,
    phase: CheckpointPhase,
}

impl<'c, C: Communicator> CheckpointSession<'c, C> {
    pub fn new(comm: &'c C) -> Self {
        Self {
            comm,
            file: None,
            phase: CheckpointPhase::Unopened,
        }
    }

    pub fn phase(&self) -> CheckpointPhase {
        self.phase
    }

    fn advance(
        &mut self,
        action: &'static str,
        from: CheckpointPhase,
        to: CheckpointPhase,
    ) -> Result<(), HeatIoError> {
        if self.phase != from {
            return Err(HeatIoError::PhaseViolation {
                action,
                phase: self.phase,
            });
        }
        log::debug!("rank {}: checkpoint {:?} -> {:?}", self.comm.rank(), from, to);
        self.phase = to;
        Ok(())
    }

    fn file(&mut self) -> Result<&mut SharedFile, HeatIoError> {
        let phase = self.phase;
        self.file.as_mut().ok_or(HeatIoError::PhaseViolation {
            action: "access file",
            phase,
        })
    }

    pub fn open(&mut self, path: &Path, mode: FileMode) -> Result<(), HeatIoError> {
        if self.phase != CheckpointPhase::Unopened {
            return Err(HeatIoError::PhaseViolation {
                action: "open",
                phase: self.phase,
            });
        }
        self.file = Some(self.comm.open_shared(path, mode)?);
        self.advance("open", CheckpointPhase::Unopened, CheckpointPhase::Open)
    }

    /// Rank 0 writes the header; everyone meets at a barrier afterwards.
    pub fn write_header(&mut self, header: &CheckpointHeader) -> Result<(), HeatIoError> {
        self.advance("write header", CheckpointPhase::Open, CheckpointPhase::HeaderDone)?;
        let comm = self.comm;
        if comm.rank() == 0 {
            comm.write_at(self.file()?, 0, header.as_bytes())?;
        }
        comm.barrier()
    }

    /// Every rank reads the same header.
    pub fn read_header(&mut self) -> Result<CheckpointHeader, HeatIoError> {
        self.advance("read header", CheckpointPhase::Open, CheckpointPhase::HeaderDone)?;
        let comm = self.comm;
        let mut header = CheckpointHeader::default();
        comm.read_at_all(self.file()?, 0, header.as_bytes_mut())?;
        Ok(header)
    }

    /// Length of the open file, identical on every rank.
    pub fn file_len(&mut self) -> Result<u64, HeatIoError> {
        self.file()?.len()
    }

    pub fn write_tile(&mut self, tile: &Tile, offset: u64) -> Result<(), HeatIoError> {
        self.advance("write tile", CheckpointPhase::HeaderDone, CheckpointPhase::TileDone)?;
        let comm = self.comm;
        let bytes = f64s_to_le_bytes(tile.as_slice());
        comm.write_at_all(self.file()?, offset, &bytes)
    }

    pub fn read_tile(&mut self, tile: &mut Tile, offset: u64) -> Result<(), HeatIoError> {
        self.advance("read tile", CheckpointPhase::HeaderDone, CheckpointPhase::TileDone)?;
        let comm = self.comm;
        comm.read_at_all(self.file()?, offset, cast_slice_mut(tile.as_mut_slice()))?;
        f64s_from_le_in_place(tile.as_mut_slice());
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), HeatIoError> {
        self.advance("close", CheckpointPhase::TileDone, CheckpointPhase::Closed)?;
        match self.file.take() {
            Some(file) => self.comm.close_shared(file),
            None => Ok(()),
        }
    }
}

/// State recovered by [`read_restart`].
#[derive(Clone, Debug)]
pub struct Restart {
    pub decomposition: Decomposition,
    pub tile: Tile,
    pub iteration: u32,
}

/// Collectively write `tile` (ghosts included) and the header to `path`.
///
/// Every rank must call this with the same decomposition; the layout check
/// runs identically everywhere before the file is touched.
pub fn write_restart<C: Communicator>(
    tile: &Tile,
    decomposition: &Decomposition,
    iteration: u32,
    path: impl AsRef<Path>,
    comm: &C,
) -> Result<(), HeatIoError> {
    let layout = CheckpointLayout::for_decomposition(decomposition)?;
    let header = CheckpointHeader::new(
        decomposition.rows_full(),
        decomposition.cols_full(),
        iteration,
    )?;
    let offset = layout.offset(decomposition.rank())?;
    if tile.rows() != decomposition.local_rows() || tile.cols() != decomposition.local_cols() {
        return comm.abort_on_error(Err(HeatIoError::InvalidDecomposition(format!(
            "tile is {}x{}, decomposition expects {}x{}",
            tile.rows(),
            tile.cols(),
            decomposition.local_rows(),
            decomposition.local_cols()
        ))));
    }

    let mut session = CheckpointSession::new(comm);
    session.open(path.as_ref(), FileMode::CreateWrite)?;
    session.write_header(&header)?;
    session.write_tile(tile, offset)?;
    session.close()?;

    if comm.rank() == 0 {
        log::info!(
            "checkpoint {} written at iteration {iteration} ({} bytes)",
            path.as_ref().display(),
            layout.total_len()?
        );
    }
    Ok(())
}

/// Collectively restore the state written by [`write_restart`].
///
/// The checkpoint must have been written by the same number of ranks; the file
/// length is checked against the layout for the current group before any tile
/// is read, and a mismatch is rejected on every rank.
pub fn read_restart<C: Communicator>(
    path: impl AsRef<Path>,
    ctx: &ParallelContext,
    comm: &C,
) -> Result<Restart, HeatIoError> {
    let mut session = CheckpointSession::new(comm);
    session.open(path.as_ref(), FileMode::ReadOnly)?;
    let header = session.read_header()?;

    let rows_full = header.rows_full()?;
    let cols_full = header.cols_full()?;
    let iteration = header.iteration()?;
    let file_len = session.file_len()?;
    if let Some(written) = written_rank_count(file_len, rows_full, cols_full) {
        if written != ctx.size() {
            return Err(HeatIoError::ProcessCountMismatch {
                written,
                current: ctx.size(),
            });
        }
    }

    let decomposition = ctx.decompose(rows_full, cols_full)?;
    let layout = CheckpointLayout::for_decomposition(&decomposition)?;
    let expected = layout.total_len()?;
    if file_len != expected {
        return Err(HeatIoError::CorruptCheckpoint(format!(
            "{} is {file_len} bytes, expected {expected} for {rows_full}x{cols_full} on {} ranks",
            path.as_ref().display(),
            ctx.size()
        )));
    }

    let mut tile = Tile::for_decomposition(&decomposition);
    session.read_tile(&mut tile, layout.offset(ctx.rank())?)?;
    session.close()?;

    log::debug!(
        "rank {}: restarted rows {:?} at iteration {iteration}",
        ctx.rank(),
        decomposition.row_range()
    );
    Ok(Restart {
        decomposition,
        tile,
        iteration,
    })
}

/// Recover the writer's rank count from the file length.
///
/// With `P` uniform tiles the payload is `(rows_full + 2P) * (cols_full + 2)`
/// values, so `P` follows directly.
fn written_rank_count(file_len: u64, rows_full: usize, cols_full: usize) -> Option<usize> {
    let payload = file_len.checked_sub(HEADER_BYTES)?;
    let row_bytes = (cols_full as u64 + 2) * VALUE_BYTES;
    if payload % row_bytes != 0 {
        return None;
    }
    let padded_rows = (payload / row_bytes).checked_sub(rows_full as u64)?;
    if padded_rows == 0 || padded_rows % 2 != 0 {
        return None;
    }
    let ranks = (padded_rows / 2) as usize;
    (rows_full % ranks == 0).then_some(ranks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn layout_offsets() {
        let layout = CheckpointLayout::new(4, 2, 3).unwrap();
        assert_eq!(layout.tile_bytes(), 4 * 5 * 8);
        assert_eq!(layout.offset(0).unwrap(), 12);
        assert_eq!(layout.offset(3).unwrap(), 12 + 3 * 160);
        assert_eq!(layout.total_len().unwrap(), 12 + 4 * 160);
        assert_eq!(layout.range(1).unwrap(), 172..332);
    }

    #[test]
    fn layout_offsets_are_64_bit() {
        // 70000 x 70000 tiles overflow 32-bit offsets already at rank 1.
        let layout = CheckpointLayout::new(8, 70_000, 70_000).unwrap();
        assert!(layout.offset(1).unwrap() > u64::from(u32::MAX));
        assert!(matches!(
            CheckpointLayout::new(2, usize::MAX, 4),
            Err(HeatIoError::TileSizeOverflow {
                local_rows: usize::MAX,
                local_cols: 4
            })
        ));
    }

    #[test]
    fn range_is_limited_to_written_ranks() {
        let layout = CheckpointLayout::new(2, 2, 3).unwrap();
        assert!(layout.range(1).is_ok());
        assert!(matches!(
            layout.range(2),
            Err(HeatIoError::InvalidDecomposition(_))
        ));
    }

    #[test]
    fn layout_rejects_uneven_split() {
        let d = ParallelContext::new(0, 3).unwrap().decompose(10, 4).unwrap();
        assert!(matches!(
            CheckpointLayout::for_decomposition(&d),
            Err(HeatIoError::NonUniformDecomposition { .. })
        ));
    }

    #[test]
    fn recovers_writer_rank_count() {
        for ranks in [1usize, 2, 4, 8] {
            let layout = CheckpointLayout::new(ranks, 16 / ranks, 5).unwrap();
            let len = layout.total_len().unwrap();
            assert_eq!(written_rank_count(len, 16, 5), Some(ranks));
        }
        assert_eq!(written_rank_count(13, 16, 5), None);
    }

    #[test]
    fn session_enforces_phase_order() {
        let mut session = CheckpointSession::new(&NoComm);
        let tile = Tile::allocate(1, 1);
        let err = session.write_tile(&tile, 12).unwrap_err();
        assert!(matches!(
            err,
            HeatIoError::PhaseViolation {
                action: "write tile",
                phase: CheckpointPhase::Unopened
            }
        ));
        assert!(session.close().is_err());
        assert_eq!(session.phase(), CheckpointPhase::Unopened);
    }
}
