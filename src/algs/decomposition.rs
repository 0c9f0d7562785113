//! Row-block domain decomposition.
//!
//! The global `rows_full × cols_full` grid is split into contiguous row blocks,
//! one per rank, assigned in increasing rank order. Columns are never split.
//! When `rows_full` is not a multiple of the group size the first
//! `rows_full % size` ranks own one extra row; operations that need a uniform
//! split call [`Decomposition::require_uniform`], which every rank evaluates
//! identically so nobody enters a collective alone.

use crate::algs::communicator::Communicator;
use crate::heat_error::HeatIoError;
use std::ops::Range;

/// Identity of this process within the group. Immutable for the run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParallelContext {
    rank: usize,
    size: usize,
}

impl ParallelContext {
    pub fn new(rank: usize, size: usize) -> Result<Self, HeatIoError> {
        if size == 0 || rank >= size {
            return Err(HeatIoError::InvalidDecomposition(format!(
                "rank {rank} is not part of a group of {size}"
            )));
        }
        Ok(Self { rank, size })
    }

    pub fn from_comm<C: Communicator>(comm: &C) -> Result<Self, HeatIoError> {
        Self::new(comm.rank(), comm.size())
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// Split a `rows_full × cols_full` grid across the group.
    pub fn decompose(
        &self,
        rows_full: usize,
        cols_full: usize,
    ) -> Result<Decomposition, HeatIoError> {
        if cols_full == 0 {
            return Err(HeatIoError::InvalidDecomposition(
                "grid must have at least one column".into(),
            ));
        }
        if rows_full < self.size {
            return Err(HeatIoError::InvalidDecomposition(format!(
                "cannot split {rows_full} rows across {} ranks",
                self.size
            )));
        }
        let decomposition = Decomposition {
            ctx: *self,
            rows_full,
            cols_full,
        };
        log::debug!(
            "rank {}: rows {:?} of {rows_full}x{cols_full}",
            self.rank,
            decomposition.row_range()
        );
        Ok(decomposition)
    }
}

/// Row assignment of one grid over one group, as seen from one rank.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Decomposition {
    ctx: ParallelContext,
    rows_full: usize,
    cols_full: usize,
}

impl Decomposition {
    pub fn rank(&self) -> usize {
        self.ctx.rank
    }

    pub fn size(&self) -> usize {
        self.ctx.size
    }

    pub fn rows_full(&self) -> usize {
        self.rows_full
    }

    pub fn cols_full(&self) -> usize {
        self.cols_full
    }

    /// Rows owned by `rank`.
    pub fn rows_of(&self, rank: usize) -> usize {
        let base = self.rows_full / self.ctx.size;
        base + usize::from(rank < self.rows_full % self.ctx.size)
    }

    /// First global row owned by `rank`.
    pub fn row_start_of(&self, rank: usize) -> usize {
        let base = self.rows_full / self.ctx.size;
        rank * base + rank.min(self.rows_full % self.ctx.size)
    }

    pub fn local_rows(&self) -> usize {
        self.rows_of(self.ctx.rank)
    }

    pub fn local_cols(&self) -> usize {
        self.cols_full
    }

    /// Global rows owned by this rank.
    pub fn row_range(&self) -> Range<usize> {
        let start = self.row_start_of(self.ctx.rank);
        start..start + self.local_rows()
    }

    pub fn is_uniform(&self) -> bool {
        self.rows_full % self.ctx.size == 0
    }

    pub fn require_uniform(&self) -> Result<(), HeatIoError> {
        if self.is_uniform() {
            Ok(())
        } else {
            Err(HeatIoError::NonUniformDecomposition {
                rows_full: self.rows_full,
                size: self.ctx.size,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_split() {
        let d = ParallelContext::new(2, 4).unwrap().decompose(16, 5).unwrap();
        assert!(d.is_uniform());
        assert_eq!(d.local_rows(), 4);
        assert_eq!(d.local_cols(), 5);
        assert_eq!(d.row_range(), 8..12);
    }

    #[test]
    fn remainder_rows_go_to_low_ranks() {
        let ctx = ParallelContext::new(0, 3).unwrap();
        let d = ctx.decompose(11, 2).unwrap();
        let rows: Vec<_> = (0..3).map(|r| d.rows_of(r)).collect();
        assert_eq!(rows, vec![4, 4, 3]);
        let starts: Vec<_> = (0..3).map(|r| d.row_start_of(r)).collect();
        assert_eq!(starts, vec![0, 4, 8]);
        assert_eq!(rows.iter().sum::<usize>(), 11);
        assert!(matches!(
            d.require_uniform(),
            Err(HeatIoError::NonUniformDecomposition {
                rows_full: 11,
                size: 3
            })
        ));
    }

    #[test]
    fn every_rank_owns_a_row() {
        let ctx = ParallelContext::new(0, 4).unwrap();
        assert!(ctx.decompose(3, 8).is_err());
        assert!(ctx.decompose(4, 0).is_err());
        assert!(ParallelContext::new(4, 4).is_err());
    }
}
