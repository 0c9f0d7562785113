//! Visualization snapshots: gather interior tiles on rank 0 and encode them.
//!
//! Rank 0 receives one message per peer in strictly increasing rank order.
//! Because the decomposition hands out row blocks in rank order, that order
//! alone places every block; messages carry no rank metadata.

use crate::algs::communicator::{Communicator, FIELD_TAG, Wait};
use crate::algs::decomposition::Decomposition;
use crate::algs::wire::{cast_slice, cast_slice_mut, expect_exact_len};
use crate::config::IoConfig;
use crate::data::field::GlobalField;
use crate::data::tile::Tile;
use crate::heat_error::HeatIoError;
use std::path::{Path, PathBuf};

/// Renders an assembled global field to an image file.
pub trait ImageEncoder {
    /// `buffer` holds `height × width` values in row-major order.
    fn encode(
        &self,
        buffer: &[f64],
        height: usize,
        width: usize,
        path: &Path,
    ) -> Result<(), HeatIoError>;
}

/// `<prefix>_<iteration, 4-digit zero-padded>.png`
pub fn snapshot_name(prefix: &str, iteration: u32) -> String {
    format!("{prefix}_{iteration:04}.png")
}

/// Collect every rank's interior onto rank 0.
///
/// Returns `Some` on rank 0 and `None` on every other rank.
pub fn gather_field<C: Communicator>(
    tile: &Tile,
    decomposition: &Decomposition,
    comm: &C,
) -> Result<Option<GlobalField>, HeatIoError> {
    comm.abort_on_error(check_tile_shape(tile, decomposition))?;
    let interior = tile.interior_to_vec();
    let cols = decomposition.cols_full();

    if comm.rank() != 0 {
        comm.isend(0, FIELD_TAG.as_u16(), cast_slice(&interior)).wait();
        return Ok(None);
    }

    let mut global = GlobalField::zeros(decomposition.rows_full(), cols);
    global
        .rows_mut(0, decomposition.local_rows())
        .copy_from_slice(&interior);

    for peer in 1..comm.size() {
        let rows = decomposition.rows_of(peer);
        let block = global.rows_mut(decomposition.row_start_of(peer), rows);
        let received = receive_block(comm, peer, block);
        comm.abort_on_error(received)?;
    }
    Ok(Some(global))
}

fn receive_block<C: Communicator>(
    comm: &C,
    peer: usize,
    block: &mut [f64],
) -> Result<(), HeatIoError> {
    let dst = cast_slice_mut(block);
    let payload = comm.recv_payload(peer, FIELD_TAG.as_u16())?;
    expect_exact_len(payload.len(), dst.len()).map_err(|msg| HeatIoError::CommError {
        neighbor: peer,
        source: msg.into(),
    })?;
    dst.copy_from_slice(&payload);
    Ok(())
}

fn check_tile_shape(tile: &Tile, decomposition: &Decomposition) -> Result<(), HeatIoError> {
    if tile.rows() != decomposition.local_rows() || tile.cols() != decomposition.local_cols() {
        return Err(HeatIoError::InvalidDecomposition(format!(
            "tile is {}x{}, decomposition expects {}x{}",
            tile.rows(),
            tile.cols(),
            decomposition.local_rows(),
            decomposition.local_cols()
        )));
    }
    Ok(())
}

/// Gather the field and, on rank 0, encode it as the snapshot for `iteration`.
///
/// Returns the written path on rank 0 and `None` elsewhere.
pub fn write_field<C, E>(
    tile: &Tile,
    iteration: u32,
    decomposition: &Decomposition,
    config: &IoConfig,
    encoder: &E,
    comm: &C,
) -> Result<Option<PathBuf>, HeatIoError>
where
    C: Communicator,
    E: ImageEncoder,
{
    let Some(global) = gather_field(tile, decomposition, comm)? else {
        return Ok(None);
    };
    let path = config.snapshot_path(iteration);
    let encoded = encoder.encode(global.as_slice(), global.rows(), global.cols(), &path);
    comm.abort_on_error(encoded)?;
    log::info!(
        "snapshot {} ({}x{}) written",
        path.display(),
        global.rows(),
        global.cols()
    );
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::decomposition::ParallelContext;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(Vec<f64>, usize, usize, PathBuf)>>,
    }

    impl ImageEncoder for Recorder {
        fn encode(
            &self,
            buffer: &[f64],
            height: usize,
            width: usize,
            path: &Path,
        ) -> Result<(), HeatIoError> {
            self.calls
                .borrow_mut()
                .push((buffer.to_vec(), height, width, path.to_path_buf()));
            Ok(())
        }
    }

    #[test]
    fn name_is_zero_padded() {
        assert_eq!(snapshot_name("heat", 0), "heat_0000.png");
        assert_eq!(snapshot_name("heat", 42), "heat_0042.png");
        assert_eq!(snapshot_name("heat", 12345), "heat_12345.png");
    }

    #[test]
    fn single_rank_snapshot_excludes_ghosts() {
        let d = ParallelContext::new(0, 1).unwrap().decompose(2, 2).unwrap();
        let mut tile = Tile::for_decomposition(&d);
        tile.copy_interior_from(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        tile.fill_ghosts_zero_gradient();

        let enc = Recorder::default();
        let cfg = IoConfig::default();
        let path = write_field(&tile, 5, &d, &cfg, &enc, &NoComm).unwrap();
        assert_eq!(path, Some(PathBuf::from(".").join("heat_0005.png")));

        let calls = enc.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!((calls[0].1, calls[0].2), (2, 2));
    }

    #[test]
    fn mismatched_tile_is_rejected() {
        let d = ParallelContext::new(0, 1).unwrap().decompose(3, 2).unwrap();
        let tile = Tile::allocate(2, 2);
        assert!(gather_field(&tile, &d, &NoComm).is_err());
    }
}
