mod util;

use heat_restart::algs::decomposition::ParallelContext;
use heat_restart::data::tile::Tile;
use heat_restart::heat_error::HeatIoError;
use heat_restart::io::read_field;
use util::{cell_value, run_group, temp_path, write_initial};

fn assert_zero_gradient(tile: &Tile) {
    let (pr, pc) = (tile.padded_rows(), tile.padded_cols());
    for c in 0..pc {
        assert_eq!(tile[(0, c)], tile[(1, c)], "top ghost col {c}");
        assert_eq!(tile[(pr - 1, c)], tile[(pr - 2, c)], "bottom ghost col {c}");
    }
    for r in 0..pr {
        assert_eq!(tile[(r, 0)], tile[(r, 1)], "left ghost row {r}");
        assert_eq!(tile[(r, pc - 1)], tile[(r, pc - 2)], "right ghost row {r}");
    }
    // Corners carry the diagonal interior value.
    assert_eq!(tile[(0, 0)], tile[(1, 1)]);
    assert_eq!(tile[(pr - 1, pc - 1)], tile[(pr - 2, pc - 2)]);
}

#[test]
fn blocks_are_scattered_with_mirrored_ghosts() {
    let (rows, cols) = (6, 4);
    let values: Vec<f64> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| cell_value(r, c)))
        .collect();
    let path = write_initial(rows, cols, &values);

    let loaded = run_group(3, |comm| {
        let ctx = ParallelContext::from_comm(&comm).unwrap();
        read_field(&path, &ctx, &comm).unwrap()
    });

    for (rank, field) in loaded.iter().enumerate() {
        let d = &field.decomposition;
        assert_eq!((d.rows_full(), d.cols_full()), (rows, cols));
        assert_eq!(d.local_rows(), 2);
        assert_eq!(field.fields.current, field.fields.next);

        let tile = &field.fields.current;
        for i in 0..2 {
            let global_row = rank * 2 + i;
            let expected: Vec<f64> = (0..cols).map(|c| cell_value(global_row, c)).collect();
            assert_eq!(tile.interior_row(i), expected.as_slice());
        }
        assert_zero_gradient(tile);
    }
    std::fs::remove_file(&path).ok();
}

#[test]
fn single_integer_header_aborts_before_any_collective() {
    let path = temp_path("bad-header.dat");
    std::fs::write(&path, "# 3\n1 2 3\n").unwrap();

    let outcomes = run_group(2, |comm| {
        let ctx = ParallelContext::from_comm(&comm).unwrap();
        let res = read_field(&path, &ctx, &comm).map(|_| ());
        (res, comm.collectives_issued())
    });

    let (root_res, root_collectives) = &outcomes[0];
    assert!(matches!(root_res, Err(HeatIoError::MalformedInput(_))));
    assert_eq!(*root_collectives, 0);
    assert!(matches!(
        outcomes[1].0,
        Err(HeatIoError::GroupAborted { code: -1 })
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn huge_header_aborts_group_instead_of_allocating() {
    let path = temp_path("huge-header.dat");
    std::fs::write(&path, "# 3000000000 3000000000\n1 2 3\n").unwrap();

    let outcomes = run_group(2, |comm| {
        let ctx = ParallelContext::from_comm(&comm).unwrap();
        read_field(&path, &ctx, &comm).map(|_| ())
    });
    assert!(matches!(outcomes[0], Err(HeatIoError::MalformedInput(_))));
    assert!(matches!(
        outcomes[1],
        Err(HeatIoError::GroupAborted { code: -1 })
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn missing_file_aborts_group() {
    let path = temp_path("does-not-exist.dat");
    let outcomes = run_group(2, |comm| {
        let ctx = ParallelContext::from_comm(&comm).unwrap();
        read_field(&path, &ctx, &comm).map(|_| ())
    });
    assert!(matches!(outcomes[0], Err(HeatIoError::Open { .. })));
    assert!(matches!(
        outcomes[1],
        Err(HeatIoError::GroupAborted { code: -2 })
    ));
}

#[test]
fn uneven_split_is_rejected_on_every_rank() {
    let path = write_initial(5, 2, &[0.0; 10]);
    let outcomes = run_group(2, |comm| {
        let ctx = ParallelContext::from_comm(&comm).unwrap();
        read_field(&path, &ctx, &comm).map(|_| ())
    });
    for res in outcomes {
        assert!(matches!(
            res,
            Err(HeatIoError::NonUniformDecomposition {
                rows_full: 5,
                size: 2
            })
        ));
    }
    std::fs::remove_file(&path).ok();
}
