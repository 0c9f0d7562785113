#![allow(dead_code)]
use heat_restart::algs::communicator::ThreadComm;
use heat_restart::data::tile::Tile;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_FILE: AtomicUsize = AtomicUsize::new(0);

/// Fresh path under the system temp dir, unique per process and call.
pub fn temp_path(name: &str) -> PathBuf {
    let n = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "heat-restart-{}-{n}-{name}",
        std::process::id()
    ))
}

/// Run `f` once per rank of a fresh `size`-rank group, one thread each.
/// Results come back indexed by rank.
pub fn run_group<R, F>(size: usize, f: F) -> Vec<R>
where
    F: Fn(ThreadComm) -> R + Sync,
    R: Send,
{
    run_ranks(ThreadComm::group(size), f)
}

/// Like [`run_group`] for handles the caller already holds clones of.
pub fn run_ranks<R, F>(comms: Vec<ThreadComm>, f: F) -> Vec<R>
where
    F: Fn(ThreadComm) -> R + Sync,
    R: Send,
{
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Tile whose every cell (ghosts included) holds a seeded random value.
pub fn random_tile(rows: usize, cols: usize, seed: u64) -> Tile {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut tile = Tile::allocate(rows, cols);
    for v in tile.as_mut_slice() {
        *v = rng.gen_range(-1.0e3..1.0e3);
    }
    tile
}

/// Write an initial-condition text file.
pub fn write_initial(rows: usize, cols: usize, values: &[f64]) -> PathBuf {
    let path = temp_path("initial.dat");
    let mut text = format!("# {rows} {cols}\n");
    for row in values.chunks(cols) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&line.join(" "));
        text.push('\n');
    }
    std::fs::write(&path, text).expect("write initial condition");
    path
}

/// Value stored at global cell (row, col) in test fields.
pub fn cell_value(row: usize, col: usize) -> f64 {
    (row * 100 + col) as f64 + 0.25
}
