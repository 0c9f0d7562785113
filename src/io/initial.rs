//! Initial-condition loading: rank 0 parses a text field and scatters it.
//!
//! File format: a header line `# <rows> <cols>` followed by `rows * cols`
//! whitespace-separated values in row-major order. Only rank 0 touches the
//! file; the other ranks learn the dimensions through a broadcast.

use crate::algs::communicator::Communicator;
use crate::algs::decomposition::{Decomposition, ParallelContext};
use crate::data::field::{FieldPair, GlobalField};
use crate::data::tile::Tile;
use crate::heat_error::HeatIoError;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Result of loading an initial condition on one rank.
#[derive(Clone, Debug)]
pub struct LoadedField {
    pub decomposition: Decomposition,
    pub fields: FieldPair,
}

/// Parse the `# <rows> <cols>` header line.
pub fn parse_header(line: &str) -> Result<(usize, usize), HeatIoError> {
    let malformed = || {
        HeatIoError::MalformedInput(format!(
            "expected header `# <rows> <cols>`, got `{}`",
            line.trim_end()
        ))
    };
    let rest = line.trim_start().strip_prefix('#').ok_or_else(malformed)?;
    let mut dims = rest.split_whitespace().map(str::parse::<usize>);
    match (dims.next(), dims.next()) {
        (Some(Ok(rows)), Some(Ok(cols))) => Ok((rows, cols)),
        _ => Err(malformed()),
    }
}

/// Parse a whole initial-condition file.
pub fn parse_initial_condition<R: Read>(reader: R) -> Result<GlobalField, HeatIoError> {
    let mut reader = BufReader::new(reader);
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let (rows, cols) = parse_header(&header)?;

    let mut body = String::new();
    reader.read_to_string(&mut body)?;
    let expected = rows.checked_mul(cols).ok_or_else(|| {
        HeatIoError::MalformedInput(format!("header dimensions {rows}x{cols} overflow"))
    })?;
    // Each value takes at least one digit and one separator.
    let mut values = Vec::with_capacity(expected.min(body.len() / 2 + 1));
    let mut tokens = body.split_whitespace();
    for token in tokens.by_ref().take(expected) {
        let value = token.parse::<f64>().map_err(|_| {
            HeatIoError::MalformedInput(format!(
                "value #{} `{token}` is not a number",
                values.len()
            ))
        })?;
        values.push(value);
    }
    if values.len() < expected {
        return Err(HeatIoError::MalformedInput(format!(
            "header announces {rows}x{cols} values, file holds {}",
            values.len()
        )));
    }
    let surplus = tokens.count();
    if surplus > 0 {
        log::warn!("ignoring {surplus} tokens after the {rows}x{cols} field");
    }
    GlobalField::from_vec(rows, cols, values)
        .ok_or_else(|| HeatIoError::MalformedInput("field size mismatch".into()))
}

fn load_on_root(path: &Path) -> Result<GlobalField, HeatIoError> {
    let file = File::open(path).map_err(|source| HeatIoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_initial_condition(file)
}

/// Load `path` on rank 0 and distribute equal row blocks to every rank.
///
/// A parse or open failure on rank 0 aborts the whole group before any
/// collective is issued. Every rank gets its block with zero-gradient ghosts,
/// duplicated into the current and next buffers.
pub fn read_field<C: Communicator>(
    path: impl AsRef<Path>,
    ctx: &ParallelContext,
    comm: &C,
) -> Result<LoadedField, HeatIoError> {
    let global = if ctx.is_root() {
        Some(comm.abort_on_error(load_on_root(path.as_ref()))?)
    } else {
        None
    };

    let mut dims = match &global {
        Some(field) => [field.rows() as u64, field.cols() as u64],
        None => [0; 2],
    };
    comm.broadcast_u64(0, &mut dims)?;

    let decomposition = ctx.decompose(dims[0] as usize, dims[1] as usize)?;
    decomposition.require_uniform()?;

    let mut inner = vec![0.0; decomposition.local_rows() * decomposition.local_cols()];
    comm.scatter_f64(0, global.as_ref().map(GlobalField::as_slice), &mut inner)?;

    let mut tile = Tile::for_decomposition(&decomposition);
    tile.copy_interior_from(&inner)?;
    tile.fill_ghosts_zero_gradient();
    log::debug!(
        "rank {}: loaded rows {:?} of initial field",
        ctx.rank(),
        decomposition.row_range()
    );

    Ok(LoadedField {
        decomposition,
        fields: FieldPair::duplicated(tile),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn header_needs_two_integers() {
        assert_eq!(parse_header("# 4 5\n").unwrap(), (4, 5));
        assert_eq!(parse_header("#4 5").unwrap(), (4, 5));
        assert!(matches!(
            parse_header("# 3\n"),
            Err(HeatIoError::MalformedInput(_))
        ));
        assert!(parse_header("4 5").is_err());
        assert!(parse_header("# a b").is_err());
    }

    #[test]
    fn parses_values_across_lines() {
        let text = "# 2 3\n1 2 3\n4.5\n5 6\n";
        let f = parse_initial_condition(text.as_bytes()).unwrap();
        assert_eq!((f.rows(), f.cols()), (2, 3));
        assert_eq!(f.as_slice(), &[1.0, 2.0, 3.0, 4.5, 5.0, 6.0]);
    }

    #[test]
    fn short_body_is_malformed() {
        let text = "# 2 2\n1 2 3\n";
        assert!(matches!(
            parse_initial_condition(text.as_bytes()),
            Err(HeatIoError::MalformedInput(_))
        ));
    }

    #[test]
    fn oversized_header_is_malformed() {
        let huge = "# 3000000000 3000000000\n1 2 3\n";
        assert!(matches!(
            parse_initial_condition(huge.as_bytes()),
            Err(HeatIoError::MalformedInput(_))
        ));
        let overflowing = format!("# {} 2\n1 2\n", usize::MAX);
        assert!(matches!(
            parse_initial_condition(overflowing.as_bytes()),
            Err(HeatIoError::MalformedInput(_))
        ));
    }

    #[test]
    fn surplus_tokens_are_ignored() {
        let text = "# 1 2\n1 2 3 4\n";
        let f = parse_initial_condition(text.as_bytes()).unwrap();
        assert_eq!(f.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn missing_file_is_open_error() {
        let ctx = ParallelContext::new(0, 1).unwrap();
        let err = read_field("/nonexistent/heat/initial.dat", &ctx, &NoComm).unwrap_err();
        assert!(matches!(err, HeatIoError::Open { .. }));
    }
}
