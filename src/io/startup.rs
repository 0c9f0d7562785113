//! Run start: resume from a checkpoint when one exists, otherwise load the
//! initial condition.

use crate::algs::communicator::Communicator;
use crate::algs::decomposition::{Decomposition, ParallelContext};
use crate::config::IoConfig;
use crate::data::field::FieldPair;
use crate::heat_error::HeatIoError;
use crate::io::checkpoint::read_restart;
use crate::io::initial::read_field;

/// Where a run starts from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StartSource {
    Checkpoint,
    InitialCondition,
}

/// Fields and bookkeeping needed to enter the timestep loop.
#[derive(Clone, Debug)]
pub struct RunStart {
    pub decomposition: Decomposition,
    pub fields: FieldPair,
    /// First iteration to run; the stored iteration when resuming.
    pub iteration: u32,
    pub source: StartSource,
}

/// Resume from `config.checkpoint_path` or load `config.initial_condition`.
///
/// Rank 0 decides whether the checkpoint exists and broadcasts the decision,
/// so every rank takes the same branch even without a shared view of the
/// filesystem metadata.
pub fn start_run<C: Communicator>(
    config: &IoConfig,
    ctx: &ParallelContext,
    comm: &C,
) -> Result<RunStart, HeatIoError> {
    let mut resume = [u64::from(ctx.is_root() && config.checkpoint_path.is_file())];
    comm.broadcast_u64(0, &mut resume)?;

    if resume[0] == 1 {
        let restart = read_restart(&config.checkpoint_path, ctx, comm)?;
        if ctx.is_root() {
            log::info!(
                "resuming from {} at iteration {}",
                config.checkpoint_path.display(),
                restart.iteration
            );
        }
        return Ok(RunStart {
            decomposition: restart.decomposition,
            fields: FieldPair::duplicated(restart.tile),
            iteration: restart.iteration,
            source: StartSource::Checkpoint,
        });
    }

    let path = config.initial_condition.as_ref().ok_or_else(|| {
        HeatIoError::Config("no checkpoint found and no initial condition configured".into())
    })?;
    let loaded = read_field(path, ctx, comm)?;
    Ok(RunStart {
        decomposition: loaded.decomposition,
        fields: loaded.fields,
        iteration: 0,
        source: StartSource::InitialCondition,
    })
}
