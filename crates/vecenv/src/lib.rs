#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! # Vectorized environment pool
//!
//! A [`Pool`] owns `N` instances of one [`EnvFamily`] and drives them with a
//! two-phase protocol: [`Pool::step_async`] hands one action to every
//! instance and returns at once, [`Pool::step_wait`] blocks until all `N`
//! instances have finished and assembles their results into the pool's
//! [`StepBatch`], in instance order.
//!
//! ```rust,ignore
//! let mut pool = Pool::<Echo>::make(4, &Options::new())?;
//! pool.reset()?;
//! pool.step_async(&ActionBatch::new(actions))?;
//! let batch = pool.step_wait()?;
//! assert_eq!(batch.rewards().len(), 4);
//! pool.close()?;
//! ```
//!
//! Instances run on a bounded worker pool that lives as long as the
//! [`Pool`]. A failing or panicking instance is reported in-band through
//! [`StepBatch::failure`]; the rest of the batch is unaffected.

use space::{SpaceError, SpaceKind};
use thiserror::Error;

pub mod batch;
pub mod env;
pub mod options;
pub mod pool;
mod scheduler;

pub use batch::{ActionBatch, StepBatch, StepBuffers, StepOutput};
pub use env::{EnvFamily, Environment, Transition};
pub use options::{OptionValue, Options, OptionsError, OptionsReader};
pub use pool::Pool;

/// Errors raised by an environment family or one of its instances.
#[derive(Error, Debug)]
pub enum EnvError {
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error("no {kind} space at index {index}")]
    NoSuchSpace { kind: SpaceKind, index: usize },
    #[error("{0} is not supported by this environment")]
    Unsupported(&'static str),
    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("a pool needs at least one instance")]
    NoInstances,
    #[error("invalid options: {0}")]
    Options(#[from] OptionsError),
    #[error("invalid space: {0}")]
    Space(#[from] SpaceError),
    #[error("environment family rejected its configuration: {0}")]
    Configure(#[source] EnvError),
    #[error("instance {index} failed to construct: {source}")]
    Instance { index: usize, source: EnvError },
    #[error("failed to start workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),
    #[error("a step is already in flight")]
    AlreadyStepping,
    #[error("no step is in flight")]
    NotStepping,
    #[error("pool closed with a step in flight")]
    ClosedWhileStepping,
    #[error("{what}: expected {expected}, got {actual}")]
    Layout {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("no render space named `{0}`")]
    UnknownRenderMode(String),
    #[error("instance {index} failed to render: {source}")]
    Render { index: usize, source: EnvError },
    #[error("a worker dropped its instance; the pool is unusable")]
    WorkerLost,
}
