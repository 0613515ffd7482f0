use std::mem;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use space::{SpaceKind, SpaceRegistry, TensorBuf};
use tracing::{debug, error, info, warn};

use crate::batch::{ActionBatch, StepBatch};
use crate::env::{EnvFamily, Environment};
use crate::options::{Options, OptionsError, OptionsReader};
use crate::scheduler::{panic_message, Phase, Scheduler, Slot};
use crate::{EnvError, PoolError};

/// Spreads instance seeds apart so neighbouring indices do not get
/// neighbouring streams.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PoolState {
    Idle,
    Stepping,
    /// A worker vanished mid-cycle; the instances are gone.
    Lost,
}

/// `N` instances of one family behind a two-phase step protocol.
pub struct Pool<F: EnvFamily> {
    family: F,
    num_envs: usize,
    seed: u64,
    registry: SpaceRegistry,
    slots: Vec<Slot<F::Instance>>,
    state: PoolState,
    scheduler: Scheduler<F::Instance>,
    batch: StepBatch,
    frames: Vec<TensorBuf>,
    cycles: u64,
}

impl<F: EnvFamily> Pool<F> {
    /// Builds a pool of `num_envs` instances.
    ///
    /// Pool-level options are `seed` (one `int32`; random when absent) and
    /// `num_threads` (one positive `int32`; defaults to the available
    /// parallelism). Every other option goes to [`EnvFamily::configure`].
    ///
    /// # Errors
    ///
    /// [`PoolError::NoInstances`] for `num_envs == 0`, an options or space
    /// error, [`PoolError::Configure`] if the family rejects its options, and
    /// [`PoolError::Instance`] naming the first index that failed to build.
    /// Nothing outlives a failed call.
    pub fn make(num_envs: usize, options: &Options) -> Result<Self, PoolError> {
        Self::make_with(num_envs, options, None)
    }

    /// As [`Pool::make`], with a worker cap used when the options carry no
    /// `num_threads`.
    ///
    /// # Errors
    ///
    /// See [`Pool::make`].
    pub fn make_with(num_envs: usize, options: &Options, default_threads: Option<usize>) -> Result<Self, PoolError> {
        if num_envs == 0 {
            return Err(PoolError::NoInstances);
        }

        let mut reader = OptionsReader::new(options);
        let seed = match reader.i32("seed")? {
            Some(seed) => u64::from(u32::from_ne_bytes(seed.to_ne_bytes())),
            None => fastrand::u64(..),
        };
        let num_threads = match reader.i32("num_threads")? {
            Some(t) => Some(usize::try_from(t).ok().filter(|&t| t > 0).ok_or_else(|| {
                OptionsError::Invalid {
                    name: "num_threads".into(),
                    reason: "must be positive",
                }
            })?),
            None => None,
        };
        let family = F::configure(num_envs, &mut reader).map_err(PoolError::Configure)?;
        reader.finish()?;

        let registry = SpaceRegistry::new(family.spaces()?)?;
        let threads = num_threads
            .or(default_threads)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZeroUsize::get))
            .clamp(1, num_envs);
        let scheduler = Scheduler::new(threads)?;

        let mut slots = Vec::with_capacity(num_envs);
        for index in 0..num_envs {
            let instance_seed = seed ^ (index as u64).wrapping_mul(SEED_STRIDE);
            match family.make_instance(index, instance_seed) {
                Ok(env) => slots.push(Slot::new(env, &registry)),
                Err(source) => {
                    let built = slots.len();
                    drop(slots);
                    error!(family = F::NAME, index, built, "instance construction failed: {source}");
                    return Err(PoolError::Instance { index, source });
                }
            }
        }

        info!(family = F::NAME, num_envs, threads, seed, "pool created");
        Ok(Self {
            batch: StepBatch::new(&registry, num_envs),
            family,
            num_envs,
            seed,
            registry,
            slots,
            state: PoolState::Idle,
            scheduler,
            frames: Vec::new(),
            cycles: 0,
        })
    }

    #[must_use]
    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    #[must_use]
    pub fn registry(&self) -> &SpaceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn family(&self) -> &F {
        &self.family
    }

    /// The seed instance seeds were derived from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.scheduler.threads()
    }

    #[must_use]
    pub fn is_stepping(&self) -> bool {
        self.state == PoolState::Stepping
    }

    /// Completed step cycles.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// The most recently assembled batch.
    #[must_use]
    pub fn last(&self) -> &StepBatch {
        &self.batch
    }

    /// Resets every instance and returns the initial batch.
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyStepping`] while a step is in flight,
    /// [`PoolError::WorkerLost`] on a pool that lost its instances.
    pub fn reset(&mut self) -> Result<&StepBatch, PoolError> {
        self.ensure_idle()?;
        let slots = mem::take(&mut self.slots);
        self.slots = self.scheduler.run(slots, Phase::Reset).inspect_err(|_| {
            self.state = PoolState::Lost;
        })?;
        self.batch.gather(&self.slots);
        self.report_failures("reset");
        debug!(family = F::NAME, "pool reset");
        Ok(&self.batch)
    }

    /// Hands one action to every instance and returns without waiting.
    ///
    /// Actions are copied before this returns; `actions` may be reused at
    /// once.
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyStepping`] if a step is in flight, or
    /// [`PoolError::Layout`] if `actions` does not match the action spaces.
    /// The pool is unchanged on error.
    pub fn step_async(&mut self, actions: &ActionBatch<'_>) -> Result<(), PoolError> {
        self.ensure_idle()?;
        let lens = self.registry.byte_lens(SpaceKind::Action);
        let n = self.num_envs;
        if actions.len() != lens.len() * n {
            return Err(PoolError::Layout {
                what: "action buffers",
                expected: lens.len() * n,
                actual: actions.len(),
            });
        }
        for (i, buf) in actions.buffers().iter().enumerate() {
            let expected = lens[i / n];
            if buf.len() != expected {
                return Err(PoolError::Layout {
                    what: "action buffer length",
                    expected,
                    actual: buf.len(),
                });
            }
        }

        for (i, buf) in actions.buffers().iter().enumerate() {
            self.slots[i % n].action[i / n].copy_from_bytes(buf)?;
        }
        let slots = mem::take(&mut self.slots);
        self.scheduler.dispatch(slots, Phase::Step);
        self.state = PoolState::Stepping;
        Ok(())
    }

    /// Blocks until every instance has finished the in-flight step.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotStepping`] if no step is in flight,
    /// [`PoolError::WorkerLost`] if an instance never came back.
    pub fn step_wait(&mut self) -> Result<&StepBatch, PoolError> {
        match self.state {
            PoolState::Stepping => {}
            PoolState::Idle => return Err(PoolError::NotStepping),
            PoolState::Lost => return Err(PoolError::WorkerLost),
        }
        self.slots = self.scheduler.join().inspect_err(|_| {
            self.state = PoolState::Lost;
        })?;
        self.state = PoolState::Idle;
        self.batch.gather(&self.slots);
        self.cycles += 1;
        self.report_failures("step");
        debug!(family = F::NAME, cycle = self.cycles, "step complete");
        Ok(&self.batch)
    }

    /// [`Pool::step_async`] followed by [`Pool::step_wait`].
    ///
    /// # Errors
    ///
    /// Either call's errors.
    pub fn step(&mut self, actions: &ActionBatch<'_>) -> Result<&StepBatch, PoolError> {
        self.step_async(actions)?;
        self.step_wait()
    }

    /// Renders one frame per instance for the render space named `mode`.
    ///
    /// # Errors
    ///
    /// [`PoolError::UnknownRenderMode`] if there is no such render space,
    /// [`PoolError::Render`] for the first instance that could not draw.
    pub fn render(&mut self, mode: &str) -> Result<&[TensorBuf], PoolError> {
        self.ensure_idle()?;
        let (_, space) = self
            .registry
            .find(SpaceKind::Render, mode)
            .ok_or_else(|| PoolError::UnknownRenderMode(mode.to_owned()))?;

        let fresh = TensorBuf::for_space(space);
        let reusable = matches!(self.frames.first(), Some(f) if f.len() == fresh.len() && f.dtype() == fresh.dtype());
        if !reusable {
            self.frames = vec![fresh.clone(); self.num_envs];
        }

        let slots = &mut self.slots;
        let frames = &mut self.frames;
        self.scheduler.install(|| {
            slots
                .par_iter_mut()
                .zip(frames.par_iter_mut())
                .enumerate()
                .try_for_each(|(index, (slot, frame))| {
                    let result = catch_unwind(AssertUnwindSafe(|| slot.env.render(mode, frame)))
                        .unwrap_or_else(|panic| {
                            Err(EnvError::Failed(format!("panicked: {}", panic_message(panic.as_ref()))))
                        });
                    if result.is_ok() && (frame.len() != fresh.len() || frame.dtype() != fresh.dtype()) {
                        frame.clone_from(&fresh);
                        return Err(PoolError::Render {
                            index,
                            source: EnvError::Failed("frame does not match its render space".into()),
                        });
                    }
                    result.map_err(|source| PoolError::Render { index, source })
                })
        })?;
        Ok(&self.frames)
    }

    /// Tears the pool down.
    ///
    /// # Errors
    ///
    /// [`PoolError::ClosedWhileStepping`] if a step was in flight. The step
    /// is joined before the instances are dropped either way.
    pub fn close(mut self) -> Result<(), PoolError> {
        if self.state == PoolState::Stepping {
            let joined = self.scheduler.join();
            error!(
                family = F::NAME,
                lost = joined.is_err(),
                "pool closed with a step in flight"
            );
            return Err(PoolError::ClosedWhileStepping);
        }
        info!(family = F::NAME, cycles = self.cycles, "pool closed");
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), PoolError> {
        match self.state {
            PoolState::Idle => Ok(()),
            PoolState::Stepping => Err(PoolError::AlreadyStepping),
            PoolState::Lost => Err(PoolError::WorkerLost),
        }
    }

    fn report_failures(&self, phase: &str) {
        for (index, message) in self.batch.failures() {
            warn!(family = F::NAME, index, phase, "instance failed: {message}");
        }
    }
}

impl<F: EnvFamily> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("family", &F::NAME)
            .field("num_envs", &self.num_envs)
            .field("state", &self.state)
            .field("threads", &self.threads())
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}
