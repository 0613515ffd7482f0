use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_channel::Receiver;
use rayon::{ThreadPool, ThreadPoolBuilder};
use space::{SpaceKind, SpaceRegistry, TensorBuf};

use crate::env::{Environment, Transition};
use crate::PoolError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Reset,
    Step,
}

/// One instance together with everything a worker needs to drive it.
///
/// A slot is moved into its job and moved back on completion, so a worker
/// never shares an instance with anyone.
pub(crate) struct Slot<E> {
    pub env: E,
    pub action: Vec<TensorBuf>,
    pub out: Transition,
    pub failure: Option<String>,
    pub needs_reset: bool,
}

impl<E: Environment> Slot<E> {
    pub fn new(env: E, registry: &SpaceRegistry) -> Self {
        Self {
            env,
            action: registry
                .spaces(SpaceKind::Action)
                .iter()
                .map(TensorBuf::for_space)
                .collect(),
            out: Transition::for_registry(registry),
            failure: None,
            needs_reset: false,
        }
    }

    /// Runs one reset or step. A failed instance is reset instead of stepped
    /// on its next cycle.
    pub fn run(&mut self, phase: Phase) {
        self.out.clear();
        let reset = phase == Phase::Reset || self.needs_reset;
        let result = catch_unwind(AssertUnwindSafe(|| {
            if reset {
                self.env.reset(&mut self.out)
            } else {
                self.env.step(&self.action, &mut self.out)
            }
        }));

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("panicked: {}", panic_message(panic.as_ref()))),
        };
        self.needs_reset = failure.is_some();
        if failure.is_some() {
            self.out.clear();
            self.out.done = true;
        }
        self.failure = failure;
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

struct Inflight<E> {
    rx: Receiver<(usize, Slot<E>)>,
    expected: usize,
}

/// Fixed worker threads plus the bookkeeping for at most one in-flight
/// cycle.
pub(crate) struct Scheduler<E> {
    workers: ThreadPool,
    inflight: Option<Inflight<E>>,
}

impl<E: Environment> Scheduler<E> {
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let workers = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("libenv-worker-{i}"))
            .build()?;
        Ok(Self {
            workers,
            inflight: None,
        })
    }

    pub fn threads(&self) -> usize {
        self.workers.current_num_threads()
    }

    pub fn is_busy(&self) -> bool {
        self.inflight.is_some()
    }

    /// Queues one job per slot and returns without waiting.
    pub fn dispatch(&mut self, slots: Vec<Slot<E>>, phase: Phase) {
        debug_assert!(self.inflight.is_none());
        let expected = slots.len();
        let (tx, rx) = crossbeam_channel::bounded(expected);
        for (index, mut slot) in slots.into_iter().enumerate() {
            let tx = tx.clone();
            self.workers.spawn(move || {
                slot.run(phase);
                // receiver only goes away with the scheduler, after draining
                let _ = tx.send((index, slot));
            });
        }
        self.inflight = Some(Inflight { rx, expected });
    }

    /// Blocks until every job of the in-flight cycle has reported back and
    /// returns the slots in index order.
    pub fn join(&mut self) -> Result<Vec<Slot<E>>, PoolError> {
        let Inflight { rx, expected } = self.inflight.take().ok_or(PoolError::NotStepping)?;
        let mut returned: Vec<Option<Slot<E>>> = (0..expected).map(|_| None).collect();
        for _ in 0..expected {
            let (index, slot) = rx.recv().map_err(|_| PoolError::WorkerLost)?;
            returned[index] = Some(slot);
        }
        returned
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(PoolError::WorkerLost)
    }

    pub fn run(&mut self, slots: Vec<Slot<E>>, phase: Phase) -> Result<Vec<Slot<E>>, PoolError> {
        self.dispatch(slots, phase);
        self.join()
    }

    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.workers.install(op)
    }
}

impl<E> Drop for Scheduler<E> {
    fn drop(&mut self) {
        if let Some(Inflight { rx, expected }) = self.inflight.take() {
            for _ in 0..expected {
                if rx.recv().is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EnvError;
    use space::{Scalar, Space};

    struct Counter {
        steps: u32,
        fail_at: Option<u32>,
    }

    impl Environment for Counter {
        fn reset(&mut self, out: &mut Transition) -> Result<(), EnvError> {
            self.steps = 0;
            out.obs_mut::<i32>(0)?[0] = 0;
            Ok(())
        }

        fn step(&mut self, _action: &[TensorBuf], out: &mut Transition) -> Result<(), EnvError> {
            self.steps += 1;
            if Some(self.steps) == self.fail_at {
                panic!("boom at {}", self.steps);
            }
            out.obs_mut::<i32>(0)?[0] = i32::try_from(self.steps).unwrap_or(i32::MAX);
            out.reward = 1.0;
            Ok(())
        }
    }

    fn registry() -> SpaceRegistry {
        SpaceRegistry::new([
            Space::boxed("count", SpaceKind::Observation, &[1], Scalar::I32(0), Scalar::I32(1000)).unwrap(),
            Space::boxed("act", SpaceKind::Action, &[1], Scalar::U8(0), Scalar::U8(1)).unwrap(),
        ])
        .unwrap()
    }

    fn slots(n: usize, fail_at: Option<u32>) -> Vec<Slot<Counter>> {
        let registry = registry();
        (0..n)
            .map(|_| Slot::new(Counter { steps: 0, fail_at }, &registry))
            .collect()
    }

    #[test]
    fn join_restores_index_order() {
        let mut scheduler = Scheduler::new(3).unwrap();
        let mut slots = slots(8, None);
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.env.steps = u32::try_from(i * 10).unwrap();
        }
        let slots = scheduler.run(slots, Phase::Step).unwrap();
        let counts: Vec<i32> = slots
            .iter()
            .map(|s| s.out.obs(0).unwrap().as_slice::<i32>().unwrap()[0])
            .collect();
        assert_eq!(counts, [1, 11, 21, 31, 41, 51, 61, 71]);
    }

    #[test]
    fn panic_marks_slot_and_forces_reset() {
        let mut scheduler = Scheduler::new(2).unwrap();
        let slots = scheduler.run(slots(2, Some(1)), Phase::Step).unwrap();
        for slot in &slots {
            assert!(slot.out.done);
            assert_eq!(slot.out.reward, 0.0);
            assert_eq!(slot.failure.as_deref(), Some("panicked: boom at 1"));
            assert!(slot.needs_reset);
        }
        let slots = scheduler.run(slots, Phase::Step).unwrap();
        for slot in &slots {
            assert!(slot.failure.is_none());
            assert!(!slot.out.done);
            assert_eq!(slot.env.steps, 0);
        }
    }

    #[test]
    fn join_without_dispatch_fails() {
        let mut scheduler = Scheduler::<Counter>::new(1).unwrap();
        assert!(matches!(scheduler.join(), Err(PoolError::NotStepping)));
    }

    #[test]
    fn drop_drains_inflight_jobs() {
        let mut scheduler = Scheduler::new(1).unwrap();
        scheduler.dispatch(slots(4, None), Phase::Reset);
        assert!(scheduler.is_busy());
        drop(scheduler);
    }
}
