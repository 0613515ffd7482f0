use space::{SpaceKind, SpaceRegistry, TensorBuf};

use crate::scheduler::Slot;
use crate::PoolError;

/// Results of the last reset or step for all instances of a pool.
///
/// Each observation space is one contiguous tensor of `num_envs` buffers,
/// instance `i` at offset `i * space.byte_len()`. Info spaces likewise.
#[derive(Debug, Clone, PartialEq)]
pub struct StepBatch {
    num_envs: usize,
    obs: Vec<TensorBuf>,
    infos: Vec<TensorBuf>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    failures: Vec<Option<String>>,
}

impl StepBatch {
    pub(crate) fn new(registry: &SpaceRegistry, num_envs: usize) -> Self {
        let stacked = |kind: SpaceKind| -> Vec<TensorBuf> {
            registry
                .spaces(kind)
                .iter()
                .map(|s| TensorBuf::zeroed(s.dtype(), s.element_count() * num_envs))
                .collect()
        };
        Self {
            num_envs,
            obs: stacked(SpaceKind::Observation),
            infos: stacked(SpaceKind::Info),
            rewards: vec![0.0; num_envs],
            dones: vec![false; num_envs],
            failures: vec![None; num_envs],
        }
    }

    #[must_use]
    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    /// All instances' observations for one observation space.
    #[must_use]
    pub fn observations(&self, space: usize) -> Option<&TensorBuf> {
        self.obs.get(space)
    }

    /// Instance `env`'s raw observation bytes for one space.
    #[must_use]
    pub fn obs(&self, space: usize, env: usize) -> Option<&[u8]> {
        row(self.obs.get(space)?, self.num_envs, env)
    }

    #[must_use]
    pub fn infos(&self, space: usize) -> Option<&TensorBuf> {
        self.infos.get(space)
    }

    #[must_use]
    pub fn info(&self, space: usize, env: usize) -> Option<&[u8]> {
        row(self.infos.get(space)?, self.num_envs, env)
    }

    #[must_use]
    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    #[must_use]
    pub fn dones(&self) -> &[bool] {
        &self.dones
    }

    #[must_use]
    pub fn failed(&self, env: usize) -> bool {
        self.failures.get(env).is_some_and(Option::is_some)
    }

    /// Why instance `env` failed in the last cycle, if it did.
    #[must_use]
    pub fn failure(&self, env: usize) -> Option<&str> {
        self.failures.get(env)?.as_deref()
    }

    /// `(index, message)` for every failed instance.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &str)> {
        self.failures
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_deref().map(|m| (i, m)))
    }

    /// Copies the batch into caller-owned buffers.
    ///
    /// # Errors
    ///
    /// [`PoolError::Layout`] if any buffer count or length disagrees with the
    /// pool's spaces. Nothing is written in that case.
    pub fn copy_into(&self, out: &mut StepOutput<'_>) -> Result<(), PoolError> {
        let n = self.num_envs;
        check_rows("observation", &self.obs, &out.obs, n)?;
        check_rows("info", &self.infos, &out.infos, n)?;
        check_len("rewards", n, out.rewards.len())?;
        check_len("dones", n, out.dones.len())?;
        if let Some(failures) = &out.failures {
            check_len("failures", n, failures.len())?;
        }

        scatter(&self.obs, &mut out.obs, n);
        scatter(&self.infos, &mut out.infos, n);
        out.rewards.copy_from_slice(&self.rewards);
        for (dst, &done) in out.dones.iter_mut().zip(&self.dones) {
            *dst = u8::from(done);
        }
        if let Some(failures) = &mut out.failures {
            for (dst, failure) in failures.iter_mut().zip(&self.failures) {
                *dst = u8::from(failure.is_some());
            }
        }
        Ok(())
    }

    pub(crate) fn gather<E>(&mut self, slots: &[Slot<E>]) {
        let n = self.num_envs;
        for (env, slot) in slots.iter().enumerate() {
            for (stacked, buf) in self.obs.iter_mut().zip(slot.out.obs_buffers()) {
                row_mut(stacked, n, env).copy_from_slice(buf.as_bytes());
            }
            for (stacked, buf) in self.infos.iter_mut().zip(slot.out.info_buffers()) {
                row_mut(stacked, n, env).copy_from_slice(buf.as_bytes());
            }
            self.rewards[env] = slot.out.reward;
            self.dones[env] = slot.out.done;
            self.failures[env].clone_from(&slot.failure);
        }
    }
}

fn row(stacked: &TensorBuf, n: usize, env: usize) -> Option<&[u8]> {
    if env >= n {
        return None;
    }
    let len = stacked.len() / n;
    Some(&stacked.as_bytes()[env * len..(env + 1) * len])
}

fn row_mut(stacked: &mut TensorBuf, n: usize, env: usize) -> &mut [u8] {
    let len = stacked.len() / n;
    &mut stacked.as_bytes_mut()[env * len..(env + 1) * len]
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), PoolError> {
    if expected == actual {
        Ok(())
    } else {
        Err(PoolError::Layout { what, expected, actual })
    }
}

fn check_rows(what: &'static str, stacked: &[TensorBuf], rows: &[&mut [u8]], n: usize) -> Result<(), PoolError> {
    check_len(what, stacked.len() * n, rows.len())?;
    for (space, tensor) in stacked.iter().enumerate() {
        let len = tensor.len() / n;
        for row in &rows[space * n..(space + 1) * n] {
            check_len(what, len, row.len())?;
        }
    }
    Ok(())
}

fn scatter(stacked: &[TensorBuf], rows: &mut [&mut [u8]], n: usize) {
    for (space, tensor) in stacked.iter().enumerate() {
        let len = tensor.len() / n;
        for (env, dst) in rows[space * n..(space + 1) * n].iter_mut().enumerate() {
            dst.copy_from_slice(&tensor.as_bytes()[env * len..(env + 1) * len]);
        }
    }
}

/// Borrowed destination for [`StepBatch::copy_into`].
///
/// `obs[space * num_envs + env]` is one observation buffer; `infos` follows
/// the same layout. `dones` and `failures` hold 0 or 1.
pub struct StepOutput<'a> {
    pub obs: Vec<&'a mut [u8]>,
    pub rewards: &'a mut [f32],
    pub dones: &'a mut [u8],
    pub infos: Vec<&'a mut [u8]>,
    pub failures: Option<&'a mut [u8]>,
}

/// Owned buffers laid out for one pool, for callers that do not bring their
/// own memory.
#[derive(Debug, Clone, PartialEq)]
pub struct StepBuffers {
    num_envs: usize,
    pub obs: Vec<Vec<u8>>,
    pub rewards: Vec<f32>,
    pub dones: Vec<u8>,
    pub infos: Vec<Vec<u8>>,
    pub failures: Vec<u8>,
}

impl StepBuffers {
    #[must_use]
    pub fn new(registry: &SpaceRegistry, num_envs: usize) -> Self {
        let rows = |kind: SpaceKind| -> Vec<Vec<u8>> {
            registry
                .spaces(kind)
                .iter()
                .flat_map(|s| std::iter::repeat(s.byte_len()).take(num_envs))
                .map(|len| vec![0; len])
                .collect()
        };
        Self {
            num_envs,
            obs: rows(SpaceKind::Observation),
            rewards: vec![0.0; num_envs],
            dones: vec![0; num_envs],
            infos: rows(SpaceKind::Info),
            failures: vec![0; num_envs],
        }
    }

    /// Instance `env`'s bytes for observation space `space`.
    #[must_use]
    pub fn obs(&self, space: usize, env: usize) -> Option<&[u8]> {
        if env >= self.num_envs {
            return None;
        }
        self.obs.get(space * self.num_envs + env).map(Vec::as_slice)
    }

    pub fn view_mut(&mut self) -> StepOutput<'_> {
        StepOutput {
            obs: self.obs.iter_mut().map(Vec::as_mut_slice).collect(),
            rewards: &mut self.rewards,
            dones: &mut self.dones,
            infos: self.infos.iter_mut().map(Vec::as_mut_slice).collect(),
            failures: Some(&mut self.failures),
        }
    }
}

/// One action buffer per (action space, instance), `buffers[space *
/// num_envs + env]`, each exactly the space's byte length.
#[derive(Debug, Clone, Default)]
pub struct ActionBatch<'a> {
    buffers: Vec<&'a [u8]>,
}

impl<'a> ActionBatch<'a> {
    #[must_use]
    pub fn new(buffers: Vec<&'a [u8]>) -> Self {
        Self { buffers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    #[must_use]
    pub fn get(&self, space: usize, env: usize, num_envs: usize) -> Option<&'a [u8]> {
        if env >= num_envs {
            return None;
        }
        self.buffers.get(space * num_envs + env).copied()
    }

    pub(crate) fn buffers(&self) -> &[&'a [u8]] {
        &self.buffers
    }
}
