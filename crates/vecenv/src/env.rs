use space::{Element, Space, SpaceError, SpaceKind, SpaceRegistry, TensorBuf};

use crate::options::OptionsReader;
use crate::EnvError;

/// A factory for environment instances.
///
/// A family is configured once per pool from the caller's options, declares
/// the spaces all of its instances share, and then builds one instance per
/// index. Spaces are fixed for the lifetime of the pool.
pub trait EnvFamily: Sized + Send + 'static {
    type Instance: Environment;

    /// Name used in logs.
    const NAME: &'static str;

    /// Reads the family's own options. Anything left unread after this call
    /// fails pool creation.
    ///
    /// # Errors
    ///
    /// Any option the family cannot accept.
    fn configure(num_envs: usize, options: &mut OptionsReader<'_>) -> Result<Self, EnvError>;

    /// Every space of every kind, in declaration order.
    ///
    /// # Errors
    ///
    /// A space that fails validation.
    fn spaces(&self) -> Result<Vec<Space>, SpaceError>;

    /// Builds instance `index` of the pool. `seed` is already mixed with the
    /// index.
    ///
    /// # Errors
    ///
    /// Whatever prevents the instance from existing. The pool drops every
    /// instance built so far.
    fn make_instance(&self, index: usize, seed: u64) -> Result<Self::Instance, EnvError>;
}

/// One environment instance, driven by exactly one worker at a time.
pub trait Environment: Send + 'static {
    /// Starts a new episode and writes the first observation into `out`.
    ///
    /// # Errors
    ///
    /// An [`EnvError`] marks this instance failed for the current cycle.
    fn reset(&mut self, out: &mut Transition) -> Result<(), EnvError>;

    /// Applies one action per action space.
    ///
    /// # Errors
    ///
    /// As [`Environment::reset`].
    fn step(&mut self, action: &[TensorBuf], out: &mut Transition) -> Result<(), EnvError>;

    /// Draws the current state into `frame`, sized for the render space
    /// called `mode`.
    ///
    /// # Errors
    ///
    /// [`EnvError::Unsupported`] unless overridden.
    fn render(&mut self, mode: &str, frame: &mut TensorBuf) -> Result<(), EnvError> {
        let _ = (mode, frame);
        Err(EnvError::Unsupported("render"))
    }
}

/// Per-instance output of one reset or step.
///
/// Buffers are preallocated from the registry and reused every cycle, so
/// their layout always matches the pool's spaces. Everything is cleared
/// before each call; the environment writes what it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    obs: Vec<TensorBuf>,
    info: Vec<TensorBuf>,
    pub reward: f32,
    pub done: bool,
}

impl Transition {
    #[must_use]
    pub fn for_registry(registry: &SpaceRegistry) -> Self {
        let buffers = |kind: SpaceKind| -> Vec<TensorBuf> {
            registry
                .spaces(kind)
                .iter()
                .map(TensorBuf::for_space)
                .collect()
        };
        Self {
            obs: buffers(SpaceKind::Observation),
            info: buffers(SpaceKind::Info),
            reward: 0.0,
            done: false,
        }
    }

    #[must_use]
    pub fn obs(&self, space: usize) -> Option<&TensorBuf> {
        self.obs.get(space)
    }

    #[must_use]
    pub fn info(&self, space: usize) -> Option<&TensorBuf> {
        self.info.get(space)
    }

    /// Typed view of observation space `space`.
    ///
    /// # Errors
    ///
    /// [`EnvError::NoSuchSpace`] for an index past the last observation
    /// space, [`EnvError::Space`] if `T` is not the space's dtype.
    pub fn obs_mut<T: Element>(&mut self, space: usize) -> Result<&mut [T], EnvError> {
        let buf = self.obs.get_mut(space).ok_or(EnvError::NoSuchSpace {
            kind: SpaceKind::Observation,
            index: space,
        })?;
        Ok(buf.as_mut_slice()?)
    }

    /// Typed view of info space `space`.
    ///
    /// # Errors
    ///
    /// As [`Transition::obs_mut`].
    pub fn info_mut<T: Element>(&mut self, space: usize) -> Result<&mut [T], EnvError> {
        let buf = self.info.get_mut(space).ok_or(EnvError::NoSuchSpace {
            kind: SpaceKind::Info,
            index: space,
        })?;
        Ok(buf.as_mut_slice()?)
    }

    pub(crate) fn obs_buffers(&self) -> &[TensorBuf] {
        &self.obs
    }

    pub(crate) fn info_buffers(&self) -> &[TensorBuf] {
        &self.info
    }

    /// Zeroes every buffer and clears reward and done.
    pub fn clear(&mut self) {
        for buf in self.obs.iter_mut().chain(self.info.iter_mut()) {
            buf.fill_zero();
        }
        self.reward = 0.0;
        self.done = false;
    }
}
