//! Guess a hidden bit string one bit per step.
//!
//! Configured with exactly one of two options:
//!
//! * `num_bits` (one `int32`): every instance draws `num_bits` random bits
//!   at the start of each episode.
//! * `n` (one `int32` per instance): instance `i` must guess the 64-bit
//!   two's-complement pattern of `n[i]`, least significant bit first.
//!
//! A correct guess earns 1. A wrong guess, or reaching the last bit, ends the
//! episode with reward 0 and the instance starts over. The observation is
//! the number of bits guessed so far in the current episode.

use space::{Scalar, Space, SpaceError, SpaceKind, TensorBuf};
use tracing::debug;
use vecenv::{EnvError, EnvFamily, Environment, OptionsError, OptionsReader, Transition};

const FIXED_BITS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessNumber {
    Random { num_bits: usize },
    Fixed(Vec<u64>),
}

#[derive(Debug)]
pub struct GuessNumberEnv {
    rng: fastrand::Rng,
    random: bool,
    bits: Vec<bool>,
    step_count: usize,
}

impl EnvFamily for GuessNumber {
    type Instance = GuessNumberEnv;
    const NAME: &'static str = "guess_number";

    fn configure(num_envs: usize, options: &mut OptionsReader<'_>) -> Result<Self, EnvError> {
        let num_bits = options.i32("num_bits")?;
        let n = options.i32_per_instance("n", num_envs)?;
        let family = match (num_bits, n) {
            (Some(_), Some(_)) => {
                return Err(OptionsError::Conflict {
                    first: "num_bits".into(),
                    second: "n".into(),
                }
                .into())
            }
            (None, None) => return Err(OptionsError::Missing("`num_bits` or `n`".into()).into()),
            (Some(bits), None) => {
                let num_bits = usize::try_from(bits)
                    .ok()
                    .filter(|&b| b > 0)
                    .ok_or_else(|| OptionsError::Invalid {
                        name: "num_bits".into(),
                        reason: "must be positive",
                    })?;
                GuessNumber::Random { num_bits }
            }
            (None, Some(values)) => GuessNumber::Fixed(
                values
                    .iter()
                    .map(|&v| u64::from_ne_bytes(i64::from(v).to_ne_bytes()))
                    .collect(),
            ),
        };
        debug!(?family, "guess_number configured");
        Ok(family)
    }

    fn spaces(&self) -> Result<Vec<Space>, SpaceError> {
        Ok(vec![
            Space::boxed(
                "observation",
                SpaceKind::Observation,
                &[1],
                Scalar::F32(f32::NEG_INFINITY),
                Scalar::F32(f32::INFINITY),
            )?,
            Space::boxed("action", SpaceKind::Action, &[1], Scalar::U8(0), Scalar::U8(1))?,
        ])
    }

    fn make_instance(&self, index: usize, seed: u64) -> Result<GuessNumberEnv, EnvError> {
        let rng = fastrand::Rng::with_seed(seed);
        let env = match self {
            GuessNumber::Random { num_bits } => GuessNumberEnv {
                bits: (0..*num_bits).map(|_| rng.bool()).collect(),
                rng,
                random: true,
                step_count: 0,
            },
            GuessNumber::Fixed(values) => {
                let n = values
                    .get(index)
                    .ok_or_else(|| EnvError::Failed(format!("no `n` value for instance {index}")))?;
                GuessNumberEnv {
                    rng,
                    random: false,
                    bits: (0..FIXED_BITS).map(|bit| (n >> bit) & 1 == 1).collect(),
                    step_count: 0,
                }
            }
        };
        Ok(env)
    }
}

impl GuessNumberEnv {
    fn restart(&mut self) {
        self.step_count = 0;
        if self.random {
            for bit in &mut self.bits {
                *bit = self.rng.bool();
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn observe(&self, out: &mut Transition) -> Result<(), EnvError> {
        out.obs_mut::<f32>(0)?[0] = self.step_count as f32;
        Ok(())
    }

    /// The hidden bits of the current episode.
    #[must_use]
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}

impl Environment for GuessNumberEnv {
    fn reset(&mut self, out: &mut Transition) -> Result<(), EnvError> {
        self.restart();
        self.observe(out)
    }

    fn step(&mut self, action: &[TensorBuf], out: &mut Transition) -> Result<(), EnvError> {
        let guess = action[0].as_slice::<u8>()?[0] != 0;
        let correct = guess == self.bits[self.step_count];
        let last = self.step_count + 1 == self.bits.len();
        self.step_count += 1;

        if correct && !last {
            out.reward = 1.0;
        } else {
            out.reward = 0.0;
            out.done = true;
            self.restart();
        }
        self.observe(out)
    }
}
