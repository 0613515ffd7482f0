use space::{Scalar, Space, SpaceError, SpaceKind, TensorBuf};
use vecenv::{EnvError, EnvFamily, Environment, OptionsReader, Transition};

/// Steps after which every instance reports done.
pub const EPISODE_LEN: i32 = 100;
pub const RENDER_MODE: &str = "rgb_array";

/// Deterministic layout probe.
///
/// Observations are `0..len` in each of the three dtypes. Instance `i` earns
/// `step_count * i` when it receives action `i`; the info space and every
/// rendered pixel carry the same product.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ramp;

#[derive(Debug)]
pub struct RampEnv {
    index: i32,
    step_count: i32,
}

impl EnvFamily for Ramp {
    type Instance = RampEnv;
    const NAME: &'static str = "ramp";

    fn configure(_num_envs: usize, _options: &mut OptionsReader<'_>) -> Result<Self, EnvError> {
        Ok(Ramp)
    }

    fn spaces(&self) -> Result<Vec<Space>, SpaceError> {
        Ok(vec![
            Space::boxed("uint8_obs", SpaceKind::Observation, &[1, 2, 3], Scalar::U8(0), Scalar::U8(128))?,
            Space::boxed("int32_obs", SpaceKind::Observation, &[4, 5, 6], Scalar::I32(-100), Scalar::I32(100))?,
            Space::boxed(
                "float32_obs",
                SpaceKind::Observation,
                &[7, 8, 9],
                Scalar::F32(-1000.0),
                Scalar::F32(1000.0),
            )?,
            Space::discrete("action", SpaceKind::Action, &[1], Scalar::U8(0), Scalar::U8(32))?,
            Space::discrete("info", SpaceKind::Info, &[1], Scalar::I32(0), Scalar::I32(10_000))?,
            Space::boxed(RENDER_MODE, SpaceKind::Render, &[8, 8, 3], Scalar::I32(0), Scalar::I32(10_000))?,
        ])
    }

    fn make_instance(&self, index: usize, _seed: u64) -> Result<RampEnv, EnvError> {
        let index = i32::try_from(index).map_err(|_| EnvError::Failed(format!("index {index} out of range")))?;
        Ok(RampEnv { index, step_count: 0 })
    }
}

impl RampEnv {
    fn product(&self) -> i32 {
        self.step_count.saturating_mul(self.index)
    }

    fn observe(&self, out: &mut Transition) -> Result<(), EnvError> {
        for (v, i) in out.obs_mut::<u8>(0)?.iter_mut().zip(0u8..) {
            *v = i;
        }
        for (v, i) in out.obs_mut::<i32>(1)?.iter_mut().zip(0i32..) {
            *v = i;
        }
        for (v, i) in out.obs_mut::<f32>(2)?.iter_mut().zip(0u16..) {
            *v = f32::from(i);
        }
        out.info_mut::<i32>(0)?[0] = self.product();
        out.done = self.step_count >= EPISODE_LEN;
        Ok(())
    }
}

impl Environment for RampEnv {
    fn reset(&mut self, out: &mut Transition) -> Result<(), EnvError> {
        self.step_count = 0;
        self.observe(out)
    }

    #[allow(clippy::cast_precision_loss)]
    fn step(&mut self, action: &[TensorBuf], out: &mut Transition) -> Result<(), EnvError> {
        let action = i32::from(action[0].as_slice::<u8>()?[0]);
        self.step_count = self.step_count.saturating_add(1);
        if action == self.index {
            out.reward = self.product() as f32;
        }
        self.observe(out)
    }

    fn render(&mut self, mode: &str, frame: &mut TensorBuf) -> Result<(), EnvError> {
        if mode != RENDER_MODE {
            return Err(EnvError::Unsupported("render modes other than rgb_array"));
        }
        frame.as_mut_slice::<i32>()?.fill(self.product());
        Ok(())
    }
}
