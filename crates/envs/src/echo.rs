use space::{Scalar, Space, SpaceError, SpaceKind, TensorBuf};
use vecenv::{EnvError, EnvFamily, Environment, OptionsReader, Transition};

/// Steps per episode.
pub const EPISODE_LEN: u32 = 16;
/// Largest accepted action.
pub const MAX_ACTION: u8 = 16;

/// Rewards each instance with its own action and observes it back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

#[derive(Debug, Default)]
pub struct EchoEnv {
    steps: u32,
}

impl EnvFamily for Echo {
    type Instance = EchoEnv;
    const NAME: &'static str = "echo";

    fn configure(_num_envs: usize, _options: &mut OptionsReader<'_>) -> Result<Self, EnvError> {
        Ok(Echo)
    }

    fn spaces(&self) -> Result<Vec<Space>, SpaceError> {
        Ok(vec![
            Space::boxed(
                "observation",
                SpaceKind::Observation,
                &[1],
                Scalar::F32(0.0),
                Scalar::F32(f32::from(MAX_ACTION)),
            )?,
            Space::boxed("action", SpaceKind::Action, &[1], Scalar::U8(0), Scalar::U8(MAX_ACTION))?,
        ])
    }

    fn make_instance(&self, _index: usize, _seed: u64) -> Result<EchoEnv, EnvError> {
        Ok(EchoEnv::default())
    }
}

impl Environment for EchoEnv {
    fn reset(&mut self, out: &mut Transition) -> Result<(), EnvError> {
        self.steps = 0;
        out.obs_mut::<f32>(0)?[0] = 0.0;
        Ok(())
    }

    fn step(&mut self, action: &[TensorBuf], out: &mut Transition) -> Result<(), EnvError> {
        let value = action[0].as_slice::<u8>()?[0].min(MAX_ACTION);
        self.steps += 1;
        out.obs_mut::<f32>(0)?[0] = f32::from(value);
        out.reward = f32::from(value);
        out.done = self.steps >= EPISODE_LEN;
        if out.done {
            self.steps = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use space::SpaceRegistry;

    #[test]
    fn episode_ends_and_restarts() {
        let registry = SpaceRegistry::new(Echo.spaces().unwrap()).unwrap();
        let mut out = Transition::for_registry(&registry);
        let mut action = vec![TensorBuf::zeroed(space::Dtype::Uint8, 1)];
        action[0].as_mut_slice::<u8>().unwrap()[0] = 5;

        let mut env = EchoEnv::default();
        env.reset(&mut out).unwrap();
        for step in 1..=EPISODE_LEN {
            out.clear();
            env.step(&action, &mut out).unwrap();
            assert_eq!(out.reward, 5.0);
            assert_eq!(out.done, step == EPISODE_LEN);
        }
        out.clear();
        env.step(&action, &mut out).unwrap();
        assert!(!out.done);
    }
}
