use std::ffi::{c_void, CString};
use std::os::raw::c_int;
use std::ptr;
use std::sync::{Barrier, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use envs::{Echo, GuessNumber, Ramp};
use libenv::abi;
use libenv::options::OwnedRawOptions;
use libenv::raw::{
    LibenvVenv, RawSpace, RawStep, LIBENV_ERR_BUSY, LIBENV_ERR_CAPACITY, LIBENV_ERR_LAYOUT, LIBENV_ERR_NULL,
    LIBENV_ERR_STATE, LIBENV_OK,
};
use space::{Scalar, Space, SpaceError, SpaceKind, TensorBuf};
use vecenv::{EnvError, EnvFamily, Environment, OptionsReader, Transition};

/// Caller-side result buffers, laid out the way a C caller would.
struct Results {
    num_envs: usize,
    obs: Vec<Vec<u8>>,
    infos: Vec<Vec<u8>>,
    obs_ptrs: Vec<*mut c_void>,
    info_ptrs: Vec<*mut c_void>,
    rews: Vec<f32>,
    dones: Vec<u8>,
    failures: Vec<u8>,
}

impl Results {
    unsafe fn for_env<F: EnvFamily>(env: *mut LibenvVenv, num_envs: usize) -> Self {
        let buffers = |kind| {
            spaces::<F>(env, kind)
                .iter()
                .flat_map(|s| vec![vec![0u8; s.byte_len()]; num_envs])
                .collect::<Vec<_>>()
        };
        Self {
            num_envs,
            obs: buffers(SpaceKind::Observation),
            infos: buffers(SpaceKind::Info),
            obs_ptrs: Vec::new(),
            info_ptrs: Vec::new(),
            rews: vec![-1.0; num_envs],
            dones: vec![9; num_envs],
            failures: vec![9; num_envs],
        }
    }

    fn raw(&mut self) -> RawStep {
        self.obs_ptrs = self.obs.iter_mut().map(|b| b.as_mut_ptr().cast()).collect();
        self.info_ptrs = self.infos.iter_mut().map(|b| b.as_mut_ptr().cast()).collect();
        RawStep {
            obs: self.obs_ptrs.as_mut_ptr(),
            rews: self.rews.as_mut_ptr(),
            dones: self.dones.as_mut_ptr(),
            infos: self.info_ptrs.as_mut_ptr(),
            failures: self.failures.as_mut_ptr(),
        }
    }

    fn obs(&self, space: usize, env: usize) -> &[u8] {
        &self.obs[space * self.num_envs + env]
    }

    fn info_i32(&self, space: usize, env: usize) -> i32 {
        i32::from_ne_bytes(self.infos[space * self.num_envs + env][..4].try_into().unwrap())
    }
}

unsafe fn spaces<F: EnvFamily>(env: *mut LibenvVenv, kind: SpaceKind) -> Vec<Space> {
    let count = abi::get_spaces::<F>(env, kind.code(), ptr::null_mut(), 0);
    let mut out = vec![RawSpace::default(); usize::try_from(count).unwrap()];
    assert_eq!(abi::get_spaces::<F>(env, kind.code(), out.as_mut_ptr(), count), count);
    out.iter().map(|raw| raw.decode().unwrap()).collect()
}

/// Starts a step with one byte of action per instance and waits for it.
unsafe fn step<F: EnvFamily>(env: *mut LibenvVenv, actions: &[u8], results: &mut Results) -> c_int {
    let ptrs: Vec<*const c_void> = actions.iter().map(|a| ptr::from_ref(a).cast()).collect();
    let mut raw = results.raw();
    let status = abi::step_async::<F>(env, ptrs.as_ptr(), &mut raw);
    if status != LIBENV_OK {
        return status;
    }
    abi::step_wait::<F>(env)
}

#[test]
fn echo_round_trip() {
    unsafe {
        let env = abi::make::<Echo>(4, ptr::null());
        assert!(!env.is_null());
        assert_eq!(spaces::<Echo>(env, SpaceKind::Observation).len(), 1);
        assert_eq!(spaces::<Echo>(env, SpaceKind::Action).len(), 1);
        assert!(spaces::<Echo>(env, SpaceKind::Info).is_empty());
        assert!(spaces::<Echo>(env, SpaceKind::Render).is_empty());

        let mut results = Results::for_env::<Echo>(env, 4);
        let mut raw = results.raw();
        assert_eq!(abi::reset::<Echo>(env, &mut raw), LIBENV_OK);
        assert_eq!(results.rews, vec![0.0; 4]);
        assert_eq!(results.dones, vec![0; 4]);
        assert_eq!(results.failures, vec![0; 4]);

        assert_eq!(step::<Echo>(env, &[0, 1, 2, 3], &mut results), LIBENV_OK);
        assert_eq!(results.rews, vec![0.0, 1.0, 2.0, 3.0]);
        for (i, expected) in [0.0f32, 1.0, 2.0, 3.0].iter().enumerate() {
            assert_eq!(results.obs(0, i), &expected.to_ne_bytes()[..]);
        }
        abi::close::<Echo>(env);
    }
}

#[test]
fn space_queries_respect_capacity() {
    unsafe {
        let env = abi::make::<Ramp>(2, ptr::null());
        assert!(!env.is_null());
        let kind = SpaceKind::Observation.code();
        assert_eq!(abi::get_spaces::<Ramp>(env, kind, ptr::null_mut(), 0), 3);

        let mut out = vec![RawSpace::default(); 2];
        assert_eq!(abi::get_spaces::<Ramp>(env, kind, out.as_mut_ptr(), 2), LIBENV_ERR_CAPACITY);
        assert!(out.iter().all(|raw| *raw == RawSpace::default()));

        let mut out = vec![RawSpace::default(); 5];
        assert_eq!(abi::get_spaces::<Ramp>(env, kind, out.as_mut_ptr(), 5), 3);
        assert_eq!(out[1].decode().unwrap().name(), "int32_obs");
        assert_eq!(out[3], RawSpace::default());

        assert_eq!(abi::get_spaces::<Ramp>(env, 0, ptr::null_mut(), 0), 0);
        assert_eq!(abi::get_spaces::<Ramp>(env, 99, out.as_mut_ptr(), 5), 0);
        abi::close::<Ramp>(env);
    }
}

#[test]
fn protocol_misuse_is_reported() {
    unsafe {
        let env = abi::make::<Echo>(2, ptr::null());
        let mut results = Results::for_env::<Echo>(env, 2);
        let mut raw = results.raw();
        assert_eq!(abi::reset::<Echo>(env, &mut raw), LIBENV_OK);
        assert_eq!(abi::step_wait::<Echo>(env), LIBENV_ERR_STATE);

        let actions = [1u8, 2];
        let ptrs: Vec<*const c_void> = actions.iter().map(|a| ptr::from_ref(a).cast()).collect();
        assert_eq!(abi::step_async::<Echo>(env, ptrs.as_ptr(), &mut raw), LIBENV_OK);
        assert_eq!(abi::step_async::<Echo>(env, ptrs.as_ptr(), &mut raw), LIBENV_ERR_STATE);
        assert_eq!(abi::reset::<Echo>(env, &mut raw), LIBENV_ERR_STATE);
        assert_eq!(abi::step_wait::<Echo>(env), LIBENV_OK);
        assert_eq!(results.rews, vec![1.0, 2.0]);
        abi::close::<Echo>(env);
    }
}

#[test]
fn null_arguments_are_rejected() {
    unsafe {
        assert!(abi::make::<Echo>(0, ptr::null()).is_null());
        assert!(abi::make::<Echo>(-3, ptr::null()).is_null());
        assert_eq!(
            abi::get_spaces::<Echo>(ptr::null_mut(), SpaceKind::Action.code(), ptr::null_mut(), 0),
            LIBENV_ERR_NULL
        );
        assert_eq!(abi::step_wait::<Echo>(ptr::null_mut()), LIBENV_ERR_NULL);
        abi::close::<Echo>(ptr::null_mut());

        let env = abi::make::<Echo>(2, ptr::null());
        assert_eq!(abi::reset::<Echo>(env, ptr::null_mut()), LIBENV_ERR_NULL);

        let mut results = Results::for_env::<Echo>(env, 2);
        let mut raw = results.raw();
        assert_eq!(abi::step_async::<Echo>(env, ptr::null(), &mut raw), LIBENV_ERR_NULL);

        let action = 1u8;
        let ptrs: [*const c_void; 2] = [ptr::from_ref(&action).cast(), ptr::null()];
        assert_eq!(abi::step_async::<Echo>(env, ptrs.as_ptr(), &mut raw), LIBENV_ERR_NULL);

        // the rejected calls left the pool idle
        assert_eq!(abi::reset::<Echo>(env, &mut raw), LIBENV_OK);
        abi::close::<Echo>(env);
    }
}

#[test]
fn misaligned_rewards_are_a_layout_error() {
    unsafe {
        let env = abi::make::<Echo>(1, ptr::null());
        let mut results = Results::for_env::<Echo>(env, 1);
        let mut raw = results.raw();
        let mut bytes = [0u8; 16];
        let base = bytes.as_mut_ptr();
        let odd = if base.align_offset(4) == 0 { base.add(1) } else { base };
        raw.rews = odd.cast();
        assert_eq!(abi::reset::<Echo>(env, &mut raw), LIBENV_ERR_LAYOUT);
        abi::close::<Echo>(env);
    }
}

#[test]
fn failures_buffer_is_optional() {
    unsafe {
        let env = abi::make::<Echo>(2, ptr::null());
        let mut results = Results::for_env::<Echo>(env, 2);
        let mut raw = results.raw();
        raw.failures = ptr::null_mut();
        assert_eq!(abi::reset::<Echo>(env, &mut raw), LIBENV_OK);
        assert_eq!(results.failures, vec![9, 9]);
        abi::close::<Echo>(env);
    }
}

#[test]
fn creation_options_reach_the_family() {
    unsafe {
        let good = OwnedRawOptions::new().with_i32("num_bits", &[8]).with_i32("seed", &[7]);
        let env = abi::make::<GuessNumber>(3, &good.as_raw());
        assert!(!env.is_null());
        abi::close::<GuessNumber>(env);

        let conflicting = OwnedRawOptions::new()
            .with_i32("num_bits", &[8])
            .with_i32("n", &[1, 2, 3]);
        assert!(abi::make::<GuessNumber>(3, &conflicting.as_raw()).is_null());

        let unknown = OwnedRawOptions::new().with_i32("bogus", &[1]);
        assert!(abi::make::<Ramp>(1, &unknown.as_raw()).is_null());
    }
}

#[test]
fn ramp_steps_and_renders() {
    unsafe {
        let n = 3;
        let env = abi::make::<Ramp>(3, ptr::null());
        let mut results = Results::for_env::<Ramp>(env, n);
        let mut raw = results.raw();
        assert_eq!(abi::reset::<Ramp>(env, &mut raw), LIBENV_OK);
        assert_eq!(results.obs(0, 2), &[0u8, 1, 2, 3, 4, 5][..]);

        for _ in 0..2 {
            assert_eq!(step::<Ramp>(env, &[0, 1, 2], &mut results), LIBENV_OK);
        }
        assert_eq!(results.rews, vec![0.0, 2.0, 4.0]);
        assert_eq!((0..n).map(|i| results.info_i32(0, i)).collect::<Vec<_>>(), vec![0, 2, 4]);

        let frame_len = spaces::<Ramp>(env, SpaceKind::Render)[0].byte_len();
        let mut frames = vec![vec![0u8; frame_len]; n];
        let mut frame_ptrs: Vec<*mut c_void> = frames.iter_mut().map(|f| f.as_mut_ptr().cast()).collect();
        let mode = CString::new("rgb_array").unwrap();
        assert!(abi::render::<Ramp>(env, mode.as_ptr(), frame_ptrs.as_mut_ptr()));
        for (i, frame) in frames.iter().enumerate() {
            let expected = i32::try_from(2 * i).unwrap().to_ne_bytes();
            assert!(frame.chunks(4).all(|px| px == &expected[..]));
        }

        let other = CString::new("human").unwrap();
        assert!(!abi::render::<Ramp>(env, other.as_ptr(), frame_ptrs.as_mut_ptr()));
        abi::close::<Ramp>(env);
    }
}

#[test]
fn close_while_stepping_still_releases() {
    unsafe {
        let env = abi::make::<Echo>(2, ptr::null());
        let mut results = Results::for_env::<Echo>(env, 2);
        let mut raw = results.raw();
        assert_eq!(abi::reset::<Echo>(env, &mut raw), LIBENV_OK);
        let actions = [3u8, 4];
        let ptrs: Vec<*const c_void> = actions.iter().map(|a| ptr::from_ref(a).cast()).collect();
        assert_eq!(abi::step_async::<Echo>(env, ptrs.as_ptr(), &mut raw), LIBENV_OK);
        abi::close::<Echo>(env);
    }
}

#[test]
fn bad_result_buffers_are_rejected_before_any_instance_moves() {
    unsafe {
        let env = abi::make::<Echo>(1, ptr::null());
        let mut results = Results::for_env::<Echo>(env, 1);
        let raw = results.raw();
        let mut good = raw;
        assert_eq!(abi::reset::<Echo>(env, &mut good), LIBENV_OK);

        let action = 1u8;
        let acts = [ptr::from_ref(&action).cast::<c_void>()];
        let mut no_obs = raw;
        no_obs.obs = ptr::null_mut();
        assert_eq!(abi::step_async::<Echo>(env, acts.as_ptr(), &mut no_obs), LIBENV_ERR_NULL);
        assert_eq!(abi::step_wait::<Echo>(env), LIBENV_ERR_STATE);
        let mut no_dones = raw;
        no_dones.dones = ptr::null_mut();
        assert_eq!(abi::step_async::<Echo>(env, acts.as_ptr(), &mut no_dones), LIBENV_ERR_NULL);

        for _ in 0..3 {
            assert_eq!(step::<Echo>(env, &[1], &mut results), LIBENV_OK);
        }
        let mut no_rews = results.raw();
        no_rews.rews = ptr::null_mut();
        assert_eq!(abi::reset::<Echo>(env, &mut no_rews), LIBENV_ERR_NULL);

        // neither the rejected steps nor the rejected reset touched the episode
        for i in 4..=16 {
            assert_eq!(step::<Echo>(env, &[1], &mut results), LIBENV_OK);
            assert_eq!(results.dones[0], u8::from(i == 16), "step {i}");
        }
        abi::close::<Echo>(env);
    }
}

/// Holds every step until the test lets it go.
struct Gated;

struct GatedEnv;

fn release() -> &'static Barrier {
    static RELEASE: OnceLock<Barrier> = OnceLock::new();
    RELEASE.get_or_init(|| Barrier::new(2))
}

impl EnvFamily for Gated {
    type Instance = GatedEnv;
    const NAME: &'static str = "gated";

    fn configure(_num_envs: usize, _options: &mut OptionsReader<'_>) -> Result<Self, EnvError> {
        Ok(Self)
    }

    fn spaces(&self) -> Result<Vec<Space>, SpaceError> {
        Ok(vec![
            Space::boxed("flag", SpaceKind::Observation, &[1], Scalar::U8(0), Scalar::U8(1))?,
            Space::boxed("go", SpaceKind::Action, &[1], Scalar::U8(0), Scalar::U8(1))?,
        ])
    }

    fn make_instance(&self, _index: usize, _seed: u64) -> Result<GatedEnv, EnvError> {
        Ok(GatedEnv)
    }
}

impl Environment for GatedEnv {
    fn reset(&mut self, _out: &mut Transition) -> Result<(), EnvError> {
        Ok(())
    }

    fn step(&mut self, _action: &[TensorBuf], _out: &mut Transition) -> Result<(), EnvError> {
        release().wait();
        Ok(())
    }
}

#[test]
fn overlapping_calls_on_one_handle_are_busy() {
    unsafe {
        let env = abi::make::<Gated>(1, ptr::null());
        assert!(!env.is_null());
        let mut results = Results::for_env::<Gated>(env, 1);
        let mut raw = results.raw();
        assert_eq!(abi::reset::<Gated>(env, &mut raw), LIBENV_OK);
        let action = 0u8;
        let acts = [ptr::from_ref(&action).cast::<c_void>()];
        assert_eq!(abi::step_async::<Gated>(env, acts.as_ptr(), &mut raw), LIBENV_OK);

        // step_wait holds the handle until the instance is released
        let addr = env as usize;
        let waiter = thread::spawn(move || loop {
            let status = abi::step_wait::<Gated>(addr as *mut LibenvVenv);
            if status != LIBENV_ERR_BUSY {
                return status;
            }
            thread::yield_now();
        });

        let action_kind = SpaceKind::Action.code();
        let deadline = Instant::now() + Duration::from_secs(10);
        while abi::get_spaces::<Gated>(env, action_kind, ptr::null_mut(), 0) != LIBENV_ERR_BUSY {
            assert!(Instant::now() < deadline, "step_wait never took the handle");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(abi::step_async::<Gated>(env, acts.as_ptr(), &mut raw), LIBENV_ERR_BUSY);

        release().wait();
        assert_eq!(waiter.join().unwrap(), LIBENV_OK);
        assert_eq!(abi::get_spaces::<Gated>(env, action_kind, ptr::null_mut(), 0), 1);
        abi::close::<Gated>(env);
    }
}
