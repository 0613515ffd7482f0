//! Generic bodies of the exported `libenv_*` functions.
//!
//! [`export_env!`](crate::export_env) instantiates these for one family.
//! Every function runs under `catch_unwind`; a panic is logged and turned
//! into the function's failure value.

use std::any::Any;
use std::ffi::{c_char, c_void, CStr};
use std::os::raw::c_int;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::slice;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use space::{RawSpace, SpaceKind, SpaceRegistry};
use tracing::{error, warn};
use vecenv::{ActionBatch, EnvFamily, Pool, PoolError, StepBatch, StepOutput};

use crate::host;
use crate::options::options_from_raw;
use crate::raw::{
    LibenvVenv, RawOptions, RawStep, LIBENV_ERR_BUSY, LIBENV_ERR_CAPACITY, LIBENV_ERR_INTERNAL, LIBENV_ERR_LAYOUT,
    LIBENV_ERR_NULL, LIBENV_ERR_STATE, LIBENV_OK,
};

/// Byte length of every per-instance buffer, by kind.
struct Layout {
    num_envs: usize,
    obs: Vec<usize>,
    info: Vec<usize>,
    action: Vec<usize>,
}

impl Layout {
    fn new(registry: &SpaceRegistry, num_envs: usize) -> Self {
        Self {
            num_envs,
            obs: registry.byte_lens(SpaceKind::Observation),
            info: registry.byte_lens(SpaceKind::Info),
            action: registry.byte_lens(SpaceKind::Action),
        }
    }
}

struct Session<F: EnvFamily> {
    pool: Pool<F>,
    layout: Layout,
    /// Destination handed to `step_async`, written by `step_wait`.
    pending: Option<RawStep>,
}

/// What a `libenv_venv *` points to.
pub struct Handle<F: EnvFamily> {
    session: Mutex<Session<F>>,
}

impl<F: EnvFamily> Handle<F> {
    fn new(pool: Pool<F>) -> Self {
        let layout = Layout::new(pool.registry(), pool.num_envs());
        Self {
            session: Mutex::new(Session {
                pool,
                layout,
                pending: None,
            }),
        }
    }
}

fn panic_text(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

fn guard<T>(what: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        error!("{what} panicked: {}", panic_text(panic.as_ref()));
        fallback
    })
}

fn status(what: &str, err: &PoolError) -> c_int {
    match err {
        PoolError::AlreadyStepping | PoolError::NotStepping | PoolError::ClosedWhileStepping => {
            host::contract_violation(&format!("{what}: {err}"));
            LIBENV_ERR_STATE
        }
        PoolError::Layout { .. } | PoolError::Space(_) => {
            warn!("{what}: {err}");
            LIBENV_ERR_LAYOUT
        }
        _ => {
            error!("{what}: {err}");
            LIBENV_ERR_INTERNAL
        }
    }
}

/// Locks the handle and runs `f`, or reports why it could not.
unsafe fn with_session<F: EnvFamily>(
    env: *mut LibenvVenv,
    what: &str,
    f: impl FnOnce(&mut Session<F>) -> c_int,
) -> c_int {
    guard(what, LIBENV_ERR_INTERNAL, || {
        let Some(handle) = env.cast::<Handle<F>>().as_ref() else {
            host::contract_violation(&format!("{what} on a null handle"));
            return LIBENV_ERR_NULL;
        };
        let Some(mut session) = handle.session.try_lock() else {
            host::contract_violation(&format!("{what} while another call holds the handle"));
            return LIBENV_ERR_BUSY;
        };
        f(&mut session)
    })
}

/// Borrows `lens.len() * n` caller buffers from a pointer table, or `None`
/// if the table or any entry is null.
unsafe fn rows<'a>(table: *mut *mut c_void, lens: &[usize], n: usize) -> Option<Vec<&'a mut [u8]>> {
    let total = lens.len() * n;
    if total == 0 {
        return Some(Vec::new());
    }
    if table.is_null() {
        return None;
    }
    slice::from_raw_parts(table, total)
        .iter()
        .enumerate()
        .map(|(i, &p)| match lens[i / n] {
            0 => Some(<&mut [u8]>::default()),
            len => (!p.is_null()).then(|| slice::from_raw_parts_mut(p.cast::<u8>(), len)),
        })
        .collect()
}

/// Checks a caller's result buffers without touching them, so a bad set is
/// rejected before any instance moves.
unsafe fn check_step(what: &str, step: &RawStep, layout: &Layout) -> c_int {
    let n = layout.num_envs;
    if rows(step.obs, &layout.obs, n).is_none() || rows(step.infos, &layout.info, n).is_none() {
        host::contract_violation(&format!("{what}: null observation or info buffer"));
        return LIBENV_ERR_NULL;
    }
    if step.rews.is_null() || step.dones.is_null() {
        host::contract_violation(&format!("{what}: null reward or done buffer"));
        return LIBENV_ERR_NULL;
    }
    if step.rews.align_offset(std::mem::align_of::<f32>()) != 0 {
        warn!("{what}: misaligned reward buffer");
        return LIBENV_ERR_LAYOUT;
    }
    LIBENV_OK
}

unsafe fn write_step(what: &str, batch: &StepBatch, layout: &Layout, step: &RawStep) -> c_int {
    let checked = check_step(what, step, layout);
    if checked != LIBENV_OK {
        return checked;
    }
    let n = layout.num_envs;
    let (Some(obs), Some(infos)) = (rows(step.obs, &layout.obs, n), rows(step.infos, &layout.info, n)) else {
        return LIBENV_ERR_NULL;
    };
    let mut out = StepOutput {
        obs,
        rewards: slice::from_raw_parts_mut(step.rews, n),
        dones: slice::from_raw_parts_mut(step.dones, n),
        infos,
        failures: (!step.failures.is_null()).then(|| slice::from_raw_parts_mut(step.failures, n)),
    };
    match batch.copy_into(&mut out) {
        Ok(()) => LIBENV_OK,
        Err(e) => status(what, &e),
    }
}

unsafe fn build<F: EnvFamily>(num_envs: c_int, options: *const RawOptions) -> Result<Handle<F>> {
    let num_envs = usize::try_from(num_envs)
        .ok()
        .filter(|&n| n > 0)
        .with_context(|| format!("num_envs must be positive, got {num_envs}"))?;
    let options = options_from_raw(options).context("malformed options")?;
    let pool = Pool::<F>::make_with(num_envs, &options, host::config().num_threads)
        .with_context(|| format!("creating a {} pool of {num_envs}", F::NAME))?;
    Ok(Handle::new(pool))
}

/// `libenv_make`: a new pool, or null on any failure.
///
/// # Safety
///
/// `options` is null or points to a valid [`RawOptions`].
pub unsafe fn make<F: EnvFamily>(num_envs: c_int, options: *const RawOptions) -> *mut LibenvVenv {
    guard("libenv_make", ptr::null_mut(), || match build::<F>(num_envs, options) {
        Ok(handle) => Box::into_raw(Box::new(handle)).cast(),
        Err(e) => {
            error!(family = F::NAME, "libenv_make failed: {e:#}");
            ptr::null_mut()
        }
    })
}

/// `libenv_get_spaces`: with a null `out`, the number of descriptors of
/// `kind`; otherwise writes them and returns the count, or
/// [`LIBENV_ERR_CAPACITY`] without writing if `capacity` is too small. An
/// unknown `kind` yields 0.
///
/// # Safety
///
/// `env` came from `make` of the same family and is not closed; `out` is
/// null or valid for `capacity` records.
pub unsafe fn get_spaces<F: EnvFamily>(
    env: *mut LibenvVenv,
    kind: c_int,
    out: *mut RawSpace,
    capacity: c_int,
) -> c_int {
    with_session::<F>(env, "libenv_get_spaces", |session| {
        let Some(kind) = SpaceKind::from_code(kind) else {
            return 0;
        };
        let registry = session.pool.registry();
        let count = registry.count(kind);
        let reported = c_int::try_from(count).unwrap_or(c_int::MAX);
        if out.is_null() {
            return reported;
        }
        if !matches!(usize::try_from(capacity), Ok(c) if c >= count) {
            warn!(%kind, count, capacity, "libenv_get_spaces: buffer too small");
            return LIBENV_ERR_CAPACITY;
        }
        match registry.fill(kind, slice::from_raw_parts_mut(out, count)) {
            Ok(_) => reported,
            Err(_) => LIBENV_ERR_CAPACITY,
        }
    })
}

/// `libenv_reset`: resets every instance and writes the initial results.
///
/// # Safety
///
/// `env` as for [`get_spaces`]; `step` points to a [`RawStep`] whose buffers
/// match the pool's spaces.
pub unsafe fn reset<F: EnvFamily>(env: *mut LibenvVenv, step: *mut RawStep) -> c_int {
    with_session::<F>(env, "libenv_reset", |session| {
        let Some(step) = step.as_ref() else {
            host::contract_violation("libenv_reset: null step");
            return LIBENV_ERR_NULL;
        };
        let checked = check_step("libenv_reset", step, &session.layout);
        if checked != LIBENV_OK {
            return checked;
        }
        match session.pool.reset() {
            Ok(batch) => write_step("libenv_reset", batch, &session.layout, step),
            Err(e) => status("libenv_reset", &e),
        }
    })
}

/// `libenv_step_async`: copies one action per (action space, instance) from
/// `acts[space * num_envs + env]` and starts the step. Results land in `step`
/// during `libenv_step_wait`.
///
/// # Safety
///
/// `env` as for [`get_spaces`]; `acts` holds valid pointers to action
/// buffers; `step` stays valid until the matching `libenv_step_wait`.
pub unsafe fn step_async<F: EnvFamily>(env: *mut LibenvVenv, acts: *const *const c_void, step: *mut RawStep) -> c_int {
    with_session::<F>(env, "libenv_step_async", |session| {
        let Some(step) = step.as_ref() else {
            host::contract_violation("libenv_step_async: null step");
            return LIBENV_ERR_NULL;
        };
        if session.pending.is_some() {
            host::contract_violation("libenv_step_async: a step is already in flight");
            return LIBENV_ERR_STATE;
        }
        let checked = check_step("libenv_step_async", step, &session.layout);
        if checked != LIBENV_OK {
            return checked;
        }
        let n = session.layout.num_envs;
        let lens = &session.layout.action;
        let total = lens.len() * n;
        let buffers = if total == 0 {
            Some(Vec::new())
        } else if acts.is_null() {
            None
        } else {
            slice::from_raw_parts(acts, total)
                .iter()
                .enumerate()
                .map(|(i, &p)| match lens[i / n] {
                    0 => Some(<&[u8]>::default()),
                    len => (!p.is_null()).then(|| slice::from_raw_parts(p.cast::<u8>(), len)),
                })
                .collect::<Option<Vec<_>>>()
        };
        let Some(buffers) = buffers else {
            host::contract_violation("libenv_step_async: null action buffer");
            return LIBENV_ERR_NULL;
        };
        match session.pool.step_async(&ActionBatch::new(buffers)) {
            Ok(()) => {
                session.pending = Some(*step);
                LIBENV_OK
            }
            Err(e) => status("libenv_step_async", &e),
        }
    })
}

/// `libenv_step_wait`: blocks until the step finishes and writes its results.
///
/// # Safety
///
/// `env` as for [`get_spaces`]; the `step` given to `libenv_step_async` is
/// still valid.
pub unsafe fn step_wait<F: EnvFamily>(env: *mut LibenvVenv) -> c_int {
    with_session::<F>(env, "libenv_step_wait", |session| {
        let Some(step) = session.pending.take() else {
            host::contract_violation("libenv_step_wait: no step in flight");
            return LIBENV_ERR_STATE;
        };
        match session.pool.step_wait() {
            Ok(batch) => write_step("libenv_step_wait", batch, &session.layout, &step),
            Err(e) => status("libenv_step_wait", &e),
        }
    })
}

/// `libenv_render`: one frame per instance for the render space `mode`.
///
/// # Safety
///
/// `env` as for [`get_spaces`]; `mode` is a NUL-terminated string; `frames`
/// holds `num_envs` pointers to buffers sized for the render space.
pub unsafe fn render<F: EnvFamily>(env: *mut LibenvVenv, mode: *const c_char, frames: *mut *mut c_void) -> bool {
    guard("libenv_render", false, || {
        let Some(handle) = env.cast::<Handle<F>>().as_ref() else {
            host::contract_violation("libenv_render on a null handle");
            return false;
        };
        if mode.is_null() || frames.is_null() {
            host::contract_violation("libenv_render: null mode or frames");
            return false;
        }
        let Ok(mode) = CStr::from_ptr(mode).to_str() else {
            warn!("libenv_render: mode is not UTF-8");
            return false;
        };
        let Some(mut session) = handle.session.try_lock() else {
            host::contract_violation("libenv_render while another call holds the handle");
            return false;
        };
        let session = &mut *session;
        if session.pending.is_some() {
            host::contract_violation("libenv_render: a step is in flight");
            return false;
        }
        let targets = slice::from_raw_parts(frames, session.layout.num_envs);
        if targets.iter().any(|p| p.is_null()) {
            host::contract_violation("libenv_render: null frame buffer");
            return false;
        }
        match session.pool.render(mode) {
            Ok(rendered) => {
                for (frame, &dst) in rendered.iter().zip(targets) {
                    slice::from_raw_parts_mut(dst.cast::<u8>(), frame.len()).copy_from_slice(frame.as_bytes());
                }
                true
            }
            Err(e) => {
                warn!(family = F::NAME, "libenv_render: {e}");
                false
            }
        }
    })
}

/// `libenv_close`: destroys the pool. A step still in flight is joined
/// first and reported as a contract violation.
///
/// # Safety
///
/// `env` came from `make` of the same family, is not closed, and no other
/// call on it is running.
pub unsafe fn close<F: EnvFamily>(env: *mut LibenvVenv) {
    guard("libenv_close", (), || {
        if env.is_null() {
            host::contract_violation("libenv_close on a null handle");
            return;
        }
        let handle = Box::from_raw(env.cast::<Handle<F>>());
        let session = handle.session.into_inner();
        if let Err(e) = session.pool.close() {
            host::contract_violation(&format!("libenv_close: {e}"));
        }
    });
}
