//! `#[repr(C)]` records and status codes shared with C callers.
//!
//! See `include/libenv.h` for the matching declarations.

use std::ffi::c_void;
use std::mem::size_of;
use std::os::raw::c_int;

pub use space::RawSpace;

pub const LIBENV_OK: c_int = 0;
/// A required pointer argument was null.
pub const LIBENV_ERR_NULL: c_int = -1;
/// The call is not valid in the pool's current state.
pub const LIBENV_ERR_STATE: c_int = -2;
/// A buffer count or length does not match the pool's spaces.
pub const LIBENV_ERR_LAYOUT: c_int = -3;
/// Another call on the same handle is in progress.
pub const LIBENV_ERR_BUSY: c_int = -4;
/// An output buffer cannot hold every descriptor.
pub const LIBENV_ERR_CAPACITY: c_int = -5;
/// Anything else, including a caught panic.
pub const LIBENV_ERR_INTERNAL: c_int = -6;

/// Capacity of an option name, including the terminating NUL.
pub const OPTION_NAME_LEN: usize = 128;

/// Opaque pool handle as seen from C.
#[repr(C)]
pub struct LibenvVenv {
    _private: [u8; 0],
}

/// One creation option: `count` values of `dtype` at `data`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawOption {
    pub name: [u8; OPTION_NAME_LEN],
    pub dtype: i32,
    pub count: i32,
    pub data: *const c_void,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawOptions {
    pub items: *const RawOption,
    pub count: i32,
}

/// Caller-owned result buffers.
///
/// `obs[space * num_envs + env]` points to one observation buffer, `infos`
/// likewise for info spaces. `rews` and `dones` hold `num_envs` entries.
/// `failures` may be null.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawStep {
    pub obs: *mut *mut c_void,
    pub rews: *mut f32,
    pub dones: *mut u8,
    pub infos: *mut *mut c_void,
    pub failures: *mut u8,
}

const PTR: usize = size_of::<*const c_void>();
const _: () = assert!(size_of::<RawOption>() == OPTION_NAME_LEN + 8 + PTR);
const _: () = assert!(size_of::<RawOptions>() == 2 * PTR);
const _: () = assert!(size_of::<RawStep>() == 5 * PTR);
const _: () = assert!(size_of::<RawSpace>() == 216);

impl RawOption {
    /// Builds an option over caller-owned data. The name is truncated to
    /// fit and always NUL-terminated.
    #[must_use]
    pub fn new(name: &str, dtype: i32, count: i32, data: *const c_void) -> Self {
        let mut raw = Self {
            name: [0; OPTION_NAME_LEN],
            dtype,
            count,
            data,
        };
        let len = name.len().min(OPTION_NAME_LEN - 1);
        raw.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        raw
    }
}
