#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! # libenv
//!
//! C ABI host for vectorized environment pools.
//!
//! An environment library is a `cdylib` that depends on this crate and
//! names its family once:
//!
//! ```rust,ignore
//! libenv::export_env!(envs::Ramp);
//! ```
//!
//! The macro emits the `libenv_*` symbols declared in `include/libenv.h`.
//! Each one forwards to the generic function of the same name in [`abi`],
//! which validates the caller's pointers, locks the handle and drives a
//! [`vecenv::Pool`].
//!
//! Process-wide settings come from the environment, see [`host`].
//!
//! ## Crates
//!
//! -   **[`space`]:** space descriptors, dtypes and typed tensors.
//! -   **[`vecenv`]:** the pool, its worker scheduler and the family traits.
//! -   **[`envs`]:** the bundled families `echo`, `guess_number` and `ramp`.

pub mod abi;
pub mod host;
pub mod options;
pub mod raw;

pub use envs;
pub use space;
pub use vecenv;

/// Emits the complete `libenv_*` symbol set for one [`vecenv::EnvFamily`].
///
/// Invoke it once per `cdylib`; the symbol names are fixed.
#[macro_export]
macro_rules! export_env {
    ($family:ty) => {
        #[no_mangle]
        pub extern "C" fn libenv_load() {
            $crate::host::load();
        }

        #[no_mangle]
        pub extern "C" fn libenv_unload() {
            $crate::host::unload();
        }

        /// # Safety
        ///
        /// See [`libenv::abi::make`].
        #[no_mangle]
        pub unsafe extern "C" fn libenv_make(
            num_envs: ::std::os::raw::c_int,
            options: *const $crate::raw::RawOptions,
        ) -> *mut $crate::raw::LibenvVenv {
            $crate::abi::make::<$family>(num_envs, options)
        }

        /// # Safety
        ///
        /// See [`libenv::abi::get_spaces`].
        #[no_mangle]
        pub unsafe extern "C" fn libenv_get_spaces(
            env: *mut $crate::raw::LibenvVenv,
            kind: ::std::os::raw::c_int,
            out: *mut $crate::raw::RawSpace,
            capacity: ::std::os::raw::c_int,
        ) -> ::std::os::raw::c_int {
            $crate::abi::get_spaces::<$family>(env, kind, out, capacity)
        }

        /// # Safety
        ///
        /// See [`libenv::abi::reset`].
        #[no_mangle]
        pub unsafe extern "C" fn libenv_reset(
            env: *mut $crate::raw::LibenvVenv,
            step: *mut $crate::raw::RawStep,
        ) -> ::std::os::raw::c_int {
            $crate::abi::reset::<$family>(env, step)
        }

        /// # Safety
        ///
        /// See [`libenv::abi::step_async`].
        #[no_mangle]
        pub unsafe extern "C" fn libenv_step_async(
            env: *mut $crate::raw::LibenvVenv,
            acts: *const *const ::std::ffi::c_void,
            step: *mut $crate::raw::RawStep,
        ) -> ::std::os::raw::c_int {
            $crate::abi::step_async::<$family>(env, acts, step)
        }

        /// # Safety
        ///
        /// See [`libenv::abi::step_wait`].
        #[no_mangle]
        pub unsafe extern "C" fn libenv_step_wait(env: *mut $crate::raw::LibenvVenv) -> ::std::os::raw::c_int {
            $crate::abi::step_wait::<$family>(env)
        }

        /// # Safety
        ///
        /// See [`libenv::abi::render`].
        #[no_mangle]
        pub unsafe extern "C" fn libenv_render(
            env: *mut $crate::raw::LibenvVenv,
            mode: *const ::std::ffi::c_char,
            frames: *mut *mut ::std::ffi::c_void,
        ) -> bool {
            $crate::abi::render::<$family>(env, mode, frames)
        }

        /// # Safety
        ///
        /// See [`libenv::abi::close`].
        #[no_mangle]
        pub unsafe extern "C" fn libenv_close(env: *mut $crate::raw::LibenvVenv) {
            $crate::abi::close::<$family>(env);
        }
    };
}
