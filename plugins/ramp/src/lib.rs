//! `libenv` symbols for the [`envs::Ramp`] family, plus one extra export
//! used to check that a loader can resolve symbols outside the `libenv_*`
//! set.

use std::os::raw::c_int;

libenv::export_env!(envs::Ramp);

/// Returns its argument.
#[no_mangle]
pub extern "C" fn special_function(x: c_int) -> c_int {
    x
}
