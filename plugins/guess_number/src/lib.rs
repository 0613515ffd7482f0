//! `libenv` symbols for the [`envs::GuessNumber`] family.
//!
//! Create with either `num_bits` (one `int32`, random secrets) or `n` (one
//! `int32` per instance, fixed secrets).

libenv::export_env!(envs::GuessNumber);
