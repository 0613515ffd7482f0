//! `libenv` symbols for the [`envs::Echo`] family.

libenv::export_env!(envs::Echo);
