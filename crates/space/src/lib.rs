#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
//! # Space descriptors
//!
//! Describes the tensors an environment pool consumes and produces. A
//! [`Space`] is the validated, semantic form: a name, the [`SpaceKind`] it
//! belongs to, a [`SpaceType`], a [`Dtype`], a shape and a pair of [`Scalar`]
//! bounds. [`RawSpace`] is the fixed-size `#[repr(C)]` record that crosses the
//! C ABI; [`Space::encode`] and [`RawSpace::decode`] convert between the two.
//!
//! [`SpaceRegistry`] groups the spaces of one pool by kind and answers the
//! two-call discovery protocol (count first, then fill a caller-sized buffer).
//! [`TensorBuf`] is an aligned byte buffer sized from a space, used for
//! per-instance observations, infos and frames.

use thiserror::Error;

pub mod dtype;
pub mod raw;
pub mod registry;
pub mod space;
pub mod tensor;

pub use dtype::{Dtype, Scalar, SpaceKind, SpaceType};
pub use raw::RawSpace;
pub use registry::SpaceRegistry;
pub use space::{Space, BOUND_BYTES, MAX_NAME_LEN, MAX_NDIM};
pub use tensor::{Element, TensorBuf};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpaceError {
    #[error("space name is {len} bytes, at most {max} fit")]
    NameTooLong { len: usize, max: usize },
    #[error("space name must be UTF-8 without interior NUL bytes")]
    InvalidName,
    #[error("space name is not NUL-terminated")]
    NameNotTerminated,
    #[error("{ndim} dimensions, at most {max} are supported")]
    TooManyDims { ndim: i64, max: usize },
    #[error("axis {axis} has invalid extent {extent}")]
    InvalidExtent { axis: usize, extent: i64 },
    #[error("unknown {field} code {code}")]
    UnknownCode { field: &'static str, code: i32 },
    #[error("bound has dtype {found}, space has dtype {expected}")]
    BoundDtype { expected: Dtype, found: Dtype },
    #[error("discrete spaces need an integer dtype, got {0}")]
    DiscreteFloat(Dtype),
    #[error("low bound is greater than high bound")]
    BoundsInverted,
    #[error("duplicate {kind} space `{name}`")]
    DuplicateName { kind: SpaceKind, name: String },
    #[error("buffer holds {capacity} descriptors, {count} needed")]
    BufferTooSmall { capacity: usize, count: usize },
    #[error("buffer is {actual} bytes, expected {expected}")]
    ByteLength { expected: usize, actual: usize },
    #[error("tensor has dtype {actual}, {requested} requested")]
    DtypeMismatch { actual: Dtype, requested: Dtype },
}
