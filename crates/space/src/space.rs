use crate::dtype::{Dtype, Scalar, SpaceKind, SpaceType};
use crate::raw::RawSpace;
use crate::SpaceError;

/// Capacity of the name buffer, including the terminating NUL.
pub const MAX_NAME_LEN: usize = 128;
/// Capacity of the shape array.
pub const MAX_NDIM: usize = 16;
/// Width of an encoded bound: the size of the largest supported dtype.
pub const BOUND_BYTES: usize = 4;

const _: () = assert!(BOUND_BYTES == Dtype::Int32.size());

/// A validated tensor description.
///
/// Construction enforces everything [`RawSpace`] cannot express: the name fits
/// the fixed buffer, the shape fits the fixed array, and both bounds carry the
/// space's dtype. Once built a `Space` is immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct Space {
    name: String,
    kind: SpaceKind,
    space_type: SpaceType,
    dtype: Dtype,
    shape: Vec<usize>,
    low: Scalar,
    high: Scalar,
}

impl Space {
    /// Builds a space, taking the dtype from the bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SpaceError::NameTooLong`] or [`SpaceError::InvalidName`] for a
    /// name that cannot be stored NUL-terminated in [`MAX_NAME_LEN`] bytes,
    /// [`SpaceError::TooManyDims`] / [`SpaceError::InvalidExtent`] for a shape
    /// that does not fit the ABI record, and [`SpaceError::BoundDtype`],
    /// [`SpaceError::DiscreteFloat`] or [`SpaceError::BoundsInverted`] for
    /// inconsistent bounds.
    pub fn new(
        name: impl Into<String>,
        kind: SpaceKind,
        space_type: SpaceType,
        shape: &[usize],
        low: Scalar,
        high: Scalar,
    ) -> Result<Self, SpaceError> {
        let name = name.into();
        if name.len() > MAX_NAME_LEN - 1 {
            return Err(SpaceError::NameTooLong {
                len: name.len(),
                max: MAX_NAME_LEN - 1,
            });
        }
        if name.is_empty() || name.bytes().any(|b| b == 0) {
            return Err(SpaceError::InvalidName);
        }
        if shape.len() > MAX_NDIM {
            return Err(SpaceError::TooManyDims {
                ndim: i64::try_from(shape.len()).unwrap_or(i64::MAX),
                max: MAX_NDIM,
            });
        }
        for (axis, &extent) in shape.iter().enumerate() {
            if i32::try_from(extent).is_err() {
                return Err(SpaceError::InvalidExtent {
                    axis,
                    extent: i64::try_from(extent).unwrap_or(i64::MAX),
                });
            }
        }

        let dtype = low.dtype();
        if high.dtype() != dtype {
            return Err(SpaceError::BoundDtype {
                expected: dtype,
                found: high.dtype(),
            });
        }
        if space_type == SpaceType::Discrete && !dtype.is_integer() {
            return Err(SpaceError::DiscreteFloat(dtype));
        }
        if low.as_f64() > high.as_f64() {
            return Err(SpaceError::BoundsInverted);
        }

        Ok(Self {
            name,
            kind,
            space_type,
            dtype,
            shape: shape.to_vec(),
            low,
            high,
        })
    }

    /// Shorthand for a [`SpaceType::Box`] space.
    ///
    /// # Errors
    ///
    /// See [`Space::new`].
    pub fn boxed(
        name: impl Into<String>,
        kind: SpaceKind,
        shape: &[usize],
        low: Scalar,
        high: Scalar,
    ) -> Result<Self, SpaceError> {
        Self::new(name, kind, SpaceType::Box, shape, low, high)
    }

    /// Shorthand for a [`SpaceType::Discrete`] space.
    ///
    /// # Errors
    ///
    /// See [`Space::new`].
    pub fn discrete(
        name: impl Into<String>,
        kind: SpaceKind,
        shape: &[usize],
        low: Scalar,
        high: Scalar,
    ) -> Result<Self, SpaceError> {
        Self::new(name, kind, SpaceType::Discrete, shape, low, high)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    #[must_use]
    pub fn space_type(&self) -> SpaceType {
        self.space_type
    }

    #[must_use]
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[must_use]
    pub fn low(&self) -> Scalar {
        self.low
    }

    #[must_use]
    pub fn high(&self) -> Scalar {
        self.high
    }

    /// Number of elements; a zero-dimensional space holds one scalar.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Size in bytes of one buffer laid out against this space.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.element_count() * self.dtype.size()
    }

    /// Encodes into the fixed ABI record. Unused name bytes and shape slots
    /// are zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn encode(&self) -> RawSpace {
        let mut raw = RawSpace::default();
        raw.name[..self.name.len()].copy_from_slice(self.name.as_bytes());
        raw.kind = self.kind.code();
        raw.space_type = self.space_type.code();
        raw.dtype = self.dtype.code();
        // both checked against i32 range in `new`
        raw.ndim = self.shape.len() as i32;
        for (slot, &extent) in raw.shape.iter_mut().zip(&self.shape) {
            *slot = extent as i32;
        }
        raw.low = self.low.to_le_bytes();
        raw.high = self.high.to_le_bytes();
        raw
    }
}
