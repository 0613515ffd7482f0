//! Closed enumerations carried by a space descriptor, and the tagged bound
//! value.
//!
//! Every enum has a fixed integer code used at the ABI. Code `0` is reserved
//! for "unused" and never decodes.

use std::fmt;

use crate::space::BOUND_BYTES;
use crate::SpaceError;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    Uint8,
    Int32,
    Float32,
}

impl Dtype {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Dtype::Uint8 => 1,
            Dtype::Int32 => 2,
            Dtype::Float32 => 3,
        }
    }

    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Dtype::Uint8 => 1,
            Dtype::Int32 | Dtype::Float32 => 4,
        }
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        match self {
            Dtype::Uint8 | Dtype::Int32 => true,
            Dtype::Float32 => false,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Dtype::Uint8 => "uint8",
            Dtype::Int32 => "int32",
            Dtype::Float32 => "float32",
        }
    }
}

impl TryFrom<i32> for Dtype {
    type Error = SpaceError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Dtype::Uint8),
            2 => Ok(Dtype::Int32),
            3 => Ok(Dtype::Float32),
            _ => Err(SpaceError::UnknownCode { field: "dtype", code }),
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the bounds of a space are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceType {
    /// Numeric tensor, every element within `[low, high]`.
    Box,
    /// Integer choice within `[low, high]`.
    Discrete,
}

impl SpaceType {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            SpaceType::Box => 1,
            SpaceType::Discrete => 2,
        }
    }
}

impl TryFrom<i32> for SpaceType {
    type Error = SpaceError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(SpaceType::Box),
            2 => Ok(SpaceType::Discrete),
            _ => Err(SpaceError::UnknownCode { field: "space type", code }),
        }
    }
}

/// Which interface of an environment a space describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceKind {
    Observation,
    Action,
    Info,
    Render,
}

impl SpaceKind {
    pub const ALL: [SpaceKind; 4] = [
        SpaceKind::Observation,
        SpaceKind::Action,
        SpaceKind::Info,
        SpaceKind::Render,
    ];

    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            SpaceKind::Observation => 1,
            SpaceKind::Action => 2,
            SpaceKind::Info => 3,
            SpaceKind::Render => 4,
        }
    }

    /// Dense index into per-kind tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            SpaceKind::Observation => 0,
            SpaceKind::Action => 1,
            SpaceKind::Info => 2,
            SpaceKind::Render => 3,
        }
    }

    /// Decodes an ABI code, `None` for anything unrecognized.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::try_from(code).ok()
    }
}

impl TryFrom<i32> for SpaceKind {
    type Error = SpaceError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(SpaceKind::Observation),
            2 => Ok(SpaceKind::Action),
            3 => Ok(SpaceKind::Info),
            4 => Ok(SpaceKind::Render),
            _ => Err(SpaceError::UnknownCode { field: "space kind", code }),
        }
    }
}

impl fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpaceKind::Observation => "observation",
            SpaceKind::Action => "action",
            SpaceKind::Info => "info",
            SpaceKind::Render => "render",
        })
    }
}

/// A single bound value tagged with its element type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    U8(u8),
    I32(i32),
    F32(f32),
}

impl Scalar {
    #[must_use]
    pub const fn dtype(self) -> Dtype {
        match self {
            Scalar::U8(_) => Dtype::Uint8,
            Scalar::I32(_) => Dtype::Int32,
            Scalar::F32(_) => Dtype::Float32,
        }
    }

    /// Fixed-width little-endian encoding. Narrow types are zero-extended.
    #[must_use]
    pub fn to_le_bytes(self) -> [u8; BOUND_BYTES] {
        match self {
            Scalar::U8(v) => [v, 0, 0, 0],
            Scalar::I32(v) => v.to_le_bytes(),
            Scalar::F32(v) => v.to_le_bytes(),
        }
    }

    /// Reinterprets a fixed-width bound according to `dtype`.
    #[must_use]
    pub fn from_le_bytes(dtype: Dtype, bytes: [u8; BOUND_BYTES]) -> Self {
        match dtype {
            Dtype::Uint8 => Scalar::U8(bytes[0]),
            Dtype::Int32 => Scalar::I32(i32::from_le_bytes(bytes)),
            Dtype::Float32 => Scalar::F32(f32::from_le_bytes(bytes)),
        }
    }

    /// Widened value, for ordering checks and range tests.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::U8(v) => f64::from(v),
            Scalar::I32(v) => f64::from(v),
            Scalar::F32(v) => f64::from(v),
        }
    }
}
