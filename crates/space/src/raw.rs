use crate::dtype::{Dtype, Scalar, SpaceKind, SpaceType};
use crate::space::{Space, BOUND_BYTES, MAX_NAME_LEN, MAX_NDIM};
use crate::SpaceError;

/// Fixed-size space descriptor as laid out at the C ABI.
///
/// ```c
/// struct libenv_space {
///     char    name[128];
///     int32_t kind;
///     int32_t type;
///     int32_t dtype;
///     int32_t ndim;
///     int32_t shape[16];
///     uint8_t low[4];
///     uint8_t high[4];
/// };
/// ```
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RawSpace {
    pub name: [u8; MAX_NAME_LEN],
    pub kind: i32,
    pub space_type: i32,
    pub dtype: i32,
    pub ndim: i32,
    pub shape: [i32; MAX_NDIM],
    pub low: [u8; BOUND_BYTES],
    pub high: [u8; BOUND_BYTES],
}

const _: () = assert!(std::mem::size_of::<RawSpace>() == 216);
const _: () = assert!(std::mem::align_of::<RawSpace>() == 4);

impl Default for RawSpace {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl RawSpace {
    /// The name up to its NUL terminator.
    ///
    /// # Errors
    ///
    /// [`SpaceError::NameNotTerminated`] if the buffer has no NUL,
    /// [`SpaceError::InvalidName`] if the bytes are not UTF-8.
    pub fn name(&self) -> Result<&str, SpaceError> {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .ok_or(SpaceError::NameNotTerminated)?;
        std::str::from_utf8(&self.name[..end]).map_err(|_| SpaceError::InvalidName)
    }

    /// Decodes and validates the record. Shape slots past `ndim` are ignored.
    ///
    /// # Errors
    ///
    /// Any discriminant that is not a known code, a negative or oversized
    /// `ndim`, a negative extent, or a combination [`Space::new`] rejects.
    pub fn decode(&self) -> Result<Space, SpaceError> {
        let name = self.name()?;
        let kind = SpaceKind::try_from(self.kind)?;
        let space_type = SpaceType::try_from(self.space_type)?;
        let dtype = Dtype::try_from(self.dtype)?;

        let ndim = usize::try_from(self.ndim)
            .ok()
            .filter(|&n| n <= MAX_NDIM)
            .ok_or(SpaceError::TooManyDims {
                ndim: i64::from(self.ndim),
                max: MAX_NDIM,
            })?;
        let shape = self.shape[..ndim]
            .iter()
            .enumerate()
            .map(|(axis, &extent)| {
                usize::try_from(extent).map_err(|_| SpaceError::InvalidExtent {
                    axis,
                    extent: i64::from(extent),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let low = Scalar::from_le_bytes(dtype, self.low);
        let high = Scalar::from_le_bytes(dtype, self.high);
        Space::new(name, kind, space_type, &shape, low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_shape_slots_are_ignored() {
        let space = Space::boxed("obs", SpaceKind::Observation, &[2, 3], Scalar::I32(0), Scalar::I32(1)).unwrap();
        let mut raw = space.encode();
        raw.shape[5] = 99;
        assert_eq!(raw.decode().unwrap().shape(), &[2, 3]);
    }

    #[test]
    fn unknown_discriminants_fail() {
        let mut raw = Space::boxed("a", SpaceKind::Action, &[1], Scalar::U8(0), Scalar::U8(1))
            .unwrap()
            .encode();
        raw.dtype = 9;
        assert_eq!(raw.decode(), Err(SpaceError::UnknownCode { field: "dtype", code: 9 }));
    }

    #[test]
    fn unterminated_name_fails() {
        let mut raw = RawSpace::default();
        raw.name = [b'x'; MAX_NAME_LEN];
        assert_eq!(raw.name(), Err(SpaceError::NameNotTerminated));
    }

    #[test]
    fn negative_ndim_fails() {
        let mut raw = Space::boxed("a", SpaceKind::Action, &[1], Scalar::U8(0), Scalar::U8(1))
            .unwrap()
            .encode();
        raw.ndim = -1;
        assert!(matches!(raw.decode(), Err(SpaceError::TooManyDims { ndim: -1, .. })));
    }

    #[test]
    fn bytes_are_stable() {
        let raw = Space::boxed("a", SpaceKind::Action, &[1], Scalar::U8(0), Scalar::U8(16))
            .unwrap()
            .encode();
        let bytes = bytemuck::bytes_of(&raw);
        assert_eq!(bytes.len(), 216);
        assert_eq!(bytes[0], b'a');
        // kind, type, dtype, ndim follow the name
        assert_eq!(&bytes[128..132], &2i32.to_ne_bytes());
        assert_eq!(&bytes[132..136], &1i32.to_ne_bytes());
        assert_eq!(&bytes[136..140], &1i32.to_ne_bytes());
        assert_eq!(&bytes[140..144], &1i32.to_ne_bytes());
        assert_eq!(&bytes[208..212], &[0, 0, 0, 0]);
        assert_eq!(&bytes[212..216], &[16, 0, 0, 0]);
    }
}
