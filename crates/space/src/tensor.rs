use crate::dtype::Dtype;
use crate::space::Space;
use crate::SpaceError;

/// Rust element types that map onto a [`Dtype`].
pub trait Element: bytemuck::Pod {
    const DTYPE: Dtype;
}

impl Element for u8 {
    const DTYPE: Dtype = Dtype::Uint8;
}

impl Element for i32 {
    const DTYPE: Dtype = Dtype::Int32;
}

impl Element for f32 {
    const DTYPE: Dtype = Dtype::Float32;
}

/// Owned tensor storage for one buffer of a space.
///
/// Backed by `u64` words so typed views never hit an alignment error,
/// whatever the dtype.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorBuf {
    words: Vec<u64>,
    len: usize,
    dtype: Dtype,
}

impl TensorBuf {
    #[must_use]
    pub fn zeroed(dtype: Dtype, elements: usize) -> Self {
        let len = elements * dtype.size();
        Self {
            words: vec![0; len.div_ceil(8)],
            len,
            dtype,
        }
    }

    #[must_use]
    pub fn for_space(space: &Space) -> Self {
        Self::zeroed(space.dtype(), space.element_count())
    }

    #[must_use]
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.len / self.dtype.size()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }

    /// Typed view of the elements.
    ///
    /// # Errors
    ///
    /// [`SpaceError::DtypeMismatch`] if `T` is not the buffer's dtype.
    pub fn as_slice<T: Element>(&self) -> Result<&[T], SpaceError> {
        self.check::<T>()?;
        Ok(bytemuck::cast_slice(self.as_bytes()))
    }

    /// Mutable typed view of the elements.
    ///
    /// # Errors
    ///
    /// [`SpaceError::DtypeMismatch`] if `T` is not the buffer's dtype.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T], SpaceError> {
        self.check::<T>()?;
        Ok(bytemuck::cast_slice_mut(self.as_bytes_mut()))
    }

    /// Overwrites the contents with `src`, which must match in length.
    ///
    /// # Errors
    ///
    /// [`SpaceError::ByteLength`] on a length mismatch; nothing is written.
    pub fn copy_from_bytes(&mut self, src: &[u8]) -> Result<(), SpaceError> {
        if src.len() != self.len {
            return Err(SpaceError::ByteLength {
                expected: self.len,
                actual: src.len(),
            });
        }
        self.as_bytes_mut().copy_from_slice(src);
        Ok(())
    }

    pub fn fill_zero(&mut self) {
        self.words.fill(0);
    }

    fn check<T: Element>(&self) -> Result<(), SpaceError> {
        if T::DTYPE == self.dtype {
            Ok(())
        } else {
            Err(SpaceError::DtypeMismatch {
                actual: self.dtype,
                requested: T::DTYPE,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_sized_uint8_buffer() {
        let mut t = TensorBuf::zeroed(Dtype::Uint8, 6);
        assert_eq!(t.len(), 6);
        t.as_mut_slice::<u8>().unwrap().copy_from_slice(&[0, 1, 2, 3, 4, 5]);
        assert_eq!(t.as_bytes(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn typed_view_checks_dtype() {
        let mut t = TensorBuf::zeroed(Dtype::Float32, 3);
        assert!(t.as_mut_slice::<f32>().is_ok());
        assert_eq!(
            t.as_slice::<i32>().unwrap_err(),
            SpaceError::DtypeMismatch { actual: Dtype::Float32, requested: Dtype::Int32 }
        );
    }

    #[test]
    fn f32_elements_land_as_native_bytes() {
        let mut t = TensorBuf::zeroed(Dtype::Float32, 2);
        t.as_mut_slice::<f32>().unwrap().copy_from_slice(&[1.5, -2.0]);
        let mut expected = Vec::new();
        expected.extend_from_slice(&1.5f32.to_ne_bytes());
        expected.extend_from_slice(&(-2.0f32).to_ne_bytes());
        assert_eq!(t.as_bytes(), expected.as_slice());
    }

    #[test]
    fn copy_rejects_wrong_length() {
        let mut t = TensorBuf::zeroed(Dtype::Int32, 2);
        assert_eq!(
            t.copy_from_bytes(&[1, 2, 3]),
            Err(SpaceError::ByteLength { expected: 8, actual: 3 })
        );
        assert!(t.as_bytes().iter().all(|&b| b == 0));
    }
}
