use crate::dtype::SpaceKind;
use crate::raw::RawSpace;
use crate::space::Space;
use crate::SpaceError;

/// The spaces of one pool, grouped by kind in declaration order.
///
/// Index `i` of a kind always refers to the same space for the lifetime of
/// the registry. All queries take `&self`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpaceRegistry {
    by_kind: [Vec<Space>; 4],
}

impl SpaceRegistry {
    /// Groups `spaces` by their kind, keeping relative order.
    ///
    /// # Errors
    ///
    /// [`SpaceError::DuplicateName`] if two spaces of one kind share a name.
    pub fn new(spaces: impl IntoIterator<Item = Space>) -> Result<Self, SpaceError> {
        let mut registry = Self::default();
        for space in spaces {
            let bucket = &mut registry.by_kind[space.kind().index()];
            if bucket.iter().any(|s| s.name() == space.name()) {
                return Err(SpaceError::DuplicateName {
                    kind: space.kind(),
                    name: space.name().to_owned(),
                });
            }
            bucket.push(space);
        }
        Ok(registry)
    }

    #[must_use]
    pub fn spaces(&self, kind: SpaceKind) -> &[Space] {
        &self.by_kind[kind.index()]
    }

    /// Discovery call: how many descriptors a fill of `kind` writes.
    #[must_use]
    pub fn count(&self, kind: SpaceKind) -> usize {
        self.spaces(kind).len()
    }

    #[must_use]
    pub fn find(&self, kind: SpaceKind, name: &str) -> Option<(usize, &Space)> {
        self.spaces(kind)
            .iter()
            .enumerate()
            .find(|(_, s)| s.name() == name)
    }

    /// Byte length of each space of `kind`, in order.
    #[must_use]
    pub fn byte_lens(&self, kind: SpaceKind) -> Vec<usize> {
        self.spaces(kind).iter().map(Space::byte_len).collect()
    }

    /// Writes the descriptors of `kind` into the front of `out` and returns
    /// how many were written.
    ///
    /// # Errors
    ///
    /// [`SpaceError::BufferTooSmall`] if `out` cannot hold them all; `out` is
    /// left untouched in that case.
    pub fn fill(&self, kind: SpaceKind, out: &mut [RawSpace]) -> Result<usize, SpaceError> {
        let spaces = self.spaces(kind);
        if out.len() < spaces.len() {
            return Err(SpaceError::BufferTooSmall {
                capacity: out.len(),
                count: spaces.len(),
            });
        }
        for (slot, space) in out.iter_mut().zip(spaces) {
            *slot = space.encode();
        }
        Ok(spaces.len())
    }
}
