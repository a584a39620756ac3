//! Track which columns of a record were assigned since it was instantiated
//! or last saved.
//!
//! Creation scopes consult this set so that scope values never clobber an
//! attribute the record already changed (its own foreign key excepted).

/// A compact bitset over a schema's column positions `0..len`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedFields {
    len: usize,
    bits: Box<[u64]>,
}

impl ChangedFields {
    /// Create an empty (nothing changed) set for `len` columns.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        let words = len.div_ceil(64);
        Self {
            len,
            bits: vec![0u64; words].into_boxed_slice(),
        }
    }

    /// Number of columns represented by this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if the schema has no columns.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if no column is marked.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Mark a column position as changed. Out-of-range positions are ignored.
    pub fn mark(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w |= 1u64 << (idx % 64);
        }
    }

    /// Check whether a column position is marked.
    #[must_use]
    pub fn is_marked(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        self.bits
            .get(idx / 64)
            .is_some_and(|w| (w & (1u64 << (idx % 64))) != 0)
    }

    /// Marked positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|idx| self.is_marked(*idx))
    }

    /// Forget every mark (after a successful save).
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
    }
}
