/// Mapping from old column positions to new ones across one ALTER.
///
/// Stored (user) columns and virtual columns map in their own position
/// spaces; `None` means the old column is dropped. Columns of the new
/// schema with no preimage are the instantly added ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColMap {
    stored: Vec<Option<usize>>,
    virtual_: Vec<Option<usize>>,
}

impl ColMap {
    pub fn new(stored: Vec<Option<usize>>, virtual_: Vec<Option<usize>>) -> Self {
        Self { stored, virtual_ }
    }

    /// The no-op mapping of a schema with `n_stored` user columns and
    /// `n_virtual` virtual columns.
    pub fn identity(n_stored: usize, n_virtual: usize) -> Self {
        Self {
            stored: (0..n_stored).map(Some).collect(),
            virtual_: (0..n_virtual).map(Some).collect(),
        }
    }

    pub fn drop_stored(mut self, old: usize) -> Self {
        self.stored[old] = None;
        self
    }

    pub fn map_stored(mut self, old: usize, new: usize) -> Self {
        self.stored[old] = Some(new);
        self
    }

    pub fn n_old_stored(&self) -> usize {
        self.stored.len()
    }

    pub fn n_old_virtual(&self) -> usize {
        self.virtual_.len()
    }

    /// New position of an old user column, `None` if dropped.
    pub fn stored(&self, old: usize) -> Option<usize> {
        self.stored.get(old).copied().flatten()
    }

    pub fn virt(&self, old: usize) -> Option<usize> {
        self.virtual_.get(old).copied().flatten()
    }

    /// Invert the stored mapping by linear search.
    pub fn find_old_stored(&self, new: usize) -> Option<usize> {
        self.stored.iter().position(|&mapped| mapped == Some(new))
    }

    pub fn find_old_virtual(&self, new: usize) -> Option<usize> {
        self.virtual_.iter().position(|&mapped| mapped == Some(new))
    }

    /// Smallest 1-based old user-column position whose mapping is not
    /// the identity, or 0 when the whole stored prefix is unchanged.
    pub fn first_alter_pos(&self) -> usize {
        self.stored
            .iter()
            .enumerate()
            .find(|(old, mapped)| **mapped != Some(*old))
            .map_or(0, |(old, _)| old + 1)
    }

    pub fn n_dropped_stored(&self) -> usize {
        self.stored.iter().filter(|mapped| mapped.is_none()).count()
    }
}
