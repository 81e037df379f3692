//! The per-table descriptor of cumulative instant column changes.
//!
//! Once a table has had a column instantly dropped or reordered, stored
//! rows no longer match the dictionary's column array. The field map is
//! the sole source of truth for parsing them: one 16-bit element per
//! clustered-index field past the hidden system prefix, saying either
//! which live column the field holds or how wide the dropped column's
//! bytes are.

use value::mach;

use crate::column::Column;

/// 16-bit field-map element.
///
/// Bit 15 marks a dropped column, bit 14 NOT NULL (meaningful only when
/// dropped). The low 14 bits carry the live column's ordinal, or, for a
/// dropped column, `fixed_len + 1`, with 0 for a small variable-width
/// column and [`FieldMapEntry::BIG`] for an overflow-eligible one.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FieldMapEntry(u16);

impl FieldMapEntry {
    const DROPPED: u16 = 1 << 15;
    const NOT_NULL: u16 = 1 << 14;
    const IND_MASK: u16 = (1 << 14) - 1;
    /// Dropped variable-width column that may be stored externally.
    pub const BIG: u16 = Self::IND_MASK;

    pub fn live(ind: u16) -> Self {
        assert!(ind <= Self::IND_MASK, "column ordinal {ind} overflows the field map");
        Self(ind)
    }

    pub fn dropped_fixed(fixed_len: u16, not_null: bool) -> Self {
        assert!(
            fixed_len + 1 < Self::BIG,
            "fixed length {fixed_len} overflows the field map"
        );
        let mut raw = Self::DROPPED | (fixed_len + 1);
        if not_null {
            raw |= Self::NOT_NULL;
        }
        Self(raw)
    }

    pub fn dropped_variable(big: bool, not_null: bool) -> Self {
        let mut raw = Self::DROPPED | if big { Self::BIG } else { 0 };
        if not_null {
            raw |= Self::NOT_NULL;
        }
        Self(raw)
    }

    pub fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn is_dropped(self) -> bool {
        self.0 & Self::DROPPED != 0
    }

    pub fn is_not_null(self) -> bool {
        self.0 & Self::NOT_NULL != 0
    }

    /// Live column ordinal. Only meaningful when not dropped.
    pub fn ind(self) -> u16 {
        self.0 & Self::IND_MASK
    }

    /// Physical width hint of a dropped column: `Some(len)` for a fixed
    /// column, `None` for variable.
    pub fn dropped_fixed_len(self) -> Option<u16> {
        debug_assert!(self.is_dropped());
        match self.0 & Self::IND_MASK {
            0 | Self::BIG => None,
            stored => Some(stored - 1),
        }
    }

    pub fn dropped_is_big(self) -> bool {
        debug_assert!(self.is_dropped());
        self.0 & Self::IND_MASK == Self::BIG
    }
}

impl std::fmt::Debug for FieldMapEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_dropped() {
            write!(
                f,
                "Dropped(fixed={:?}, not_null={})",
                self.dropped_fixed_len(),
                self.is_not_null()
            )
        } else {
            write!(f, "Live({})", self.ind())
        }
    }
}

/// Cumulative effect of every instant column change applied to a table.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct InstantMetadata {
    /// Images of instantly dropped columns, in drop order over the
    /// table's history. Old rows still carry their bytes.
    pub dropped: Vec<Column>,
    /// One element per clustered-index field at positions
    /// `[first_user_field .. n_fields)`.
    pub field_map: Vec<FieldMapEntry>,
}

impl InstantMetadata {
    pub fn n_dropped(&self) -> usize {
        self.dropped.len()
    }

    /// Wire form carried by the metadata record: 4-byte element count,
    /// then 2 bytes per element, big-endian.
    pub fn serialize_field_map(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 4 + 2 * self.field_map.len()];
        mach::write_u32(&mut buf[..4], self.field_map.len() as u32);
        for (i, entry) in self.field_map.iter().enumerate() {
            mach::write_u16(&mut buf[4 + 2 * i..], entry.raw());
        }
        buf
    }

    pub fn deserialize_field_map(buf: &[u8]) -> anyhow::Result<Vec<FieldMapEntry>> {
        anyhow::ensure!(buf.len() >= 4, "field map blob shorter than its header");
        let n = mach::read_u32(&buf[..4]) as usize;
        anyhow::ensure!(
            buf.len() == 4 + 2 * n,
            "field map blob length {} does not match element count {n}",
            buf.len()
        );
        Ok((0..n)
            .map(|i| FieldMapEntry::from_raw(mach::read_u16(&buf[4 + 2 * i..])))
            .collect())
    }
}
