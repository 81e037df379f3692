use std::fmt;

/// Main column type, as stored in the catalog's MTYPE column. The
/// discriminants are an on-disk contract and can never be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
#[repr(u32)]
pub enum MainType {
    /// Variable-length string, binary collation.
    Varchar = 1,
    /// Fixed-length string.
    Char = 2,
    Fixbinary = 3,
    Binary = 4,
    Blob = 5,
    Int = 6,
    /// Child row reference in internal bookkeeping tables.
    SysChild = 7,
    /// Hidden system columns (DB_ROW_ID, DB_TRX_ID, DB_ROLL_PTR).
    Sys = 8,
    Float = 9,
    Double = 10,
    Decimal = 11,
    /// Variable-length string in connection character set.
    Varmysql = 12,
    Geometry = 14,
}

impl MainType {
    pub fn from_raw(raw: u32) -> anyhow::Result<Self> {
        let mtype = match raw {
            1 => Self::Varchar,
            2 => Self::Char,
            3 => Self::Fixbinary,
            4 => Self::Binary,
            5 => Self::Blob,
            6 => Self::Int,
            7 => Self::SysChild,
            8 => Self::Sys,
            9 => Self::Float,
            10 => Self::Double,
            11 => Self::Decimal,
            12 => Self::Varmysql,
            14 => Self::Geometry,
            _ => anyhow::bail!("Unknown main type {raw}"),
        };
        Ok(mtype)
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    /// True for types whose stored width varies row to row.
    pub fn is_variable(self) -> bool {
        matches!(
            self,
            Self::Varchar | Self::Varmysql | Self::Binary | Self::Blob | Self::Geometry
        )
    }

    pub fn is_blob_like(self) -> bool {
        matches!(self, Self::Blob | Self::Geometry)
    }
}

/// Precise type: a bitset layered over the main type, as stored in the
/// catalog's PRTYPE column. The low byte carries the server-level type
/// code, bits 8..16 carry the flags below, and the high 16 bits carry the
/// character set id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, derive_more::From)]
pub struct PreciseType(pub u32);

impl PreciseType {
    pub const NOT_NULL: u32 = 1 << 8;
    pub const UNSIGNED: u32 = 1 << 9;
    pub const BINARY_TYPE: u32 = 1 << 10;
    /// A true VARCHAR whose on-wire length prefix is 2 bytes.
    pub const LONG_TRUE_VARCHAR: u32 = 1 << 12;
    pub const VIRTUAL: u32 = 1 << 13;
    /// Row-start column of a system-versioned table.
    pub const VERS_START: u32 = 1 << 14;
    /// Row-end column of a system-versioned table.
    pub const VERS_END: u32 = 1 << 15;
    /// Either versioning column.
    pub const VERSIONED: u32 = Self::VERS_START | Self::VERS_END;
    pub const CHARSET_SHIFT: u32 = 16;
    pub const CHARSET_MASK: u32 = 0xFFFF << Self::CHARSET_SHIFT;

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    pub fn intersects(self, flags: u32) -> bool {
        self.0 & flags != 0
    }

    pub fn with(self, flags: u32) -> Self {
        Self(self.0 | flags)
    }

    pub fn without(self, flags: u32) -> Self {
        Self(self.0 & !flags)
    }

    pub fn nullable(self) -> bool {
        !self.contains(Self::NOT_NULL)
    }

    pub fn is_virtual(self) -> bool {
        self.contains(Self::VIRTUAL)
    }

    pub fn is_versioned(self) -> bool {
        self.intersects(Self::VERSIONED)
    }

    pub fn charset(self) -> u16 {
        (self.0 >> Self::CHARSET_SHIFT) as u16
    }

    pub fn with_charset(self, charset: u16) -> Self {
        Self((self.0 & !Self::CHARSET_MASK) | (u32::from(charset) << Self::CHARSET_SHIFT))
    }
}

impl fmt::Debug for PreciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PreciseType({:#x})", self.0)
    }
}

/// Complete type of one column: main type, precise type, maximum storage
/// length and the character set's per-character byte bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataType {
    pub mtype: MainType,
    pub prtype: PreciseType,
    /// Maximum storage length in bytes.
    pub len: u32,
    pub mbminlen: u8,
    pub mbmaxlen: u8,
}

impl DataType {
    pub fn new(
        mtype: MainType,
        prtype: PreciseType,
        len: u32,
        mbminlen: u8,
        mbmaxlen: u8,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            mbminlen <= mbmaxlen,
            "mbminlen {mbminlen} exceeds mbmaxlen {mbmaxlen}"
        );
        anyhow::ensure!(mbmaxlen < 8, "mbmaxlen {mbmaxlen} does not fit in 3 bits");
        Ok(Self {
            mtype,
            prtype,
            len,
            mbminlen,
            mbmaxlen,
        })
    }

    pub fn int(len: u32) -> Self {
        Self {
            mtype: MainType::Int,
            prtype: PreciseType::default().with(PreciseType::BINARY_TYPE),
            len,
            mbminlen: 1,
            mbmaxlen: 1,
        }
    }

    pub fn varchar(len: u32) -> Self {
        Self {
            mtype: MainType::Varchar,
            prtype: PreciseType::default(),
            len,
            mbminlen: 1,
            mbmaxlen: 1,
        }
    }

    pub fn char(len: u32) -> Self {
        Self {
            mtype: MainType::Char,
            prtype: PreciseType::default(),
            len,
            mbminlen: 1,
            mbmaxlen: 1,
        }
    }

    pub fn blob() -> Self {
        Self {
            mtype: MainType::Blob,
            prtype: PreciseType::default(),
            len: 0,
            mbminlen: 1,
            mbmaxlen: 1,
        }
    }

    /// Hidden system column of the given width.
    pub fn sys(len: u32) -> Self {
        Self {
            mtype: MainType::Sys,
            prtype: PreciseType::default().with(PreciseType::NOT_NULL),
            len,
            mbminlen: 1,
            mbmaxlen: 1,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.prtype = self.prtype.with(PreciseType::NOT_NULL);
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.prtype = self.prtype.with(PreciseType::UNSIGNED);
        self
    }

    pub fn nullable(&self) -> bool {
        self.prtype.nullable()
    }

    /// Fixed physical size of a stored value, or `None` when the width
    /// varies row to row. Under the compact row format a CHAR in a
    /// variable-width character set is stored variable-length.
    pub fn fixed_size(&self, compact: bool) -> Option<u32> {
        match self.mtype {
            MainType::Int
            | MainType::Sys
            | MainType::SysChild
            | MainType::Float
            | MainType::Double
            | MainType::Fixbinary
            | MainType::Decimal => Some(self.len),
            MainType::Char => {
                if !compact || self.mbminlen == self.mbmaxlen {
                    Some(self.len)
                } else {
                    None
                }
            },
            MainType::Varchar
            | MainType::Varmysql
            | MainType::Binary
            | MainType::Blob
            | MainType::Geometry => None,
        }
    }

    /// Minimum physical size of a stored non-NULL value.
    pub fn min_size(&self, compact: bool) -> u32 {
        match self.fixed_size(compact) {
            Some(fixed) => fixed,
            None => match self.mtype {
                MainType::Char => {
                    // A CHAR(n) in a multi-byte charset may shrink down to
                    // n / mbmaxlen characters of mbminlen bytes each.
                    self.len / u32::from(self.mbmaxlen) * u32::from(self.mbminlen)
                },
                _ => 0,
            },
        }
    }

    pub fn max_size(&self) -> u32 {
        self.len
    }

    /// Whether an instant column substitution may reuse this column's
    /// stored bytes for values of `new`: same wire format, no narrowing,
    /// and only ignorable precise-type bits changed.
    pub fn same_format_as(&self, new: &DataType) -> bool {
        const IGNORABLE: u32 = PreciseType::NOT_NULL
            | PreciseType::VERSIONED
            | PreciseType::LONG_TRUE_VARCHAR
            | PreciseType::CHARSET_MASK;
        self.mtype == new.mtype
            && new.len >= self.len
            && self.mbminlen == new.mbminlen
            && self.mbmaxlen == new.mbmaxlen
            && (self.prtype.raw() ^ new.prtype.raw()) & !IGNORABLE == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_type_raw_roundtrip() {
        for mtype in [
            MainType::Varchar,
            MainType::Char,
            MainType::Fixbinary,
            MainType::Binary,
            MainType::Blob,
            MainType::Int,
            MainType::SysChild,
            MainType::Sys,
            MainType::Float,
            MainType::Double,
            MainType::Decimal,
            MainType::Varmysql,
            MainType::Geometry,
        ] {
            assert_eq!(MainType::from_raw(mtype.raw()).unwrap(), mtype);
        }
        assert!(MainType::from_raw(13).is_err());
        assert!(MainType::from_raw(0).is_err());
    }

    #[test]
    fn test_precise_type_charset() {
        let prtype = PreciseType::default()
            .with(PreciseType::NOT_NULL)
            .with_charset(0x21);
        assert_eq!(prtype.charset(), 0x21);
        assert!(!prtype.nullable());
        assert!(prtype.with(PreciseType::VERS_START).is_versioned());
    }

    #[test]
    fn test_fixed_size() {
        assert_eq!(DataType::int(4).fixed_size(true), Some(4));
        assert_eq!(DataType::varchar(32).fixed_size(true), None);
        let wide_char = DataType::new(
            MainType::Char,
            PreciseType::default(),
            12,
            1,
            3,
        )
        .unwrap();
        assert_eq!(wide_char.fixed_size(true), None);
        assert_eq!(wide_char.fixed_size(false), Some(12));
        assert_eq!(wide_char.min_size(true), 4);
    }

    #[test]
    fn test_same_format() {
        let old = DataType::varchar(32);
        let widened = DataType::varchar(64).not_null();
        assert!(old.same_format_as(&widened));
        // Narrowing is never same-format.
        assert!(!old.same_format_as(&DataType::varchar(16)));
        // Switching the main type is never same-format.
        assert!(!old.same_format_as(&DataType::char(32)));
        // Unsigned flips the value encoding.
        assert!(!DataType::int(4).same_format_as(&DataType::int(4).unsigned()));
    }
}
