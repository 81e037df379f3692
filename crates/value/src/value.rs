use std::fmt;

use crate::mach;

/// Length marker for SQL NULL in stored field lengths and in instant
/// default values.
pub const UNIV_SQL_NULL: u32 = u32::MAX;

/// One column value, as handed to the tuple-insert layer. The engine only
/// deals in raw bytes at this level; interpretation belongs to the type in
/// the enclosing [`TupleField`](crate::TupleField).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataValue {
    Null,
    Bytes(Box<[u8]>),
}

impl DataValue {
    pub fn from_u32(value: u32) -> Self {
        Self::Bytes(Box::new(mach::u32_bytes(value)))
    }

    pub fn from_u64(value: u64) -> Self {
        Self::Bytes(Box::new(mach::u64_bytes(value)))
    }

    pub fn from_str(value: &str) -> Self {
        Self::Bytes(value.as_bytes().into())
    }

    /// A zero-filled buffer, e.g. an unassigned DB_TRX_ID or a dummy fixed
    /// field in a metadata record.
    pub fn zeroes(len: usize) -> Self {
        Self::Bytes(vec![0u8; len].into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Stored length in bytes, with [`UNIV_SQL_NULL`] for NULL.
    pub fn stored_len(&self) -> u32 {
        match self {
            Self::Null => UNIV_SQL_NULL,
            Self::Bytes(b) => b.len() as u32,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Null => None,
            Self::Bytes(b) => Some(b),
        }
    }

    pub fn read_u32(&self) -> anyhow::Result<u32> {
        let bytes = self.as_bytes().ok_or_else(|| anyhow::anyhow!("NULL"))?;
        anyhow::ensure!(bytes.len() == 4, "expected 4 bytes, got {}", bytes.len());
        Ok(mach::read_u32(bytes))
    }

    pub fn read_u64(&self) -> anyhow::Result<u64> {
        let bytes = self.as_bytes().ok_or_else(|| anyhow::anyhow!("NULL"))?;
        anyhow::ensure!(bytes.len() == 8, "expected 8 bytes, got {}", bytes.len());
        Ok(mach::read_u64(bytes))
    }
}

impl fmt::Debug for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bytes(b) if b.len() <= 16 => write!(f, "{b:02x?}"),
            Self::Bytes(b) => write!(f, "[{} bytes]", b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_len() {
        assert_eq!(DataValue::Null.stored_len(), UNIV_SQL_NULL);
        assert_eq!(DataValue::from_u32(7).stored_len(), 4);
        assert_eq!(DataValue::from_str("db/t").stored_len(), 4);
        assert_eq!(DataValue::zeroes(6).stored_len(), 6);
    }

    #[test]
    fn test_integer_roundtrip() {
        assert_eq!(DataValue::from_u32(0x8000_000a).read_u32().unwrap(), 0x8000_000a);
        assert_eq!(DataValue::from_u64(u64::MAX).read_u64().unwrap(), u64::MAX);
        assert!(DataValue::Null.read_u32().is_err());
        assert!(DataValue::from_u32(1).read_u64().is_err());
    }
}
