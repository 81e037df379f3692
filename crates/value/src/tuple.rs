use std::fmt;

use crate::{
    types::DataType,
    value::DataValue,
};

/// One field of a [`Tuple`]: the declared type plus the value bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TupleField {
    pub dtype: DataType,
    pub value: DataValue,
}

/// An in-memory row image, in the column order of the index it is destined
/// for. This is what the catalog tuple builders produce and what the lower
/// tuple-insert service consumes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Tuple {
    fields: Vec<TupleField>,
    /// Record header bits carried through to the physical record; nonzero
    /// only for metadata records.
    pub info_bits: u8,
}

impl Tuple {
    pub fn with_capacity(n_fields: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n_fields),
            info_bits: 0,
        }
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn push(&mut self, dtype: DataType, value: DataValue) {
        self.fields.push(TupleField { dtype, value });
    }

    pub fn push_u32(&mut self, value: u32) {
        self.push(DataType::int(4).unsigned(), DataValue::from_u32(value));
    }

    pub fn push_u64(&mut self, value: u64) {
        self.push(DataType::int(8).unsigned(), DataValue::from_u64(value));
    }

    pub fn push_varchar(&mut self, value: &str) {
        self.push(
            DataType::varchar(value.len() as u32),
            DataValue::from_str(value),
        );
    }

    pub fn push_null(&mut self, dtype: DataType) {
        self.push(dtype, DataValue::Null);
    }

    /// A system field whose bytes the persistence layer assigns at insert
    /// time (DB_TRX_ID, DB_ROLL_PTR).
    pub fn push_sys(&mut self, len: u32) {
        self.push(DataType::sys(len), DataValue::zeroes(len as usize));
    }

    pub fn field(&self, n: usize) -> anyhow::Result<&TupleField> {
        self.fields
            .get(n)
            .ok_or_else(|| anyhow::anyhow!("tuple has no field {n}"))
    }

    pub fn fields(&self) -> impl Iterator<Item = &TupleField> {
        self.fields.iter()
    }

    pub fn u32_at(&self, n: usize) -> anyhow::Result<u32> {
        self.field(n)?.value.read_u32()
    }

    pub fn u64_at(&self, n: usize) -> anyhow::Result<u64> {
        self.field(n)?.value.read_u64()
    }

    pub fn str_at(&self, n: usize) -> anyhow::Result<&str> {
        let field = self.field(n)?;
        let bytes = field
            .value
            .as_bytes()
            .ok_or_else(|| anyhow::anyhow!("field {n} is NULL"))?;
        Ok(std::str::from_utf8(bytes)?)
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_list();
        for field in &self.fields {
            dbg.entry(&field.value);
        }
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_accessors() {
        let mut tuple = Tuple::with_capacity(4);
        tuple.push_varchar("db/t");
        tuple.push_u64(42);
        tuple.push_u32(7);
        tuple.push_null(DataType::varchar(8));

        assert_eq!(tuple.n_fields(), 4);
        assert_eq!(tuple.str_at(0).unwrap(), "db/t");
        assert_eq!(tuple.u64_at(1).unwrap(), 42);
        assert_eq!(tuple.u32_at(2).unwrap(), 7);
        assert!(tuple.field(3).unwrap().value.is_null());
        assert!(tuple.str_at(3).is_err());
        assert!(tuple.field(4).is_err());
    }
}
