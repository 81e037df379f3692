//! Engine-wide limits and reserved on-disk values.

/// Hidden system columns appended to every table: DB_ROW_ID, DB_TRX_ID,
/// DB_ROLL_PTR.
pub const DATA_N_SYS_COLS: usize = 3;

pub const DATA_ROW_ID_LEN: u32 = 6;
pub const DATA_TRX_ID_LEN: u32 = 6;
pub const DATA_ROLL_PTR_LEN: u32 = 7;

/// Absolute cap on fields in one physical record.
pub const REC_MAX_N_FIELDS: usize = 1026;

/// Cap on user columns in a table: system columns are counted twice, once
/// in the table and once appended to secondary index records.
pub const REC_MAX_N_USER_FIELDS: usize = REC_MAX_N_FIELDS - DATA_N_SYS_COLS * 2;

/// Inline size of an externally stored (overflow) column reference.
pub const FIELD_REF_SIZE: u32 = 20;

pub const PAGE_SIZE_MAX: u32 = 65536;

/// Default SYS_INDEXES.MERGE_THRESHOLD, in percent of page fill.
pub const MERGE_THRESHOLD_DEFAULT: u32 = 50;

/// Byte prefixed to SYS_INDEXES.NAME for an uncommitted index, hiding it
/// from normal lookups.
pub const TEMP_INDEX_PREFIX: u8 = 0xFF;

pub const REC_INFO_MIN_REC_FLAG: u8 = 0x10;
pub const REC_INFO_DELETED_FLAG: u8 = 0x20;
const REC_STATUS_INSTANT: u8 = 0x4;

/// info_bits of a metadata record describing instantly *added* columns.
pub const REC_INFO_METADATA_ADD: u8 = REC_INFO_MIN_REC_FLAG | REC_STATUS_INSTANT;

/// info_bits of a metadata record carrying a serialized field map
/// (drop / reorder / add).
pub const REC_INFO_METADATA_ALTER: u8 = REC_INFO_METADATA_ADD | REC_INFO_DELETED_FLAG;

/// Root page type of a clustered index that carries a metadata record.
pub const FIL_PAGE_TYPE_INSTANT: u16 = 0x4B40;

pub const FIL_PAGE_INDEX: u16 = 0x45BF;

/// Largest record that may be stored on a leaf page without overflowing:
/// two records must fit on an empty page, less the per-record and per-page
/// overhead.
pub fn max_record_size(page_size: u32) -> u32 {
    page_size / 2 - 200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_info_bits_are_distinct() {
        assert_eq!(REC_INFO_METADATA_ADD, 0x14);
        assert_eq!(REC_INFO_METADATA_ALTER, 0x34);
        assert_ne!(REC_INFO_METADATA_ADD & REC_INFO_MIN_REC_FLAG, 0);
    }

    #[test]
    fn test_user_field_cap() {
        assert_eq!(REC_MAX_N_USER_FIELDS, 1020);
        assert!(max_record_size(16384) > FIELD_REF_SIZE);
    }
}
