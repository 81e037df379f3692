use metrics::{
    log_counter,
    register_engine_counter,
};

register_engine_counter!(
    pub INSTANT_ALTERS_APPLIED_TOTAL,
    "Count of column changes applied without a table rebuild"
);
pub fn log_instant_alter_applied() {
    log_counter(&INSTANT_ALTERS_APPLIED_TOTAL, 1);
}

register_engine_counter!(
    pub INSTANT_ALTERS_REJECTED_TOTAL,
    "Count of column changes that required a full rebuild"
);
pub fn log_instant_alter_rejected() {
    log_counter(&INSTANT_ALTERS_REJECTED_TOTAL, 1);
}

register_engine_counter!(
    pub INSTANT_ALTERS_ROLLED_BACK_TOTAL,
    "Count of in-memory instant changes undone by rollback"
);
pub fn log_instant_alter_rolled_back() {
    log_counter(&INSTANT_ALTERS_ROLLED_BACK_TOTAL, 1);
}

register_engine_counter!(
    pub METADATA_RECORDS_WRITTEN_TOTAL,
    "Count of schema-change metadata records inserted or updated"
);
pub fn log_metadata_record_written() {
    log_counter(&METADATA_RECORDS_WRITTEN_TOTAL, 1);
}
