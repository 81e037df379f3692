use metrics::{
    log_counter,
    register_engine_counter,
    register_engine_histogram,
    Timer,
};

register_engine_counter!(
    pub DDL_TABLES_CREATED_TOTAL,
    "Count of tables persisted to the catalog"
);
pub fn log_table_created() {
    log_counter(&DDL_TABLES_CREATED_TOTAL, 1);
}

register_engine_counter!(
    pub DDL_INDEXES_CREATED_TOTAL,
    "Count of indexes persisted to the catalog"
);
pub fn log_index_created() {
    log_counter(&DDL_INDEXES_CREATED_TOTAL, 1);
}

register_engine_counter!(
    pub DDL_INDEX_TREES_DROPPED_TOTAL,
    "Count of index trees freed"
);
pub fn log_index_tree_dropped() {
    log_counter(&DDL_INDEX_TREES_DROPPED_TOTAL, 1);
}

register_engine_counter!(
    pub DDL_FOREIGN_KEYS_INSTALLED_TOTAL,
    "Count of foreign key constraints written to the catalog"
);
pub fn log_foreign_key_installed() {
    log_counter(&DDL_FOREIGN_KEYS_INSTALLED_TOTAL, 1);
}

register_engine_histogram!(
    pub DDL_BOOTSTRAP_SECONDS,
    "Time spent bootstrapping the auxiliary system tables"
);
pub fn bootstrap_timer() -> Timer {
    Timer::new(&DDL_BOOTSTRAP_SECONDS)
}
