pub mod record_source;
pub mod report_store;
