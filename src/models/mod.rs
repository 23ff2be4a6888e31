pub mod import;
pub mod import_error;
pub mod job;
pub mod recognition;
