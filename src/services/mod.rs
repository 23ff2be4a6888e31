pub mod bulk_import;
pub mod export;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod storage;
pub mod worker;
