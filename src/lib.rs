//! Recognition import service
//!
//! Bulk-imports employee recognitions from CSV uploads into PostgreSQL. Large
//! files go through a job-tagged staging table loaded with `COPY`, are
//! validated and moved in one set-based pass, and leave a queryable job and
//! per-row error ledger behind. Small files can use a simpler in-memory path.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
