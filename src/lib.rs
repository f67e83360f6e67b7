pub mod backend;
pub mod config;
pub mod job_queue;
pub mod job_store;
pub mod metrics;
pub mod sqlite_persistence;
