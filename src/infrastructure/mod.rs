pub mod config;
pub mod credential_store;
pub mod error;
pub mod logging;
pub mod remote_task_store;
pub mod storage;
pub mod task_store;
