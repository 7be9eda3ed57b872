//! Keystone Runner Library
//!
//! Turns queued deployment records into running, health-checked containers.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
