//! Records the runner reads and mutates

pub mod app;
pub mod deployment;
pub mod repository;
