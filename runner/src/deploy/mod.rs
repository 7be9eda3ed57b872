//! Deployment module

pub mod command;
pub mod control;
pub mod discovery;
pub mod docker;
pub mod fsm;
pub mod git;
pub mod health;
pub mod log;
pub mod pipeline;
pub mod ports;
pub mod requests;
pub mod rollback;
