//! Process wiring: state construction, worker spawning, shutdown

pub mod options;
pub mod run;
pub mod state;
