//! Integration tests, compiled as one target

mod common;
mod test_control;
mod test_fsm;
mod test_requests;
mod test_startup;
mod test_worker;
