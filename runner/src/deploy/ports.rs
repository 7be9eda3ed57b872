//! Host port selection
//!
//! Selection is pure; the store wraps it in a transaction that locks the App
//! row before reading the leased set and before writing the chosen port.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::RunnerError;

/// Inclusive range of host ports the runner may lease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self, RunnerError> {
        if start > end {
            return Err(RunnerError::ConfigError(format!(
                "port range start {} is greater than end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn exhausted(&self) -> RunnerError {
        RunnerError::PortsExhausted {
            start: self.start,
            end: self.end,
        }
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 9000,
            end: 9999,
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Lowest port in `range` not leased by another App
pub fn pick_free_port(range: PortRange, leased: &HashSet<u16>) -> Result<u16, RunnerError> {
    (range.start..=range.end)
        .find(|port| !leased.contains(port))
        .ok_or_else(|| range.exhausted())
}

/// Port an App ends up with: its existing lease if it has one, else a fresh pick.
///
/// A lease left outside the range (after the range was reconfigured) is
/// replaced so every lease stays inside the configured bounds.
pub fn resolve_lease(
    current: Option<u16>,
    range: PortRange,
    leased_by_others: &HashSet<u16>,
) -> Result<u16, RunnerError> {
    match current {
        Some(port) if range.contains(port) => Ok(port),
        _ => pick_free_port(range, leased_by_others),
    }
}
