//! Utility functions

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::deploy::discovery::ToolDiscovery;
use crate::storage::layout::RuntimeLayout;
use crate::storage::settings::Settings;

/// Upper bound for stored error summaries, in characters
pub const SUMMARY_MAX_CHARS: usize = 500;

const ELLIPSIS: &str = "...";

/// Version information for the runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Truncate `text` to at most `max_chars` characters, ellipsis included.
///
/// The cut lands on the last whitespace before the limit so no word is split.
/// A single token longer than the limit has no boundary to cut at and is
/// hard-cut instead.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(ELLIPSIS.len());
    let cut = text
        .char_indices()
        .nth(budget)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    let head = &text[..cut];
    let head = if text[cut..].starts_with(char::is_whitespace) {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(idx) => &head[..idx],
            None => head,
        }
    };

    format!("{}{}", head.trim_end(), ELLIPSIS)
}

/// Replace every occurrence of each non-empty secret with `***`
pub fn redact(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret, "***"))
}

/// Print resolved configuration and tool discovery results
pub fn run_diagnostic(settings: &Settings) {
    let version = version_info();
    println!("{}", "Keystone runner diagnostic".bold());
    println!("  version:        {} ({})", version.version, version.git_hash);

    let range = format!("{}-{}", settings.port_range_start, settings.port_range_end);
    println!("  port range:     {}", range);

    let layout = RuntimeLayout::new(&settings.runtime_dir);
    println!("  repos dir:      {}", layout.repos_dir().path().display());
    println!("  logs dir:       {}", layout.logs_dir().path().display());

    let store = if settings.database_url.is_some() {
        "postgres"
    } else {
        "in-memory"
    };
    println!("  store:          {}", store);

    let discovery = ToolDiscovery::from_env(settings.container_tool.clone());
    match discovery.resolve() {
        Some(path) => println!(
            "  container tool: {}",
            path.display().to_string().green()
        ),
        None => println!("  container tool: {}", "not found".red()),
    }

    match settings.validate() {
        Ok(()) => println!("  settings:       {}", "ok".green()),
        Err(e) => println!("  settings:       {}", e.to_string().red()),
    }
}
