//! Container tool discovery

use std::path::{Path, PathBuf};

/// Binary names and well-known locations tried when no tool is configured
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "docker",
    "/usr/bin/docker",
    "/usr/local/bin/docker",
    "/opt/homebrew/bin/docker",
    "podman",
    "/usr/bin/podman",
];

/// Resolves the container CLI to an absolute path.
///
/// A configured tool wins; otherwise each candidate is tried in order. Bare
/// names are looked up on the search path (the process `PATH` unless one is
/// given), paths are checked as-is.
#[derive(Debug, Clone)]
pub struct ToolDiscovery {
    configured: Option<String>,
    candidates: Vec<String>,
    search_path: Option<Vec<PathBuf>>,
}

impl ToolDiscovery {
    pub fn new(configured: Option<String>, search_path: Option<Vec<PathBuf>>) -> Self {
        Self {
            configured: configured.filter(|tool| !tool.trim().is_empty()),
            candidates: DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            search_path,
        }
    }

    /// Discovery over the process `PATH`
    pub fn from_env(configured: Option<String>) -> Self {
        Self::new(configured, None)
    }

    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// First executable candidate, or `None` when the tool is absent.
    ///
    /// A configured tool is never silently replaced by a fallback.
    pub fn resolve(&self) -> Option<PathBuf> {
        self.tried().find_map(|candidate| self.which(candidate))
    }

    /// Like [`resolve`](Self::resolve), with the existence check supplied by
    /// the caller
    pub fn resolve_with<F>(&self, exists: F) -> Option<PathBuf>
    where
        F: Fn(&Path) -> bool,
    {
        self.tried()
            .find_map(|candidate| self.lookup(candidate, &exists))
    }

    fn tried(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match &self.configured {
            Some(tool) => Box::new(std::iter::once(tool.as_str())),
            None => Box::new(self.candidates.iter().map(String::as_str)),
        }
    }

    fn which(&self, candidate: &str) -> Option<PathBuf> {
        let found = match &self.search_path {
            Some(dirs) => {
                let paths = std::env::join_paths(dirs).ok()?;
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
                which::which_in(candidate, Some(paths), cwd)
            }
            None => which::which(candidate),
        };
        found.ok()
    }

    fn lookup<F>(&self, candidate: &str, exists: &F) -> Option<PathBuf>
    where
        F: Fn(&Path) -> bool,
    {
        let path = Path::new(candidate);
        if path.components().count() > 1 || path.is_absolute() {
            return exists(path).then(|| path.to_path_buf());
        }
        self.search_path
            .iter()
            .flatten()
            .map(|dir| dir.join(candidate))
            .find(|full| exists(full))
    }
}
