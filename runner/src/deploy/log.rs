//! Per-deployment process log

use std::path::{Path, PathBuf};

use crate::deploy::command::CommandOutput;
use crate::errors::RunnerError;
use crate::filesys::file::File;

/// Pipeline stage a log section belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSection {
    Fetch,
    Build,
    Run,
    Rollback,
    Health,
    Error,
    Exception,
}

impl LogSection {
    pub fn title(&self) -> &'static str {
        match self {
            LogSection::Fetch => "git",
            LogSection::Build => "build",
            LogSection::Run => "run",
            LogSection::Rollback => "rollback",
            LogSection::Health => "health",
            LogSection::Error => "error",
            LogSection::Exception => "exception",
        }
    }
}

/// Sections collected during one pipeline run, flushed to a single file
#[derive(Debug, Clone)]
pub struct DeploymentLog {
    file: File,
    sections: Vec<(LogSection, String)>,
}

impl DeploymentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: File::new(path),
            sections: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn section(&mut self, section: LogSection, text: impl Into<String>) {
        self.sections.push((section, text.into()));
    }

    /// Record a command's stdout and stderr under `section`
    pub fn command(&mut self, section: LogSection, output: &CommandOutput) {
        self.section(section, output.combined());
    }

    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for (section, text) in &self.sections {
            rendered.push_str("=== ");
            rendered.push_str(section.title());
            rendered.push_str(" ===\n");
            rendered.push_str(text);
            if !text.ends_with('\n') {
                rendered.push('\n');
            }
        }
        rendered
    }

    /// Write every section collected so far, replacing earlier flushes
    pub async fn flush(&self) -> Result<PathBuf, RunnerError> {
        self.file.write_string(&self.render()).await?;
        Ok(self.file.path().to_path_buf())
    }

    /// Add sections after whatever an earlier flush left in the file
    pub async fn append(&self) -> Result<PathBuf, RunnerError> {
        let mut contents = if self.file.exists().await {
            self.file.read_string().await?
        } else {
            String::new()
        };
        contents.push_str(&self.render());
        self.file.write_string(&contents).await?;
        Ok(self.file.path().to_path_buf())
    }
}
