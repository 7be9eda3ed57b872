//! Shared fixtures: a scripted command runner and a seeded pipeline

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use keystone_runner::deploy::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use keystone_runner::deploy::docker::{ContainerRuntime, RuntimeTimeouts};
use keystone_runner::deploy::git::SourceFetcher;
use keystone_runner::deploy::health::{HealthProber, HealthSettings};
use keystone_runner::deploy::pipeline::DeploymentPipeline;
use keystone_runner::deploy::ports::PortRange;
use keystone_runner::models::app::App;
use keystone_runner::models::deployment::{Deployment, DeploymentStatus, DeploymentType};
use keystone_runner::models::repository::Repository;
use keystone_runner::storage::layout::RuntimeLayout;
use keystone_runner::store::memory::MemoryStore;
use keystone_runner::store::DeploymentStore;

pub const DOCKER: &str = "/usr/bin/docker";

/// Answers commands from a rule list and records every call.
///
/// Rules match on program file name and first argument; anything unmatched
/// succeeds with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, String, CommandOutput)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, program: &str, first_arg: &str, output: CommandOutput) -> Self {
        self.rules
            .push((program.to_string(), first_arg.to_string(), output));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// `"<program> <first arg>"` for each call, in order
    pub fn call_names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|spec| {
                format!(
                    "{} {}",
                    spec.program_name(),
                    spec.args.first().map(String::as_str).unwrap_or("")
                )
            })
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(spec.clone());
        let program = spec.program_name();
        let first = spec.args.first().cloned().unwrap_or_default();
        Ok(self
            .rules
            .iter()
            .find(|(p, a, _)| *p == program && *a == first)
            .map(|(_, _, output)| output.clone())
            .unwrap_or_default())
    }
}

pub fn failed_output(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

pub fn quick_health() -> HealthSettings {
    HealthSettings {
        deadline: Duration::from_millis(300),
        interval: Duration::from_millis(50),
        attempt_timeout: Duration::from_millis(100),
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub runner: Arc<ScriptedRunner>,
    pub pipeline: DeploymentPipeline,
    pub layout: RuntimeLayout,
    _dir: TempDir,
}

pub struct HarnessBuilder {
    runner: ScriptedRunner,
    tool: Option<PathBuf>,
    range: PortRange,
    health: HealthSettings,
}

impl HarnessBuilder {
    pub fn new(runner: ScriptedRunner) -> Self {
        Self {
            runner,
            tool: Some(PathBuf::from(DOCKER)),
            range: PortRange::default(),
            health: quick_health(),
        }
    }

    pub fn without_tool(mut self) -> Self {
        self.tool = None;
        self
    }

    pub fn ports(mut self, start: u16, end: u16) -> Self {
        self.range = PortRange::new(start, end).unwrap();
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let layout = RuntimeLayout::new(dir.path());
        let store = Arc::new(MemoryStore::new());
        let runner = Arc::new(self.runner);

        let pipeline = DeploymentPipeline::new(
            store.clone() as Arc<dyn DeploymentStore>,
            runner.clone() as Arc<dyn CommandRunner>,
            ContainerRuntime::new(self.tool, "keystone", RuntimeTimeouts::default()),
            SourceFetcher::new(Duration::from_secs(5)),
            HealthProber::new(self.health).unwrap(),
            layout.clone(),
            self.range,
        );

        Harness {
            store,
            runner,
            pipeline,
            layout,
            _dir: dir,
        }
    }
}

impl Harness {
    /// Seed repository 1 and App 1 named "Web Shop"
    pub async fn seed_app(&self) -> App {
        self.store
            .insert_repository(Repository::new(
                1,
                "shop",
                "https://github.com/acme/shop.git",
            ))
            .await;
        let app = App::new(1, 1, "Web Shop");
        self.store.insert_app(app.clone()).await;
        app
    }
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap()
}

/// A finished successful deployment, for seeding history
pub fn succeeded(id: i64, app_id: i64, image: &str, ended_minute: u32) -> Deployment {
    Deployment {
        id,
        app_id,
        deployment_type: DeploymentType::Update,
        status: DeploymentStatus::Success,
        image_ref: Some(image.to_string()),
        assigned_port: Some(9000),
        created_at: at(0),
        started_at: Some(at(0)),
        ended_at: Some(at(ended_minute)),
        error_summary: None,
        log_path: None,
    }
}
