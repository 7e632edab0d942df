// provision.rs - The provisioning procedure as a linear state machine
// Every step yields a StepOutcome and the run moves on; only a fatal
// ProvisionError stops it, leaving the remaining steps unexecuted.

use colored::*;
use std::fmt;
use std::fs;
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use crate::error::{ProvisionError, StepOutcome};
use crate::gophish_config;
use crate::host::{Detached, Host};
use crate::progress::ProvisionTracker;
use crate::prompt;
use crate::settings::{
    CONFIG_FILE_NAME, DEFAULT_CERT_PATH, DEFAULT_KEY_PATH, Prerequisite, ProvisionSettings,
};
use crate::status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Update,
    Upgrade,
    EnsureTool(String),
    FetchRelease,
    Unpack,
    Chmod,
    PromptCert,
    PromptKey,
    UpdateConfig,
    Launch,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Update => write!(f, "update"),
            Step::Upgrade => write!(f, "upgrade"),
            Step::EnsureTool(binary) => write!(f, "ensure-{}", binary),
            Step::FetchRelease => write!(f, "fetch-release"),
            Step::Unpack => write!(f, "unpack"),
            Step::Chmod => write!(f, "chmod"),
            Step::PromptCert => write!(f, "prompt-cert"),
            Step::PromptKey => write!(f, "prompt-key"),
            Step::UpdateConfig => write!(f, "update-config"),
            Step::Launch => write!(f, "launch"),
        }
    }
}

#[derive(Debug)]
pub struct StepRecord {
    pub step: Step,
    pub outcome: StepOutcome,
}

#[derive(Debug)]
pub struct ProvisionReport {
    pub steps: Vec<StepRecord>,
    pub cert_path: String,
    pub key_path: String,
    pub launched: Option<Detached>,
    pub elapsed: Duration,
}

impl ProvisionReport {
    pub fn outcome(&self, step: &Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| &r.step == step).map(|r| &r.outcome)
    }

    /// The configuration update was skipped, so GoPhish runs with upstream TLS settings
    pub fn config_skipped(&self) -> bool {
        matches!(self.outcome(&Step::UpdateConfig), Some(StepOutcome::Skipped(_)))
    }

    pub fn recovered_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Recovered(_)))
            .count()
    }

    pub fn print_summary(&self) {
        println!();
        println!("{}", "═══════════════════════════════════════════════════════════════".cyan().bold());
        println!("{}", "  PROVISIONING SUMMARY".white().bold());
        println!("{}", "═══════════════════════════════════════════════════════════════".cyan().bold());
        for record in &self.steps {
            let line = format!("  {:<16} {}", record.step.to_string(), record.outcome.label());
            match record.outcome {
                StepOutcome::Completed => println!("{}", line.green()),
                StepOutcome::Skipped(_) => println!("{}", line.dimmed()),
                StepOutcome::Recovered(_) => println!("{}", line.yellow()),
            }
        }
        println!("{}", format!("  Certificate: {}", self.cert_path).cyan());
        println!("{}", format!("  Key:         {}", self.key_path).cyan());
        if let Some(detached) = self.launched {
            println!("{}", format!("  GoPhish PID: {}", detached.pid).cyan());
        }
        println!("{}", format!("  Elapsed: {:.1}s", self.elapsed.as_secs_f64()).cyan());
        println!("{}", "═══════════════════════════════════════════════════════════════".cyan().bold());
    }
}

pub struct Provisioner<'a, H: Host> {
    settings: &'a ProvisionSettings,
    host: &'a mut H,
    tracker: ProvisionTracker,
    steps: Vec<StepRecord>,
}

impl<'a, H: Host> Provisioner<'a, H> {
    pub fn new(settings: &'a ProvisionSettings, host: &'a mut H) -> Self {
        Self {
            settings,
            host,
            tracker: ProvisionTracker::new(settings.workdir.clone()),
            steps: Vec::new(),
        }
    }

    /// Run every step in order. Prompts read from `input` and are echoed to `output`.
    pub async fn run<R: BufRead, W: Write>(
        mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<ProvisionReport, ProvisionError> {
        let started = Instant::now();
        let settings = self.settings;
        self.tracker.run_started();

        self.begin(&Step::Update);
        let outcome = self.update().await;
        self.record(Step::Update, outcome);

        self.begin(&Step::Upgrade);
        let outcome = self.upgrade().await;
        self.record(Step::Upgrade, outcome);

        for prerequisite in &settings.prerequisites {
            let step = Step::EnsureTool(prerequisite.binary.clone());
            self.begin(&step);
            let outcome = self.ensure_tool(prerequisite).await;
            self.record(step, outcome);
        }

        self.begin(&Step::FetchRelease);
        let outcome = self.fetch_release().await;
        let outcome = self.checked(Step::FetchRelease, outcome)?;
        self.record(Step::FetchRelease, outcome);

        self.begin(&Step::Unpack);
        let outcome = self.unpack().await;
        self.record(Step::Unpack, outcome);

        self.begin(&Step::Chmod);
        let outcome = self.chmod();
        self.record(Step::Chmod, outcome);

        let cert_path = self.answer(
            Step::PromptCert,
            settings.cert_path.clone(),
            "phish_server certificate",
            DEFAULT_CERT_PATH,
            input,
            output,
        )?;
        let key_path = self.answer(
            Step::PromptKey,
            settings.key_path.clone(),
            "phish_server key",
            DEFAULT_KEY_PATH,
            input,
            output,
        )?;

        self.begin(&Step::UpdateConfig);
        let outcome = self.update_config(&cert_path, &key_path);
        let outcome = self.checked(Step::UpdateConfig, outcome)?;
        self.record(Step::UpdateConfig, outcome);

        self.begin(&Step::Launch);
        let (outcome, launched) = self.launch();
        self.record(Step::Launch, outcome);

        self.tracker.run_completed();

        Ok(ProvisionReport {
            steps: self.steps,
            cert_path,
            key_path,
            launched,
            elapsed: started.elapsed(),
        })
    }

    async fn update(&mut self) -> StepOutcome {
        status::info("Updating package lists...");
        let command = self.settings.update_command();
        recoverable(self.host.run(&command, None).await)
    }

    async fn upgrade(&mut self) -> StepOutcome {
        if self.settings.skip_upgrade {
            status::info("Skipping package upgrade.");
            return StepOutcome::Skipped("upgrade disabled".to_string());
        }
        status::info("Upgrading packages...");
        let command = self.settings.upgrade_command();
        recoverable(self.host.run(&command, None).await)
    }

    async fn ensure_tool(&mut self, prerequisite: &Prerequisite) -> StepOutcome {
        if self.host.has_program(&prerequisite.binary) {
            status::info(&format!(
                "{} is already installed. Skipping installation.",
                prerequisite.binary
            ));
            return StepOutcome::Skipped(format!("{} already on PATH", prerequisite.binary));
        }

        status::info(&format!("Installing {}...", prerequisite.package));
        let command = self.settings.install_command(&prerequisite.package);
        recoverable(self.host.run(&command, None).await)
    }

    async fn fetch_release(&mut self) -> Result<StepOutcome, ProvisionError> {
        status::info("Installing GoPhish...");
        let workdir = self.settings.workdir();
        fs::create_dir_all(workdir)
            .map_err(|e| ProvisionError::io(format!("create {}", workdir.display()), e))?;

        let url = self.settings.release_url();
        let archive = self.settings.archive_path();
        match self.host.download(&url, &archive).await {
            Ok(bytes) => {
                status::info(&format!("Downloaded {} ({} bytes)", archive.display(), bytes));
                Ok(StepOutcome::Completed)
            }
            Err(err) => Ok(StepOutcome::Recovered(err)),
        }
    }

    async fn unpack(&mut self) -> StepOutcome {
        let command = self.settings.unpack_command();
        recoverable(self.host.run(&command, Some(self.settings.workdir())).await)
    }

    fn chmod(&mut self) -> StepOutcome {
        recoverable(self.host.make_executable(&self.settings.executable_path()))
    }

    fn answer<R: BufRead, W: Write>(
        &mut self,
        step: Step,
        preset: Option<String>,
        label: &str,
        default: &str,
        input: &mut R,
        output: &mut W,
    ) -> Result<String, ProvisionError> {
        self.begin(&step);
        if let Some(value) = preset {
            self.record(step, StepOutcome::Skipped("answered on the command line".to_string()));
            return Ok(value);
        }

        match prompt::prompt_path(input, output, label, default) {
            Ok(value) => {
                self.record(step, StepOutcome::Completed);
                Ok(value)
            }
            Err(e) => Err(self.fail(&step, ProvisionError::io(format!("read {}", label), e))),
        }
    }

    fn update_config(&mut self, cert_path: &str, key_path: &str) -> Result<StepOutcome, ProvisionError> {
        let config_path = self.settings.config_path();
        if !config_path.exists() {
            status::warning(&format!("{} not found. Skipping configuration update.", CONFIG_FILE_NAME));
            return Ok(StepOutcome::Skipped(format!("{} not found", CONFIG_FILE_NAME)));
        }

        match gophish_config::update_config(&config_path, cert_path, key_path) {
            Ok(()) => {
                status::info(&format!("Updated {}", config_path.display()));
                Ok(StepOutcome::Completed)
            }
            Err(ProvisionError::NotFound { path }) => {
                status::warning(&format!("{} not found. Skipping configuration update.", path.display()));
                Ok(StepOutcome::Skipped(format!("{} not found", CONFIG_FILE_NAME)))
            }
            Err(err) => Err(err),
        }
    }

    fn launch(&mut self) -> (StepOutcome, Option<Detached>) {
        if !self.settings.launch {
            status::info("Launch disabled. GoPhish was not started.");
            return (StepOutcome::Skipped("launch disabled".to_string()), None);
        }

        status::info("Starting GoPhish...");
        let program = self.settings.executable_path();
        match self.host.detach(&program, self.settings.workdir()) {
            Ok(detached) => {
                status::info("GoPhish started. Admin UI available at https://<your-server-ip>:3333");
                (StepOutcome::Completed, Some(detached))
            }
            Err(err) => (StepOutcome::Recovered(err), None),
        }
    }

    fn checked(
        &mut self,
        step: Step,
        outcome: Result<StepOutcome, ProvisionError>,
    ) -> Result<StepOutcome, ProvisionError> {
        outcome.map_err(|err| self.fail(&step, err))
    }

    fn begin(&mut self, step: &Step) {
        self.tracker.step_started(&step.to_string());
    }

    /// Fatal errors are printed here and nowhere else
    fn fail(&mut self, step: &Step, err: ProvisionError) -> ProvisionError {
        status::error(&err.to_string());
        self.tracker.step_failed(&step.to_string(), &err.to_string());
        err
    }

    fn record(&mut self, step: Step, outcome: StepOutcome) {
        let name = step.to_string();
        match &outcome {
            StepOutcome::Completed => self.tracker.step_completed(&name),
            StepOutcome::Skipped(reason) => self.tracker.step_skipped(&name, reason),
            StepOutcome::Recovered(err) => {
                status::error(&err.to_string());
                self.tracker.step_recovered(&name, &err.to_string());
            }
        }
        self.steps.push(StepRecord { step, outcome });
    }
}

fn recoverable(result: Result<(), ProvisionError>) -> StepOutcome {
    match result {
        Ok(()) => StepOutcome::Completed,
        Err(err) => StepOutcome::Recovered(err),
    }
}
