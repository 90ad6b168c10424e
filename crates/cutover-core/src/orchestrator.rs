//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Install/upgrade state machine."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
//! The orchestrator sequences one install or upgrade run:
//!
//! `Resolving -> Validated -> Linked (install) -> RuntimeReady -> Stopped
//! (upgrade) -> LogsArchived -> Configured -> Switched -> DbReady -> EnvSaved
//! -> Started`, or `Aborted` at the first fatal failure.
//!
//! Stopping the old service, archiving its logs and cleaning up its files are
//! best-effort; everything else is fatal. Nothing is rolled back.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use cutover_common::InstallSettings;
use cutover_logging::{cut_debug, cut_error, cut_info, cut_warn, log_phase_event, PhaseContext, PhaseOutcome};
use cutover_pointer::DirectoryPointer;

use crate::archive::archive_logs;
use crate::configure::{CarryOver, ConfigurationManager};
use crate::error::InstallError;
use crate::gateway::{DatabaseAdmin, DatabaseOptions, ServiceRuntime};
use crate::lifecycle::{LifecycleController, WebControl};
use crate::release::ReleaseResolver;
use crate::switchover::{SwitchOutcome, SwitchoverEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Install,
    Upgrade,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Install => "install",
            RunMode::Upgrade => "upgrade",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run choices made by the operator.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Release directory or archive.
    pub server: Option<String>,
    pub prestart_files: Vec<String>,
    /// Start from the release's default configuration on upgrade.
    pub ignore_config: bool,
    /// Install only.
    pub init_db: bool,
    pub upgrade_db: bool,
    /// Upgrade only.
    pub archive_logs: Option<PathBuf>,
    pub database: DatabaseOptions,
}

impl RunOptions {
    pub fn validate(&self, mode: RunMode) -> Result<(), InstallError> {
        match mode {
            RunMode::Install if self.init_db && self.upgrade_db => Err(InstallError::InvalidOptions(
                "--initdb and --upgradedb are mutually exclusive".into(),
            )),
            RunMode::Install if self.archive_logs.is_some() => Err(InstallError::InvalidOptions(
                "--archivelogs applies to upgrades only".into(),
            )),
            RunMode::Upgrade if self.init_db => Err(InstallError::InvalidOptions(
                "--initdb applies to new installs only".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    Validated,
    Linked,
    RuntimeReady,
    Stopped,
    LogsArchived,
    Configured,
    Switched,
    DbReady,
    EnvSaved,
    Started,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Resolving => "resolving",
            Phase::Validated => "validated",
            Phase::Linked => "linked",
            Phase::RuntimeReady => "runtime-ready",
            Phase::Stopped => "stopped",
            Phase::LogsArchived => "logs-archived",
            Phase::Configured => "configured",
            Phase::Switched => "switched",
            Phase::DbReady => "db-ready",
            Phase::EnvSaved => "env-saved",
            Phase::Started => "started",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Skipped(String),
    /// A best-effort step failed; the run continued.
    Degraded(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub phase: Phase,
    pub outcome: StepOutcome,
    pub at: DateTime<Utc>,
}

/// Phases reached by a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    pub pointer: PathBuf,
    pub release: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    fn new(mode: RunMode, pointer: &Path) -> Self {
        Self {
            mode,
            pointer: pointer.to_path_buf(),
            release: None,
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
        }
    }

    pub fn outcome(&self, phase: Phase) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|step| step.phase == phase)
            .map(|step| &step.outcome)
    }

    pub fn degraded(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Degraded(_)))
    }
}

/// Where the orchestrator stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    At(Phase),
    /// `last_phase` is the last phase the run reached before failing.
    Aborted {
        last_phase: Phase,
        code: i32,
        reason: String,
    },
}

pub struct Orchestrator<'a> {
    settings: &'a InstallSettings,
    pointer: &'a dyn DirectoryPointer,
    runtime: &'a mut dyn ServiceRuntime,
    database: &'a mut dyn DatabaseAdmin,
    resolver: &'a dyn ReleaseResolver,
    lifecycle: LifecycleController,
    state: RunState,
    pointer_label: String,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        settings: &'a InstallSettings,
        pointer: &'a dyn DirectoryPointer,
        runtime: &'a mut dyn ServiceRuntime,
        database: &'a mut dyn DatabaseAdmin,
        resolver: &'a dyn ReleaseResolver,
    ) -> Self {
        Self {
            settings,
            pointer,
            runtime,
            database,
            resolver,
            lifecycle: LifecycleController::new(WebControl::for_platform(settings.skip_web)),
            state: RunState::Idle,
            pointer_label: settings.sym.display().to_string(),
        }
    }

    /// Replace the web control chosen from the host platform.
    pub fn with_web_control(mut self, web: WebControl) -> Self {
        self.lifecycle = LifecycleController::new(web);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Execute one install or upgrade run against the configured pointer.
    pub fn run(&mut self, mode: RunMode, options: &RunOptions) -> Result<RunReport, InstallError> {
        let mut report = RunReport::new(mode, &self.settings.sym);
        self.state = RunState::At(Phase::Resolving);
        match self.execute(mode, options, &mut report) {
            Ok(()) => {
                report.finished_at = Some(Utc::now());
                let ctx = self.context(mode, Phase::Started);
                log_phase_event(Some(&ctx), "run.finished", "run completed", PhaseOutcome::Success);
                Ok(report)
            }
            Err(err) => {
                let phase = match self.state {
                    RunState::At(phase) => phase,
                    _ => Phase::Resolving,
                };
                let code = err.exit_code();
                let ctx = self.context(mode, phase);
                if err.is_clean_exit() {
                    cut_info!(context = ctx, "{err}");
                } else {
                    cut_error!(context = ctx, "aborted with code {code}: {err}");
                    log_phase_event(Some(&ctx), "run.aborted", &err.to_string(), PhaseOutcome::Fault);
                }
                self.state = RunState::Aborted {
                    last_phase: phase,
                    code,
                    reason: err.to_string(),
                };
                Err(err)
            }
        }
    }

    fn execute(
        &mut self,
        mode: RunMode,
        options: &RunOptions,
        report: &mut RunReport,
    ) -> Result<(), InstallError> {
        let sym = self.settings.sym.clone();

        options.validate(mode)?;
        self.check_preconditions(mode, &sym)?;

        let release = self.resolver.resolve(options.server.as_deref())?;
        report.release = Some(release.clone());
        {
            let ctx = self.context(mode, Phase::Validated);
            match mode {
                RunMode::Install => cut_info!(context = ctx, "installing {}", release.display()),
                RunMode::Upgrade => cut_info!(context = ctx, "upgrading {}", release.display()),
            }
        }
        self.advance(report, Phase::Validated, StepOutcome::Completed);

        // Linking first makes "old target == new target" the install case.
        match mode {
            RunMode::Install => {
                self.pointer.create(&release, &sym)?;
                self.advance(report, Phase::Linked, StepOutcome::Completed);
            }
            RunMode::Upgrade => {
                self.advance(report, Phase::Linked, skipped("existing install"));
            }
        }

        self.runtime
            .prepare(&release)
            .map_err(|source| InstallError::Gateway {
                step: "runtime preparation",
                source,
            })?;
        if mode == RunMode::Upgrade {
            self.runtime
                .capture_environment(&sym, &self.settings.save_vars_file)
                .map_err(|source| InstallError::Gateway {
                    step: "previous environment capture",
                    source,
                })?;
        }
        {
            let ctx = self.context(mode, Phase::RuntimeReady);
            cut_debug!(context = ctx, "runtime prepared for {}", release.display());
        }
        self.advance(report, Phase::RuntimeReady, StepOutcome::Completed);

        match mode {
            RunMode::Upgrade => {
                let outcome = self.stop_previous();
                self.advance(report, Phase::Stopped, outcome);
            }
            RunMode::Install => self.advance(report, Phase::Stopped, skipped("nothing running")),
        }

        let outcome = match (&options.archive_logs, mode) {
            (Some(archive), RunMode::Upgrade) => match archive_logs(&sym, archive) {
                Ok(_) => StepOutcome::Completed,
                Err(err) => StepOutcome::Degraded(err.to_string()),
            },
            _ => skipped("not requested"),
        };
        self.advance(report, Phase::LogsArchived, outcome);

        let copy_old = mode == RunMode::Upgrade && !options.ignore_config;
        let manager =
            ConfigurationManager::new(&self.settings.config_file, self.settings.ports);
        let carried = manager.configure(
            &mut *self.runtime,
            copy_old,
            &sym,
            &release,
            &options.prestart_files,
        )?;
        {
            let ctx = self.context(mode, Phase::Configured);
            cut_info!(context = ctx, "configuration {:?}", carried);
        }
        let outcome = match carried {
            CarryOver::AlreadyIdentical => skipped("configuration already in place"),
            _ => StepOutcome::Completed,
        };
        self.advance(report, Phase::Configured, outcome);

        let switched = SwitchoverEngine::new(self.pointer).switch(
            &release,
            &sym,
            self.settings.skip_delete,
            self.settings.skip_delete_zip,
        )?;
        let outcome = match (switched, mode) {
            (SwitchOutcome::Unchanged, RunMode::Install) => {
                let ctx = self.context(mode, Phase::Switched);
                cut_info!(context = ctx, "pointer linked at install, nothing to switch");
                skipped("linked at install")
            }
            (SwitchOutcome::Unchanged, RunMode::Upgrade) => {
                let ctx = self.context(mode, Phase::Switched);
                cut_warn!(context = ctx, "upgraded server was the same, not deleting");
                skipped("release is already active")
            }
            (SwitchOutcome::Switched { .. }, _) => StepOutcome::Completed,
        };
        self.advance(report, Phase::Switched, outcome);

        let outcome = self.prepare_database(mode, options, &release)?;
        self.advance(report, Phase::DbReady, outcome);

        let outcome = match self
            .runtime
            .save_environment(&self.settings.save_vars, &self.settings.save_vars_file)
        {
            Ok(snapshot) if snapshot.is_complete() => StepOutcome::Completed,
            Ok(snapshot) => {
                StepOutcome::Degraded(format!("not set: {}", snapshot.missing.join(", ")))
            }
            Err(err) => StepOutcome::Degraded(err.to_string()),
        };
        self.advance(report, Phase::EnvSaved, outcome);

        self.lifecycle
            .start_core(&mut *self.runtime)
            .map_err(|source| InstallError::Gateway {
                step: "start",
                source,
            })?;
        if self.lifecycle.web_enabled() {
            self.lifecycle
                .start_web(&mut *self.runtime)
                .map_err(|source| InstallError::Gateway {
                    step: "web start",
                    source,
                })?;
        }
        self.advance(report, Phase::Started, StepOutcome::Completed);
        Ok(())
    }

    fn check_preconditions(&self, mode: RunMode, sym: &Path) -> Result<(), InstallError> {
        match (mode, self.pointer.exists(sym)) {
            (RunMode::Install, true) => Err(InstallError::PointerExists(sym.to_path_buf())),
            (RunMode::Upgrade, false) => Err(InstallError::PointerMissing(sym.to_path_buf())),
            _ => Ok(()),
        }
    }

    fn stop_previous(&mut self) -> StepOutcome {
        let mut failures = Vec::new();
        if let Err(err) = self.lifecycle.stop_core(&mut *self.runtime) {
            failures.push(format!("server: {err}"));
        }
        if self.lifecycle.web_enabled() {
            if let Err(err) = self.lifecycle.stop_web(&mut *self.runtime) {
                failures.push(format!("web: {err}"));
            }
        }
        if failures.is_empty() {
            StepOutcome::Completed
        } else {
            StepOutcome::Degraded(failures.join("; "))
        }
    }

    fn prepare_database(
        &mut self,
        mode: RunMode,
        options: &RunOptions,
        release: &Path,
    ) -> Result<StepOutcome, InstallError> {
        let mut ran = false;
        if mode == RunMode::Install && options.init_db {
            self.database
                .init(release, &options.database, &mut *self.runtime)
                .map_err(|source| InstallError::Database {
                    action: "init",
                    source,
                })?;
            ran = true;
        }
        if options.upgrade_db {
            self.database
                .upgrade(release, &options.database, &mut *self.runtime)
                .map_err(|source| InstallError::Database {
                    action: "upgrade",
                    source,
                })?;
            ran = true;
        }
        Ok(if ran {
            StepOutcome::Completed
        } else {
            skipped("not requested")
        })
    }

    fn advance(&mut self, report: &mut RunReport, phase: Phase, outcome: StepOutcome) {
        let ctx = self.context(report.mode, phase);
        match &outcome {
            StepOutcome::Completed => {
                log_phase_event(Some(&ctx), "phase.completed", phase.as_str(), PhaseOutcome::Success)
            }
            StepOutcome::Skipped(reason) => cut_info!(context = ctx, "skipped: {reason}"),
            StepOutcome::Degraded(reason) => {
                cut_warn!(context = ctx, "continuing after failure: {reason}");
                log_phase_event(Some(&ctx), "phase.degraded", reason, PhaseOutcome::Degraded);
            }
        }
        report.steps.push(StepRecord {
            phase,
            outcome,
            at: Utc::now(),
        });
        self.state = RunState::At(phase);
    }

    fn context(&self, mode: RunMode, phase: Phase) -> PhaseContext<'_> {
        PhaseContext::new()
            .with_mode(mode.as_str())
            .with_phase(phase.as_str())
            .with_pointer(&self.pointer_label)
    }
}

fn skipped(reason: &str) -> StepOutcome {
    StepOutcome::Skipped(reason.to_owned())
}
