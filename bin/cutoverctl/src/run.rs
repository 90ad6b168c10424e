//! ---
//! cutover_section: "05-cli"
//! cutover_subsection: "binary"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Install and upgrade CLI for pointer-addressed service instances."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use cutover_common::version::VersionInfo;
use cutover_common::{init_tracing, InstallSettings};
use cutover_core::{
    AdminDatabase, DatabaseOptions, LocalReleaseResolver, Orchestrator, ProcessRuntime, RunMode,
    RunOptions, RunReport, StepOutcome,
};
use cutover_logging::{cut_info, PhaseContext};
use cutover_pointer::{detect_pointer, DirectoryPointer};
use indexmap::IndexMap;
use tracing::debug;

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub verbose: u8,
    pub quiet: u8,
}

/// Arguments shared by `install` and `upgrade`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Release directory or release zip.
    #[arg(value_name = "SERVER")]
    server: Option<String>,

    /// Resolve and print settings without changing anything.
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// Exit without installing when the release would need unpacking.
    #[arg(long)]
    skipunzip: bool,

    /// Admin command file loaded before the service starts (repeatable).
    #[arg(long = "prestartfile", value_name = "FILE")]
    prestart_files: Vec<String>,

    /// Do not copy the previous configuration file when upgrading.
    #[arg(long)]
    ignoreconfig: bool,

    #[arg(long, value_name = "PREFIX", help = "Port prefix")]
    prefix: Option<String>,
    #[arg(long, value_name = "PORT")]
    registry: Option<String>,
    #[arg(long, value_name = "PORT")]
    tcp: Option<String>,
    #[arg(long, value_name = "PORT")]
    ssl: Option<String>,

    /// Stable pointer naming the active instance.
    #[arg(long, value_name = "PATH")]
    sym: Option<String>,

    #[arg(long, value_name = "BOOL")]
    skipweb: Option<String>,
    /// Keep the previous instance directory after switching.
    #[arg(long, value_name = "BOOL")]
    skipdelete: Option<String>,
    /// Keep the previous instance's `.zip` after switching.
    #[arg(long, value_name = "BOOL")]
    skipdeletezip: Option<String>,

    /// Environment variable names recorded after start.
    #[arg(long, value_name = "NAMES")]
    savevars: Option<String>,
    #[arg(long, value_name = "FILE")]
    savevarsfile: Option<String>,

    /// Directory receiving unpacked release archives.
    #[arg(long, value_name = "DIR")]
    unzipdir: Option<String>,

    #[arg(long, value_name = "HOST")]
    dbhost: Option<String>,
    #[arg(long, value_name = "NAME")]
    dbname: Option<String>,
    #[arg(long, value_name = "USER")]
    dbuser: Option<String>,
    #[arg(long, value_name = "PASSWORD", env = "CUTOVER_DBPASS", hide_env_values = true)]
    dbpass: Option<String>,
}

impl RunArgs {
    fn overrides(&self) -> IndexMap<String, String> {
        let pairs = [
            ("prefix", &self.prefix),
            ("registry", &self.registry),
            ("tcp", &self.tcp),
            ("ssl", &self.ssl),
            ("sym", &self.sym),
            ("skipweb", &self.skipweb),
            ("skipdelete", &self.skipdelete),
            ("skipdeletezip", &self.skipdeletezip),
            ("savevars", &self.savevars),
            ("savevarsfile", &self.savevarsfile),
            ("unzipdir", &self.unzipdir),
        ];
        pairs
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_owned(), v.clone())))
            .collect()
    }

    fn base_options(&self) -> RunOptions {
        RunOptions {
            server: self.server.clone(),
            prestart_files: self.prestart_files.clone(),
            ignore_config: self.ignoreconfig,
            database: DatabaseOptions {
                host: self.dbhost.clone(),
                name: self.dbname.clone(),
                user: self.dbuser.clone(),
                password: self.dbpass.clone(),
            },
            ..RunOptions::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    #[command(flatten)]
    pub common: RunArgs,

    /// Initialise the database.
    #[arg(long, conflicts_with = "upgradedb")]
    initdb: bool,

    /// Upgrade the database.
    #[arg(long)]
    upgradedb: bool,
}

impl InstallArgs {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            init_db: self.initdb,
            upgrade_db: self.upgradedb,
            ..self.common.base_options()
        }
    }
}

#[derive(Debug, Args)]
pub struct UpgradeArgs {
    #[command(flatten)]
    pub common: RunArgs,

    /// Upgrade the database.
    #[arg(long)]
    upgradedb: bool,

    /// Zip the previous instance's logs to this file, overwriting it.
    #[arg(long, value_name = "ZIP")]
    archivelogs: Option<PathBuf>,
}

impl UpgradeArgs {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            upgrade_db: self.upgradedb,
            archive_logs: self.archivelogs.clone(),
            ..self.common.base_options()
        }
    }
}

pub fn execute(
    mode: RunMode,
    args: RunArgs,
    options: RunOptions,
    global: &GlobalArgs,
) -> Result<ExitCode> {
    let env: IndexMap<String, String> = std::env::vars().collect();
    let loaded = InstallSettings::load(global.config.as_deref(), &env, &args.overrides())
        .context("failed to load settings")?;
    let settings = loaded.settings;

    let mut logging = settings.logging.clone();
    logging.level = effective_level(&logging.level, global.verbose, global.quiet);
    init_tracing("cutoverctl", &logging)?;

    let ctx = PhaseContext::new().with_mode(mode.as_str());
    cut_info!(context = ctx, "{}", VersionInfo::current().banner());
    if let Some(source) = &loaded.source {
        debug!(config_path = %source.display(), "settings file loaded");
    }
    for (key, value) in &loaded.resolved {
        debug!(key = %key, value = %value, "setting");
    }

    if args.dry_run {
        cut_info!(context = ctx, "dry run, nothing changed");
        for (key, value) in &loaded.resolved {
            println!("{key} = {value}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let scratch = settings
        .sym
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let pointer = detect_pointer(scratch);
    debug!(kind = %pointer.kind(), "pointer variant selected");

    let mut runtime = ProcessRuntime::new(&settings.admin_binary);
    let mut database = AdminDatabase::new();
    let resolver = LocalReleaseResolver::new(&settings.unzip_dir, args.skipunzip);
    let mut orchestrator = Orchestrator::new(
        &settings,
        pointer.as_ref(),
        &mut runtime,
        &mut database,
        &resolver,
    );

    match orchestrator.run(mode, &options) {
        Ok(report) => {
            print_summary(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_clean_exit() => {
            println!("{err}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1)))
        }
    }
}

fn print_summary(report: &RunReport) {
    let release = report
        .release
        .as_deref()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    println!(
        "{} completed: {} -> {}",
        report.mode,
        report.pointer.display(),
        release
    );
    for step in &report.steps {
        let outcome = match &step.outcome {
            StepOutcome::Completed => "completed".to_owned(),
            StepOutcome::Skipped(reason) => format!("skipped ({reason})"),
            StepOutcome::Degraded(reason) => format!("degraded: {reason}"),
        };
        println!("  {:<14} {}", step.phase.as_str(), outcome);
    }
}

/// Shift a plain level by `-v`/`-q` counts. Complex directives are kept
/// unless a shift is requested.
fn effective_level(base: &str, verbose: u8, quiet: u8) -> String {
    if verbose == 0 && quiet == 0 {
        return base.to_owned();
    }
    let start = LEVELS
        .iter()
        .position(|level| level.eq_ignore_ascii_case(base.trim()))
        .unwrap_or(2);
    let shifted = (start as i32 + i32::from(verbose) - i32::from(quiet)).clamp(0, 4);
    LEVELS[shifted as usize].to_owned()
}
