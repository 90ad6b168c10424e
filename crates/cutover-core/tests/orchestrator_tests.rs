//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "tests"
//! cutover_type: "source"
//! cutover_scope: "test"
//! cutover_description: "End-to-end install and upgrade runs against a recording runtime."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use cutover_common::InstallSettings;
use cutover_core::{
    AdminDatabase, CommandLine, EnvironmentSnapshot, GatewayError, InstallError,
    LocalReleaseResolver, Orchestrator, Phase, RunMode, RunOptions, RunReport, RunState,
    ServiceRuntime, StepOutcome, WebControl,
};
use cutover_pointer::{sidecar_path, DirectoryPointer, EmulatedPointer, NativePointer};

/// Records every call; commands listed in `fail` return an error.
#[derive(Default)]
struct RecordingRuntime {
    calls: Vec<String>,
    fail: Vec<String>,
    missing_vars: Vec<String>,
}

impl RecordingRuntime {
    fn failing(entries: &[&str]) -> Self {
        Self {
            fail: entries.iter().map(|e| (*e).to_owned()).collect(),
            ..Self::default()
        }
    }

    fn record(&mut self, entry: String) -> Result<(), GatewayError> {
        let failed = self.fail.contains(&entry);
        self.calls.push(entry.clone());
        if failed {
            return Err(GatewayError::CommandFailed {
                command: entry,
                status: "exit status: 1".into(),
            });
        }
        Ok(())
    }

    fn position(&self, entry: &str) -> usize {
        self.calls
            .iter()
            .position(|call| call == entry)
            .unwrap_or_else(|| panic!("{entry} not called; calls: {:?}", self.calls))
    }

    fn loads(&self) -> Vec<&String> {
        self.calls
            .iter()
            .filter(|call| call.starts_with("admin: load "))
            .collect()
    }
}

impl ServiceRuntime for RecordingRuntime {
    fn prepare(&mut self, instance: &Path) -> Result<(), GatewayError> {
        self.record(format!("prepare: {}", instance.display()))
    }

    fn capture_environment(
        &mut self,
        previous_pointer: &Path,
        _snapshot_file: &Path,
    ) -> Result<(), GatewayError> {
        self.record(format!("capture: {}", previous_pointer.display()))
    }

    fn run_admin(&mut self, command: &CommandLine) -> Result<(), GatewayError> {
        self.record(format!("admin: {command}"))
    }

    fn run_legacy(&mut self, command: &CommandLine) -> Result<(), GatewayError> {
        self.record(format!("legacy: {command}"))
    }

    fn run_program(&mut self, program: &str, command: &CommandLine) -> Result<(), GatewayError> {
        self.record(format!("program: {program} {command}"))
    }

    fn save_environment(
        &mut self,
        names: &[String],
        destination: &Path,
    ) -> Result<EnvironmentSnapshot, GatewayError> {
        self.record(format!("save-env: {}", destination.display()))?;
        let (missing, written) = names
            .iter()
            .cloned()
            .partition(|name| self.missing_vars.contains(name));
        Ok(EnvironmentSnapshot { written, missing })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    settings: InstallSettings,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut settings = InstallSettings::defaults().unwrap();
        settings.sym = root.join("CURRENT");
        settings.save_vars_file = settings.sym.join("cutover.envvars");
        settings.skip_web = true;
        settings.unzip_dir = root.clone();
        Self {
            _dir: dir,
            root,
            settings,
        }
    }

    fn release(&self, name: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::create_dir_all(path.join("etc")).unwrap();
        path
    }

    /// Previous instance with configuration, logs and a release archive.
    fn installed(&self, name: &str) -> PathBuf {
        let path = self.release(name);
        fs::write(path.join("etc/config.xml"), "<config tuned=\"yes\"/>").unwrap();
        fs::create_dir_all(path.join("var/log")).unwrap();
        fs::write(path.join("var/log/service-0.log"), "started").unwrap();
        fs::write(cutover_core::archive_path(&path), "zip").unwrap();
        std::os::unix::fs::symlink(&path, &self.settings.sym).unwrap();
        path
    }

    fn file(&self, name: &str) -> String {
        let path = self.root.join(name);
        fs::write(&path, "config set key value").unwrap();
        path.to_string_lossy().into_owned()
    }

    fn run(
        &self,
        mode: RunMode,
        options: &RunOptions,
        runtime: &mut RecordingRuntime,
    ) -> (Result<RunReport, InstallError>, RunState) {
        let pointer = NativePointer::new();
        let resolver = LocalReleaseResolver::new(&self.settings.unzip_dir, false);
        let mut database = AdminDatabase::new();
        let mut orchestrator =
            Orchestrator::new(&self.settings, &pointer, runtime, &mut database, &resolver);
        let result = orchestrator.run(mode, options);
        (result, orchestrator.state().clone())
    }

    fn pointer_target(&self) -> PathBuf {
        NativePointer::new().read(&self.settings.sym).unwrap()
    }
}

fn server(path: &Path) -> Option<String> {
    Some(path.to_string_lossy().into_owned())
}

#[test]
fn install_aborts_when_pointer_exists() {
    let fixture = Fixture::new();
    let old = fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&new),
        init_db: true,
        ..RunOptions::default()
    };

    let (result, state) = fixture.run(RunMode::Install, &options, &mut runtime);

    let err = result.unwrap_err();
    assert!(matches!(err, InstallError::PointerExists(_)));
    assert_eq!(err.exit_code(), 30);
    assert!(runtime.calls.is_empty());
    assert_eq!(fixture.pointer_target(), old);
    assert!(old.join("etc/config.xml").exists());
    assert!(new.is_dir());
    assert!(matches!(
        state,
        RunState::Aborted {
            last_phase: Phase::Resolving,
            code: 30,
            ..
        }
    ));
}

#[test]
fn upgrade_aborts_when_pointer_missing() {
    let fixture = Fixture::new();
    let new = fixture.release("service-5.2");
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&new),
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Upgrade, &options, &mut runtime);

    let err = result.unwrap_err();
    assert!(matches!(err, InstallError::PointerMissing(_)));
    assert_eq!(err.exit_code(), 30);
    assert!(runtime.calls.is_empty());
    assert!(fs::symlink_metadata(&fixture.settings.sym).is_err());
}

#[test]
fn fresh_install_links_configures_and_starts() {
    let fixture = Fixture::new();
    let release = fixture.release("service-5.2");
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&release),
        init_db: true,
        ..RunOptions::default()
    };

    let (result, state) = fixture.run(RunMode::Install, &options, &mut runtime);
    let report = result.unwrap();

    assert_eq!(fixture.pointer_target(), release);
    assert!(!release.join("etc/config.xml").exists());
    assert_eq!(
        runtime.calls,
        vec![
            format!("prepare: {}", release.display()),
            "admin: admin ports --skipcheck --registry 4061 --tcp 4063 --ssl 4064".to_owned(),
            "admin: db init".to_owned(),
            format!("save-env: {}", fixture.settings.save_vars_file.display()),
            "admin: admin start".to_owned(),
        ]
    );
    assert_eq!(report.outcome(Phase::Linked), Some(&StepOutcome::Completed));
    assert_eq!(
        report.outcome(Phase::Switched),
        Some(&StepOutcome::Skipped("linked at install".to_owned()))
    );
    assert_eq!(report.outcome(Phase::Started), Some(&StepOutcome::Completed));
    assert_eq!(report.degraded().count(), 0);
    assert_eq!(state, RunState::At(Phase::Started));
}

#[test]
fn upgrade_survives_failed_stop_and_switches() {
    let fixture = Fixture::new();
    let old = fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    let archive = fixture.root.join("old.zip");
    let mut runtime = RecordingRuntime::failing(&["legacy: admin stop"]);
    let options = RunOptions {
        server: server(&new),
        upgrade_db: true,
        archive_logs: Some(archive.clone()),
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Upgrade, &options, &mut runtime);
    let report = result.unwrap();

    assert!(matches!(
        report.outcome(Phase::Stopped),
        Some(StepOutcome::Degraded(_))
    ));
    assert_eq!(
        report.outcome(Phase::LogsArchived),
        Some(&StepOutcome::Completed)
    );
    assert!(archive.is_file());
    assert_eq!(
        fs::read_to_string(new.join("etc/config.xml")).unwrap(),
        "<config tuned=\"yes\"/>"
    );
    assert_eq!(fixture.pointer_target(), new);
    assert!(!old.exists());
    assert!(!cutover_core::archive_path(&old).exists());

    let capture = runtime.position(&format!("capture: {}", fixture.settings.sym.display()));
    let stop = runtime.position("legacy: admin stop");
    let ports = runtime.position("admin: admin ports --skipcheck --registry 4061 --tcp 4063 --ssl 4064");
    let db = runtime.position("admin: db upgrade");
    let start = runtime.position("admin: admin start");
    assert!(capture < stop && stop < ports && ports < db && db < start);
}

#[test]
fn upgrade_stops_and_starts_web_component() {
    let mut fixture = Fixture::new();
    fixture.settings.skip_web = false;
    fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&new),
        ..RunOptions::default()
    };

    let pointer = NativePointer::new();
    let resolver = LocalReleaseResolver::new(&fixture.settings.unzip_dir, false);
    let mut database = AdminDatabase::new();
    Orchestrator::new(&fixture.settings, &pointer, &mut runtime, &mut database, &resolver)
        .with_web_control(WebControl::Standalone)
        .run(RunMode::Upgrade, &options)
        .unwrap();

    let stop_web = runtime.position("legacy: web stop");
    let start = runtime.position("admin: admin start");
    let start_web = runtime.position("admin: web start");
    assert!(runtime.position("legacy: admin stop") < stop_web);
    assert!(start < start_web);
}

#[test]
fn prestart_files_replay_in_order() {
    let fixture = Fixture::new();
    fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    let f1 = fixture.file("f1.cmd");
    let f2 = fixture.file("f2.cmd");
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&new),
        prestart_files: vec![f1.clone(), f2.clone()],
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Upgrade, &options, &mut runtime);
    result.unwrap();

    assert_eq!(
        runtime.loads(),
        vec![&format!("admin: load {f1}"), &format!("admin: load {f2}")]
    );
}

#[test]
fn prestart_directory_aborts_before_later_inputs() {
    let fixture = Fixture::new();
    let old = fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    let f2 = fixture.file("f2.cmd");
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&new),
        prestart_files: vec![fixture.root.to_string_lossy().into_owned(), f2],
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Upgrade, &options, &mut runtime);

    let err = result.unwrap_err();
    assert_eq!(err.exit_code(), 50);
    assert!(err.to_string().contains("directory"));
    assert!(runtime.loads().is_empty());
    assert_eq!(fixture.pointer_target(), old);
    assert!(!runtime.calls.iter().any(|call| call == "admin: admin start"));
}

#[test]
fn missing_previous_configuration_aborts() {
    let fixture = Fixture::new();
    let old = fixture.installed("service-5.1");
    fs::remove_file(old.join("etc/config.xml")).unwrap();
    let new = fixture.release("service-5.2");
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&new),
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Upgrade, &options, &mut runtime);

    assert_eq!(result.unwrap_err().exit_code(), 40);
    assert_eq!(fixture.pointer_target(), old);
    assert!(old.is_dir());
}

#[test]
fn ignored_configuration_removes_shipped_file() {
    let fixture = Fixture::new();
    fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    fs::write(new.join("etc/config.xml"), "shipped").unwrap();
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&new),
        ignore_config: true,
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Upgrade, &options, &mut runtime);
    result.unwrap();

    assert!(!new.join("etc/config.xml").exists());
    assert_eq!(fixture.pointer_target(), new);
}

#[test]
fn kept_directories_survive_switchover() {
    let mut fixture = Fixture::new();
    fixture.settings.skip_delete = true;
    let old = fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&new),
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Upgrade, &options, &mut runtime);
    result.unwrap();

    assert!(old.is_dir());
    assert!(!cutover_core::archive_path(&old).exists());
    assert_eq!(fixture.pointer_target(), new);
}

#[test]
fn database_failure_prevents_start() {
    let fixture = Fixture::new();
    fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    let mut runtime = RecordingRuntime::failing(&["admin: db upgrade"]);
    let options = RunOptions {
        server: server(&new),
        upgrade_db: true,
        ..RunOptions::default()
    };

    let (result, state) = fixture.run(RunMode::Upgrade, &options, &mut runtime);

    let err = result.unwrap_err();
    assert!(matches!(err, InstallError::Database { action: "upgrade", .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(!runtime.calls.iter().any(|call| call == "admin: admin start"));
    assert!(matches!(
        state,
        RunState::Aborted {
            last_phase: Phase::Switched,
            ..
        }
    ));
}

#[test]
fn start_failure_is_fatal_after_switch() {
    let fixture = Fixture::new();
    fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    let mut runtime = RecordingRuntime::failing(&["admin: admin start"]);
    let options = RunOptions {
        server: server(&new),
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Upgrade, &options, &mut runtime);

    assert!(matches!(
        result.unwrap_err(),
        InstallError::Gateway { step: "start", .. }
    ));
    assert_eq!(fixture.pointer_target(), new);
}

#[test]
fn incomplete_environment_snapshot_is_not_fatal() {
    let fixture = Fixture::new();
    let release = fixture.release("service-5.2");
    let mut runtime = RecordingRuntime {
        missing_vars: vec!["PYTHONPATH".to_owned()],
        ..RecordingRuntime::default()
    };
    let options = RunOptions {
        server: server(&release),
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Install, &options, &mut runtime);
    let report = result.unwrap();

    assert!(matches!(
        report.outcome(Phase::EnvSaved),
        Some(StepOutcome::Degraded(reason)) if reason.contains("PYTHONPATH")
    ));
    assert_eq!(report.outcome(Phase::Started), Some(&StepOutcome::Completed));
}

#[test]
fn disabled_unpacking_exits_cleanly() {
    let fixture = Fixture::new();
    let mut runtime = RecordingRuntime::default();
    let pointer = NativePointer::new();
    let resolver = LocalReleaseResolver::new(&fixture.settings.unzip_dir, true);
    let mut database = AdminDatabase::new();
    let err = Orchestrator::new(&fixture.settings, &pointer, &mut runtime, &mut database, &resolver)
        .run(RunMode::Install, &RunOptions::default())
        .unwrap_err();

    assert!(matches!(err, InstallError::UnpackDisabled));
    assert_eq!(err.exit_code(), 0);
    assert!(runtime.calls.is_empty());
    assert!(fs::symlink_metadata(&fixture.settings.sym).is_err());
}

#[test]
fn upgrade_to_active_release_keeps_it() {
    let fixture = Fixture::new();
    let active = fixture.installed("service-5.2");
    let mut runtime = RecordingRuntime::default();
    let options = RunOptions {
        server: server(&active),
        ..RunOptions::default()
    };

    let (result, _) = fixture.run(RunMode::Upgrade, &options, &mut runtime);
    let report = result.unwrap();

    assert_eq!(
        report.outcome(Phase::Switched),
        Some(&StepOutcome::Skipped("release is already active".to_owned()))
    );
    assert!(active.join("etc/config.xml").is_file());
    assert!(cutover_core::archive_path(&active).exists());
    assert_eq!(fixture.pointer_target(), active);
    assert!(runtime.calls.iter().any(|call| call == "admin: admin start"));
}

#[test]
fn emulated_pointer_upgrade_records_new_target() {
    let fixture = Fixture::new();
    let old = fixture.installed("service-5.1");
    let new = fixture.release("service-5.2");
    let pointer = EmulatedPointer::new();
    pointer.remove(&fixture.settings.sym).unwrap();
    pointer.create(&old, &fixture.settings.sym).unwrap();
    let mut runtime = RecordingRuntime::default();
    let resolver = LocalReleaseResolver::new(&fixture.settings.unzip_dir, false);
    let mut database = AdminDatabase::new();
    let options = RunOptions {
        server: server(&new),
        ..RunOptions::default()
    };

    Orchestrator::new(&fixture.settings, &pointer, &mut runtime, &mut database, &resolver)
        .run(RunMode::Upgrade, &options)
        .unwrap();

    let sidecar = sidecar_path(&fixture.settings.sym);
    assert_eq!(fs::read_to_string(sidecar).unwrap(), new.to_string_lossy());
    assert_eq!(pointer.read(&fixture.settings.sym).unwrap(), new);
    assert!(!old.exists());
}
