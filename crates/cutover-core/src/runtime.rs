//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Process-backed service runtime and database admin."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::gateway::{
    CommandLine, DatabaseAdmin, DatabaseOptions, EnvironmentSnapshot, ServiceRuntime,
};

#[derive(Debug, Clone)]
struct InstanceContext {
    directory: PathBuf,
    binary: PathBuf,
}

#[derive(Debug, Clone)]
struct PreviousContext {
    instance: InstanceContext,
    environment: IndexMap<String, String>,
}

/// Runs the service's admin executable as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    admin_binary: PathBuf,
    current: Option<InstanceContext>,
    previous: Option<PreviousContext>,
}

impl ProcessRuntime {
    /// `admin_binary` is resolved relative to each instance directory.
    pub fn new(admin_binary: impl Into<PathBuf>) -> Self {
        Self {
            admin_binary: admin_binary.into(),
            current: None,
            previous: None,
        }
    }

    fn locate(&self, directory: &Path) -> Result<InstanceContext, GatewayError> {
        let binary = directory.join(&self.admin_binary);
        if !binary.is_file() {
            return Err(GatewayError::MissingBinary(binary));
        }
        Ok(InstanceContext {
            directory: directory.to_path_buf(),
            binary,
        })
    }
}

impl ServiceRuntime for ProcessRuntime {
    fn prepare(&mut self, instance: &Path) -> Result<(), GatewayError> {
        let context = self.locate(instance)?;
        debug!(binary = %context.binary.display(), "admin binary located");
        self.current = Some(context);
        Ok(())
    }

    fn capture_environment(
        &mut self,
        previous_pointer: &Path,
        snapshot_file: &Path,
    ) -> Result<(), GatewayError> {
        // Pin the old directory now; the pointer is repointed later in the run.
        let directory = fs::canonicalize(previous_pointer).map_err(|source| GatewayError::Io {
            context: format!("unable to resolve {}", previous_pointer.display()),
            source,
        })?;
        let instance = self.locate(&directory)?;

        let environment = match fs::read_to_string(snapshot_file) {
            Ok(contents) => parse_env_file(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(
                    snapshot = %snapshot_file.display(),
                    "no saved environment for previous instance, using current environment"
                );
                IndexMap::new()
            }
            Err(source) => {
                return Err(GatewayError::Io {
                    context: format!("unable to read {}", snapshot_file.display()),
                    source,
                })
            }
        };
        info!(
            previous = %directory.display(),
            variables = environment.len(),
            "previous instance environment captured"
        );
        self.previous = Some(PreviousContext {
            instance,
            environment,
        });
        Ok(())
    }

    fn run_admin(&mut self, command: &CommandLine) -> Result<(), GatewayError> {
        let context = self.current.as_ref().ok_or(GatewayError::NotPrepared)?;
        let mut process = Command::new(&context.binary);
        process.args(command.args()).current_dir(&context.directory);
        execute(process, &format!("{} {command}", context.binary.display()))
    }

    fn run_legacy(&mut self, command: &CommandLine) -> Result<(), GatewayError> {
        let previous = self
            .previous
            .as_ref()
            .ok_or(GatewayError::NoPreviousInstance)?;
        let mut process = Command::new(&previous.instance.binary);
        process
            .args(command.args())
            .current_dir(&previous.instance.directory)
            .envs(&previous.environment);
        execute(
            process,
            &format!("{} {command}", previous.instance.binary.display()),
        )
    }

    fn run_program(&mut self, program: &str, command: &CommandLine) -> Result<(), GatewayError> {
        let mut process = Command::new(program);
        process.args(command.args());
        if let Some(context) = &self.current {
            process.current_dir(&context.directory);
        }
        execute(process, &format!("{program} {command}"))
    }

    fn save_environment(
        &mut self,
        names: &[String],
        destination: &Path,
    ) -> Result<EnvironmentSnapshot, GatewayError> {
        let mut values = IndexMap::new();
        let mut snapshot = EnvironmentSnapshot::default();
        for name in names {
            match env::var(name) {
                Ok(value) => {
                    values.insert(name.clone(), value);
                    snapshot.written.push(name.clone());
                }
                Err(_) => snapshot.missing.push(name.clone()),
            }
        }
        write_env_file(destination, &values).map_err(|source| GatewayError::Io {
            context: format!("unable to write {}", destination.display()),
            source,
        })?;
        Ok(snapshot)
    }
}

fn execute(mut process: Command, command_line: &str) -> Result<(), GatewayError> {
    debug!(command = %command_line, "running");
    let status = process.status().map_err(|source| GatewayError::Spawn {
        command: command_line.to_owned(),
        source,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(GatewayError::CommandFailed {
            command: command_line.to_owned(),
            status: status.to_string(),
        })
    }
}

/// Parse `NAME=value` lines. Blank lines and `#` comments are ignored.
pub fn parse_env_file(contents: &str) -> IndexMap<String, String> {
    contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, value)| (name.trim().to_owned(), value.to_owned()))
        .collect()
}

/// Write `NAME=value` lines, replacing any existing file.
pub fn write_env_file(path: &Path, values: &IndexMap<String, String>) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut contents = String::new();
    for (name, value) in values {
        contents.push_str(name);
        contents.push('=');
        contents.push_str(value);
        contents.push('\n');
    }
    fs::write(path, contents)
}

/// Database admin driven through the service's own `db` admin command.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdminDatabase;

impl AdminDatabase {
    pub fn new() -> Self {
        Self
    }

    fn command(action: &str, options: &DatabaseOptions) -> CommandLine {
        let mut command = CommandLine::from(["db", action]);
        let flags = [
            ("--dbhost", &options.host),
            ("--dbname", &options.name),
            ("--dbuser", &options.user),
            ("--dbpass", &options.password),
        ];
        for (flag, value) in flags {
            if let Some(value) = value {
                command = command.arg(flag).arg(value.as_str());
            }
        }
        command
    }
}

impl DatabaseAdmin for AdminDatabase {
    fn init(
        &mut self,
        instance: &Path,
        options: &DatabaseOptions,
        runtime: &mut dyn ServiceRuntime,
    ) -> Result<(), GatewayError> {
        info!(instance = %instance.display(), "initialising database");
        runtime.run_admin(&Self::command("init", options))
    }

    fn upgrade(
        &mut self,
        instance: &Path,
        options: &DatabaseOptions,
        runtime: &mut dyn ServiceRuntime,
    ) -> Result<(), GatewayError> {
        info!(instance = %instance.display(), "upgrading database");
        runtime.run_admin(&Self::command("upgrade", options))
    }
}
