//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Collaborator contracts for the service runtime and database admin."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
//! Boundaries to the service being installed. The orchestrator only ever talks
//! to the service through these traits; [`crate::runtime`] holds the
//! process-backed implementations.

use std::fmt;
use std::path::Path;

use crate::error::GatewayError;

/// Argument vector for an admin or legacy command.
///
/// Built either from a pre-split sequence or from a single string split on
/// whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.0.push(arg.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for CommandLine {
    fn from(value: &str) -> Self {
        Self(value.split_whitespace().map(str::to_owned).collect())
    }
}

impl From<String> for CommandLine {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl<const N: usize> From<[&str; N]> for CommandLine {
    fn from(value: [&str; N]) -> Self {
        Self(value.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// What [`ServiceRuntime::save_environment`] managed to record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    pub written: Vec<String>,
    /// Requested names that were not set in the current environment.
    pub missing: Vec<String>,
}

impl EnvironmentSnapshot {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Command execution against the new instance and, during upgrades, the
/// instance being replaced.
pub trait ServiceRuntime {
    /// Establish the command context for the instance at `instance`.
    fn prepare(&mut self, instance: &Path) -> Result<(), GatewayError>;

    /// Capture the previous instance's context, including the environment
    /// saved in `snapshot_file`, for later legacy-binary calls.
    fn capture_environment(
        &mut self,
        previous_pointer: &Path,
        snapshot_file: &Path,
    ) -> Result<(), GatewayError>;

    /// Run an admin command with the new instance.
    fn run_admin(&mut self, command: &CommandLine) -> Result<(), GatewayError>;

    /// Run an admin command with the previous instance's binary and environment.
    fn run_legacy(&mut self, command: &CommandLine) -> Result<(), GatewayError>;

    /// Run an arbitrary host program.
    fn run_program(&mut self, program: &str, command: &CommandLine) -> Result<(), GatewayError>;

    /// Write the current values of `names` to `destination`.
    fn save_environment(
        &mut self,
        names: &[String],
        destination: &Path,
    ) -> Result<EnvironmentSnapshot, GatewayError>;
}

/// Connection options forwarded to the database admin.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DatabaseOptions {
    pub host: Option<String>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for DatabaseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseOptions")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Schema initialisation and upgrade. Both are fatal on failure.
pub trait DatabaseAdmin {
    fn init(
        &mut self,
        instance: &Path,
        options: &DatabaseOptions,
        runtime: &mut dyn ServiceRuntime,
    ) -> Result<(), GatewayError>;

    fn upgrade(
        &mut self,
        instance: &Path,
        options: &DatabaseOptions,
        runtime: &mut dyn ServiceRuntime,
    ) -> Result<(), GatewayError>;
}
