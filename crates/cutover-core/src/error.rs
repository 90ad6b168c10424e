//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Error types and process exit codes for install/upgrade runs."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::io;
use std::path::PathBuf;

use cutover_pointer::PointerError;
use thiserror::Error;

/// Failures reported by the service runtime and database collaborators.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("admin executable not found: {0}")]
    MissingBinary(PathBuf),
    #[error("runtime has not been prepared for an instance")]
    NotPrepared,
    #[error("no previous instance context has been captured")]
    NoPreviousInstance,
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("command `{command}` failed: {status}")]
    CommandFailed { command: String, status: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// Reasons an install or upgrade run stops.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("unzip disabled, exiting")]
    UnpackDisabled,
    #[error("stable pointer is missing: {}", .0.display())]
    PointerMissing(PathBuf),
    #[error("stable pointer already exists: {}", .0.display())]
    PointerExists(PathBuf),
    #[error("previous configuration not found: {}", .0.display())]
    MissingConfiguration(PathBuf),
    #[error("expected file, found: {kind} {input}")]
    PrestartNotFile { kind: &'static str, input: String },
    #[error("invalid run options: {0}")]
    InvalidOptions(String),
    #[error("release resolution failed: {0}")]
    Release(String),
    #[error(transparent)]
    Pointer(#[from] PointerError),
    #[error("{step} failed: {source}")]
    Gateway {
        step: &'static str,
        #[source]
        source: GatewayError,
    },
    #[error("database {action} failed: {source}")]
    Database {
        action: &'static str,
        #[source]
        source: GatewayError,
    },
    #[error("archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl InstallError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallError::UnpackDisabled => 0,
            InstallError::PointerMissing(_) | InstallError::PointerExists(_) => 30,
            InstallError::MissingConfiguration(_) => 40,
            InstallError::PrestartNotFile { .. } => 50,
            _ => 1,
        }
    }

    /// Whether the run ended early without anything being wrong.
    pub fn is_clean_exit(&self) -> bool {
        self.exit_code() == 0
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        InstallError::Io {
            context: context.into(),
            source,
        }
    }
}
