//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Configuration carry-over, pre-start replay and port setup."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use cutover_common::PortSettings;
use cutover_pointer::same_entry;
use tracing::{debug, info};

use crate::error::InstallError;
use crate::gateway::{CommandLine, ServiceRuntime};
use crate::release::{resolve_local_input, LocalInput};

/// What happened to the new instance's configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarryOver {
    Copied,
    /// Source and destination already matched; nothing was written.
    AlreadyIdentical,
    Deleted,
    NothingToDelete,
}

#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    config_file: PathBuf,
    ports: PortSettings,
}

impl ConfigurationManager {
    /// `config_file` is relative to an instance directory.
    pub fn new(config_file: impl Into<PathBuf>, ports: PortSettings) -> Self {
        Self {
            config_file: config_file.into(),
            ports,
        }
    }

    /// Carry the configuration over, replay pre-start files, then set ports.
    pub fn configure(
        &self,
        runtime: &mut dyn ServiceRuntime,
        copy_old: bool,
        previous_pointer: &Path,
        new_dir: &Path,
        prestart_files: &[String],
    ) -> Result<CarryOver, InstallError> {
        let carried = self.carry_over(copy_old, previous_pointer, new_dir)?;
        self.apply_prestart(runtime, prestart_files)?;
        self.apply_ports(runtime)?;
        Ok(carried)
    }

    /// Copy the previous configuration into `new_dir`, or delete the
    /// destination so defaults apply at next start.
    pub fn carry_over(
        &self,
        copy_old: bool,
        previous_pointer: &Path,
        new_dir: &Path,
    ) -> Result<CarryOver, InstallError> {
        let target = new_dir.join(&self.config_file);

        if !copy_old {
            if !target.exists() {
                return Ok(CarryOver::NothingToDelete);
            }
            info!(path = %target.display(), "deleting configuration file");
            fs::remove_file(&target).map_err(|source| {
                InstallError::io(format!("unable to delete {}", target.display()), source)
            })?;
            return Ok(CarryOver::Deleted);
        }

        let source = previous_pointer.join(&self.config_file);
        info!(from = %source.display(), "copying old configuration");
        if !source.is_file() {
            return Err(InstallError::MissingConfiguration(source));
        }
        if target.exists() && same_contents(&source, &target)? {
            debug!(path = %target.display(), "configuration already in place");
            return Ok(CarryOver::AlreadyIdentical);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                InstallError::io(format!("unable to create {}", parent.display()), err)
            })?;
        }
        fs::copy(&source, &target).map_err(|err| {
            InstallError::io(
                format!("unable to copy {} to {}", source.display(), target.display()),
                err,
            )
        })?;
        Ok(CarryOver::Copied)
    }

    /// Replay each pre-start file as a `load` admin command, in order. The
    /// first input that is not a local file stops the run.
    pub fn apply_prestart(
        &self,
        runtime: &mut dyn ServiceRuntime,
        prestart_files: &[String],
    ) -> Result<usize, InstallError> {
        for input in prestart_files {
            info!(input = %input, "loading prestart file");
            let path = match resolve_local_input(input)? {
                LocalInput::File(path) => path,
                other => {
                    return Err(InstallError::PrestartNotFile {
                        kind: other.kind(),
                        input: input.clone(),
                    })
                }
            };
            let command = CommandLine::new().arg("load").arg(path.to_string_lossy());
            runtime
                .run_admin(&command)
                .map_err(|source| InstallError::Gateway {
                    step: "prestart load",
                    source,
                })?;
        }
        Ok(prestart_files.len())
    }

    pub fn apply_ports(&self, runtime: &mut dyn ServiceRuntime) -> Result<(), InstallError> {
        let command = CommandLine::from(["admin", "ports", "--skipcheck"])
            .arg("--registry")
            .arg(self.ports.registry.to_string())
            .arg("--tcp")
            .arg(self.ports.tcp.to_string())
            .arg("--ssl")
            .arg(self.ports.ssl.to_string());
        runtime
            .run_admin(&command)
            .map_err(|source| InstallError::Gateway {
                step: "port configuration",
                source,
            })
    }
}

/// Same filesystem entry, or byte-identical contents.
fn same_contents(a: &Path, b: &Path) -> Result<bool, InstallError> {
    let compare_err =
        |source| InstallError::io(format!("unable to compare {} with {}", a.display(), b.display()), source);
    if same_entry(a, b).map_err(compare_err)? == Some(true) {
        return Ok(true);
    }
    let left = fs::read(a).map_err(compare_err)?;
    let right = fs::read(b).map_err(compare_err)?;
    Ok(left == right)
}
