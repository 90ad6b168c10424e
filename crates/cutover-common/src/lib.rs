//! ---
//! cutover_section: "01-common"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Shared primitives for the install/upgrade tooling."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
//! Shared primitives for the Cutover workspace.
//! This crate exposes layered settings resolution, tracing initialisation and
//! version metadata consumed by the orchestrator and the admin CLI.

pub mod config;
pub mod logging;
pub mod settings;
pub mod version;

pub use config::{InstallSettings, LoadedSettings, PortSettings};
pub use logging::{init_tracing, LogFormat, LoggingConfig};
pub use settings::{RawSettings, SettingsError};
pub use version::VersionInfo;
