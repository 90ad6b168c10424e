//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Install/upgrade orchestration for pointer-addressed service instances."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
pub mod archive;
pub mod configure;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod orchestrator;
pub mod release;
pub mod runtime;
pub mod switchover;

pub use archive::archive_logs;
pub use configure::{CarryOver, ConfigurationManager};
pub use error::{GatewayError, InstallError};
pub use gateway::{CommandLine, DatabaseAdmin, DatabaseOptions, EnvironmentSnapshot, ServiceRuntime};
pub use lifecycle::{LifecycleController, WebControl};
pub use orchestrator::{
    Orchestrator, Phase, RunMode, RunOptions, RunReport, RunState, StepOutcome, StepRecord,
};
pub use release::{resolve_local_input, LocalInput, LocalReleaseResolver, ReleaseResolver};
pub use runtime::{AdminDatabase, ProcessRuntime};
pub use switchover::{archive_path, SwitchOutcome, SwitchoverEngine};
