//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Stop and start sequences for the service and its web component."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use tracing::info;

use crate::error::GatewayError;
use crate::gateway::{CommandLine, ServiceRuntime};

/// How the web sub-component is driven on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebControl {
    Disabled,
    /// Self-hosted web server controlled with `web start` / `web stop`.
    Standalone,
    /// Web component registered with IIS, refreshed with `iisreset`.
    Iis,
}

impl WebControl {
    pub fn for_platform(skip_web: bool) -> Self {
        if skip_web {
            WebControl::Disabled
        } else if cfg!(windows) {
            WebControl::Iis
        } else {
            WebControl::Standalone
        }
    }
}

/// Issues stop/start commands. Severity is decided by the caller.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleController {
    web: WebControl,
}

impl LifecycleController {
    pub fn new(web: WebControl) -> Self {
        Self { web }
    }

    pub fn web_enabled(&self) -> bool {
        self.web != WebControl::Disabled
    }

    /// Stop the previous instance's core service using its own binary.
    pub fn stop_core(&self, runtime: &mut dyn ServiceRuntime) -> Result<(), GatewayError> {
        info!("stopping server");
        runtime.run_legacy(&CommandLine::from("admin status --nodeonly"))?;
        runtime.run_legacy(&CommandLine::from("admin stop"))
    }

    pub fn stop_web(&self, runtime: &mut dyn ServiceRuntime) -> Result<(), GatewayError> {
        match self.web {
            WebControl::Disabled => Ok(()),
            WebControl::Standalone => {
                info!("stopping web");
                runtime.run_legacy(&CommandLine::from("web stop"))
            }
            WebControl::Iis => {
                info!("removing web from IIS");
                runtime.run_legacy(&CommandLine::from("web iis --remove"))?;
                runtime.run_program("iisreset", &CommandLine::new())
            }
        }
    }

    pub fn start_core(&self, runtime: &mut dyn ServiceRuntime) -> Result<(), GatewayError> {
        info!("starting server");
        runtime.run_admin(&CommandLine::from("admin start"))
    }

    pub fn start_web(&self, runtime: &mut dyn ServiceRuntime) -> Result<(), GatewayError> {
        match self.web {
            WebControl::Disabled => Ok(()),
            WebControl::Standalone => {
                info!("starting web");
                runtime.run_admin(&CommandLine::from("web start"))
            }
            WebControl::Iis => {
                info!("configuring web in IIS");
                runtime.run_admin(&CommandLine::from("web iis"))?;
                runtime.run_program("iisreset", &CommandLine::new())
            }
        }
    }
}
