//! ---
//! cutover_section: "02-logging"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Structured phase-event logging helpers."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Phase-aware logging helpers shared by the orchestrator and the CLI.

use tracing::Level;

pub mod macros;

/// Structured context attached to every phase event.
#[derive(Debug, Default, Clone)]
pub struct PhaseContext<'a> {
    /// Run mode (`install` or `upgrade`).
    pub mode: Option<&'a str>,
    /// Orchestrator phase the event belongs to.
    pub phase: Option<&'a str>,
    /// Stable pointer path being operated on.
    pub pointer: Option<&'a str>,
}

impl<'a> PhaseContext<'a> {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the run mode.
    pub fn with_mode(mut self, mode: &'a str) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Attach the current phase.
    pub fn with_phase(mut self, phase: &'a str) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Attach the stable pointer path.
    pub fn with_pointer(mut self, pointer: &'a str) -> Self {
        self.pointer = Some(pointer);
        self
    }
}

/// Outcome recorded for a phase or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The step completed.
    Success,
    /// A best-effort step failed and the run continued.
    Degraded,
    /// The run was aborted.
    Fault,
}

impl PhaseOutcome {
    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseOutcome::Success => "success",
            PhaseOutcome::Degraded => "degraded",
            PhaseOutcome::Fault => "fault",
        }
    }

    /// Log level used when the outcome is emitted.
    pub fn level(&self) -> Level {
        match self {
            PhaseOutcome::Success => Level::INFO,
            PhaseOutcome::Degraded => Level::WARN,
            PhaseOutcome::Fault => Level::ERROR,
        }
    }
}

/// Emit a standardized phase event.
pub fn log_phase_event(
    context: Option<&PhaseContext>,
    event: &str,
    message: &str,
    outcome: PhaseOutcome,
) {
    let default = PhaseContext::default();
    let ctx = context.unwrap_or(&default);
    let mode = ctx.mode.unwrap_or("");
    let phase = ctx.phase.unwrap_or("");
    let pointer = ctx.pointer.unwrap_or("");
    // `tracing::event!` needs a constant level.
    match outcome {
        PhaseOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            mode,
            phase,
            pointer,
            message = %message
        ),
        PhaseOutcome::Degraded => tracing::event!(
            Level::WARN,
            event,
            outcome = outcome.as_str(),
            mode,
            phase,
            pointer,
            message = %message
        ),
        PhaseOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            mode,
            phase,
            pointer,
            message = %message
        ),
    }
}
