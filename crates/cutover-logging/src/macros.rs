//! ---
//! cutover_section: "02-logging"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Structured phase-event logging helpers."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
//! Level-specific wrappers around [`phase_event!`]. Each accepts an optional
//! leading `context = <PhaseContext>`; without it the fields are empty.

/// Emit one event at `$level` carrying the mode, phase and pointer fields.
#[doc(hidden)]
#[macro_export]
macro_rules! phase_event {
    ($level:expr, context = $ctx:expr, $($arg:tt)+) => {{
        let ctx: &$crate::PhaseContext<'_> = &$ctx;
        tracing::event!(
            $level,
            mode = ctx.mode.unwrap_or(""),
            phase = ctx.phase.unwrap_or(""),
            pointer = ctx.pointer.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($level:expr, $($arg:tt)+) => {
        $crate::phase_event!($level, context = $crate::PhaseContext::default(), $($arg)+)
    };
}

/// Emit an informational event enriched with the phase context.
#[macro_export]
macro_rules! cut_info {
    ($($arg:tt)+) => { $crate::phase_event!(tracing::Level::INFO, $($arg)+) };
}

/// Emit a debug event enriched with the phase context.
#[macro_export]
macro_rules! cut_debug {
    ($($arg:tt)+) => { $crate::phase_event!(tracing::Level::DEBUG, $($arg)+) };
}

/// Emit a warning event enriched with the phase context.
#[macro_export]
macro_rules! cut_warn {
    ($($arg:tt)+) => { $crate::phase_event!(tracing::Level::WARN, $($arg)+) };
}

/// Emit an error event enriched with the phase context.
#[macro_export]
macro_rules! cut_error {
    ($($arg:tt)+) => { $crate::phase_event!(tracing::Level::ERROR, $($arg)+) };
}
