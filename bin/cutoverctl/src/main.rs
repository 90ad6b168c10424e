//! ---
//! cutover_section: "05-cli"
//! cutover_subsection: "binary"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Install and upgrade CLI for pointer-addressed service instances."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use cutover_common::version::VersionInfo;
use cutover_core::RunMode;

mod run;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "Install or upgrade a service instance behind a stable pointer",
    long_about = None
)]
struct Cli {
    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    /// Settings file (TOML). Defaults to CUTOVER_CONFIG when set.
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease log verbosity (repeatable).
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    quiet: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Set up a new installation.
    Install(run::InstallArgs),
    /// Upgrade an existing installation.
    Upgrade(run::UpgradeArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", VersionInfo::current().extended());
        return ExitCode::SUCCESS;
    }
    let global = run::GlobalArgs {
        config: cli.config,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    let result = match cli.command {
        Some(Commands::Install(args)) => {
            let options = args.run_options();
            run::execute(RunMode::Install, args.common, options, &global)
        }
        Some(Commands::Upgrade(args)) => {
            let options = args.run_options();
            run::execute(RunMode::Upgrade, args.common, options, &global)
        }
        None => {
            eprintln!("no command given; see --help");
            return ExitCode::from(2);
        }
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
