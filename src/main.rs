use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

mod alias;
mod chat;
mod classify;
mod cmd;
mod config;
mod context;
mod dispatch;
mod error;
mod provider;
mod server;
mod utils;

use cmd::{CompletionsArgs, DefaultArgs, InitArgs, ListArgs, ServeArgs};
use config::Settings;
use error::AiError;

/// ai - one command line for many AI backends
///
/// Usage:
///   ai <model> [model...] "prompt"     ask one model, or several at once
///   ai "prompt"                        ask the default model
///   ai chat ABC "continue"             continue chat ABC
///   ai reply "continue"                continue the most recent chat
///   ai chat list | ai chat delete ABC  manage chats
///
/// Prompt flags (anywhere before `--`):
///   -j/--json  -c/--cmd  -r/--run  -y/--yolo  --no-chat  --reply  --chat
///   -F/--file <path>[,<path>...]       attach files from the current directory
///
/// Global flags / env:
///   -v / -vv           Increase verbosity
///   -q / --quiet       Errors only
///   --home DIR         Storage root (AI_DISPATCH_HOME, default ~/.ai-cli)
#[derive(Parser, Debug)]
#[command(
    name = "ai",
    version,
    about = "ai - dispatch prompts to many AI backends through short model aliases",
    propagate_version = true,
    disable_help_subcommand = true,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Storage root for config and chats
    #[arg(long, env = "AI_DISPATCH_HOME", global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    /// Print completion words (used by the shell scripts)
    #[arg(long, hide = true)]
    completions: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Model tokens, chat addressing, flags and prompt text
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "ARGS"
    )]
    args: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect tools and models, regenerate aliases
    Init(InitArgs),

    /// Show models, aliases and the default
    List(ListArgs),

    /// Show, set or clear the default model
    Default(DefaultArgs),

    /// Print a shell completion script
    Completions(CompletionsArgs),

    /// Run the HTTP server
    Serve(ServeArgs),
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::resolve(cli.home)?;
    tracing::debug!(home = %settings.home.display(), "settings resolved");

    if cli.completions {
        return cmd::print_completion_words(&settings);
    }

    match cli.command {
        Some(Commands::Init(args)) => cmd::execute_init(settings, args),
        Some(Commands::List(args)) => cmd::execute_list(settings, args),
        Some(Commands::Default(args)) => cmd::execute_default(settings, args),
        Some(Commands::Completions(args)) => cmd::execute_completions(args),
        Some(Commands::Serve(args)) => cmd::execute_serve(settings, args),
        None if cli.args.is_empty() && std::io::stdin().is_terminal() => {
            Cli::command().print_help()?;
            Ok(())
        }
        None => cmd::execute_prompt(settings, cli.args),
    }
}

/// `Error: ...` plus `Tip: ...` when the chain carries an `AiError` with a hint.
fn report(err: &anyhow::Error) {
    eprintln!("Error: {err:#}");
    if let Some(hint) = err
        .chain()
        .find_map(|e| e.downcast_ref::<AiError>())
        .and_then(AiError::hint)
    {
        eprintln!("Tip: {hint}");
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = utils::derive_level(cli.verbose, cli.quiet);
    utils::init_logging(level);

    if let Err(e) = run(cli) {
        tracing::debug!(error = ?e, "command failed");
        report(&e);
        std::process::exit(1);
    }
}
