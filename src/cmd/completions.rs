/*!
completions.rs

`ai completions <bash|zsh|fish>` prints a completion script. The scripts
call back into `ai --completions`, which prints one word per line:
subcommands, aliases and flags.
*/

use anyhow::Result;
use clap::{Args, ValueEnum};

use crate::alias::AliasTable;
use crate::config::{ConfigRecord, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Args, Debug, Default)]
pub struct CompletionsArgs {
    /// Shell to generate the script for
    pub shell: Option<Shell>,
}

const SUBCOMMANDS: &[&str] = &["init", "list", "default", "completions", "serve", "chat", "reply"];
const FLAGS: &[&str] = &[
    "--json", "--cmd", "--run", "--yolo", "--no-chat", "--reply", "--chat", "--file", "-j", "-c",
    "-r", "-y", "-F",
];

const BASH: &str = r#"# ai bash completion
# Add to ~/.bashrc: eval "$(ai completions bash)"
_ai_completions() {
    local cur="${COMP_WORDS[COMP_CWORD]}"
    local words
    words=$(ai --completions 2>/dev/null)
    COMPREPLY=($(compgen -W "$words" -- "$cur"))
}
complete -F _ai_completions ai"#;

const ZSH: &str = r#"# ai zsh completion
# Add to ~/.zshrc: eval "$(ai completions zsh)"
_ai_completions() {
    local words
    words=(${(f)"$(ai --completions 2>/dev/null)"})
    _describe 'ai' words
}
compdef _ai_completions ai"#;

const FISH: &str = r#"# ai fish completion
# Add to ~/.config/fish/config.fish: ai completions fish | source
complete -c ai -f -a "(ai --completions 2>/dev/null)""#;

pub fn script(shell: Shell) -> &'static str {
    match shell {
        Shell::Bash => BASH,
        Shell::Zsh => ZSH,
        Shell::Fish => FISH,
    }
}

/// Sorted, de-duplicated completion words.
pub fn completion_words(table: &AliasTable) -> Vec<String> {
    let mut words: Vec<String> = SUBCOMMANDS
        .iter()
        .chain(FLAGS)
        .map(|s| s.to_string())
        .chain(table.iter().map(|(name, _)| name.clone()))
        .collect();
    words.sort();
    words.dedup();
    words
}

pub fn execute_completions(args: CompletionsArgs) -> Result<()> {
    match args.shell {
        Some(shell) => println!("{}", script(shell)),
        None => {
            println!("Usage: ai completions <shell>");
            println!("Shells: bash, zsh, fish");
            println!("\nSetup:");
            println!("  bash: eval \"$(ai completions bash)\"  # in ~/.bashrc");
            println!("  zsh:  eval \"$(ai completions zsh)\"   # in ~/.zshrc");
            println!("  fish: ai completions fish | source");
        }
    }
    Ok(())
}

/// Hidden `ai --completions`. An unreadable config still yields the built-ins.
pub fn print_completion_words(settings: &Settings) -> Result<()> {
    let table = ConfigRecord::load(&settings.config_path())
        .and_then(|r| r.alias_table())
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "completions fall back to built-in aliases");
            AliasTable::builtin()
        });
    for word in completion_words(&table) {
        println!("{word}");
    }
    Ok(())
}
