/*!
Command layer for the `ai` binary.

Layout:
  src/cmd/
    mod.rs          (this file: module declarations + re-exports)
    prompt.rs       default invocation: classify, dispatch, chat, cmd/run
    init.rs         InitArgs        + execute_init
    list.rs         ListArgs        + execute_list
    default.rs      DefaultArgs     + execute_default
    completions.rs  CompletionsArgs + execute_completions
    serve.rs        ServeArgs       + execute_serve
    confirm.rs      keypress confirmation for --run
    format.rs       color / table helpers for human output

Conventions:
  - Each subcommand module exposes one public `execute_*` function that
    takes the resolved `Settings` and returns `anyhow::Result<()>`.
  - Argument structs derive `clap::Args` and stay minimal.
  - Core errors stay `AiError` inside the chain so `main` can print hints.
*/

pub mod completions;
pub mod confirm;
pub mod default;
pub mod format;
pub mod init;
pub mod list;
pub mod prompt;
pub mod serve;

pub use completions::{CompletionsArgs, execute_completions, print_completion_words};
pub use default::{DefaultArgs, execute_default};
pub use init::{InitArgs, execute_init};
pub use list::{ListArgs, execute_list};
pub use prompt::execute_prompt;
pub use serve::{ServeArgs, execute_serve};
