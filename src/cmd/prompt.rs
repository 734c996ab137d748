/*!
prompt.rs

The default invocation: `ai [flags] [model...] [chat|reply ...] prompt`.

Flow:
  1. load config + alias table, classify the tokens
  2. `chat list` / `chat delete` / empty `reply` are answered from the store
  3. one model  -> session history, dispatch, persist the turn, footer
     many models -> concurrent fan-out, one section per model in token order
  4. `--cmd` / `--run` wrap the prompt with a shell instruction and reduce
     the answer to one command line; `--run` then confirms and executes it

Chat footer: `[Chat: ID]` follows the answer on a terminal; for JSON, cmd
mode or piped stdout it goes to stderr so stdout stays machine-clean.
*/

use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};

use crate::alias;
use crate::chat::{ChatSession, ChatStore};
use crate::classify::{self, ChatAddress, ChatCommand, ChatMode, RequestDescriptor, StdinInput};
use crate::cmd::confirm;
use crate::cmd::format::{Role, StyleOptions, TableOpts, color, section_rule, table};
use crate::config::{ConfigRecord, Settings};
use crate::context;
use crate::dispatch::{DispatchEngine, DispatchResult};
use crate::error::AiError;
use crate::provider::{CallOptions, ProviderRegistry};

/* -------------------------------------------------------------------------- */
/* Entry point                                                                */
/* -------------------------------------------------------------------------- */

pub fn execute_prompt(mut settings: Settings, tokens: Vec<String>) -> Result<()> {
    let record = ConfigRecord::load(&settings.config_path())?;
    settings.apply(&record);
    let table = record.alias_table()?;

    let desc = classify::classify(&tokens, &table, &mut StdinInput)?;
    let store = ChatStore::new(settings.chats_dir(), settings.limits);
    let style = StyleOptions::detect();

    if let Some(command) = desc.chat.command {
        return run_chat_command(&store, command, &desc.chat, &style);
    }
    if desc.chat.mode == ChatMode::Reply && desc.prompt.is_empty() {
        println!("{}", describe_latest(&store)?);
        return Ok(());
    }

    let context_blocks = if desc.files.is_empty() {
        String::new()
    } else {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        context::build_context(&desc.files, &cwd)?
    };

    let registry = ProviderRegistry::builtin(&settings)?;
    let engine = DispatchEngine::new(registry, table);
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    if desc.model_tokens.len() > 1 {
        let prompt = context::attach(&context_blocks, &desc.prompt);
        let opts = CallOptions {
            json: desc.flags.json,
            yolo: false,
        };
        let results = rt.block_on(engine.multi(&desc.model_tokens, &prompt, opts));
        println!("{}", render_multi(&results, &style));
        return Ok(());
    }

    let answer = rt.block_on(answer_single(&engine, &store, &desc, &context_blocks))?;
    drop(rt);
    emit_answer(&desc, answer, &style)
}

/* -------------------------------------------------------------------------- */
/* Single-model dispatch                                                      */
/* -------------------------------------------------------------------------- */

#[derive(Debug)]
pub struct SingleAnswer {
    /// Provider text, reduced to one command line in cmd/run mode.
    pub text: String,
    pub chat_id: Option<String>,
}

/// Session named by the chat addressing, when it targets an existing one.
fn open_existing(store: &ChatStore, chat: &ChatAddress) -> Result<Option<ChatSession>, AiError> {
    match (chat.mode, chat.session_id.as_deref()) {
        (ChatMode::Chat, Some(id)) => store
            .load(id)
            .map(Some)
            .ok_or_else(|| AiError::argument(format!("Chat session '{id}' not found"))),
        (ChatMode::Reply, _) => store.latest().map(Some).ok_or_else(|| {
            AiError::argument("No chat sessions to reply to. Start one with 'ai <model> <msg>'")
        }),
        _ => Ok(None),
    }
}

pub async fn answer_single(
    engine: &DispatchEngine,
    store: &ChatStore,
    desc: &RequestDescriptor,
    context_blocks: &str,
) -> Result<SingleAnswer, AiError> {
    let flags = desc.flags;
    let existing = open_existing(store, &desc.chat)?;

    // An explicit model wins; an addressed session otherwise keeps its own.
    let model_alias = desc
        .single_model()
        .map(str::to_string)
        .or_else(|| existing.as_ref().map(|s| s.model_alias.clone()))
        .ok_or_else(|| AiError::argument("model or prompt required"))?;
    let target = alias::resolve(&model_alias, engine.table())?;

    let mut session = match existing {
        _ if flags.no_chat => None,
        Some(s) => Some(s),
        None => Some(store.create(&model_alias, None)?),
    };

    let user_text = context::attach(context_blocks, &desc.prompt);
    let mut prompt = match session.as_mut() {
        Some(s) => {
            let limits = store.limits();
            s.enforce_limit(limits.max_chars, limits.max_messages);
            s.prompt_with_history(&user_text)
        }
        None => user_text,
    };
    if flags.cmd || flags.run {
        prompt = command_instruction(&prompt);
    }

    let opts = CallOptions {
        json: flags.json,
        yolo: flags.yolo && !flags.run,
    };
    let reply = engine
        .single(&target.provider, &target.model, &prompt, opts)
        .await?;

    if let Some(s) = session.as_mut() {
        s.model_alias = model_alias;
        store.append_turn(s, &desc.prompt, &reply)?;
        tracing::info!(chat_id = %s.chat_id, alias = %s.model_alias, "chat turn recorded");
    }

    let text = if flags.cmd || flags.run {
        sanitize_command(&reply)
    } else {
        reply
    };
    Ok(SingleAnswer {
        text,
        chat_id: session.map(|s| s.chat_id),
    })
}

fn emit_answer(desc: &RequestDescriptor, answer: SingleAnswer, style: &StyleOptions) -> Result<()> {
    let flags = desc.flags;
    let footer = match &answer.chat_id {
        Some(id) if flags.json || flags.cmd || !std::io::stdout().is_terminal() => {
            eprintln!("[Chat: {id}]");
            String::new()
        }
        Some(id) => format!("\n\n[Chat: {id}]"),
        None => String::new(),
    };

    if !flags.run {
        println!("{}{footer}", answer.text);
        return Ok(());
    }

    println!(
        "{}{}{footer}",
        color(Role::Secondary, "$ ", style),
        color(Role::Bold, &answer.text, style)
    );
    if !flags.yolo && !confirm::ask(&color(Role::Secondary, confirm::PROMPT, style)) {
        println!("Cancelled.");
        return Ok(());
    }
    tracing::info!(command = %answer.text, "executing generated command");
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&answer.text)
        .status()
        .context("Failed to run generated command")?;
    std::process::exit(status.code().unwrap_or(1));
}

/* -------------------------------------------------------------------------- */
/* Multi-model rendering                                                      */
/* -------------------------------------------------------------------------- */

pub fn render_multi(results: &[DispatchResult], style: &StyleOptions) -> String {
    results
        .iter()
        .map(|r| {
            let body = match &r.outcome {
                Ok(text) => text.clone(),
                Err(e) => color(Role::Error, format!("Error: {e}"), style),
            };
            format!("{}\n{body}", section_rule(&r.token, r.elapsed, style))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/* -------------------------------------------------------------------------- */
/* Chat subcommands                                                           */
/* -------------------------------------------------------------------------- */

fn run_chat_command(
    store: &ChatStore,
    command: ChatCommand,
    chat: &ChatAddress,
    style: &StyleOptions,
) -> Result<()> {
    match command {
        ChatCommand::List => {
            println!("{}", render_chat_list(&store.list(), style));
            Ok(())
        }
        ChatCommand::Delete => {
            let mut missing = 0;
            for id in &chat.delete_ids {
                if store.delete(id)? {
                    println!("Deleted chat session: {id}");
                } else {
                    eprintln!("Chat session '{id}' not found");
                    missing += 1;
                }
            }
            if missing > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

pub fn render_chat_list(sessions: &[ChatSession], style: &StyleOptions) -> String {
    if sessions.is_empty() {
        return "No chat sessions found.".to_string();
    }
    let rows: Vec<Vec<String>> = sessions
        .iter()
        .map(|s| {
            vec![
                s.chat_id.clone(),
                s.model_alias.clone(),
                s.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                s.messages.len().to_string(),
            ]
        })
        .collect();
    table(
        &["ID", "Model", "Created", "Message Count"],
        &rows,
        TableOpts::default(),
        style,
    )
}

/// What an empty `ai reply` prints.
pub fn describe_latest(store: &ChatStore) -> Result<String, AiError> {
    let session = store.latest().ok_or_else(|| {
        AiError::argument("No chat sessions to reply to. Start one with 'ai <model> <msg>'")
    })?;
    let head = format!("Chat: {} (model: {})", session.chat_id, session.model_alias);
    Ok(match session.last_message() {
        Some(m) => format!("{head}\nLast {}: {}", m.role.label(), m.content),
        None => format!("{head}\nNo messages yet."),
    })
}

/* -------------------------------------------------------------------------- */
/* Command mode helpers                                                       */
/* -------------------------------------------------------------------------- */

fn os_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

/// Prompt asking for exactly one shell command for this OS and shell.
pub fn command_instruction(prompt: &str) -> String {
    let shell = std::env::var("SHELL")
        .ok()
        .and_then(|s| {
            Path::new(&s)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "sh".to_string());
    format!(
        "[SYSTEM: OS={}, Shell={shell}. OUTPUT MODE: Your entire response will be piped \
         directly to /bin/sh for execution. Return ONLY a single shell command. Any text \
         that is not a valid command will cause an error. No prose, no markdown, no \
         explanation.]\n\n{prompt}",
        os_name()
    )
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F300..=0x1F9FF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
            | 0x1FA00..=0x1FAFF
            | 0xFE00..=0xFE0F
            | 0x200D
    )
}

/// Reduce a model answer to a single shell command line.
pub fn sanitize_command(text: &str) -> String {
    let mut text = text
        .trim()
        .trim_start_matches(|c: char| is_emoji(c) || c.is_whitespace())
        .to_string();

    if text.starts_with("```") {
        text = text
            .lines()
            .skip(1)
            .filter(|l| !l.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
    }

    if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') && !text.starts_with("```")
    {
        text = text[1..text.len() - 1].to_string();
    }

    let first = text.trim().lines().next().unwrap_or("").trim();
    let first = ["$ ", "> ", "% "]
        .iter()
        .find_map(|p| first.strip_prefix(p))
        .unwrap_or(first);
    first.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasTable;
    use crate::classify::Flags;
    use crate::config::HistoryLimits;
    use crate::provider::testing::MockAdapter;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine_with(claude: Arc<MockAdapter>) -> DispatchEngine {
        let mut reg = ProviderRegistry::default();
        reg.register(claude);
        reg.register(MockAdapter::new("codex").failing("quota exceeded").shared());
        DispatchEngine::new(reg, AliasTable::builtin())
    }

    fn store(dir: &TempDir) -> ChatStore {
        ChatStore::new(dir.path().join("chats"), HistoryLimits::default())
    }

    fn request(model: &str, prompt: &str) -> RequestDescriptor {
        RequestDescriptor {
            model_tokens: vec![model.to_string()],
            prompt: prompt.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn sanitize_strips_decoration() {
        assert_eq!(sanitize_command("ls -la"), "ls -la");
        assert_eq!(sanitize_command("```bash\nls -la\n```"), "ls -la");
        assert_eq!(sanitize_command("`pwd`"), "pwd");
        assert_eq!(sanitize_command("$ git status"), "git status");
        assert_eq!(sanitize_command("> echo hi"), "echo hi");
        assert_eq!(sanitize_command("% whoami"), "whoami");
        assert_eq!(sanitize_command("🚀 ls"), "ls");
        assert_eq!(sanitize_command("✨\u{FE0F} df -h"), "df -h");
        assert_eq!(sanitize_command("ls\nthis lists files"), "ls");
        assert_eq!(sanitize_command("  "), "");
    }

    #[test]
    fn instruction_wraps_prompt() {
        let p = command_instruction("list files");
        assert!(p.starts_with("[SYSTEM: OS="));
        assert!(p.contains("Return ONLY a single shell command"));
        assert!(p.ends_with("]\n\nlist files"));
    }

    #[tokio::test]
    async fn new_session_records_turn() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let engine = engine_with(MockAdapter::new("claude").shared());

        let answer = answer_single(&engine, &store, &request("sonnet", "hello"), "")
            .await
            .unwrap();
        assert_eq!(answer.text, "sonnet: ok [USER: hello]");
        let id = answer.chat_id.unwrap();
        let saved = store.load(&id).unwrap();
        assert_eq!(saved.model_alias, "sonnet");
        assert_eq!(saved.messages.len(), 2);
        assert_eq!(saved.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn reply_continues_latest_with_history() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let engine = engine_with(MockAdapter::new("claude").shared());
        let first = answer_single(&engine, &store, &request("haiku", "first"), "")
            .await
            .unwrap();

        let mut desc = request("", "second");
        desc.model_tokens.clear();
        desc.chat.mode = ChatMode::Reply;
        desc.flags.reply = true;
        let second = answer_single(&engine, &store, &desc, "").await.unwrap();

        assert_eq!(second.chat_id, first.chat_id);
        assert!(second.text.starts_with("haiku: ok [USER: first\n\nASSISTANT: "));
        assert!(second.text.ends_with("USER: second]"));
        let saved = store.load(second.chat_id.as_deref().unwrap()).unwrap();
        assert_eq!(saved.messages.len(), 4);
    }

    #[tokio::test]
    async fn model_override_updates_session_alias() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let engine = engine_with(MockAdapter::new("claude").shared());
        let first = answer_single(&engine, &store, &request("haiku", "one"), "")
            .await
            .unwrap();
        let id = first.chat_id.unwrap();

        let mut desc = request("", "two");
        desc.model_tokens.clear();
        desc.chat = ChatAddress {
            mode: ChatMode::Chat,
            session_id: Some(id.clone()),
            model_override: Some("opus".into()),
            ..Default::default()
        };
        let out = answer_single(&engine, &store, &desc, "").await.unwrap();
        assert!(out.text.starts_with("opus: "));
        assert_eq!(store.load(&id).unwrap().model_alias, "opus");
    }

    #[tokio::test]
    async fn missing_session_and_empty_store_fail() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let engine = engine_with(MockAdapter::new("claude").shared());

        let mut desc = request("sonnet", "x");
        desc.chat = ChatAddress {
            mode: ChatMode::Chat,
            session_id: Some("ZZZ".into()),
            ..Default::default()
        };
        let err = answer_single(&engine, &store, &desc, "").await.unwrap_err();
        assert!(err.to_string().contains("Chat session 'ZZZ' not found"));

        let mut desc = request("sonnet", "x");
        desc.chat.mode = ChatMode::Reply;
        let err = answer_single(&engine, &store, &desc, "").await.unwrap_err();
        assert!(err.to_string().contains("No chat sessions to reply to"));
        assert!(describe_latest(&store).is_err());
    }

    #[tokio::test]
    async fn no_chat_and_failures_persist_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let engine = engine_with(MockAdapter::new("claude").shared());

        let mut desc = request("sonnet", "quiet");
        desc.flags = Flags {
            no_chat: true,
            ..Default::default()
        };
        let out = answer_single(&engine, &store, &desc, "").await.unwrap();
        assert_eq!(out.text, "sonnet: ok [quiet]");
        assert!(out.chat_id.is_none());

        let err = answer_single(&engine, &store, &request("gpt", "x"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::ProviderExecution { .. }));
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn context_precedes_prompt_but_is_not_stored() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let engine = engine_with(MockAdapter::new("claude").shared());
        let ctx = "<file path=\"a.txt\">\nA\n</file>";
        let out = answer_single(&engine, &store, &request("sonnet", "sum"), ctx)
            .await
            .unwrap();
        assert!(out.text.contains("USER: <file path=\"a.txt\">\nA\n</file>\n\nsum"));
        let saved = store.load(out.chat_id.as_deref().unwrap()).unwrap();
        assert_eq!(saved.messages[0].content, "sum");
    }

    #[tokio::test]
    async fn cmd_mode_wraps_and_sanitizes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let claude = MockAdapter::new("claude").shared();
        let engine = engine_with(claude.clone());
        let mut desc = request("sonnet", "list files");
        desc.flags.cmd = true;
        desc.flags.no_chat = true;
        let out = answer_single(&engine, &store, &desc, "").await.unwrap();
        // Mock answers are one line beginning with the model id.
        assert!(out.text.starts_with("sonnet: ok [[SYSTEM: OS="));
        assert!(!out.text.contains('\n'));
        assert_eq!(claude.calls(), 1);
    }

    #[test]
    fn multi_rendering_keeps_order_and_errors() {
        let results = vec![
            DispatchResult {
                token: "sonnet".into(),
                outcome: Ok("hi".into()),
                elapsed: Duration::from_millis(1500),
            },
            DispatchResult {
                token: "gpt".into(),
                outcome: Err(AiError::execution("codex", "quota")),
                elapsed: Duration::from_millis(200),
            },
        ];
        let out = render_multi(&results, &StyleOptions::plain());
        assert_eq!(
            out,
            "━━━ sonnet (1.5s) ━━━\nhi\n\n━━━ gpt (0.2s) ━━━\nError: codex error: quota"
        );
    }

    #[test]
    fn chat_list_rendering() {
        let style = StyleOptions::plain();
        assert_eq!(render_chat_list(&[], &style), "No chat sessions found.");
        let mut s = ChatSession::new("AB1", "sonnet");
        s.messages.push(crate::chat::Message::new(crate::chat::Role::User, "x"));
        let out = render_chat_list(&[s], &style);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("ID   Model   Created"));
        assert!(lines[2].starts_with("AB1  sonnet  "));
        assert!(lines[2].ends_with('1'));
    }

    #[test]
    fn describe_latest_shows_last_message() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut s = store.create("flash", Some("q1w")).unwrap();
        store.save(&s).unwrap();
        assert_eq!(
            describe_latest(&store).unwrap(),
            "Chat: Q1W (model: flash)\nNo messages yet."
        );
        store.append_turn(&mut s, "hey", "hello there").unwrap();
        assert_eq!(
            describe_latest(&store).unwrap(),
            "Chat: Q1W (model: flash)\nLast ASSISTANT: hello there"
        );
    }
}
