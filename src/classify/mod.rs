/*!
Command-line classifier: raw tokens -> [`RequestDescriptor`].

The prompt form of `ai` mixes flags, legacy bare keywords, model tokens,
chat addressing and free prose in one positional stream. Classification is
an ordered pipeline of passes over a token list:

  1. flags      dash flags anywhere before `--`; bare keywords in the head
  2. chat       `reply` / `chat [list | delete IDS.. | ID]` with optional model override
  3. models     leading alias / `provider:model` tokens
  4. prompt     remaining words, or the whole input stream when none remain
  5. default    fall back to the default alias (selector-shaped heads fail)
  6. validate   multi-model exclusions, missing prompt

Head: the leading run of tokens that are keywords or model tokens. Prose such
as "explain json parsing" keeps its words because `json` is past the head.
*/

use std::io::{IsTerminal, Read};

use crate::alias::{AliasTable, is_model_token};
use crate::chat::is_chat_id;
use crate::error::{AiError, Result};

/* ---- Descriptor ---- */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub json: bool,
    pub cmd: bool,
    pub run: bool,
    pub yolo: bool,
    pub no_chat: bool,
    pub reply: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatMode {
    #[default]
    None,
    Chat,
    Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    List,
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatAddress {
    pub mode: ChatMode,
    /// Explicit session id (uppercased).
    pub session_id: Option<String>,
    pub command: Option<ChatCommand>,
    /// Ids for `chat delete` (uppercased, in order).
    pub delete_ids: Vec<String>,
    /// Model token written right before the `chat` / `reply` marker.
    pub model_override: Option<String>,
}

impl ChatAddress {
    /// Addresses a session that already exists (its alias can stand in for a model).
    pub fn targets_existing(&self) -> bool {
        match self.mode {
            ChatMode::Reply => true,
            ChatMode::Chat => self.command.is_none() && self.session_id.is_some(),
            ChatMode::None => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub model_tokens: Vec<String>,
    pub prompt: String,
    pub flags: Flags,
    pub chat: ChatAddress,
    /// Raw `-F/--file` values, comma lists already split.
    pub files: Vec<String>,
}

impl RequestDescriptor {
    /// Model to dispatch to for a single-model request: override first, then the token.
    pub fn single_model(&self) -> Option<&str> {
        self.chat
            .model_override
            .as_deref()
            .or_else(|| self.model_tokens.first().map(String::as_str))
    }

    pub fn model_count(&self) -> usize {
        self.model_tokens.len() + usize::from(self.chat.model_override.is_some())
    }
}

/* ---- Prompt input ---- */

/// Source for a prompt that is not on the command line.
pub trait PromptInput {
    fn is_interactive(&self) -> bool;
    fn read_all(&mut self) -> Result<String>;
}

/// Process stdin.
pub struct StdinInput;

impl PromptInput for StdinInput {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn read_all(&mut self) -> Result<String> {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| AiError::argument(format!("failed to read prompt from stdin: {e}")))?;
        Ok(buf)
    }
}

/* ---- Tokens ---- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Chat,
    Reply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    /// Positional word, eligible for keyword / model / chat interpretation.
    Word(String),
    /// Word after `--`: prompt text only.
    Literal(String),
    /// `chat` / `reply`; `flag` is true for the dashed spelling.
    Marker { kind: MarkerKind, flag: bool },
}

impl Tok {
    fn word(&self) -> Option<&str> {
        match self {
            Tok::Word(w) => Some(w),
            _ => None,
        }
    }

    fn into_text(self) -> Option<String> {
        match self {
            Tok::Word(w) | Tok::Literal(w) => Some(w),
            Tok::Marker { kind, flag: false } => Some(kind.word().to_string()),
            Tok::Marker { flag: true, .. } => None,
        }
    }
}

impl MarkerKind {
    fn word(self) -> &'static str {
        match self {
            MarkerKind::Chat => "chat",
            MarkerKind::Reply => "reply",
        }
    }
}

/// Selector-shaped: looks like a model id rather than a word of prose.
///
/// At most 40 chars, starts with an ASCII letter, only ASCII alphanumerics and
/// `- _ . : / @`, no trailing or doubled separator, at least one digit or separator.
pub fn is_selector_shaped(token: &str) -> bool {
    const SEPARATORS: &[char] = &['-', '_', '.', ':', '/', '@'];
    if token.is_empty() || token.len() > 40 {
        return false;
    }
    if !token.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return false;
    }
    let mut prev_sep = false;
    let mut marked = false;
    for c in token.chars() {
        let sep = SEPARATORS.contains(&c);
        if !sep && !c.is_ascii_alphanumeric() {
            return false;
        }
        if sep && prev_sep {
            return false;
        }
        marked |= sep || c.is_ascii_digit();
        prev_sep = sep;
    }
    !prev_sep && marked
}

/* ---- Pipeline ---- */

struct Pass<'a> {
    toks: Vec<Tok>,
    table: &'a AliasTable,
    out: RequestDescriptor,
}

/// Classify the positional tokens of a prompt invocation.
pub fn classify(
    tokens: &[String],
    table: &AliasTable,
    input: &mut dyn PromptInput,
) -> Result<RequestDescriptor> {
    let mut pass = Pass {
        toks: Vec::with_capacity(tokens.len()),
        table,
        out: RequestDescriptor::default(),
    };
    pass.extract_flags(tokens)?;
    pass.normalize_head();
    pass.resolve_chat();

    if let Some(cmd) = pass.out.chat.command {
        return pass.finish_chat_command(cmd);
    }

    let words = pass.take_model_tokens();
    pass.gather_prompt(&words, input)?;
    pass.apply_default(&words)?;
    pass.validate(input)?;
    tracing::debug!(descriptor = ?pass.out, "classified request");
    Ok(pass.out)
}

impl Pass<'_> {
    /// Pass 1a: dash flags anywhere before `--`.
    fn extract_flags(&mut self, tokens: &[String]) -> Result<()> {
        let mut iter = tokens.iter();
        while let Some(tok) = iter.next() {
            let flags = &mut self.out.flags;
            match tok.as_str() {
                "--" => {
                    self.toks.extend(iter.by_ref().map(|t| Tok::Literal(t.clone())));
                    break;
                }
                "--json" | "-j" => flags.json = true,
                "--cmd" | "-c" => flags.cmd = true,
                "--run" | "-r" => flags.run = true,
                "--yolo" | "-y" => flags.yolo = true,
                "--no-chat" => flags.no_chat = true,
                "--reply" => self.toks.push(Tok::Marker {
                    kind: MarkerKind::Reply,
                    flag: true,
                }),
                "--chat" => self.toks.push(Tok::Marker {
                    kind: MarkerKind::Chat,
                    flag: true,
                }),
                "-F" | "--file" => {
                    let value = iter.next().ok_or_else(|| {
                        AiError::argument_with_hint(
                            format!("{tok} requires a path"),
                            "Usage: ai -F <path>[,<path>...] \"prompt\"",
                        )
                    })?;
                    self.push_files(value);
                }
                other => {
                    if let Some(value) = other.strip_prefix("--file=") {
                        self.push_files(value);
                    } else {
                        self.toks.push(Tok::Word(other.to_string()));
                    }
                }
            }
        }
        Ok(())
    }

    fn push_files(&mut self, value: &str) {
        self.out.files.extend(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }

    /// Pass 1b: legacy bare keywords, recognised only in the head.
    fn normalize_head(&mut self) {
        let mut i = 0;
        while i < self.toks.len() {
            let Some(word) = self.toks[i].word() else {
                if matches!(self.toks[i], Tok::Marker { .. }) {
                    i += 1;
                    continue;
                }
                break;
            };
            let flags = &mut self.out.flags;
            match word {
                "json" => flags.json = true,
                "cmd" => flags.cmd = true,
                "run" => flags.run = true,
                "yolo" => flags.yolo = true,
                "reply" => {
                    self.toks[i] = Tok::Marker {
                        kind: MarkerKind::Reply,
                        flag: false,
                    };
                    i += 1;
                    continue;
                }
                "chat" => {
                    self.toks[i] = Tok::Marker {
                        kind: MarkerKind::Chat,
                        flag: false,
                    };
                    i += 1;
                    continue;
                }
                w if is_model_token(w, self.table) => {
                    i += 1;
                    continue;
                }
                _ => break,
            }
            self.toks.remove(i);
        }
    }

    fn marker_index(&self, kind: MarkerKind) -> Option<usize> {
        self.toks
            .iter()
            .position(|t| matches!(t, Tok::Marker { kind: k, .. } if *k == kind))
    }

    /// Pass 2: chat addressing. `reply` wins over `chat`.
    fn resolve_chat(&mut self) {
        if let Some(idx) = self.marker_index(MarkerKind::Reply) {
            self.out.flags.reply = true;
            self.out.chat.mode = ChatMode::Reply;
            let idx = self.take_override(idx);
            self.toks.remove(idx);
        } else if let Some(idx) = self.marker_index(MarkerKind::Chat) {
            self.resolve_chat_marker(idx);
        }
        // Markers left over (a second `chat`, say) fall back to prose or vanish.
        let toks = std::mem::take(&mut self.toks);
        self.toks = toks
            .into_iter()
            .filter_map(|t| match t {
                Tok::Marker { .. } => t.into_text().map(Tok::Word),
                other => Some(other),
            })
            .collect();
    }

    fn resolve_chat_marker(&mut self, idx: usize) {
        let is_flag = matches!(self.toks[idx], Tok::Marker { flag: true, .. });
        let next = self.toks.get(idx + 1).and_then(Tok::word).map(str::to_string);

        let chat = &mut self.out.chat;
        let consumed_after = match next.as_deref() {
            None => {
                chat.mode = ChatMode::Chat;
                0
            }
            Some("list") => {
                chat.mode = ChatMode::Chat;
                chat.command = Some(ChatCommand::List);
                1
            }
            Some("delete") => {
                chat.mode = ChatMode::Chat;
                chat.command = Some(ChatCommand::Delete);
                let ids: Vec<String> = self.toks[idx + 2..]
                    .iter()
                    .map_while(|t| t.word().filter(|w| is_chat_id(w)))
                    .map(|w| w.to_ascii_uppercase())
                    .collect();
                let n = ids.len();
                chat.session_id = ids.first().cloned();
                chat.delete_ids = ids;
                1 + n
            }
            Some(id) if is_chat_id(id) => {
                chat.mode = ChatMode::Chat;
                chat.session_id = Some(id.to_ascii_uppercase());
                1
            }
            Some(_) if is_flag => {
                chat.mode = ChatMode::Chat;
                0
            }
            // Bare `chat` followed by prose: not a marker.
            Some(_) => {
                self.toks[idx] = Tok::Word("chat".to_string());
                return;
            }
        };
        self.toks.drain(idx + 1..idx + 1 + consumed_after);
        let idx = self.take_override(idx);
        self.toks.remove(idx);
    }

    /// Remove a model token sitting right before the marker; returns the marker's new index.
    fn take_override(&mut self, idx: usize) -> usize {
        if idx == 0 {
            return idx;
        }
        match self.toks[idx - 1].word() {
            Some(w) if is_model_token(w, self.table) => {
                self.out.chat.model_override = Some(w.to_string());
                self.toks.remove(idx - 1);
                idx - 1
            }
            _ => idx,
        }
    }

    fn finish_chat_command(mut self, cmd: ChatCommand) -> Result<RequestDescriptor> {
        if cmd == ChatCommand::Delete && self.out.chat.delete_ids.is_empty() {
            return Err(AiError::argument_with_hint(
                "chat delete requires at least one chat ID",
                "Usage: ai chat delete <CODE> [<CODE> ...]",
            ));
        }
        self.out.prompt = self.remaining_text().join(" ");
        Ok(self.out)
    }

    fn remaining_text(&mut self) -> Vec<String> {
        std::mem::take(&mut self.toks)
            .into_iter()
            .filter_map(Tok::into_text)
            .collect()
    }

    /// Pass 3: leading model tokens. Returns the words left after them.
    fn take_model_tokens(&mut self) -> Vec<String> {
        let lead = self
            .toks
            .iter()
            .take_while(|t| t.word().is_some_and(|w| is_model_token(w, self.table)))
            .count();
        self.out.model_tokens = self
            .toks
            .drain(..lead)
            .filter_map(Tok::into_text)
            .collect();
        self.remaining_text()
    }

    /// Pass 4: prompt from the words, or from the input stream.
    fn gather_prompt(&mut self, words: &[String], input: &mut dyn PromptInput) -> Result<()> {
        if !words.is_empty() {
            self.out.prompt = words.join(" ");
        } else if !input.is_interactive() {
            self.out.prompt = input.read_all()?.trim().to_string();
        }
        Ok(())
    }

    /// Pass 5: default alias fallback.
    fn apply_default(&mut self, words: &[String]) -> Result<()> {
        if self.out.model_count() > 0 || self.out.chat.targets_existing() {
            return Ok(());
        }
        let Some(default) = self.table.default_alias() else {
            return match words.first() {
                Some(first) => Err(AiError::unknown_alias(first.as_str())),
                None => Err(AiError::argument_with_hint(
                    "model or prompt required",
                    "Usage: ai <model> \"prompt\"  (see 'ai --help')",
                )),
            };
        };
        if words.len() > 1 && is_selector_shaped(&words[0]) {
            return Err(AiError::unknown_alias(words[0].as_str()));
        }
        tracing::debug!(alias = default, "using default alias");
        self.out.model_tokens = vec![default.to_string()];
        Ok(())
    }

    /// Pass 6: cross-field checks.
    fn validate(&self, input: &dyn PromptInput) -> Result<()> {
        let out = &self.out;
        if out.model_count() > 1 {
            if out.flags.cmd || out.flags.run {
                return Err(AiError::argument(
                    "--cmd and --run not supported with multiple models",
                ));
            }
            if out.flags.yolo {
                return Err(AiError::argument("--yolo not supported with multiple models"));
            }
            if out.chat.mode != ChatMode::None {
                return Err(AiError::argument(
                    "chat sessions are not supported with multiple models",
                ));
            }
        }
        // An empty `reply` shows the last exchange instead of dispatching.
        let empty_reply_ok = out.chat.mode == ChatMode::Reply;
        if out.prompt.is_empty() && !empty_reply_ok {
            let msg = if input.is_interactive() {
                "prompt required (as argument or via stdin)"
            } else {
                "prompt required: input stream was empty"
            };
            return Err(AiError::argument(msg));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tty;
    impl PromptInput for Tty {
        fn is_interactive(&self) -> bool {
            true
        }
        fn read_all(&mut self) -> Result<String> {
            panic!("interactive input must not be read")
        }
    }

    struct Piped(String);
    impl PromptInput for Piped {
        fn is_interactive(&self) -> bool {
            false
        }
        fn read_all(&mut self) -> Result<String> {
            Ok(std::mem::take(&mut self.0))
        }
    }

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn table(default: Option<&str>) -> AliasTable {
        let mut t = AliasTable::builtin();
        t.set_default(default).unwrap();
        t
    }

    fn run(s: &str, default: Option<&str>) -> Result<RequestDescriptor> {
        classify(&toks(s), &table(default), &mut Tty)
    }

    #[test]
    fn alias_then_prompt() {
        let d = run("sonnet explain this", None).unwrap();
        assert_eq!(d.model_tokens, vec!["sonnet"]);
        assert_eq!(d.prompt, "explain this");
        assert_eq!(d.chat.mode, ChatMode::None);
    }

    #[test]
    fn unknown_model_without_default() {
        let mut t = AliasTable::default();
        t.insert("sonnet", "claude", "sonnet").unwrap();
        let err = classify(&toks("unknownmodel hi"), &t, &mut Tty).unwrap_err();
        assert!(matches!(err, AiError::UnknownAlias { alias } if alias == "unknownmodel"));
    }

    #[test]
    fn multiple_leading_models_fan_out() {
        let d = run("sonnet gpt claude:opus compare these", None).unwrap();
        assert_eq!(d.model_tokens, vec!["sonnet", "gpt", "claude:opus"]);
        assert_eq!(d.prompt, "compare these");
    }

    #[test]
    fn flags_anywhere_and_bare_keywords_in_head() {
        let d = run("json sonnet explain json parsing --yolo", None).unwrap();
        assert!(d.flags.json);
        assert!(d.flags.yolo);
        assert_eq!(d.prompt, "explain json parsing");
    }

    #[test]
    fn double_dash_stops_flag_parsing() {
        let d = run("sonnet -- --json is a flag", None).unwrap();
        assert!(!d.flags.json);
        assert_eq!(d.prompt, "--json is a flag");
    }

    #[test]
    fn file_flag_collects_comma_lists() {
        let d = run("-F a.rs,b.rs sonnet review --file c.rs", None).unwrap();
        assert_eq!(d.files, vec!["a.rs", "b.rs", "c.rs"]);
        assert_eq!(d.prompt, "review");
        assert!(run("sonnet hi -F", None).is_err());
    }

    #[test]
    fn default_alias_folds_prose() {
        let d = run("why is the sky blue", Some("sonnet")).unwrap();
        assert_eq!(d.model_tokens, vec!["sonnet"]);
        assert_eq!(d.prompt, "why is the sky blue");
        let d = run("Hello. there", Some("sonnet")).unwrap();
        assert_eq!(d.prompt, "Hello. there");
    }

    #[test]
    fn selector_shaped_head_fails_even_with_default() {
        let err = run("gpt-6 hello", Some("sonnet")).unwrap_err();
        assert!(matches!(err, AiError::UnknownAlias { alias } if alias == "gpt-6"));
        // A lone token is prompt text.
        let d = run("gpt-6", Some("sonnet")).unwrap();
        assert_eq!(d.prompt, "gpt-6");
    }

    #[test]
    fn selector_shape_rules() {
        assert!(is_selector_shaped("gpt-6"));
        assert!(is_selector_shaped("org/model:free"));
        assert!(is_selector_shaped("llama3"));
        assert!(!is_selector_shaped("why"));
        assert!(!is_selector_shaped("Hello."));
        assert!(!is_selector_shaped("a--b"));
        assert!(!is_selector_shaped("3dmodel"));
        assert!(!is_selector_shaped("what's"));
        assert!(!is_selector_shaped(&"a1".repeat(21)));
    }

    #[test]
    fn stdin_prompt_when_no_words() {
        let mut input = Piped("  from a pipe \n".into());
        let d = classify(&toks("sonnet"), &table(None), &mut input).unwrap();
        assert_eq!(d.prompt, "from a pipe");

        let mut input = Piped("defaulted".into());
        let d = classify(&[], &table(Some("opus")), &mut input).unwrap();
        assert_eq!(d.model_tokens, vec!["opus"]);
        assert_eq!(d.prompt, "defaulted");
    }

    #[test]
    fn model_without_prompt_on_terminal_fails() {
        let err = run("sonnet", None).unwrap_err();
        assert!(err.to_string().contains("prompt required"));
        let err = run("", None).unwrap_err();
        assert!(err.to_string().contains("model or prompt required"));
    }

    #[test]
    fn reply_with_override() {
        let d = run("sonnet reply switch models", None).unwrap();
        assert_eq!(d.chat.mode, ChatMode::Reply);
        assert!(d.flags.reply);
        assert_eq!(d.chat.model_override.as_deref(), Some("sonnet"));
        assert!(d.model_tokens.is_empty());
        assert_eq!(d.prompt, "switch models");
        assert_eq!(d.single_model(), Some("sonnet"));
    }

    #[test]
    fn reply_needs_no_default_or_prompt() {
        let d = run("reply", None).unwrap();
        assert_eq!(d.chat.mode, ChatMode::Reply);
        assert!(d.prompt.is_empty());
        let d = run("--reply continue please", None).unwrap();
        assert_eq!(d.prompt, "continue please");
        assert!(d.model_tokens.is_empty());
    }

    #[test]
    fn chat_with_session_id() {
        let d = run("chat abc continue", None).unwrap();
        assert_eq!(d.chat.mode, ChatMode::Chat);
        assert_eq!(d.chat.session_id.as_deref(), Some("ABC"));
        assert_eq!(d.prompt, "continue");
        assert!(d.chat.targets_existing());
    }

    #[test]
    fn chat_list_and_delete() {
        let d = run("chat list", None).unwrap();
        assert_eq!(d.chat.command, Some(ChatCommand::List));

        let d = run("chat delete abc X1Y zz", None).unwrap();
        assert_eq!(d.chat.command, Some(ChatCommand::Delete));
        assert_eq!(d.chat.delete_ids, vec!["ABC", "X1Y"]);

        let err = run("chat delete", None).unwrap_err();
        assert!(err.to_string().contains("at least one chat ID"));
    }

    #[test]
    fn bare_chat_before_prose_is_prompt_text() {
        let d = run("chat about the weather", Some("sonnet")).unwrap();
        assert_eq!(d.chat.mode, ChatMode::None);
        assert_eq!(d.prompt, "chat about the weather");
    }

    #[test]
    fn chat_flag_opens_fresh_session() {
        let d = run("opus --chat tell me more", None).unwrap();
        assert_eq!(d.chat.mode, ChatMode::Chat);
        assert_eq!(d.chat.model_override.as_deref(), Some("opus"));
        assert!(d.chat.session_id.is_none());
        assert_eq!(d.prompt, "tell me more");
    }

    #[test]
    fn multi_model_exclusions() {
        let err = run("cmd sonnet gpt list files", None).unwrap_err();
        assert!(err.to_string().contains("--cmd and --run"));
        let err = run("sonnet gpt hi --yolo", None).unwrap_err();
        assert!(err.to_string().contains("--yolo"));
        let err = run("sonnet opus reply hi", None).unwrap_err();
        assert!(err.to_string().contains("multiple models"));
    }

    #[test]
    fn keyword_past_head_is_prose() {
        let d = run("sonnet please run the tests", None).unwrap();
        assert!(!d.flags.run);
        assert_eq!(d.prompt, "please run the tests");
    }
}
