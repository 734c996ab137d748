//! Alias table: short names mapped to `(provider, model)` pairs.
//!
//! Key items:
//!   AliasTable (entries + optional default)
//!   resolve            -> alias lookup, then `provider:model` fallback
//!   generate           -> bulk alias generation for discovered model lists
//!   shorten_model_name -> cosmetic suffix / version stripping

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};
use crate::provider::is_known_provider;

/// Names that collide with subcommands or keywords and can never be aliases.
pub const RESERVED_NAMES: &[&str] = &[
    "init",
    "list",
    "default",
    "cmd",
    "json",
    "help",
    "yolo",
    "run",
    "completions",
    "serve",
    "chat",
    "reply",
];

/// Built-in aliases present before (and merged into) every `ai init`.
pub const BUILTIN_ALIASES: &[(&str, &str, &str)] = &[
    // claude
    ("claude", "claude", "sonnet"),
    ("haiku", "claude", "haiku"),
    ("sonnet", "claude", "sonnet"),
    ("opus", "claude", "opus"),
    ("opus-m", "claude", "opus@medium"),
    ("opus-h", "claude", "opus@high"),
    // codex
    ("codex", "codex", "gpt-5.3-codex"),
    ("codex-m", "codex", "gpt-5.3-codex@medium"),
    ("codex-h", "codex", "gpt-5.3-codex@high"),
    ("codex-xh", "codex", "gpt-5.3-codex@xhigh"),
    ("gpt", "codex", "gpt-5.2"),
    ("codex-max", "codex", "gpt-5.1-codex-max"),
    ("codex-mini", "codex", "gpt-5.1-codex-mini"),
    // gemini
    ("gemini", "gemini", "gemini-3-flash-preview"),
    ("pro", "gemini", "gemini-3-pro-preview"),
    ("flash", "gemini", "gemini-3-flash-preview"),
    ("pro-2.5", "gemini", "gemini-2.5-pro"),
    ("flash-2.5", "gemini", "gemini-2.5-flash"),
    ("flash-lite", "gemini", "gemini-2.5-flash-lite"),
    // qwen
    ("qwen", "qwen", "coder-model"),
    ("qwen-vision", "qwen", "vision-model"),
    // ollama
    ("ollama", "ollama", "llama3"),
    // glm
    ("glm", "glm", "glm-5"),
    ("glm5", "glm", "glm-5"),
    ("glm4", "glm", "glm-4.7"),
    ("glm-air", "glm", "glm-4.5-air"),
    // openrouter (free models only)
    ("mimo", "openrouter", "xiaomi/mimo-v2-flash:free"),
    ("olmo", "openrouter", "allenai/olmo-3.1-32b-think:free"),
    ("deepseek", "openrouter", "nex-agi/deepseek-v3.1-nex-n1:free"),
    ("chimera", "openrouter", "tngtech/deepseek-r1t2-chimera:free"),
    ("devstral", "openrouter", "mistralai/devstral-2512:free"),
    ("oss", "openrouter", "openai/gpt-oss-120b:free"),
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/* ---- Alias / AliasTable ---- */

/// Target of an alias. Serialized as a `[provider, model]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Alias {
    pub provider: String,
    pub model: String,
}

impl Alias {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl From<(String, String)> for Alias {
    fn from((provider, model): (String, String)) -> Self {
        Self { provider, model }
    }
}

impl From<Alias> for (String, String) {
    fn from(a: Alias) -> Self {
        (a.provider, a.model)
    }
}

impl std::fmt::Display for Alias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Alias name -> target, plus the optional default alias.
///
/// Invariants: every target provider is known, no name is reserved, and the
/// default (when set) is a present key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, Alias>,
    default_alias: Option<String>,
}

impl AliasTable {
    /// Table holding only the built-in aliases.
    pub fn builtin() -> Self {
        let entries = BUILTIN_ALIASES
            .iter()
            .map(|(name, provider, model)| (name.to_string(), Alias::new(*provider, *model)))
            .collect();
        Self {
            entries,
            default_alias: None,
        }
    }

    /// Build a table from persisted parts, enforcing the invariants.
    pub fn from_parts(
        entries: BTreeMap<String, Alias>,
        default_alias: Option<String>,
    ) -> Result<Self> {
        let mut table = Self::default();
        for (name, alias) in entries {
            table.insert(&name, &alias.provider, &alias.model)?;
        }
        table.set_default(default_alias.as_deref())?;
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&Alias> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Alias)> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &BTreeMap<String, Alias> {
        &self.entries
    }

    pub fn default_alias(&self) -> Option<&str> {
        self.default_alias.as_deref()
    }

    /// Add or replace an alias.
    pub fn insert(&mut self, name: &str, provider: &str, model: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(AiError::Config("alias name cannot be empty".into()));
        }
        if is_reserved(name) {
            return Err(AiError::Config(format!(
                "'{name}' is a reserved command and cannot be used as an alias"
            )));
        }
        if !is_known_provider(provider) {
            return Err(AiError::Config(format!(
                "alias '{name}' points at unknown provider '{provider}'"
            )));
        }
        self.entries
            .insert(name.to_string(), Alias::new(provider, model));
        Ok(())
    }

    /// Set (`Some`) or clear (`None`) the default alias.
    pub fn set_default(&mut self, alias: Option<&str>) -> Result<()> {
        match alias {
            None => {
                self.default_alias = None;
                Ok(())
            }
            Some(name) if is_reserved(name) => Err(AiError::Config(format!(
                "'{name}' is a reserved command, cannot be used as default."
            ))),
            Some(name) if !self.entries.contains_key(name) => Err(AiError::Config(format!(
                "unknown alias '{name}'. Run 'ai list' to see available models."
            ))),
            Some(name) => {
                self.default_alias = Some(name.to_string());
                Ok(())
            }
        }
    }

    /// Merge generated aliases (generated entries win over existing ones).
    pub fn extend(&mut self, generated: BTreeMap<String, Alias>) {
        for (name, alias) in generated {
            if !is_reserved(&name) && is_known_provider(&alias.provider) {
                self.entries.insert(name, alias);
            }
        }
    }

    /// Aliases grouped by provider: provider -> [(alias, model)].
    pub fn by_provider(&self) -> BTreeMap<String, Vec<(String, String)>> {
        let mut out: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for (name, alias) in &self.entries {
            out.entry(alias.provider.clone())
                .or_default()
                .push((name.clone(), alias.model.clone()));
        }
        out
    }

    /// Display alias for a model: one equal to the model id wins, else the shortest.
    pub fn preferred_alias(&self, provider: &str, model: &str) -> Option<&str> {
        let mut best: Option<&str> = None;
        for (name, alias) in &self.entries {
            if alias.provider != provider || alias.model != model {
                continue;
            }
            if name == model {
                return Some(name);
            }
            match best {
                Some(current) if current.len() <= name.len() => {}
                _ => best = Some(name),
            }
        }
        best
    }
}

/* ---- Resolution ---- */

/// Split `provider:model` when the prefix is a known provider.
///
/// Only the first `:` separates; the remainder (e.g. `org/model:free`) is kept intact.
pub fn split_provider_model(token: &str) -> Option<(&str, &str)> {
    let (provider, model) = token.split_once(':')?;
    if is_known_provider(provider) && !model.is_empty() {
        Some((provider, model))
    } else {
        None
    }
}

pub fn is_provider_model_shape(token: &str) -> bool {
    split_provider_model(token).is_some()
}

/// A token that can name a model: an alias or `provider:model`.
pub fn is_model_token(token: &str, table: &AliasTable) -> bool {
    table.contains(token) || is_provider_model_shape(token)
}

/// Resolve a model token to its `(provider, model)` target.
pub fn resolve(token: &str, table: &AliasTable) -> Result<Alias> {
    if let Some(alias) = table.get(token) {
        return Ok(alias.clone());
    }
    if let Some((provider, model)) = split_provider_model(token) {
        return Ok(Alias::new(provider, model));
    }
    Err(AiError::unknown_alias(token))
}

/* ---- Generation ---- */

/// How a provider spells its model ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameForm {
    /// `name:tag` (ollama): candidate is `name`, full name is the whole id.
    Composite,
    /// `org/name-suffixes-version[:free]` (openrouter): candidate is the shortened name.
    OrgPath,
}

impl NameForm {
    pub fn for_provider(provider: &str) -> Option<NameForm> {
        match provider {
            "ollama" => Some(NameForm::Composite),
            "openrouter" => Some(NameForm::OrgPath),
            _ => None,
        }
    }

    /// `(candidate, full_local_name)` for a model id, or `None` if it does not fit the form.
    fn names(self, model: &str) -> Option<(String, String)> {
        match self {
            NameForm::Composite => {
                let candidate = model.split(':').next().unwrap_or(model);
                if candidate.is_empty() {
                    return None;
                }
                Some((candidate.to_string(), model.to_string()))
            }
            NameForm::OrgPath => {
                let (_, local) = model.split_once('/')?;
                let full = local.replace(":free", "");
                if full.is_empty() {
                    return None;
                }
                Some((shorten_model_name(&full), full))
            }
        }
    }
}

const COSMETIC_SUFFIXES: &[&str] = &[
    "-instruct",
    "-it",
    "-pro",
    "-air",
    "-exp",
    "-mini",
    "-small",
    "-nano",
    "-flash",
    "-plus",
    "-chat",
    "-base",
    "-preview",
    "-venice-edition",
    "-edition",
];

static VERSION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-v\d+(-|$)").expect("valid regex"));
static TRAILING_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+(\.\d+)?b?$").expect("valid regex"));
static INTERIOR_DOTTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+\.\d+-").expect("valid regex"));
static INTERIOR_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+b-").expect("valid regex"));

/// Remove every occurrence of `token` that ends at a `-` boundary or the end of `name`.
fn strip_suffix_token(name: &str, token: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(idx) = rest.find(token) {
        let after = &rest[idx + token.len()..];
        if after.is_empty() || after.starts_with('-') {
            out.push_str(&rest[..idx]);
        } else {
            out.push_str(&rest[..idx + token.len()]);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Shorten a local model name: drop cosmetic suffixes, then version segments.
///
/// Falls back to the input when nothing would remain.
pub fn shorten_model_name(full: &str) -> String {
    let mut name = full.to_string();
    for suffix in COSMETIC_SUFFIXES {
        name = strip_suffix_token(&name, suffix);
    }
    name = VERSION_TAG.replace_all(&name, "${1}").into_owned();
    name = TRAILING_VERSION.replace(&name, "").into_owned();
    name = INTERIOR_DOTTED.replace_all(&name, "-").into_owned();
    name = INTERIOR_SIZE.replace_all(&name, "-").into_owned();
    let trimmed = name.trim_matches('-');
    if trimmed.is_empty() {
        full.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Generate aliases for one provider's discovered models.
///
/// Models are grouped by candidate name (groups ordered by first appearance).
/// A lone candidate is used when free; shared candidates always fall back to
/// each member's full local name. A name is free when it is not reserved, not
/// in `existing`, and not produced earlier in this run.
pub fn generate(
    provider: &str,
    models: &[String],
    existing: &AliasTable,
) -> BTreeMap<String, Alias> {
    let mut out: BTreeMap<String, Alias> = BTreeMap::new();
    let Some(form) = NameForm::for_provider(provider) else {
        return out;
    };

    let mut groups: Vec<(String, Vec<(&str, String)>)> = Vec::new();
    for model in models {
        let Some((candidate, full)) = form.names(model) else {
            tracing::debug!(provider, model = %model, "model id does not fit name form; skipped");
            continue;
        };
        match groups.iter_mut().find(|(c, _)| *c == candidate) {
            Some((_, members)) => members.push((model.as_str(), full)),
            None => groups.push((candidate, vec![(model.as_str(), full)])),
        }
    }

    let is_free = |name: &str, out: &BTreeMap<String, Alias>| {
        !is_reserved(name) && !existing.contains(name) && !out.contains_key(name)
    };

    for (candidate, members) in groups {
        if let [(model, full)] = members.as_slice() {
            if is_free(&candidate, &out) {
                out.insert(candidate, Alias::new(provider, *model));
            } else if is_free(full, &out) {
                out.insert(full.clone(), Alias::new(provider, *model));
            }
            continue;
        }
        for (model, full) in members {
            if is_free(&full, &out) {
                out.insert(full, Alias::new(provider, model));
            }
        }
    }
    out
}

/* ---- Tests ---- */
