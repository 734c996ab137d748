/*!
list.rs

`ai list`: discovered models grouped by provider (with the alias used to
address each), aliases for providers with no discovered models, installed
tools and the default model.

JSON output shape (`--json`):
{
  "models":    { "<provider>": [ { "model": "...", "alias": "..." | null } ] },
  "aliases":   { "<alias>": { "provider": "...", "model": "..." } },
  "installed": [ "claude", ... ],
  "default":   "<alias>" | null
}
*/

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::alias::AliasTable;
use crate::cmd::format::{Role, StyleOptions, color};
use crate::config::{ConfigRecord, Settings};

/// CLI arguments for `ai list`
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Output JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute_list(settings: Settings, args: ListArgs) -> Result<()> {
    let record = ConfigRecord::load(&settings.config_path())?;
    let table = record.alias_table()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&list_json(&record, &table))?);
    } else {
        println!("{}", render_list(&record, &table, &StyleOptions::detect()));
    }
    Ok(())
}

fn list_json(record: &ConfigRecord, table: &AliasTable) -> serde_json::Value {
    let models: serde_json::Map<String, serde_json::Value> = record
        .models
        .iter()
        .map(|(provider, models)| {
            let items: Vec<_> = models
                .iter()
                .map(|m| json!({ "model": m, "alias": table.preferred_alias(provider, m) }))
                .collect();
            (provider.clone(), json!(items))
        })
        .collect();
    let aliases: serde_json::Map<String, serde_json::Value> = table
        .iter()
        .map(|(name, a)| (name.clone(), json!({ "provider": a.provider, "model": a.model })))
        .collect();
    json!({
        "models": models,
        "aliases": aliases,
        "installed": record.installed_tools,
        "default": table.default_alias(),
    })
}

pub fn render_list(record: &ConfigRecord, table: &AliasTable, style: &StyleOptions) -> String {
    let mut out = vec!["Available models:".to_string()];

    for (provider, models) in record.models.iter().filter(|(_, m)| !m.is_empty()) {
        out.push(String::new());
        out.push(color(
            Role::Accent,
            format!("  {provider}: ({})", models.len()),
            style,
        ));
        for model in models {
            match table.preferred_alias(provider, model) {
                Some(alias) if alias != model => out.push(format!("    {alias:20} -> {model}")),
                _ => out.push(format!("    {model}")),
            }
        }
    }

    let others: Vec<String> = table
        .by_provider()
        .into_iter()
        .filter(|(provider, _)| record.models.get(provider).is_none_or(|m| m.is_empty()))
        .flat_map(|(provider, entries)| {
            entries
                .into_iter()
                .map(move |(name, model)| format!("    {name:20} -> {provider}:{model}"))
        })
        .collect();
    if !others.is_empty() {
        out.push(String::new());
        out.push(color(Role::Accent, "  aliases:", style));
        out.extend(others);
    }

    out.push(String::new());
    if record.installed_tools.is_empty() {
        out.push(color(
            Role::Dim,
            "No config found. Run 'ai init' to detect tools.",
            style,
        ));
    } else {
        out.push(format!(
            "Installed CLI tools: {}",
            record.installed_tools.join(", ")
        ));
    }

    if let Some(default) = table.default_alias() {
        out.push(String::new());
        out.push(format!("Default model: {default}"));
    }
    out.join("\n")
}
