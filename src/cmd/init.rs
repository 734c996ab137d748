/*!
init.rs

`ai init`: detect installed tools and credentials, collect model lists,
rebuild the alias table (built-ins + generated aliases) and save the config.

A default alias that no longer resolves after the rebuild is cleared with a
warning.
*/

use anyhow::{Context, Result};
use clap::Args;

use crate::alias::{self, AliasTable};
use crate::cmd::format::{Role, StyleOptions, color, emoji, truncate_ellipsis};
use crate::config::{ConfigRecord, Settings};
use crate::error::AiError;
use crate::provider::ProviderRegistry;
use crate::provider::discover::{Discovery, discover};

#[derive(Args, Debug, Default)]
pub struct InitArgs {}

/// Built-ins, the `ollama` alias pointed at the first local model, then
/// generated aliases per provider.
pub fn rebuild_table(found: &Discovery) -> Result<AliasTable, AiError> {
    let mut table = AliasTable::builtin();
    if let Some(first) = found.models.get("ollama").and_then(|m| m.first()) {
        table.insert("ollama", "ollama", first)?;
    }
    for (provider, models) in &found.models {
        let generated = alias::generate(provider, models, &table);
        if !generated.is_empty() {
            tracing::debug!(provider = %provider, count = generated.len(), "aliases generated");
        }
        table.extend(generated);
    }
    Ok(table)
}

/// Carry `previous` over when it still names an alias; `Err` holds the stale name.
pub fn carry_default(table: &mut AliasTable, previous: Option<&str>) -> Result<(), String> {
    match previous {
        Some(name) if table.contains(name) => {
            table.set_default(Some(name)).map_err(|_| name.to_string())
        }
        Some(name) => Err(name.to_string()),
        None => Ok(()),
    }
}

pub fn execute_init(settings: Settings, _args: InitArgs) -> Result<()> {
    let style = StyleOptions::detect();
    println!("Initializing ai...");

    let path = settings.config_path();
    let mut record = match ConfigRecord::load(&path) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(error = %e, "existing config unreadable; starting fresh");
            ConfigRecord::default()
        }
    };

    let registry = ProviderRegistry::builtin(&settings)?;
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let found = rt.block_on(discover(&registry));

    let tools = if found.installed_tools.is_empty() {
        "none".to_string()
    } else {
        found.installed_tools.join(", ")
    };
    println!("Detected CLI tools: {tools}");
    for (provider, models) in &found.models {
        let line = format!("  {provider} models ({}): {}", models.len(), models.join(", "));
        println!("{}", truncate_ellipsis(&line, style.term_width));
    }

    let mut table = rebuild_table(&found)?;
    if let Err(stale) = carry_default(&mut table, record.default_alias.as_deref()) {
        println!(
            "{}",
            color(
                Role::Warning,
                format!(
                    "{}Warning: default '{stale}' no longer valid, cleared.",
                    emoji("warn", &style)
                ),
                &style
            )
        );
    }

    record.installed_tools = found.installed_tools;
    record.models = found.models;
    record.set_alias_table(&table);
    record
        .save(&path)
        .with_context(|| format!("Failed to save config to {}", path.display()))?;
    println!(
        "{}",
        color(
            Role::Success,
            format!("{}Config saved to {}", emoji("success", &style), path.display()),
            &style
        )
    );
    Ok(())
}
