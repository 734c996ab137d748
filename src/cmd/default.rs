/*!
default.rs

`ai default`            show the default alias
`ai default <ALIAS>`    set it (reserved and unknown names are rejected)
`ai default --clear`    clear it
*/

use anyhow::Result;
use clap::Args;

use crate::alias::{self, AliasTable};
use crate::config::{ConfigRecord, Settings};
use crate::error::AiError;

#[derive(Args, Debug, Default)]
pub struct DefaultArgs {
    /// Alias to use when a prompt names no model
    pub alias: Option<String>,

    /// Remove the default alias
    #[arg(long, conflicts_with = "alias")]
    pub clear: bool,
}

/// Aliases of `record` ignoring its default (which may be stale).
fn aliases_of(record: &ConfigRecord) -> Result<AliasTable, AiError> {
    let mut bare = record.clone();
    bare.default_alias = None;
    bare.alias_table()
}

/// Apply `args` to `record`. Returns the message to print and whether `record` changed.
pub fn apply(record: &mut ConfigRecord, args: &DefaultArgs) -> Result<(String, bool), AiError> {
    let table = aliases_of(record)?;

    if args.clear {
        return Ok(match record.default_alias.take() {
            Some(_) => ("Default model cleared.".to_string(), true),
            None => ("No default model set.".to_string(), false),
        });
    }

    if let Some(name) = args.alias.as_deref() {
        if alias::is_reserved(name) {
            return Err(AiError::argument(format!(
                "'{name}' is a reserved command, cannot be used as default."
            )));
        }
        let Some(target) = table.get(name) else {
            return Err(AiError::argument(format!(
                "unknown alias '{name}'. Run 'ai list' to see available models."
            )));
        };
        let message = format!("Default model set: {name} -> {target}");
        record.default_alias = Some(name.to_string());
        return Ok((message, true));
    }

    let message = match record.default_alias.as_deref() {
        Some(name) => match table.get(name) {
            Some(target) => format!("{name} -> {target}"),
            None => format!("{name} (alias no longer valid)"),
        },
        None => "No default model set. Use 'ai default <alias>' to set one.".to_string(),
    };
    Ok((message, false))
}

pub fn execute_default(settings: Settings, args: DefaultArgs) -> Result<()> {
    let path = settings.config_path();
    let mut record = ConfigRecord::load(&path)?;
    let (message, changed) = apply(&mut record, &args)?;
    if changed {
        record.save(&path)?;
        tracing::info!(default = ?record.default_alias, "default alias updated");
    }
    println!("{message}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str) -> DefaultArgs {
        DefaultArgs {
            alias: Some(name.to_string()),
            clear: false,
        }
    }

    #[test]
    fn set_show_clear() {
        let mut record = ConfigRecord::default();
        let (msg, changed) = apply(&mut record, &DefaultArgs::default()).unwrap();
        assert!(msg.starts_with("No default model set."));
        assert!(!changed);

        let (msg, changed) = apply(&mut record, &set("opus")).unwrap();
        assert_eq!(msg, "Default model set: opus -> claude:opus");
        assert!(changed);
        assert_eq!(record.default_alias.as_deref(), Some("opus"));

        let (msg, _) = apply(&mut record, &DefaultArgs::default()).unwrap();
        assert_eq!(msg, "opus -> claude:opus");

        let clear = DefaultArgs {
            alias: None,
            clear: true,
        };
        let (msg, changed) = apply(&mut record, &clear).unwrap();
        assert_eq!(msg, "Default model cleared.");
        assert!(changed);
        assert!(record.default_alias.is_none());
    }

    #[test]
    fn rejects_reserved_and_unknown() {
        let mut record = ConfigRecord::default();
        let err = apply(&mut record, &set("list")).unwrap_err();
        assert!(err.to_string().contains("reserved command"));
        let err = apply(&mut record, &set("nonexistent")).unwrap_err();
        assert!(err.to_string().contains("unknown alias 'nonexistent'"));
        assert!(record.default_alias.is_none());
    }

    #[test]
    fn stale_default_is_shown_not_fatal() {
        let mut record = ConfigRecord {
            default_alias: Some("gone".into()),
            ..Default::default()
        };
        let (msg, _) = apply(&mut record, &DefaultArgs::default()).unwrap();
        assert_eq!(msg, "gone (alias no longer valid)");
    }
}
