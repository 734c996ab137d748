//! Error taxonomy shared by the alias registry, classifier, chat store,
//! provider adapters and the dispatch engine.
//!
//! Command modules wrap these in `anyhow`; `main` digs the `AiError` back
//! out of the chain to print the message and its hint.

use std::time::Duration;
use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    /// A model token matched neither an alias nor `provider:model`.
    #[error("unknown model '{alias}'. Run 'ai list' to see available models.")]
    UnknownAlias { alias: String },

    /// Invalid configuration (unknown provider, bad alias record, malformed config file).
    #[error("{0}")]
    Config(String),

    /// The provider's executable or credential is missing.
    #[error("{provider} is not available: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// The provider ran but failed.
    #[error("{provider} error: {message}")]
    ProviderExecution { provider: String, message: String },

    /// The provider did not answer within its time budget.
    #[error("{provider} error: timed out after {}s", .after.as_secs())]
    Timeout { provider: String, after: Duration },

    /// The command line (or request body) could not be turned into a request.
    #[error("{message}")]
    Argument {
        message: String,
        hint: Option<String>,
    },

    /// Session or config file could not be read/written.
    #[error("storage error: {0}")]
    Storage(String),
}

impl AiError {
    pub fn unknown_alias(alias: impl Into<String>) -> Self {
        AiError::UnknownAlias {
            alias: alias.into(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        AiError::Argument {
            message: message.into(),
            hint: None,
        }
    }

    pub fn argument_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        AiError::Argument {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn execution(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AiError::ProviderExecution {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Follow-up advice printed as `Tip:` under the error.
    pub fn hint(&self) -> Option<String> {
        match self {
            AiError::UnknownAlias { .. } => Some(
                "Set a default with 'ai default <alias>' to use 'ai \"prompt\"' directly."
                    .to_string(),
            ),
            AiError::ProviderUnavailable { .. } => {
                Some("Run 'ai init' to re-detect installed tools and API keys.".to_string())
            }
            AiError::Argument { hint, .. } => hint.clone(),
            _ => None,
        }
    }

    /// Stable machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            AiError::UnknownAlias { .. } => "unknown_alias",
            AiError::Config(_) => "config",
            AiError::ProviderUnavailable { .. } => "provider_unavailable",
            AiError::ProviderExecution { .. } => "provider_error",
            AiError::Timeout { .. } => "timeout",
            AiError::Argument { .. } => "argument",
            AiError::Storage(_) => "storage",
        }
    }
}

impl From<std::io::Error> for AiError {
    fn from(e: std::io::Error) -> Self {
        AiError::Storage(e.to_string())
    }
}
