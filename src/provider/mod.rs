//! Provider adapters: one prompt against one provider/model.
//!
//! Two families implement [`ProviderAdapter`]:
//!   subprocess -> local CLI tools (claude, codex, gemini, qwen, ollama)
//!   http       -> chat-completions APIs (openrouter, glm)
//!
//! Both are driven by declarative templates in `catalog`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::Result;

pub mod catalog;
pub mod discover;
pub mod http;
pub mod subprocess;
#[cfg(test)]
pub mod testing;

pub use http::HttpAdapter;
pub use subprocess::SubprocessAdapter;

/// Every provider id the crate knows about, in display order.
pub const PROVIDER_IDS: &[&str] = &[
    "claude",
    "codex",
    "gemini",
    "qwen",
    "ollama",
    "openrouter",
    "glm",
];

pub fn is_known_provider(id: &str) -> bool {
    PROVIDER_IDS.contains(&id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    Subprocess,
    Http,
}

/// Per-call switches forwarded to an adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub json: bool,
    pub yolo: bool,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn family(&self) -> ProviderFamily;

    /// Executable on PATH or credential present.
    fn is_available(&self) -> bool;

    /// Human readable reason used when `is_available` is false.
    fn unavailable_reason(&self) -> String;

    /// Statically known models (empty when the provider lists them dynamically).
    fn known_models(&self) -> Vec<String> {
        Vec::new()
    }

    /// Models currently offered; defaults to the static list.
    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.known_models())
    }

    async fn call(&self, model: &str, prompt: &str, opts: CallOptions) -> Result<String>;
}

/// Provider id -> adapter.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Registry with every built-in adapter, configured from `settings`.
    pub fn builtin(settings: &Settings) -> Result<Self> {
        let mut reg = Self::default();
        for template in catalog::SUBPROCESS_TEMPLATES {
            reg.register(Arc::new(SubprocessAdapter::new(
                template.clone(),
                settings.subprocess_timeout,
            )));
        }
        for template in catalog::HTTP_TEMPLATES {
            reg.register(Arc::new(HttpAdapter::new(
                template.clone(),
                settings.http_timeout,
            )?));
        }
        Ok(reg)
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).cloned()
    }

    /// Ids of adapters that report themselves available.
    pub fn available(&self) -> Vec<String> {
        self.adapters
            .iter()
            .filter(|(_, a)| a.is_available())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
