//! Tool and model discovery used by `ai init`.

use std::collections::BTreeMap;

use futures::future::join_all;

use super::{PROVIDER_IDS, ProviderFamily, ProviderRegistry};

/// What `ai init` found on this machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Subprocess tools found on PATH.
    pub installed_tools: Vec<String>,
    /// Provider id -> model ids (providers with no models are omitted).
    pub models: BTreeMap<String, Vec<String>>,
}

/// Probe every available adapter for its models, concurrently.
///
/// A failing listing is logged and treated as "no models".
pub async fn discover(registry: &ProviderRegistry) -> Discovery {
    let adapters: Vec<_> = PROVIDER_IDS
        .iter()
        .filter_map(|id| registry.get(id))
        .filter(|a| {
            let ok = a.is_available();
            if !ok {
                tracing::debug!(provider = a.id(), reason = %a.unavailable_reason(), "provider unavailable");
            }
            ok
        })
        .collect();

    let listings = join_all(adapters.iter().map(|a| a.list_models())).await;

    let mut found = Discovery::default();
    for (adapter, listing) in adapters.iter().zip(listings) {
        let id = adapter.id().to_string();
        if adapter.family() == ProviderFamily::Subprocess {
            found.installed_tools.push(id.clone());
        }
        match listing {
            Ok(models) if !models.is_empty() => {
                tracing::info!(provider = %id, count = models.len(), "models discovered");
                found.models.insert(id, models);
            }
            Ok(_) => tracing::debug!(provider = %id, "no models listed"),
            Err(e) => tracing::warn!(provider = %id, error = %e, "model listing failed"),
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::MockAdapter;

    #[tokio::test]
    async fn discovery_collects_available_providers_only() {
        let mut reg = ProviderRegistry::default();
        reg.register(MockAdapter::new("claude").models(&["sonnet"]).shared());
        reg.register(MockAdapter::new("codex").unavailable().models(&["gpt"]).shared());
        reg.register(MockAdapter::new("ollama").listing_fails().shared());
        reg.register(
            MockAdapter::new("openrouter")
                .with_family(ProviderFamily::Http)
                .models(&["a/b:free"])
                .shared(),
        );
        reg.register(
            MockAdapter::new("glm")
                .with_family(ProviderFamily::Http)
                .unavailable()
                .models(&["glm-5"])
                .shared(),
        );

        let found = discover(&reg).await;
        assert_eq!(found.installed_tools, vec!["claude", "ollama"]);
        assert_eq!(found.models.len(), 2);
        assert_eq!(found.models["claude"], vec!["sonnet"]);
        assert_eq!(found.models["openrouter"], vec!["a/b:free"]);
        assert!(!found.models.contains_key("ollama"));
    }
}
