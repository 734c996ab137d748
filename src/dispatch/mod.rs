//! Dispatch engine: resolve model tokens and run them against adapters.
//!
//! Key items:
//!   single  -> one provider/model, availability checked first
//!   call    -> alias resolution + single (HTTP front door)
//!   multi   -> one task per token, results back in token order

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::alias::{self, AliasTable};
use crate::error::{AiError, Result};
use crate::provider::{CallOptions, ProviderAdapter, ProviderRegistry};

/// Outcome for one model token of a fan-out.
#[derive(Debug)]
pub struct DispatchResult {
    pub token: String,
    pub outcome: Result<String>,
    pub elapsed: Duration,
}

impl DispatchResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub struct DispatchEngine {
    registry: ProviderRegistry,
    table: AliasTable,
}

impl DispatchEngine {
    pub fn new(registry: ProviderRegistry, table: AliasTable) -> Self {
        Self { registry, table }
    }

    pub fn table(&self) -> &AliasTable {
        &self.table
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Adapter for `provider`, refusing unknown or unavailable providers.
    fn adapter_for(&self, provider: &str) -> Result<Arc<dyn ProviderAdapter>> {
        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| AiError::Config(format!("unknown provider '{provider}'")))?;
        if !adapter.is_available() {
            return Err(AiError::ProviderUnavailable {
                provider: provider.to_string(),
                reason: adapter.unavailable_reason(),
            });
        }
        Ok(adapter)
    }

    pub async fn single(
        &self,
        provider: &str,
        model: &str,
        prompt: &str,
        opts: CallOptions,
    ) -> Result<String> {
        let adapter = self.adapter_for(provider)?;
        let started = Instant::now();
        let result = adapter.call(model, prompt, opts).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(provider, model, elapsed_ms, "dispatch ok"),
            Err(e) => {
                tracing::info!(provider, model, elapsed_ms, kind = e.kind(), error = %e, "dispatch failed")
            }
        }
        result
    }

    pub async fn call(&self, alias: &str, prompt: &str, opts: CallOptions) -> Result<String> {
        let target = alias::resolve(alias, &self.table)?;
        tracing::debug!(alias, provider = %target.provider, model = %target.model, "resolved alias");
        self.single(&target.provider, &target.model, prompt, opts).await
    }

    /// Fan out to every token concurrently; results come back in input order.
    ///
    /// Failures (resolution included) stay in their slot; no task is cancelled.
    pub async fn multi(
        &self,
        tokens: &[String],
        prompt: &str,
        opts: CallOptions,
    ) -> Vec<DispatchResult> {
        let prompt: Arc<str> = Arc::from(prompt);
        let handles: Vec<_> = tokens
            .iter()
            .map(|token| {
                let target = alias::resolve(token, &self.table)
                    .and_then(|a| Ok((self.adapter_for(&a.provider)?, a)));
                let prompt = prompt.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let outcome = match target {
                        Ok((adapter, a)) => adapter.call(&a.model, &prompt, opts).await,
                        Err(e) => Err(e),
                    };
                    (outcome, started.elapsed())
                })
            })
            .collect();

        let joined = join_all(handles).await;
        tokens
            .iter()
            .zip(joined)
            .map(|(token, joined)| {
                let (outcome, elapsed) = joined.unwrap_or_else(|e| {
                    (
                        Err(AiError::execution(token.as_str(), format!("task failed: {e}"))),
                        Duration::ZERO,
                    )
                });
                tracing::debug!(alias = %token, ok = outcome.is_ok(), elapsed_ms = elapsed.as_millis() as u64, "fan-out slot finished");
                DispatchResult {
                    token: token.clone(),
                    outcome,
                    elapsed,
                }
            })
            .collect()
    }
}
