//! In-memory adapter for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{CallOptions, ProviderAdapter, ProviderFamily};
use crate::error::{AiError, Result};

pub struct MockAdapter {
    pub id: &'static str,
    pub family: ProviderFamily,
    pub available: bool,
    pub delay: Duration,
    /// `Ok` answers are prefixed with the model id; `Err` becomes an execution error.
    pub reply: std::result::Result<String, String>,
    /// `None` makes `list_models` fail.
    pub models: Option<Vec<String>>,
    pub calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            family: ProviderFamily::Subprocess,
            available: true,
            delay: Duration::ZERO,
            reply: Ok("ok".to_string()),
            models: Some(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_family(mut self, family: ProviderFamily) -> Self {
        self.family = family;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.reply = Err(message.to_string());
        self
    }

    pub fn models(mut self, models: &[&str]) -> Self {
        self.models = Some(models.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn listing_fails(mut self) -> Self {
        self.models = None;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn id(&self) -> &str {
        self.id
    }

    fn family(&self) -> ProviderFamily {
        self.family
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn unavailable_reason(&self) -> String {
        "mock disabled".to_string()
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        self.models
            .clone()
            .ok_or_else(|| AiError::execution(self.id, "listing failed"))
    }

    async fn call(&self, model: &str, prompt: &str, _opts: CallOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Ok(text) => Ok(format!("{model}: {text} [{prompt}]")),
            Err(msg) => Err(AiError::execution(self.id, msg.clone())),
        }
    }
}
