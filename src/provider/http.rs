/*!
HTTP provider family (OpenAI-style chat completions).

Request body:
  { "model": M, "messages": [{"role":"user","content":P}],
    "response_format": {"type":"json_object"}   (json mode only)
    "stream": false }                             (templates that ask for it)

Response handling:
  non-2xx            -> "HTTP <code>: <body>"
  body "error"       -> its "message" (or the raw error value)
  missing choices    -> "Invalid response: missing 'choices'"
  missing content    -> "Invalid response: missing 'content'"
  transport timeout  -> AiError::Timeout
*/

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use url::Url;

use super::{CallOptions, ProviderAdapter, ProviderFamily};
use crate::error::{AiError, Result};

/// Default time budget for an HTTP call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

const MODELS_TIMEOUT: Duration = Duration::from_secs(10);

/// Declarative description of a chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpTemplate {
    pub id: &'static str,
    pub endpoint: &'static str,
    /// Model listing endpoint, when the provider exposes one.
    pub models_endpoint: Option<&'static str>,
    /// Credential env vars, first present wins.
    pub key_envs: &'static [&'static str],
    /// Model ids must end with this marker (checked before any network call).
    pub required_model_suffix: Option<&'static str>,
    pub send_stream_false: bool,
    pub known_models: &'static [&'static str],
}

impl HttpTemplate {
    pub fn build_body(&self, model: &str, prompt: &str, json_mode: bool) -> Value {
        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        if self.send_stream_false {
            body["stream"] = Value::Bool(false);
        }
        body
    }
}

/// Pull the answer text out of a decoded response body.
pub fn extract_content(data: &Value) -> std::result::Result<String, String> {
    if let Some(err) = data.get("error").filter(|e| !e.is_null()) {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| match err {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        return Err(msg);
    }
    let first = data
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| "Invalid response: missing 'choices'".to_string())?;
    first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| "Invalid response: missing 'content'".to_string())
}

/* ---- Adapter ---- */

pub struct HttpAdapter {
    template: HttpTemplate,
    client: Client,
    endpoint: Url,
    models_endpoint: Option<Url>,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpAdapter {
    pub fn new(template: HttpTemplate, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Config(format!("failed to create HTTP client: {e}")))?;
        let endpoint = parse_url(template.endpoint)?;
        let models_endpoint = template.models_endpoint.map(parse_url).transpose()?;
        Ok(Self {
            template,
            client,
            endpoint,
            models_endpoint,
            api_key: None,
            timeout,
        })
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    #[cfg(test)]
    pub fn with_models_endpoint(mut self, endpoint: Url) -> Self {
        self.models_endpoint = Some(endpoint);
        self
    }

    #[cfg(test)]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Explicit key, else the first non-empty env var from the template.
    pub fn api_key(&self) -> Option<String> {
        if let Some(k) = &self.api_key {
            return Some(k.clone());
        }
        self.template
            .key_envs
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.trim().is_empty())
    }

    fn transport_error(&self, e: reqwest::Error) -> AiError {
        if e.is_timeout() {
            AiError::Timeout {
                provider: self.template.id.to_string(),
                after: self.timeout,
            }
        } else if e.is_connect() {
            AiError::execution(self.template.id, format!("Connection error: {e}"))
        } else {
            AiError::execution(self.template.id, e.to_string())
        }
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| AiError::Config(format!("invalid endpoint '{raw}': {e}")))
}

#[async_trait]
impl ProviderAdapter for HttpAdapter {
    fn id(&self) -> &str {
        self.template.id
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Http
    }

    fn is_available(&self) -> bool {
        self.api_key().is_some()
    }

    fn unavailable_reason(&self) -> String {
        format!("{} not set", self.template.key_envs.join(" or "))
    }

    fn known_models(&self) -> Vec<String> {
        self.template.known_models.iter().map(|s| s.to_string()).collect()
    }

    /// Model ids from the listing endpoint, filtered by the required suffix.
    async fn list_models(&self) -> Result<Vec<String>> {
        let id = self.template.id;
        let Some(endpoint) = &self.models_endpoint else {
            return Ok(self.known_models());
        };
        let key = self.api_key().ok_or_else(|| AiError::ProviderUnavailable {
            provider: id.to_string(),
            reason: self.unavailable_reason(),
        })?;

        let resp = self
            .client
            .get(endpoint.clone())
            .bearer_auth(key)
            .timeout(MODELS_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::execution(id, format!("HTTP {}: {body}", status.as_u16())));
        }
        let data: Value = resp
            .json()
            .await
            .map_err(|e| AiError::execution(id, format!("Invalid response: {e}")))?;

        let suffix = self.template.required_model_suffix.unwrap_or("");
        let models = data
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .filter(|id| id.ends_with(suffix))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    async fn call(&self, model: &str, prompt: &str, opts: CallOptions) -> Result<String> {
        let id = self.template.id;
        let key = self.api_key().ok_or_else(|| AiError::ProviderUnavailable {
            provider: id.to_string(),
            reason: self.unavailable_reason(),
        })?;

        if let Some(suffix) = self.template.required_model_suffix
            && !model.ends_with(suffix)
        {
            return Err(AiError::execution(
                id,
                format!("model must end with '{suffix}'. Got: {model}"),
            ));
        }

        let body = self.template.build_body(model, prompt, opts.json);
        tracing::debug!(provider = id, model, endpoint = %self.endpoint, "posting chat completion");

        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            tracing::debug!(provider = id, status = status.as_u16(), "provider returned error status");
            return Err(AiError::execution(id, format!("HTTP {}: {text}", status.as_u16())));
        }

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| AiError::execution(id, format!("Invalid response: {e}")))?;
        extract_content(&data).map_err(|msg| AiError::execution(id, msg))
    }
}
