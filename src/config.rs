//! Configuration for the Open Responder SDK
//!
//! [`ResponderOptions`] holds everything a [`Responder`](crate::Responder)
//! needs to talk to a Responses-compatible endpoint. The helpers in this module
//! resolve the endpoint and credentials from the environment first, then from a
//! [`Provider`] preset.

use crate::hooks::Hooks;
use crate::retry::RetryPolicy;
use crate::sse::UnknownEventPolicy;
use crate::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const BASE_URL_ENV: &str = "OPEN_RESPONDER_BASE_URL";
pub const API_KEY_ENV: &str = "OPEN_RESPONDER_API_KEY";
pub const MODEL_ENV: &str = "OPEN_RESPONDER_MODEL";

/// Supported provider shortcuts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    OpenRouter,
    LmStudio,
    Ollama,
}

impl Provider {
    /// Get the default base URL for this provider
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::LmStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Whether requests to this provider need an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Provider::OpenAi | Provider::OpenRouter)
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "open-ai" | "open_ai" => Ok(Provider::OpenAi),
            "openrouter" | "open-router" | "open_router" => Ok(Provider::OpenRouter),
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Provider::LmStudio),
            "ollama" => Ok(Provider::Ollama),
            other => Err(Error::config(format!("Unknown provider '{}'", other))),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn resolve_base_url(
    from_env: Option<String>,
    provider: Option<Provider>,
    fallback: Option<&str>,
) -> String {
    from_env
        .or_else(|| provider.map(|p| p.default_url().to_string()))
        .unwrap_or_else(|| {
            fallback
                .unwrap_or(Provider::OpenAi.default_url())
                .to_string()
        })
}

/// Get the base URL from environment variable or provider default
///
/// Priority:
/// 1. `OPEN_RESPONDER_BASE_URL` environment variable
/// 2. Provider default URL (if provider is Some)
/// 3. fallback parameter, or the OpenAI endpoint
///
/// ```rust,no_run
/// use open_responder::{get_base_url, Provider};
///
/// let url = get_base_url(Some(Provider::Ollama), None);
/// ```
pub fn get_base_url(provider: Option<Provider>, fallback: Option<&str>) -> String {
    resolve_base_url(non_empty_env(BASE_URL_ENV), provider, fallback)
}

/// Get the API key from `OPEN_RESPONDER_API_KEY`, or the fallback
pub fn get_api_key(fallback: Option<&str>) -> Option<String> {
    non_empty_env(API_KEY_ENV).or_else(|| fallback.map(str::to_string))
}

/// Get the model name from `OPEN_RESPONDER_MODEL` (if `prefer_env`), or the fallback
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Some(model) = non_empty_env(MODEL_ENV) {
            return Some(model);
        }
    }
    fallback.map(str::to_string)
}

/// Options for a [`Responder`](crate::Responder)
#[derive(Clone)]
pub struct ResponderOptions {
    /// Endpoint root; requests go to `{base_url}/responses`
    pub base_url: String,

    /// Bearer token, omitted from requests when `None`
    pub api_key: Option<String>,

    /// Whole-request timeout for buffered calls, in seconds
    pub timeout: u64,

    /// TCP connect timeout, in seconds
    pub connect_timeout: u64,

    pub retry_policy: RetryPolicy,

    /// Headers added to every request
    pub default_headers: HeaderMap,

    pub unknown_events: UnknownEventPolicy,

    /// Fail a stream when no event arrives for this long
    pub stream_idle_timeout: Option<Duration>,

    pub hooks: Hooks,
}

impl std::fmt::Debug for ResponderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderOptions")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("retry_policy", &self.retry_policy)
            .field(
                "default_headers",
                &format!("{} headers", self.default_headers.len()),
            )
            .field("unknown_events", &self.unknown_events)
            .field("stream_idle_timeout", &self.stream_idle_timeout)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl ResponderOptions {
    pub fn builder() -> ResponderOptionsBuilder {
        ResponderOptionsBuilder::default()
    }

    /// Options for a provider preset, with the API key taken from the environment
    pub fn for_provider(provider: Provider) -> Result<Self> {
        let mut builder = Self::builder().base_url(get_base_url(Some(provider), None));
        if let Some(key) = get_api_key(None) {
            builder = builder.api_key(key);
        } else if provider.requires_api_key() {
            log::warn!(
                "{:?} usually requires an API key but {} is not set",
                provider,
                API_KEY_ENV
            );
        }
        builder.build()
    }

    /// Full URL of the responses endpoint
    pub fn responses_url(&self) -> String {
        format!("{}/responses", self.base_url)
    }
}

/// Builder for [`ResponderOptions`]
#[derive(Default)]
pub struct ResponderOptionsBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<u64>,
    connect_timeout: Option<u64>,
    retry_policy: Option<RetryPolicy>,
    max_retries: Option<u32>,
    default_headers: Vec<(String, String)>,
    unknown_events: UnknownEventPolicy,
    stream_idle_timeout: Option<Duration>,
    hooks: Hooks,
}

impl std::fmt::Debug for ResponderOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderOptionsBuilder")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ResponderOptionsBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn provider(self, provider: Provider) -> Self {
        self.base_url(provider.default_url())
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = Some(seconds);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Shortcut for the default policy with a different retry count
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn unknown_events(mut self, policy: UnknownEventPolicy) -> Self {
        self.unknown_events = policy;
        self
    }

    pub fn stream_idle_timeout(mut self, idle: Duration) -> Self {
        self.stream_idle_timeout = Some(idle);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> Result<ResponderOptions> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::config("base_url is required"))?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "base_url must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let timeout = self.timeout.unwrap_or(60);
        if timeout == 0 {
            return Err(Error::config("timeout must be greater than zero"));
        }
        let connect_timeout = self.connect_timeout.unwrap_or(10);
        if connect_timeout == 0 {
            return Err(Error::config("connect_timeout must be greater than zero"));
        }
        if self.stream_idle_timeout == Some(Duration::ZERO) {
            return Err(Error::config("stream_idle_timeout must be greater than zero"));
        }

        let retry_policy = match (self.retry_policy, self.max_retries) {
            (Some(_), Some(_)) => {
                return Err(Error::config(
                    "set either retry_policy or max_retries, not both",
                ));
            }
            (Some(policy), None) => policy,
            (None, Some(retries)) => RetryPolicy::builder().max_retries(retries).build()?,
            (None, None) => RetryPolicy::default(),
        };

        let mut default_headers = HeaderMap::new();
        for (name, value) in self.default_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::config(format!("Invalid header name '{}': {}", name, e)))?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|e| Error::config(format!("Invalid value for header '{}': {}", name, e)))?;
            default_headers.insert(header_name, header_value);
        }

        Ok(ResponderOptions {
            base_url,
            api_key: self.api_key.filter(|k| !k.is_empty()),
            timeout,
            connect_timeout,
            retry_policy,
            default_headers,
            unknown_events: self.unknown_events,
            stream_idle_timeout: self.stream_idle_timeout,
            hooks: self.hooks,
        })
    }
}
