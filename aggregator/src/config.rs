use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

pub const DEFAULT_UPSTREAM_URL: &str = "https://clist.by:443/api/v4/contest/";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Upstream timeout must be at least one second")]
    InvalidTimeout,

    #[error("Upstream result limit cannot be 0")]
    InvalidLimit,

    #[error("At least one resource must be configured")]
    NoResources,

    #[error("Empty resource name")]
    EmptyResourceName,

    #[error("Duplicate resource name: {0}")]
    DuplicateResourceName(String),

    #[error("Duplicate resource id: {0}")]
    DuplicateResourceId(u32),

    #[error("Upstream username is not set")]
    MissingUsername,

    #[error("Upstream API key is not set")]
    MissingApiKey,
}

#[derive(Error, Debug)]
#[error("invalid value for {name}: {reason}")]
pub struct EnvError {
    pub name: &'static str,
    pub reason: String,
}

/// How failures of individual upstream calls affect the combined response
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Any failing resource fails the whole request
    #[default]
    AllOrNothing,
    /// Failing resources are logged and skipped. The request only fails
    /// when every resource fails.
    BestEffort,
}

/// Aggregator configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener for incoming requests
    pub listener: Listener,
    /// Contest listing API to query
    pub upstream: UpstreamConfig,
    /// Resources queried on every request, in output tie-break order
    pub resources: Vec<Resource>,
    pub failure_mode: FailureMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            upstream: UpstreamConfig::default(),
            resources: default_resources(),
            failure_mode: FailureMode::default(),
        }
    }
}

impl Config {
    /// Validates the aggregator configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.upstream.validate()?;

        if self.resources.is_empty() {
            return Err(ValidationError::NoResources);
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for resource in &self.resources {
            if resource.name.is_empty() {
                return Err(ValidationError::EmptyResourceName);
            }
            if !names.insert(&resource.name) {
                return Err(ValidationError::DuplicateResourceName(
                    resource.name.clone(),
                ));
            }
            if !ids.insert(resource.id) {
                return Err(ValidationError::DuplicateResourceId(resource.id));
            }
        }

        Ok(())
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), EnvError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides using `lookup` to resolve variable names.
    ///
    /// Recognized variables: `CLIST_USERNAME`, `CLIST_API_KEY`,
    /// `CLIST_BASE_URL`, `UPSTREAM_TIMEOUT_SECS` and `PORT`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), EnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = lookup("CLIST_USERNAME") {
            self.upstream.username = username;
        }
        if let Some(api_key) = lookup("CLIST_API_KEY") {
            self.upstream.api_key = api_key;
        }
        if let Some(url) = lookup("CLIST_BASE_URL") {
            self.upstream.url = Url::parse(&url).map_err(|e| EnvError {
                name: "CLIST_BASE_URL",
                reason: e.to_string(),
            })?;
        }
        if let Some(timeout) = lookup("UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout_secs = timeout.parse().map_err(|e| EnvError {
                name: "UPSTREAM_TIMEOUT_SECS",
                reason: format!("{e}"),
            })?;
        }
        if let Some(port) = lookup("PORT") {
            self.listener.port = port.parse().map_err(|e| EnvError {
                name: "PORT",
                reason: format!("{e}"),
            })?;
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Contest listing API configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Endpoint returning contest listings.
    ///
    /// Note: Uses the `url::Url` type so invalid URLs are rejected during
    /// config deserialization.
    pub url: Url,
    pub username: String,
    pub api_key: String,
    /// Applies to the whole request/response cycle of each upstream call
    pub timeout_secs: u64,
    /// Maximum number of contests requested per resource
    pub limit: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            url: Url::parse(DEFAULT_UPSTREAM_URL).expect("default upstream URL is valid"),
            username: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
            limit: 100,
        }
    }
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.limit == 0 {
            return Err(ValidationError::InvalidLimit);
        }
        if self.username.is_empty() {
            return Err(ValidationError::MissingUsername);
        }
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingApiKey);
        }
        Ok(())
    }
}

/// A platform known to the upstream API by a numeric id
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub id: u32,
}

impl Resource {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Resource {
            name: name.into(),
            id,
        }
    }
}

pub fn default_resources() -> Vec<Resource> {
    vec![
        Resource::new("codeforces", 1),
        Resource::new("codechef", 2),
        Resource::new("topcoder", 12),
        Resource::new("atcoder", 93),
        Resource::new("leetcode", 102),
    ]
}
