//! Startup configuration.
//!
//! Flags and env vars come in from clap; an optional `spotd.toml` sits
//! underneath. Priority: CLI / env var > TOML > built-in default. Every
//! validation failure here is fatal before the first cycle runs.

use crate::notify::slack::SlackNotifier;
use crate::notify::Notifier;
use crate::source::bamboo::BambooSource;
use crate::source::jenkins::{JenkinsSource, DEFAULT_CLASS_ALLOWLIST};
use crate::source::AgentSource;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_INTERVAL_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no sources configured — pass at least one --jenkins or --bamboo")]
    NoSources,
    #[error("unrecognized source spec '{0}' — expected <url> or <url>,<user>,<pass>")]
    BadSpec(String),
    #[error("endpoint '{0}' is not an http(s) URL")]
    BadEndpoint(String),
    #[error("polling interval must be at least 1 second")]
    BadInterval,
    #[error("could not read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// One backend instance to watch: endpoint plus optional basic-auth pair.
///
/// Parsed from a spec string of either `<url>` (no auth) or
/// `<url>,<user>,<pass>` (`<pass>` may be a password or access token).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub endpoint: String,
    pub credentials: Option<(String, String)>,
}

impl SourceSpec {
    pub fn parse(arg: &str) -> Result<Self, ConfigError> {
        if arg.is_empty() {
            return Err(ConfigError::BadSpec(arg.to_string()));
        }

        let parts: Vec<&str> = arg.split(',').collect();
        let spec = match parts.as_slice() {
            [endpoint] => Self {
                endpoint: endpoint.to_string(),
                credentials: None,
            },
            [endpoint, user, pass] => {
                if user.is_empty() || pass.is_empty() {
                    return Err(ConfigError::BadSpec(arg.to_string()));
                }
                Self {
                    endpoint: endpoint.to_string(),
                    credentials: Some((user.to_string(), pass.to_string())),
                }
            }
            _ => return Err(ConfigError::BadSpec(arg.to_string())),
        };

        validate_endpoint(&spec.endpoint)?;
        Ok(spec)
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::BadEndpoint(endpoint.to_string()))
    }
}

/// Raw values collected by clap in `main`. `None`/empty means "not given" —
/// the TOML file (then the default) fills the gap.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub jenkins: Vec<String>,
    pub bamboo: Vec<String>,
    pub jenkins_class: Vec<String>,
    pub slack_webhook: Option<String>,
    pub slack_username: Option<String>,
    pub slack_icon_url: Option<String>,
    pub interval_secs: Option<u64>,
}

/// `spotd.toml` — all fields are optional overrides below the CLI.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    /// Jenkins spec strings, same format as `--jenkins`.
    #[serde(default)]
    jenkins: Vec<String>,
    /// Bamboo spec strings, same format as `--bamboo`.
    #[serde(default)]
    bamboo: Vec<String>,
    /// Jenkins `_class` allowlist override.
    #[serde(default)]
    jenkins_class: Vec<String>,
    slack_webhook: Option<String>,
    slack_username: Option<String>,
    slack_icon_url: Option<String>,
    /// Polling interval in seconds (default: 300).
    interval: Option<u64>,
}

fn load_toml(path: &Path) -> Result<TomlConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Fully resolved, validated configuration.
#[derive(Debug)]
pub struct WatchConfig {
    pub jenkins: Vec<SourceSpec>,
    pub bamboo: Vec<SourceSpec>,
    pub jenkins_class_allowlist: Vec<String>,
    pub slack_webhook: Option<String>,
    pub slack_username: Option<String>,
    pub slack_icon_url: Option<String>,
    pub interval: Duration,
}

impl WatchConfig {
    /// Merge CLI values over the optional TOML file, parse and validate.
    pub fn resolve(cli: CliOverrides, config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => load_toml(path)?,
            None => TomlConfig::default(),
        };

        let jenkins_args = if cli.jenkins.is_empty() {
            file.jenkins
        } else {
            cli.jenkins
        };
        let bamboo_args = if cli.bamboo.is_empty() {
            file.bamboo
        } else {
            cli.bamboo
        };

        let jenkins = jenkins_args
            .iter()
            .map(|arg| SourceSpec::parse(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let bamboo = bamboo_args
            .iter()
            .map(|arg| SourceSpec::parse(arg))
            .collect::<Result<Vec<_>, _>>()?;

        if jenkins.is_empty() && bamboo.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let jenkins_class_allowlist = if !cli.jenkins_class.is_empty() {
            cli.jenkins_class
        } else if !file.jenkins_class.is_empty() {
            file.jenkins_class
        } else {
            DEFAULT_CLASS_ALLOWLIST
                .iter()
                .map(|s| s.to_string())
                .collect()
        };

        let slack_webhook = cli.slack_webhook.or(file.slack_webhook);
        if let Some(webhook) = &slack_webhook {
            validate_endpoint(webhook)?;
        }

        let interval_secs = cli
            .interval_secs
            .or(file.interval)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        // tokio::time::interval panics on a zero period — catch it here, at
        // startup, like every other bad config value.
        if interval_secs == 0 {
            return Err(ConfigError::BadInterval);
        }

        Ok(Self {
            jenkins,
            bamboo,
            jenkins_class_allowlist,
            slack_webhook,
            slack_username: cli.slack_username.or(file.slack_username),
            slack_icon_url: cli.slack_icon_url.or(file.slack_icon_url),
            interval: Duration::from_secs(interval_secs),
        })
    }

    /// Instantiate one source per configured spec, in configuration order.
    pub fn build_sources(&self, client: &reqwest::Client) -> Vec<Arc<dyn AgentSource>> {
        let mut sources: Vec<Arc<dyn AgentSource>> = Vec::new();

        for spec in &self.jenkins {
            sources.push(Arc::new(JenkinsSource::new(
                &spec.endpoint,
                spec.credentials.clone(),
                self.jenkins_class_allowlist.clone(),
                client.clone(),
            )));
        }
        for spec in &self.bamboo {
            sources.push(Arc::new(BambooSource::new(
                &spec.endpoint,
                spec.credentials.clone(),
                client.clone(),
            )));
        }

        sources
    }

    pub fn build_notifier(&self, client: &reqwest::Client) -> Option<Arc<dyn Notifier>> {
        self.slack_webhook.as_deref().map(|webhook| {
            Arc::new(SlackNotifier::new(
                webhook,
                self.slack_username.clone(),
                self.slack_icon_url.clone(),
                client.clone(),
            )) as Arc<dyn Notifier>
        })
    }
}
