//! nodesize.toml configuration parser.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::SizeCatalog;
use crate::error::ConfigError;
use crate::types::{NodeSize, PublishPolicy, UnsatisfiablePolicy};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_DEGRADED_THRESHOLD: u32 = 5;
const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesizeConfig {
    pub calculator: Option<CalculatorConfig>,
    pub poll: Option<PollSection>,
    #[serde(default)]
    pub sizes: Vec<NodeSize>,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculatorConfig {
    pub max_nodes: Option<u32>,
    pub unsatisfiable: Option<UnsatisfiablePolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollSection {
    pub interval: Option<String>,
    pub max_backoff: Option<String>,
    pub degraded_threshold: Option<u32>,
    pub publish: Option<PublishPolicy>,
    pub replay_last: Option<bool>,
    pub subscriber_buffer: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    pub source: SourceConfig,
}

/// Where a queue's job list is fetched from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    File { path: PathBuf },
    Http { url: String, timeout: Option<String> },
}

/// Poll settings with defaults applied and durations parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_backoff: Duration,
    pub degraded_threshold: u32,
    pub publish: PublishPolicy,
    pub replay_last: bool,
    pub subscriber_buffer: usize,
}

impl NodesizeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a config document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: NodesizeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.catalog()?;
        self.poll_settings()?;

        if self.queues.is_empty() {
            return Err(ConfigError::NoQueues);
        }
        let mut names = HashSet::new();
        for queue in &self.queues {
            if !names.insert(queue.name.as_str()) {
                return Err(ConfigError::DuplicateQueue(queue.name.clone()));
            }
            if let SourceConfig::Http { url, timeout } = &queue.source {
                if !url.starts_with("http://") {
                    return Err(ConfigError::Invalid(format!(
                        "queue {:?}: only http:// URLs are supported, got {url:?}",
                        queue.name
                    )));
                }
                duration_field("queues.source.timeout", timeout.as_deref(), DEFAULT_HTTP_TIMEOUT)?;
            }
        }
        Ok(())
    }

    /// Build the size catalog from `[[sizes]]`.
    pub fn catalog(&self) -> Result<SizeCatalog, ConfigError> {
        Ok(SizeCatalog::new(self.sizes.clone())?)
    }

    pub fn max_nodes(&self) -> Option<u32> {
        self.calculator.as_ref().and_then(|c| c.max_nodes)
    }

    pub fn unsatisfiable_policy(&self) -> UnsatisfiablePolicy {
        self.calculator
            .as_ref()
            .and_then(|c| c.unsatisfiable)
            .unwrap_or_default()
    }

    pub fn poll_settings(&self) -> Result<PollSettings, ConfigError> {
        let poll = self.poll.clone().unwrap_or_default();
        let subscriber_buffer = poll.subscriber_buffer.unwrap_or(DEFAULT_SUBSCRIBER_BUFFER);
        if subscriber_buffer == 0 {
            return Err(ConfigError::Invalid(
                "poll.subscriber_buffer must be at least 1".to_string(),
            ));
        }

        Ok(PollSettings {
            interval: duration_field("poll.interval", poll.interval.as_deref(), DEFAULT_POLL_INTERVAL)?,
            max_backoff: duration_field(
                "poll.max_backoff",
                poll.max_backoff.as_deref(),
                DEFAULT_MAX_BACKOFF,
            )?,
            degraded_threshold: poll.degraded_threshold.unwrap_or(DEFAULT_DEGRADED_THRESHOLD),
            publish: poll.publish.unwrap_or_default(),
            replay_last: poll.replay_last.unwrap_or(false),
            subscriber_buffer,
        })
    }
}

impl SourceConfig {
    /// Request timeout for HTTP sources.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        match self {
            SourceConfig::Http { timeout, .. } => {
                duration_field("queues.source.timeout", timeout.as_deref(), DEFAULT_HTTP_TIMEOUT)
            }
            SourceConfig::File { .. } => Ok(DEFAULT_HTTP_TIMEOUT),
        }
    }
}

fn duration_field(
    field: &'static str,
    value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => parse_duration(v).ok_or_else(|| ConfigError::InvalidDuration {
            field,
            value: v.to_string(),
        }),
    }
}

/// Parse a duration string like "5s", "500ms", "2m", or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().and_then(|m| m.checked_mul(60)).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[calculator]
max_nodes = 9
unsatisfiable = "debug"

[poll]
interval = "2s"
max_backoff = "1m"
degraded_threshold = 3
publish = "on_change"
replay_last = true

[[sizes]]
id = "large"
cores = 8
ram_mb = 30720
scratch_mb = 160000
cost = 0.4

[[sizes]]
id = "small"
cores = 1
ram_mb = 3750
scratch_mb = 40000
cost = 0.05

[[queues]]
name = "default"
source = { kind = "file", path = "/tmp/queue.json" }

[[queues]]
name = "remote"
source = { kind = "http", url = "http://127.0.0.1:8000/jobs/queue", timeout = "750ms" }
"#;

    const MINIMAL: &str = r#"
[[sizes]]
id = "only"
cores = 1
ram_mb = 1024
scratch_mb = 1000
cost = 1.0

[[queues]]
name = "q"
source = { kind = "file", path = "queue.json" }
"#;

    #[test]
    fn parse_full_config() {
        let config = NodesizeConfig::parse(FULL).unwrap();

        assert_eq!(config.max_nodes(), Some(9));
        assert_eq!(config.unsatisfiable_policy(), UnsatisfiablePolicy::Debug);

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.iter().next().unwrap().id, "small");

        let poll = config.poll_settings().unwrap();
        assert_eq!(poll.interval, Duration::from_secs(2));
        assert_eq!(poll.max_backoff, Duration::from_secs(60));
        assert_eq!(poll.degraded_threshold, 3);
        assert_eq!(poll.publish, PublishPolicy::OnChange);
        assert!(poll.replay_last);

        assert_eq!(config.queues.len(), 2);
        assert_eq!(
            config.queues[1].source.timeout().unwrap(),
            Duration::from_millis(750)
        );
    }

    #[test]
    fn parse_minimal_applies_defaults() {
        let config = NodesizeConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.max_nodes(), None);
        assert_eq!(config.unsatisfiable_policy(), UnsatisfiablePolicy::Warn);

        let poll = config.poll_settings().unwrap();
        assert_eq!(poll.interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(poll.max_backoff, DEFAULT_MAX_BACKOFF);
        assert_eq!(poll.publish, PublishPolicy::EveryCycle);
        assert!(!poll.replay_last);
        assert_eq!(poll.subscriber_buffer, DEFAULT_SUBSCRIBER_BUFFER);
    }

    #[test]
    fn rejects_missing_sizes() {
        let toml_str = r#"
[[queues]]
name = "q"
source = { kind = "file", path = "queue.json" }
"#;
        assert!(matches!(
            NodesizeConfig::parse(toml_str),
            Err(ConfigError::Catalog(_))
        ));
    }

    #[test]
    fn rejects_missing_queues() {
        let toml_str = MINIMAL.split("[[queues]]").next().unwrap();
        assert!(matches!(
            NodesizeConfig::parse(toml_str),
            Err(ConfigError::NoQueues)
        ));
    }

    #[test]
    fn rejects_duplicate_queue_names() {
        let toml_str = format!(
            "{MINIMAL}\n[[queues]]\nname = \"q\"\nsource = {{ kind = \"file\", path = \"other.json\" }}\n"
        );
        assert!(matches!(
            NodesizeConfig::parse(&toml_str),
            Err(ConfigError::DuplicateQueue(name)) if name == "q"
        ));
    }

    #[test]
    fn rejects_bad_interval() {
        let toml_str = format!("[poll]\ninterval = \"soon\"\n{MINIMAL}");
        assert!(matches!(
            NodesizeConfig::parse(&toml_str),
            Err(ConfigError::InvalidDuration { field: "poll.interval", .. })
        ));
    }

    #[test]
    fn rejects_https_url() {
        let toml_str = MINIMAL.replace(
            r#"{ kind = "file", path = "queue.json" }"#,
            r#"{ kind = "http", url = "https://example.com/queue" }"#,
        );
        assert!(matches!(
            NodesizeConfig::parse(&toml_str),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodesize.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = NodesizeConfig::from_file(&path).unwrap();
        assert_eq!(config.sizes.len(), 1);

        let missing = NodesizeConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }
}
