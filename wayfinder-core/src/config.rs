// Run configuration loaded from TOML

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use wayfinder_scanner::html::HttpOptions;
use wayfinder_scanner::identity::DEFAULT_VOLATILE_PARAMS;
use wayfinder_scanner::journey::Journey;
use wayfinder_scanner::mapper::DEFAULT_VOCABULARY;
use wayfinder_scanner::{ExplorerSettings, ResourceIdentity, ScanError, SectionMapper, SignInDetector};

/// Template written by `wayfinder init`.
pub const DEFAULT_CONFIG: &str = r##"# Wayfinder configuration
#
# Values of the form ${VAR} are replaced with environment variables when the
# file is loaded, so credentials never need to live here.

# entry_points = ["https://app.example.com/dashboard"]

max_depth = 2
max_breadth = 25
timeout_ms = 30000
same_origin_only = true

# Stop the run once this many ERROR entries have been recorded.
max_errors = 50

# vocabulary = ["client", "task", "deadline", "invoice", "report"]
# time_budget_secs = 1800
# test_data_prefix = "WAYFINDER_TEST"

[session]
expired_location_markers = ["sign-in", "login"]
# cookie = "${WAYFINDER_SESSION_COOKIE}"

# [session.headers]
# Authorization = "Bearer ${WAYFINDER_TOKEN}"

# [[journeys]]
# name = "create client"
# steps = [
#   { action = "open", url = "https://app.example.com/clients/new" },
#   { action = "fill", locators = ["input[name=name]", "#client-name"], value = "{prefix}_client" },
#   { action = "submit", locators = ["button:has-text(\"Save\")", "button[type=submit]"] },
# ]
"##;

fn default_max_depth() -> usize {
    2
}

fn default_max_breadth() -> usize {
    25
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_vocabulary() -> Vec<String> {
    DEFAULT_VOCABULARY.iter().map(|s| s.to_string()).collect()
}

fn default_volatile_params() -> Vec<String> {
    DEFAULT_VOLATILE_PARAMS.iter().map(|s| s.to_string()).collect()
}

fn default_location_markers() -> Vec<String> {
    vec!["sign-in".to_string(), "login".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Sent as the `Cookie` header on every request.
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default = "default_location_markers")]
    pub expired_location_markers: Vec<String>,
    #[serde(default)]
    pub expired_text_markers: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            cookie: None,
            expired_location_markers: default_location_markers(),
            expired_text_markers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreConfig {
    #[serde(default, alias = "baseEntryPoints")]
    pub entry_points: Vec<String>,
    #[serde(default = "default_max_depth", alias = "maxDepth")]
    pub max_depth: usize,
    #[serde(default = "default_max_breadth", alias = "maxBreadthPerResource")]
    pub max_breadth: usize,
    #[serde(default = "default_timeout_ms", alias = "perActionTimeoutMs")]
    pub timeout_ms: u64,
    #[serde(default = "default_vocabulary", alias = "sectionVocabulary")]
    pub vocabulary: Vec<String>,
    #[serde(default = "default_volatile_params")]
    pub volatile_params: Vec<String>,
    #[serde(default = "default_true")]
    pub same_origin_only: bool,
    #[serde(default)]
    pub max_errors: Option<usize>,
    #[serde(default)]
    pub time_budget_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub test_data_prefix: Option<String>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub journeys: Vec<Journey>,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            entry_points: Vec::new(),
            max_depth: default_max_depth(),
            max_breadth: default_max_breadth(),
            timeout_ms: default_timeout_ms(),
            vocabulary: default_vocabulary(),
            volatile_params: default_volatile_params(),
            same_origin_only: true,
            max_errors: None,
            time_budget_secs: None,
            user_agent: None,
            test_data_prefix: None,
            session: SessionConfig::default(),
            journeys: Vec::new(),
        }
    }
}

impl ExploreConfig {
    /// Rejects configurations the explorer cannot start with.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.entry_points.is_empty() {
            return Err(ScanError::Configuration("no entry points provided".to_string()));
        }
        for entry in &self.entry_points {
            Url::parse(entry)
                .map_err(|e| ScanError::InvalidUrl(format!("entry point '{}': {}", entry, e)))?;
        }
        if self.max_breadth == 0 {
            return Err(ScanError::Configuration("max_breadth must be at least 1".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ScanError::Configuration("timeout_ms must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }

    pub fn explorer_settings(&self) -> ExplorerSettings {
        ExplorerSettings {
            max_depth: self.max_depth,
            max_breadth: self.max_breadth,
            action_timeout: self.action_timeout(),
            same_origin_only: self.same_origin_only,
        }
    }

    pub fn identity(&self) -> ResourceIdentity {
        ResourceIdentity::with_volatile_params(self.volatile_params.iter().cloned())
    }

    pub fn mapper(&self) -> SectionMapper {
        SectionMapper::new(self.vocabulary.clone())
    }

    pub fn session_guard(&self) -> SignInDetector {
        SignInDetector::new(
            self.session.expired_location_markers.clone(),
            self.session.expired_text_markers.clone(),
        )
    }

    pub fn http_options(&self) -> HttpOptions {
        let mut options = HttpOptions {
            timeout: self.action_timeout(),
            ..HttpOptions::default()
        };
        if let Some(agent) = &self.user_agent {
            options.user_agent = agent.clone();
        }
        options.headers = self
            .session
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(cookie) = &self.session.cookie {
            options.headers.push(("Cookie".to_string(), cookie.clone()));
        }
        options
    }

    /// The configured prefix, or a fresh `WAYFINDER_<yyyymmdd>_<id>` one.
    pub fn test_prefix(&self) -> String {
        self.test_data_prefix.clone().unwrap_or_else(default_test_prefix)
    }
}

pub fn default_test_prefix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("WAYFINDER_{}_{}", Utc::now().format("%Y%m%d"), &id[..8])
}

/// Loads configuration with `${VAR}` environment substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Path) -> Result<ExploreConfig, ScanError> {
        let path = Self::expand_path(&path.to_string_lossy());
        let content = fs::read_to_string(&path).map_err(|e| {
            ScanError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::load_str(&content)
    }

    pub fn load_str(content: &str) -> Result<ExploreConfig, ScanError> {
        let expanded = Self::expand_env_vars(content)?;
        toml::from_str(&expanded).map_err(|e| ScanError::Configuration(e.to_string()))
    }

    /// Replaces `${VAR}` with the variable's value. Comment lines are left
    /// alone so a commented-out credential does not need to be set.
    pub fn expand_env_vars(content: &str) -> Result<String, ScanError> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ScanError::Configuration(e.to_string()))?;

        let mut result = String::with_capacity(content.len());
        for line in content.lines() {
            if line.trim_start().starts_with('#') {
                result.push_str(line);
            } else {
                let mut expanded = line.to_string();
                for cap in re.captures_iter(line) {
                    let value = std::env::var(&cap[1]).map_err(|_| {
                        ScanError::Configuration(format!(
                            "environment variable '{}' is not set",
                            &cap[1]
                        ))
                    })?;
                    expanded = expanded.replace(&cap[0], &value);
                }
                result.push_str(&expanded);
            }
            result.push('\n');
        }
        Ok(result)
    }

    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).as_ref())
    }
}
