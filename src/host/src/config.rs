//! Host configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shellmesh_authz::{Claims, GroupRoleMapping};
use shellmesh_federation::LoaderMode;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// How remote locations are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Manifest-driven discovery
    #[default]
    Production,
    /// Fixed local locations from `static_dev_locations`
    Development,
}

/// Complete host configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Owner name recorded on shared scope entries
    #[serde(default = "default_host_name")]
    pub name: String,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,

    #[serde(default = "default_manifest_timeout")]
    pub manifest_timeout_ms: u64,

    #[serde(default)]
    pub use_mock_auth: bool,

    #[serde(default)]
    pub static_dev_locations: BTreeMap<String, String>,

    /// Upper bound on a single load attempt
    #[serde(default = "default_load_timeout")]
    pub load_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetrySection,

    /// Replaces the built-in group to role table when present
    #[serde(default)]
    pub group_roles: Option<BTreeMap<String, Vec<String>>>,

    #[serde(default)]
    pub mock_user: MockUserSection,

    /// Extra `name = "version"` pairs exposed in the shared scope
    #[serde(default)]
    pub shared_libraries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockUserSection {
    #[serde(default = "default_mock_sub")]
    pub sub: String,
    #[serde(default = "default_mock_name")]
    pub name: String,
    #[serde(default = "default_mock_email")]
    pub email: String,
    #[serde(default = "default_mock_groups")]
    pub groups: Vec<String>,
    #[serde(default = "default_mock_ttl")]
    pub ttl_secs: i64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl Default for MockUserSection {
    fn default() -> Self {
        Self {
            sub: default_mock_sub(),
            name: default_mock_name(),
            email: default_mock_email(),
            groups: default_mock_groups(),
            ttl_secs: default_mock_ttl(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: default_host_name(),
            mode: Mode::default(),
            manifest_url: default_manifest_url(),
            manifest_timeout_ms: default_manifest_timeout(),
            use_mock_auth: false,
            static_dev_locations: BTreeMap::new(),
            load_timeout_ms: default_load_timeout(),
            retry: RetrySection::default(),
            group_roles: None,
            mock_user: MockUserSection::default(),
            shared_libraries: BTreeMap::new(),
        }
    }
}

// Default value functions
fn default_host_name() -> String { "shell".to_string() }
fn default_manifest_url() -> String { "http://localhost:8080/manifest.json".to_string() }
fn default_manifest_timeout() -> u64 { 10_000 }
fn default_load_timeout() -> u64 { 30_000 }
fn default_max_attempts() -> u32 { 3 }
fn default_backoff() -> u64 { 250 }
fn default_max_backoff() -> u64 { 5_000 }
fn default_mock_sub() -> String { "dev-user".to_string() }
fn default_mock_name() -> String { "Local Developer".to_string() }
fn default_mock_email() -> String { "dev@localhost".to_string() }
fn default_mock_groups() -> Vec<String> { vec!["platform-admins".to_string()] }
fn default_mock_ttl() -> i64 { 8 * 60 * 60 }

impl HostConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration file {:?}", path.as_ref()))?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration file")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Host name cannot be empty");
        }

        match self.mode {
            Mode::Production => {
                if !(self.manifest_url.starts_with("http://")
                    || self.manifest_url.starts_with("https://"))
                {
                    anyhow::bail!(
                        "manifest_url must be an http(s) URL in production mode, got '{}'",
                        self.manifest_url
                    );
                }
            }
            Mode::Development => {
                if self.static_dev_locations.is_empty() {
                    anyhow::bail!("Development mode requires at least one static_dev_locations entry");
                }
            }
        }

        if let Some((name, _)) = self
            .static_dev_locations
            .iter()
            .find(|(_, location)| location.trim().is_empty())
        {
            anyhow::bail!("static_dev_locations entry '{}' has an empty location", name);
        }

        if self.load_timeout_ms == 0 {
            anyhow::bail!("load_timeout_ms must be greater than zero");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        if self.retry.max_backoff_ms < self.retry.backoff_ms {
            anyhow::bail!("retry.max_backoff_ms must not be below retry.backoff_ms");
        }

        if self.use_mock_auth && self.mock_user.ttl_secs <= 0 {
            anyhow::bail!("mock_user.ttl_secs must be positive");
        }

        self.group_role_mapping()?;

        Ok(())
    }

    /// Group to role table, configured or built-in
    pub fn group_role_mapping(&self) -> Result<GroupRoleMapping> {
        match &self.group_roles {
            Some(table) => GroupRoleMapping::from_pairs(table.clone())
                .context("Invalid group_roles table"),
            None => Ok(GroupRoleMapping::default()),
        }
    }

    pub fn loader_mode(&self) -> LoaderMode {
        match self.mode {
            Mode::Production => LoaderMode::Manifest,
            Mode::Development => LoaderMode::development(self.static_dev_locations.clone()),
        }
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }

    /// Claims template for the mock identity provider
    pub fn mock_claims(&self) -> Claims {
        let user = &self.mock_user;
        user.groups
            .iter()
            .fold(
                Claims::new(user.sub.clone(), 0)
                    .with_name(user.name.clone())
                    .with_email(user.email.clone()),
                |claims, group| claims.with_group(group.clone()),
            )
    }

    pub fn mock_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.mock_user.ttl_secs)
    }
}
