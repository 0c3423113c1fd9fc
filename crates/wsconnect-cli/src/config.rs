//! CLI configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/wsconnect/config.toml` by default:
//!
//! ```toml
//! [workspace]
//! customer_id = "C0123abcd"
//! admin_email = "admin@example.com"
//! credentials_file = "/etc/wsconnect/key.json"
//!
//! [feed]
//! lag_window_secs = 3600
//! page_size = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wsconnect_google::{ConnectorConfig, CredentialSource};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Tenant and credentials.
    pub workspace: WorkspaceSettings,

    /// Feed tuning.
    pub feed: FeedSettings,

    /// Logging settings.
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    pub customer_id: Option<String>,
    pub domain: Option<String>,
    pub admin_email: Option<String>,
    /// Path to the service account key file.
    pub credentials_file: Option<PathBuf>,
    /// The key JSON itself, used when no file is set.
    #[serde(skip_serializing)]
    pub credentials_json: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// How far back a cursor-less poll starts, in seconds.
    pub lag_window_secs: Option<u64>,
    /// Default page size.
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty`, `compact` or `json`.
    pub format: Option<String>,
    /// Filter directive, in `RUST_LOG` syntax.
    pub filter: Option<String>,
}

impl CliConfig {
    /// Loads configuration from the default path, if it exists.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| CliError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wsconnect")
            .join("config.toml")
    }

    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        let workspace = &mut self.workspace;
        if let Some(ref customer_id) = cli.customer_id {
            workspace.customer_id = Some(customer_id.clone());
        }
        if let Some(ref domain) = cli.domain {
            workspace.domain = Some(domain.clone());
        }
        if let Some(ref admin_email) = cli.admin_email {
            workspace.admin_email = Some(admin_email.clone());
        }
        if let Some(ref path) = cli.credentials_file {
            workspace.credentials_file = Some(path.clone());
        }
        if let Some(ref format) = cli.log_format {
            self.logging.format = Some(format.clone());
        }
    }

    /// Builds the connector configuration.
    pub fn to_connector_config(&self) -> CliResult<ConnectorConfig> {
        let workspace = &self.workspace;
        let admin_email = workspace.admin_email.clone().ok_or_else(|| {
            CliError::Config(format!(
                "admin_email is missing. Add to {}:\n  \
                 [workspace]\n  \
                 admin_email = \"admin@example.com\"",
                Self::default_path().display()
            ))
        })?;

        let credentials = match (&workspace.credentials_file, &workspace.credentials_json) {
            (Some(path), _) => CredentialSource::file(path),
            (None, Some(json)) => CredentialSource::inline(json),
            (None, None) => {
                return Err(CliError::Config(
                    "credentials_file or credentials_json is required in [workspace]".to_string(),
                ));
            }
        };

        let mut config = ConnectorConfig::new(admin_email, credentials);
        if let Some(ref customer_id) = workspace.customer_id {
            config = config.with_customer_id(customer_id);
        }
        if let Some(ref domain) = workspace.domain {
            config = config.with_domain(domain);
        }
        if let Some(secs) = workspace.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(ref user_agent) = workspace.user_agent {
            config = config.with_user_agent(user_agent);
        }
        if let Some(secs) = self.feed.lag_window_secs {
            config = config.with_lag_window(Duration::from_secs(secs));
        }
        if let Some(page_size) = self.feed.page_size {
            config = config.with_page_size(page_size);
        }

        config.validate().map_err(CliError::Config)?;
        Ok(config)
    }
}
