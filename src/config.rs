//! Runtime configuration
//!
//! Settings for the GeoServer protocol services, the project backend and the
//! sync engine. Everything can be built in code; [`AppConfig::from_env`]
//! reads the process environment (after loading `.env` via dotenvy).

use std::time::Duration;

use anyhow::{Context, Result};

use crate::sync::RollbackPolicy;

/// Basic-auth credentials for protocol services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Connection settings shared by the WMS, WFS and MVT adapters
#[derive(Debug, Clone)]
pub struct GeoServerConfig {
    /// Service root, e.g. `https://maps.example.org/geoserver`
    pub base_url: String,
    /// Workspace prefix applied to unqualified layer names
    pub workspace: Option<String>,
    pub credentials: Option<Credentials>,
    /// Per-call timeout; each adapter has its own default when unset
    pub timeout: Option<Duration>,
}

impl GeoServerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            workspace: None,
            credentials: None,
            timeout: None,
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Base URL without a trailing slash
    pub fn root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("GEOSERVER_URL")
            .context("GEOSERVER_URL environment variable not set")?;

        let mut config = Self::new(base_url);
        config.workspace = non_empty_var("GEOSERVER_WORKSPACE");
        if let (Some(user), Some(pass)) = (
            non_empty_var("GEOSERVER_USERNAME"),
            non_empty_var("GEOSERVER_PASSWORD"),
        ) {
            config.credentials = Some(Credentials::new(user, pass));
        }
        config.timeout = std::env::var("GEOSERVER_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis);
        Ok(config)
    }
}

/// Project backend (QGIS/PostGIS service) settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Sent as `Authorization: Token <token>`
    pub token: Option<String>,
    pub timeout: Duration,
}

impl BackendConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("BACKEND_URL").context("BACKEND_URL environment variable not set")?;
        let timeout = std::env::var("BACKEND_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Self::DEFAULT_TIMEOUT);

        Ok(Self {
            base_url,
            token: non_empty_var("BACKEND_TOKEN"),
            timeout,
        })
    }
}

/// Sync engine settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Project name sent with every backend call
    pub project: String,
    pub rollback_policy: RollbackPolicy,
    /// Completed operations kept in the journal
    pub journal_capacity: usize,
}

impl SyncConfig {
    pub const DEFAULT_JOURNAL_CAPACITY: usize = 100;

    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            rollback_policy: RollbackPolicy::default(),
            journal_capacity: Self::DEFAULT_JOURNAL_CAPACITY,
        }
    }

    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }
}

/// Everything the CLI needs, read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub geoserver: GeoServerConfig,
    pub backend: Option<BackendConfig>,
    pub sync: Option<SyncConfig>,
}

impl AppConfig {
    /// Load `.env` (if present) and read all settings
    ///
    /// The backend and sync sections are optional: they are only built when
    /// `BACKEND_URL` and `GEOLAYERS_PROJECT` are set.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let geoserver = GeoServerConfig::from_env()?;
        let backend = match std::env::var("BACKEND_URL") {
            Ok(_) => Some(BackendConfig::from_env()?),
            Err(_) => None,
        };

        let sync = match non_empty_var("GEOLAYERS_PROJECT") {
            Some(project) => {
                let mut sync = SyncConfig::new(project);
                if let Some(policy) = non_empty_var("GEOLAYERS_ROLLBACK") {
                    sync.rollback_policy = policy
                        .parse()
                        .with_context(|| format!("Invalid GEOLAYERS_ROLLBACK value '{}'", policy))?;
                }
                Some(sync)
            }
            None => None,
        };

        Ok(Self {
            geoserver,
            backend,
            sync,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
