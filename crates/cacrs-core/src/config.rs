//! Configuration types and loading for cacrs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::error::Result;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which repository backend to use.
    pub store: StoreKind,

    /// Path to the SQLite database (only used with `store = "sqlite"`).
    pub database: PathBuf,

    /// Load the demo dataset into an empty store.
    pub seed_demo_data: bool,

    /// Artificial delay applied to every in-memory store call, in milliseconds.
    pub simulated_latency_ms: u64,

    /// Generative AI provider configuration.
    pub ai: AiConfig,

    /// Identity verification and admin bootstrap.
    pub auth: AuthConfig,

    /// HTTP server configuration.
    pub server: ServerConfig,

    /// Third-party services registry settings.
    pub services: ServicesConfig,

    /// Onboarding tour persistence.
    pub onboarding: OnboardingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_NAME);

        Self {
            store: StoreKind::Memory,
            database: data_dir.join("cacrs.db"),
            seed_demo_data: true,
            simulated_latency_ms: 0,
            ai: AiConfig::default(),
            auth: AuthConfig::default(),
            server: ServerConfig::default(),
            services: ServicesConfig::default(),
            onboarding: OnboardingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            let mut config = Self::default();
            config.expand_paths();
            Ok(config)
        }
    }

    /// Load configuration from a specific file, then apply `CACRS_*`
    /// environment overrides (`CACRS_AI__CHAT_MODEL` sets `ai.chat_model`).
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let layered = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(&crate::env_prefix())
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_emails"),
            )
            .build()?;
        let mut config: Config = layered
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.expand_paths();
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_NAME)
            .join("config.toml")
    }

    /// Save configuration to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Ensure config exists at the given path, creating defaults if missing.
    pub fn ensure_at(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            let mut config = Self::default();
            config.expand_paths();
            config.save_to_path(path)?;
            Ok(config)
        }
    }

    /// Expand a path, replacing ~ with home directory.
    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::full(path)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| path.to_string());
        PathBuf::from(expanded)
    }

    fn expand_paths(&mut self) {
        self.database = Self::expand_path(&self.database.to_string_lossy());
        self.onboarding.state_path = self
            .onboarding
            .state_path
            .as_ref()
            .map(|p| Self::expand_path(&p.to_string_lossy()));
        self.auth.public_key_path = self
            .auth
            .public_key_path
            .as_ref()
            .map(|p| Self::expand_path(&p.to_string_lossy()));
    }

    /// Whether the given email is bootstrapped as an administrator.
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.auth
            .admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email.trim()))
    }
}

/// Repository backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Sqlite,
}

/// Which generative AI implementation to talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderKind {
    Gemini,
    Offline,
}

/// Generative AI provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: AiProviderKind,

    /// Base URL of the Generative Language API.
    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Model used for chat streaming and report generation.
    pub chat_model: String,

    /// Model used for image analysis and grounded web search.
    pub fast_model: String,

    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProviderKind::Gemini,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            chat_model: "gemini-2.5-pro".to_string(),
            fast_model: "gemini-2.5-flash".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl AiConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Identity token verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Emails that receive the admin role on first sign-in.
    pub admin_emails: Vec<String>,

    /// Environment variable holding the HS256 verification secret.
    pub secret_env: String,

    /// RS256 public key (PEM). Takes precedence over the shared secret.
    pub public_key_path: Option<PathBuf>,

    /// Expected `aud` claim, if any.
    pub audience: Option<String>,

    /// Expected `iss` claim, if any.
    pub issuer: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_emails: vec!["admin@cacrs.gouv.fr".to_string()],
            secret_env: "CACRS_IDENTITY_SECRET".to_string(),
            public_key_path: None,
            audience: None,
            issuer: None,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Services registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Prefix prepended to secret names to form secret manager paths.
    pub secret_manager_base_path: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            secret_manager_base_path: "projects/cacrs/secrets".to_string(),
        }
    }
}

/// Onboarding tour settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingConfig {
    /// Where tour completion is persisted. Defaults to the state directory.
    pub state_path: Option<PathBuf>,
}

impl OnboardingConfig {
    pub fn resolved_state_path(&self) -> PathBuf {
        self.state_path
            .clone()
            .unwrap_or_else(crate::paths::onboarding_state_path)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
