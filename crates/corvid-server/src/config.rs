//! Configuration system for the Corvid server.

use anyhow::Context;
use corvid_core::{Entity, SessionConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Corvid configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Listener and session limits
    #[serde(default)]
    pub server: ServerConfig,
    /// Authentication policy
    #[serde(default)]
    pub security: SecurityConfig,
    /// Static accounts
    #[serde(default)]
    pub accounts: AccountsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Domain this server is authoritative for
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Client-to-server listen address
    #[serde(default = "default_c2s_addr")]
    pub c2s_addr: String,
    /// Server-to-server listen address; unset disables federation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s2s_addr: Option<String>,
    /// Port dialled when verifying a peer's dialback key
    #[serde(default = "default_s2s_port")]
    pub s2s_port: u16,
    /// Maximum concurrent connections
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Seconds of silence before a connection is closed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Largest incomplete stanza accepted, in bytes
    #[serde(default = "default_max_stanza_size")]
    pub max_stanza_size: usize,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Refuse authentication on unencrypted streams
    #[serde(default)]
    pub tls_required: bool,
    /// Failed SASL attempts before the stream is closed
    #[serde(default = "default_sasl_max_retries")]
    pub sasl_max_retries: u32,
    /// Accept server dialback on s2s streams
    #[serde(default = "default_true")]
    pub dialback: bool,
    /// Allow in-band registration
    #[serde(default)]
    pub registration: bool,
}

/// Accounts served from the configuration file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountsConfig {
    /// Username and password pairs
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// One static account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    /// Local part of the address
    pub username: String,
    /// Plain-text password
    pub password: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_domain() -> String {
    "localhost".to_string()
}

fn default_c2s_addr() -> String {
    "0.0.0.0:5222".to_string()
}

fn default_s2s_port() -> u16 {
    5269
}

fn default_max_sessions() -> usize {
    1024
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_max_stanza_size() -> usize {
    corvid_xml::DEFAULT_MAX_PENDING
}

fn default_sasl_max_retries() -> u32 {
    corvid_core::sasl::DEFAULT_MAX_RETRIES
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            c2s_addr: default_c2s_addr(),
            s2s_addr: None,
            s2s_port: default_s2s_port(),
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout(),
            max_stanza_size: default_max_stanza_size(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            tls_required: false,
            sasl_max_retries: default_sasl_max_retries(),
            dialback: true,
            registration: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("corvid/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// The served domain as an entity
    ///
    /// # Errors
    ///
    /// Returns an error if the domain is not a valid address.
    pub fn domain(&self) -> anyhow::Result<Entity> {
        Entity::domain_only(&self.server.domain)
            .with_context(|| format!("invalid domain '{}'", self.server.domain))
    }

    /// Parse the client listen address
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn c2s_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .c2s_addr
            .parse()
            .with_context(|| format!("invalid c2s address '{}'", self.server.c2s_addr))
    }

    /// Parse the server listen address, if federation is enabled
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn s2s_addr(&self) -> anyhow::Result<Option<SocketAddr>> {
        self.server
            .s2s_addr
            .as_deref()
            .map(|addr| {
                addr.parse()
                    .with_context(|| format!("invalid s2s address '{addr}'"))
            })
            .transpose()
    }

    /// Idle timeout as a duration
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.server.idle_timeout_secs)
    }

    /// Session policy derived from this configuration
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tls_available: false,
            tls_required: self.security.tls_required,
            max_auth_retries: self.security.sasl_max_retries,
            max_pending_bytes: self.server.max_stanza_size,
            dialback_enabled: self.security.dialback && self.server.s2s_addr.is_some(),
            registration_enabled: self.security.registration,
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let domain = self.domain()?;
        self.c2s_addr()?;
        self.s2s_addr()?;

        if self.server.max_sessions == 0 {
            anyhow::bail!("max_sessions must be at least 1");
        }
        if self.server.idle_timeout_secs == 0 {
            anyhow::bail!("idle_timeout_secs must be at least 1");
        }
        if self.server.max_stanza_size < 1024 || self.server.max_stanza_size > 16 * 1024 * 1024 {
            anyhow::bail!("max_stanza_size must be between 1KB and 16MB");
        }
        if self.server.s2s_port == 0 {
            anyhow::bail!("s2s_port must not be 0");
        }
        if self.security.sasl_max_retries == 0 {
            anyhow::bail!("sasl_max_retries must be at least 1");
        }
        // No TLS transport is built in; requiring it would lock every client out
        if self.security.tls_required {
            anyhow::bail!("tls_required is set but this build has no TLS transport");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        for user in &self.accounts.users {
            Entity::new(Some(&user.username), domain.domain(), None)
                .with_context(|| format!("invalid username '{}'", user.username))?;
            if user.password.is_empty() {
                anyhow::bail!("account '{}' has an empty password", user.username);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.domain, "localhost");
        assert_eq!(config.server.c2s_addr, "0.0.0.0:5222");
        assert!(config.server.s2s_addr.is_none());
        assert_eq!(config.security.sasl_max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.server.domain = "bad@domain".to_string();
        assert!(config.validate().is_err());
        config.server.domain = "capulet.lit".to_string();

        config.server.max_stanza_size = 10;
        assert!(config.validate().is_err());
        config.server.max_stanza_size = default_max_stanza_size();

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "debug".to_string();

        config.accounts.users.push(UserEntry {
            username: "juliet".to_string(),
            password: String::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_config() {
        let mut config = Config::default();
        config.security.registration = true;
        let session = config.session_config();
        assert!(session.registration_enabled);
        assert!(!session.dialback_enabled);
        assert!(!session.tls_available);

        config.server.s2s_addr = Some("0.0.0.0:5269".to_string());
        assert!(config.session_config().dialback_enabled);
    }

    #[test]
    fn test_toml_parsing() {
        let config: Config = toml::from_str(
            r#"
            [server]
            domain = "capulet.lit"
            s2s_addr = "127.0.0.1:5269"

            [[accounts.users]]
            username = "juliet"
            password = "r0m30"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.domain, "capulet.lit");
        assert_eq!(config.server.c2s_addr, "0.0.0.0:5222");
        assert_eq!(config.accounts.users.len(), 1);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.server.domain = "montague.lit".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.domain, "montague.lit");
        assert_eq!(loaded.server.idle_timeout_secs, config.server.idle_timeout_secs);
    }
}
