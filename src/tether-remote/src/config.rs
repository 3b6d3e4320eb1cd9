//! Configuration profiles.
//!
//! Replaces host names and key paths hard-coded into wrapper scripts with one
//! explicit TOML file:
//!
//! ```toml
//! [defaults]
//! timeout_secs = 30
//! connect_timeout_secs = 10
//!
//! [hosts.devbox]
//! host = "10.0.0.5"
//! user = "deploy"
//! identity_file = "~/.ssh/id_ed25519"
//! utf8 = true
//!
//! [backup]
//! repo = "~/notes"
//! push = true
//!
//! [retry]
//! max_attempts = 3
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::retry::RetryPolicy;
use super::target::{DEFAULT_CONNECT_TIMEOUT, SshTarget};
use super::{RemoteError, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TETHER_CONFIG";

/// Directory under the platform config dir.
pub const CONFIG_DIR: &str = "tether";

/// Config file name.
pub const CONFIG_FILE: &str = "config.toml";

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default per-step timeout for backups; pushes can be slow.
pub const DEFAULT_BACKUP_TIMEOUT_SECS: u64 = 120;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicitly requested file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// File could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema.
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub defaults: Defaults,

    /// Named host profiles.
    #[serde(default)]
    pub hosts: BTreeMap<String, HostProfile>,

    #[serde(default)]
    pub backup: BackupSettings,

    /// Retry policy for ssh and scp timeouts.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Values used when a profile or flag does not say otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// SIGTERM-to-SIGKILL grace on timeout; unset kills immediately.
    #[serde(default)]
    pub kill_grace_ms: Option<u64>,

    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,

    #[serde(default = "default_scp_program")]
    pub scp_program: String,

    #[serde(default = "default_git_program")]
    pub git_program: String,
}

/// One `[hosts.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostProfile {
    pub host: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Private key; `~/` is expanded.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Overrides `defaults.timeout_secs` for this host.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Extra `-o` options.
    #[serde(default)]
    pub options: Vec<String>,

    /// Force a UTF-8 locale for remote commands.
    #[serde(default)]
    pub utf8: bool,
}

/// The `[backup]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSettings {
    #[serde(default)]
    pub repo: Option<PathBuf>,

    #[serde(default)]
    pub remote: Option<String>,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default = "default_message_prefix")]
    pub message_prefix: String,

    #[serde(default)]
    pub push: bool,

    #[serde(default = "default_backup_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_scp_program() -> String {
    "scp".to_string()
}

fn default_git_program() -> String {
    "git".to_string()
}

fn default_message_prefix() -> String {
    "Auto backup".to_string()
}

fn default_backup_timeout_secs() -> u64 {
    DEFAULT_BACKUP_TIMEOUT_SECS
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            kill_grace_ms: None,
            ssh_program: default_ssh_program(),
            scp_program: default_scp_program(),
            git_program: default_git_program(),
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            repo: None,
            remote: None,
            branch: None,
            message_prefix: default_message_prefix(),
            push: false,
            timeout_secs: default_backup_timeout_secs(),
        }
    }
}

impl Defaults {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_grace(&self) -> Option<Duration> {
        self.kill_grace_ms.map(Duration::from_millis)
    }
}

impl BackupSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Repository path with `~/` expanded.
    pub fn repo_path(&self) -> Option<PathBuf> {
        self.repo.as_deref().map(expand_home)
    }
}

/// A host name resolved against the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    /// Profile name, if the host came from `[hosts.*]`.
    pub profile: Option<String>,
    pub target: SshTarget,
    pub timeout: Duration,
    pub utf8: bool,
}

impl RemoteConfig {
    /// Load from the first location that applies:
    /// `explicit` (must exist), `$TETHER_CONFIG` (must exist), then
    /// `<config dir>/tether/config.toml` (optional).
    pub fn load(explicit: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let env_value = std::env::var_os(CONFIG_ENV);
        match Self::locate(explicit, env_value) {
            Some((path, true)) => Self::load_file(&path),
            Some((path, false)) if path.exists() => Self::load_file(&path),
            Some((path, false)) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Pick the config path; the flag says whether the file is required.
    pub fn locate(explicit: Option<&Path>, env_value: Option<OsString>) -> Option<(PathBuf, bool)> {
        if let Some(path) = explicit {
            return Some((path.to_path_buf(), true));
        }
        if let Some(value) = env_value.filter(|v| !v.is_empty()) {
            return Some((PathBuf::from(value), true));
        }
        dirs::config_dir().map(|dir| (dir.join(CONFIG_DIR).join(CONFIG_FILE), false))
    }

    /// Read and parse one file.
    pub fn load_file(path: &Path) -> std::result::Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let config = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), hosts = config.hosts.len(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Resolve a profile name, or failing that an ad-hoc `[user@]host[:port]`.
    pub fn resolve_target(&self, name: &str) -> Result<ResolvedHost> {
        let connect_timeout = Duration::from_secs(self.defaults.connect_timeout_secs);

        if let Some(profile) = self.hosts.get(name) {
            if profile.host.trim().is_empty() {
                return Err(RemoteError::InvalidTarget(format!(
                    "profile '{name}' has no host"
                )));
            }
            let target = SshTarget {
                host: profile.host.clone(),
                user: profile.user.clone(),
                port: profile.port,
                identity_file: profile.identity_file.as_deref().map(expand_home),
                options: profile.options.clone(),
                connect_timeout,
            };
            return Ok(ResolvedHost {
                profile: Some(name.to_string()),
                target,
                timeout: profile
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.defaults.timeout()),
                utf8: profile.utf8,
            });
        }

        let mut target = SshTarget::parse(name)?;
        target.connect_timeout = connect_timeout;
        Ok(ResolvedHost {
            profile: None,
            target,
            timeout: self.defaults.timeout(),
            utf8: false,
        })
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[defaults]
timeout_secs = 45
kill_grace_ms = 500

[hosts.devbox]
host = "10.0.0.5"
user = "deploy"
port = 2222
identity_file = "/keys/devbox"
options = ["ProxyJump=bastion"]
utf8 = true

[hosts.quick]
host = "quick.example.com"
timeout_secs = 5

[backup]
repo = "/srv/notes"
push = true

[retry]
max_attempts = 3
backoff_ms = 250
"#;

    #[test]
    fn test_default_config() {
        let config = RemoteConfig::default();
        assert_eq!(config.defaults.timeout(), Duration::from_secs(30));
        assert_eq!(config.defaults.ssh_program, "ssh");
        assert!(config.defaults.kill_grace().is_none());
        assert_eq!(config.backup.message_prefix, "Auto backup");
        assert!(!config.backup.push);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_parse_sample() {
        let config = RemoteConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.defaults.timeout_secs, 45);
        assert_eq!(config.defaults.connect_timeout_secs, 10);
        assert_eq!(config.defaults.kill_grace(), Some(Duration::from_millis(500)));
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.backup.repo_path(), Some(PathBuf::from("/srv/notes")));
        assert!(config.backup.push);
        assert_eq!(config.backup.timeout(), Duration::from_secs(120));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_duration(), Duration::from_millis(250));
        assert_eq!(config.retry.timeout_factor, 2.0);
    }

    #[test]
    fn test_resolve_profile() {
        let config = RemoteConfig::from_toml_str(SAMPLE).unwrap();

        let devbox = config.resolve_target("devbox").unwrap();
        assert_eq!(devbox.profile.as_deref(), Some("devbox"));
        assert_eq!(devbox.target.destination(), "deploy@10.0.0.5");
        assert_eq!(devbox.target.port, Some(2222));
        assert_eq!(devbox.target.options, vec!["ProxyJump=bastion".to_string()]);
        assert_eq!(devbox.timeout, Duration::from_secs(45));
        assert!(devbox.utf8);

        let quick = config.resolve_target("quick").unwrap();
        assert_eq!(quick.timeout, Duration::from_secs(5));
        assert!(!quick.utf8);
    }

    #[test]
    fn test_resolve_ad_hoc_target() {
        let config = RemoteConfig::default();
        let resolved = config.resolve_target("ops@db1:2200").unwrap();

        assert_eq!(resolved.profile, None);
        assert_eq!(resolved.target.destination(), "ops@db1");
        assert_eq!(resolved.timeout, Duration::from_secs(30));

        assert!(config.resolve_target("bad host").is_err());
    }

    #[test]
    fn test_locate_precedence() {
        let explicit = Path::new("/etc/tether.toml");
        assert_eq!(
            RemoteConfig::locate(Some(explicit), Some("/from/env.toml".into())),
            Some((explicit.to_path_buf(), true))
        );
        assert_eq!(
            RemoteConfig::locate(None, Some("/from/env.toml".into())),
            Some((PathBuf::from("/from/env.toml"), true))
        );
        if let Some((path, required)) = RemoteConfig::locate(None, Some(OsString::new())) {
            assert!(path.ends_with("tether/config.toml"));
            assert!(!required);
        }
    }

    #[test]
    fn test_load_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            RemoteConfig::load_file(&missing),
            Err(ConfigError::NotFound(_))
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[hosts.x]\nport = \"nope\"\n").unwrap();
        assert!(matches!(
            RemoteConfig::load_file(&broken),
            Err(ConfigError::Parse { .. })
        ));

        let good = dir.path().join("good.toml");
        std::fs::write(&good, SAMPLE).unwrap();
        assert_eq!(
            RemoteConfig::load(Some(&good)).unwrap().defaults.timeout_secs,
            45
        );
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(Path::new("/abs/key")), PathBuf::from("/abs/key"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/.ssh/id")), home.join(".ssh/id"));
        }
    }
}
