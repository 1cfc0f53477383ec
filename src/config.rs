use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing {0} environment variable")]
    Missing(&'static str),
    #[error("invalid {0}: {1}")]
    Invalid(&'static str, String),
}

/// Which backend holds the server's mods folder.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local {
        mods_dir: String,
    },
    Sftp {
        host: String,
        port: u16,
        username: String,
        password: String,
        mods_dir: String,
    },
    Github {
        owner: String,
        repo: String,
        path: String,
        token: String,
    },
}

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub base_url: String,
    pub server_id: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct RconConfig {
    pub address: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub storage: StorageConfig,
    /// Channel that receives approval requests for unlisted mods.
    pub mod_channel_id: u64,
    pub allowed_mods: Vec<String>,
    pub cooldown: Duration,
    pub case_sensitive_allowlist: bool,
    /// Pending approvals older than this are swept; unset means they never expire.
    pub approval_ttl: Option<Duration>,
    pub history_path: String,
    pub panel: Option<PanelConfig>,
    pub rcon: Option<RconConfig>,
    pub modpack_url: Option<String>,
    pub restart_after_change: bool,
}

impl Config {
    /// Read the full configuration from the environment. `dotenvy` is
    /// expected to have run already.
    pub fn from_env() -> Result<Self, ConfigError> {
        let discord_token = required("DISCORD_TOKEN")?;

        let storage = match env::var("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "local" => StorageConfig::Local {
                mods_dir: env::var("MODS_PATH").unwrap_or_else(|_| "mods".to_string()),
            },
            "sftp" => StorageConfig::Sftp {
                host: required("SFTP_HOST")?,
                port: optional_parsed("SFTP_PORT", 22)?,
                username: required("SFTP_USER")?,
                password: required("SFTP_PASS")?,
                mods_dir: env::var("MODS_PATH").unwrap_or_else(|_| "mods".to_string()),
            },
            "github" => StorageConfig::Github {
                owner: required("GITHUB_OWNER")?,
                repo: required("GITHUB_REPO")?,
                path: env::var("GITHUB_PATH").unwrap_or_else(|_| "mods".to_string()),
                token: required("GITHUB_TOKEN")?,
            },
            other => {
                return Err(ConfigError::Invalid(
                    "STORAGE_BACKEND",
                    format!("unknown backend '{}', expected local, sftp or github", other),
                ))
            }
        };

        let mod_channel_id = required("MOD_CHANNEL_ID")?
            .parse::<u64>()
            .map_err(|e| ConfigError::Invalid("MOD_CHANNEL_ID", e.to_string()))?;

        let panel = match env::var("PTERO_PANEL_URL") {
            Ok(base_url) => Some(PanelConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                server_id: required("PTERO_SERVER_ID")?,
                api_key: required("PTERO_API_KEY")?,
            }),
            Err(_) => None,
        };

        let rcon = match env::var("RCON_ADDR") {
            Ok(address) => Some(RconConfig {
                address,
                password: required("RCON_PASS")?,
            }),
            Err(_) => None,
        };

        Ok(Self {
            discord_token,
            storage,
            mod_channel_id,
            allowed_mods: parse_allow_list(env::var("ALLOWED_MODS").ok().as_deref()),
            cooldown: Duration::from_secs(optional_parsed("COOLDOWN_SECS", 300)?),
            case_sensitive_allowlist: parse_bool(
                env::var("ALLOWLIST_CASE_SENSITIVE").ok().as_deref(),
            ),
            approval_ttl: match env::var("APPROVAL_TTL_SECS") {
                Ok(v) => Some(Duration::from_secs(v.parse::<u64>().map_err(|e| {
                    ConfigError::Invalid("APPROVAL_TTL_SECS", e.to_string())
                })?)),
                Err(_) => None,
            },
            history_path: env::var("HISTORY_PATH")
                .unwrap_or_else(|_| "data/history.json".to_string()),
            panel,
            rcon,
            modpack_url: env::var("MODPACK_URL").ok(),
            restart_after_change: env::var("RESTART_AFTER_CHANGE")
                .ok()
                .as_deref()
                .map(|v| parse_bool(Some(v)))
                .unwrap_or(true),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional_parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Comma-separated keyword list; falls back to the stock curation set.
fn parse_allow_list(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => vec![
            "examplemod".to_string(),
            "forge".to_string(),
            "fabric".to_string(),
        ],
    }
}

fn parse_bool(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}
