//! Application configuration sourced from the environment

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use super::roles::{PriorityTier, RoleConfig, TierTable};
use crate::error::{AppError, Result};

/// Discord OAuth client settings
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

/// Discord bot access to the target guild
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub guild_id: String,
    pub bot_token: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl: Duration,
}

/// Document store location
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_path: PathBuf,
    pub database_name: String,
}

impl StorageConfig {
    /// Directory holding all collections of the configured database
    pub fn database_dir(&self) -> PathBuf {
        self.data_path.join(&self.database_name)
    }

    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.database_dir().join(format!("{}.json", collection))
    }
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Full application configuration, constructed once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub oauth: OAuthConfig,
    pub discord: DiscordConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub roles: RoleConfig,
    /// The single Discord user ID allowed into the admin panel
    pub admin_id: String,
    /// Game server `host:port`
    pub game_server_addr: Option<String>,
    pub webhook_url: Option<String>,
    pub port: u16,
    /// Timeout applied to every outbound Discord/webhook call
    pub http_timeout: Duration,
    pub tls: Option<TlsConfig>,
}

impl AppConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| {
            optional(key).ok_or_else(|| AppError::ConfigMissing {
                key: key.to_string(),
            })
        };

        let oauth = OAuthConfig {
            client_id: required("DISCORD_CLIENT_ID")?,
            client_secret: required("DISCORD_CLIENT_SECRET")?,
            callback_url: optional("DISCORD_CALLBACK_URL")
                .unwrap_or_else(|| "http://localhost:3000/auth/discord/callback".to_string()),
        };

        let bot_token = optional("DISCORD_BOT_TOKEN")
            .or_else(|| optional("BOT_TOKEN"))
            .ok_or_else(|| AppError::ConfigMissing {
                key: "DISCORD_BOT_TOKEN".to_string(),
            })?;
        let discord = DiscordConfig {
            guild_id: required("TARGET_GUILD_ID")?,
            bot_token,
        };

        let secret = required("SESSION_SECRET")?;
        if secret.len() < 32 {
            warn!("SESSION_SECRET is shorter than 32 bytes; use a longer random value");
        }
        let ttl_hours = parse_or(&optional, "SESSION_TTL_HOURS", 24u64)?;
        let session = SessionConfig {
            secret,
            ttl: Duration::from_secs(session_ttl_secs(ttl_hours)?),
        };

        let storage = StorageConfig {
            data_path: optional("DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            database_name: optional("DATABASE_NAME").unwrap_or_else(|| "community".to_string()),
        };

        let tiers = TierTable::new(
            PriorityTier::ALL
                .iter()
                .map(|tier| (*tier, optional(tier.env_key()).unwrap_or_default())),
        );
        let roles = RoleConfig::new(optional("WHITELIST_ROLE_ID").unwrap_or_default(), tiers);
        if roles.whitelist_role_id.is_empty() {
            warn!("WHITELIST_ROLE_ID not set; no member will be shown as whitelisted");
        }
        if roles.tiers.is_empty() {
            warn!("No QUEUE_PRIORITY_*_ID set; no member will be shown with queue priority");
        }

        let tls = match (optional("TLS_CERT_PATH"), optional("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::ConfigInvalid {
                    key: "TLS_CERT_PATH/TLS_KEY_PATH".to_string(),
                    message: "both must be set to enable HTTPS".to_string(),
                })
            }
        };

        Ok(Self {
            oauth,
            discord,
            session,
            storage,
            roles,
            admin_id: required("ADMIN_DISCORD_ID")?,
            game_server_addr: optional("FIVEM_SERVER_IP"),
            webhook_url: optional("WEBHOOK_URL"),
            port: parse_or(&optional, "PORT", 3000u16)?,
            http_timeout: Duration::from_secs(parse_or(&optional, "HTTP_TIMEOUT_SECS", 5u64)?),
            tls,
        })
    }
}

fn session_ttl_secs(hours: u64) -> Result<u64> {
    hours
        .checked_mul(3600)
        .filter(|secs| *secs > 0)
        .ok_or_else(|| AppError::ConfigInvalid {
            key: "SESSION_TTL_HOURS".to_string(),
            message: format!("{} hours is out of range", hours),
        })
}

fn parse_or<T, F>(optional: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match optional(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| AppError::ConfigInvalid {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
