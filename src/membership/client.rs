//! Discord guild API lookups (member roles, member count)

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::app::DiscordConfig;
use crate::error::{AppError, Result};

const DISCORD_API: &str = "https://discord.com/api";

/// Guild member record from `GET /guilds/{guild}/members/{user}`; only the
/// role IDs are kept
#[derive(Debug, Clone, Deserialize)]
pub struct GuildMember {
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GuildWithCounts {
    #[serde(default)]
    approximate_member_count: Option<u64>,
}

/// Lookups against the target guild. Failures never surface: every method
/// degrades to `None` and logs.
#[async_trait]
pub trait GuildApi: Send + Sync {
    /// Member record for a user, `None` if unknown or on any failure
    async fn fetch_member(&self, user_id: &str) -> Option<GuildMember>;

    /// Approximate member count of the guild, `None` on any failure
    async fn fetch_member_count(&self) -> Option<u64>;
}

/// `GuildApi` backed by the Discord REST API and a bot token
pub struct DiscordGuildApi {
    http_client: reqwest::Client,
    guild_id: String,
    bot_token: String,
    timeout: Duration,
    base_url: String,
}

impl DiscordGuildApi {
    pub fn new(http_client: reqwest::Client, config: &DiscordConfig, timeout: Duration) -> Self {
        Self {
            http_client,
            guild_id: config.guild_id.clone(),
            bot_token: config.bot_token.clone(),
            timeout,
            base_url: DISCORD_API.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream {
                endpoint: url,
                status: response.status().as_u16(),
            });
        }

        Ok(response.json::<T>().await?)
    }

    async fn get_member(&self, user_id: &str) -> Result<GuildMember> {
        let url = format!(
            "{}/guilds/{}/members/{}",
            self.base_url,
            self.guild_id,
            urlencoding::encode(user_id)
        );
        self.get_json(url).await
    }

    async fn get_member_count(&self) -> Result<u64> {
        let url = format!("{}/guilds/{}?with_counts=true", self.base_url, self.guild_id);
        let guild: GuildWithCounts = self.get_json(url).await?;
        guild
            .approximate_member_count
            .ok_or_else(|| AppError::Internal {
                message: "guild response carried no approximate_member_count".to_string(),
            })
    }
}

#[async_trait]
impl GuildApi for DiscordGuildApi {
    async fn fetch_member(&self, user_id: &str) -> Option<GuildMember> {
        match self.get_member(user_id).await {
            Ok(member) => {
                debug!("Fetched {} roles for member {}", member.roles.len(), user_id);
                Some(member)
            }
            Err(e) => {
                warn!("Error fetching member {}: {}", user_id, e);
                None
            }
        }
    }

    async fn fetch_member_count(&self) -> Option<u64> {
        match self.get_member_count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Error fetching member count for guild {}: {}", self.guild_id, e);
                None
            }
        }
    }
}
