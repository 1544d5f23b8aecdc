//! Discord OAuth2 handshake and profile mapping

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::app::OAuthConfig;
use crate::error::{AppError, Result};
use crate::models::{GuildSummary, Identity};

const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
const TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
const USER_URL: &str = "https://discord.com/api/users/@me";
const USER_GUILDS_URL: &str = "https://discord.com/api/users/@me/guilds";
const SCOPES: &str = "identify guilds email";

/// Identity provider used by the login routes
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL to send the browser to, carrying `state` for CSRF protection
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the user's identity
    async fn exchange_code(&self, code: &str) -> Result<Identity>;
}

/// Discord OAuth token response
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Discord user info from /users/@me
#[derive(Deserialize, Debug)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Build the session identity from the provider's responses
pub fn identity_from_profile(
    user: DiscordUser,
    guilds: Vec<GuildSummary>,
    access_token: Option<String>,
) -> Result<Identity> {
    if user.id.is_empty() || !user.id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::OAuth {
            message: format!("unexpected Discord user id '{}'", user.id),
        });
    }

    let display_name = user
        .global_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| user.username.clone());

    Ok(Identity {
        id: user.id,
        username: user.username,
        display_name,
        avatar: user.avatar,
        guilds,
        access_token,
    })
}

/// Discord as identity provider
pub struct DiscordOAuth {
    client_id: String,
    client_secret: String,
    callback_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl DiscordOAuth {
    pub fn new(config: &OAuthConfig, http_client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            callback_url: config.callback_url.clone(),
            http_client,
            timeout,
        }
    }

    async fn get_with_token<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &TokenResponse,
    ) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .header(
                "Authorization",
                format!("{} {}", token.token_type, token.access_token),
            )
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream {
                endpoint: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| AppError::OAuth {
            message: format!("unexpected response shape from {}: {}", url, e),
        })
    }
}

#[async_trait]
impl IdentityProvider for DiscordOAuth {
    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            AUTHORIZE_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.callback_url),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<Identity> {
        let token_response = self
            .http_client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.callback_url.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        if !token_response.status().is_success() {
            let status = token_response.status().as_u16();
            let error_text = token_response.text().await.unwrap_or_default();
            debug!("Token exchange failed: {}", error_text);
            return Err(AppError::Upstream {
                endpoint: TOKEN_URL.to_string(),
                status,
            });
        }

        let token: TokenResponse = token_response.json().await.map_err(|e| AppError::OAuth {
            message: format!("failed to parse token response: {}", e),
        })?;

        let user: DiscordUser = self.get_with_token(USER_URL, &token).await?;
        let guilds: Vec<GuildSummary> = self.get_with_token(USER_GUILDS_URL, &token).await?;

        info!(
            "User authenticated: {} ({}), member of {} guilds",
            user.username,
            user.id,
            guilds.len()
        );

        identity_from_profile(user, guilds, Some(token.access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(json: &str) -> DiscordUser {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_identity_prefers_global_name() {
        let identity = identity_from_profile(
            user(r#"{"id": "123", "username": "jdoe", "global_name": "Jane", "avatar": "abc"}"#),
            vec![],
            Some("token".to_string()),
        )
        .unwrap();

        assert_eq!(identity.display_name, "Jane");
        assert_eq!(identity.username, "jdoe");
        assert_eq!(
            identity.avatar_url().as_deref(),
            Some("https://cdn.discordapp.com/avatars/123/abc.png")
        );
    }

    #[test]
    fn test_identity_falls_back_to_username() {
        let profile = user(r#"{"id": "123", "username": "jdoe"}"#);
        let identity = identity_from_profile(profile, vec![], None).unwrap();
        assert_eq!(identity.display_name, "jdoe");
    }

    #[test]
    fn test_identity_rejects_odd_ids() {
        let profile = user(r#"{"id": "../admin", "username": "x"}"#);
        let result = identity_from_profile(profile, vec![], None);
        assert!(matches!(result, Err(AppError::OAuth { .. })));
    }

    #[test]
    fn test_guild_list_parsing() {
        let guilds: Vec<GuildSummary> = serde_json::from_str(
            r#"[{"id": "1", "name": "Community", "icon": null, "owner": false,
                 "permissions": "0"}]"#,
        )
        .unwrap();
        assert_eq!(guilds[0].name, "Community");
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(serde_json::from_str::<DiscordUser>(r#"{"username": "x"}"#).is_err());
    }

    #[test]
    fn test_authorize_url_carries_state() {
        let oauth = DiscordOAuth::new(
            &OAuthConfig {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                callback_url: "http://localhost:3000/auth/discord/callback".to_string(),
            },
            reqwest::Client::new(),
            Duration::from_secs(5),
        );

        let url = oauth.authorize_url("xyz");
        assert!(url.starts_with("https://discord.com/oauth2/authorize?client_id=client"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fdiscord%2Fcallback"
        ));
        assert!(url.contains("scope=identify%20guilds%20email"));
        assert!(url.ends_with("&state=xyz"));
    }
}
