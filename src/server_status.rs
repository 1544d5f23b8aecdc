//! FiveM game server status probe

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Live status of the game server, as shown on pages and `/server-status`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub online: bool,
    pub players: u32,
    pub max_players: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl ServerStatus {
    pub fn offline() -> Self {
        Self::default()
    }
}

/// Subset of the FiveM `/info.json` document
#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(default)]
    clients: Option<u32>,
    #[serde(default)]
    sv_maxclients: Option<u32>,
    #[serde(default)]
    hostname: Option<String>,
}

impl From<InfoJson> for ServerStatus {
    fn from(info: InfoJson) -> Self {
        Self {
            online: true,
            players: info.clients.unwrap_or(0),
            max_players: info.sv_maxclients.unwrap_or(0),
            hostname: Some(
                info.hostname
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| "FiveM Server".to_string()),
            ),
        }
    }
}

#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Current status; any failure reports the server as offline
    async fn check(&self) -> ServerStatus;
}

pub struct FivemStatusProbe {
    http_client: reqwest::Client,
    addr: Option<String>,
}

impl FivemStatusProbe {
    pub fn new(http_client: reqwest::Client, addr: Option<String>) -> Self {
        Self { http_client, addr }
    }

    async fn fetch_info(&self, addr: &str) -> crate::error::Result<InfoJson> {
        let response = self
            .http_client
            .get(format!("http://{}/info.json", addr))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl StatusProbe for FivemStatusProbe {
    async fn check(&self) -> ServerStatus {
        let Some(addr) = self.addr.as_deref() else {
            return ServerStatus::offline();
        };

        match self.fetch_info(addr).await {
            Ok(info) => info.into(),
            Err(e) => {
                debug!("Game server {} unreachable: {}", addr, e);
                ServerStatus::offline()
            }
        }
    }
}
