use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{current_timestamp, write_atomic};
use crate::error::{AppError, Result};
use crate::models::{Identity, Notification};

/// Server-side session state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub identity: Option<Identity>,

    /// Flash messages, delivered at most once
    #[serde(default)]
    pub notifications: Vec<Notification>,

    pub created_at: u64,
    pub expires_at: u64,
}

impl SessionData {
    pub fn new(ttl: Duration) -> Self {
        let now = current_timestamp();
        Self {
            identity: None,
            notifications: Vec::new(),
            created_at: now,
            expires_at: now + ttl.as_secs(),
        }
    }

    pub fn is_expired(&self) -> bool {
        current_timestamp() >= self.expires_at
    }
}

/// Durable session storage keyed by session ID
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Session by ID. Expired sessions are reported as absent.
    async fn load(&self, id: &str) -> Result<Option<SessionData>>;

    async fn save(&self, id: &str, data: &SessionData) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<()>;

    /// Drop expired sessions, returning how many were removed
    async fn cleanup_expired(&self) -> Result<usize>;
}

pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Sessions cached in memory, one JSON file per session on disk
pub struct JsonSessionStore {
    dir: PathBuf,
    sessions: DashMap<String, SessionData>,
    /// Serializes file writes
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonSessionStore {
    /// Restore every unexpired session found in `dir`. Expired files are
    /// deleted; unreadable ones are skipped.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let load_err = |e| AppError::StoreLoad {
            path: dir.display().to_string(),
            source: e,
        };

        tokio::fs::create_dir_all(&dir).await.map_err(load_err)?;
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(load_err)?;

        let sessions = DashMap::new();
        let mut expired = 0;
        while let Some(entry) = entries.next_entry().await.map_err(load_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let data = match tokio::fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<SessionData>(&content),
                Err(e) => {
                    warn!("Skipping unreadable session file {}: {}", path.display(), e);
                    continue;
                }
            };
            match data {
                Ok(data) if data.is_expired() => {
                    expired += 1;
                    let _ = tokio::fs::remove_file(&path).await;
                }
                Ok(data) => {
                    sessions.insert(id, data);
                }
                Err(e) => warn!("Skipping corrupt session file {}: {}", path.display(), e),
            }
        }

        info!(
            "Restored {} sessions from {} ({} expired)",
            sessions.len(),
            dir.display(),
            expired
        );

        Ok(Self {
            dir,
            sessions,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn session_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(AppError::Internal {
                message: format!("invalid session id '{}'", id),
            });
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        let path = self.session_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::StoreSave {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        Ok(self
            .sessions
            .get(id)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, id: &str, data: &SessionData) -> Result<()> {
        let path = self.session_path(id)?;
        let content = serde_json::to_vec(data)?;

        let _guard = self.write_lock.lock().await;
        write_atomic(&path, &content).await?;
        self.sessions.insert(id.to_string(), data.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.sessions.remove(id);
        self.delete_file(id).await
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let _guard = self.write_lock.lock().await;
        for id in &expired {
            self.sessions.remove(id);
            self.delete_file(id).await?;
        }
        if !expired.is_empty() {
            debug!("Removed {} expired sessions", expired.len());
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Notification;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir()
            .join(format!("portal-sessions-{}", uuid::Uuid::new_v4()))
            .join("sessions")
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("json"))
            .count()
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let dir = temp_dir();
        let store = JsonSessionStore::open(&dir).await.unwrap();

        let mut data = SessionData::new(Duration::from_secs(60));
        data.notifications.push(Notification::info("hello"));
        store.save("abc", &data).await.unwrap();

        assert_eq!(store.load("abc").await.unwrap(), Some(data));
        assert_eq!(file_count(&dir), 1);

        store.remove("abc").await.unwrap();
        assert_eq!(store.load("abc").await.unwrap(), None);
        assert_eq!(file_count(&dir), 0);

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }

    #[tokio::test]
    async fn test_save_writes_only_its_own_file() {
        let dir = temp_dir();
        let store = JsonSessionStore::open(&dir).await.unwrap();
        let data = SessionData::new(Duration::from_secs(60));

        store.save("first", &data).await.unwrap();
        store.save("second", &data).await.unwrap();

        let first = std::fs::read_to_string(dir.join("first.json")).unwrap();
        let parsed: SessionData = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed, data);
        assert_eq!(file_count(&dir), 2);

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }

    #[tokio::test]
    async fn test_sessions_survive_reopen() {
        let dir = temp_dir();
        let data = SessionData::new(Duration::from_secs(60));
        {
            let store = JsonSessionStore::open(&dir).await.unwrap();
            store.save("persisted", &data).await.unwrap();
        }

        let reopened = JsonSessionStore::open(&dir).await.unwrap();
        assert_eq!(reopened.load("persisted").await.unwrap(), Some(data));

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }

    #[tokio::test]
    async fn test_expired_sessions_hidden_and_cleaned() {
        let dir = temp_dir();
        let store = JsonSessionStore::open(&dir).await.unwrap();

        let mut expired = SessionData::new(Duration::from_secs(60));
        expired.expires_at = expired.created_at.saturating_sub(1);
        store.save("old", &expired).await.unwrap();
        store
            .save("fresh", &SessionData::new(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(store.load("old").await.unwrap(), None);
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert!(store.load("fresh").await.unwrap().is_some());
        assert_eq!(file_count(&dir), 1);

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = temp_dir();
        let store = JsonSessionStore::open(&dir).await.unwrap();
        let data = SessionData::new(Duration::from_secs(60));

        assert!(store.save("../escape", &data).await.is_err());
        assert!(store.load("../escape").await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }
}
