//! Application submissions collection

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::write_atomic;
use crate::error::{AppError, Result};

/// A submitted application. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSubmission {
    pub id: Uuid,
    pub discord_id: Option<String>,
    pub discord_name: Option<String>,
    pub ooc_info: Option<String>,
    pub age: Option<String>,
    pub region: Option<String>,
    pub experience: Option<String>,
    pub why_apply: Option<String>,
    pub stream: Option<String>,
    pub backstory: Option<String>,
    pub metagaming: Option<String>,
    pub failrp: Option<String>,
    pub scenario1: Option<String>,
    pub scenario2: Option<String>,
    pub rulebreak: Option<String>,
    pub rules_location: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Persistence for application submissions
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Persist a new submission
    async fn insert(&self, submission: ApplicationSubmission) -> Result<()>;

    /// All submissions, newest `submitted_at` first
    async fn list_newest_first(&self) -> Result<Vec<ApplicationSubmission>>;
}

/// Order submissions newest first. Equal timestamps keep the later insert first.
pub fn sort_newest_first(
    mut submissions: Vec<ApplicationSubmission>,
) -> Vec<ApplicationSubmission> {
    submissions.reverse();
    // Stable sort, so the reversal above decides ties
    submissions.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    submissions
}

/// Collection stored as a JSON array on disk, fully cached in memory
pub struct JsonApplicationStore {
    path: PathBuf,
    documents: RwLock<Vec<ApplicationSubmission>>,
}

impl JsonApplicationStore {
    /// Load from a JSON file, or start empty if it does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let documents = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| AppError::StoreParse {
                path: path.display().to_string(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(AppError::StoreLoad {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        Ok(Self {
            path,
            documents: RwLock::new(documents),
        })
    }

    pub async fn count(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl ApplicationStore for JsonApplicationStore {
    async fn insert(&self, submission: ApplicationSubmission) -> Result<()> {
        // Held across the write so concurrent inserts serialize on disk
        let mut documents = self.documents.write().await;
        documents.push(submission);

        let content = serde_json::to_vec_pretty(&*documents)?;
        if let Err(e) = write_atomic(&self.path, &content).await {
            // Not durable, so not stored
            documents.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn list_newest_first(&self) -> Result<Vec<ApplicationSubmission>> {
        let documents = self.documents.read().await.clone();
        Ok(sort_newest_first(documents))
    }
}
