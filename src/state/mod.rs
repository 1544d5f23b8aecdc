pub mod applications;
pub mod sessions;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub use applications::{ApplicationStore, ApplicationSubmission, JsonApplicationStore};
pub use sessions::{JsonSessionStore, SessionData, SessionStore, SharedSessionStore};

use crate::error::{AppError, Result};

/// Write a file atomically: temp file first, then rename over the target
pub(crate) async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let save_err = |e| AppError::StoreSave {
        path: path.display().to_string(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(save_err)?;
    }

    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, content).await.map_err(save_err)?;
    tokio::fs::rename(&temp_path, path).await.map_err(save_err)?;

    Ok(())
}

pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
