use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::StorageResult;

pub async fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

pub async fn read_json_file<T>(path: &Path) -> StorageResult<Option<T>>
where
    T: DeserializeOwned,
{
    match fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(None),
        Ok(bytes) => {
            let value = serde_json::from_slice::<T>(&bytes)
                .with_context(|| format!("corrupt json in {}", path.display()))?;
            Ok(Some(value))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Atomically replace `path` with the json encoding of `value`.
///
/// Written to a sibling temp file, fsync'd, then renamed over the target, so
/// readers see either the old or the new snapshot and never a torn one.
pub async fn write_json_file<T>(path: &Path, value: &T) -> StorageResult<()>
where
    T: Serialize,
{
    ensure_parent_dir(path).await?;

    let tmp_path = temp_path(path);
    let json = serde_json::to_vec(value)?;

    let mut file = fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    file.write_all(&json).await?;
    file.sync_all().await?;

    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("failed to move snapshot into {}", path.display()))?;
    Ok(())
}

/// load json or default to an empty value.
pub async fn load_or_default<T>(path: &Path) -> StorageResult<T>
where
    T: DeserializeOwned + Default,
{
    Ok(read_json_file::<T>(path).await?.unwrap_or_default())
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| format!(".{}.tmp", name.to_string_lossy()))
        .unwrap_or_else(|| ".snapshot.tmp".to_string());
    path.with_file_name(file_name)
}
