//! Atomic persistence of `ImageProperties` sidecars.

use std::path::{Path, PathBuf};

use crate::types::ImageProperties;

/// Write the sidecar JSON to `path`.
///
/// The JSON is written to a uniquely named sibling and renamed into place, so
/// readers see either the previous file or the complete new one.
pub async fn save_sidecar(props: &ImageProperties, path: &Path) -> std::io::Result<()> {
    let json = props.to_json().map_err(std::io::Error::other)?;
    write_atomic(path, json.as_bytes()).await
}

/// Write `data` to `path` through a temp file + rename.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = temp_sibling(path);
    if let Err(e) = tokio::fs::write(&temp_path, data).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}

/// Concurrent writers of the same key each get their own temp file.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("blob");
    let suffix: u64 = rand::random();
    path.with_file_name(format!(".{name}.{suffix:016x}.tmp"))
}
