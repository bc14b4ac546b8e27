use std::path::{Path, PathBuf};

use tokio::fs::{create_dir_all, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::store::DocumentKind;

pub async fn prepare_io(root: &Path) -> std::io::Result<()> {
    for kind in DocumentKind::ALL {
        create_dir_all(root.join(kind.dir())).await?;
    }
    Ok(())
}

pub fn document_path(root: &Path, kind: DocumentKind, id: &uuid::Uuid) -> PathBuf {
    root.join(kind.dir()).join(format!("{}.dat", id))
}

/// Writes to a sibling `.tmp` file first, then renames over the target.
pub async fn write_io_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp).await?);
    writer.write_all(bytes).await?;
    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    tokio::fs::rename(&tmp, path).await
}

pub async fn read_io_file(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut bytes = Vec::new();
    BufReader::new(file).read_to_end(&mut bytes).await?;
    Ok(Some(bytes))
}

pub async fn remove_io_file(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Every `<id>.dat` file in `dir`; anything else is skipped.
pub async fn list_io_files(dir: &Path) -> std::io::Result<Vec<(uuid::Uuid, PathBuf)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("dat") {
            continue;
        }
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<uuid::Uuid>().ok());
        match id {
            Some(id) => found.push((id, path)),
            None => log::warn!("Skipping stray file in document store: {}", path.display()),
        }
    }
    Ok(found)
}
