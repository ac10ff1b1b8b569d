use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use tokio::fs;

use super::{BlobHost, FileHost};
use crate::errors::{Result, StoreError};

/// Keeps the blob as a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FsBlobHost {
    path: PathBuf,
}

impl FsBlobHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BlobHost for FsBlobHost {
    async fn load_blob(&self) -> Result<Option<Value>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&contents).map(Some).map_err(|err| {
            StoreError::corruption(format!("{} is not valid JSON: {err}", self.path.display()))
        })
    }

    async fn save_blob(&self, blob: Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let serialized = serde_json::to_string(&blob).map_err(|err| StoreError::Other(err.into()))?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized.as_bytes()).await?;
        fs::rename(&staging, &self.path).await?;
        debug!("wrote {} bytes to {}", serialized.len(), self.path.display());
        Ok(())
    }
}

/// Flat directory of named files, created on first use.
#[derive(Debug, Clone)]
pub struct FsFileHost {
    dir: PathBuf,
}

impl FsFileHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(&['/', '\\'][..]) || name.contains("..") {
            return Err(StoreError::validation(format!("invalid file name '{name}'")));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl FileHost for FsFileHost {
    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn write_file(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.resolve(name)?;
        self.ensure_dir().await?;
        fs::write(path, contents.as_bytes()).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<String> {
        let path = self.resolve(name)?;
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
