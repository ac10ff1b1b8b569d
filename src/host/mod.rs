//! The two primitives the surrounding application gives us: an opaque
//! load/save of the whole blob, and named files in a backup directory.
//! Neither is atomic or transactional.

mod fs;
mod memory;

pub use fs::{FsBlobHost, FsFileHost};
pub use memory::{MemoryBlobHost, MemoryFileHost};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;

#[async_trait]
pub trait BlobHost: Send + Sync {
    /// `Ok(None)` when nothing has ever been saved.
    async fn load_blob(&self) -> Result<Option<Value>>;

    async fn save_blob(&self, blob: Value) -> Result<()>;
}

#[async_trait]
pub trait FileHost: Send + Sync {
    async fn ensure_dir(&self) -> Result<()>;

    async fn write_file(&self, name: &str, contents: &str) -> Result<()>;

    async fn read_file(&self, name: &str) -> Result<String>;

    async fn delete_file(&self, name: &str) -> Result<()>;

    async fn list_files(&self) -> Result<Vec<String>>;
}
