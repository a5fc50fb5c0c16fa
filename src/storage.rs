//! Object storage the finished table files are uploaded to.
//!
//! Repeated uploads overwrite objects of the same name, nothing is de-duplicated
//! across runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::{info_time, Error, Result};

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Creates the bucket unless it already exists.
    async fn ensure_bucket(&self, name: &str) -> Result<()>;

    /// Uploads every regular file directly inside `dir`, named by its file name.
    /// Returns how many files were uploaded.
    async fn upload_directory(&self, bucket: &str, dir: &Path) -> Result<usize>;
}

/// Buckets as sub-directories of a local root.
#[derive(Debug, Clone)]
pub struct LocalBucketStore {
    root: PathBuf,
}

impl LocalBucketStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl BucketStore for LocalBucketStore {
    async fn ensure_bucket(&self, name: &str) -> Result<()> {
        let dir = self.bucket_dir(name);
        if fs::try_exists(&dir).await? {
            info_time!("Bucket {} already exists.", name);
        } else {
            fs::create_dir_all(&dir).await?;
            info_time!("Bucket {} has been created.", name);
        }
        Ok(())
    }

    async fn upload_directory(&self, bucket: &str, dir: &Path) -> Result<usize> {
        let target = self.bucket_dir(bucket);
        if !fs::try_exists(&target).await? {
            return Err(Error::MissingBucket(bucket.to_string()));
        }
        let target = fs::canonicalize(&target).await?;

        let mut entries = fs::read_dir(dir).await?;
        let mut uploaded = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            fs::copy(entry.path(), target.join(entry.file_name())).await?;
            uploaded += 1;
        }

        if uploaded == 0 {
            info_time!("There are no files in {}.", dir.display());
        }
        Ok(uploaded)
    }
}
