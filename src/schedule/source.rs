// src/schedule/source.rs

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::Result;

/// Paging contract the scheduler requires from its backing store.
///
/// One call returns up to `page_size` task ids in store-defined order; the
/// scheduler imposes no ordering guarantee beyond appending ids to its queue
/// in the order received. The store may return ids that are already queued
/// or currently executing; deduplication is the scheduler's job.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn query(&self, page_size: usize) -> Result<Vec<String>>;
}

/// A backing store reading task ids from a line-per-id text file.
///
/// Keeps a cursor so successive pages walk the file; blank lines are
/// skipped. This is the store the `drain` command uses; the production
/// deployment would substitute a database-backed source behind the same
/// trait.
pub struct FileTaskSource {
    path: PathBuf,
    cursor: Mutex<usize>,
}

impl FileTaskSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TaskSource for FileTaskSource {
    async fn query(&self, page_size: usize) -> Result<Vec<String>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;

        let mut cursor = self.cursor.lock().await;
        let mut page = Vec::new();

        for line in contents.lines().skip(*cursor) {
            *cursor += 1;
            let id = line.trim();
            if id.is_empty() {
                continue;
            }
            page.push(id.to_string());
            if page.len() == page_size {
                break;
            }
        }

        debug!(file = %self.path.display(), ids = page.len(), "queried task source page");
        Ok(page)
    }
}
