use crate::rule::{RuleError, RuleRecord, RuleState};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("alert file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("alert file line {line} is corrupt: {source}")]
    Corrupt { line: usize, source: RuleError },

    #[error("refusing to store rule: {0}")]
    InvalidRule(#[from] RuleError),
}

/// Append-only line file of barrier rules.
///
/// Every read or write goes through `lock`, so an `append` can never land in
/// the window between a rewrite's read and its rename.
pub struct RuleStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a new Active rule at the end of the file, creating it if needed.
    pub async fn append(&self, record: &RuleRecord) -> Result<(), StoreError> {
        let mut record = record.clone();
        record.state = RuleState::Active;
        let line = format!("{}\n", record.serialize());
        // Validate the exact bytes we are about to write.
        RuleRecord::parse(&line)?;

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        debug!(path = %self.path.display(), "Rule appended");
        Ok(())
    }

    /// All records in insertion order, without modifying the file.
    pub async fn snapshot(&self) -> Result<Vec<RuleRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Runs `visit` over every record and atomically replaces the file with
    /// the results. Nothing is written unless every line parses. Returns the
    /// number of records visited.
    pub async fn scan_and_rewrite<F>(&self, mut visit: F) -> Result<usize, StoreError>
    where
        F: FnMut(RuleRecord) -> RuleRecord,
    {
        let _guard = self.lock.lock().await;
        let records = self.load().await?;
        if records.is_empty() {
            return Ok(0);
        }

        let visited = records.len();
        let mut out = String::new();
        for record in records {
            let record = visit(record);
            out.push_str(&record.serialize());
            out.push('\n');
        }

        let tmp = self.tmp_path();
        if let Err(e) = Self::replace_with(&tmp, &self.path, out.as_bytes()).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(visited)
    }

    async fn replace_with(tmp: &Path, target: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(tmp).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(tmp, target).await
    }

    // Caller must hold `lock`.
    async fn load(&self) -> Result<Vec<RuleRecord>, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                RuleRecord::parse(line).map_err(|source| StoreError::Corrupt {
                    line: idx + 1,
                    source,
                })
            })
            .collect()
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
