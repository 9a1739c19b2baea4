//! Record store.
//!
//! One TOML document per descriptor at `{records_dir}/{language}/{descriptor}.toml`:
//!
//! ```toml
//! format-version = 1
//!
//! [platforms."linux-64--x86_64"]
//! implementation-version = "3.10.15+20241016"
//! provider = "prebuilt"
//! ```
//!
//! Writers that read, modify and write back hold an advisory lock on
//! `{descriptor}.lock` next to the document. Plain reads and writes do not
//! lock.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{DevbootError, Result, StorageError};
use crate::platform::PlatformId;

pub const RECORD_FORMAT_VERSION: u32 = 1;

/// Which concrete version a provider installed for a platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Record {
    pub implementation_version: String,
    pub provider: String,
}

impl Record {
    pub fn new(implementation_version: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            implementation_version: implementation_version.into(),
            provider: provider.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RecordDocument {
    format_version: u32,
    #[serde(default)]
    platforms: BTreeMap<String, Record>,
}

/// Exclusive advisory lock on one descriptor's records, released on drop
#[derive(Debug)]
pub struct RecordLock {
    file: File,
    path: PathBuf,
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "Failed to release record lock");
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Store rooted at a language's records directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_path(&self, descriptor: &str) -> PathBuf {
        self.dir.join(format!("{descriptor}.toml"))
    }

    fn lock_path(&self, descriptor: &str) -> PathBuf {
        self.dir.join(format!("{descriptor}.lock"))
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            DevbootError::Storage(Box::new(StorageError::DirectoryFailed {
                path: self.dir.clone(),
                error: e.to_string(),
            }))
        })
    }

    /// Block until the descriptor's lock is held
    pub fn lock(&self, descriptor: &str) -> Result<RecordLock> {
        self.ensure_dir()?;
        let path = self.lock_path(descriptor);
        let lock_failed = |e: std::io::Error| {
            DevbootError::Storage(Box::new(StorageError::LockFailed {
                path: path.clone(),
                error: e.to_string(),
            }))
        };

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_failed)?;
        FileExt::lock_exclusive(&file).map_err(lock_failed)?;
        Ok(RecordLock { file, path })
    }

    /// Records of a descriptor by platform id; a missing document is empty
    pub fn read(&self, descriptor: &str) -> Result<BTreeMap<String, Record>> {
        let path = self.document_path(descriptor);
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&path)?;
        parse_document(&path, &content)
    }

    /// Replace the whole document
    pub fn write(&self, descriptor: &str, records: &BTreeMap<String, Record>) -> Result<()> {
        self.ensure_dir()?;
        let path = self.document_path(descriptor);
        let write_failed = |error: String| {
            DevbootError::Storage(Box::new(StorageError::WriteFailed {
                path: path.clone(),
                error,
            }))
        };

        let document = RecordDocument {
            format_version: RECORD_FORMAT_VERSION,
            platforms: records.clone(),
        };
        let content = toml::to_string_pretty(&document).map_err(|e| write_failed(e.to_string()))?;

        let mut staged =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| write_failed(e.to_string()))?;
        staged
            .write_all(content.as_bytes())
            .map_err(|e| write_failed(e.to_string()))?;
        staged
            .persist(&path)
            .map_err(|e| write_failed(e.error.to_string()))?;
        Ok(())
    }

    pub fn get(&self, descriptor: &str, platform: &PlatformId) -> Result<Option<Record>> {
        Ok(self.read(descriptor)?.remove(&platform.to_string()))
    }

    /// Return the platform's record, forming and persisting it on a miss
    pub async fn get_or_create<F, Fut>(
        &self,
        descriptor: &str,
        platform: &PlatformId,
        form: F,
    ) -> Result<Record>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Record>>,
    {
        let lock = self.lock(descriptor)?;
        self.get_or_create_locked(&lock, descriptor, platform, form)
            .await
    }

    /// `get_or_create` for a caller already holding the descriptor's lock
    pub async fn get_or_create_locked<F, Fut>(
        &self,
        _lock: &RecordLock,
        descriptor: &str,
        platform: &PlatformId,
        form: F,
    ) -> Result<Record>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Record>>,
    {
        let mut records = self.read(descriptor)?;
        let key = platform.to_string();
        if let Some(record) = records.get(&key) {
            return Ok(record.clone());
        }

        let record = form().await?;
        info!(
            descriptor,
            platform = %key,
            version = %record.implementation_version,
            provider = %record.provider,
            "Recorded new version"
        );
        records.insert(key, record.clone());
        self.write(descriptor, &records)?;
        Ok(record)
    }

    /// Overwrite one platform's record; caller holds the lock
    pub fn replace_locked(
        &self,
        _lock: &RecordLock,
        descriptor: &str,
        platform: &PlatformId,
        record: Record,
    ) -> Result<()> {
        let mut records = self.read(descriptor)?;
        records.insert(platform.to_string(), record);
        self.write(descriptor, &records)
    }
}

fn parse_document(path: &Path, content: &str) -> Result<BTreeMap<String, Record>> {
    let invalid = |message: String| {
        DevbootError::Storage(Box::new(StorageError::InvalidDocument {
            path: path.to_path_buf(),
            message,
        }))
    };

    let table: toml::Table = toml::from_str(content).map_err(|e| invalid(e.message().to_string()))?;
    match table.get("format-version") {
        Some(toml::Value::Integer(found)) if *found == i64::from(RECORD_FORMAT_VERSION) => {}
        Some(toml::Value::Integer(found)) => {
            return Err(DevbootError::Storage(Box::new(
                StorageError::UnsupportedFormatVersion {
                    path: path.to_path_buf(),
                    found: *found,
                    expected: RECORD_FORMAT_VERSION,
                },
            )));
        }
        Some(other) => {
            return Err(invalid(format!(
                "format-version must be an integer, found {}",
                other.type_str()
            )))
        }
        None => return Err(invalid("missing format-version".to_string())),
    }

    let document: RecordDocument = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| invalid(e.message().to_string()))?;
    Ok(document.platforms)
}
