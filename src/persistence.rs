//! Durability across restarts. A `PersistenceHook` receives a snapshot of the store on
//! shutdown and hands entries back on startup. Ages travel with the entries, so a
//! restored entry expires when it would have without the restart.

use crate::errors::CacheError;
use crate::types::Strategy;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Store entry detached from the process clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub key: String,
    pub payload: Vec<u8>,
    pub ttl_ms: u64,
    /// Age at `saved_at`.
    pub age_ms: u64,
    pub strategy: Strategy,
    pub compressed: bool,
    pub saved_at: DateTime<Utc>,
}

impl PersistedEntry {
    /// Age at `now`, adding the wall-clock time elapsed since the save. A clock that
    /// moved backwards adds nothing.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        let since_save = (now - self.saved_at).to_std().unwrap_or(Duration::ZERO);
        Duration::from_millis(self.age_ms).saturating_add(since_save)
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now) > Duration::from_millis(self.ttl_ms)
    }
}

pub trait PersistenceHook: Send + Sync {
    /// # Errors
    /// Returns `CacheError::Persistence` or `CacheError::Io` when the backing storage
    /// cannot be read.
    fn load(&self) -> Result<Vec<PersistedEntry>, CacheError>;

    /// # Errors
    /// Returns `CacheError::Persistence` or `CacheError::Io` when the snapshot cannot
    /// be written.
    fn save(&self, entries: &[PersistedEntry]) -> Result<(), CacheError>;
}

const MAGIC: &[u8; 4] = b"ACS1";

/// Single-file snapshot: a magic header, then one frame per entry laid out as
/// `len: u64 LE | crc32: u32 LE | bincode body`. Saves go to a sibling temp file that
/// is renamed over the target.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".tmp");
        PathBuf::from(p)
    }
}

fn create_secure(path: &Path) -> io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().write(true).create(true).truncate(true).open(path)
    }
}

impl PersistenceHook for FilePersistence {
    fn load(&self) -> Result<Vec<PersistedEntry>, CacheError> {
        let mut buf = Vec::new();
        match File::open(&self.path) {
            Ok(mut f) => {
                f.read_to_end(&mut buf)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }
        if buf.is_empty() {
            return Ok(Vec::new());
        }
        if buf.get(..4) != Some(MAGIC.as_slice()) {
            return Err(CacheError::Persistence(format!("{} is not a cache snapshot", self.path.display())));
        }

        let mut out = Vec::new();
        let mut offset = 4usize;
        while offset + 12 <= buf.len() {
            let mut len_bytes = [0u8; 8];
            len_bytes.copy_from_slice(&buf[offset..offset + 8]);
            let mut crc_bytes = [0u8; 4];
            crc_bytes.copy_from_slice(&buf[offset + 8..offset + 12]);
            offset += 12;
            let Ok(len) = usize::try_from(u64::from_le_bytes(len_bytes)) else { break };
            let Some(end) = offset.checked_add(len).filter(|end| *end <= buf.len()) else {
                log::warn!("cache snapshot {} truncated; keeping {} entries", self.path.display(), out.len());
                break;
            };
            let body = &buf[offset..end];
            offset = end;
            if crc32fast::hash(body) != u32::from_le_bytes(crc_bytes) {
                log::warn!("skipping corrupted frame in cache snapshot {}", self.path.display());
                continue;
            }
            match decode_from_slice::<PersistedEntry, _>(body, standard()) {
                Ok((entry, _)) => out.push(entry),
                Err(e) => log::warn!("skipping undecodable frame in cache snapshot: {e}"),
            }
        }
        Ok(out)
    }

    fn save(&self, entries: &[PersistedEntry]) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.tmp_path();
        {
            let mut f = io::BufWriter::new(create_secure(&tmp)?);
            f.write_all(MAGIC)?;
            for entry in entries {
                let body = encode_to_vec(entry, standard()).map_err(|e| CacheError::Persistence(e.to_string()))?;
                f.write_all(&crate::utils::num::usize_to_u64(body.len()).to_le_bytes())?;
                f.write_all(&crc32fast::hash(&body).to_le_bytes())?;
                f.write_all(&body)?;
            }
            let file = f.into_inner().map_err(|e| CacheError::Io(e.to_string()))?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        log::info!("saved {} cache entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}
