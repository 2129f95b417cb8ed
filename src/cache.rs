//! Energy counter persistence
//!
//! Counters live in memory and are written to a small JSON file on session
//! end, hourly rollover and shutdown, so a restart resumes where it left off.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::engine::EnergySeed;
use crate::errors::CacheError;

/// Persisted counters, kWh
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyRecord {
    #[serde(default)]
    pub realtime_energy: f64,
    #[serde(default)]
    pub hourly_energy: f64,
    #[serde(default)]
    pub last_hour_energy: f64,
}

impl EnergyRecord {
    pub fn seed(&self) -> EnergySeed {
        EnergySeed {
            session_energy: self.realtime_energy,
            hourly_energy: self.hourly_energy,
        }
    }
}

#[derive(Debug)]
pub struct EnergyCache {
    path: PathBuf,
    record: EnergyRecord,
    dirty: bool,
}

impl EnergyCache {
    /// Open the cache file, creating it with zeroed counters if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            info!("Creating energy cache {}", path.display());
            let mut cache = Self {
                path,
                record: EnergyRecord::default(),
                dirty: true,
            };
            cache.sync()?;
            return Ok(cache);
        }

        let contents = fs::read_to_string(&path).map_err(|e| CacheError::ReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let record: EnergyRecord =
            serde_json::from_str(&contents).map_err(|e| CacheError::ParseError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!("Loaded energy cache {:?}", record);

        Ok(Self {
            path,
            record,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> EnergyRecord {
        self.record
    }

    pub fn seed(&self) -> EnergySeed {
        self.record.seed()
    }

    /// Update counters in memory; [`EnergyCache::sync`] writes them out.
    pub fn set(&mut self, record: EnergyRecord) {
        if record != self.record {
            self.record = record;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write pending changes via a temp file and rename.
    pub fn sync(&mut self) -> Result<(), CacheError> {
        if !self.dirty {
            return Ok(());
        }
        let fail = |reason: String| CacheError::WriteError {
            path: self.path.display().to_string(),
            reason,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&self.record).map_err(|e| fail(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| fail(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| fail(e.to_string()))?;

        self.dirty = false;
        Ok(())
    }
}
