//! The mapping store: the persisted record of every processed image.
//!
//! `mapping.json` in the state directory maps source basenames to the hosted
//! URLs and metadata of their uploaded variants. Presence of a basename is
//! what makes later runs skip an image, so an entry is only ever written for
//! a fully completed image and only ever removed by reconciliation.
//!
//! # Identity
//!
//! Images are keyed by **basename** (filename with extension, directories
//! ignored). Two sources with the same filename in different directories
//! share one entry; the last one processed wins.
//!
//! # Durability
//!
//! The store is small, so every save rewrites the whole file pretty-printed.
//! A missing file is a normal first run and loads as an empty store. A file
//! that exists but cannot be parsed is a hard error: resetting it silently
//! would re-upload the entire library on the next run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

use crate::imaging::OriginalMetadata;
use crate::report::CleanupReport;

/// Name of the mapping store file within the state directory.
pub const STORE_FILENAME: &str = "mapping.json";

/// Version of the store format. Bump when the record shape changes.
const STORE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt mapping store at {0}: {1}")]
    Corrupt(PathBuf, serde_json::Error),
    #[error("mapping store at {0} has unsupported version {1}")]
    UnsupportedVersion(PathBuf, u32),
}

/// Width and height of an uploaded variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDimensions {
    pub width: u32,
    pub height: u32,
}

/// How a variant relates to its original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationInfo {
    /// Percentage of bytes saved versus the original file, `"{:.2}"`.
    pub compression_ratio_percent: String,
    /// Container format of the source (`"jpeg"`, `"png"`, ...).
    pub original_format: String,
    /// `"srgb"` or `"gray"`, from analysis.
    pub color_profile: String,
}

/// One uploaded variant of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub hosted_url: String,
    pub dimensions: VariantDimensions,
    pub byte_size: u64,
    /// Output container format, always `"avif"` currently.
    pub format: String,
    pub optimization: OptimizationInfo,
}

/// Everything stored for one fully processed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Profile name → uploaded variant.
    pub versions: BTreeMap<String, VariantRecord>,
    pub metadata: OriginalMetadata,
    pub processed_at: DateTime<Utc>,
}

/// In-memory form of `mapping.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingStore {
    pub version: u32,
    pub images: BTreeMap<String, ImageRecord>,
}

impl MappingStore {
    /// Create an empty store (first run).
    pub fn empty() -> Self {
        Self {
            version: STORE_VERSION,
            images: BTreeMap::new(),
        }
    }

    /// Load from the state directory.
    ///
    /// A missing file yields an empty store. A present but unreadable,
    /// unparseable, or version-mismatched file is an error; the store is
    /// never silently reset.
    pub fn load(state_dir: &Path) -> Result<Self, StoreError> {
        let path = store_path(state_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let store: Self =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(path.clone(), e))?;
        if store.version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion(path, store.version));
        }
        Ok(store)
    }

    /// Write the whole store into the state directory, pretty-printed.
    pub fn save(&self, state_dir: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::from)?;
        std::fs::write(store_path(state_dir), json)?;
        Ok(())
    }

    pub fn contains(&self, basename: &str) -> bool {
        self.images.contains_key(basename)
    }

    pub fn get(&self, basename: &str) -> Option<&ImageRecord> {
        self.images.get(basename)
    }

    /// Insert or replace the record for a basename.
    pub fn insert(&mut self, basename: String, record: ImageRecord) {
        self.images.insert(basename, record);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Drop every entry whose basename is not in the current source set.
    ///
    /// Pure in-memory pruning; the caller persists the result. Returns the
    /// cleanup report the run writes alongside the store.
    pub fn reconcile(&mut self, current: &BTreeSet<String>) -> CleanupReport {
        let started = Instant::now();
        let before = self.images.len();
        self.images.retain(|basename, _| current.contains(basename));
        let retained = self.images.len();
        CleanupReport {
            removed: (before - retained) as u32,
            retained: retained as u32,
            errors: Vec::new(),
            duration_seconds: started.elapsed().as_secs_f64(),
        }
    }
}

/// Resolve the mapping store path for a state directory.
pub fn store_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STORE_FILENAME)
}
