//! Manifest data model and wire-format normalization.

use crate::error::{ErrorKind, Result};
use crate::key::manifest_key;
use exn::ResultExt;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

/// Fetch concurrency used when the build omits `batchSize`.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// One cacheable resource tracked by the build manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Absolute URL with query and fragment already stripped.
    pub url: String,
    /// Opaque content revision; `None` for resources the build does not
    /// hash. Revisions are compared for equality only, never ordered.
    pub revision: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[serde(default)]
    entries: Vec<RawEntry>,
    install_count: Option<usize>,
    batch_size: Option<usize>,
    hash: String,
}

#[derive(Deserialize)]
struct RawEntry {
    url: String,
    #[serde(default)]
    revision: Option<String>,
}

/// The versioned resource manifest produced by the site build.
///
/// Entries are ordered by ascending build priority (0 = most urgent). The
/// leading [`install_set`](Manifest::install_set) is cached eagerly before
/// the worker activates; the [`remainder`](Manifest::remainder) is warmed
/// lazily in the background.
#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    install_count: usize,
    batch_size: usize,
    hash: String,
    index: HashMap<String, Option<String>>,
}

impl Manifest {
    /// Parse and normalize a manifest document.
    ///
    /// Relative entry URLs are resolved against `base`, keys are stripped of
    /// query and fragment, empty revisions become `None`, `installCount` is
    /// clamped to the entry count, and `batchSize` falls back to
    /// [`DEFAULT_BATCH_SIZE`] when absent or zero. An entry whose URL cannot
    /// be resolved is dropped with a warning rather than failing the whole
    /// document.
    pub fn from_json(body: &[u8], base: &Url) -> Result<Self> {
        let raw: RawManifest = serde_json::from_slice(body).or_raise(|| ErrorKind::Parse)?;
        let mut entries = Vec::with_capacity(raw.entries.len());
        for entry in raw.entries {
            let Ok(resolved) = base.join(&entry.url) else {
                tracing::warn!(url = %entry.url, "Dropping manifest entry with unresolvable URL");
                continue;
            };
            entries.push(ManifestEntry {
                url: manifest_key(&resolved),
                revision: entry.revision.filter(|revision| !revision.is_empty()),
            });
        }
        let install_count = raw.install_count.unwrap_or(entries.len()).min(entries.len());
        let batch_size = raw.batch_size.filter(|size| *size > 0).unwrap_or(DEFAULT_BATCH_SIZE);
        let index = entries.iter().map(|entry| (entry.url.clone(), entry.revision.clone())).collect();
        Ok(Self { entries, install_count, batch_size, hash: raw.hash, index })
    }

    /// Content hash identifying this manifest generation.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// The highest-priority prefix, cached before the worker may activate.
    pub fn install_set(&self) -> &[ManifestEntry] {
        &self.entries[..self.install_count]
    }

    /// Everything after the install set, warmed lazily.
    pub fn remainder(&self) -> &[ManifestEntry] {
        &self.entries[self.install_count..]
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Two-level lookup: outer `None` means the key is not tracked at all,
    /// inner `None` means tracked without a content revision.
    pub fn revision_of(&self, key: &str) -> Option<Option<&str>> {
        self.index.get(key).map(|revision| revision.as_deref())
    }
}
