//! Name -> sample resolution with at-most-once fetching.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use rayon::prelude::*;

use super::decode::decode;
use super::fetch::{extension_hint, DefaultFetcher, Fetcher};
use super::SampleBuffer;
use crate::error::SampleError;

type Resolution = Result<Arc<SampleBuffer>, SampleError>;

/// One registered name: its URI and the cell its resolution lands in
struct Entry {
    uri: String,
    cell: Arc<OnceLock<Resolution>>,
    /// A background load has been requested for this cell
    requested: Arc<AtomicBool>,
}

impl Entry {
    fn new(uri: String) -> Self {
        Self {
            uri,
            cell: Arc::new(OnceLock::new()),
            requested: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Maps symbolic sample names to decoded buffers
///
/// The first `resolve` of a name fetches and decodes it; every later call
/// gets the cached outcome. Concurrent first calls for the same name block
/// on that name's cell, so a name is fetched at most once. Distinct names
/// resolve independently.
pub struct SampleRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    fetcher: Box<dyn Fetcher>,
}

impl SampleRegistry {
    /// Registry using the default disk/HTTP fetcher
    pub fn new() -> Self {
        Self::with_fetcher(DefaultFetcher::new())
    }

    pub fn with_fetcher(fetcher: impl Fetcher + 'static) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fetcher: Box::new(fetcher),
        }
    }

    /// Record `name -> uri`. Re-registering a name drops its cached buffer.
    pub fn register(&self, name: impl Into<String>, uri: impl Into<String>) {
        let name = name.into();
        let uri = uri.into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = entries.get(&name) {
            if existing.uri == uri {
                return;
            }
            log::info!("re-registering sample '{}' -> {}", name, uri);
        } else {
            log::debug!("registered sample '{}' -> {}", name, uri);
        }
        entries.insert(name, Entry::new(uri));
    }

    /// Clear the cached outcome for `name` so the next resolve fetches again
    pub fn forget(&self, name: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(name) {
            entry.cell = Arc::new(OnceLock::new());
            entry.requested = Arc::new(AtomicBool::new(false));
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    pub fn uri(&self, name: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|e| e.uri.clone())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Already resolved successfully, without triggering a fetch
    pub fn is_loaded(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .and_then(|e| e.cell.get())
            .is_some_and(|r| r.is_ok())
    }

    /// Resolve a name to its buffer, fetching and decoding on first use.
    pub fn resolve(&self, name: &str) -> Result<Arc<SampleBuffer>, SampleError> {
        // Only the map lookup happens under the registry lock; the fetch
        // itself runs under the per-name cell.
        let (uri, cell) = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            let entry = entries
                .get(name)
                .ok_or_else(|| SampleError::NotFound(name.to_string()))?;
            (entry.uri.clone(), Arc::clone(&entry.cell))
        };

        cell.get_or_init(|| self.load(name, &uri)).clone()
    }

    /// The cached outcome for `name` without ever fetching.
    ///
    /// `Ok(None)` means the name is registered but not resolved yet.
    pub fn lookup(&self, name: &str) -> Result<Option<Arc<SampleBuffer>>, SampleError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .get(name)
            .ok_or_else(|| SampleError::NotFound(name.to_string()))?;
        match entry.cell.get() {
            Some(resolution) => resolution.clone().map(Some),
            None => Ok(None),
        }
    }

    /// Resolve `name` on the rayon pool unless that was already requested.
    pub fn load_in_background(self: &Arc<Self>, name: &str) {
        let requested = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(name) {
                Some(entry) if entry.cell.get().is_none() => Arc::clone(&entry.requested),
                _ => return,
            }
        };
        if requested.swap(true, Ordering::AcqRel) {
            return;
        }

        log::debug!("loading sample '{}' in the background", name);
        let registry = Arc::clone(self);
        let name = name.to_string();
        rayon::spawn(move || {
            let _ = registry.resolve(&name);
        });
    }

    /// Request every registered name in the background and return at once.
    pub fn preload_in_background(self: &Arc<Self>) {
        for name in self.names() {
            self.load_in_background(&name);
        }
    }

    fn load(&self, name: &str, uri: &str) -> Resolution {
        let bytes = self.fetcher.fetch(uri).map_err(|reason| {
            log::warn!("could not fetch sample '{}': {}", name, reason);
            SampleError::Fetch {
                name: name.to_string(),
                uri: uri.to_string(),
                reason,
            }
        })?;

        let buffer = decode(bytes, extension_hint(uri)).map_err(|reason| {
            log::warn!("could not decode sample '{}': {}", name, reason);
            SampleError::Decode {
                name: name.to_string(),
                reason,
            }
        })?;

        log::info!(
            "loaded sample '{}' ({} frames, {} ch, {} Hz)",
            name,
            buffer.frame_count(),
            buffer.channels(),
            buffer.sample_rate()
        );
        Ok(Arc::new(buffer))
    }

    /// Resolve every registered name, distinct names in parallel.
    pub fn preload(&self) -> Vec<(String, Result<Arc<SampleBuffer>, SampleError>)> {
        self.names()
            .into_par_iter()
            .map(|name| {
                let result = self.resolve(&name);
                (name, result)
            })
            .collect()
    }
}

impl Default for SampleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
