//! Resolving a sample URI to bytes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Something that can turn a URI into raw bytes
///
/// Implementations must be shareable across the threads that resolve
/// samples concurrently.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, String>;
}

/// Reads `file://` URIs and plain paths from disk, `http(s)://` over the network
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    /// Directory that relative paths are resolved against
    base_dir: Option<PathBuf>,
    timeout: Duration,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self {
            base_dir: None,
            timeout: Duration::from_secs(20),
        }
    }

    /// Resolve relative paths against `dir` (usually the score's directory)
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn local_path(&self, uri: &str) -> PathBuf {
        let raw = uri.strip_prefix("file://").unwrap_or(uri);
        let path = Path::new(raw);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    #[cfg(feature = "http")]
    fn fetch_http(&self, uri: &str) -> Result<Vec<u8>, String> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| e.to_string())?;
        let response = client
            .get(uri)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        let bytes = response.bytes().map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }

    #[cfg(not(feature = "http"))]
    fn fetch_http(&self, _uri: &str) -> Result<Vec<u8>, String> {
        Err("built without the `http` feature".to_string())
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, String> {
        if is_remote(uri) {
            log::info!("fetching {}", uri);
            self.fetch_http(uri)
        } else {
            let path = self.local_path(uri);
            fs::read(&path).map_err(|e| format!("{}: {}", path.display(), e))
        }
    }
}

/// File extension of the last path segment, used as a decoder hint
pub fn extension_hint(uri: &str) -> Option<&str> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extension_hint() {
        assert_eq!(
            extension_hint("https://example.org/sounds/Risitas.mp3"),
            Some("mp3")
        );
        assert_eq!(extension_hint("https://x.org/a/cu%C3%B1ao.wav?raw=1"), Some("wav"));
        assert_eq!(extension_hint("samples/kick"), None);
    }

    #[test]
    fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kick.wav");
        fs::File::create(&path).unwrap().write_all(b"RIFF").unwrap();

        let fetcher = DefaultFetcher::new().with_base_dir(dir.path());
        assert_eq!(fetcher.fetch("kick.wav").unwrap(), b"RIFF");

        let uri = format!("file://{}", path.display());
        assert_eq!(DefaultFetcher::new().fetch(&uri).unwrap(), b"RIFF");
    }

    #[test]
    fn test_fetch_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DefaultFetcher::new().with_base_dir(dir.path());
        let err = fetcher.fetch("nope.wav").unwrap_err();
        assert!(err.contains("nope.wav"));
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://raw.githubusercontent.com/x.wav"));
        assert!(!is_remote("file:///tmp/x.wav"));
    }
}
