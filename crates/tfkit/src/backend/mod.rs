//! Transport traits and implementations for fetching release artifacts.
//!
//! This module provides the [`Transport`] trait and implementations for the
//! places release data comes from. The primary implementation is
//! [`http::HttpTransport`], which talks to the release and download pages
//! over HTTPS.
//!
//! # Testing
//!
//! Use [`MockTransport`] to serve canned bodies without network access:
//!
//! ```
//! use tfkit::backend::{MockTransport, Transport};
//!
//! let mock = MockTransport::new();
//! mock.add("https://example.com/index", "terraform_1.4.2");
//!
//! let body = mock.get_text("https://example.com/index").unwrap();
//! assert_eq!(body, "terraform_1.4.2");
//! assert_eq!(mock.requests(), vec!["https://example.com/index".to_string()]);
//! ```

pub mod http;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Transport trait for fetching release data.
///
/// This abstraction allows for different sources of releases (the public
/// release site, an internal mirror, in-memory fixtures) and keeps every
/// network access behind one seam.
pub trait Transport: Send + Sync {
    /// Fetch a URL as text (index pages, checksum manifests).
    fn get_text(&self, url: &str) -> Result<String>;

    /// Stream a URL into `sink`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Error::DownloadFailed` if the body cannot be read.
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64>;
}

/// Mock transport for testing without network access.
///
/// Bodies are keyed by exact URL; every request is recorded so tests can
/// assert that an operation stayed offline.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    /// Create a new empty mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn add(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        let mut bodies = self.bodies.lock().unwrap_or_else(PoisonError::into_inner);
        bodies.insert(url.into(), body.into());
    }

    /// Every URL requested so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let bodies = self.bodies.lock().unwrap_or_else(PoisonError::into_inner);
        bodies
            .get(url)
            .cloned()
            .ok_or_else(|| Error::http(format!("HTTP 404 for {}", url), Some(404)))
    }
}

impl Transport for MockTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        let bytes = self.fetch(url)?;
        String::from_utf8(bytes).map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        let bytes = self.fetch(url)?;
        sink.write_all(&bytes).map_err(|e| Error::DownloadFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.len() as u64)
    }
}
