//! HTTPS transport backed by `ureq`.
//!
//! Used for the download index page, the release index, checksum manifests
//! and the release archives themselves.

use crate::backend::Transport;
use crate::error::{Error, Result};
use std::io::Write;
use std::time::Duration;

/// Maximum archive size (the engine zip is well under this).
const MAX_BODY_SIZE: u64 = 200 * 1024 * 1024;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("tfkit/", env!("CARGO_PKG_VERSION"));

/// HTTPS transport.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use tfkit::backend::Transport;
/// use tfkit::backend::http::HttpTransport;
///
/// let transport = HttpTransport::new(Some(Duration::from_secs(30)));
/// let index = transport.get_text("https://releases.hashicorp.com/terraform").unwrap();
/// println!("{} bytes", index.len());
/// ```
pub struct HttpTransport {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// Global per-request deadline, if any.
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Create a transport with an optional global request deadline.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .build();
        Self {
            agent: config.into(),
            timeout,
        }
    }

    /// The request deadline this transport applies.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        log::debug!("GET {}", url);
        let text = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()?
            .body_mut()
            .read_to_string()?;
        Ok(text)
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        log::debug!("Downloading {}", url);
        let mut response = self
            .agent
            .get(url)
            .header("Accept", "application/octet-stream")
            .header("User-Agent", USER_AGENT)
            .call()?;

        let mut reader = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .reader();

        std::io::copy(&mut reader, sink).map_err(|e| Error::DownloadFailed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
