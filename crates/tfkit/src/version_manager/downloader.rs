//! Downloading release artifacts to temporary files.

use crate::backend::Transport;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Write};
use tempfile::NamedTempFile;

/// A downloaded artifact. The temporary file is deleted on drop.
#[derive(Debug)]
pub struct Download {
    file: NamedTempFile,
    sha256: String,
    size: u64,
}

impl Download {
    /// Hex SHA-256 of the content.
    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// A fresh read handle positioned at the start.
    pub fn open(&self) -> Result<File> {
        self.file
            .reopen()
            .map_err(|e| Error::io(self.file.path(), e))
    }
}

struct HashingWriter<'a> {
    inner: &'a mut dyn Write,
    hasher: Sha256,
}

impl Write for HashingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Fetch `url` into a temporary file, hashing it on the way.
pub fn fetch(transport: &dyn Transport, url: &str) -> Result<Download> {
    let mut file = NamedTempFile::new().map_err(|e| Error::io(std::env::temp_dir(), e))?;

    let mut writer = HashingWriter {
        inner: file.as_file_mut(),
        hasher: Sha256::new(),
    };
    let size = transport.download(url, &mut writer)?;
    writer.flush().map_err(|e| Error::DownloadFailed {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let sha256 = hex::encode(writer.hasher.finalize());

    log::debug!("Downloaded {} ({} bytes, sha256 {})", url, size, sha256);
    Ok(Download { file, sha256, size })
}

/// Hex SHA-256 of a byte slice.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockTransport;
    use std::io::Read;

    #[test]
    fn test_fetch_hashes_content() {
        let mock = MockTransport::new();
        mock.add("https://example.com/a.zip", "hello world");

        let download = fetch(&mock, "https://example.com/a.zip").unwrap();
        assert_eq!(download.size(), 11);
        assert_eq!(
            download.sha256(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );

        let mut content = String::new();
        download.open().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello world");
    }

    #[test]
    fn test_fetch_missing_url() {
        let mock = MockTransport::new();
        assert!(fetch(&mock, "https://example.com/missing.zip").is_err());
    }

    #[test]
    fn test_temp_file_removed_on_drop() {
        let mock = MockTransport::new();
        mock.add("https://example.com/a.zip", "x");

        let download = fetch(&mock, "https://example.com/a.zip").unwrap();
        let path = download.file.path().to_path_buf();
        assert!(path.exists());
        drop(download);
        assert!(!path.exists());
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
