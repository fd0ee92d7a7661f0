//! Verifying and unpacking release archives.

use crate::error::{Error, Result};
use crate::version_manager::downloader::Download;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

/// Published digest for `file` in a `SHA256SUMS` manifest.
///
/// The manifest is one `<hexdigest>  <filename>` pair per line.
#[must_use]
pub fn published_checksum(manifest: &str, file: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?;
        (name.trim_start_matches('*') == file).then(|| digest.to_lowercase())
    })
}

/// Check a download against the manifest entry for `file`.
///
/// # Errors
///
/// Returns `Error::ChecksumMissing` when the manifest has no entry and
/// `Error::ChecksumMismatch` when the digests differ.
pub fn verify(manifest: &str, file: &str, download: &Download) -> Result<()> {
    let expected = published_checksum(manifest, file).ok_or_else(|| Error::ChecksumMissing {
        file: file.to_string(),
    })?;

    if expected != download.sha256() {
        return Err(Error::ChecksumMismatch {
            file: file.to_string(),
            expected,
            actual: download.sha256().to_string(),
        });
    }

    log::debug!("Checksum verified for {}", file);
    Ok(())
}

/// Extract `entry` from the archive to `dest`, mode 0755.
///
/// The binary is written to a temporary file next to `dest` and renamed
/// into place, so `dest` either appears complete or not at all.
pub fn unpack(download: &Download, entry: &str, dest: &Path) -> Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| Error::Other(format!("no parent directory for {}", dest.display())))?;

    let mut archive = zip::ZipArchive::new(download.open()?)?;
    let mut staged = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;

    {
        let index = entry_index(&archive, entry)?;
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            return Err(Error::Archive(format!("{} is a directory in archive", entry)));
        }
        io::copy(&mut file, staged.as_file_mut()).map_err(|e| Error::io(staged.path(), e))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o755))
            .map_err(|e| Error::io(staged.path(), e))?;
    }

    staged
        .persist(dest)
        .map_err(|e| Error::io(dest, e.error))?;
    Ok(())
}

fn entry_index(archive: &zip::ZipArchive<fs::File>, entry: &str) -> Result<usize> {
    (0..archive.len())
        .find(|&i| {
            archive.name_for_index(i).is_some_and(|name| {
                name == entry
                    || Path::new(name)
                        .file_name()
                        .is_some_and(|n| n == entry)
            })
        })
        .ok_or_else(|| Error::Archive(format!("{} not found in archive", entry)))
}
