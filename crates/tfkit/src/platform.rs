//! Platform detection for engine downloads.
//!
//! Maps the host OS and CPU onto the names used in published Terraform
//! archives (`terraform_<version>_<platform>_<arch>.zip`). Anything outside
//! the published matrix is a fatal configuration error: there is no sane
//! fallback archive to guess.
//!
//! # Example
//!
//! ```
//! use tfkit::platform;
//!
//! let platform = platform::from_host("linux", "x86_64").unwrap();
//! assert_eq!(platform.to_string(), "linux_amd64");
//! ```

use crate::error::{Error, Result};
use crate::types::Platform;

/// Detect the current platform.
///
/// # Supported Platforms
///
/// | Host OS               | Archive name |
/// |-----------------------|--------------|
/// | macOS / darwin        | darwin       |
/// | FreeBSD               | freebsd      |
/// | Linux                 | linux        |
/// | OpenBSD               | openbsd      |
/// | Solaris / illumos     | solaris      |
/// | Windows               | windows      |
///
/// | Host CPU              | Archive name |
/// |-----------------------|--------------|
/// | x86_64 / amd64        | amd64        |
/// | x86 / i386 / i686     | 386          |
/// | arm*                  | arm          |
///
/// # Errors
///
/// Returns `Error::UnsupportedPlatform` if either half is not published.
pub fn detect() -> Result<Platform> {
    from_host(std::env::consts::OS, std::env::consts::ARCH)
}

/// Map an arbitrary host OS / CPU pair.
pub fn from_host(os: &str, arch: &str) -> Result<Platform> {
    match (platform_name(os), architecture_name(arch)) {
        (Some(os_name), Some(arch_name)) => Ok(Platform::new(os_name, arch_name)),
        _ => Err(Error::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

fn platform_name(os: &str) -> Option<&'static str> {
    let os = os.to_lowercase();
    if os.contains("darwin") || os.contains("macos") {
        Some("darwin")
    } else if os.contains("freebsd") {
        Some("freebsd")
    } else if os.contains("linux") {
        Some("linux")
    } else if os.contains("openbsd") {
        Some("openbsd")
    } else if os.contains("sunos") || os.contains("solaris") || os.contains("illumos") {
        Some("solaris")
    } else if os.contains("windows") || os.contains("mingw") || os.contains("mswin") {
        Some("windows")
    } else {
        None
    }
}

fn architecture_name(arch: &str) -> Option<&'static str> {
    let arch = arch.to_lowercase();
    match arch.as_str() {
        "x86_64" | "amd64" => Some("amd64"),
        "x86" | "i386" | "i486" | "i586" | "i686" | "i86pc" => Some("386"),
        a if a.starts_with("arm") => Some("arm"),
        _ => None,
    }
}

/// Get the file extension for executables on this platform.
///
/// Returns ".exe" on Windows, empty string on other platforms.
#[must_use]
pub fn executable_extension() -> &'static str {
    if std::env::consts::OS == "windows" {
        ".exe"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_host_linux_amd64() {
        let platform = from_host("linux", "x86_64").unwrap();
        assert_eq!(platform.os, "linux");
        assert_eq!(platform.arch, "amd64");
    }

    #[test]
    fn test_from_host_os_names() {
        assert_eq!(from_host("macos", "x86_64").unwrap().os, "darwin");
        assert_eq!(from_host("x86_64-apple-darwin19", "amd64").unwrap().os, "darwin");
        assert_eq!(from_host("freebsd", "amd64").unwrap().os, "freebsd");
        assert_eq!(from_host("openbsd", "amd64").unwrap().os, "openbsd");
        assert_eq!(from_host("solaris2.11", "amd64").unwrap().os, "solaris");
        assert_eq!(from_host("sunos", "amd64").unwrap().os, "solaris");
        assert_eq!(from_host("windows", "x86_64").unwrap().os, "windows");
        assert_eq!(from_host("mingw32", "x86_64").unwrap().os, "windows");
    }

    #[test]
    fn test_from_host_arch_names() {
        assert_eq!(from_host("linux", "i686").unwrap().arch, "386");
        assert_eq!(from_host("linux", "x86").unwrap().arch, "386");
        assert_eq!(from_host("linux", "armv7l").unwrap().arch, "arm");
        assert_eq!(from_host("linux", "arm").unwrap().arch, "arm");
    }

    #[test]
    fn test_from_host_unsupported_os() {
        let err = from_host("plan9", "x86_64").unwrap_err();
        match err {
            Error::UnsupportedPlatform { os, .. } => assert_eq!(os, "plan9"),
            _ => panic!("Expected UnsupportedPlatform"),
        }
    }

    #[test]
    fn test_from_host_unsupported_arch() {
        assert!(matches!(
            from_host("linux", "riscv64"),
            Err(Error::UnsupportedPlatform { .. })
        ));
        assert!(matches!(
            from_host("linux", "mips"),
            Err(Error::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn test_executable_extension() {
        let ext = executable_extension();
        #[cfg(windows)]
        assert_eq!(ext, ".exe");
        #[cfg(not(windows))]
        assert_eq!(ext, "");
    }
}
