//! Purpose: Host targets, default ports/timeouts, and host path translation.
//! Exports: `HostTarget`, defaults, `wine_prefix_from_env`, `translate_host_path`.
//! Role: Keep CLI and client defaults aligned from one source.
//! Invariants: Target → port mapping is fixed (tmnext 30000, mp4 30001, turbo 30002).
//! Invariants: Host paths are only rewritten on Linux, where the game runs under Wine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_REFRESH_PORT: u16 = 30005;

pub const WINE_PREFIX_ENV: &str = "OPDEV_WINEPREFIX";
pub const WINE_PREFIX_FALLBACK_ENV: &str = "WINEPREFIX";

/// Game build the plugin is deployed into; each runs its own API port.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum HostTarget {
    Tmnext,
    Mp4,
    Turbo,
}

impl HostTarget {
    pub fn port(self) -> u16 {
        match self {
            HostTarget::Tmnext => 30000,
            HostTarget::Mp4 => 30001,
            HostTarget::Turbo => 30002,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HostTarget::Tmnext => "tmnext",
            HostTarget::Mp4 => "mp4",
            HostTarget::Turbo => "turbo",
        }
    }
}

pub fn wine_prefix_from_env() -> Option<PathBuf> {
    [WINE_PREFIX_ENV, WINE_PREFIX_FALLBACK_ENV]
        .into_iter()
        .filter_map(std::env::var_os)
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Map a path reported by the host to one readable from this machine.
pub fn translate_host_path(host_path: &str, wine_prefix: Option<&Path>) -> Result<PathBuf, Error> {
    if !cfg!(target_os = "linux") {
        return Ok(PathBuf::from(host_path));
    }
    let prefix = wine_prefix.ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("a Wine prefix is required to locate the host's data folder on Linux")
            .with_hint(format!(
                "Pass --wine-prefix or set {WINE_PREFIX_ENV} (or {WINE_PREFIX_FALLBACK_ENV})."
            ))
    })?;
    Ok(wine_path(prefix, host_path))
}

/// `C:\Users\me\OpenplanetNext` → `<prefix>/drive_c/Users/me/OpenplanetNext`.
pub fn wine_path(prefix: &Path, windows_path: &str) -> PathBuf {
    let drive_c = if prefix.file_name().is_some_and(|name| name == "drive_c") {
        prefix.to_path_buf()
    } else {
        prefix.join("drive_c")
    };

    let without_drive = match windows_path.split_once(':') {
        Some((_, rest)) => rest,
        None => windows_path,
    };
    let relative = without_drive.replace('\\', "/");
    let relative = relative.trim_start_matches('/');

    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(drive_c, |path, segment| path.join(segment))
}

#[cfg(test)]
mod tests {
    use super::{HostTarget, translate_host_path, wine_path};
    use std::path::{Path, PathBuf};

    #[test]
    fn target_ports_are_stable() {
        assert_eq!(HostTarget::Tmnext.port(), 30000);
        assert_eq!(HostTarget::Mp4.port(), 30001);
        assert_eq!(HostTarget::Turbo.port(), 30002);
    }

    #[test]
    fn windows_path_maps_into_drive_c() {
        let path = wine_path(
            Path::new("/games/prefix"),
            "C:\\Users\\steamuser\\OpenplanetNext\\",
        );
        assert_eq!(
            path,
            PathBuf::from("/games/prefix/drive_c/Users/steamuser/OpenplanetNext")
        );
    }

    #[test]
    fn prefix_already_at_drive_c_is_not_doubled() {
        let path = wine_path(Path::new("/games/prefix/drive_c"), "C:/Openplanet4");
        assert_eq!(path, PathBuf::from("/games/prefix/drive_c/Openplanet4"));
    }

    #[test]
    fn path_without_drive_letter_is_kept_relative_to_drive_c() {
        let path = wine_path(Path::new("/p"), "\\Users\\me");
        assert_eq!(path, PathBuf::from("/p/drive_c/Users/me"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_requires_a_prefix() {
        let err = translate_host_path("C:\\Op", None).expect_err("missing prefix");
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Usage);
        assert!(err.hint().is_some());
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn other_platforms_use_host_path_verbatim() {
        let path = translate_host_path("C:\\Op", None).expect("path");
        assert_eq!(path, PathBuf::from("C:\\Op"));
    }
}
