//! Drive status dialects.
//!
//! `mt status` has no structured output. Whether a drive holds a loaded,
//! ready tape is recognised by a marker string that differs per operating
//! system, and on Linux per `mt` implementation.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result, UnameSnafu};
use crate::executor::CommandRunner;
use snafu::ResultExt;

/// Marker file present on Debian-family systems.
pub const DEBIAN_VERSION_FILE: &str = "/etc/debian_version";

/// `mt status` output dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// Linux with the `mt-st` package.
    #[serde(rename = "mt-st")]
    MtSt,
    /// Linux with the GNU cpio `mt`.
    #[serde(rename = "gnu-cpio")]
    GnuCpio,
    #[serde(rename = "sunos")]
    SunOs,
    #[serde(rename = "freebsd")]
    FreeBsd,
    #[serde(rename = "openbsd")]
    OpenBsd,
}

impl Dialect {
    /// All known dialects.
    pub const ALL: [Dialect; 5] = [
        Dialect::MtSt,
        Dialect::GnuCpio,
        Dialect::SunOs,
        Dialect::FreeBsd,
        Dialect::OpenBsd,
    ];

    /// Text `mt status` prints when a tape is loaded and the drive is ready.
    pub const fn ready_marker(&self) -> &'static str {
        match self {
            Dialect::MtSt => "ONLINE",
            Dialect::GnuCpio => "drive status",
            Dialect::SunOs => "No Additional Sense",
            Dialect::FreeBsd => "Current Driver State: at rest.",
            Dialect::OpenBsd => "ds=3<Mounted>",
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Dialect::MtSt => "mt-st",
            Dialect::GnuCpio => "gnu-cpio",
            Dialect::SunOs => "sunos",
            Dialect::FreeBsd => "freebsd",
            Dialect::OpenBsd => "openbsd",
        }
    }

    /// Maps a non-Linux `uname` sysname to its dialect.
    ///
    /// Returns `None` for Linux, which needs [`Dialect::for_linux`], and for
    /// unknown systems.
    pub fn from_sysname(sysname: &str) -> Option<Self> {
        match sysname {
            "SunOS" => Some(Dialect::SunOs),
            "FreeBSD" => Some(Dialect::FreeBsd),
            "OpenBSD" => Some(Dialect::OpenBsd),
            _ => None,
        }
    }

    /// Chooses the Linux dialect from `mt --version` output.
    ///
    /// Debian ships `mt-st`; other distributions usually ship the GNU cpio
    /// `mt`. The version banner decides either way, with the distribution
    /// only choosing which implementation is probed for.
    pub fn for_linux(debian: bool, mt_version: &str) -> Self {
        if debian {
            if mt_version.contains("mt-st") {
                Dialect::MtSt
            } else {
                Dialect::GnuCpio
            }
        } else if mt_version.contains("GNU cpio") {
            Dialect::GnuCpio
        } else {
            Dialect::MtSt
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownDialect {
                name: s.to_string(),
            })
    }
}

/// Returns the kernel name, as `uname -s` would print it.
pub fn sysname() -> Result<String> {
    let uts = nix::sys::utsname::uname().context(UnameSnafu)?;
    Ok(uts.sysname().to_string_lossy().into_owned())
}

/// Detects the dialect of the host.
///
/// `mt` is the configured drive control binary; its `--version` output
/// separates the two Linux implementations.
pub fn detect_dialect<R: CommandRunner>(runner: &mut R, mt: &str) -> Result<Dialect> {
    info!("- Determining the correct mt \"ready\" string");
    let uname = sysname()?;
    debug!("uname: {}", uname);

    if uname != "Linux" {
        return Dialect::from_sysname(&uname).ok_or(Error::UnsupportedPlatform { uname });
    }

    let debian = Path::new(DEBIAN_VERSION_FILE).is_file();
    // the version banner goes to stderr on some mt builds
    let version = runner.run(&format!("{mt} --version 2>&1"))?;
    let dialect = Dialect::for_linux(debian, &version.stdout);
    debug!(debian, %dialect, "linux dialect");

    Ok(dialect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_markers_are_distinct() {
        let mut markers: Vec<_> = Dialect::ALL.iter().map(|d| d.ready_marker()).collect();
        markers.sort();
        markers.dedup();
        assert_eq!(markers.len(), Dialect::ALL.len());
    }

    #[test]
    fn test_from_sysname() {
        assert_eq!(Dialect::from_sysname("SunOS"), Some(Dialect::SunOs));
        assert_eq!(Dialect::from_sysname("FreeBSD"), Some(Dialect::FreeBsd));
        assert_eq!(Dialect::from_sysname("OpenBSD"), Some(Dialect::OpenBsd));
        assert_eq!(Dialect::from_sysname("Linux"), None);
        assert_eq!(Dialect::from_sysname("Darwin"), None);
    }

    #[test]
    fn test_for_linux() {
        assert_eq!(
            Dialect::for_linux(true, "mt-st v. 1.4\n"),
            Dialect::MtSt
        );
        assert_eq!(Dialect::for_linux(true, ""), Dialect::GnuCpio);
        assert_eq!(
            Dialect::for_linux(false, "mt (GNU cpio) 2.13\n"),
            Dialect::GnuCpio
        );
        assert_eq!(Dialect::for_linux(false, "mt-st v. 1.7\n"), Dialect::MtSt);
    }

    #[test]
    fn test_parse_dialect() {
        assert_eq!("mt-st".parse::<Dialect>().unwrap(), Dialect::MtSt);
        assert_eq!("FreeBSD".parse::<Dialect>().unwrap(), Dialect::FreeBsd);
        assert!(matches!(
            "plan9".parse::<Dialect>(),
            Err(Error::UnknownDialect { .. })
        ));
    }
}
