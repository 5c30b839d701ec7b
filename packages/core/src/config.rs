//! Discovery configuration.
//!
//! Every option has a default, so an empty TOML file (or none at all) is a
//! valid configuration. Command-line flags are applied on top by the CLI.
//!
//! ```toml
//! skip_libraries = ["scsi-SSTK_L700_XYZZY_A"]
//! settle_secs = 15
//! offline = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::changer::TapeTools;
use crate::error::{ConfigParseSnafu, IoResultExt, Result};
use crate::executor::PrivilegeEscalation;
use crate::platform::Dialect;

/// Default directory of persistent tape device links.
pub const DEFAULT_BY_ID_DIR: &str = "/dev/tape/by-id";

/// Default wait after a load before drives are queried.
pub const DEFAULT_SETTLE_SECS: u64 = 10;

/// Default Bacula changer script invocation.
pub const DEFAULT_CHANGER_COMMAND: &str = "/opt/bacula/scripts/mtx-changer %c %o %S %a %d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Library by-id identifiers excluded from discovery.
    pub skip_libraries: Vec<String>,
    /// Seconds to wait after each load.
    pub settle_secs: u64,
    /// Send `mt offline` to every drive before discovery.
    pub offline: bool,
    /// Log every command with its exit code and output.
    pub debug: bool,
    /// Forces a status dialect instead of detecting it.
    pub dialect: Option<Dialect>,
    pub by_id_dir: PathBuf,
    pub mtx: String,
    pub mt: String,
    pub lsscsi: String,
    /// `ChangerCommand` written into the autochanger resource.
    pub changer_command: String,
    pub escalation: PrivilegeEscalation,
    /// Output directory. A timestamped directory under the system temp
    /// directory is used when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            skip_libraries: Vec::new(),
            settle_secs: DEFAULT_SETTLE_SECS,
            offline: false,
            debug: false,
            dialect: None,
            by_id_dir: PathBuf::from(DEFAULT_BY_ID_DIR),
            mtx: "mtx".to_string(),
            mt: "mt".to_string(),
            lsscsi: "lsscsi".to_string(),
            changer_command: DEFAULT_CHANGER_COMMAND.to_string(),
            escalation: PrivilegeEscalation::None,
            work_dir: None,
        }
    }
}

impl DiscoveryConfig {
    /// Loads a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).config_read_context(path)?;
        parse(&content, path)
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        parse(content, Path::new("<inline>"))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    /// Returns true if the library is excluded from discovery.
    pub fn is_skipped(&self, library: &str) -> bool {
        self.skip_libraries.iter().any(|l| l == library)
    }

    pub fn tools(&self) -> TapeTools {
        TapeTools {
            mtx: self.mtx.clone(),
            mt: self.mt.clone(),
            by_id_dir: self.by_id_dir.clone(),
        }
    }
}

fn parse(content: &str, origin: &Path) -> Result<DiscoveryConfig> {
    toml::from_str(content).context(ConfigParseSnafu { path: origin })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.settle_delay(), Duration::from_secs(10));
        assert!(!config.offline);
        assert!(config.skip_libraries.is_empty());
        assert_eq!(config.tools(), TapeTools::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(
            DiscoveryConfig::from_toml("").unwrap(),
            DiscoveryConfig::default()
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
skip_libraries = ["scsi-SSTK_L700_XYZZY_A", "otherLibToSkip"]
settle_secs = 20
offline = true
dialect = "freebsd"
escalation = "sudo"
"#
        )
        .unwrap();

        let config = DiscoveryConfig::load(file.path()).unwrap();
        assert!(config.is_skipped("scsi-SSTK_L700_XYZZY_A"));
        assert!(!config.is_skipped("scsi-SSTK_L80_XYZZY_B"));
        assert_eq!(config.settle_secs, 20);
        assert!(config.offline);
        assert_eq!(config.dialect, Some(Dialect::FreeBsd));
        assert_eq!(config.escalation, PrivilegeEscalation::Sudo);
        assert_eq!(config.mtx, "mtx");
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "settle_secs = \"ten\"").unwrap();

        let err = DiscoveryConfig::load(file.path()).unwrap_err();
        match err {
            crate::Error::ConfigParse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
