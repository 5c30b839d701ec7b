//! tapeindex - map tape drives to autochanger drive indexes.
//!
//! Discovers which host tape device sits at which position of each attached
//! library and writes ready-to-edit Bacula Director and Storage daemon
//! resources for them.

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tapeindex_core::{Dialect, DiscoveryConfig, PrivilegeEscalation};

/// Tape library drive index discovery.
#[derive(Parser, Debug)]
#[command(name = "tapeindex", version)]
#[command(about = "Map tape drives to autochanger DriveIndex values and write Bacula resources", long_about = None)]
struct Cli {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Load media into every drive position and write Bacula resources
    /// (default).
    ///
    /// This moves tapes. Make sure no backup job is using the libraries.
    Discover,

    /// List libraries and drives with their persistent identifiers.
    Inventory {
        /// Print the inventory as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Options shared by all subcommands. Each one overrides the config file.
#[derive(Args, Debug, Default)]
struct Options {
    /// TOML configuration file.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Library by-id identifier to leave untouched. May be repeated.
    #[arg(long = "skip-library", global = true, value_name = "ID")]
    skip_libraries: Vec<String>,

    /// Seconds to wait after each load before querying drives.
    #[arg(long, global = true, value_name = "SECS")]
    settle_secs: Option<u64>,

    /// Send `mt offline` to every drive before discovery.
    #[arg(long, global = true)]
    offline: bool,

    /// Log every command with its exit code and output.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Drive status dialect (mt-st, gnu-cpio, sunos, freebsd, openbsd).
    #[arg(long, global = true)]
    dialect: Option<Dialect>,

    /// Output directory for the log and resource files.
    #[arg(long, global = true, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Directory of persistent tape device links.
    #[arg(long, global = true, value_name = "DIR")]
    by_id_dir: Option<PathBuf>,

    /// Run hardware commands through non-interactive sudo.
    #[arg(long, global = true)]
    sudo: bool,
}

impl Options {
    /// Applies command-line overrides on top of a loaded configuration.
    fn apply(&self, mut config: DiscoveryConfig) -> DiscoveryConfig {
        for library in &self.skip_libraries {
            if !config.is_skipped(library) {
                config.skip_libraries.push(library.clone());
            }
        }
        if let Some(secs) = self.settle_secs {
            config.settle_secs = secs;
        }
        config.offline |= self.offline;
        config.debug |= self.debug;
        if self.dialect.is_some() {
            config.dialect = self.dialect;
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.by_id_dir {
            config.by_id_dir = dir.clone();
        }
        if self.sudo {
            config.escalation = PrivilegeEscalation::Sudo;
        }
        config
    }

    fn load_config(&self) -> tapeindex_core::Result<DiscoveryConfig> {
        let config = match &self.config {
            Some(path) => DiscoveryConfig::load(path)?,
            None => DiscoveryConfig::default(),
        };
        Ok(self.apply(config))
    }
}

fn main() {
    let cli = Cli::parse();

    let result = cli.options.load_config().and_then(|config| match cli.command {
        None | Some(Commands::Discover) => commands::discover(&config),
        Some(Commands::Inventory { json }) => commands::inventory(&config, json),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", snafu::Report::from_error(&e));
        std::process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_discover() {
        let cli = Cli::parse_from(["tapeindex"]);
        assert_eq!(cli.command, None);

        let config = cli.options.apply(DiscoveryConfig::default());
        assert_eq!(config, DiscoveryConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "tapeindex",
            "discover",
            "--skip-library",
            "scsi-SSTK_L700_XYZZY_A",
            "--skip-library",
            "otherLibToSkip",
            "--settle-secs",
            "30",
            "--offline",
            "--dialect",
            "FreeBSD",
            "--sudo",
        ]);
        assert_eq!(cli.command, Some(Commands::Discover));

        let base = DiscoveryConfig {
            skip_libraries: vec!["otherLibToSkip".to_string()],
            settle_secs: 5,
            ..Default::default()
        };
        let config = cli.options.apply(base);

        assert_eq!(
            config.skip_libraries,
            vec!["otherLibToSkip", "scsi-SSTK_L700_XYZZY_A"]
        );
        assert_eq!(config.settle_secs, 30);
        assert!(config.offline);
        assert_eq!(config.dialect, Some(Dialect::FreeBsd));
        assert_eq!(config.escalation, PrivilegeEscalation::Sudo);
    }

    #[test]
    fn test_unset_flags_keep_config_values() {
        let cli = Cli::parse_from(["tapeindex", "inventory", "--json"]);
        assert_eq!(cli.command, Some(Commands::Inventory { json: true }));

        let base = DiscoveryConfig {
            settle_secs: 25,
            offline: true,
            dialect: Some(Dialect::SunOs),
            ..Default::default()
        };
        let config = cli.options.apply(base.clone());
        assert_eq!(config, base);
    }

    #[test]
    fn test_rejects_unknown_dialect() {
        assert!(Cli::try_parse_from(["tapeindex", "--dialect", "amiga"]).is_err());
    }
}
