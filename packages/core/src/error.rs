//! Unified error types for the tapeindex-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to spawn a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// Command executed but returned non-zero exit code.
    #[snafu(display("command '{command}' exited with code {code}: {stderr}"))]
    CommandExit {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The operating system could not be identified.
    #[snafu(display("failed to identify the operating system"))]
    Uname { source: nix::Error },

    /// No mt ready dialect is known for this platform.
    #[snafu(display("unsupported platform '{uname}': no known mt ready marker"))]
    UnsupportedPlatform { uname: String },

    /// Unknown dialect name in configuration.
    #[snafu(display("unknown drive status dialect '{name}'"))]
    UnknownDialect { name: String },

    /// A library has no full, non-cleaning slot to load from.
    #[snafu(display("library {library} has no full non-cleaning slot to load"))]
    NoFullSlots { library: String },

    /// A drive holds media whose source slot the changer does not report.
    #[snafu(display(
        "drive {index} of library {library} holds volume {volume} from an unknown slot, unload it manually"
    ))]
    DriveOccupied {
        library: String,
        index: usize,
        volume: String,
    },

    /// Configuration file cannot be read.
    #[snafu(display("failed to read config at {}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for the expected schema.
    #[snafu(display("failed to parse config at {}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Work directory creation failed.
    #[snafu(display("failed to create work directory at {}", path.display()))]
    WorkDirCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a resource or report file.
    #[snafu(display("failed to write {}", path.display()))]
    OutputWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize the correlation report.
    #[snafu(display("failed to serialize report"))]
    ReportSerialize { source: serde_json::Error },
}

impl Error {
    /// Process exit code for this error.
    ///
    /// A failed external command propagates its own exit code so operators
    /// see the same errorlevel the hardware tool reported.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CommandExit { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for config read errors.
    fn config_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for work directory creation errors.
    fn work_dir_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for output file write errors.
    fn output_write_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn config_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(ConfigReadSnafu { path: path.into() })
    }

    fn work_dir_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(WorkDirCreationSnafu { path: path.into() })
    }

    fn output_write_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(OutputWriteSnafu { path: path.into() })
    }
}
