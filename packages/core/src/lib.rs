//! tapeindex-core: Core library for mapping tape drives to changer positions.
//!
//! A tape library's robot addresses its drives by position (Bacula's
//! `DriveIndex`), while the host sees them as device nodes. This library
//! discovers the mapping by loading media into each position and asking the
//! drives which one became ready, then renders the Bacula resources for it.
//!
//! # Modules
//!
//! - [`executor`]: Shell command execution and the settle wait
//! - [`platform`]: Drive status dialects and their detection
//! - [`status`]: `mtx status` and `mt status` parsing
//! - [`inventory`]: Library and drive enumeration via `lsscsi` and by-id links
//! - [`changer`]: `mtx` and `mt` control
//! - [`correlator`]: Load/probe/unload correlation of drives to indexes
//! - [`render`]: Bacula resource and summary rendering
//! - [`config`]: Discovery configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use tapeindex_core::{inventory, platform, render};
//! use tapeindex_core::{Correlator, DiscoveryConfig, ShellExecutor, ThreadSleep};
//!
//! let config = DiscoveryConfig::default();
//! let mut shell = ShellExecutor::with_escalation(config.escalation);
//! let mut settle = ThreadSleep;
//!
//! let dialect = platform::detect_dialect(&mut shell, &config.mt).unwrap();
//! let found = inventory::scan(&mut shell, &config.lsscsi, &config.by_id_dir).unwrap();
//!
//! let report = Correlator::new(&mut shell, &mut settle, &config, dialect)
//!     .run(&found.library_ids(), &found.drive_ids())
//!     .unwrap();
//!
//! let context = render::RenderContext::from_config(&config, "Created by example");
//! for resources in render::render_report(&report, &context) {
//!     println!("{}", resources.director_storage.content);
//! }
//! ```

pub mod changer;
pub mod config;
pub mod correlator;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod platform;
pub mod render;
pub mod status;

// Re-export commonly used types
pub use changer::TapeTools;
pub use config::DiscoveryConfig;
pub use correlator::{CorrelationEntry, CorrelationReport, Correlator, LibraryCorrelation};
pub use error::{Error, Result};
pub use executor::{CommandRunner, PrivilegeEscalation, Settle, ShellExecutor, ThreadSleep};
pub use inventory::Inventory;
pub use platform::Dialect;
pub use render::{RenderContext, RenderedResources};
