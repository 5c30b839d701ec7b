//! Bacula resource rendering.
//!
//! For every library with at least one identified drive three kinds of
//! resource are produced: a Director `Storage`, a Storage daemon
//! `Autochanger`, and one Storage daemon `Device` per drive. Rendering is
//! pure, the creation stamp is part of [`RenderContext`], so the same
//! correlation always yields byte-identical text.

use std::fs;
use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::info;

use crate::changer::device_path;
use crate::config::{DEFAULT_BY_ID_DIR, DEFAULT_CHANGER_COMMAND, DiscoveryConfig};
use crate::correlator::{CorrelationEntry, CorrelationReport};
use crate::error::{IoResultExt, ReportSerializeSnafu, Result};
use crate::inventory::DeviceClass;

/// File name of the JSON correlation report.
pub const REPORT_FILE_NAME: &str = "drive-index-map.json";

/// Values shared by every rendered resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    /// Text appended to every `Description`.
    pub created_by: String,
    pub by_id_dir: PathBuf,
    pub changer_command: String,
}

impl RenderContext {
    pub fn new(created_by: impl Into<String>) -> Self {
        Self {
            created_by: created_by.into(),
            by_id_dir: PathBuf::from(DEFAULT_BY_ID_DIR),
            changer_command: DEFAULT_CHANGER_COMMAND.to_string(),
        }
    }

    pub fn from_config(config: &DiscoveryConfig, created_by: impl Into<String>) -> Self {
        Self {
            created_by: created_by.into(),
            by_id_dir: config.by_id_dir.clone(),
            changer_command: config.changer_command.clone(),
        }
    }
}

/// Formats the creation stamp, e.g. `Created by tapeindex v0.1.0 - 20240203101500`.
pub fn created_by(program: &str, version: &str, stamp: &str) -> String {
    format!("Created by {program} v{version} - {stamp}")
}

/// Media type of a library: its identifier without the `scsi-` prefix.
pub fn media_type(library: &str) -> &str {
    library.strip_prefix("scsi-").unwrap_or(library)
}

/// Resource name of a library, e.g. `Autochanger_SSTK_L700_XYZZY_A`.
pub fn autochanger_name(library: &str) -> String {
    format!("Autochanger_{}", media_type(library))
}

/// One configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFile {
    pub file_name: String,
    pub content: String,
}

/// All resources of one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResources {
    pub autochanger_name: String,
    pub director_storage: ResourceFile,
    pub autochanger: ResourceFile,
    /// One per identified drive, ordered by `DriveIndex`.
    pub devices: Vec<ResourceFile>,
}

impl RenderedResources {
    pub fn files(&self) -> impl Iterator<Item = &ResourceFile> {
        [&self.director_storage, &self.autochanger]
            .into_iter()
            .chain(self.devices.iter())
    }

    /// Writes every file into `dir`, replacing existing files.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.files()
            .map(|file| {
                let path = dir.join(&file.file_name);
                fs::write(&path, &file.content).output_write_context(&path)?;
                info!(" - Wrote {}", path.display());
                Ok(path)
            })
            .collect()
    }
}

/// Renders the resources of one library.
///
/// Devices are named after their `DriveIndex`, so an index no drive claimed
/// leaves a gap in the names rather than shifting the others.
pub fn render(library: &str, entries: &[CorrelationEntry], context: &RenderContext) -> RenderedResources {
    let name = autochanger_name(library);
    let media_type = media_type(library);

    let mut entries: Vec<&CorrelationEntry> = entries.iter().collect();
    entries.sort_by_key(|e| e.index);

    let director_storage = format!(
        "Storage {{
  Name = \"{name}\"
  Description = \"Autochanger with ({count}) drives - {created_by}\"
  Address = \"127.0.0.1\"       # You *must* replace this with the correct FQDN!
  Password = \"wrongPassword\"  # You *must* replace this with the correct password for the SD @ Address
  Autochanger = \"{name}\"
  Device = \"{name}\"
  MaximumConcurrentJobs = {count}
  MediaType = \"{media_type}\"
  SdPort = 9103
}}
",
        count = entries.len(),
        created_by = context.created_by,
    );

    let device_names: Vec<String> = entries
        .iter()
        .map(|e| format!("{name}_Dev{}", e.index))
        .collect();

    let autochanger = format!(
        "Autochanger {{
  Name = \"{name}\"
  Description = \"{created_by}\"
  ChangerCommand = \"{changer_command}\"
  ChangerDevice = \"{changer_device}\"
  Device = {devices}
}}
",
        created_by = context.created_by,
        changer_command = context.changer_command,
        changer_device = device_path(&context.by_id_dir, library),
        devices = device_names
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", "),
    );

    let devices = entries
        .iter()
        .zip(&device_names)
        .map(|(entry, device_name)| ResourceFile {
            file_name: format!("StorageDevice_{device_name}.cfg"),
            content: format!(
                "Device {{
  Name = \"{device_name}\"
  Description = \"Drive {index} in {name} - {created_by}\"
  DriveIndex = {index}
  DeviceType = Tape
  MediaType = \"{media_type}\"
  Autochanger = yes
  AlwaysOpen = yes
  AutomaticMount = yes
  LabelMedia = no
  RandomAccess = no
  RemovableMedia = yes
  MaximumConcurrentJobs = 1
  ArchiveDevice = \"{archive_device}\"
}}
",
                index = entry.index,
                created_by = context.created_by,
                archive_device = device_path(&context.by_id_dir, &entry.drive),
            ),
        })
        .collect();

    RenderedResources {
        director_storage: ResourceFile {
            file_name: format!("DirectorStorage_{name}.cfg"),
            content: director_storage,
        },
        autochanger: ResourceFile {
            file_name: format!("StorageAutochanger_{name}.cfg"),
            content: autochanger,
        },
        devices,
        autochanger_name: name,
    }
}

/// Renders every library of a report that has identified drives.
pub fn render_report(report: &CorrelationReport, context: &RenderContext) -> Vec<RenderedResources> {
    report
        .mapped_libraries()
        .map(|lib| render(&lib.library, &lib.entries, context))
        .collect()
}

fn banner(title: &str, fill: char) -> String {
    let rule: String = std::iter::repeat_n(fill, title.len()).collect();
    format!("{rule}\n{title}\n{rule}")
}

/// Human-readable `ArchiveDevice => DriveIndex` summary.
pub fn render_summary(report: &CorrelationReport, by_id_dir: &Path) -> String {
    let mut out = String::from("[ Bacula Drive 'ArchiveDevice' => Bacula 'DriveIndex' settings ]\n");

    for lib in &report.libraries {
        out.push_str(&banner(&format!("Library: {}", lib.library), '-'));
        out.push('\n');
        if lib.entries.is_empty() {
            out.push_str("No drives were detected in this library, or it was intentionally skipped\n");
        }
        for entry in &lib.entries {
            out.push_str(&format!(
                "ArchiveDevice = {} => DriveIndex = {}\n",
                device_path(by_id_dir, &entry.drive),
                entry.index
            ));
        }
        out.push('\n');
    }

    if !report.standalone.is_empty() {
        let title = if report.standalone.len() > 1 {
            "Stand Alone Drives (May be in a library that was skipped)"
        } else {
            "Stand Alone Drive (May be in a library that was skipped)"
        };
        out.push_str(&banner(title, '-'));
        out.push('\n');
        out.push_str(&report.standalone.join(", "));
        out.push('\n');
    }

    if !report.unresolved.is_empty() {
        out.push_str(&banner("Devices Without A Persistent Identifier (Cannot Be Mapped)", '-'));
        out.push('\n');
        for device in &report.unresolved {
            let class = match device.class {
                DeviceClass::Library => "Library",
                DeviceClass::Drive => "Tape drive",
            };
            out.push_str(&format!("{} {}\n", class, device.node));
        }
    }

    out
}

/// Closing note naming the Director files that need a real address and
/// password before use.
pub fn render_reminder(work_dir: &Path, rendered: &[RenderedResources]) -> String {
    let mut out = format!(
        "DONE: Log file and Bacula resource configuration files in: {}\n",
        work_dir.display()
    );
    if rendered.is_empty() {
        out.push_str("NOTE: No library had identified drives, no resource files were written\n");
        return out;
    }

    out.push_str(&format!(
        "NOTE: Before use, you *MUST* edit the following Director Storage resource file{} in the directory above:\n",
        if rendered.len() > 1 { "s" } else { "" }
    ));
    for resources in rendered {
        out.push_str(&format!("      * {}\n", resources.director_storage.file_name));
    }
    out
}

/// Writes the correlation report as pretty JSON.
pub fn write_report(dir: &Path, report: &CorrelationReport) -> Result<PathBuf> {
    let path = dir.join(REPORT_FILE_NAME);
    let json = serde_json::to_string_pretty(report).context(ReportSerializeSnafu)?;
    fs::write(&path, json).output_write_context(&path)?;
    Ok(path)
}
