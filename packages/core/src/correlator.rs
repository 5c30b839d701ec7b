//! Drive-index correlation.
//!
//! A changer addresses its drives by position (the Bacula `DriveIndex`),
//! while the host addresses them by device node. Nothing reports how the
//! two relate, so the mapping is found by loading a tape into each index in
//! turn and asking every not-yet-matched drive whether it now holds media.
//!
//! The run is strictly sequential. Libraries are processed one after the
//! other, and a drive matched in one library is never tested again in the
//! next.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::changer::TapeTools;
use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::executor::{CommandRunner, Settle};
use crate::inventory::DeviceNode;
use crate::platform::Dialect;
use crate::status::Slot;

/// A drive identified at a changer position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    /// by-id identifier of the drive.
    pub drive: String,
    /// Changer position (Bacula `DriveIndex`).
    pub index: usize,
}

/// Correlation state of one library.
///
/// Entries only grow. Each index and each drive appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryCorrelation {
    pub library: String,
    pub drive_count: usize,
    /// The library was on the skip list and never touched.
    pub skipped: bool,
    pub entries: Vec<CorrelationEntry>,
}

impl LibraryCorrelation {
    pub fn new(library: impl Into<String>, drive_count: usize) -> Self {
        Self {
            library: library.into(),
            drive_count,
            skipped: false,
            entries: Vec::new(),
        }
    }

    pub fn skipped(library: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::new(library, 0)
        }
    }

    fn record(&mut self, drive: String, index: usize) {
        debug_assert!(self.drive_for_index(index).is_none());
        debug_assert!(self.entries.iter().all(|e| e.drive != drive));
        self.entries.push(CorrelationEntry { drive, index });
    }

    /// Drive identified at `index`, if any.
    pub fn drive_for_index(&self, index: usize) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.index == index)
            .map(|e| e.drive.as_str())
    }

    /// Indexes for which no drive reported ready.
    pub fn unmapped_indexes(&self) -> Vec<usize> {
        (0..self.drive_count)
            .filter(|&i| self.drive_for_index(i).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.len() == self.drive_count
    }
}

/// Drive identifiers not yet matched to any index, in inventory order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemainingDrives {
    ids: Vec<String>,
}

impl RemainingDrives {
    pub fn new(ids: impl IntoIterator<Item = String>) -> Self {
        let mut remaining = Self::default();
        for id in ids {
            if !remaining.ids.contains(&id) {
                remaining.ids.push(id);
            }
        }
        remaining
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Removes a matched identifier. Returns false if it was not present.
    fn take(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|d| d != id);
        self.ids.len() != before
    }

    /// Identifiers left over, sorted.
    pub fn into_sorted(mut self) -> Vec<String> {
        self.ids.sort();
        self.ids
    }
}

/// Outcome of a whole discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationReport {
    /// One entry per library, in inventory order.
    pub libraries: Vec<LibraryCorrelation>,
    /// Drives no library claimed, sorted.
    pub standalone: Vec<String>,
    /// Devices found without a persistent identifier. They can never be
    /// mapped.
    #[serde(default)]
    pub unresolved: Vec<DeviceNode>,
}

impl CorrelationReport {
    /// Records the devices the inventory could not resolve.
    pub fn with_unresolved<'i>(mut self, devices: impl IntoIterator<Item = &'i DeviceNode>) -> Self {
        self.unresolved = devices.into_iter().cloned().collect();
        self
    }

    /// Libraries with at least one identified drive.
    pub fn mapped_libraries(&self) -> impl Iterator<Item = &LibraryCorrelation> {
        self.libraries.iter().filter(|l| !l.entries.is_empty())
    }
}

/// Picks a slot uniformly at random.
///
/// Slot numbers say nothing about drive positions, so no order is assumed.
pub fn pick_random_slot<'a, G: Rng>(slots: &'a [Slot], rng: &mut G) -> Option<&'a Slot> {
    if slots.is_empty() {
        return None;
    }
    Some(&slots[rng.random_range(0..slots.len())])
}

/// Runs the load/probe/unload cycle against the attached libraries.
pub struct Correlator<'a, R, S> {
    runner: &'a mut R,
    settle: &'a mut S,
    config: &'a DiscoveryConfig,
    tools: TapeTools,
    dialect: Dialect,
    rng: StdRng,
}

impl<'a, R: CommandRunner, S: Settle> Correlator<'a, R, S> {
    pub fn new(runner: &'a mut R, settle: &'a mut S, config: &'a DiscoveryConfig, dialect: Dialect) -> Self {
        Self {
            runner,
            settle,
            config,
            tools: config.tools(),
            dialect,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Replaces the slot picker's random source.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Correlates every drive of every non-skipped library.
    ///
    /// Any failed changer command aborts the whole run: once a load or
    /// unload has failed, the position of the media is unknown.
    pub fn run(&mut self, libraries: &[String], drives: &[String]) -> Result<CorrelationReport> {
        let mut remaining = RemainingDrives::new(drives.iter().cloned());

        if self.config.offline {
            info!("- The 'offline' option is set, sending all drives offline command");
            for drive in remaining.iter() {
                self.tools.offline(self.runner, drive)?;
            }
        } else {
            info!("- The 'offline' option is not set, skip sending offline commands");
        }

        info!("Unloading all tape drives in the ({}) libraries found", libraries.len());
        for library in libraries {
            if self.config.is_skipped(library) {
                continue;
            }
            self.preclear(library)?;
        }

        info!("Iterating through each library found");
        let mut report = CorrelationReport::default();
        for library in libraries {
            if self.config.is_skipped(library) {
                info!("- Skipping library: {}", library);
                report.libraries.push(LibraryCorrelation::skipped(library.as_str()));
                continue;
            }
            report.libraries.push(self.discover(library, &mut remaining)?);
        }

        report.standalone = remaining.into_sorted();
        Ok(report)
    }

    /// Unloads every occupied drive of a library back to its home slot.
    ///
    /// Returns the library's drive count. A drive whose volume has no known
    /// source slot aborts with [`Error::DriveOccupied`].
    pub fn preclear(&mut self, library: &str) -> Result<usize> {
        let drive_count = self.tools.drive_count(self.runner, library)?;
        info!("{}: Unloading ({}) tape drives", library, drive_count);

        for index in 0..drive_count {
            info!("- Checking if a tape is in drive {}", index);
            let Some(loaded) = self.tools.loaded(self.runner, library, index)? else {
                continue;
            };
            let Some(slot) = loaded.source_slot else {
                return Err(Error::DriveOccupied {
                    library: library.to_string(),
                    index,
                    volume: loaded.volume_label().to_string(),
                });
            };
            info!(
                "  - Unloading volume {} from drive {} to slot {}",
                loaded.volume_label(),
                index,
                slot
            );
            self.tools.unload(self.runner, library, slot, index)?;
        }

        Ok(drive_count)
    }

    /// Identifies the drive at each index of one library.
    ///
    /// Matched identifiers are removed from `remaining`.
    pub fn discover(&mut self, library: &str, remaining: &mut RemainingDrives) -> Result<LibraryCorrelation> {
        let drive_count = self.tools.drive_count(self.runner, library)?;
        info!("Library '{}' with ({}) drives", library, drive_count);

        let mut correlation = LibraryCorrelation::new(library, drive_count);
        for index in 0..drive_count {
            if remaining.is_empty() {
                info!("- No untested drives left, stopping at DriveIndex {}", index);
                break;
            }
            self.probe_index(library, index, &mut correlation, remaining)?;
        }

        Ok(correlation)
    }

    fn probe_index(
        &mut self,
        library: &str,
        index: usize,
        correlation: &mut LibraryCorrelation,
        remaining: &mut RemainingDrives,
    ) -> Result<()> {
        info!("Identifying DriveIndex {}", index);

        let slots = self.tools.full_slots(self.runner, library)?;
        let slot = pick_random_slot(&slots, &mut self.rng)
            .cloned()
            .ok_or_else(|| Error::NoFullSlots {
                library: library.to_string(),
            })?;

        info!(
            "- Loading volume {} from slot {} into drive {}",
            slot.volume_label(),
            slot.number,
            index
        );
        self.tools.load(self.runner, library, slot.number, index)?;

        info!(
            "  - Sleeping {} seconds to allow drive to settle",
            self.config.settle_secs
        );
        self.settle.settle(self.config.settle_delay());

        match self.find_ready_drive(remaining)? {
            Some(drive) => {
                info!(
                    " - {}: Tape {} is loaded in {}",
                    self.dialect.ready_marker(),
                    slot.volume_label(),
                    self.tools.device_path(&drive)
                );
                info!("  - This is Bacula 'DriveIndex = {}'", index);
                remaining.take(&drive);
                correlation.record(drive, index);
                info!("   - Unloading drive {}", index);
            }
            None => {
                warn!(
                    "- No drive reported volume {} ready for DriveIndex {}",
                    slot.volume_label(),
                    index
                );
                info!("   - Returning volume to slot {}", slot.number);
            }
        }
        self.tools.unload(self.runner, library, slot.number, index)
    }

    /// First remaining drive reporting ready, in inventory order.
    fn find_ready_drive(&mut self, remaining: &RemainingDrives) -> Result<Option<String>> {
        for drive in remaining.iter() {
            if self.tools.drive_ready(self.runner, drive, self.dialect)? {
                return Ok(Some(drive.to_string()));
            }
            debug!(" - EMPTY: Drive by-id node '{}' is empty", drive);
        }
        Ok(None)
    }
}
