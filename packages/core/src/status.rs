//! Status report parsing.
//!
//! `mtx status` and `mt status` only produce free text. This module extracts
//! drive counts, drive occupancy, full slots and drive readiness from it.
//!
//! A typical `mtx status` report looks like:
//!
//! ```text
//!   Storage Changer /dev/tape/by-id/scsi-SSTK_L700_XYZZY_A:2 Drives, 8 Slots ( 1 Import/Export )
//! Data Transfer Element 0:Full (Storage Element 3 Loaded):VolumeTag = G03003TA
//! Data Transfer Element 1:Empty
//!       Storage Element 1:Full :VolumeTag=G03001TA
//!       Storage Element 2:Empty
//!       Storage Element 8 IMPORT/EXPORT:Empty
//! ```

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::platform::Dialect;

/// Substring identifying cleaning cartridges by volume tag.
pub const CLEANING_TAPE_MARKER: &str = "CLN";

static DATA_TRANSFER_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Data Transfer Element (\d+):(Full|Empty)(.*)$")
        .expect("valid data transfer element regex")
});

static LOADED_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(Storage Element (\d+) Loaded\)").expect("valid loaded-from regex")
});

static VOLUME_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":\s*VolumeTag\s*=\s*(\S+)").expect("valid volume tag regex")
});

// Import/export elements carry a suffix before the colon and never match.
static FULL_STORAGE_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Storage Element (\d+):Full(?:\s*:\s*VolumeTag\s*=\s*(\S+))?")
        .expect("valid storage element regex")
});

/// A storage slot holding a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub number: u32,
    /// Barcode label, if the library has a reader.
    pub volume_tag: Option<String>,
}

impl Slot {
    /// Returns true if the volume tag marks a cleaning cartridge.
    pub fn is_cleaning(&self) -> bool {
        self.volume_tag
            .as_deref()
            .is_some_and(|tag| tag.contains(CLEANING_TAPE_MARKER))
    }

    /// Volume tag for log output.
    pub fn volume_label(&self) -> &str {
        self.volume_tag.as_deref().unwrap_or("(no tag)")
    }
}

/// A drive holding a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDrive {
    pub index: usize,
    /// Slot the volume was loaded from. None when the changer reports an
    /// unknown source element, so there is no slot to unload it into.
    pub source_slot: Option<u32>,
    pub volume_tag: Option<String>,
}

impl LoadedDrive {
    /// Volume tag for log output.
    pub fn volume_label(&self) -> &str {
        self.volume_tag.as_deref().unwrap_or("(no tag)")
    }
}

/// Counts the distinct drive elements a changer reports.
pub fn count_data_transfer_elements(status: &str) -> usize {
    DATA_TRANSFER_ELEMENT
        .captures_iter(status)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Finds the volume loaded in drive `index`.
///
/// An empty drive and a drive missing from the report both yield `None`.
/// A full drive is always reported, even when its source slot is unknown.
pub fn find_loaded_drive(status: &str, index: usize) -> Option<LoadedDrive> {
    DATA_TRANSFER_ELEMENT
        .captures_iter(status)
        .filter(|caps| caps[1].parse::<usize>().ok() == Some(index) && &caps[2] == "Full")
        .map(|caps| {
            let detail = &caps[3];
            LoadedDrive {
                index,
                source_slot: LOADED_FROM
                    .captures(detail)
                    .and_then(|c| c[1].parse().ok()),
                volume_tag: VOLUME_TAG.captures(detail).map(|c| c[1].to_string()),
            }
        })
        .next()
}

/// Lists full storage slots, skipping cleaning cartridges.
pub fn list_full_slots(status: &str) -> Vec<Slot> {
    FULL_STORAGE_ELEMENT
        .captures_iter(status)
        .filter_map(|caps| {
            Some(Slot {
                number: caps[1].parse().ok()?,
                volume_tag: caps.get(2).map(|m| m.as_str().to_string()),
            })
        })
        .filter(|slot| !slot.is_cleaning())
        .collect()
}

/// Returns true if `mt status` output shows a loaded, ready drive.
pub fn is_drive_ready(status: &str, dialect: Dialect) -> bool {
    status.contains(dialect.ready_marker())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_MTX_STATUS: &str = "  Storage Changer /dev/tape/by-id/scsi-SSTK_L700_XYZZY_A:4 Drives, 10 Slots ( 1 Import/Export )
Data Transfer Element 0:Empty
Data Transfer Element 1:Full (Storage Element 3 Loaded):VolumeTag = G03003TA
Data Transfer Element 2:Full (Storage Element 9 Loaded)
Data Transfer Element 3:Empty
      Storage Element 1:Full :VolumeTag=G03001TA
      Storage Element 2:Full :VolumeTag=CLN001L8
      Storage Element 3:Empty
      Storage Element 4:Full :VolumeTag=G03004TA
      Storage Element 5:Empty
      Storage Element 6:Full
      Storage Element 7:Empty
      Storage Element 8:Empty
      Storage Element 9:Empty
      Storage Element 10 IMPORT/EXPORT:Full :VolumeTag=G03010TA
";

    #[test]
    fn test_count_data_transfer_elements() {
        assert_eq!(count_data_transfer_elements(SAMPLE_MTX_STATUS), 4);
        assert_eq!(count_data_transfer_elements(""), 0);
        assert_eq!(
            count_data_transfer_elements("  Storage Changer /dev/sg3:0 Drives, 2 Slots\n"),
            0
        );
    }

    #[test]
    fn test_count_ignores_duplicate_records() {
        let status = "Data Transfer Element 0:Empty\nData Transfer Element 0:Empty\n";
        assert_eq!(count_data_transfer_elements(status), 1);
    }

    #[test]
    fn test_find_loaded_drive_full() {
        let loaded = find_loaded_drive(SAMPLE_MTX_STATUS, 1).unwrap();
        assert_eq!(loaded.index, 1);
        assert_eq!(loaded.source_slot, Some(3));
        assert_eq!(loaded.volume_tag.as_deref(), Some("G03003TA"));
    }

    #[test]
    fn test_find_loaded_drive_without_barcode() {
        let loaded = find_loaded_drive(SAMPLE_MTX_STATUS, 2).unwrap();
        assert_eq!(loaded.source_slot, Some(9));
        assert_eq!(loaded.volume_tag, None);
    }

    #[test]
    fn test_find_loaded_drive_with_unknown_source() {
        let status = "Data Transfer Element 0:Full (Unknown Storage Element Loaded):VolumeTag = G03003TA\n";

        assert_eq!(count_data_transfer_elements(status), 1);
        let loaded = find_loaded_drive(status, 0).unwrap();
        assert_eq!(loaded.source_slot, None);
        assert_eq!(loaded.volume_label(), "G03003TA");
    }

    #[test]
    fn test_find_loaded_drive_empty_or_absent() {
        assert!(find_loaded_drive(SAMPLE_MTX_STATUS, 0).is_none());
        assert!(find_loaded_drive(SAMPLE_MTX_STATUS, 3).is_none());
        assert!(find_loaded_drive(SAMPLE_MTX_STATUS, 7).is_none());
    }

    #[test]
    fn test_find_loaded_drive_does_not_match_index_prefix() {
        let status = "Data Transfer Element 11:Full (Storage Element 4 Loaded):VolumeTag = X\n";
        assert!(find_loaded_drive(status, 1).is_none());
        assert_eq!(find_loaded_drive(status, 11).unwrap().source_slot, Some(4));
    }

    #[test]
    fn test_find_loaded_drive_independent_of_line_order() {
        let mut lines: Vec<&str> = SAMPLE_MTX_STATUS.lines().collect();
        lines.reverse();
        let reordered = lines.join("\n");

        assert_eq!(
            find_loaded_drive(&reordered, 1),
            find_loaded_drive(SAMPLE_MTX_STATUS, 1)
        );
        assert!(find_loaded_drive(&reordered, 0).is_none());
    }

    #[test]
    fn test_list_full_slots_skips_cleaning_and_import_export() {
        let slots = list_full_slots(SAMPLE_MTX_STATUS);
        let numbers: Vec<u32> = slots.iter().map(|s| s.number).collect();

        assert_eq!(numbers, vec![1, 4, 6]);
        assert!(slots.iter().all(|s| !s.is_cleaning()));
        assert_eq!(slots[0].volume_tag.as_deref(), Some("G03001TA"));
        assert_eq!(slots[2].volume_tag, None);
    }

    #[test]
    fn test_is_drive_ready() {
        let mt_st = "SCSI 2 tape drive:\nFile number=0, block number=0, partition=0.\n\
                     General status bits on (41010000):\n BOT ONLINE IM_REP_EN\n";
        let empty = "SCSI 2 tape drive:\nGeneral status bits on (50000):\n DR_OPEN IM_REP_EN\n";

        assert!(is_drive_ready(mt_st, Dialect::MtSt));
        assert!(!is_drive_ready(empty, Dialect::MtSt));
        assert!(!is_drive_ready(mt_st, Dialect::FreeBsd));
        assert!(is_drive_ready(
            "Mode      Density\nCurrent Driver State: at rest.\n",
            Dialect::FreeBsd
        ));
        assert!(is_drive_ready("st0: ds=3<Mounted> er=0", Dialect::OpenBsd));
    }
}
