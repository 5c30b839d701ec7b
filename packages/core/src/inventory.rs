//! Tape device inventory using `lsscsi` and the persistent by-id links.
//!
//! Kernel nodes (`sg3`, `st0`) are renumbered across reboots and rescans, so
//! every library and drive is addressed through its `/dev/tape/by-id` link
//! instead. Devices without such a link stay in the inventory as unresolved.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::CommandRunner;

/// SCSI device class of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Medium changer (tape library robot).
    Library,
    /// Sequential-access tape drive.
    Drive,
}

impl DeviceClass {
    /// Peripheral type column as printed by `lsscsi`.
    pub const fn lsscsi_type(&self) -> &'static str {
        match self {
            DeviceClass::Library => "mediumx",
            DeviceClass::Drive => "tape",
        }
    }

    /// Kernel node prefix the class is enumerated by.
    const fn node_prefix(&self) -> &'static str {
        match self {
            DeviceClass::Library => "sg",
            DeviceClass::Drive => "st",
        }
    }

    /// Name of the by-id link target for a kernel node.
    ///
    /// Drives resolve through their non-rewinding node so that status
    /// queries never rewind a loaded tape.
    fn link_target(&self, node: &str) -> String {
        match self {
            DeviceClass::Library => node.to_string(),
            DeviceClass::Drive => format!("n{node}"),
        }
    }
}

/// A library or drive found by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    pub class: DeviceClass,
    /// Kernel node name (e.g., "sg3", "st0").
    pub node: String,
    /// by-id link name (e.g., "scsi-SSTK_L700_XYZZY_A"). None if no link
    /// points at the node.
    pub stable_id: Option<String>,
}

impl DeviceNode {
    /// Returns true if a persistent identifier was found.
    pub fn is_resolved(&self) -> bool {
        self.stable_id.is_some()
    }
}

/// One symlink row of a by-id directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByIdLink {
    pub name: String,
    pub target: String,
}

impl ByIdLink {
    /// Final path component of the link target.
    fn target_name(&self) -> &str {
        Path::new(&self.target)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.target)
    }
}

/// Libraries and drives attached to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub libraries: Vec<DeviceNode>,
    pub drives: Vec<DeviceNode>,
}

impl Inventory {
    /// Builds an inventory from `lsscsi -g` output and a by-id listing.
    pub fn from_listings(lsscsi: &str, by_id: &str) -> Self {
        let links = parse_by_id_listing(by_id);
        let resolve = |class: DeviceClass| {
            list_nodes(lsscsi, class)
                .into_iter()
                .map(|node| DeviceNode {
                    class,
                    stable_id: resolve_stable_id(class, &node, &links),
                    node,
                })
                .collect::<Vec<_>>()
        };

        Self {
            libraries: resolve(DeviceClass::Library),
            drives: resolve(DeviceClass::Drive),
        }
    }

    /// Stable identifiers of resolved libraries, in node order.
    pub fn library_ids(&self) -> Vec<String> {
        stable_ids(&self.libraries)
    }

    /// Stable identifiers of resolved drives, in node order.
    pub fn drive_ids(&self) -> Vec<String> {
        stable_ids(&self.drives)
    }

    /// Devices without a persistent identifier.
    pub fn unresolved(&self) -> impl Iterator<Item = &DeviceNode> {
        self.libraries
            .iter()
            .chain(self.drives.iter())
            .filter(|d| !d.is_resolved())
    }
}

fn stable_ids(nodes: &[DeviceNode]) -> Vec<String> {
    nodes.iter().filter_map(|d| d.stable_id.clone()).collect()
}

/// Enumerates tape devices by running `lsscsi -g` and listing `by_id_dir`.
///
/// A failure of either command is fatal: without both listings nothing can
/// be addressed safely.
pub fn scan<R: CommandRunner>(runner: &mut R, lsscsi: &str, by_id_dir: &Path) -> Result<Inventory> {
    info!("- Getting the list of tape libraries' sg nodes and tape drives' st nodes");
    let scsi = runner.run_checked(&format!("{lsscsi} -g"))?;

    debug!("- Reading persistent identifiers from {}", by_id_dir.display());
    let by_id = runner.run_checked(&format!("ls -la {}", by_id_dir.display()))?;

    let inventory = Inventory::from_listings(&scsi.stdout, &by_id.stdout);
    log_inventory(&inventory);

    Ok(inventory)
}

fn log_inventory(inventory: &Inventory) {
    let count = |n: usize, one: &str, many: &str| format!("{} {}", n, if n == 1 { one } else { many });

    info!(
        " - Found {}",
        count(inventory.libraries.len(), "library", "libraries")
    );
    for lib in &inventory.libraries {
        info!(
            "  - Library {} => {}",
            lib.node,
            lib.stable_id.as_deref().unwrap_or("(no by-id node)")
        );
    }
    info!(" - Found {}", count(inventory.drives.len(), "drive", "drives"));
    for drive in &inventory.drives {
        info!(
            "  - Tape drive {} => {}",
            drive.node,
            drive.stable_id.as_deref().unwrap_or("(no by-id node)")
        );
    }
    for device in inventory.unresolved() {
        warn!(
            "{:?} node {} has no persistent identifier and cannot be mapped",
            device.class, device.node
        );
    }
}

/// Lists kernel nodes of one device class from `lsscsi -g` output.
///
/// Nodes are sorted by their number.
pub fn list_nodes(lsscsi: &str, class: DeviceClass) -> Vec<String> {
    let prefix = class.node_prefix();
    let mut nodes: Vec<String> = lsscsi
        .lines()
        .filter(|line| line.split_whitespace().nth(1) == Some(class.lsscsi_type()))
        .filter_map(|line| {
            line.split_whitespace()
                .filter_map(|field| field.rsplit('/').next())
                .find(|name| node_number(name, prefix).is_some())
                .map(str::to_string)
        })
        .collect();

    nodes.sort_by_key(|node| node_number(node, prefix));
    nodes.dedup();
    nodes
}

fn node_number(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.parse().ok()
}

/// Parses the symlink rows of an `ls -la` listing.
pub fn parse_by_id_listing(listing: &str) -> Vec<ByIdLink> {
    listing
        .lines()
        .filter_map(|line| {
            let (left, target) = line.split_once(" -> ")?;
            let name = left.split_whitespace().last()?;
            Some(ByIdLink {
                name: name.to_string(),
                target: target.trim().to_string(),
            })
        })
        .collect()
}

/// Finds the persistent identifier of a kernel node.
///
/// `scsi-` links are preferred when several names point at the same node.
pub fn resolve_stable_id(class: DeviceClass, node: &str, links: &[ByIdLink]) -> Option<String> {
    let wanted = class.link_target(node);
    let mut matching = links.iter().filter(|l| l.target_name() == wanted);
    let first = matching.next()?;

    if first.name.starts_with("scsi-") {
        return Some(first.name.clone());
    }
    let preferred = matching
        .find(|l| l.name.starts_with("scsi-"))
        .unwrap_or(first);
    Some(preferred.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LSSCSI: &str = "\
[0:0:0:0]    disk    ATA      Samsung SSD 860  4B6Q  /dev/sda   /dev/sg0
[3:0:0:0]    mediumx STK      L700             0105  /dev/sch0  /dev/sg13
[3:0:1:0]    tape    IBM      ULT3580-TD8      0105  /dev/st0   /dev/sg14
[3:0:2:0]    tape    IBM      ULT3580-TD8      0105  /dev/st1   /dev/sg15
[4:0:0:0]    mediumx STK      L80              0105  /dev/sch1  /dev/sg2
[4:0:1:0]    tape    HP       Ultrium 6-SCSI   0105  /dev/st10  /dev/sg16
";

    const SAMPLE_BY_ID: &str = "\
total 0
drwxr-xr-x 2 root root 280 Feb  3 10:00 .
drwxr-xr-x 4 root root  80 Feb  3 10:00 ..
lrwxrwxrwx 1 root root   9 Feb  3 10:00 scsi-SSTK_L700_XYZZY_A -> ../../sg13
lrwxrwxrwx 1 root root   9 Feb  3 10:00 scsi-SSTK_L80_XYZZY_B -> ../../sg2
lrwxrwxrwx 1 root root   9 Feb  3 10:00 scsi-350223344ab000100 -> ../../st0
lrwxrwxrwx 1 root root  10 Feb  3 10:00 scsi-350223344ab000100-nst -> ../../nst0
lrwxrwxrwx 1 root root   9 Feb  3 10:00 scsi-350223344ab000200 -> ../../st1
lrwxrwxrwx 1 root root  10 Feb  3 10:00 scsi-350223344ab000200-nst -> ../../nst1
";

    #[test]
    fn test_list_nodes() {
        assert_eq!(
            list_nodes(SAMPLE_LSSCSI, DeviceClass::Library),
            vec!["sg2", "sg13"]
        );
        assert_eq!(
            list_nodes(SAMPLE_LSSCSI, DeviceClass::Drive),
            vec!["st0", "st1", "st10"]
        );
    }

    #[test]
    fn test_list_nodes_empty() {
        assert!(list_nodes("", DeviceClass::Library).is_empty());
        assert!(list_nodes(SAMPLE_LSSCSI.lines().next().unwrap(), DeviceClass::Drive).is_empty());
    }

    #[test]
    fn test_parse_by_id_listing() {
        let links = parse_by_id_listing(SAMPLE_BY_ID);
        assert_eq!(links.len(), 6);
        assert_eq!(links[0].name, "scsi-SSTK_L700_XYZZY_A");
        assert_eq!(links[0].target, "../../sg13");
    }

    #[test]
    fn test_resolve_library_by_exact_node() {
        let links = parse_by_id_listing(SAMPLE_BY_ID);
        assert_eq!(
            resolve_stable_id(DeviceClass::Library, "sg13", &links).as_deref(),
            Some("scsi-SSTK_L700_XYZZY_A")
        );
        // sg1 must not match the sg13 link
        assert_eq!(resolve_stable_id(DeviceClass::Library, "sg1", &links), None);
    }

    #[test]
    fn test_resolve_drive_uses_non_rewinding_link() {
        let links = parse_by_id_listing(SAMPLE_BY_ID);
        assert_eq!(
            resolve_stable_id(DeviceClass::Drive, "st1", &links).as_deref(),
            Some("scsi-350223344ab000200-nst")
        );
    }

    #[test]
    fn test_resolve_prefers_scsi_links() {
        let links = vec![
            ByIdLink {
                name: "wwn-0x5002".to_string(),
                target: "../../sg5".to_string(),
            },
            ByIdLink {
                name: "scsi-SQUANTUM_SCALAR".to_string(),
                target: "../../sg5".to_string(),
            },
        ];
        assert_eq!(
            resolve_stable_id(DeviceClass::Library, "sg5", &links).as_deref(),
            Some("scsi-SQUANTUM_SCALAR")
        );
    }

    #[test]
    fn test_inventory_keeps_unresolved_devices() {
        let inventory = Inventory::from_listings(SAMPLE_LSSCSI, SAMPLE_BY_ID);

        assert_eq!(
            inventory.library_ids(),
            vec!["scsi-SSTK_L80_XYZZY_B", "scsi-SSTK_L700_XYZZY_A"]
        );
        assert_eq!(
            inventory.drive_ids(),
            vec!["scsi-350223344ab000100-nst", "scsi-350223344ab000200-nst"]
        );

        let unresolved: Vec<_> = inventory.unresolved().collect();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].node, "st10");
        assert_eq!(unresolved[0].class, DeviceClass::Drive);
    }
}
