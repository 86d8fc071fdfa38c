//! Records describing the partition table actually found on a disk.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::config::Schema;

/// Partition table kind reported for a disk.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiskSchema {
    Gpt,
    /// MBR partition table, reported as "dos" by the partitioning tools.
    #[serde(alias = "mbr")]
    Dos,
}

impl DiskSchema {
    /// The gadget schema describing this kind of partition table.
    pub fn gadget_schema(&self) -> Schema {
        match self {
            DiskSchema::Gpt => Schema::Gpt,
            DiskSchema::Dos => Schema::Mbr,
        }
    }
}

/// A disk and its partitions as probed from the system.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct OnDiskVolume {
    /// Device node of the disk, e.g. /dev/sda.
    pub device: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_path: Option<String>,

    pub schema: DiskSchema,

    /// Disk GUID on GPT disks, the disk signature on MBR disks.
    #[serde(default)]
    pub id: String,

    /// Size of the disk in bytes.
    pub size: u64,

    pub sector_size: u64,

    /// One past the last sector usable for partitions.
    pub usable_sectors_end: u64,

    #[serde(default)]
    pub structures: Vec<OnDiskStructure>,
}

impl OnDiskVolume {
    /// Number of bytes usable for partitions.
    pub fn usable_size(&self) -> u64 {
        self.usable_sectors_end.saturating_mul(self.sector_size)
    }

    pub fn structure_by_node(&self, node: &str) -> Option<&OnDiskStructure> {
        self.structures.iter().find(|s| s.node == node)
    }
}

/// A partition of a probed disk.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct OnDiskStructure {
    /// Device node of the partition, e.g. /dev/sda1.
    pub node: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_path: Option<String>,

    /// Partition name. Only meaningful on GPT disks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Partition type GUID on GPT disks, the two hex digit type on MBR disks.
    #[serde(default)]
    pub partition_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem_uuid: Option<String>,

    pub start_offset: u64,

    pub size: u64,

    /// One based partition number.
    #[serde(default)]
    pub disk_index: usize,
}

impl OnDiskStructure {
    /// Name used for the partition in diagnostics.
    pub fn describe(&self) -> &str {
        &self.node
    }
}
