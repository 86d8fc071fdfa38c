use std::{path::Path, process::Command};

use anyhow::{bail, Context, Error};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use gadget_api::status::{DiskSchema, OnDiskStructure, OnDiskVolume};
use sysdefs::partition_types::PartitionTypeCode;

use crate::exe::RunAndCheck;

/// Unit of the START column, independent of the logical sector size.
const SYSFS_SECTOR_SIZE: u64 = 512;

/// Size in bytes of the GPT partition entry array.
const GPT_ENTRY_ARRAY_SIZE: u64 = 128 * 128;

const DEFAULT_SECTOR_SIZE: u64 = 512;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct LsBlkOutput {
    pub blockdevices: Vec<BlockDevice>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BlockDevice {
    pub name: String,
    #[serde(rename = "kname")]
    pub kernel_name: Option<String>,
    #[serde(rename = "type")]
    pub device_type: String,
    pub size: u64,
    #[serde(rename = "log-sec")]
    pub logical_sector_size: Option<u64>,
    #[serde(rename = "fstype")]
    pub filesystem_type: Option<String>,
    #[serde(rename = "label")]
    pub filesystem_label: Option<String>,
    #[serde(rename = "uuid")]
    pub filesystem_uuid: Option<String>,
    #[serde(rename = "pttype")]
    pub table_type: Option<String>,
    #[serde(rename = "ptuuid")]
    pub table_uuid: Option<String>,
    #[serde(rename = "parttype")]
    pub part_type: Option<String>,
    #[serde(rename = "partlabel")]
    pub part_label: Option<String>,
    #[serde(rename = "partuuid")]
    pub part_uuid: Option<String>,
    #[serde(rename = "partn")]
    pub part_number: Option<usize>,
    /// Start of the partition in 512 byte units.
    pub start: Option<u64>,
    pub children: Option<Vec<BlockDevice>>,
}

/// Runs lsblk on the given disk and returns the devices it reports.
pub fn run(device_path: impl AsRef<Path>) -> Result<Vec<BlockDevice>, Error> {
    let result = Command::new("lsblk")
        .arg("--json")
        .arg("--path")
        .arg("--bytes")
        .arg("--output-all")
        .arg(device_path.as_ref())
        .output_and_check()
        .context("Failed execute lsblk")?;

    let parsed = parse_lsblk_output(result.as_str());
    if parsed.is_err() {
        warn!("lsblk output: {}", result);
    }

    parsed
}

fn parse_lsblk_output(output: &str) -> Result<Vec<BlockDevice>, Error> {
    let parsed: LsBlkOutput =
        serde_json::from_str(output).context("Failed to parse lsblk output")?;

    Ok(parsed.blockdevices)
}

/// Reads the partition table of a disk.
pub fn probe(device_path: impl AsRef<Path>) -> Result<OnDiskVolume, Error> {
    let device_path = device_path.as_ref();
    let devices = run(device_path)?;
    let Some(disk) = devices.first() else {
        bail!("lsblk did not report device '{}'", device_path.display());
    };

    to_on_disk_volume(disk)
        .with_context(|| format!("Failed to read partition table of '{}'", device_path.display()))
}

/// Number of sectors at the end of a GPT disk holding the backup header and
/// partition entry array.
fn gpt_backup_sectors(sector_size: u64) -> u64 {
    1 + (GPT_ENTRY_ARRAY_SIZE + sector_size - 1) / sector_size
}

/// Partition number from the trailing digits of a device node, e.g. 2 for
/// /dev/mmcblk0p2.
fn number_from_node(node: &str) -> Option<usize> {
    let digits = node
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();
    digits.chars().rev().collect::<String>().parse().ok()
}

/// Converts an lsblk disk entry and its partitions into an `OnDiskVolume`.
pub fn to_on_disk_volume(disk: &BlockDevice) -> Result<OnDiskVolume, Error> {
    if disk.device_type != "disk" {
        bail!(
            "Device '{}' is of type '{}', expected a disk",
            disk.name,
            disk.device_type
        );
    }

    let schema = match disk.table_type.as_deref() {
        Some("gpt") => DiskSchema::Gpt,
        Some("dos") => DiskSchema::Dos,
        Some(other) => bail!("Unsupported partition table type '{other}' on '{}'", disk.name),
        None => bail!("Device '{}' has no partition table", disk.name),
    };

    let sector_size = disk.logical_sector_size.unwrap_or(DEFAULT_SECTOR_SIZE);
    if sector_size == 0 {
        bail!("Device '{}' reports a sector size of 0", disk.name);
    }
    let total_sectors = disk.size / sector_size;
    let usable_sectors_end = match schema {
        DiskSchema::Gpt => total_sectors.saturating_sub(gpt_backup_sectors(sector_size)),
        DiskSchema::Dos => total_sectors,
    };

    let mut structures = Vec::new();
    for (position, part) in disk
        .children
        .iter()
        .flatten()
        .filter(|child| child.device_type == "part")
        .enumerate()
    {
        let Some(start) = part.start else {
            bail!(
                "lsblk does not report the start offset of partition '{}'",
                part.name
            );
        };

        let partition_type = part
            .part_type
            .as_deref()
            .map(|t| PartitionTypeCode::from(t).to_string())
            .unwrap_or_default();
        let disk_index = part
            .part_number
            .or_else(|| number_from_node(&part.name))
            .unwrap_or(position + 1);

        debug!(
            "Found partition '{}' (#{disk_index}, type '{partition_type}') at {} with size {}",
            part.name,
            start * SYSFS_SECTOR_SIZE,
            part.size
        );

        structures.push(OnDiskStructure {
            node: part.name.clone(),
            kernel_path: part.kernel_name.clone(),
            name: match schema {
                DiskSchema::Gpt => part.part_label.clone(),
                DiskSchema::Dos => None,
            },
            partition_type,
            partition_uuid: part.part_uuid.clone(),
            filesystem_type: part.filesystem_type.clone(),
            filesystem_label: part.filesystem_label.clone(),
            filesystem_uuid: part.filesystem_uuid.clone(),
            start_offset: start * SYSFS_SECTOR_SIZE,
            size: part.size,
            disk_index,
        });
    }
    structures.sort_by_key(|s| s.start_offset);

    Ok(OnDiskVolume {
        device: disk.name.clone(),
        kernel_path: disk.kernel_name.clone(),
        schema,
        id: disk.table_uuid.clone().unwrap_or_default(),
        size: disk.size,
        sector_size,
        usable_sectors_end,
        structures,
    })
}
