//! Persistence of the traits of the disks a gadget was installed to, so that
//! later updates can match volumes without probing again.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Error};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use gadget_api::{
    constants::DISK_MAPPING_FILENAME,
    status::{DiskSchema, OnDiskStructure, OnDiskVolume},
};

use crate::engine::{StructureEncryption, VolumeMatch};

/// Traits of the disk a volume was matched to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DiskVolumeDeviceTraits {
    pub device_path: String,

    #[serde(default)]
    pub kernel_path: String,

    #[serde(default)]
    pub disk_id: String,

    pub size: u64,

    pub sector_size: u64,

    #[serde(default)]
    pub usable_sectors_end: u64,

    pub schema: DiskSchema,

    /// Matched partitions, in declaration order of the gadget structures.
    #[serde(default)]
    pub structure: Vec<DeviceStructureTraits>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub structure_encryption: BTreeMap<String, StructureEncryption>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceStructureTraits {
    pub device_path: String,

    #[serde(default)]
    pub kernel_path: String,

    #[serde(default)]
    pub partition_uuid: String,

    /// GPT partition name.
    #[serde(default)]
    pub partition_label: String,

    #[serde(default)]
    pub partition_type: String,

    #[serde(default)]
    pub filesystem_uuid: String,

    #[serde(default)]
    pub filesystem_label: String,

    #[serde(default)]
    pub filesystem_type: String,

    pub offset: u64,

    pub size: u64,
}

impl From<&OnDiskStructure> for DeviceStructureTraits {
    fn from(ds: &OnDiskStructure) -> Self {
        Self {
            device_path: ds.node.clone(),
            kernel_path: ds.kernel_path.clone().unwrap_or_default(),
            partition_uuid: ds.partition_uuid.clone().unwrap_or_default(),
            partition_label: ds.name.clone().unwrap_or_default(),
            partition_type: ds.partition_type.clone(),
            filesystem_uuid: ds.filesystem_uuid.clone().unwrap_or_default(),
            filesystem_label: ds.filesystem_label.clone().unwrap_or_default(),
            filesystem_type: ds.filesystem_type.clone().unwrap_or_default(),
            offset: ds.start_offset,
            size: ds.size,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl DiskVolumeDeviceTraits {
    /// Records the disk a volume was matched to.
    pub fn from_match(
        disk: &OnDiskVolume,
        matched: &VolumeMatch,
        structure_encryption: BTreeMap<String, StructureEncryption>,
    ) -> Self {
        Self {
            device_path: disk.device.clone(),
            kernel_path: disk.kernel_path.clone().unwrap_or_default(),
            disk_id: disk.id.clone(),
            size: disk.size,
            sector_size: disk.sector_size,
            usable_sectors_end: disk.usable_sectors_end,
            schema: disk.schema,
            structure: matched
                .structures
                .values()
                .filter_map(|m| m.on_disk())
                .map(DeviceStructureTraits::from)
                .collect(),
            structure_encryption,
        }
    }

    /// Rebuilds the disk description the traits were recorded from.
    pub fn to_on_disk_volume(&self) -> OnDiskVolume {
        OnDiskVolume {
            device: self.device_path.clone(),
            kernel_path: non_empty(&self.kernel_path),
            schema: self.schema,
            id: self.disk_id.clone(),
            size: self.size,
            sector_size: self.sector_size,
            usable_sectors_end: self.usable_sectors_end,
            structures: self
                .structure
                .iter()
                .enumerate()
                .map(|(i, s)| OnDiskStructure {
                    node: s.device_path.clone(),
                    kernel_path: non_empty(&s.kernel_path),
                    name: non_empty(&s.partition_label),
                    partition_type: s.partition_type.clone(),
                    partition_uuid: non_empty(&s.partition_uuid),
                    filesystem_type: non_empty(&s.filesystem_type),
                    filesystem_label: non_empty(&s.filesystem_label),
                    filesystem_uuid: non_empty(&s.filesystem_uuid),
                    start_offset: s.offset,
                    size: s.size,
                    disk_index: i + 1,
                })
                .collect(),
        }
    }
}

/// Writes the traits of every volume to `disk-mapping.json` in `dir`. The
/// file is replaced atomically.
pub fn save_disk_volumes_device_traits(
    dir: impl AsRef<Path>,
    traits: &BTreeMap<String, DiskVolumeDeviceTraits>,
) -> Result<(), Error> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;

    let target = dir.join(DISK_MAPPING_FILENAME);
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in '{}'", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, traits)
            .context("Failed to serialize device traits")?;
        writer.flush().context("Failed to write device traits")?;
    }
    tmp.persist(&target)
        .with_context(|| format!("Failed to persist device traits to '{}'", target.display()))?;

    info!("Saved device traits of {} volume(s) to '{}'", traits.len(), target.display());
    Ok(())
}

/// Reads the traits written by [`save_disk_volumes_device_traits`]. A
/// missing or empty file means no traits were recorded.
pub fn load_disk_volumes_device_traits(
    dir: impl AsRef<Path>,
) -> Result<BTreeMap<String, DiskVolumeDeviceTraits>, Error> {
    let path = dir.as_ref().join(DISK_MAPPING_FILENAME);
    if !path.exists() {
        debug!("No device traits at '{}'", path.display());
        return Ok(BTreeMap::new());
    }

    let file = File::open(&path)
        .with_context(|| format!("Failed to open device traits '{}'", path.display()))?;
    let metadata = file
        .metadata()
        .with_context(|| format!("Failed to stat device traits '{}'", path.display()))?;
    if metadata.len() == 0 {
        debug!("Device traits file '{}' is empty", path.display());
        return Ok(BTreeMap::new());
    }

    serde_json::from_reader(file)
        .with_context(|| format!("Failed to parse device traits '{}'", path.display()))
}
