//! Reconciles a laid out gadget volume with the partition table of a disk.

use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use gadget_api::{
    config::{layout::valid_start_offset_range, Partial, Role, Schema, Volume, VolumeStructure},
    constants::{ENCRYPTED_LABEL_SUFFIX, IMPLICIT_SYSTEM_DATA_LABEL},
    error::{DiskMatchError, StructureMismatch},
    status::{OnDiskStructure, OnDiskVolume},
};
use sysdefs::{filesystems::BlockFilesystemType, osuuid::OsUuid};

/// Encryption methods a structure may be expected to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum EncryptionMethod {
    #[serde(rename = "LUKS")]
    #[strum(serialize = "LUKS")]
    Luks,

    /// Inline crypto engine. Recognised but not supported.
    #[serde(rename = "ICE")]
    #[strum(serialize = "ICE")]
    Ice,
}

/// Encryption expected for a structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StructureEncryption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Other parameters, carried along but not interpreted.
    #[serde(flatten)]
    pub parameters: BTreeMap<String, String>,
}

impl StructureEncryption {
    pub fn with_method(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            parameters: BTreeMap::new(),
        }
    }
}

/// Policy knobs of the matcher.
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// Every partition the installer may create must already exist with the
    /// filesystem the gadget declares. Used once installation completed.
    pub assume_creatable_partitions_created: bool,

    /// Accept a trailing ext4 partition labelled `writable` that the gadget
    /// does not declare, as found on systems installed from legacy gadgets.
    pub allow_implicit_system_data: bool,

    /// Structures, by name, expected to be encrypted.
    pub expected_structure_encryption: BTreeMap<String, StructureEncryption>,

    /// Roles, besides system-data, whose partitions may be larger on disk
    /// than declared.
    pub expandable_roles: BTreeSet<Role>,
}

impl MatchOptions {
    fn is_expandable(&self, role: Option<Role>) -> bool {
        match role {
            Some(Role::SystemData) => true,
            Some(role) => self.expandable_roles.contains(&role),
            None => false,
        }
    }

    fn expects_encryption(&self, structure: &VolumeStructure) -> bool {
        structure
            .name
            .as_ref()
            .is_some_and(|name| self.expected_structure_encryption.contains_key(name))
    }
}

/// What a gadget structure was matched to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum MatchedStructure {
    /// A partition found on the disk.
    Disk(OnDiskStructure),

    /// A structure that is not a partition (MBR boot code, bare regions), at
    /// the location the gadget places it.
    #[serde(rename_all = "kebab-case")]
    Placeholder { start_offset: u64, size: u64 },

    /// A partition the installer has not created yet.
    #[serde(rename_all = "kebab-case")]
    Creatable { start_offset: u64, size: u64 },
}

impl MatchedStructure {
    pub fn start_offset(&self) -> u64 {
        match self {
            MatchedStructure::Disk(ds) => ds.start_offset,
            MatchedStructure::Placeholder { start_offset, .. }
            | MatchedStructure::Creatable { start_offset, .. } => *start_offset,
        }
    }

    pub fn on_disk(&self) -> Option<&OnDiskStructure> {
        match self {
            MatchedStructure::Disk(ds) => Some(ds),
            _ => None,
        }
    }
}

/// Result of matching a gadget volume to a disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VolumeMatch {
    pub volume: String,
    pub device: String,
    /// Matched structures keyed by their declaration index.
    pub structures: BTreeMap<usize, MatchedStructure>,
}

/// Matches the structures of a resolved and laid out gadget volume to the
/// partitions of a disk.
///
/// The first structure or partition that cannot be reconciled fails the
/// match. Sector alignment of the gadget is checked before any partition,
/// disk capacity once every partition is accounted for.
pub fn match_volume(
    volume: &Volume,
    disk: &OnDiskVolume,
    options: &MatchOptions,
) -> Result<VolumeMatch, DiskMatchError> {
    debug!(
        "Matching gadget volume '{}' to disk '{}'",
        volume.name, disk.device
    );

    check_encryption_options(options)?;
    check_schema(volume, disk)?;
    check_id(volume, disk)?;
    check_sector_alignment(volume, disk)?;

    let structures = &volume.structure;
    let partitions: Vec<usize> = structures
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_partition())
        .map(|(idx, _)| idx)
        .collect();

    let mut disk_partitions: Vec<&OnDiskStructure> = disk.structures.iter().collect();
    disk_partitions.sort_by_key(|ds| ds.start_offset);

    let mut matched: BTreeMap<usize, &OnDiskStructure> = BTreeMap::new();
    for (position, ds) in disk_partitions.iter().enumerate() {
        let candidate = match disk.schema.gadget_schema() {
            Schema::Gpt => find_by_name(structures, &partitions, &matched, ds),
            _ => partitions
                .get(position)
                .copied()
                .filter(|idx| !matched.contains_key(idx)),
        };

        let Some(idx) = candidate else {
            if volume.has_partial(Partial::Structure) {
                debug!(
                    "Ignoring partition {} not declared in partial volume '{}'",
                    ds.node, volume.name
                );
                continue;
            }

            if options.allow_implicit_system_data
                && is_implicit_system_data(volume, &disk_partitions, partitions.len(), position)
            {
                debug!("Accepting partition {} as implicit system-data", ds.node);
                continue;
            }

            return Err(DiskMatchError::UnexpectedDiskPartition {
                node: ds.node.clone(),
                start: ds.start_offset,
                reason: None,
            });
        };

        if let Some(reason) = compare_structure(structures, idx, ds, options) {
            return Err(DiskMatchError::UnexpectedDiskPartition {
                node: ds.node.clone(),
                start: ds.start_offset,
                reason: Some(reason),
            });
        }
        check_encryption(&structures[idx], ds, options)?;

        debug!(
            "Matched partition {} to gadget structure {}",
            ds.node,
            structures[idx].describe()
        );
        matched.insert(idx, *ds);
    }

    check_capacity(volume, disk)?;

    let mut result = BTreeMap::new();
    for (idx, structure) in structures.iter().enumerate() {
        let start_offset = valid_start_offset_range(structures, idx).min;
        let size = structure.min_size();

        let entry = if !structure.is_partition() {
            MatchedStructure::Placeholder { start_offset, size }
        } else if let Some(ds) = matched.get(&idx) {
            MatchedStructure::Disk((*ds).clone())
        } else if options.expects_encryption(structure) {
            return Err(DiskMatchError::MissingExpectedEncryptedStructure {
                structure: structure.name.clone().unwrap_or_default(),
            });
        } else if structure.role.is_some_and(|r| r.is_creatable_at_install())
            && !options.assume_creatable_partitions_created
        {
            debug!(
                "Gadget structure {} is not on disk yet, it is created at install",
                structure.describe()
            );
            MatchedStructure::Creatable { start_offset, size }
        } else {
            return Err(DiskMatchError::MissingGadgetStructure {
                structure: structure.describe(),
            });
        };
        result.insert(structure.yaml_index, entry);
    }

    if let Some(name) = options
        .expected_structure_encryption
        .keys()
        .find(|name| volume.structure_by_name(name).is_none())
    {
        return Err(DiskMatchError::MissingExpectedEncryptedStructure {
            structure: name.clone(),
        });
    }

    trace!("Match result for volume '{}': {:#?}", volume.name, result);

    Ok(VolumeMatch {
        volume: volume.name.clone(),
        device: disk.device.clone(),
        structures: result,
    })
}

fn check_encryption_options(options: &MatchOptions) -> Result<(), DiskMatchError> {
    for (name, encryption) in options.expected_structure_encryption.iter() {
        let Some(method) = encryption.method.as_deref() else {
            return Err(DiskMatchError::MissingEncryptionMethod {
                structure: name.clone(),
            });
        };

        match EncryptionMethod::from_str(method) {
            Ok(EncryptionMethod::Luks) => (),
            Ok(EncryptionMethod::Ice) | Err(_) => {
                return Err(DiskMatchError::UnsupportedEncryptionMethod {
                    structure: name.clone(),
                    method: method.into(),
                })
            }
        }

        for key in encryption.parameters.keys() {
            debug!("Ignoring encryption parameter '{key}' of structure {name}");
        }
    }
    Ok(())
}

fn check_schema(volume: &Volume, disk: &OnDiskVolume) -> Result<(), DiskMatchError> {
    match volume.effective_schema() {
        Some(schema) if schema != disk.schema.gadget_schema() => {
            Err(DiskMatchError::SchemaMismatch {
                disk: disk.schema.to_string(),
                gadget: schema.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn check_id(volume: &Volume, disk: &OnDiskVolume) -> Result<(), DiskMatchError> {
    match volume.id.as_deref() {
        Some(id)
            if !id.is_empty() && !OsUuid::from(id).same_id(&OsUuid::from(disk.id.as_str())) =>
        {
            Err(DiskMatchError::IdMismatch {
                disk: disk.id.clone(),
                gadget: id.into(),
            })
        }
        _ => Ok(()),
    }
}

fn check_capacity(volume: &Volume, disk: &OnDiskVolume) -> Result<(), DiskMatchError> {
    let required = volume.min_size();
    let usable = disk.usable_size();
    if required > usable {
        return Err(DiskMatchError::DiskTooSmall {
            device: disk.device.clone(),
            usable,
            required,
        });
    }
    Ok(())
}

fn check_sector_alignment(volume: &Volume, disk: &OnDiskVolume) -> Result<(), DiskMatchError> {
    let sector_size = disk.sector_size;
    if sector_size == 0 {
        return Ok(());
    }

    for structure in volume.structure.iter().filter(|s| s.is_partition()) {
        let checks = [
            ("start offset", structure.offset()),
            ("size", structure.size()),
            ("min-size", structure.min_size.map(|s| s.bytes())),
        ];
        for (what, value) in checks {
            if let Some(value) = value.filter(|v| v % sector_size != 0) {
                return Err(DiskMatchError::SectorAlignment {
                    structure: structure.describe(),
                    what: what.into(),
                    value,
                    sector_size,
                });
            }
        }
    }
    Ok(())
}

/// Finds the unmatched gadget partition with the name of the disk partition.
/// Unnamed gadget partitions are matched by start offset.
fn find_by_name(
    structures: &[VolumeStructure],
    partitions: &[usize],
    matched: &BTreeMap<usize, &OnDiskStructure>,
    ds: &OnDiskStructure,
) -> Option<usize> {
    let unmatched = move || {
        partitions
            .iter()
            .copied()
            .filter(move |idx| !matched.contains_key(idx))
    };

    unmatched()
        .find(|idx| structures[*idx].name.is_some() && structures[*idx].name == ds.name)
        .or_else(|| {
            unmatched().find(|idx| {
                structures[*idx].name.is_none()
                    && valid_start_offset_range(structures, *idx).contains(ds.start_offset)
            })
        })
}

/// Compares a disk partition with the gadget structure it was paired with.
fn compare_structure(
    structures: &[VolumeStructure],
    idx: usize,
    ds: &OnDiskStructure,
    options: &MatchOptions,
) -> Option<StructureMismatch> {
    let structure = &structures[idx];

    let range = valid_start_offset_range(structures, idx);
    match range.exact() {
        Some(start) if start != ds.start_offset => {
            return Some(StructureMismatch::StartOffset {
                disk: ds.start_offset,
                gadget: start,
            })
        }
        None if !range.contains(ds.start_offset) => {
            return Some(StructureMismatch::StartOffsetRange {
                disk: ds.start_offset,
                min: range.min,
                max: range.max,
            })
        }
        _ => (),
    }

    // Without a declared size the structure takes whatever the disk has.
    if let Some(size) = structure.size() {
        let min_size = structure.min_size();
        if ds.size < min_size && structure.role != Some(Role::SystemData) {
            return Some(StructureMismatch::SizeSmaller {
                disk: ds.size,
                gadget: min_size,
            });
        }
        if ds.size > size && !options.is_expandable(structure.role) {
            return Some(StructureMismatch::SizeLarger {
                disk: ds.size,
                gadget: size,
            });
        }
    }

    if options.expects_encryption(structure) {
        return None;
    }

    let gadget_fs = structure.linux_filesystem()?;
    let disk_fs = ds.filesystem_type.clone().unwrap_or_default();
    if BlockFilesystemType::from(disk_fs.as_str()).is(gadget_fs) {
        return None;
    }

    let creatable = structure.role.is_some_and(|r| r.is_creatable_at_install());
    if creatable && !options.assume_creatable_partitions_created {
        debug!(
            "Filesystem of partition {} is \"{disk_fs}\" instead of \"{gadget_fs}\", \
            it is created at install",
            ds.node
        );
        None
    } else if creatable {
        Some(StructureMismatch::FilesystemExpectedCreated {
            disk: disk_fs,
            gadget: gadget_fs.into(),
        })
    } else {
        Some(StructureMismatch::FilesystemNotCreatable {
            disk: disk_fs,
            gadget: gadget_fs.into(),
        })
    }
}

fn check_encryption(
    structure: &VolumeStructure,
    ds: &OnDiskStructure,
    options: &MatchOptions,
) -> Result<(), DiskMatchError> {
    let Some(name) = structure.name.as_deref() else {
        return Ok(());
    };
    if !options.expected_structure_encryption.contains_key(name) {
        return Ok(());
    }

    let expected_label = format!("{name}{ENCRYPTED_LABEL_SUFFIX}");
    if ds.filesystem_label.as_deref() != Some(expected_label.as_str()) {
        return Err(DiskMatchError::EncryptedLabelMismatch {
            node: ds.node.clone(),
            structure: name.into(),
        });
    }

    let encrypted = ds
        .filesystem_type
        .as_deref()
        .is_some_and(|fs| BlockFilesystemType::from(fs).is_encrypted());
    if !encrypted {
        return Err(DiskMatchError::NotEncrypted {
            node: ds.node.clone(),
            structure: name.into(),
        });
    }
    Ok(())
}

/// A trailing ext4 partition labelled `writable`, one more than the gadget
/// declares, on a gadget without a system-data structure.
fn is_implicit_system_data(
    volume: &Volume,
    disk_partitions: &[&OnDiskStructure],
    gadget_partitions: usize,
    position: usize,
) -> bool {
    let ds = disk_partitions[position];
    !volume
        .structure
        .iter()
        .any(|s| s.role == Some(Role::SystemData))
        && disk_partitions.len() == gadget_partitions + 1
        && position + 1 == disk_partitions.len()
        && ds
            .filesystem_type
            .as_deref()
            .is_some_and(|fs| BlockFilesystemType::from(fs).is("ext4"))
        && ds.filesystem_label.as_deref() == Some(IMPLICIT_SYSTEM_DATA_LABEL)
}
