//! Where the content of each matched structure is written.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Error};
use log::debug;
use serde::Serialize;

use gadget_api::{
    config::Volume,
    error::{ExecutionError, GadgetError, InternalError, ReportError},
};
use osutils::findmnt::FindMnt;

use super::matching::{MatchedStructure, VolumeMatch};

/// Location of a structure on a matched disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum StructureLocation {
    /// Raw content written at an offset of the disk device.
    #[serde(rename_all = "kebab-case")]
    Raw { device: String, offset: u64 },

    /// Content copied into the mounted filesystem of the partition.
    #[serde(rename_all = "kebab-case")]
    Filesystem { root_mount_point: PathBuf },
}

/// Finds where a partition is mounted.
pub trait MountLookup {
    fn mount_point(&self, node: &str) -> Result<Option<PathBuf>, Error>;
}

impl MountLookup for FindMnt {
    fn mount_point(&self, node: &str) -> Result<Option<PathBuf>, Error> {
        Ok(self.mount_point_of(node).map(Path::to_path_buf))
    }
}

/// Resolves the location of every structure of a matched volume, keyed by
/// declaration index.
///
/// Structures without a filesystem are written raw at their offset on the
/// disk. Filesystem structures must be mounted. Partitions not created yet
/// are skipped.
pub fn structure_locations(
    volume: &Volume,
    matched: &VolumeMatch,
    mounts: &dyn MountLookup,
) -> Result<BTreeMap<usize, StructureLocation>, GadgetError> {
    let mut locations = BTreeMap::new();

    for structure in volume.structure.iter() {
        let matched_structure = matched
            .structures
            .get(&structure.yaml_index)
            .structured(InternalError::Internal(format!(
                "Structure {} of volume '{}' was not matched",
                structure.describe(),
                volume.name
            )))?;

        let location = if !structure.has_filesystem() {
            StructureLocation::Raw {
                device: matched.device.clone(),
                offset: matched_structure.start_offset(),
            }
        } else {
            let ds = match matched_structure {
                MatchedStructure::Disk(ds) => ds,
                MatchedStructure::Creatable { .. } => {
                    debug!(
                        "Structure {} is not created yet, skipping",
                        structure.describe()
                    );
                    continue;
                }
                MatchedStructure::Placeholder { .. } => {
                    return Err(GadgetError::internal(format!(
                        "Filesystem structure {} has no partition",
                        structure.describe()
                    )))
                }
            };

            let root_mount_point = mounts
                .mount_point(&ds.node)
                .and_then(|mount_point| {
                    mount_point.with_context(|| format!("Partition {} is not mounted", ds.node))
                })
                .structured(ExecutionError::FindMountPoint {
                    structure: structure.describe(),
                })?;
            StructureLocation::Filesystem { root_mount_point }
        };

        debug!("Structure {} location: {:?}", structure.describe(), location);
        locations.insert(structure.yaml_index, location);
    }

    Ok(locations)
}

#[cfg(test)]
pub(crate) mod tests {
    use gadget_api::error::ErrorKind;

    use super::*;
    use crate::engine::matching::{
        match_volume,
        tests::{pc_disk, pc_volume},
        MatchOptions,
    };

    /// `findmnt --json` output with the pc disk mounted the way it is on a
    /// running system.
    pub(crate) fn pc_mounts() -> FindMnt {
        FindMnt::from_json(
            r#"{"filesystems": [{
                "id": 96, "target": "/", "source": "/dev/vda5", "fstype": "ext4",
                "children": [
                    {"id": 33, "target": "/run/mnt/ubuntu-seed", "source": "/dev/vda2", "fstype": "vfat"},
                    {"id": 34, "target": "/run/mnt/ubuntu boot", "source": "/dev/vda3", "fstype": "ext4"},
                    {"id": 35, "target": "/run/mnt/ubuntu-save", "source": "/dev/vda4", "fstype": "ext4"},
                    {"id": 65, "target": "/proc", "source": "proc", "fstype": "proc"}
                ]
            }]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_findmnt_lookup() {
        let mounts = pc_mounts();
        assert_eq!(
            mounts.mount_point("/dev/vda3").unwrap(),
            Some(PathBuf::from("/run/mnt/ubuntu boot"))
        );
        assert_eq!(
            mounts.mount_point("/dev/vda5").unwrap(),
            Some(PathBuf::from("/"))
        );
        assert_eq!(mounts.mount_point("/dev/vda1").unwrap(), None);
    }

    #[test]
    fn test_structure_locations() {
        let volume = pc_volume();
        let matched = match_volume(&volume, &pc_disk(), &MatchOptions::default()).unwrap();

        let locations = structure_locations(&volume, &matched, &pc_mounts()).unwrap();
        assert_eq!(locations.len(), 6);
        assert_eq!(
            locations[&0],
            StructureLocation::Raw {
                device: "/dev/vda".into(),
                offset: 0
            }
        );
        assert_eq!(
            locations[&1],
            StructureLocation::Raw {
                device: "/dev/vda".into(),
                offset: 1024 * 1024
            }
        );
        assert_eq!(
            locations[&2],
            StructureLocation::Filesystem {
                root_mount_point: "/run/mnt/ubuntu-seed".into()
            }
        );
        assert_eq!(
            locations[&5],
            StructureLocation::Filesystem {
                root_mount_point: "/".into()
            }
        );
    }

    #[test]
    fn test_unmounted_structure() {
        let volume = pc_volume();
        let matched = match_volume(&volume, &pc_disk(), &MatchOptions::default()).unwrap();

        let mounts = FindMnt::from_json(
            r#"{"filesystems": [
                {"id": 33, "target": "/run/mnt/ubuntu-seed", "source": "/dev/vda2", "fstype": "vfat"}
            ]}"#,
        )
        .unwrap();
        let error = structure_locations(&volume, &matched, &mounts).unwrap_err();
        assert!(matches!(
            error.kind(),
            ErrorKind::Execution(ExecutionError::FindMountPoint { .. })
        ));
        assert_eq!(
            error.kind().to_string(),
            "Failed to find the mount point of structure #3 (\"ubuntu-boot\")"
        );
    }

    #[test]
    fn test_creatable_structures_skipped() {
        let volume = pc_volume();
        let mut disk = pc_disk();
        disk.structures.truncate(2);
        let matched = match_volume(&volume, &disk, &MatchOptions::default()).unwrap();

        let locations = structure_locations(&volume, &matched, &pc_mounts()).unwrap();
        assert_eq!(locations.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
