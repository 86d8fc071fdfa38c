//! Checks whether a new gadget revision may replace the installed one without
//! re-imaging the disk, and which structures it updates.

use std::fmt::Display;

use log::{debug, trace};

use gadget_api::{
    config::{
        layout::valid_start_offset_range, Filesystem, GadgetInfo, Partial, Role, Schema,
        StructureType, Volume, VolumeStructure,
    },
    error::UpdateIncompatibleError,
    primitives::bytes::ByteCount,
};

const UNSPECIFIED: &str = "unspecified";

/// Checks that the volumes of `new` are compatible with those of `old`.
///
/// Gadgets with more than one volume cannot be updated.
pub fn is_compatible(old: &GadgetInfo, new: &GadgetInfo) -> Result<(), UpdateIncompatibleError> {
    if old.volumes.len() > 1 || new.volumes.len() > 1 {
        return Err(UpdateIncompatibleError::MultipleVolumes);
    }

    for (name, old_volume) in old.volumes.iter() {
        let new_volume = new
            .volume(name)
            .ok_or_else(|| UpdateIncompatibleError::VolumeNotFound {
                volume: name.clone(),
            })?;
        check_volume_compatibility(old_volume, new_volume)?;
    }
    Ok(())
}

/// Checks that `new` describes the same disk layout as `old`, allowing only
/// changes that keep every existing partition where and what it is.
pub fn check_volume_compatibility(
    old: &Volume,
    new: &Volume,
) -> Result<(), UpdateIncompatibleError> {
    debug!("Checking compatibility of volume '{}'", old.name);

    if old.bootloader != new.bootloader {
        return Err(UpdateIncompatibleError::IncompatibleBootloaderChange {
            old: or_unspecified(old.bootloader),
            new: or_unspecified(new.bootloader),
        });
    }

    if let Some(property) = new
        .partial
        .properties()
        .into_iter()
        .find(|p| !old.has_partial(Partial::from(*p)))
    {
        return Err(UpdateIncompatibleError::PartialDowngradeNotAllowed {
            property: property.to_string(),
        });
    }

    // A partial schema may be settled by the update.
    if old.schema.is_some() && old.schema != new.schema {
        return Err(UpdateIncompatibleError::IncompatibleSchemaChange {
            old: or_unspecified(old.schema),
            new: or_unspecified(new.schema),
        });
    }

    if old.id != new.id {
        return Err(UpdateIncompatibleError::IncompatibleIdChange {
            old: or_unspecified(old.id.as_ref()),
            new: or_unspecified(new.id.as_ref()),
        });
    }

    if old.structure.len() != new.structure.len() {
        return Err(UpdateIncompatibleError::StructureCountChanged {
            old: old.structure.len(),
            new: new.structure.len(),
        });
    }

    for (old_idx, old_structure) in old.structure.iter().enumerate() {
        let new_idx = new
            .structure
            .iter()
            .position(|s| s.yaml_index == old_structure.yaml_index)
            .ok_or_else(|| UpdateIncompatibleError::StructureCountChanged {
                old: old.structure.len(),
                new: new.structure.len(),
            })?;
        check_structure_compatibility(old, old_idx, new, new_idx)?;
    }
    Ok(())
}

fn check_structure_compatibility(
    old_volume: &Volume,
    old_idx: usize,
    new_volume: &Volume,
    new_idx: usize,
) -> Result<(), UpdateIncompatibleError> {
    let old = &old_volume.structure[old_idx];
    let new = &new_volume.structure[new_idx];
    let changed = |field: &str, old: String, new: String| {
        Err(UpdateIncompatibleError::IncompatibleStructureChange {
            structure: old_volume.structure[old_idx].describe(),
            field: field.into(),
            old,
            new,
        })
    };
    trace!("Comparing structure {} with {}", old.describe(), new.describe());

    // Partition names mean nothing in an MBR partition table.
    if old_volume.schema != Some(Schema::Mbr) && old.name != new.name {
        return changed(
            "structure name",
            quoted(old.name.as_deref()),
            quoted(new.name.as_deref()),
        );
    }

    let legacy_mbr = old.structure_type == Some(StructureType::Mbr)
        && new.structure_type == Some(StructureType::Bare)
        && new.role == Some(Role::Mbr);
    if old.structure_type != new.structure_type && !legacy_mbr {
        return changed(
            "structure type",
            or_unspecified(old.structure_type.as_ref()),
            or_unspecified(new.structure_type.as_ref()),
        );
    }

    if old.role != new.role {
        return changed(
            "structure role",
            or_unspecified(old.role),
            or_unspecified(new.role),
        );
    }

    if old.id != new.id {
        return changed(
            "structure ID",
            or_unspecified(old.id.as_ref()),
            or_unspecified(new.id.as_ref()),
        );
    }

    let partial_filesystem =
        old_volume.has_partial(Partial::Filesystem) && old.filesystem.is_none();
    if !partial_filesystem {
        match (old.has_filesystem(), new.has_filesystem()) {
            (false, true) => {
                return Err(UpdateIncompatibleError::BareToFilesystem {
                    structure: old.describe(),
                })
            }
            (true, false) => {
                return Err(UpdateIncompatibleError::FilesystemToBare {
                    structure: old.describe(),
                })
            }
            _ => (),
        }

        if filesystem(old) != filesystem(new) {
            return changed(
                "filesystem",
                or_unspecified(filesystem(old)),
                or_unspecified(filesystem(new)),
            );
        }

        if old.label != new.label {
            return changed(
                "filesystem label",
                quoted(old.label.as_deref()),
                quoted(new.label.as_deref()),
            );
        }
    }

    if old.offset_write != new.offset_write {
        return changed(
            "offset-write",
            or_unspecified(old.offset_write.as_ref()),
            or_unspecified(new.offset_write.as_ref()),
        );
    }

    let partial_size = old_volume.has_partial(Partial::Size) && old.size.is_none();
    if !partial_size {
        let old_size = old.max_size();
        let too_small = old_size < new.min_size();
        let too_large = new.size().is_some_and(|size| old_size > size);
        if too_small || too_large {
            return changed(
                "size",
                ByteCount(old_size).to_string(),
                format!(
                    "[{}, {}]",
                    ByteCount(new.min_size()),
                    new.size
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| UNSPECIFIED.into())
                ),
            );
        }
    }

    let old_start = valid_start_offset_range(&old_volume.structure, old_idx).min;
    let new_range = valid_start_offset_range(&new_volume.structure, new_idx);
    if !new_range.contains(old_start) {
        return Err(UpdateIncompatibleError::StartOffsetOutOfRange {
            structure: old.describe(),
            offset: old_start,
            min: new_range.min,
            max: new_range.max,
        });
    }

    Ok(())
}

/// Decides, for a pair of matching structures, whether the update writes the
/// content of the new one.
pub trait UpdatePolicy {
    fn should_update(&self, old: &VolumeStructure, new: &VolumeStructure) -> bool;
}

/// Updates a structure when its edition was bumped.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditionPolicy;

impl UpdatePolicy for EditionPolicy {
    fn should_update(&self, old: &VolumeStructure, new: &VolumeStructure) -> bool {
        new.update.edition > old.update.edition
    }
}

/// Updates every structure, as done when moving to a different model.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemodelPolicy;

impl UpdatePolicy for RemodelPolicy {
    fn should_update(&self, _old: &VolumeStructure, _new: &VolumeStructure) -> bool {
        true
    }
}

impl<F> UpdatePolicy for F
where
    F: Fn(&VolumeStructure, &VolumeStructure) -> bool,
{
    fn should_update(&self, old: &VolumeStructure, new: &VolumeStructure) -> bool {
        self(old, new)
    }
}

/// Declaration indices of the structures of `new` the update writes, in
/// declaration order. The volumes are expected to be compatible.
pub fn structures_to_update(old: &Volume, new: &Volume, policy: &dyn UpdatePolicy) -> Vec<usize> {
    let mut indices: Vec<usize> = old
        .structure
        .iter()
        .filter_map(|old_structure| {
            let new_structure = new.structure_by_yaml_index(old_structure.yaml_index)?;
            let update = policy.should_update(old_structure, new_structure);
            debug!(
                "Structure {} (edition {} -> {}): {}",
                new_structure.describe(),
                old_structure.update.edition,
                new_structure.update.edition,
                if update { "update" } else { "keep" }
            );
            update.then_some(new_structure.yaml_index)
        })
        .collect();
    indices.sort_unstable();
    indices
}

/// Filesystem, treating an explicit "none" as no filesystem.
fn filesystem(structure: &VolumeStructure) -> Option<Filesystem> {
    structure.filesystem.filter(|fs| *fs != Filesystem::None)
}

fn or_unspecified<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNSPECIFIED.into())
}

fn quoted(value: Option<&str>) -> String {
    format!("\"{}\"", value.unwrap_or_default())
}
