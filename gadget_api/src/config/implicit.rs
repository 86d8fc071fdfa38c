//! Resolution of values a gadget description leaves implicit: the volume
//! schema, roles implied by legacy types and labels, labels implied by roles,
//! and the start offset of structures following a fixed size structure.

use std::collections::HashSet;

use log::trace;

use crate::{
    constants::{LEGACY_SYSTEM_BOOT_LABEL, NON_MBR_START_OFFSET, UNBOUNDED_STRUCTURE_OFFSET},
    primitives::bytes::ByteCount,
};

use super::{
    error::{StructureValidationError, VolumeValidationError},
    layout::order_structures_by_offset,
    role::Role,
    structure_type::StructureType,
    volume::{Partial, Schema, Volume},
};

/// Fills in the implicit values of a volume. `modes` selects the labels
/// implied by roles on systems with a recovery system.
///
/// Resolving an already resolved volume leaves it unchanged.
pub fn resolve_volume(volume: &mut Volume, modes: bool) -> Result<(), VolumeValidationError> {
    match (volume.schema, volume.has_partial(Partial::Schema)) {
        (Some(schema), true) => {
            return Err(VolumeValidationError::PartialSchemaWithSchema {
                schema: schema.to_string(),
            })
        }
        (None, false) => volume.schema = Some(Schema::Gpt),
        _ => (),
    }

    // Offsets are derived in declaration order.
    volume.structure.sort_by_key(|s| s.yaml_index);

    let mut labels = HashSet::new();
    for label in volume.structure.iter().filter_map(|s| s.label.as_ref()) {
        if !labels.insert(label.to_lowercase()) {
            return Err(VolumeValidationError::DuplicateLabel {
                label: label.clone(),
            });
        }
    }

    let emmc = volume.is_emmc();
    let mut previous_end = 0u64;
    for structure in volume.structure.iter_mut() {
        if structure.role.is_none() {
            if structure.structure_type == Some(StructureType::Mbr) {
                structure.role = Some(Role::Mbr);
            } else if !modes
                && structure.label.as_deref() == Some(LEGACY_SYSTEM_BOOT_LABEL)
                && matches!(structure.structure_type, Some(StructureType::Hybrid(0xEF, _)))
            {
                structure.role = Some(Role::SystemBoot);
            }
        }

        let implied = structure.role.and_then(|r| r.implicit_label(modes));
        if let (true, Some(label)) = (structure.label.is_none(), implied) {
            if !labels.insert(label.to_lowercase()) {
                return Err(VolumeValidationError::ImpliedLabelConflict {
                    label: label.into(),
                    role: structure.role.map(|r| r.to_string()).unwrap_or_default(),
                });
            }
            structure.label = Some(label.into());
        }

        if structure.min_size.is_none() {
            structure.min_size = structure.size;
        }

        if emmc {
            // Hardware partitions are separate address spaces sized by the
            // device.
            if structure.size.is_some() || structure.offset().is_some_and(|o| o != 0) {
                return Err(VolumeValidationError::InvalidStructure {
                    structure: structure.describe(),
                    reason: StructureValidationError::EmmcStructureGeometry,
                });
            }
            structure.offset = Some(ByteCount(0));
            continue;
        }

        if structure.offset.is_none() && previous_end != UNBOUNDED_STRUCTURE_OFFSET {
            let start = if structure.role != Some(Role::Mbr) && previous_end < NON_MBR_START_OFFSET
            {
                NON_MBR_START_OFFSET
            } else {
                previous_end
            };
            trace!(
                "Structure {} of volume '{}' placed at implicit offset {start}",
                structure.describe(),
                volume.name
            );
            structure.offset = Some(ByteCount(start));
        }

        previous_end = match (structure.offset(), structure.is_fixed_size()) {
            (Some(offset), true) => offset.saturating_add(structure.max_size()),
            _ => UNBOUNDED_STRUCTURE_OFFSET,
        };
    }

    if !emmc {
        order_structures_by_offset(&mut volume.structure);
    }
    Ok(())
}
