//! Placement of structures within a volume.
//!
//! Structures with an explicit offset are anchored. Structures without one
//! follow the structure declared before them, which makes their start offset
//! an interval when a preceding structure does not have a fixed size.

use log::{debug, warn};
use serde::Serialize;

use crate::constants::{GPT_HEADER_SIZE, OFFSET_WRITE_POINTER_SIZE, UNBOUNDED_STRUCTURE_OFFSET};

use super::{
    error::LayoutError,
    role::Role,
    structure::VolumeStructure,
    structure_type::StructureType,
    volume::{Bootloader, Schema, Volume},
};

/// Smallest start offset of the structure at `idx`, assuming every
/// unanchored structure before it takes its minimum size.
pub fn min_structure_offset(structures: &[VolumeStructure], idx: usize) -> u64 {
    if let Some(offset) = structures[idx].offset() {
        return offset;
    }

    let mut min_offset = 0u64;
    for previous in structures[..idx].iter().rev() {
        min_offset = min_offset.saturating_add(previous.min_size());
        if let Some(offset) = previous.offset() {
            return min_offset.saturating_add(offset);
        }
    }
    min_offset
}

/// Largest start offset of the structure at `idx`, or
/// [`UNBOUNDED_STRUCTURE_OFFSET`] when a preceding structure has no upper size
/// limit.
pub fn max_structure_offset(structures: &[VolumeStructure], idx: usize) -> u64 {
    if let Some(offset) = structures[idx].offset() {
        return offset;
    }

    let mut max_offset = 0u64;
    for previous in structures[..idx].iter().rev() {
        let Some(size) = previous.size() else {
            return UNBOUNDED_STRUCTURE_OFFSET;
        };
        max_offset = max_offset.saturating_add(size);
        if let Some(offset) = previous.offset() {
            return max_offset.saturating_add(offset);
        }
    }
    max_offset
}

/// Admissible start offsets of the structure at `idx`.
///
/// The upper bound is narrowed by the next anchored structure: the minimum
/// sizes of the structures in between must still fit before it.
pub fn valid_start_offset_range(structures: &[VolumeStructure], idx: usize) -> OffsetRange {
    let min = min_structure_offset(structures, idx);
    let mut max = max_structure_offset(structures, idx);

    let mut in_between = 0u64;
    for (next_idx, next) in structures.iter().enumerate().skip(idx) {
        if next_idx > idx {
            if let Some(anchor) = next.offset() {
                max = max.min(anchor.saturating_sub(in_between));
                break;
            }
        }
        in_between = in_between.saturating_add(next.min_size());
    }

    OffsetRange { min, max }
}

/// Checks that `offset` is an admissible start offset for the structure at
/// `idx`.
pub fn check_valid_start_offset(
    offset: u64,
    structures: &[VolumeStructure],
    idx: usize,
) -> Result<(), LayoutError> {
    let range = valid_start_offset_range(structures, idx);
    if range.contains(offset) {
        Ok(())
    } else {
        Err(LayoutError::InvalidOffset {
            offset,
            min: range.min,
            max: range.max,
        })
    }
}

/// Orders structures by start offset. Unanchored structures stay right after
/// the structure they follow, keeping their relative declaration order.
pub fn order_structures_by_offset(structures: &mut [VolumeStructure]) {
    let mut anchor = 0u64;
    let mut keyed: Vec<(u64, usize)> = structures
        .iter()
        .enumerate()
        .map(|(position, structure)| {
            if let Some(offset) = structure.offset() {
                anchor = offset;
            }
            (anchor, position)
        })
        .collect();
    keyed.sort_by_key(|(key, _)| *key);

    let ordered: Vec<VolumeStructure> = keyed
        .iter()
        .map(|(_, position)| structures[*position].clone())
        .collect();
    structures.clone_from_slice(&ordered);
}

/// Start offset interval of a structure. `max` is
/// [`UNBOUNDED_STRUCTURE_OFFSET`] when there is no upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRange {
    pub min: u64,
    pub max: u64,
}

impl OffsetRange {
    pub fn contains(&self, offset: u64) -> bool {
        self.min <= offset && offset <= self.max
    }

    pub fn is_bounded(&self) -> bool {
        self.max != UNBOUNDED_STRUCTURE_OFFSET
    }

    /// The start offset when the interval is a single point.
    pub fn exact(&self) -> Option<u64> {
        (self.min == self.max).then_some(self.min)
    }
}

impl Serialize for OffsetRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("offset-range", 2)?;
        state.serialize_field("min", &self.min)?;
        state.serialize_field("max", &self.is_bounded().then_some(self.max))?;
        state.end()
    }
}

/// Cross structure checks of a resolved volume: MBR placement, overlaps and
/// offset-write references.
pub fn validate_volume_layout(volume: &Volume) -> Result<(), LayoutError> {
    let structures = &volume.structure;
    let mut previous_end = 0u64;

    for (idx, structure) in structures.iter().enumerate() {
        if structure.role == Some(Role::Mbr) && structure.offset() != Some(0) {
            return Err(LayoutError::MbrNotAtStart {
                volume: volume.name.clone(),
                structure: structure.describe(),
            });
        }

        let min_start = min_structure_offset(structures, idx);
        let max_start = max_structure_offset(structures, idx);
        if let Some(offset) = structure.offset() {
            if idx > 0 && offset < previous_end {
                return Err(LayoutError::Overlap {
                    volume: volume.name.clone(),
                    structure: structure.describe(),
                    preceding: structures[idx - 1].describe(),
                });
            }
        }

        if volume.schema == Some(Schema::Gpt)
            && structure.role != Some(Role::Mbr)
            && min_start < GPT_HEADER_SIZE
        {
            warn!(
                "Structure {} of volume '{}' overlaps the GPT header area, it will be clobbered \
                when the partition table is written",
                structure.describe(),
                volume.name
            );
        }

        previous_end = match structure.size() {
            Some(size) if max_start != UNBOUNDED_STRUCTURE_OFFSET => max_start.saturating_add(size),
            _ => min_start.saturating_add(structure.min_size()),
        };

        if let Some(offset_write) = &structure.offset_write {
            if let Some(target_name) = &offset_write.relative_to {
                let target = volume.structure_by_name(target_name).ok_or_else(|| {
                    LayoutError::UnknownOffsetWriteTarget {
                        volume: volume.name.clone(),
                        structure: structure.describe(),
                        target: target_name.clone(),
                    }
                })?;
                if offset_write.offset.saturating_add(OFFSET_WRITE_POINTER_SIZE)
                    > target.min_size()
                {
                    return Err(LayoutError::OffsetWriteOutOfBounds {
                        volume: volume.name.clone(),
                        structure: structure.describe(),
                        offset_write: offset_write.to_string(),
                        target: target.describe(),
                    });
                }
            }
        }

        if structure.has_filesystem() {
            continue;
        }
        for (content_idx, content) in structure.content.iter().enumerate() {
            let Some(target_name) = content
                .offset_write
                .as_ref()
                .and_then(|o| o.relative_to.as_ref())
            else {
                continue;
            };
            if volume.structure_by_name(target_name).is_none() {
                return Err(LayoutError::UnknownContentOffsetWriteTarget {
                    volume: volume.name.clone(),
                    structure: structure.describe(),
                    content: content.describe(content_idx),
                    target: target_name.clone(),
                });
            }
        }
    }

    Ok(())
}

/// A volume with the start offset interval of every structure determined.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct LaidOutVolume {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootloader: Option<Bootloader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Smallest image that can hold every structure.
    pub min_size: u64,
    pub structures: Vec<LaidOutStructure>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct LaidOutStructure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub yaml_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub structure_type: Option<StructureType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<String>,
    pub start: OffsetRange,
    pub min_size: u64,
    /// Unset when the size is only determined at install time.
    pub size: Option<u64>,
    /// Absolute location the start offset is written to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_write: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<LaidOutContent>,
}

/// An image placed inside a bare structure.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct LaidOutContent {
    pub image: String,
    pub index: usize,
    /// Absolute start offset of the image within the volume.
    pub start_offset: u64,
    pub size: u64,
}

fn resolve_offset_write(volume: &Volume, structure: &VolumeStructure) -> Option<u64> {
    let offset_write = structure.offset_write.as_ref()?;
    match &offset_write.relative_to {
        None => Some(offset_write.offset),
        Some(name) => {
            let position = volume
                .structure
                .iter()
                .position(|s| s.name.as_deref() == Some(name))?;
            valid_start_offset_range(&volume.structure, position)
                .exact()
                .map(|start| start + offset_write.offset)
        }
    }
}

/// Lays out a resolved volume. Content of bare structures is not placed, see
/// [`layout_structure_content`].
pub fn layout_volume(volume: &Volume) -> Result<LaidOutVolume, LayoutError> {
    validate_volume_layout(volume)?;

    let structures = volume
        .structure
        .iter()
        .enumerate()
        .map(|(idx, structure)| LaidOutStructure {
            name: structure.name.clone(),
            yaml_index: structure.yaml_index,
            role: structure.role,
            structure_type: structure.structure_type,
            label: structure.label.clone(),
            filesystem: structure.filesystem.map(|fs| fs.to_string()),
            start: valid_start_offset_range(&volume.structure, idx),
            min_size: structure.min_size(),
            size: structure.size(),
            offset_write: resolve_offset_write(volume, structure),
            content: Vec::new(),
        })
        .collect();

    let laid_out = LaidOutVolume {
        name: volume.name.clone(),
        schema: volume.schema,
        bootloader: volume.bootloader,
        id: volume.id.clone(),
        min_size: volume.min_size(),
        structures,
    };
    debug!(
        "Laid out volume '{}' with {} structures, minimum size {}",
        laid_out.name,
        laid_out.structures.len(),
        laid_out.min_size
    );
    Ok(laid_out)
}

/// Places the images of a bare structure starting at `start`. Images without
/// an explicit offset follow the previous image. `image_size` returns the
/// size of an image given its name.
pub fn layout_structure_content(
    structure: &VolumeStructure,
    start: u64,
    image_size: &dyn Fn(&str) -> anyhow::Result<u64>,
) -> Result<Vec<LaidOutContent>, LayoutError> {
    if structure.has_filesystem() {
        return Ok(Vec::new());
    }

    let mut content = Vec::with_capacity(structure.content.len());
    let mut previous_end = 0u64;
    for (index, entry) in structure.content.iter().enumerate() {
        let image = entry.image.clone().unwrap_or_default();
        let actual = image_size(&image).map_err(|e| LayoutError::ImageSize {
            structure: structure.describe(),
            image: image.clone(),
            reason: format!("{e:#}"),
        })?;

        let relative_start = entry.offset.map(|o| o.bytes()).unwrap_or(previous_end);
        let size = match entry.size.map(|s| s.bytes()) {
            Some(declared) if declared < actual => {
                return Err(LayoutError::ContentTooLarge {
                    structure: structure.describe(),
                    image,
                    size: actual,
                    declared,
                })
            }
            Some(declared) => declared,
            None => actual,
        };

        previous_end = relative_start.saturating_add(size);
        if previous_end > structure.min_size() {
            return Err(LayoutError::ContentDoesNotFit {
                structure: structure.describe(),
                image,
            });
        }

        content.push(LaidOutContent {
            image,
            index,
            start_offset: start + relative_start,
            size,
        });
    }

    content.sort_by_key(|c| c.start_offset);
    for pair in content.windows(2) {
        if pair[1].start_offset < pair[0].start_offset + pair[0].size {
            return Err(LayoutError::ContentOverlap {
                structure: structure.describe(),
                image: pair[1].image.clone(),
                preceding: pair[0].image.clone(),
            });
        }
    }

    Ok(content)
}
