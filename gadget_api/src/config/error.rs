//! Validation and layout errors for the gadget description.

use serde::{Deserialize, Serialize};

use crate::{constants::UNBOUNDED_STRUCTURE_OFFSET, primitives::bytes::bytes_and_iec};

/// Identifies errors detected during static validation of a gadget description, i.e. errors
/// that can be detected without looking at any disk.
#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GadgetValidationError {
    #[error("Default stanza not keyed by \"system\" or snap-id: {key}")]
    InvalidDefaultsKey { key: String },

    #[error("Gadget connection plug cannot be empty")]
    EmptyConnectionPlug,

    #[error("Bootloader not declared in any volume")]
    BootloaderNotDeclared,

    #[error("Too many ({count}) bootloaders declared")]
    TooManyBootloaders { count: usize },

    #[error("Invalid volume \"{volume}\": {reason}")]
    InvalidVolume {
        volume: String,
        reason: VolumeValidationError,
    },

    #[error("Cannot have more than one {role} role")]
    DuplicateRole { role: String },

    #[error("Model does not support the {role} role")]
    RoleNotSupported { role: String },

    #[error("Model requires a {role} structure, but none was found")]
    MissingRequiredRole { role: String },

    #[error("The {role} role requires {required} to be defined")]
    RoleRequires { role: String, required: String },

    #[error("{role} structure must have an implicit label or \"{expected}\", not \"{label}\"")]
    UnexpectedLabel {
        role: String,
        expected: String,
        label: String,
    },
}

/// Problems with a single volume of the gadget description.
#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeValidationError {
    #[error("invalid name")]
    InvalidName,

    #[error("partial schema is set but schema is still specified as \"{schema}\"")]
    PartialSchemaWithSchema { schema: String },

    #[error("cannot set \"{field}\" for eMMC schema")]
    EmmcField { field: String },

    #[error("invalid volume ID \"{id}\", expected {expected}")]
    InvalidId { id: String, expected: String },

    #[error("structure name \"{name}\" is not unique")]
    DuplicateStructureName { name: String },

    #[error("filesystem label \"{label}\" is not unique")]
    DuplicateLabel { label: String },

    #[error("filesystem label \"{label}\" is implied by {role} role but was already set elsewhere")]
    ImpliedLabelConflict { label: String, role: String },

    #[error("more than one structure has the \"mbr\" role")]
    DuplicateMbr,

    #[error("mbr schema requires a structure with the \"mbr\" role")]
    MissingMbr,

    #[error("invalid structure {structure}: {reason}")]
    InvalidStructure {
        structure: String,
        reason: StructureValidationError,
    },
}

/// Problems with a single structure of a volume.
#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StructureValidationError {
    #[error("missing size")]
    MissingSize,

    #[error("min-size ({min_size}) is bigger than size ({size})")]
    MinSizeLargerThanSize { min_size: u64, size: u64 },

    #[error("type is not specified")]
    MissingType,

    #[error("invalid type \"{structure_type}\": MBR structure type with non-MBR schema")]
    MbrTypeOnNonMbrSchema { structure_type: String },

    #[error("invalid type \"{structure_type}\": GUID structure type with non-GPT schema")]
    GuidTypeOnNonGptSchema { structure_type: String },

    #[error("invalid type \"{structure_type}\": both MBR type and GUID structure type needs to be defined on partial schemas")]
    NonHybridTypeOnPartialSchema { structure_type: String },

    #[error("invalid role \"{role}\": conflicting type: \"bare\"")]
    RoleConflictsWithBare { role: String },

    #[error("invalid role \"{role}\": conflicting legacy type: \"mbr\"")]
    RoleConflictsWithLegacyMbr { role: String },

    #[error("mbr structures cannot be larger than 446 bytes")]
    MbrTooLarge,

    #[error("mbr structure must start at offset 0")]
    MbrOffset,

    #[error("mbr structure must not specify partition ID")]
    MbrPartitionId,

    #[error("mbr structures must not specify a file system")]
    MbrFilesystem,

    #[error("invalid partition ID \"{id}\", expected a GUID")]
    InvalidPartitionId { id: String },

    #[error("partition ID is only supported on GPT volumes")]
    PartitionIdOnNonGpt,

    #[error("invalid content #{index}: {reason}")]
    InvalidContent {
        index: usize,
        reason: ContentValidationError,
    },

    #[error("preserving files during update is not supported for non-filesystem structures")]
    PreserveOnNonFilesystem,

    #[error("duplicate \"preserve\" entry \"{entry}\"")]
    DuplicatePreserve { entry: String },

    #[error("cannot use \"{name}\" as an eMMC hardware partition name, expected boot0 or boot1")]
    InvalidEmmcName { name: String },

    #[error("cannot specify size or offset for eMMC hardware partitions")]
    EmmcStructureGeometry,
}

/// Problems with a content entry of a structure.
#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ContentValidationError {
    #[error("cannot use non-image content for bare file system")]
    NonImageOnBare,

    #[error("missing image file name")]
    MissingImage,

    #[error("cannot use image content for non-bare file system")]
    ImageOnFilesystem,

    #[error("missing source or target")]
    MissingSourceOrTarget,

    #[error("cannot specify size or offset for content")]
    EmmcContentGeometry,
}

fn fmt_bound(value: &u64) -> String {
    if *value == UNBOUNDED_STRUCTURE_OFFSET {
        "unbounded".into()
    } else {
        value.to_string()
    }
}

/// Errors produced while assigning or checking byte ranges of structures and
/// their content.
#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutError {
    #[error("Invalid volume \"{volume}\": structure {structure} has \"mbr\" role and must start at offset 0")]
    MbrNotAtStart { volume: String, structure: String },

    #[error("Invalid volume \"{volume}\": structure {structure} overlaps with the preceding structure {preceding}")]
    Overlap {
        volume: String,
        structure: String,
        preceding: String,
    },

    #[error("Invalid volume \"{volume}\": structure {structure} refers to an unknown structure \"{target}\"")]
    UnknownOffsetWriteTarget {
        volume: String,
        structure: String,
        target: String,
    },

    #[error("Invalid volume \"{volume}\": structure {structure}, content {content} refers to an unknown structure \"{target}\"")]
    UnknownContentOffsetWriteTarget {
        volume: String,
        structure: String,
        content: String,
        target: String,
    },

    #[error("Invalid volume \"{volume}\": structure {structure} offset-write {offset_write} does not fit inside structure {target}")]
    OffsetWriteOutOfBounds {
        volume: String,
        structure: String,
        offset_write: String,
        target: String,
    },

    #[error("offset {offset} is not in the valid gadget interval (min: {min}, max: {})", fmt_bound(.max))]
    InvalidOffset { offset: u64, min: u64, max: u64 },

    #[error("Cannot lay out structure {structure}: cannot determine size of content \"{image}\": {reason}")]
    ImageSize {
        structure: String,
        image: String,
        reason: String,
    },

    #[error("Cannot lay out structure {structure}: content \"{image}\" size {} is larger than declared {}", bytes_and_iec(.size), bytes_and_iec(.declared))]
    ContentTooLarge {
        structure: String,
        image: String,
        size: u64,
        declared: u64,
    },

    #[error("Cannot lay out structure {structure}: content \"{image}\" does not fit in the structure")]
    ContentDoesNotFit { structure: String, image: String },

    #[error("Cannot lay out structure {structure}: content \"{image}\" overlaps with preceding image \"{preceding}\"")]
    ContentOverlap {
        structure: String,
        image: String,
        preceding: String,
    },
}
