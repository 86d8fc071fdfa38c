use std::fmt::{Debug, Write};
use std::{borrow::Cow, panic::Location};

use serde::{ser::SerializeStruct, Deserialize, Serialize};
use strum_macros::IntoStaticStr;

use crate::{
    config::error::{GadgetValidationError, LayoutError},
    constants::UNBOUNDED_STRUCTURE_OFFSET,
    primitives::bytes::{bytes_and_iec, ByteCount},
};

/// User provided input could not be read or decoded.
#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidInputError {
    #[error("Failed to read gadget description from '{path}'")]
    ReadGadgetFile { path: String },

    #[error("Failed to parse gadget metadata")]
    ParseGadgetYaml,

    #[error("Failed to read disk description from '{path}'")]
    ReadDiskDescription { path: String },

    #[error("Failed to parse disk description")]
    ParseDiskDescription,

    #[error("Volume '{volume}' not found in gadget")]
    UnknownVolume { volume: String },

    #[error("Gadget declares {count} volumes, one must be selected")]
    VolumeNotSelected { count: usize },

    #[error("Invalid encryption option '{option}', expected NAME=METHOD")]
    InvalidEncryptionOption { option: String },
}

/// An operation relying on an external collaborator (disk probe, mount table,
/// filesystem) failed.
#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionError {
    #[error("Failed to probe disk '{device}'")]
    ProbeDisk { device: String },

    #[error("Failed to list mounted filesystems")]
    ListMounts,

    #[error("Failed to find the mount point of structure {structure}")]
    FindMountPoint { structure: String },

    #[error("Failed to load device traits from '{path}'")]
    LoadDeviceTraits { path: String },

    #[error("Failed to save device traits to '{path}'")]
    SaveDeviceTraits { path: String },

    #[error("Failed to render output")]
    RenderOutput,
}

fn mismatch_suffix(reason: &Option<StructureMismatch>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

fn bound_and_iec(value: &u64) -> String {
    if *value == UNBOUNDED_STRUCTURE_OFFSET {
        "unbounded".into()
    } else {
        bytes_and_iec(value)
    }
}

fn iec(value: &u64) -> String {
    ByteCount(*value).to_iec_string()
}

/// The reason an on-disk partition could not be paired with the gadget
/// structure of the same name or position.
#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum StructureMismatch {
    #[error("start offsets do not match (disk: {} and gadget: {})", bytes_and_iec(.disk), bytes_and_iec(.gadget))]
    StartOffset { disk: u64, gadget: u64 },

    #[error("start offset is not in the valid gadget interval (disk: {} and gadget: min {} - max {})", bytes_and_iec(.disk), bytes_and_iec(.min), bound_and_iec(.max))]
    StartOffsetRange { disk: u64, min: u64, max: u64 },

    #[error("on disk size {} is smaller than gadget size {}", bytes_and_iec(.disk), bytes_and_iec(.gadget))]
    SizeSmaller { disk: u64, gadget: u64 },

    #[error("on disk size {} is larger than gadget size {} (and the role should not be expanded)", bytes_and_iec(.disk), bytes_and_iec(.gadget))]
    SizeLarger { disk: u64, gadget: u64 },

    #[error("filesystems do not match and the partition is not creatable at install")]
    FilesystemNotCreatable { disk: String, gadget: String },

    #[error("filesystems do not match (disk: \"{disk}\" and gadget: \"{gadget}\"), the partition is creatable at install but is expected to exist already")]
    FilesystemExpectedCreated { disk: String, gadget: String },
}

/// A laid out volume could not be reconciled with the partition table found on
/// a disk.
#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum DiskMatchError {
    #[error("disk partitioning schema \"{disk}\" doesn't match gadget schema \"{gadget}\"")]
    SchemaMismatch { disk: String, gadget: String },

    #[error("disk ID \"{disk}\" doesn't match gadget volume ID \"{gadget}\"")]
    IdMismatch { disk: String, gadget: String },

    #[error("device {device} (last usable byte at {}) is too small to fit the requested minimal size ({})", iec(.usable), iec(.required))]
    DiskTooSmall {
        device: String,
        usable: u64,
        required: u64,
    },

    #[error("gadget structure {structure} {what} {value} is not a multiple of disk sector size {sector_size}")]
    SectorAlignment {
        structure: String,
        what: String,
        value: u64,
        sector_size: u64,
    },

    #[error("cannot find disk partition {node} (starting at {start}) in gadget{}", mismatch_suffix(.reason))]
    UnexpectedDiskPartition {
        node: String,
        start: u64,
        reason: Option<StructureMismatch>,
    },

    #[error("cannot find gadget structure {structure} on disk")]
    MissingGadgetStructure { structure: String },

    #[error("partition {node} is expected to be encrypted but is not named {structure}-enc")]
    EncryptedLabelMismatch { node: String, structure: String },

    #[error("partition {node} is expected to be encrypted but does not have an encrypted filesystem")]
    NotEncrypted { node: String, structure: String },

    #[error("encrypted structure parameter missing required parameter \"method\" for structure {structure}")]
    MissingEncryptionMethod { structure: String },

    #[error("unsupported encrypted structure type {method} for structure {structure}")]
    UnsupportedEncryptionMethod { structure: String, method: String },

    #[error("expected encrypted structure {structure} not present on disk")]
    MissingExpectedEncryptedStructure { structure: String },
}

/// A new gadget revision cannot replace the installed one.
#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateIncompatibleError {
    #[error("gadgets with multiple volumes are unsupported")]
    MultipleVolumes,

    #[error("cannot find entry for volume \"{volume}\" in updated gadget info")]
    VolumeNotFound { volume: String },

    #[error("incompatible layout change: incompatible bootloader change from {old} to {new}")]
    IncompatibleBootloaderChange { old: String, new: String },

    #[error("incompatible layout change: incompatible schema change from {old} to {new}")]
    IncompatibleSchemaChange { old: String, new: String },

    #[error("incompatible layout change: incompatible ID change from {old} to {new}")]
    IncompatibleIdChange { old: String, new: String },

    #[error("incompatible layout change: cannot unset partial property \"{property}\" once it was resolved")]
    PartialDowngradeNotAllowed { property: String },

    #[error("incompatible layout change: incompatible change in the number of structures from {old} to {new}")]
    StructureCountChanged { old: usize, new: usize },

    #[error("incompatible layout change: incompatible structure {structure} change: cannot change {field} from {old} to {new}")]
    IncompatibleStructureChange {
        structure: String,
        field: String,
        old: String,
        new: String,
    },

    #[error("incompatible layout change: incompatible structure {structure} change: cannot change a bare structure to filesystem one")]
    BareToFilesystem { structure: String },

    #[error("incompatible layout change: incompatible structure {structure} change: cannot change a filesystem structure to a bare one")]
    FilesystemToBare { structure: String },

    #[error("incompatible layout change: incompatible structure {structure} change: current start offset {} is outside of the new valid range [{}, {}]", bytes_and_iec(.offset), bytes_and_iec(.min), bound_and_iec(.max))]
    StartOffsetOutOfRange {
        structure: String,
        offset: u64,
        min: u64,
        max: u64,
    },
}

#[derive(Debug, Clone, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InternalError {
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Each variant of `ErrorKind` corresponds to a different category of error. The categories are
/// intended to be user-meaningful and to tell gadget authors from installer bugs.
#[derive(Debug, Eq, thiserror::Error, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// The gadget description or another input could not be read or decoded.
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    /// The gadget description violates a role, type, filesystem or size invariant.
    #[error(transparent)]
    Validation(#[from] GadgetValidationError),

    /// Structures overlap, lie outside their valid interval or reference unknown structures.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The gadget volume does not fit the partition table found on the disk.
    #[error(transparent)]
    DiskMatch(#[from] DiskMatchError),

    /// The new gadget revision cannot replace the installed one.
    #[error(transparent)]
    UpdateIncompatible(#[from] UpdateIncompatibleError),

    /// An external collaborator failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A bug was encountered.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[derive(Debug)]
struct GadgetErrorInner {
    kind: ErrorKind,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

pub struct GadgetError(Box<GadgetErrorInner>);
impl GadgetError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        GadgetError(Box::new(GadgetErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    #[track_caller]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(InternalError::Internal(msg.into()))
    }

    pub fn unstructured(self, context: impl Into<Cow<'static, str>>) -> anyhow::Error {
        match self.0.source {
            Some(source) => source.context(self.0.kind).context(context.into()),
            None => anyhow::Error::from(self.0.kind).context(context.into()),
        }
    }

    /// Returns a reference to the inner ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }
}

macro_rules! impl_from_leaf_error {
    ($($leaf:ty),* $(,)?) => {
        $(
            impl From<$leaf> for GadgetError {
                #[track_caller]
                fn from(error: $leaf) -> Self {
                    GadgetError::new(error)
                }
            }
        )*
    };
}

impl_from_leaf_error!(
    InvalidInputError,
    GadgetValidationError,
    LayoutError,
    DiskMatchError,
    UpdateIncompatibleError,
    ExecutionError,
    InternalError,
);

pub trait ReportError<T, K> {
    /// Convert this error into a structured GadgetError.
    fn structured(self, kind: K) -> Result<T, GadgetError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, GadgetError> {
        match self {
            Some(t) => Ok(t),
            None => Err(GadgetError::new(kind)),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, GadgetError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(GadgetError(Box::new(GadgetErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: Some(e.into()),
                context: Vec::new(),
            }))),
        }
    }
}

pub trait GadgetResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, GadgetError>;

    /// Convert the error into an unstructured error.
    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error>;
}

impl<T> GadgetResultExt<T> for Result<T, GadgetError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, GadgetError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }

    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error> {
        self.map_err(|e| e.unstructured(context))
    }
}

impl Serialize for GadgetError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("gadget-error", 5)?;
        state.serialize_field("message", &self.0.kind.to_string())?;
        match self.0.kind {
            ErrorKind::InvalidInput(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Validation(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Layout(ref e) => state.serialize_field("error", e)?,
            ErrorKind::DiskMatch(ref e) => state.serialize_field("error", e)?,
            ErrorKind::UpdateIncompatible(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Execution(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Internal(ref e) => state.serialize_field("error", e)?,
        }
        state.serialize_field("category", <&str>::from(&self.0.kind))?;
        state.serialize_field(
            "location",
            &format!("{}:{}", self.0.location.file(), self.0.location.line()),
        )?;
        match self.0.source {
            Some(ref e) => state.serialize_field("cause", &Some(format!("{:?}", e)))?,
            None => state.serialize_field("cause", &None::<String>)?,
        }
        state.end()
    }
}

impl Debug for GadgetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{: >5}: ", i)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{: >5}: ", index)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}
