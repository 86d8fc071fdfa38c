use serde::{Deserialize, Serialize};

use crate::primitives::bytes::ByteCount;

use super::{error::ContentValidationError, relative_offset::RelativeOffset};

/// Content of a structure: either a raw image written into a bare structure,
/// or a source copied to a target inside a filesystem structure.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VolumeContent {
    /// Path, relative to the gadget root, copied into the filesystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Destination of the source inside the filesystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Raw image written at a byte offset of a bare structure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Offset of the image relative to the start of the structure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<ByteCount>,

    /// Location where the absolute offset of the image is patched in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_write: Option<RelativeOffset>,

    /// Size reserved for the image. Defaults to the image size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ByteCount>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unpack: bool,
}

impl VolumeContent {
    fn has_image_geometry(&self) -> bool {
        self.offset.is_some() || self.offset_write.is_some() || self.size.is_some()
    }

    /// Checks content of a structure without a filesystem.
    pub fn validate_bare(&self) -> Result<(), ContentValidationError> {
        if self.source.is_some() || self.target.is_some() {
            return Err(ContentValidationError::NonImageOnBare);
        }
        match self.image.as_deref() {
            None | Some("") => Err(ContentValidationError::MissingImage),
            Some(_) => Ok(()),
        }
    }

    /// Checks content of a structure carrying a filesystem.
    pub fn validate_filesystem(&self) -> Result<(), ContentValidationError> {
        if self.image.is_some() || self.has_image_geometry() {
            return Err(ContentValidationError::ImageOnFilesystem);
        }
        match (self.source.as_deref(), self.target.as_deref()) {
            (Some(source), Some(target)) if !source.is_empty() && !target.is_empty() => Ok(()),
            _ => Err(ContentValidationError::MissingSourceOrTarget),
        }
    }

    /// Checks content of an eMMC hardware partition, which is always a plain
    /// image placed by the firmware.
    pub fn validate_emmc(&self) -> Result<(), ContentValidationError> {
        self.validate_bare()?;
        if self.has_image_geometry() {
            return Err(ContentValidationError::EmmcContentGeometry);
        }
        Ok(())
    }

    /// Name used for the content in diagnostics.
    pub fn describe(&self, index: usize) -> String {
        match self.image.as_deref().or(self.source.as_deref()) {
            Some(name) => format!("#{index} (\"{name}\")"),
            None => format!("#{index}"),
        }
    }
}
