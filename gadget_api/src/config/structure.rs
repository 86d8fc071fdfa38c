use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{constants::MBR_MAX_SIZE, primitives::bytes::ByteCount};

use super::{
    content::VolumeContent, relative_offset::RelativeOffset, role::Role,
    structure_type::StructureType,
};

/// Filesystem a structure is formatted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filesystem {
    Vfat,
    Vfat16,
    Vfat32,
    Ext4,
    /// Explicitly no filesystem, the structure holds raw content.
    None,
}

impl Filesystem {
    /// Name of the filesystem as reported by the operating system.
    pub fn linux_name(&self) -> &'static str {
        match self {
            Filesystem::Vfat | Filesystem::Vfat16 | Filesystem::Vfat32 => "vfat",
            Filesystem::Ext4 => "ext4",
            Filesystem::None => "none",
        }
    }
}

impl TryFrom<&str> for Filesystem {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "vfat" => Ok(Filesystem::Vfat),
            "vfat-16" => Ok(Filesystem::Vfat16),
            "vfat-32" => Ok(Filesystem::Vfat32),
            "ext4" => Ok(Filesystem::Ext4),
            "none" => Ok(Filesystem::None),
            _ => Err(format!("invalid filesystem \"{s}\"")),
        }
    }
}

impl Display for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Filesystem::Vfat => "vfat",
            Filesystem::Vfat16 => "vfat-16",
            Filesystem::Vfat32 => "vfat-32",
            Filesystem::Ext4 => "ext4",
            Filesystem::None => "none",
        })
    }
}

fn deserialize_filesystem<'de, D>(deserializer: D) -> Result<Option<Filesystem>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => Filesystem::try_from(s.as_str())
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn serialize_filesystem<S>(value: &Option<Filesystem>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(fs) => serializer.serialize_str(&fs.to_string()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_edition<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            let shown = match &value {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                other => format!("{other:?}"),
            };
            serde::de::Error::custom(format!(
                "\"edition\" must be a positive number, not \"{shown}\""
            ))
        })
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Update policy of a structure.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VolumeUpdate {
    /// Revision of the structure content. Content is only updated when the
    /// edition increases.
    #[serde(
        default,
        deserialize_with = "deserialize_edition",
        skip_serializing_if = "is_zero"
    )]
    pub edition: u32,

    /// Paths, relative to the filesystem root, that are kept during updates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preserve: Vec<String>,
}

/// A partition, or a raw region of a volume that is not a partition.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct VolumeStructure {
    /// Name of the structure, used as the GPT partition name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        rename = "filesystem-label",
        skip_serializing_if = "Option::is_none"
    )]
    pub label: Option<String>,

    /// Absolute start offset. When unset the structure follows the one
    /// declared before it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<ByteCount>,

    /// Location where the start offset of this structure is patched in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_write: Option<RelativeOffset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<ByteCount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ByteCount>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub structure_type: Option<StructureType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// GPT partition ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_filesystem",
        serialize_with = "serialize_filesystem",
        skip_serializing_if = "Option::is_none"
    )]
    pub filesystem: Option<Filesystem>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<VolumeContent>,

    #[serde(default)]
    pub update: VolumeUpdate,

    /// Position of the structure in the gadget description.
    #[serde(skip)]
    pub yaml_index: usize,
}

impl VolumeStructure {
    /// Smallest size the structure may take, falling back to its size.
    pub fn min_size(&self) -> u64 {
        self.min_size.or(self.size).map(ByteCount::bytes).unwrap_or(0)
    }

    /// Declared size, if known.
    pub fn size(&self) -> Option<u64> {
        self.size.map(ByteCount::bytes)
    }

    /// Size the structure takes when it is as large as allowed. Structures
    /// without a declared size are as small as possible.
    pub fn max_size(&self) -> u64 {
        self.size().unwrap_or_else(|| self.min_size())
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset.map(ByteCount::bytes)
    }

    /// Whether the structure cannot grow beyond its minimum size.
    pub fn is_fixed_size(&self) -> bool {
        self.size.is_some() && self.min_size() == self.max_size()
    }

    /// Whether the structure carries a filesystem.
    pub fn has_filesystem(&self) -> bool {
        !matches!(self.filesystem, None | Some(Filesystem::None))
    }

    /// Whether the structure is a partition, i.e. it appears in the partition
    /// table.
    pub fn is_partition(&self) -> bool {
        self.structure_type != Some(StructureType::Bare) && self.role != Some(Role::Mbr)
    }

    pub fn is_bare(&self) -> bool {
        self.structure_type == Some(StructureType::Bare)
    }

    /// Name of the filesystem as reported by the operating system.
    pub fn linux_filesystem(&self) -> Option<&'static str> {
        match self.filesystem {
            Some(Filesystem::None) | None => None,
            Some(fs) => Some(fs.linux_name()),
        }
    }

    /// Whether the structure fits the boot code area.
    pub fn fits_mbr(&self) -> bool {
        self.max_size() <= MBR_MAX_SIZE
    }

    /// Name used for the structure in diagnostics, e.g. `#1 ("ubuntu-seed")`.
    pub fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("#{} (\"{name}\")", self.yaml_index),
            None => format!("#{}", self.yaml_index),
        }
    }
}
