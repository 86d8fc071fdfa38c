use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

use super::{layout, structure::VolumeStructure};

/// Partitioning schema of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Schema {
    /// Master Boot Record
    Mbr,
    /// GUID Partition Table
    Gpt,
    /// eMMC hardware partitions, addressed outside of any partition table.
    Emmc,
}

impl TryFrom<&str> for Schema {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "mbr" => Ok(Schema::Mbr),
            "gpt" => Ok(Schema::Gpt),
            "emmc" => Ok(Schema::Emmc),
            _ => Err(format!("invalid schema \"{s}\"")),
        }
    }
}

impl Serialize for Schema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.into())
    }
}

/// Bootloader a volume carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Bootloader {
    Grub,
    UBoot,
    AndroidBoot,
    Piboot,
    Lk,
}

impl TryFrom<&str> for Bootloader {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "grub" => Ok(Bootloader::Grub),
            "u-boot" => Ok(Bootloader::UBoot),
            "android-boot" => Ok(Bootloader::AndroidBoot),
            "piboot" => Ok(Bootloader::Piboot),
            "lk" => Ok(Bootloader::Lk),
            _ => Err("bootloader must be one of grub, u-boot, android-boot, piboot or lk".into()),
        }
    }
}

impl Serialize for Bootloader {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.into())
    }
}

/// Aspects of a volume intentionally left undetermined until install time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum PartialProperty {
    Schema,
    Structure,
    Filesystem,
    Size,
}

bitflags::bitflags! {
    /// Set of partial properties declared by a volume.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Partial: u8 {
        const Schema = 1;
        const Structure = 1 << 1;
        const Filesystem = 1 << 2;
        const Size = 1 << 3;
    }
}

impl From<PartialProperty> for Partial {
    fn from(property: PartialProperty) -> Self {
        match property {
            PartialProperty::Schema => Partial::Schema,
            PartialProperty::Structure => Partial::Structure,
            PartialProperty::Filesystem => Partial::Filesystem,
            PartialProperty::Size => Partial::Size,
        }
    }
}

impl Partial {
    /// Returns the declared properties in a stable order.
    pub fn properties(&self) -> Vec<PartialProperty> {
        use strum::IntoEnumIterator;

        PartialProperty::iter()
            .filter(|p| self.contains(Partial::from(*p)))
            .collect()
    }
}

impl<'de> Deserialize<'de> for Partial {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .try_fold(Partial::empty(), |acc, s| {
                s.parse::<PartialProperty>()
                    .map(|p| acc | Partial::from(p))
                    .map_err(|_| {
                        serde::de::Error::custom(format!("invalid partial property \"{s}\""))
                    })
            })
    }
}

impl Serialize for Partial {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.properties()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .serialize(serializer)
    }
}

/// Deserializes an optional enum spelled as a string, where the empty string
/// means unset.
fn deserialize_optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: for<'a> TryFrom<&'a str, Error = String>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => T::try_from(s.as_str())
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Storage volume of a device: the partition schema and the structures laid
/// out on it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Volume {
    /// Name of the volume, the key of the volume in the gadget description.
    #[serde(skip)]
    pub name: String,

    /// Partitioning schema. Unset until resolved when the volume declares a
    /// partial schema.
    #[serde(
        default,
        deserialize_with = "deserialize_optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub schema: Option<Schema>,

    #[serde(
        default,
        deserialize_with = "deserialize_optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub bootloader: Option<Bootloader>,

    /// Disk ID: two hex digits on MBR volumes, a GUID on GPT volumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Partial::is_empty")]
    pub partial: Partial,

    /// Structures of the volume. After resolution they are ordered by start
    /// offset; `yaml_index` keeps the declaration order.
    #[serde(default)]
    pub structure: Vec<VolumeStructure>,
}

impl Volume {
    /// Schema to use when none was resolved.
    pub fn effective_schema(&self) -> Option<Schema> {
        match self.schema {
            Some(schema) => Some(schema),
            None if self.has_partial(Partial::Schema) => None,
            None => Some(Schema::Gpt),
        }
    }

    pub fn has_partial(&self, property: Partial) -> bool {
        self.partial.contains(property)
    }

    pub fn is_emmc(&self) -> bool {
        self.schema == Some(Schema::Emmc)
    }

    /// Finds a structure by name.
    pub fn structure_by_name(&self, name: &str) -> Option<&VolumeStructure> {
        self.structure
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
    }

    /// Finds a structure by its declaration index.
    pub fn structure_by_yaml_index(&self, yaml_index: usize) -> Option<&VolumeStructure> {
        self.structure.iter().find(|s| s.yaml_index == yaml_index)
    }

    /// Smallest image that satisfies the minimum size of every structure.
    pub fn min_size(&self) -> u64 {
        (0..self.structure.len())
            .map(|idx| {
                layout::min_structure_offset(&self.structure, idx)
                    .saturating_add(self.structure[idx].min_size())
            })
            .max()
            .unwrap_or(0)
    }
}
