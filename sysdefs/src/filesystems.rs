use serde::{de::value::Error, forward_to_deserialize_any, Deserialize, Deserializer};
use strum_macros::{EnumIs, IntoStaticStr};

/// Filesystem type observed on a block device, as reported by blkid/lsblk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, EnumIs)]
#[serde(untagged)]
pub enum BlockFilesystemType {
    Known(KnownFilesystemType),
    #[serde(untagged)]
    Other(String),
}

impl From<KnownFilesystemType> for BlockFilesystemType {
    fn from(fs: KnownFilesystemType) -> Self {
        BlockFilesystemType::Known(fs)
    }
}

impl From<&str> for BlockFilesystemType {
    fn from(fs: &str) -> Self {
        Self::deserialize(&mut EnumDeserializer(fs))
            .unwrap_or_else(|_| BlockFilesystemType::Other(fs.to_string()))
    }
}

impl BlockFilesystemType {
    /// Name of the filesystem type as the kernel and blkid spell it.
    pub fn name(&self) -> &str {
        match self {
            BlockFilesystemType::Known(fs) => <&'static str>::from(fs),
            BlockFilesystemType::Other(s) => s,
        }
    }

    /// Whether the device holds a LUKS container rather than a filesystem.
    pub fn is_encrypted(&self) -> bool {
        matches!(
            self,
            BlockFilesystemType::Known(KnownFilesystemType::CryptoLuks)
        )
    }

    /// Checks whether the observed type is the given filesystem. The names
    /// `vfat` and `msdos` designate the same family and compare equal.
    pub fn is(&self, linux_name: &str) -> bool {
        let other = BlockFilesystemType::from(linux_name);
        match (self, &other) {
            (BlockFilesystemType::Known(a), BlockFilesystemType::Known(b)) => {
                a.family() == b.family()
            }
            _ => self.name() == other.name(),
        }
    }
}

/// Filesystem and container types found on partitions of gadget volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KnownFilesystemType {
    Btrfs,
    Exfat,
    Ext2,
    Ext3,
    Ext4,
    Iso9660,
    Msdos,
    Squashfs,
    Swap,
    Vfat,
    Xfs,
    #[serde(rename = "crypto_LUKS")]
    #[strum(serialize = "crypto_LUKS")]
    CryptoLuks,
}

impl KnownFilesystemType {
    fn family(self) -> Self {
        match self {
            KnownFilesystemType::Msdos => KnownFilesystemType::Vfat,
            other => other,
        }
    }
}

/// Simple deserializer to convert a &str into an enum using serde.
struct EnumDeserializer<'de>(&'de str);
impl<'de> Deserializer<'de> for &mut EnumDeserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: serde::de::Visitor<'de>,
    {
        visitor.visit_str(self.0)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}
