use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Partition type recorded in a partition table entry.
///
/// MBR entries carry a one byte type code, GPT entries a type GUID.
/// Partitioning tools disagree on how to spell both (`0x0c`, `c`, `0C`,
/// lowercase or uppercase GUIDs), so the parsed value is the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionTypeCode {
    Mbr(u8),
    Gpt(Uuid),
    Unknown(String),
}

/// Partition types commonly used by gadget volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownPartitionType {
    /// EFI System Partition
    Esp,
    /// BIOS boot partition used by GRUB on GPT disks
    BiosBoot,
    /// Generic Linux file system partition
    LinuxGeneric,
    /// FAT32 with LBA addressing
    MbrFat32Lba,
    /// Linux native partition
    MbrLinux,
    /// EFI System Partition on MBR disks
    MbrEsp,
}

impl WellKnownPartitionType {
    pub fn to_str(&self) -> &'static str {
        match self {
            WellKnownPartitionType::Esp => "esp",
            WellKnownPartitionType::BiosBoot => "bios-boot",
            WellKnownPartitionType::LinuxGeneric => "linux-generic",
            WellKnownPartitionType::MbrFat32Lba => "fat32-lba",
            WellKnownPartitionType::MbrLinux => "linux",
            WellKnownPartitionType::MbrEsp => "esp",
        }
    }

    pub fn code(&self) -> PartitionTypeCode {
        match self {
            WellKnownPartitionType::Esp => {
                PartitionTypeCode::Gpt(Uuid::from_u128(0xc12a7328_f81f_11d2_ba4b_00a0c93ec93bu128))
            }
            WellKnownPartitionType::BiosBoot => {
                PartitionTypeCode::Gpt(Uuid::from_u128(0x21686148_6449_6e6f_744e_656564454649u128))
            }
            WellKnownPartitionType::LinuxGeneric => {
                PartitionTypeCode::Gpt(Uuid::from_u128(0x0fc63daf_8483_4772_8e79_3d69d8477de4u128))
            }
            WellKnownPartitionType::MbrFat32Lba => PartitionTypeCode::Mbr(0x0c),
            WellKnownPartitionType::MbrLinux => PartitionTypeCode::Mbr(0x83),
            WellKnownPartitionType::MbrEsp => PartitionTypeCode::Mbr(0xef),
        }
    }
}

impl PartitionTypeCode {
    /// The well-known partition type this code designates, if any.
    pub fn well_known(&self) -> Option<WellKnownPartitionType> {
        [
            WellKnownPartitionType::Esp,
            WellKnownPartitionType::BiosBoot,
            WellKnownPartitionType::LinuxGeneric,
            WellKnownPartitionType::MbrFat32Lba,
            WellKnownPartitionType::MbrLinux,
            WellKnownPartitionType::MbrEsp,
        ]
        .into_iter()
        .find(|known| known.code() == *self)
    }
}

impl From<&str> for PartitionTypeCode {
    fn from(value: &str) -> Self {
        let trimmed = value.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if !hex.is_empty() && hex.len() <= 2 {
            if let Ok(code) = u8::from_str_radix(hex, 16) {
                return PartitionTypeCode::Mbr(code);
            }
        }

        match Uuid::parse_str(trimmed) {
            Ok(uuid) => PartitionTypeCode::Gpt(uuid),
            Err(_) => PartitionTypeCode::Unknown(value.to_string()),
        }
    }
}

impl Display for PartitionTypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionTypeCode::Mbr(code) => write!(f, "{code:02X}"),
            PartitionTypeCode::Gpt(uuid) => {
                write!(f, "{}", uuid.hyphenated().to_string().to_uppercase())
            }
            PartitionTypeCode::Unknown(s) => write!(f, "{s}"),
        }
    }
}

impl<'de> Deserialize<'de> for PartitionTypeCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(String::deserialize(deserializer)?.as_str().into())
    }
}

impl Serialize for PartitionTypeCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}
