use std::fmt::Display;

use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Identifier of a disk or partition as reported by the partitioning tools.
///
/// GPT disks and partitions carry proper UUIDs. MBR disks carry a 32 bit
/// disk signature (e.g. `7c301cbd`) and MBR partitions derive their ID from it
/// (e.g. `7c301cbd-02`), which do not conform to the UUID format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OsUuid {
    Uuid(Uuid),
    Relaxed(String),
}

impl OsUuid {
    /// Provides the UUID stored in this enum, if it is a proper UUID.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            OsUuid::Uuid(uuid) => Some(*uuid),
            OsUuid::Relaxed(_) => None,
        }
    }

    /// Checks whether two identifiers name the same disk or partition.
    ///
    /// UUIDs are compared by value. Relaxed identifiers are compared
    /// case-insensitively, ignoring a leading `0x`.
    pub fn same_id(&self, other: &OsUuid) -> bool {
        match (self, other) {
            (OsUuid::Uuid(a), OsUuid::Uuid(b)) => a == b,
            (OsUuid::Relaxed(a), OsUuid::Relaxed(b)) => {
                strip_hex_prefix(a).eq_ignore_ascii_case(strip_hex_prefix(b))
            }
            _ => false,
        }
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

impl From<&str> for OsUuid {
    fn from(value: &str) -> Self {
        match Uuid::parse_str(value) {
            Ok(uuid) => Self::Uuid(uuid),
            Err(_) => Self::Relaxed(value.to_string()),
        }
    }
}

impl From<String> for OsUuid {
    fn from(value: String) -> Self {
        value.as_str().into()
    }
}

impl From<Uuid> for OsUuid {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl Display for OsUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsUuid::Uuid(uuid) => write!(f, "{}", uuid.hyphenated()),
            OsUuid::Relaxed(s) => write!(f, "{s}"),
        }
    }
}

impl<'de> Deserialize<'de> for OsUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(String::deserialize(deserializer)?.as_str().into())
    }
}

impl Serialize for OsUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}
