use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::constants::{
    IMPLICIT_SYSTEM_DATA_LABEL, UBUNTU_BOOT_LABEL, UBUNTU_DATA_LABEL, UBUNTU_SAVE_LABEL,
    UBUNTU_SEED_LABEL,
};

/// Role of a structure in the boot and install process.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    /// Boot code area at the start of the disk.
    Mbr,
    SystemBoot,
    SystemBootImage,
    SystemBootSelect,
    SystemSeed,
    /// Seed partition of classic systems without a recovery system.
    SystemSeedNull,
    SystemSeedImage,
    SystemSeedSelect,
    SystemData,
    SystemSave,
}

impl Role {
    /// Whether a partition with this role may be missing from the disk until
    /// the installer creates it.
    pub fn is_creatable_at_install(&self) -> bool {
        matches!(self, Role::SystemBoot | Role::SystemData | Role::SystemSave)
    }

    /// Filesystem label implied by the role when none is given explicitly.
    pub fn implicit_label(&self, modes: bool) -> Option<&'static str> {
        match (self, modes) {
            (Role::SystemData, false) => Some(IMPLICIT_SYSTEM_DATA_LABEL),
            (Role::SystemData, true) => Some(UBUNTU_DATA_LABEL),
            (Role::SystemSeed | Role::SystemSeedNull, true) => Some(UBUNTU_SEED_LABEL),
            (Role::SystemBoot, true) => Some(UBUNTU_BOOT_LABEL),
            (Role::SystemSave, true) => Some(UBUNTU_SAVE_LABEL),
            _ => None,
        }
    }
}
