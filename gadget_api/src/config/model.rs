use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Grade of a device model. Models with a grade other than `Unset` boot
/// through a recovery system.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ModelGrade {
    #[default]
    Unset,
    Signed,
    Secured,
    Dangerous,
}

/// Capabilities of the device model a gadget is validated against.
pub trait Model {
    fn is_classic(&self) -> bool;

    fn grade(&self) -> ModelGrade;

    /// Whether the system boots through a recovery system.
    fn has_modes(&self) -> bool {
        self.grade() != ModelGrade::Unset
    }
}

/// Model capabilities given as plain values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelConstraints {
    pub classic: bool,
    pub grade: ModelGrade,
}

impl Model for ModelConstraints {
    fn is_classic(&self) -> bool {
        self.classic
    }

    fn grade(&self) -> ModelGrade {
        self.grade
    }
}
