//! Reconciliation of gadget volumes with disks and with newer gadget
//! revisions.

pub mod compatibility;
pub mod locations;
pub mod matching;
pub mod probe;

pub use compatibility::{
    check_volume_compatibility, is_compatible, structures_to_update, EditionPolicy, RemodelPolicy,
    UpdatePolicy,
};
pub use locations::{structure_locations, MountLookup, StructureLocation};
pub use matching::{
    match_volume, EncryptionMethod, MatchOptions, MatchedStructure, StructureEncryption,
    VolumeMatch,
};
pub use probe::{match_device, DiskProbe, LsblkProbe};
