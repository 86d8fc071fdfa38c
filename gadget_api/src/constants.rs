use const_format::formatcp;

// Gadget description constants

/// Directory, relative to the gadget root, holding the gadget metadata.
pub const GADGET_META_DIRECTORY: &str = "meta";

/// Name of the gadget description file.
pub const GADGET_YAML_FILENAME: &str = "gadget.yaml";

/// Gadget description path relative to the gadget root (meta/gadget.yaml).
pub const GADGET_YAML_RELATIVE_PATH: &str =
    formatcp!("{GADGET_META_DIRECTORY}/{GADGET_YAML_FILENAME}");

/// Key of the defaults stanza that configures the system itself.
pub const SYSTEM_DEFAULTS_KEY: &str = "system";

/// Length of a valid snap ID.
pub const VALID_SNAP_ID_LENGTH: usize = 32;

// Layout constants

/// Offset of the first structure on a volume when not otherwise specified and
/// the structure is not the MBR.
pub const NON_MBR_START_OFFSET: u64 = 1024 * 1024;

/// Maximum size of a structure with the "mbr" role.
pub const MBR_MAX_SIZE: u64 = 446;

/// Size of the pointer patched at an offset-write location.
pub const OFFSET_WRITE_POINTER_SIZE: u64 = 4;

/// Exclusive upper limit of a relative offset (4 GiB).
pub const RELATIVE_OFFSET_LIMIT: u64 = 4 * 1024 * 1024 * 1024;

/// Upper bound of a structure start offset that is not constrained by any
/// following structure.
pub const UNBOUNDED_STRUCTURE_OFFSET: u64 = u64::MAX;

/// Size of the sector assumed when reasoning about the GPT header area.
pub const GPT_HEADER_SECTOR_SIZE: u64 = 512;

/// Protective MBR, GPT header and the 128 partition entries.
pub const GPT_HEADER_SIZE: u64 = 34 * GPT_HEADER_SECTOR_SIZE;

// Filesystem label constants

/// Implicit label of the system-data structure on systems without modes.
pub const IMPLICIT_SYSTEM_DATA_LABEL: &str = "writable";

/// Implicit label of the system-data structure on systems with modes.
pub const UBUNTU_DATA_LABEL: &str = "ubuntu-data";

/// Implicit label of the system-boot structure on systems with modes.
pub const UBUNTU_BOOT_LABEL: &str = "ubuntu-boot";

/// Implicit label of the system-seed structure on systems with modes.
pub const UBUNTU_SEED_LABEL: &str = "ubuntu-seed";

/// Implicit label of the system-save structure on systems with modes.
pub const UBUNTU_SAVE_LABEL: &str = "ubuntu-save";

/// Legacy filesystem label that implies the system-boot role.
pub const LEGACY_SYSTEM_BOOT_LABEL: &str = "system-boot";

// On disk constants

/// Suffix of the filesystem label of an encrypted structure.
pub const ENCRYPTED_LABEL_SUFFIX: &str = "-enc";

/// Filesystem type reported for LUKS containers.
pub const LUKS_FILESYSTEM_TYPE: &str = "crypto_LUKS";

/// Name of the file persisting device traits of the matched volumes.
pub const DISK_MAPPING_FILENAME: &str = "disk-mapping.json";

/// Names of the eMMC hardware partitions a gadget may describe.
pub const EMMC_HARDWARE_PARTITIONS: [&str; 2] = ["boot0", "boot1"];
