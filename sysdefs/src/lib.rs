pub mod filesystems;
pub mod osuuid;
pub mod partition_types;
