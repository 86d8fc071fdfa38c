//! Module for interacting with the `findmnt` command.
//!
//! `findmnt` reads `/proc/self/mountinfo` and reports every mounted
//! filesystem visible to the current process. With `--json` the mounts come
//! back as a tree, each entry listing the mounts under it in `children`, and
//! the kernel escaping of paths is already undone.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Error};
use serde::Deserialize;

use crate::exe::RunAndCheck;

/// Columns requested from `findmnt`, matching the fields of
/// `MountpointMetadata`.
pub const FINDMNT_COLUMNS: &str = "id,target,source,fstype";

/// Output of `findmnt --json`.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct FindMnt {
    pub filesystems: Vec<MountpointMetadata>,
}

/// A mounted filesystem with the columns of `FINDMNT_COLUMNS`.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub struct MountpointMetadata {
    /// Mount ID.
    pub id: u32,

    /// Mount target.
    pub target: PathBuf,

    /// Source device. Pseudo filesystems such as overlays may have none.
    pub source: Option<PathBuf>,

    /// Filesystem type as named by the kernel.
    pub fstype: String,

    /// Mounts under this filesystem.
    #[serde(default)]
    pub children: Vec<MountpointMetadata>,
}

impl FindMnt {
    /// Runs `findmnt --json` and parses its output.
    pub fn run() -> Result<Self, Error> {
        let output = Command::new("findmnt")
            .arg("--json")
            .arg("-o")
            .arg(FINDMNT_COLUMNS)
            .output_and_check()
            .context("Failed to run findmnt")?;

        Self::from_json(&output).context("Failed to deserialize output of findmnt")
    }

    /// Parses the output of `findmnt --json`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Returns the target of the first mount of `source`, looking at parents
    /// before their children.
    pub fn mount_point_of(&self, source: impl AsRef<Path>) -> Option<&Path> {
        self.filesystems
            .iter()
            .find_map(|fs| fs.mount_point_of(source.as_ref()))
    }
}

impl MountpointMetadata {
    fn mount_point_of(&self, source: &Path) -> Option<&Path> {
        if self.source.as_deref() == Some(source) {
            return Some(&self.target);
        }

        self.children
            .iter()
            .find_map(|child| child.mount_point_of(source))
    }
}
