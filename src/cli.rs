use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use log::LevelFilter;

use gadget_api::config::{ModelGrade, Role};

use crate::GADGET_VERSION;

#[derive(Parser, Debug)]
#[clap(version = GADGET_VERSION)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Info)]
    pub verbosity: LevelFilter,

    /// Also write logs, as JSON lines, to this file
    #[arg(global = true, long)]
    pub log_file: Option<PathBuf>,

    /// Path to save an eventual fatal error
    #[arg(global = true, short, long)]
    pub error: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode, validate and lay out every volume of a gadget
    Validate {
        /// The gadget description, or the root directory of the gadget
        #[clap(index = 1)]
        gadget: PathBuf,

        /// Validate for a classic model
        #[clap(long)]
        classic: bool,

        /// Validate for a model of this grade [unset, signed, secured, dangerous]
        #[clap(long)]
        grade: Option<ModelGrade>,
    },

    /// Print the laid out volumes of a gadget
    Layout {
        /// The gadget description, or the root directory of the gadget
        #[clap(index = 1)]
        gadget: PathBuf,

        /// Only lay out this volume
        #[clap(long)]
        volume: Option<String>,
    },

    /// Match a gadget volume to a disk
    Match {
        /// The gadget description, or the root directory of the gadget
        #[clap(index = 1)]
        gadget: PathBuf,

        /// Description of the disk, as JSON
        #[clap(long, conflicts_with = "device", required_unless_present = "device")]
        disk: Option<PathBuf>,

        /// Disk device to probe with lsblk
        #[clap(long)]
        device: Option<PathBuf>,

        /// Volume to match, may be omitted when the gadget has a single volume
        #[clap(long)]
        volume: Option<String>,

        /// Expect the partitions created at install to exist already
        #[clap(long)]
        strict: bool,

        /// Accept an undeclared trailing writable partition
        #[clap(long)]
        allow_implicit_system_data: bool,

        /// Structure expected to be encrypted, as NAME=METHOD
        #[clap(long = "encrypted")]
        encrypted: Vec<String>,

        /// Role, besides system-data, whose partition may be larger than declared
        #[clap(long = "expandable-role")]
        expandable_roles: Vec<Role>,

        /// Directory to save the traits of the matched disk to
        #[clap(long)]
        traits_dir: Option<PathBuf>,

        /// Also print where the content of each structure is written
        #[clap(long)]
        locations: bool,
    },

    /// Check that a gadget revision can replace the installed one
    CheckUpdate {
        /// The installed gadget description
        #[clap(index = 1)]
        old: PathBuf,

        /// The new gadget description
        #[clap(index = 2)]
        new: PathBuf,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Validate { .. } => "validate",
            Commands::Layout { .. } => "layout",
            Commands::Match { .. } => "match",
            Commands::CheckUpdate { .. } => "check-update",
        }
    }
}

impl Display for Commands {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.name())
    }
}
