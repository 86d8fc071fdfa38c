//! Operations behind the subcommands of the `gadget` binary.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::Serialize;

use gadget_api::{
    config::{
        self,
        layout::{self, LaidOutVolume},
        GadgetInfo, Model, Volume,
    },
    constants::DISK_MAPPING_FILENAME,
    error::{ExecutionError, GadgetError, GadgetResultExt, InvalidInputError, ReportError},
    status::OnDiskVolume,
};

use crate::{
    engine::{
        self, EncryptionMethod, MatchOptions, MountLookup, StructureEncryption, StructureLocation,
        VolumeMatch,
    },
    traits::{self as device_traits, DiskVolumeDeviceTraits},
};

/// Loads a gadget from its description file or from the root directory of
/// the gadget.
pub fn load_gadget(path: &Path, model: Option<&dyn Model>) -> Result<GadgetInfo, GadgetError> {
    if path.is_dir() {
        return config::read_info(path, model)
            .message(format!("Failed to load gadget from '{}'", path.display()));
    }

    let contents = fs::read_to_string(path).structured(InvalidInputError::ReadGadgetFile {
        path: path.display().to_string(),
    })?;
    config::info_from_gadget_yaml(&contents, model)
        .message(format!("Failed to load gadget from '{}'", path.display()))
}

/// Picks a volume by name, or the only volume of the gadget.
pub fn select_volume<'a>(
    info: &'a GadgetInfo,
    name: Option<&str>,
) -> Result<&'a Volume, GadgetError> {
    match name {
        Some(name) => info
            .volume(name)
            .structured(InvalidInputError::UnknownVolume {
                volume: name.into(),
            }),
        None if info.volumes.len() == 1 => info
            .volumes
            .values()
            .next()
            .structured(InvalidInputError::VolumeNotSelected { count: 1 }),
        None => Err(GadgetError::new(InvalidInputError::VolumeNotSelected {
            count: info.volumes.len(),
        })),
    }
}

/// Lays out the selected volumes of a gadget, or all of them.
pub fn layout(info: &GadgetInfo, volume: Option<&str>) -> Result<Vec<LaidOutVolume>, GadgetError> {
    let volumes: Vec<&Volume> = match volume {
        Some(_) => vec![select_volume(info, volume)?],
        None => info.volumes.values().collect(),
    };

    volumes
        .into_iter()
        .map(|v| {
            layout::layout_volume(v)
                .map_err(GadgetError::from)
                .message(format!("Failed to lay out volume '{}'", v.name))
        })
        .collect()
}

/// Parses a `NAME=METHOD` encryption option.
pub fn parse_encryption_option(option: &str) -> Result<(String, StructureEncryption), GadgetError> {
    match option.split_once('=') {
        Some((name, method)) if !name.is_empty() && !method.is_empty() => {
            if method.parse::<EncryptionMethod>().is_err() {
                debug!("Encryption method '{method}' of structure {name} is not known");
            }
            Ok((name.into(), StructureEncryption::with_method(method)))
        }
        _ => Err(GadgetError::new(InvalidInputError::InvalidEncryptionOption {
            option: option.into(),
        })),
    }
}

/// Reads a disk description written as JSON.
pub fn load_disk(path: &Path) -> Result<OnDiskVolume, GadgetError> {
    let contents = fs::read_to_string(path).structured(InvalidInputError::ReadDiskDescription {
        path: path.display().to_string(),
    })?;
    serde_json::from_str(&contents).structured(InvalidInputError::ParseDiskDescription)
}

/// Outcome of matching a volume to a disk.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MatchReport {
    #[serde(flatten)]
    pub volume_match: VolumeMatch,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<BTreeMap<usize, StructureLocation>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits_file: Option<PathBuf>,
}

/// Matches a volume to a disk, then optionally resolves structure locations
/// and records the traits of the disk.
pub fn match_disk(
    volume: &Volume,
    disk: &OnDiskVolume,
    options: &MatchOptions,
    mounts: Option<&dyn MountLookup>,
    traits_dir: Option<&Path>,
) -> Result<MatchReport, GadgetError> {
    let volume_match = engine::match_volume(volume, disk, options)
        .map_err(GadgetError::from)
        .message(format!(
            "Failed to match volume '{}' to disk '{}'",
            volume.name, disk.device
        ))?;
    info!(
        "Matched volume '{}' to disk '{}'",
        volume.name, volume_match.device
    );

    let locations = mounts
        .map(|mounts| engine::structure_locations(volume, &volume_match, mounts))
        .transpose()?;

    let traits_file = match traits_dir {
        Some(dir) => {
            // Traits of other volumes are kept
            let mut traits = device_traits::load_disk_volumes_device_traits(dir).structured(
                ExecutionError::LoadDeviceTraits {
                    path: dir.display().to_string(),
                },
            )?;
            traits.insert(
                volume.name.clone(),
                DiskVolumeDeviceTraits::from_match(
                    disk,
                    &volume_match,
                    options.expected_structure_encryption.clone(),
                ),
            );
            device_traits::save_disk_volumes_device_traits(dir, &traits).structured(
                ExecutionError::SaveDeviceTraits {
                    path: dir.display().to_string(),
                },
            )?;
            Some(dir.join(DISK_MAPPING_FILENAME))
        }
        None => None,
    };

    Ok(MatchReport {
        volume_match,
        locations,
        traits_file,
    })
}

/// Checks that the gadget at `new` may replace the one at `old`.
pub fn check_update(old: &Path, new: &Path) -> Result<(), GadgetError> {
    let old_info = load_gadget(old, None)?;
    let new_info = load_gadget(new, None)?;

    engine::is_compatible(&old_info, &new_info)
        .map_err(GadgetError::from)
        .message(format!(
            "Gadget '{}' cannot replace '{}'",
            new.display(),
            old.display()
        ))?;

    if let (Some(old_volume), Some(new_volume)) = (
        old_info.volumes.values().next(),
        new_info.volumes.values().next(),
    ) {
        let updated =
            engine::structures_to_update(old_volume, new_volume, &engine::EditionPolicy);
        info!(
            "Update of volume '{}' writes structures {:?}",
            new_volume.name, updated
        );
    }
    Ok(())
}
