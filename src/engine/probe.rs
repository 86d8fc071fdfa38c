use std::path::Path;

use log::{debug, info};

use gadget_api::{
    config::Volume,
    error::{ExecutionError, GadgetError, ReportError},
    status::OnDiskVolume,
};

use super::matching::{match_volume, MatchOptions, VolumeMatch};

/// Reads the partition table of a disk.
pub trait DiskProbe {
    fn probe(&self, device: &Path) -> Result<OnDiskVolume, GadgetError>;
}

/// Probes disks with `lsblk`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LsblkProbe;

impl DiskProbe for LsblkProbe {
    fn probe(&self, device: &Path) -> Result<OnDiskVolume, GadgetError> {
        debug!("Probing disk '{}'", device.display());
        osutils::lsblk::probe(device).structured(ExecutionError::ProbeDisk {
            device: device.display().to_string(),
        })
    }
}

/// Probes `device` and matches the gadget volume against it.
pub fn match_device(
    volume: &Volume,
    device: &Path,
    probe: &dyn DiskProbe,
    options: &MatchOptions,
) -> Result<VolumeMatch, GadgetError> {
    let disk = probe.probe(device)?;
    info!(
        "Disk '{}' has {} partitions in a {} partition table",
        disk.device,
        disk.structures.len(),
        disk.schema
    );
    Ok(match_volume(volume, &disk, options)?)
}
