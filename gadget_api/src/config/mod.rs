use std::{collections::BTreeMap, fmt::Display, fs, path::Path, str::FromStr};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{GADGET_YAML_RELATIVE_PATH, SYSTEM_DEFAULTS_KEY, VALID_SNAP_ID_LENGTH},
    error::{GadgetError, InvalidInputError, ReportError},
};

pub mod content;
pub mod error;
pub mod implicit;
pub mod layout;
pub mod model;
pub mod relative_offset;
pub mod role;
pub mod structure;
pub mod structure_type;
pub mod validation;
pub mod volume;

pub use content::VolumeContent;
pub use error::{
    ContentValidationError, GadgetValidationError, LayoutError, StructureValidationError,
    VolumeValidationError,
};
pub use model::{Model, ModelConstraints, ModelGrade};
pub use relative_offset::RelativeOffset;
pub use role::Role;
pub use structure::{Filesystem, VolumeStructure, VolumeUpdate};
pub use structure_type::StructureType;
pub use volume::{Bootloader, Partial, PartialProperty, Schema, Volume};

fn is_system_or_snap_id(s: &str) -> bool {
    s == SYSTEM_DEFAULTS_KEY || s.len() == VALID_SNAP_ID_LENGTH
}

/// One side of an interface connection, spelled `(<snap-id>|system):<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionEnd {
    pub snap_id: String,
    pub name: String,
}

impl ConnectionEnd {
    pub fn is_empty(&self) -> bool {
        self.snap_id.is_empty() && self.name.is_empty()
    }
}

impl FromStr for ConnectionEnd {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        match s.split_once(':') {
            Some((snap_id, name)) if is_system_or_snap_id(snap_id) && !name.is_empty() => {
                Ok(Self {
                    snap_id: snap_id.into(),
                    name: name.into(),
                })
            }
            _ => Err(format!("expected (<snap-id>|system):name not \"{s}\"")),
        }
    }
}

impl Display for ConnectionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.snap_id, self.name)
    }
}

impl<'de> Deserialize<'de> for ConnectionEnd {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e| {
            serde::de::Error::custom(format!("in gadget connection: {e}"))
        })
    }
}

impl Serialize for ConnectionEnd {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Interface connection established by the gadget.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Connection {
    #[serde(default)]
    pub plug: ConnectionEnd,

    /// Defaults to the system slot named after the plug.
    #[serde(default)]
    pub slot: ConnectionEnd,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelCmdline {
    /// Kernel command line arguments the gadget allows to be set at runtime.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
}

/// Decoded and validated gadget description.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct GadgetInfo {
    #[serde(default)]
    pub volumes: BTreeMap<String, Volume>,

    /// Configuration defaults, keyed by snap ID or "system".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, serde_yaml::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,

    #[serde(default)]
    pub kernel_cmdline: KernelCmdline,
}

impl GadgetInfo {
    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.get(name)
    }
}

/// Decodes a gadget description, fills in its implicit values and validates
/// it.
///
/// Without a model only the self consistency of the description is checked.
/// With one, the rules of classic systems or of systems booting through a
/// recovery system are enforced as well.
pub fn info_from_gadget_yaml(
    gadget_yaml: &str,
    model: Option<&dyn Model>,
) -> Result<GadgetInfo, GadgetError> {
    let mut info: GadgetInfo =
        serde_yaml::from_str(gadget_yaml).structured(InvalidInputError::ParseGadgetYaml)?;

    if let Some(key) = info.defaults.keys().find(|k| !is_system_or_snap_id(k)) {
        return Err(GadgetValidationError::InvalidDefaultsKey { key: key.clone() }.into());
    }

    for connection in info.connections.iter_mut() {
        if connection.plug.is_empty() {
            return Err(GadgetValidationError::EmptyConnectionPlug.into());
        }
        if connection.slot.is_empty() {
            connection.slot = ConnectionEnd {
                snap_id: SYSTEM_DEFAULTS_KEY.into(),
                name: connection.plug.name.clone(),
            };
        }
    }

    if info.volumes.is_empty() && model.map_or(true, |m| m.is_classic()) {
        // Volumes are optional on classic systems.
        return Ok(info);
    }

    let modes = validation::has_modes(model, &info.volumes);
    for (name, volume) in info.volumes.iter_mut() {
        volume.name = name.clone();
        for (yaml_index, structure) in volume.structure.iter_mut().enumerate() {
            structure.yaml_index = yaml_index;
        }

        let invalid = |reason| GadgetValidationError::InvalidVolume {
            volume: name.clone(),
            reason,
        };
        implicit::resolve_volume(volume, modes).map_err(invalid)?;
        validation::validate_volume(volume).map_err(invalid)?;
        layout::validate_volume_layout(volume)?;
    }

    validation::validate_bootloaders(&info.volumes)?;
    validation::validate_roles(&info.volumes, model)?;

    debug!(
        "Validated gadget description with volumes: {:?}",
        info.volumes.keys().collect::<Vec<_>>()
    );
    Ok(info)
}

/// Reads meta/gadget.yaml from the gadget root directory. The file may be
/// absent on classic systems.
pub fn read_info(gadget_root: &Path, model: Option<&dyn Model>) -> Result<GadgetInfo, GadgetError> {
    let path = gadget_root.join(GADGET_YAML_RELATIVE_PATH);
    if !path.exists() && model.map_or(true, |m| m.is_classic()) {
        debug!("No gadget description at '{}'", path.display());
        return Ok(GadgetInfo::default());
    }

    let contents = fs::read_to_string(&path).structured(InvalidInputError::ReadGadgetFile {
        path: path.display().to_string(),
    })?;
    info_from_gadget_yaml(&contents, model)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::error::ErrorKind;

    use super::*;

    const PC_GADGET: &str = indoc! {r#"
        volumes:
          pc:
            bootloader: grub
            structure:
              - name: mbr
                type: mbr
                size: 440
                content:
                  - image: pc-boot.img
              - name: BIOS Boot
                type: DA,21686148-6449-6E6F-744E-656564454649
                size: 1M
                offset: 1M
                offset-write: mbr+92
                content:
                  - image: pc-core.img
              - name: ubuntu-seed
                role: system-seed
                filesystem: vfat
                type: EF,C12A7328-F81F-11D2-BA4B-00A0C93EC93B
                size: 1200M
                update:
                  edition: 2
                content:
                  - source: grubx64.efi
                    target: EFI/boot/grubx64.efi
              - name: ubuntu-boot
                role: system-boot
                filesystem: ext4
                type: 83,0FC63DAF-8483-4772-8E79-3D69D8477DE4
                size: 750M
              - name: ubuntu-save
                role: system-save
                filesystem: ext4
                type: 83,0FC63DAF-8483-4772-8E79-3D69D8477DE4
                size: 16M
              - name: ubuntu-data
                role: system-data
                filesystem: ext4
                type: 83,0FC63DAF-8483-4772-8E79-3D69D8477DE4
                size: 1G
        defaults:
          system:
            service.rsyslog.disable: true
        connections:
          - plug: mcphTRHmpnGG2E7HkArsHvRaCvUp3QSE:serial-port
        kernel-cmdline:
          allow:
            - foo=bar
    "#};

    #[test]
    fn test_info_from_gadget_yaml() {
        let model = ModelConstraints {
            classic: false,
            grade: ModelGrade::Signed,
        };
        let info = info_from_gadget_yaml(PC_GADGET, Some(&model)).unwrap();

        let pc = info.volume("pc").unwrap();
        assert_eq!(pc.name, "pc");
        assert_eq!(pc.schema, Some(Schema::Gpt));
        assert_eq!(pc.structure.len(), 6);
        assert_eq!(pc.structure[0].role, Some(Role::Mbr));

        let labels: Vec<_> = pc
            .structure
            .iter()
            .map(|s| s.label.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(
            labels,
            vec![
                "",
                "",
                "ubuntu-seed",
                "ubuntu-boot",
                "ubuntu-save",
                "ubuntu-data"
            ]
        );

        let offsets: Vec<_> = pc.structure.iter().map(|s| s.offset()).collect();
        assert_eq!(
            offsets,
            vec![
                Some(0),
                Some(1 << 20),
                Some(2 << 20),
                Some(1202 << 20),
                Some(1952 << 20),
                Some(1968 << 20)
            ]
        );
        assert_eq!(pc.min_size(), 2992 << 20);

        assert_eq!(
            info.connections,
            vec![Connection {
                plug: "mcphTRHmpnGG2E7HkArsHvRaCvUp3QSE:serial-port".parse().unwrap(),
                slot: "system:serial-port".parse().unwrap(),
            }]
        );
        assert_eq!(info.kernel_cmdline.allow, vec!["foo=bar".to_string()]);
        assert!(info.defaults.contains_key("system"));
    }

    #[test]
    fn test_classic_gadget_without_volumes() {
        let yaml = indoc! {r#"
            defaults:
              system:
                foo: bar
        "#};
        let info = info_from_gadget_yaml(yaml, None).unwrap();
        assert!(info.volumes.is_empty());

        let classic = ModelConstraints {
            classic: true,
            grade: ModelGrade::Unset,
        };
        info_from_gadget_yaml(yaml, Some(&classic)).unwrap();

        let core = ModelConstraints::default();
        let err = info_from_gadget_yaml(yaml, Some(&core)).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::Validation(GadgetValidationError::BootloaderNotDeclared)
        );
    }

    #[test]
    fn test_info_errors() {
        let test_cases = [
            (
                indoc! {r#"
                    defaults:
                      foo:
                        bar: baz
                "#},
                "Default stanza not keyed by \"system\" or snap-id: foo",
            ),
            (
                indoc! {r#"
                    connections:
                      - slot: system:foo
                "#},
                "Gadget connection plug cannot be empty",
            ),
            (
                indoc! {r#"
                    connections:
                      - plug: foo:bar
                "#},
                "Failed to parse gadget metadata",
            ),
            (
                indoc! {r#"
                    volumes:
                      pc:
                        bootloader: silo
                "#},
                "Failed to parse gadget metadata",
            ),
            (
                indoc! {r#"
                    volumes:
                      pc:
                        bootloader: grub
                      other:
                        bootloader: u-boot
                "#},
                "Too many (2) bootloaders declared",
            ),
            (
                indoc! {r#"
                    volumes:
                      p_c:
                        bootloader: grub
                "#},
                "Invalid volume \"p_c\": invalid name",
            ),
            (
                indoc! {r#"
                    volumes:
                      pc:
                        bootloader: grub
                        structure:
                          - name: foo
                            type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                            size: 2M
                            offset: 1M
                          - name: bar
                            type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                            size: 1M
                            offset: 2M
                "#},
                "Invalid volume \"pc\": structure #1 (\"bar\") overlaps with the preceding \
                structure #0 (\"foo\")",
            ),
        ];

        for (yaml, expected) in test_cases.iter() {
            let err = info_from_gadget_yaml(yaml, None).unwrap_err();
            assert_eq!(err.kind().to_string(), *expected);
        }
    }

    #[test]
    fn test_emmc_content_geometry() {
        let yaml = indoc! {r#"
            volumes:
              pc:
                bootloader: grub
              my-emmc:
                schema: emmc
                structure:
                  - name: boot0
                    content:
                      - image: boot0filename
        "#};
        let info = info_from_gadget_yaml(yaml, None).unwrap();
        assert_eq!(info.volumes["my-emmc"].structure[0].offset(), Some(0));

        let yaml = yaml.replace(
            "- image: boot0filename",
            "- image: boot0filename\n            offset: 1000",
        );
        let err = info_from_gadget_yaml(&yaml, None).unwrap_err();
        assert!(err
            .kind()
            .to_string()
            .ends_with("cannot specify size or offset for content"));
    }

    #[test]
    fn test_read_info() {
        let dir = tempfile::tempdir().unwrap();
        let info = read_info(dir.path(), None).unwrap();
        assert_eq!(info, GadgetInfo::default());

        let core = ModelConstraints::default();
        let err = read_info(dir.path(), Some(&core)).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::InvalidInput(InvalidInputError::ReadGadgetFile { .. })
        ));

        fs::create_dir_all(dir.path().join("meta")).unwrap();
        fs::write(dir.path().join("meta/gadget.yaml"), PC_GADGET).unwrap();
        let info = read_info(dir.path(), None).unwrap();
        assert_eq!(info.volumes["pc"].structure.len(), 6);
    }
}
