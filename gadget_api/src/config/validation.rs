//! Static checks of a resolved gadget description.

use std::collections::{BTreeMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::constants::{EMMC_HARDWARE_PARTITIONS, IMPLICIT_SYSTEM_DATA_LABEL};

use super::{
    error::{GadgetValidationError, StructureValidationError, VolumeValidationError},
    model::Model,
    role::Role,
    structure::VolumeStructure,
    structure_type::StructureType,
    volume::{Partial, Schema, Volume},
};

lazy_static! {
    static ref VOLUME_NAME: Regex = Regex::new("^[a-zA-Z0-9][a-zA-Z0-9-]+$").unwrap();
    static ref MBR_DISK_ID: Regex = Regex::new("^[0-9a-fA-F]{2}$").unwrap();
}

/// Checks a single resolved volume.
pub fn validate_volume(volume: &Volume) -> Result<(), VolumeValidationError> {
    if !VOLUME_NAME.is_match(&volume.name) {
        return Err(VolumeValidationError::InvalidName);
    }

    if volume.is_emmc() {
        return validate_emmc_volume(volume);
    }

    if let Some(id) = &volume.id {
        validate_volume_id(id, volume.schema)?;
    }

    let mut names = HashSet::new();
    let mut mbr_count = 0;
    for structure in volume.structure.iter() {
        if let Some(name) = &structure.name {
            if !names.insert(name.as_str()) {
                return Err(VolumeValidationError::DuplicateStructureName { name: name.clone() });
            }
        }
        if structure.role == Some(Role::Mbr) {
            mbr_count += 1;
        }

        validate_structure(structure, volume).map_err(|reason| {
            VolumeValidationError::InvalidStructure {
                structure: structure.describe(),
                reason,
            }
        })?;
    }

    match mbr_count {
        0 if volume.schema == Some(Schema::Mbr) => Err(VolumeValidationError::MissingMbr),
        0 | 1 => Ok(()),
        _ => Err(VolumeValidationError::DuplicateMbr),
    }
}

fn validate_volume_id(id: &str, schema: Option<Schema>) -> Result<(), VolumeValidationError> {
    let valid = match schema {
        Some(Schema::Mbr) => MBR_DISK_ID.is_match(id),
        Some(Schema::Gpt) => Uuid::parse_str(id).is_ok(),
        _ => MBR_DISK_ID.is_match(id) || Uuid::parse_str(id).is_ok(),
    };
    if valid {
        return Ok(());
    }

    Err(VolumeValidationError::InvalidId {
        id: id.into(),
        expected: match schema {
            Some(Schema::Mbr) => "two hex digits".into(),
            Some(Schema::Gpt) => "a GUID".into(),
            _ => "two hex digits or a GUID".into(),
        },
    })
}

fn validate_emmc_volume(volume: &Volume) -> Result<(), VolumeValidationError> {
    let forbidden = [
        ("id", volume.id.is_some()),
        ("bootloader", volume.bootloader.is_some()),
        ("partial", !volume.partial.is_empty()),
    ];
    if let Some((field, _)) = forbidden.iter().find(|(_, set)| *set) {
        return Err(VolumeValidationError::EmmcField {
            field: field.to_string(),
        });
    }

    let mut names = HashSet::new();
    for structure in volume.structure.iter() {
        let invalid = |reason| VolumeValidationError::InvalidStructure {
            structure: structure.describe(),
            reason,
        };

        let name = structure.name.as_deref().unwrap_or_default();
        if !EMMC_HARDWARE_PARTITIONS.contains(&name) {
            return Err(invalid(StructureValidationError::InvalidEmmcName {
                name: name.into(),
            }));
        }
        if !names.insert(name) {
            return Err(VolumeValidationError::DuplicateStructureName { name: name.into() });
        }
        if structure.size.is_some() || structure.offset().is_some_and(|o| o != 0) {
            return Err(invalid(StructureValidationError::EmmcStructureGeometry));
        }
        for (index, content) in structure.content.iter().enumerate() {
            content.validate_emmc().map_err(|reason| {
                invalid(StructureValidationError::InvalidContent { index, reason })
            })?;
        }
    }
    Ok(())
}

/// Checks a structure against the invariants of its volume.
pub fn validate_structure(
    structure: &VolumeStructure,
    volume: &Volume,
) -> Result<(), StructureValidationError> {
    match (structure.min_size(), structure.size()) {
        (_, None) if !volume.has_partial(Partial::Size) => {
            return Err(StructureValidationError::MissingSize)
        }
        (min_size, Some(size)) if min_size > size => {
            return Err(StructureValidationError::MinSizeLargerThanSize { min_size, size })
        }
        _ => (),
    }

    let structure_type = structure
        .structure_type
        .ok_or(StructureValidationError::MissingType)?;
    validate_structure_type(structure_type, volume.schema)?;
    validate_role(structure, structure_type)?;

    if let Some(id) = &structure.id {
        if volume.schema != Some(Schema::Gpt) {
            return Err(StructureValidationError::PartitionIdOnNonGpt);
        }
        if Uuid::parse_str(id).is_err() {
            return Err(StructureValidationError::InvalidPartitionId { id: id.clone() });
        }
    }

    // A filesystem left undetermined is treated as one when the content says
    // so.
    let undetermined_filesystem = structure.filesystem.is_none()
        && volume.has_partial(Partial::Filesystem)
        && !structure.is_bare()
        && structure.role != Some(Role::Mbr);
    let filesystem_content = structure.has_filesystem()
        || (undetermined_filesystem && structure.content.iter().all(|c| c.image.is_none()));

    for (index, content) in structure.content.iter().enumerate() {
        let checked = if filesystem_content {
            content.validate_filesystem()
        } else {
            content.validate_bare()
        };
        checked.map_err(|reason| StructureValidationError::InvalidContent { index, reason })?;
    }

    if !structure.update.preserve.is_empty() {
        if !structure.has_filesystem() && !undetermined_filesystem {
            return Err(StructureValidationError::PreserveOnNonFilesystem);
        }
        let mut seen = HashSet::new();
        for entry in structure.update.preserve.iter() {
            if !seen.insert(entry) {
                return Err(StructureValidationError::DuplicatePreserve {
                    entry: entry.clone(),
                });
            }
        }
    }

    Ok(())
}

fn validate_structure_type(
    structure_type: StructureType,
    schema: Option<Schema>,
) -> Result<(), StructureValidationError> {
    let shown = structure_type.to_string();
    match (structure_type, schema) {
        (StructureType::Mbr | StructureType::Bare | StructureType::Hybrid(..), _) => Ok(()),
        (StructureType::MbrHex(_), Some(Schema::Mbr)) => Ok(()),
        (StructureType::Guid(_), Some(Schema::Gpt)) => Ok(()),
        (_, None) => Err(StructureValidationError::NonHybridTypeOnPartialSchema {
            structure_type: shown,
        }),
        (StructureType::MbrHex(_), _) => Err(StructureValidationError::MbrTypeOnNonMbrSchema {
            structure_type: shown,
        }),
        (StructureType::Guid(_), _) => Err(StructureValidationError::GuidTypeOnNonGptSchema {
            structure_type: shown,
        }),
    }
}

fn validate_role(
    structure: &VolumeStructure,
    structure_type: StructureType,
) -> Result<(), StructureValidationError> {
    let role = structure.role;
    match (structure_type, role) {
        (StructureType::Bare, Some(role)) if role != Role::Mbr => {
            return Err(StructureValidationError::RoleConflictsWithBare {
                role: role.to_string(),
            })
        }
        (StructureType::Mbr, Some(role)) if role != Role::Mbr => {
            return Err(StructureValidationError::RoleConflictsWithLegacyMbr {
                role: role.to_string(),
            })
        }
        _ => (),
    }

    if role == Some(Role::Mbr) {
        if !structure.fits_mbr() {
            return Err(StructureValidationError::MbrTooLarge);
        }
        if structure.offset().is_some_and(|o| o != 0) {
            return Err(StructureValidationError::MbrOffset);
        }
        if structure.id.is_some() {
            return Err(StructureValidationError::MbrPartitionId);
        }
        if structure.has_filesystem() {
            return Err(StructureValidationError::MbrFilesystem);
        }
    }
    Ok(())
}

/// Checks that exactly one volume declares a bootloader.
pub fn validate_bootloaders(
    volumes: &BTreeMap<String, Volume>,
) -> Result<(), GadgetValidationError> {
    match volumes.values().filter(|v| v.bootloader.is_some()).count() {
        0 => Err(GadgetValidationError::BootloaderNotDeclared),
        1 => Ok(()),
        count => Err(GadgetValidationError::TooManyBootloaders { count }),
    }
}

#[derive(Default)]
struct RoleStructures<'a> {
    seed: Option<&'a VolumeStructure>,
    data: Option<&'a VolumeStructure>,
    save: Option<&'a VolumeStructure>,
    boot: Option<&'a VolumeStructure>,
}

impl<'a> RoleStructures<'a> {
    fn collect(volumes: &'a BTreeMap<String, Volume>) -> Result<Self, GadgetValidationError> {
        let mut found = RoleStructures::default();
        for structure in volumes.values().flat_map(|v| v.structure.iter()) {
            let (slot, role) = match structure.role {
                Some(Role::SystemSeed | Role::SystemSeedNull) => (&mut found.seed, "system-seed"),
                Some(Role::SystemData) => (&mut found.data, "system-data"),
                Some(Role::SystemSave) => (&mut found.save, "system-save"),
                Some(Role::SystemBoot) => (&mut found.boot, "system-boot"),
                _ => continue,
            };
            if slot.replace(structure).is_some() {
                return Err(GadgetValidationError::DuplicateRole { role: role.into() });
            }
        }
        Ok(found)
    }
}

/// Whether the gadget follows the rules of systems booting through a
/// recovery system. Without a model this is inferred from the presence of a
/// seed structure.
pub fn has_modes(model: Option<&dyn Model>, volumes: &BTreeMap<String, Volume>) -> bool {
    match model {
        Some(model) => model.has_modes(),
        None => volumes.values().flat_map(|v| v.structure.iter()).any(|s| {
            matches!(s.role, Some(Role::SystemSeed | Role::SystemSeedNull))
        }),
    }
}

fn expect_label(
    structure: Option<&VolumeStructure>,
    role: Role,
    expected: &str,
) -> Result<(), GadgetValidationError> {
    match structure.and_then(|s| s.label.as_deref()) {
        Some(label) if label != expected => Err(GadgetValidationError::UnexpectedLabel {
            role: role.to_string(),
            expected: expected.into(),
            label: label.into(),
        }),
        _ => Ok(()),
    }
}

/// Checks the roles used across all volumes of a gadget. Without a model
/// only the self consistency of the roles is checked.
pub fn validate_roles(
    volumes: &BTreeMap<String, Volume>,
    model: Option<&dyn Model>,
) -> Result<(), GadgetValidationError> {
    let roles = RoleStructures::collect(volumes)?;
    let modes = has_modes(model, volumes);

    if roles.seed.is_some() && roles.data.is_none() {
        return Err(GadgetValidationError::RoleRequires {
            role: Role::SystemSeed.to_string(),
            required: Role::SystemData.to_string(),
        });
    }
    if roles.save.is_some() && (roles.seed.is_none() || roles.data.is_none()) {
        return Err(GadgetValidationError::RoleRequires {
            role: Role::SystemSave.to_string(),
            required: "system-seed and system-data".into(),
        });
    }

    if let Some(model) = model {
        if !modes && roles.seed.is_some() {
            return Err(GadgetValidationError::RoleNotSupported {
                role: Role::SystemSeed.to_string(),
            });
        }
        if modes {
            let seed = roles
                .seed
                .ok_or_else(|| GadgetValidationError::MissingRequiredRole {
                    role: Role::SystemSeed.to_string(),
                })?;
            if seed.role == Some(Role::SystemSeedNull) && !model.is_classic() {
                return Err(GadgetValidationError::RoleNotSupported {
                    role: Role::SystemSeedNull.to_string(),
                });
            }
            if roles.data.is_none() {
                return Err(GadgetValidationError::MissingRequiredRole {
                    role: Role::SystemData.to_string(),
                });
            }
        }
    }

    if !modes {
        return expect_label(roles.data, Role::SystemData, IMPLICIT_SYSTEM_DATA_LABEL);
    }

    for (structure, role) in [
        (roles.seed, Role::SystemSeed),
        (roles.data, Role::SystemData),
        (roles.save, Role::SystemSave),
        (roles.boot, Role::SystemBoot),
    ] {
        if let Some(expected) = role.implicit_label(true) {
            expect_label(structure, role, expected)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use maplit::btreemap;

    use crate::config::{
        implicit::resolve_volume,
        model::{ModelConstraints, ModelGrade},
    };

    use super::*;

    fn resolved(name: &str, yaml: &str, modes: bool) -> Volume {
        let mut volume: Volume = serde_yaml::from_str(yaml).unwrap();
        volume.name = name.into();
        for (yaml_index, structure) in volume.structure.iter_mut().enumerate() {
            structure.yaml_index = yaml_index;
        }
        resolve_volume(&mut volume, modes).unwrap();
        volume
    }

    fn structure_error(yaml: &str) -> String {
        validate_volume(&resolved("pc", yaml, false))
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_validate_volume_ok() {
        let volume = resolved(
            "pc",
            indoc! {r#"
                bootloader: grub
                id: 87A3D8CA-5A7B-4E1A-9B8E-4CE7E3F5D9A1
                structure:
                  - name: mbr
                    type: mbr
                    size: 440
                  - name: EFI System
                    type: C12A7328-F81F-11D2-BA4B-00A0C93EC93B
                    filesystem: vfat
                    filesystem-label: system-boot
                    size: 50M
                    update:
                      edition: 1
                      preserve: [EFI/ubuntu/grubenv]
                    content:
                      - source: grubx64.efi
                        target: EFI/boot/grubx64.efi
            "#},
            false,
        );
        validate_volume(&volume).unwrap();
    }

    #[test]
    fn test_validate_volume_errors() {
        let test_cases = [
            (
                indoc! {r#"
                    structure:
                      - name: foo
                        type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                "#},
                "invalid structure #0 (\"foo\"): missing size",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                        min-size: 2M
                        size: 1M
                "#},
                "invalid structure #0: min-size (2097152) is bigger than size (1048576)",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: "83"
                        size: 1M
                "#},
                "invalid type \"83\": MBR structure type with non-MBR schema",
            ),
            (
                indoc! {r#"
                    schema: mbr
                    structure:
                      - type: mbr
                        size: 440
                      - type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                        size: 1M
                "#},
                "invalid type \"0FC63DAF-8483-4772-8E79-3D69D8477DE4\": GUID structure type with \
                non-GPT schema",
            ),
            (
                indoc! {r#"
                    partial: [schema]
                    structure:
                      - type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                        size: 1M
                "#},
                "both MBR type and GUID structure type needs to be defined on partial schemas",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: bare
                        role: system-data
                        size: 1M
                "#},
                "invalid role \"system-data\": conflicting type: \"bare\"",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: mbr
                        role: system-boot
                        size: 440
                "#},
                "invalid role \"system-boot\": conflicting legacy type: \"mbr\"",
            ),
            (
                indoc! {r#"
                    structure:
                      - role: mbr
                        type: bare
                        size: 447
                "#},
                "mbr structures cannot be larger than 446 bytes",
            ),
            (
                indoc! {r#"
                    structure:
                      - role: mbr
                        type: bare
                        size: 446
                        filesystem: ext4
                "#},
                "mbr structures must not specify a file system",
            ),
            (
                indoc! {r#"
                    structure:
                      - role: mbr
                        type: bare
                        size: 446
                        id: 87A3D8CA-5A7B-4E1A-9B8E-4CE7E3F5D9A1
                "#},
                "mbr structure must not specify partition ID",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                        size: 1M
                        id: not-a-guid
                "#},
                "invalid partition ID \"not-a-guid\", expected a GUID",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: bare
                        size: 1M
                        content:
                          - source: foo
                            target: bar
                "#},
                "invalid content #0: cannot use non-image content for bare file system",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                        filesystem: ext4
                        size: 1M
                        content:
                          - image: foo.img
                "#},
                "invalid content #0: cannot use image content for non-bare file system",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: bare
                        size: 1M
                        update:
                          preserve: [foo]
                "#},
                "preserving files during update is not supported for non-filesystem structures",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                        filesystem: ext4
                        size: 1M
                        update:
                          preserve: [foo, foo]
                "#},
                "duplicate \"preserve\" entry \"foo\"",
            ),
            (
                indoc! {r#"
                    structure:
                      - name: foo
                        type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                        size: 1M
                      - name: foo
                        type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                        size: 1M
                "#},
                "structure name \"foo\" is not unique",
            ),
            (
                indoc! {r#"
                    structure:
                      - type: mbr
                        size: 440
                      - role: mbr
                        type: bare
                        size: 440
                        offset: 0
                "#},
                "more than one structure has the \"mbr\" role",
            ),
            (
                indoc! {r#"
                    schema: mbr
                    structure:
                      - type: "83"
                        size: 1M
                "#},
                "mbr schema requires a structure with the \"mbr\" role",
            ),
            (
                indoc! {r#"
                    schema: mbr
                    id: 87A3D8CA-5A7B-4E1A-9B8E-4CE7E3F5D9A1
                "#},
                "invalid volume ID \"87A3D8CA-5A7B-4E1A-9B8E-4CE7E3F5D9A1\", expected two hex \
                digits",
            ),
        ];

        for (yaml, expected) in test_cases.iter() {
            let err = structure_error(yaml);
            assert!(err.contains(expected), "expected '{expected}', got '{err}'");
        }
    }

    #[test]
    fn test_validate_partial_volume() {
        let volume = resolved(
            "pc",
            indoc! {r#"
                partial: [schema, size, filesystem]
                structure:
                  - name: ubuntu-data
                    role: system-data
                    type: 83,0FC63DAF-8483-4772-8E79-3D69D8477DE4
                    min-size: 1G
                    update:
                      preserve: [foo]
                    content:
                      - source: foo
                        target: bar
            "#},
            false,
        );
        assert_eq!(volume.schema, None);
        validate_volume(&volume).unwrap();
    }

    #[test]
    fn test_validate_volume_name() {
        let volume = resolved("-pc", "structure: []", false);
        assert_eq!(
            validate_volume(&volume).unwrap_err(),
            VolumeValidationError::InvalidName
        );
    }

    #[test]
    fn test_validate_emmc_volume() {
        let volume = resolved(
            "emmc",
            indoc! {r#"
                schema: emmc
                structure:
                  - name: boot0
                    content:
                      - image: boot0filename
                  - name: boot1
            "#},
            false,
        );
        validate_volume(&volume).unwrap();

        let volume = resolved(
            "emmc",
            indoc! {r#"
                schema: emmc
                structure:
                  - name: boot0
                    content:
                      - image: boot0filename
                        offset: 1000
            "#},
            false,
        );
        assert!(validate_volume(&volume)
            .unwrap_err()
            .to_string()
            .ends_with("cannot specify size or offset for content"));

        let volume = resolved(
            "emmc",
            indoc! {r#"
                schema: emmc
                structure:
                  - name: rpmb
            "#},
            false,
        );
        assert!(matches!(
            validate_volume(&volume).unwrap_err(),
            VolumeValidationError::InvalidStructure {
                reason: StructureValidationError::InvalidEmmcName { .. },
                ..
            }
        ));

        let volume = resolved("emmc", "schema: emmc\nbootloader: u-boot", false);
        assert_eq!(
            validate_volume(&volume).unwrap_err(),
            VolumeValidationError::EmmcField {
                field: "bootloader".into()
            }
        );
    }

    #[test]
    fn test_validate_bootloaders() {
        let grub = resolved("pc", "bootloader: grub", false);
        let uboot = resolved("other", "bootloader: u-boot", false);
        let plain = resolved("plain", "structure: []", false);

        validate_bootloaders(&btreemap! {
            "pc".to_string() => grub.clone(),
            "plain".to_string() => plain.clone(),
        })
        .unwrap();
        assert_eq!(
            validate_bootloaders(&btreemap! {"plain".to_string() => plain}).unwrap_err(),
            GadgetValidationError::BootloaderNotDeclared
        );
        assert_eq!(
            validate_bootloaders(&btreemap! {
                "pc".to_string() => grub,
                "other".to_string() => uboot,
            })
            .unwrap_err(),
            GadgetValidationError::TooManyBootloaders { count: 2 }
        );
    }

    const TYPE: &str = "83,0FC63DAF-8483-4772-8E79-3D69D8477DE4";

    fn roles_volume(roles: &[(&str, Option<&str>)], modes: bool) -> BTreeMap<String, Volume> {
        let structure = roles
            .iter()
            .map(|(role, label)| {
                let label = label
                    .map(|l| format!("\n    filesystem-label: {l}"))
                    .unwrap_or_default();
                format!("  - role: {role}\n    type: {TYPE}\n    size: 1M{label}")
            })
            .collect::<Vec<_>>()
            .join("\n");
        let yaml = format!("bootloader: grub\nstructure:\n{structure}\n");
        btreemap! {"pc".to_string() => resolved("pc", &yaml, modes)}
    }

    #[test]
    fn test_validate_roles_without_model() {
        let volumes = roles_volume(&[("system-data", None)], false);
        validate_roles(&volumes, None).unwrap();

        let volumes = roles_volume(&[("system-data", Some("foo"))], false);
        assert_eq!(
            validate_roles(&volumes, None).unwrap_err().to_string(),
            "system-data structure must have an implicit label or \"writable\", not \"foo\""
        );

        let volumes = roles_volume(&[("system-seed", None)], true);
        assert_eq!(
            validate_roles(&volumes, None).unwrap_err(),
            GadgetValidationError::RoleRequires {
                role: "system-seed".into(),
                required: "system-data".into()
            }
        );

        let volumes = roles_volume(&[("system-data", None), ("system-save", None)], false);
        assert!(matches!(
            validate_roles(&volumes, None).unwrap_err(),
            GadgetValidationError::RoleRequires { .. }
        ));

        let volumes = roles_volume(
            &[("system-seed", None), ("system-seed-null", Some("other"))],
            true,
        );
        assert_eq!(
            validate_roles(&volumes, None).unwrap_err(),
            GadgetValidationError::DuplicateRole {
                role: "system-seed".into()
            }
        );

        let volumes = roles_volume(
            &[("system-seed", None), ("system-data", Some("foo"))],
            true,
        );
        assert_eq!(
            validate_roles(&volumes, None).unwrap_err().to_string(),
            "system-data structure must have an implicit label or \"ubuntu-data\", not \"foo\""
        );
    }

    #[test]
    fn test_validate_roles_with_model() {
        let legacy = ModelConstraints::default();
        let signed = ModelConstraints {
            classic: false,
            grade: ModelGrade::Signed,
        };
        let classic_dangerous = ModelConstraints {
            classic: true,
            grade: ModelGrade::Dangerous,
        };

        let volumes = roles_volume(&[("system-seed", None), ("system-data", None)], true);
        validate_roles(&volumes, Some(&signed)).unwrap();
        assert_eq!(
            validate_roles(&volumes, Some(&legacy)).unwrap_err(),
            GadgetValidationError::RoleNotSupported {
                role: "system-seed".into()
            }
        );

        let volumes = roles_volume(&[("system-data", None)], true);
        assert_eq!(
            validate_roles(&volumes, Some(&signed)).unwrap_err(),
            GadgetValidationError::MissingRequiredRole {
                role: "system-seed".into()
            }
        );

        let volumes = roles_volume(&[("system-seed", None)], true);
        assert_eq!(
            validate_roles(&volumes, Some(&signed)).unwrap_err(),
            GadgetValidationError::RoleRequires {
                role: "system-seed".into(),
                required: "system-data".into()
            }
        );

        let volumes = roles_volume(&[("system-seed-null", None), ("system-data", None)], true);
        validate_roles(&volumes, Some(&classic_dangerous)).unwrap();
        assert_eq!(
            validate_roles(&volumes, Some(&signed)).unwrap_err(),
            GadgetValidationError::RoleNotSupported {
                role: "system-seed-null".into()
            }
        );
    }
}
