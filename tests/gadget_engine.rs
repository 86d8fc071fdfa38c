use indoc::indoc;
use maplit::btreemap;

use gadget::engine::{self, MatchOptions, StructureEncryption};
use gadget_api::{
    config::{implicit, info_from_gadget_yaml, GadgetInfo, RelativeOffset, Volume},
    error::{DiskMatchError, ErrorKind},
    status::{DiskSchema, OnDiskStructure, OnDiskVolume},
};

const MIB: u64 = 1024 * 1024;

const SEED_GADGET: &str = indoc! {r#"
    volumes:
      pc:
        bootloader: grub
        structure:
          - name: mbr
            type: mbr
            size: 440
          - name: BIOS Boot
            type: DA,21686148-6449-6E6F-744E-656564454649
            size: 1M
            offset: 1M
            offset-write: mbr+92
          - name: ubuntu-seed
            role: system-seed
            filesystem: vfat
            type: EF,C12A7328-F81F-11D2-BA4B-00A0C93EC93B
            size: 1200M
          - name: ubuntu-data
            role: system-data
            filesystem: ext4
            type: 83,0FC63DAF-8483-4772-8E79-3D69D8477DE4
            size: 1G
"#};

const WRITABLE_GADGET: &str = indoc! {r#"
    volumes:
      pc:
        bootloader: grub
        structure:
          - name: Writable
            role: system-data
            filesystem: ext4
            type: 83,0FC63DAF-8483-4772-8E79-3D69D8477DE4
            size: 1G
"#};

fn only_volume(yaml: &str) -> Volume {
    let mut info = info_from_gadget_yaml(yaml, None).unwrap();
    info.volumes.remove("pc").unwrap()
}

fn disk(structures: Vec<OnDiskStructure>) -> OnDiskVolume {
    OnDiskVolume {
        device: "/dev/sda".into(),
        kernel_path: None,
        schema: DiskSchema::Gpt,
        id: "2e59d969-52ab-430b-88ac-f83873519f6f".into(),
        size: 8192 * MIB,
        sector_size: 512,
        usable_sectors_end: 8192 * MIB / 512 - 33,
        structures,
    }
}

fn partition(index: usize, name: &str, start: u64, size: u64, fs: Option<&str>) -> OnDiskStructure {
    OnDiskStructure {
        node: format!("/dev/sda{index}"),
        name: Some(name.into()),
        filesystem_type: fs.map(Into::into),
        filesystem_label: fs.map(|_| name.to_string()),
        start_offset: start,
        size,
        disk_index: index,
        ..Default::default()
    }
}

#[test]
fn test_emmc_offsets() {
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
    let emmc = &info.volumes["my-emmc"];
    assert_eq!(emmc.structure[0].offset(), Some(0));
    assert_eq!(emmc.structure[0].min_size(), 0);

    let yaml = yaml.replace(
        "- image: boot0filename",
        "- image: boot0filename\n            offset: 1000",
    );
    assert!(yaml.contains("\n            offset: 1000"));
    let error = info_from_gadget_yaml(&yaml, None).unwrap_err();
    assert!(error
        .kind()
        .to_string()
        .ends_with("cannot specify size or offset for content"));
}

#[test]
fn test_overlap_after_partially_sized_structure() {
    let yaml = indoc! {r#"
        volumes:
          pc:
            bootloader: grub
            structure:
              - name: mbr
                type: mbr
                size: 440
              - name: p1
                type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                offset: 2M
                size: 1M
              - name: p2
                type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                min-size: 2M
                size: 3M
              - name: p3
                type: 0FC63DAF-8483-4772-8E79-3D69D8477DE4
                offset: 3M
                size: 1M
    "#};
    let error = info_from_gadget_yaml(yaml, None).unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::Layout(_)));
    let message = error.kind().to_string();
    assert!(
        message.ends_with("structure #3 (\"p3\") overlaps with the preceding structure #2 (\"p2\")"),
        "{message}"
    );
}

#[test]
fn test_resolve_is_idempotent() {
    let volume = only_volume(SEED_GADGET);
    assert_eq!(volume.structure[3].label.as_deref(), Some("ubuntu-data"));
    assert_eq!(volume.structure[2].offset(), Some(2 * MIB));

    let mut resolved = volume.clone();
    implicit::resolve_volume(&mut resolved, true).unwrap();
    assert_eq!(resolved, volume);
}

#[test]
fn test_relative_offsets() {
    for text in ["1234", "1234M", "mbr+92", "foo+1G"] {
        let offset: RelativeOffset = text.parse().unwrap();
        assert_eq!(offset.to_string(), text);
    }

    let offset: RelativeOffset = "foo+1G".parse().unwrap();
    assert_eq!(offset.relative_to.as_deref(), Some("foo"));
    assert_eq!(offset.offset, 1024 * MIB);

    for text in ["4G", "mbr+4G", "+92", "mbr+", "-1", "mbr+17179869184G", "17179869185G"] {
        text.parse::<RelativeOffset>().unwrap_err();
    }
}

#[test]
fn test_oversized_byte_counts() {
    for (from, to) in [
        ("size: 1G", "size: 17179869185G"),
        ("offset-write: mbr+92", "offset-write: mbr+17179869184G"),
    ] {
        let yaml = SEED_GADGET.replace(from, to);
        assert_ne!(yaml, SEED_GADGET);
        let error = info_from_gadget_yaml(&yaml, None).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::InvalidInput(_)), "{error:?}");
    }
}

#[test]
fn test_match_seed_disk() {
    let volume = only_volume(SEED_GADGET);
    let on_disk = disk(vec![
        partition(1, "BIOS Boot", MIB, MIB, None),
        partition(2, "ubuntu-seed", 2 * MIB, 1200 * MIB, Some("vfat")),
        partition(3, "ubuntu-data", 1202 * MIB, 1024 * MIB, Some("ext4")),
    ]);

    let matched = engine::match_volume(&volume, &on_disk, &MatchOptions::default()).unwrap();
    assert_eq!(matched.structures.len(), 4);
    assert_eq!(matched.structures[&3].start_offset(), 1202 * MIB);

    // Data partitions are grown at install
    let mut grown = on_disk.clone();
    grown.structures[2].size = 4096 * MIB;
    engine::match_volume(&volume, &grown, &MatchOptions::default()).unwrap();

    let mut grown = on_disk.clone();
    grown.structures[1].size = 1201 * MIB;
    assert!(matches!(
        engine::match_volume(&volume, &grown, &MatchOptions::default()),
        Err(DiskMatchError::UnexpectedDiskPartition { .. })
    ));
}

#[test]
fn test_disk_too_small() {
    let yaml = indoc! {r#"
        volumes:
          pc:
            bootloader: grub
            structure:
              - name: mbr
                type: mbr
                size: 440
              - name: BIOS Boot
                type: DA,21686148-6449-6E6F-744E-656564454649
                size: 1M
                offset: 1M
              - name: EFI System
                filesystem: vfat
                type: EF,C12A7328-F81F-11D2-BA4B-00A0C93EC93B
                size: 1200M
    "#};
    let volume = only_volume(yaml);
    assert_eq!(volume.min_size(), 1_260_388_352);

    let mut on_disk = disk(vec![]);
    on_disk.usable_sectors_end = 100 * MIB / 512;
    let error = engine::match_volume(&volume, &on_disk, &MatchOptions::default()).unwrap_err();
    assert_eq!(
        error.to_string(),
        "device /dev/sda (last usable byte at 100 MiB) is too small to fit the \
        requested minimal size (1.17 GiB)"
    );
}

#[test]
fn test_encrypted_partition_label() {
    let volume = only_volume(WRITABLE_GADGET);
    let options = MatchOptions {
        expected_structure_encryption: btreemap! {
            "Writable".to_string() => StructureEncryption::with_method("luks"),
        },
        ..Default::default()
    };

    let on_disk = disk(vec![partition(1, "Writable", MIB, 1024 * MIB, Some("ext4"))]);
    let error = engine::match_volume(&volume, &on_disk, &options).unwrap_err();
    assert_eq!(
        error.to_string(),
        "partition /dev/sda1 is expected to be encrypted but is not named Writable-enc"
    );

    let mut encrypted = on_disk.clone();
    encrypted.structures[0].filesystem_type = Some("crypto_LUKS".into());
    encrypted.structures[0].filesystem_label = Some("Writable-enc".into());
    engine::match_volume(&volume, &encrypted, &options).unwrap();
}

#[test]
fn test_mbr_role_rules() {
    let mbr_gadget = indoc! {r#"
        volumes:
          pi:
            schema: mbr
            bootloader: u-boot
            structure:
              - name: mbr
                type: mbr
                size: 440
              - name: ubuntu-seed
                type: 0C
                filesystem: vfat
                size: 1200M
    "#};
    info_from_gadget_yaml(mbr_gadget, None).unwrap();

    // Without the mbr structure
    let missing = mbr_gadget.replace(
        "      - name: mbr\n        type: mbr\n        size: 440\n",
        "",
    );
    assert_ne!(missing, mbr_gadget);
    let error = info_from_gadget_yaml(&missing, None).unwrap_err();
    assert!(error
        .kind()
        .to_string()
        .ends_with("mbr schema requires a structure with the \"mbr\" role"));

    let too_large = mbr_gadget.replace("size: 440", "size: 447");
    info_from_gadget_yaml(&too_large, None).unwrap_err();

    let moved = mbr_gadget.replace("size: 440", "size: 440\n        offset: 512");
    let error = info_from_gadget_yaml(&moved, None).unwrap_err();
    assert!(error
        .kind()
        .to_string()
        .ends_with("mbr structure must start at offset 0"));
}

#[test]
fn test_update_compatibility() {
    let labelled = indoc! {r#"
        volumes:
          pc:
            bootloader: grub
            structure:
              - name: data
                filesystem: ext4
                type: 83,0FC63DAF-8483-4772-8E79-3D69D8477DE4
                size: 1G
                filesystem-label: data
    "#};
    let old = info_from_gadget_yaml(labelled, None).unwrap();
    engine::is_compatible(&old, &old).unwrap();

    let relabelled = labelled.replace("filesystem-label: data", "filesystem-label: other");
    let relabelled: GadgetInfo = info_from_gadget_yaml(&relabelled, None).unwrap();
    let error = engine::is_compatible(&old, &relabelled).unwrap_err();
    assert!(
        error
            .to_string()
            .ends_with("cannot change filesystem label from \"data\" to \"other\""),
        "{error}"
    );

    // Growing within the new bounds is fine, shrinking below the old size is not
    let bounded = labelled.replace("size: 1G", "min-size: 512M\n        size: 2G");
    engine::is_compatible(&old, &info_from_gadget_yaml(&bounded, None).unwrap()).unwrap();

    let shrunk = labelled.replace("size: 1G", "size: 512M");
    let error =
        engine::is_compatible(&old, &info_from_gadget_yaml(&shrunk, None).unwrap()).unwrap_err();
    assert!(error.to_string().contains("cannot change size"), "{error}");
}
