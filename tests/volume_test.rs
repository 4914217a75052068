use fat16_mem::fat16::layout::{BYTES_PER_SECTOR, HEADER_SECTORS};
use fat16_mem::{DEFAULT_IMAGE_SIZE, FsError, Volume};

/// A volume with exactly `data_clusters` allocatable clusters (default
/// geometry: one 512-byte sector per cluster).
fn small_volume(data_clusters: usize) -> Volume {
    Volume::format_new((HEADER_SECTORS + data_clusters) * BYTES_PER_SECTOR).unwrap()
}

fn default_volume() -> Volume {
    Volume::format_new(DEFAULT_IMAGE_SIZE).unwrap()
}

#[test]
fn format_produces_empty_mountable_volume() {
    let volume = default_volume();
    let bytes = volume.as_bytes();
    assert_eq!(bytes.len(), DEFAULT_IMAGE_SIZE);
    assert_eq!(bytes[510], 0x55);
    assert_eq!(bytes[511], 0xAA);

    assert!(volume.list_dir("/").unwrap().is_empty());
    let stats = volume.statfs();
    assert_eq!(stats.block_size, 512);
    assert_eq!(stats.free_blocks, stats.total_blocks);

    let meta = volume.stat("/").unwrap();
    assert!(meta.is_directory);
}

#[test]
fn save_and_load_round_trip_is_byte_identical() {
    let mut volume = default_volume();
    volume.create("/keep").unwrap();
    volume.write("/keep", 0, b"persisted").unwrap();

    let path = std::env::temp_dir().join(format!("fat16_mem_rt_{}.img", std::process::id()));
    volume.save_image(&path).unwrap();
    let reloaded = Volume::load_image(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(reloaded.as_bytes(), volume.as_bytes());
    assert_eq!(reloaded.read("/keep", 0, 64).unwrap(), b"persisted");
}

#[test]
fn mount_rejects_mismatched_image_size() {
    let volume = default_volume();
    let mut bytes = volume.as_bytes().to_vec();
    bytes.truncate(bytes.len() - 512);
    assert!(matches!(
        Volume::from_image(bytes),
        Err(FsError::InvalidImage { .. })
    ));
}

#[test]
fn create_write_read_back() {
    let mut volume = default_volume();
    volume.create("/hello").unwrap();
    assert_eq!(volume.write("/hello", 0, b"hello world").unwrap(), 11);
    assert_eq!(volume.read("/hello", 0, 64).unwrap(), b"hello world");

    let meta = volume.stat("/hello").unwrap();
    assert!(!meta.is_directory);
    assert_eq!(meta.size, 11);
}

#[test]
fn create_rejects_duplicates_and_root() {
    let mut volume = default_volume();
    volume.create("/a").unwrap();
    assert!(matches!(
        volume.create("/a"),
        Err(FsError::AlreadyExists { .. })
    ));
    assert!(matches!(volume.create("/"), Err(FsError::InvalidName { .. })));
    assert!(matches!(volume.mkdir("/"), Err(FsError::InvalidName { .. })));
}

#[test]
fn name_validation() {
    let mut volume = default_volume();
    volume.create("/file_1").unwrap();
    volume.create("/UPPER").unwrap();
    volume.create("/12345678").unwrap();
    for bad in ["/a.b", "/toolongname", "/sp ace", "/h-yphen"] {
        assert!(
            matches!(volume.create(bad), Err(FsError::InvalidName { .. })),
            "expected {} to be rejected",
            bad
        );
    }
}

#[test]
fn file_sizes_across_cluster_boundaries() {
    let mut volume = default_volume();
    for (i, len) in [1usize, 511, 512, 513, 3 * 512 + 7].into_iter().enumerate() {
        let path = format!("/f{}", i);
        let data: Vec<u8> = (0..len).map(|n| (n % 251) as u8).collect();
        volume.create(&path).unwrap();
        assert_eq!(volume.write(&path, 0, &data).unwrap(), len);
        assert_eq!(volume.read(&path, 0, len as u32).unwrap(), data);
        assert_eq!(volume.stat(&path).unwrap().size, len as u32);
        assert_eq!(
            volume.allocated_clusters(&path).unwrap(),
            len.div_ceil(512)
        );
    }
}

#[test]
fn write_at_offset_grows_without_touching_the_gap() {
    let mut volume = default_volume();
    volume.create("/gap").unwrap();
    volume.write("/gap", 0, b"0123456789").unwrap();
    volume.write("/gap", 600, b"tail").unwrap();

    assert_eq!(volume.stat("/gap").unwrap().size, 604);
    assert_eq!(volume.allocated_clusters("/gap").unwrap(), 2);

    let data = volume.read("/gap", 0, 604).unwrap();
    assert_eq!(&data[..10], b"0123456789");
    assert!(data[10..600].iter().all(|&b| b == 0));
    assert_eq!(&data[600..], b"tail");
}

#[test]
fn overwrite_within_bounds_keeps_the_size() {
    let mut volume = default_volume();
    volume.create("/f").unwrap();
    volume.write("/f", 0, &[b'x'; 100]).unwrap();
    volume.write("/f", 0, b"yyy").unwrap();

    assert_eq!(volume.stat("/f").unwrap().size, 100);
    let data = volume.read("/f", 0, 100).unwrap();
    assert_eq!(&data[..3], b"yyy");
    assert!(data[3..].iter().all(|&b| b == b'x'));
}

#[test]
fn truncate_grow_zero_fills() {
    let mut volume = default_volume();
    volume.create("/f").unwrap();
    volume.write("/f", 0, b"abc").unwrap();
    volume.truncate("/f", 1000).unwrap();

    assert_eq!(volume.stat("/f").unwrap().size, 1000);
    assert_eq!(volume.allocated_clusters("/f").unwrap(), 2);
    let data = volume.read("/f", 0, 1000).unwrap();
    assert_eq!(&data[..3], b"abc");
    assert!(data[3..].iter().all(|&b| b == 0));
}

#[test]
fn truncate_shrink_releases_clusters() {
    let mut volume = default_volume();
    let free_at_start = volume.free_clusters();

    volume.create("/f").unwrap();
    volume.write("/f", 0, &[7u8; 1500]).unwrap();
    assert_eq!(volume.allocated_clusters("/f").unwrap(), 3);
    assert_eq!(volume.free_clusters(), free_at_start - 3);

    volume.truncate("/f", 100).unwrap();
    assert_eq!(volume.stat("/f").unwrap().size, 100);
    assert_eq!(volume.allocated_clusters("/f").unwrap(), 1);
    assert_eq!(volume.free_clusters(), free_at_start - 1);

    volume.truncate("/f", 0).unwrap();
    assert_eq!(volume.stat("/f").unwrap().size, 0);
    assert_eq!(volume.allocated_clusters("/f").unwrap(), 0);
    assert_eq!(volume.free_clusters(), free_at_start);
}

#[test]
fn shrink_then_grow_zero_fills_the_retained_cluster() {
    let mut volume = default_volume();
    volume.create("/f").unwrap();
    volume.write("/f", 0, &[9u8; 400]).unwrap();
    volume.truncate("/f", 10).unwrap();
    volume.truncate("/f", 400).unwrap();

    let data = volume.read("/f", 0, 400).unwrap();
    assert_eq!(&data[..10], &[9u8; 10]);
    assert!(data[10..].iter().all(|&b| b == 0));
}

#[test]
fn open_with_truncate_cuts_to_zero() {
    let mut volume = default_volume();
    volume.create("/f").unwrap();
    volume.write("/f", 0, &[1u8; 900]).unwrap();

    volume.open("/f", false).unwrap();
    assert_eq!(volume.stat("/f").unwrap().size, 900);

    volume.open("/f", true).unwrap();
    assert_eq!(volume.stat("/f").unwrap().size, 0);
    assert_eq!(volume.allocated_clusters("/f").unwrap(), 0);

    volume.mkdir("/d").unwrap();
    assert!(matches!(
        volume.open("/d", true),
        Err(FsError::IsADirectory { .. })
    ));
    volume.open("/d", false).unwrap();
}

#[test]
fn read_clamps_to_size_and_rejects_overflow() {
    let mut volume = default_volume();
    volume.create("/f").unwrap();
    volume.write("/f", 0, b"0123456789").unwrap();

    assert_eq!(volume.read("/f", 5, 100).unwrap(), b"56789");
    assert!(volume.read("/f", 20, 5).unwrap().is_empty());
    assert!(volume.read("/f", 0, 0).unwrap().is_empty());
    assert!(matches!(
        volume.read("/f", u32::MAX, 2),
        Err(FsError::InvalidArgument { .. })
    ));
    assert!(matches!(
        volume.write("/f", u32::MAX, b"xx"),
        Err(FsError::InvalidArgument { .. })
    ));
}

#[test]
fn truncate_beyond_the_size_field_is_too_large() {
    let mut volume = default_volume();
    volume.create("/f").unwrap();
    volume.write("/f", 0, b"small").unwrap();

    assert!(matches!(
        volume.truncate("/f", u64::from(u32::MAX) + 1),
        Err(FsError::TooLarge)
    ));
    assert_eq!(volume.stat("/f").unwrap().size, 5);
}

#[test]
fn mkdir_seeds_dot_entries() {
    let mut volume = default_volume();
    volume.mkdir("/d").unwrap();

    assert!(volume.stat("/d").unwrap().is_directory);
    assert_eq!(volume.allocated_clusters("/d").unwrap(), 1);

    let names: Vec<String> = volume
        .list_dir("/d")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec![".".to_string(), "..".to_string()]);
}

#[test]
fn rmdir_requires_an_empty_directory() {
    let mut volume = default_volume();
    volume.mkdir("/d").unwrap();
    volume.create("/d/f").unwrap();

    assert!(matches!(volume.rmdir("/d"), Err(FsError::NotEmpty { .. })));
    volume.unlink("/d/f").unwrap();
    volume.rmdir("/d").unwrap();
    assert!(matches!(volume.stat("/d"), Err(FsError::NotFound { .. })));
}

#[test]
fn unlink_and_rmdir_check_the_entry_kind() {
    let mut volume = default_volume();
    volume.mkdir("/d").unwrap();
    volume.create("/f").unwrap();

    assert!(matches!(
        volume.unlink("/d"),
        Err(FsError::IsADirectory { .. })
    ));
    assert!(matches!(
        volume.rmdir("/f"),
        Err(FsError::NotADirectory { .. })
    ));
    assert!(matches!(
        volume.read("/d", 0, 10),
        Err(FsError::IsADirectory { .. })
    ));
    assert!(matches!(
        volume.write("/d", 0, b"x"),
        Err(FsError::IsADirectory { .. })
    ));
}

#[test]
fn nested_paths_resolve_through_directories() {
    let mut volume = default_volume();
    volume.mkdir("/a").unwrap();
    volume.mkdir("/a/b").unwrap();
    volume.create("/a/b/c").unwrap();
    volume.write("/a/b/c", 0, b"deep").unwrap();

    assert_eq!(volume.read("/a/b/c", 0, 16).unwrap(), b"deep");
    assert_eq!(volume.read("//a///b/c/", 0, 16).unwrap(), b"deep");

    volume.create("/plain").unwrap();
    assert!(matches!(
        volume.stat("/plain/x"),
        Err(FsError::NotADirectory { .. })
    ));
    assert!(matches!(
        volume.stat("/a/missing"),
        Err(FsError::NotFound { .. })
    ));
}

#[test]
fn allocation_failure_is_atomic() {
    let mut volume = small_volume(4);
    assert_eq!(volume.free_clusters(), 4);

    volume.create("/f").unwrap();
    volume.write("/f", 0, &[3u8; 1024]).unwrap();
    assert_eq!(volume.free_clusters(), 2);

    // Growing to 5 clusters needs 3 more with only 2 free.
    assert!(matches!(
        volume.truncate("/f", 5 * 512),
        Err(FsError::NoSpace)
    ));
    assert_eq!(volume.free_clusters(), 2);
    assert_eq!(volume.stat("/f").unwrap().size, 1024);
    assert_eq!(volume.read("/f", 0, 1024).unwrap(), vec![3u8; 1024]);
}

#[test]
fn mkdir_without_space_leaves_no_entry_behind() {
    let mut volume = small_volume(1);
    volume.create("/f").unwrap();
    volume.write("/f", 0, b"x").unwrap();
    assert_eq!(volume.free_clusters(), 0);

    assert!(matches!(volume.mkdir("/d"), Err(FsError::NoSpace)));
    assert!(matches!(volume.stat("/d"), Err(FsError::NotFound { .. })));
    assert!(volume.create("/d").is_ok());
}

#[test]
fn root_directory_has_a_fixed_capacity() {
    let mut volume = default_volume();
    for i in 0..512 {
        volume.create(&format!("/f{}", i)).unwrap();
    }
    assert!(matches!(
        volume.create("/onemore"),
        Err(FsError::DirectoryFull)
    ));
}

#[test]
fn subdirectory_grows_by_whole_clusters() {
    let mut volume = default_volume();
    volume.mkdir("/d").unwrap();

    // One 512-byte cluster holds 16 entries; `.` and `..` take two.
    for i in 0..14 {
        volume.create(&format!("/d/f{}", i)).unwrap();
    }
    assert_eq!(volume.allocated_clusters("/d").unwrap(), 1);

    volume.create("/d/f14").unwrap();
    assert_eq!(volume.allocated_clusters("/d").unwrap(), 2);
    assert_eq!(volume.list_dir("/d").unwrap().len(), 17);
    assert_eq!(volume.stat("/d/f14").unwrap().size, 0);
}

#[test]
fn deleted_slots_are_reused_in_order() {
    let mut volume = default_volume();
    volume.create("/x1").unwrap();
    volume.create("/x2").unwrap();
    volume.create("/x3").unwrap();
    volume.unlink("/x2").unwrap();
    volume.create("/y").unwrap();

    let names: Vec<String> = volume
        .list_dir("/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["x1", "y", "x3"]);
}

#[test]
fn rename_moves_the_record_not_the_data() {
    let mut volume = default_volume();
    volume.create("/old").unwrap();
    volume.write("/old", 0, &[5u8; 700]).unwrap();
    let free_before = volume.free_clusters();

    volume.rename("/old", "/new").unwrap();

    assert!(matches!(volume.stat("/old"), Err(FsError::NotFound { .. })));
    assert_eq!(volume.read("/new", 0, 700).unwrap(), vec![5u8; 700]);
    assert_eq!(volume.free_clusters(), free_before);
}

#[test]
fn rename_over_a_file_releases_the_old_content() {
    let mut volume = default_volume();
    volume.create("/a").unwrap();
    volume.write("/a", 0, b"aaaa").unwrap();
    volume.create("/b").unwrap();
    volume.write("/b", 0, &[1u8; 600]).unwrap();
    let free_before = volume.free_clusters();

    volume.rename("/a", "/b").unwrap();

    assert!(matches!(volume.stat("/a"), Err(FsError::NotFound { .. })));
    assert_eq!(volume.read("/b", 0, 64).unwrap(), b"aaaa");
    // The destination's two clusters came back; the source kept its one.
    assert_eq!(volume.free_clusters(), free_before + 2);
}

#[test]
fn rename_same_path_is_a_no_op() {
    let mut volume = default_volume();
    volume.create("/f").unwrap();
    volume.write("/f", 0, b"stay").unwrap();
    volume.rename("/f", "/f").unwrap();
    assert_eq!(volume.read("/f", 0, 16).unwrap(), b"stay");
}

#[test]
fn rename_kind_conflicts() {
    let mut volume = default_volume();
    volume.create("/file").unwrap();
    volume.mkdir("/dir").unwrap();
    volume.mkdir("/full").unwrap();
    volume.create("/full/child").unwrap();

    assert!(matches!(
        volume.rename("/file", "/dir"),
        Err(FsError::IsADirectory { .. })
    ));
    assert!(matches!(
        volume.rename("/dir", "/file"),
        Err(FsError::NotADirectory { .. })
    ));
    assert!(matches!(
        volume.rename("/dir", "/full"),
        Err(FsError::NotEmpty { .. })
    ));
    assert!(matches!(
        volume.rename("/", "/x"),
        Err(FsError::InvalidName { .. })
    ));
}

#[test]
fn rename_into_its_own_subtree_is_rejected() {
    let mut volume = default_volume();
    volume.mkdir("/a").unwrap();
    volume.mkdir("/a/b").unwrap();
    let free_before = volume.free_clusters();

    assert!(matches!(
        volume.rename("/a", "/a/b/c"),
        Err(FsError::InvalidArgument { .. })
    ));
    assert!(matches!(
        volume.rename("/a", "/a/c"),
        Err(FsError::InvalidArgument { .. })
    ));

    // Nothing moved, nothing leaked.
    assert!(volume.stat("/a").unwrap().is_directory);
    assert!(volume.stat("/a/b").unwrap().is_directory);
    assert_eq!(volume.free_clusters(), free_before);

    // A file with a prefix-sharing destination is untouched by the guard.
    volume.create("/f").unwrap();
    volume.rename("/f", "/a/f").unwrap();
    assert_eq!(volume.stat("/a/f").unwrap().size, 0);
}

#[test]
fn rename_over_an_empty_directory_succeeds() {
    let mut volume = default_volume();
    volume.mkdir("/src").unwrap();
    volume.create("/src/f").unwrap();
    volume.mkdir("/dst").unwrap();

    volume.rename("/src", "/dst").unwrap();
    assert!(matches!(volume.stat("/src"), Err(FsError::NotFound { .. })));
    assert_eq!(volume.stat("/dst/f").unwrap().size, 0);
}

#[test]
fn renamed_directory_points_dotdot_at_the_new_parent() {
    let mut volume = default_volume();
    volume.mkdir("/p1").unwrap();
    volume.mkdir("/p2").unwrap();
    volume.mkdir("/p1/child").unwrap();
    volume.create("/p1/child/f").unwrap();
    volume.write("/p1/child/f", 0, b"moved").unwrap();

    volume.rename("/p1/child", "/p2/child").unwrap();

    assert_eq!(volume.read("/p2/child/f", 0, 16).unwrap(), b"moved");
    assert!(matches!(
        volume.stat("/p1/child"),
        Err(FsError::NotFound { .. })
    ));

    let p2_cluster = volume
        .list_dir("/")
        .unwrap()
        .into_iter()
        .find(|e| e.name == "p2")
        .unwrap()
        .first_cluster;
    let dotdot = volume
        .list_dir("/p2/child")
        .unwrap()
        .into_iter()
        .find(|e| e.name == "..")
        .unwrap();
    assert_eq!(dotdot.first_cluster, p2_cluster);
}

#[test]
fn directory_scans_continue_past_an_end_marker_into_later_clusters() {
    let mut volume = default_volume();
    volume.mkdir("/d").unwrap();
    for i in 0..15 {
        volume.create(&format!("/d/f{}", i)).unwrap();
    }
    assert_eq!(volume.allocated_clusters("/d").unwrap(), 2);

    // The first allocation on a fresh volume takes cluster 2, so the
    // directory's first cluster sits at the start of the data region.
    let d = volume
        .list_dir("/")
        .unwrap()
        .into_iter()
        .find(|e| e.name == "d")
        .unwrap();
    assert_eq!(d.first_cluster, 2);

    // Forge an end marker over f13, the last slot of the first cluster.
    // The sentinel ends that cluster's valid region only; the scan must
    // still reach f14 in the second cluster of the chain.
    let mut bytes = volume.as_bytes().to_vec();
    bytes[HEADER_SECTORS * BYTES_PER_SECTOR + 15 * 32] = 0x00;
    let volume = Volume::from_image(bytes).unwrap();

    let names: Vec<String> = volume
        .list_dir("/d")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert!(!names.contains(&"f13".to_string()));
    assert!(names.contains(&"f12".to_string()));
    assert!(names.contains(&"f14".to_string()));
    assert_eq!(names.len(), 16);

    assert_eq!(volume.stat("/d/f14").unwrap().size, 0);
    assert!(matches!(
        volume.stat("/d/f13"),
        Err(FsError::NotFound { .. })
    ));
}

#[test]
fn volume_label_entries_stay_invisible() {
    let volume = default_volume();
    let mut bytes = volume.as_bytes().to_vec();

    // Forge a label record in the first root slot. The root directory sits
    // right after the reserved sector and both 9-sector FAT copies.
    let root = (1 + 2 * 9) * 512;
    bytes[root..root + 8].copy_from_slice(b"LABEL   ");
    bytes[root + 11] = 0x08;
    bytes[root + 26..root + 28].copy_from_slice(&0xFFFFu16.to_le_bytes());

    let mut volume = Volume::from_image(bytes).unwrap();
    assert!(volume.list_dir("/").unwrap().is_empty());
    assert!(matches!(
        volume.stat("/LABEL"),
        Err(FsError::NotFound { .. })
    ));
    assert!(matches!(
        volume.read("/LABEL", 0, 4),
        Err(FsError::NotFound { .. })
    ));
    // The resolver still matches the name, so the slot cannot be taken.
    assert!(matches!(
        volume.create("/LABEL"),
        Err(FsError::AlreadyExists { .. })
    ));
}

#[test]
fn statfs_tracks_free_clusters() {
    let mut volume = default_volume();
    let before = volume.statfs();
    assert_eq!(before.free_blocks, before.total_blocks);
    assert_eq!(before.name_max, 8);

    volume.create("/f").unwrap();
    volume.write("/f", 0, &[0u8; 2000]).unwrap();
    let after = volume.statfs();
    assert_eq!(after.free_blocks, before.free_blocks - 4);
}

#[test]
fn errno_mapping_matches_the_adapter_contract() {
    let mut volume = default_volume();
    assert_eq!(volume.stat("/missing").unwrap_err().errno(), 2);
    volume.mkdir("/d").unwrap();
    assert_eq!(volume.unlink("/d").unwrap_err().errno(), 21);
    volume.create("/d/f").unwrap();
    assert_eq!(volume.rmdir("/d").unwrap_err().errno(), 39);
    assert_eq!(volume.create("/bad.name").unwrap_err().errno(), 22);
    assert_eq!(volume.truncate("/d/f", 1 << 40).unwrap_err().errno(), 27);
    assert_eq!(FsError::NoSpace.errno(), 28);
    assert_eq!(FsError::DirectoryFull.errno(), 23);
}
