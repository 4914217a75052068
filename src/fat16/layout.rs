//! On-disk layout: boot record codec and volume formatting.
//!
//! The boot sector holds the jump stub, OEM id, BIOS Parameter Block and the
//! extended BPB at their fixed byte offsets, ending in the 0x55AA signature.
//! All multi-byte fields are little-endian; nothing here relies on the memory
//! layout of any Rust struct.

use crate::error::{FsError, Result};
use crate::fat16::{DIR_ENTRY_SIZE, Fat16Params};

// Format-time geometry. A mounted volume re-reads all of this from the BPB,
// so images with other (valid) geometry are still accepted.
pub const BYTES_PER_SECTOR: usize = 512;
pub const SECTORS_PER_CLUSTER: usize = 1;
pub const RESERVED_SECTORS: usize = 1;
pub const NUMBER_OF_FATS: usize = 2;
pub const ROOT_ENTRIES: usize = 512;
pub const SECTORS_PER_FAT: usize = 9;
pub const DEFAULT_DATA_SECTORS: usize = 0x1000;

pub const CLUSTER_SIZE: usize = BYTES_PER_SECTOR * SECTORS_PER_CLUSTER;
pub const ROOT_SECTORS: usize =
    (ROOT_ENTRIES * DIR_ENTRY_SIZE + BYTES_PER_SECTOR - 1) / BYTES_PER_SECTOR;
pub const HEADER_SECTORS: usize = RESERVED_SECTORS + NUMBER_OF_FATS * SECTORS_PER_FAT + ROOT_SECTORS;

/// Image size produced by `Volume::format_new(DEFAULT_IMAGE_SIZE)`.
pub const DEFAULT_IMAGE_SIZE: usize = (HEADER_SECTORS + DEFAULT_DATA_SECTORS) * BYTES_PER_SECTOR;

const OEM_ID: &[u8; 8] = b"my_fat16";
const VOLUME_LABEL: &[u8] = b"my_fat16";
const FS_TYPE: &[u8] = b"FAT16";
const MEDIA_DESCRIPTOR: u8 = 0xF8; // fixed disk
const VOLUME_SERIAL: u16 = 0x1234;

/// Formats a raw buffer into an empty FAT16 volume.
///
/// Fails when the buffer cannot even hold the header region (boot sector,
/// FAT copies and root directory). The root directory is left all-zero,
/// which reads back as "end of valid entries" at slot 0.
pub fn format(buf: &mut [u8]) -> Result<()> {
    if buf.len() < HEADER_SECTORS * BYTES_PER_SECTOR {
        return Err(FsError::invalid_argument(
            "buffer smaller than the header region",
        ));
    }

    buf.fill(0);

    let total_sectors = (buf.len() / BYTES_PER_SECTOR) as u32;

    buf[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    buf[3..11].copy_from_slice(OEM_ID);

    // BPB
    buf[11..13].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
    buf[13] = SECTORS_PER_CLUSTER as u8;
    buf[14..16].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
    buf[16] = NUMBER_OF_FATS as u8;
    buf[17..19].copy_from_slice(&(ROOT_ENTRIES as u16).to_le_bytes());
    if total_sectors <= u16::MAX as u32 {
        buf[19..21].copy_from_slice(&(total_sectors as u16).to_le_bytes());
    } else {
        buf[32..36].copy_from_slice(&total_sectors.to_le_bytes());
    }
    buf[21] = MEDIA_DESCRIPTOR;
    buf[22..24].copy_from_slice(&(SECTORS_PER_FAT as u16).to_le_bytes());
    // Geometry placeholders: 9 sectors per track, 1 head, no hidden sectors.
    buf[24..26].copy_from_slice(&9u16.to_le_bytes());
    buf[26..28].copy_from_slice(&1u16.to_le_bytes());

    // Extended BPB
    buf[36] = 0x80; // physical drive number: first hard disk
    buf[37] = 1;
    buf[38] = 0;
    buf[39..41].copy_from_slice(&VOLUME_SERIAL.to_le_bytes());
    buf[41..41 + VOLUME_LABEL.len()].copy_from_slice(VOLUME_LABEL);
    buf[52..52 + FS_TYPE.len()].copy_from_slice(FS_TYPE);

    buf[510] = 0x55;
    buf[511] = 0xAA;

    // Reserved FAT entries 0 and 1 in every copy. Entry 0's low byte repeats
    // the media descriptor. Everything else stays zero, i.e. free.
    for copy in 0..NUMBER_OF_FATS {
        let fat = (RESERVED_SECTORS + SECTORS_PER_FAT * copy) * BYTES_PER_SECTOR;
        buf[fat..fat + 2].copy_from_slice(&0xFFF8u16.to_le_bytes());
        buf[fat + 2..fat + 4].copy_from_slice(&0xFFFFu16.to_le_bytes());
    }

    Ok(())
}

/// Decodes and validates the BPB of a raw image.
pub fn read_params(buf: &[u8]) -> Result<Fat16Params> {
    if buf.len() < BYTES_PER_SECTOR {
        return Err(FsError::invalid_image("image smaller than one sector"));
    }
    if buf[510] != 0x55 || buf[511] != 0xAA {
        return Err(FsError::invalid_image("missing boot sector signature"));
    }

    let params = Fat16Params {
        bytes_per_sector: u16::from_le_bytes([buf[11], buf[12]]),
        sectors_per_cluster: buf[13],
        reserved_sectors: u16::from_le_bytes([buf[14], buf[15]]),
        num_fats: buf[16],
        root_entries: u16::from_le_bytes([buf[17], buf[18]]),
        sectors_per_fat: u16::from_le_bytes([buf[22], buf[23]]),
        total_sectors: {
            let small = u16::from_le_bytes([buf[19], buf[20]]);
            if small != 0 {
                small as u32
            } else {
                u32::from_le_bytes([buf[32], buf[33], buf[34], buf[35]])
            }
        },
    };

    if params.bytes_per_sector < 512 || params.bytes_per_sector > 4096 {
        return Err(FsError::invalid_image("bytes_per_sector out of range"));
    }
    if params.sectors_per_cluster == 0 || params.sectors_per_cluster > 128 {
        return Err(FsError::invalid_image("sectors_per_cluster out of range"));
    }
    if params.reserved_sectors == 0 {
        return Err(FsError::invalid_image("reserved_sectors is zero"));
    }
    if params.num_fats == 0 || params.num_fats > 4 {
        return Err(FsError::invalid_image("number of FATs out of range"));
    }
    if params.sectors_per_fat == 0 {
        return Err(FsError::invalid_image("sectors_per_fat is zero"));
    }
    if params.root_entries == 0 {
        return Err(FsError::invalid_image("root_entries is zero"));
    }
    if params.total_sectors == 0 {
        return Err(FsError::invalid_image("total sector count is zero"));
    }
    if buf.len() / params.bytes_per_sector as usize != params.total_sectors as usize {
        return Err(FsError::invalid_image(
            "image size disagrees with recorded sector count",
        ));
    }

    let root_sectors = (params.root_entries as usize * DIR_ENTRY_SIZE)
        .div_ceil(params.bytes_per_sector as usize);
    let header_sectors = params.reserved_sectors as usize
        + params.num_fats as usize * params.sectors_per_fat as usize
        + root_sectors;
    if header_sectors > params.total_sectors as usize {
        return Err(FsError::invalid_image("header region exceeds the volume"));
    }

    Ok(params)
}
