pub mod entry;
pub mod layout;
pub mod path;
pub mod volume;

/// Size of one on-disk directory entry record.
pub(crate) const DIR_ENTRY_SIZE: usize = 32;

// Directory-entry attribute bits
pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_LABEL: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;

// FAT entry values. Clusters 0 and 1 are reserved; anything past
// CLUSTER_MAX belongs to the end-of-chain sentinel family.
pub(crate) const CLUSTER_FREE: u16 = 0x0000;
pub(crate) const CLUSTER_MIN: u16 = 0x0002;
pub(crate) const CLUSTER_MAX: u16 = 0xFFEF;
pub(crate) const CLUSTER_END: u16 = 0xFFFF;

/// One child of a directory, as reported by `Volume::list_dir`.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub first_cluster: u16,
    pub size: u32,
    pub is_directory: bool,
}

/// Geometry decoded from the BIOS Parameter Block at mount time.
#[derive(Debug, Clone)]
pub struct Fat16Params {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entries: u16,
    pub sectors_per_fat: u16,
    pub total_sectors: u32,
}

/// What `Volume::stat` reports for one path.
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    pub is_directory: bool,
    pub size: u32,
}

/// Volume-wide usage figures, in units of one cluster.
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub block_size: u32,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub name_max: u32,
}
