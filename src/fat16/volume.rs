use std::fs;
use std::path::Path;

use crate::error::{FsError, Result};
use crate::fat16::{
    ATTR_DIRECTORY, CLUSTER_END, CLUSTER_FREE, CLUSTER_MAX, CLUSTER_MIN, DIR_ENTRY_SIZE,
    Fat16Params, FileEntry, Metadata, StatFs, entry, layout, path,
};

/// Which entry array one path component is looked up in. The root directory
/// is a fixed flat array; every other directory is a cluster chain whose
/// clusters hold further entries.
#[derive(Debug, Clone, Copy)]
enum DirTable {
    Root,
    Chain(u16),
}

/// A mounted FAT16 volume: one owned byte buffer holding the entire disk
/// image, partitioned at mount time into boot record, FAT copies, root
/// directory and cluster-addressed data region.
///
/// Only the first FAT copy is authoritative; the redundant copies are
/// written at format time and left alone afterwards.
///
/// All operations are synchronous and touch nothing outside the buffer.
/// Mutating operations take `&mut self`; a multi-threaded adapter wraps the
/// volume in a single `Mutex`.
pub struct Volume {
    buf: Vec<u8>,
    cluster_size: usize,
    fat_offset: usize,
    root_offset: usize,
    root_entries: usize,
    data_offset: usize,
    /// One past the highest addressable cluster number; bounded by the data
    /// region, the FAT capacity and the 16-bit allocation range.
    cluster_limit: u16,
}

impl Volume {
    /// Formats a fresh image of `size` bytes and mounts it.
    pub fn format_new(size: usize) -> Result<Volume> {
        let mut buf = vec![0u8; size];
        layout::format(&mut buf)?;
        Self::from_image(buf)
    }

    /// Mounts a raw image, taking ownership of the buffer. The BPB is
    /// validated and every region offset is computed once, here.
    pub fn from_image(buf: Vec<u8>) -> Result<Volume> {
        let params = layout::read_params(&buf)?;
        let Fat16Params {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            root_entries,
            sectors_per_fat,
            total_sectors,
        } = params;

        let bps = bytes_per_sector as usize;
        let cluster_size = sectors_per_cluster as usize * bps;
        let fat_offset = reserved_sectors as usize * bps;
        let root_offset = fat_offset + num_fats as usize * sectors_per_fat as usize * bps;
        let data_offset = root_offset + root_entries as usize * DIR_ENTRY_SIZE;

        let total_bytes = total_sectors as usize * bps;
        let data_clusters = total_bytes.saturating_sub(data_offset) / cluster_size;
        let fat_capacity = sectors_per_fat as usize * bps / 2;
        let cluster_limit = (CLUSTER_MIN as usize + data_clusters)
            .min(fat_capacity)
            .min(CLUSTER_MAX as usize + 1) as u16;

        log::debug!(
            "mount: {} sectors, cluster size {}, clusters {}..{}",
            total_sectors,
            cluster_size,
            CLUSTER_MIN,
            cluster_limit
        );

        Ok(Volume {
            buf,
            cluster_size,
            fat_offset,
            root_offset,
            root_entries: root_entries as usize,
            data_offset,
            cluster_limit,
        })
    }

    /// Loads an image file byte-for-byte and mounts it.
    pub fn load_image(path: impl AsRef<Path>) -> Result<Volume> {
        let path = path.as_ref();
        log::info!("loading image from {}", path.display());
        Self::from_image(fs::read(path)?)
    }

    /// Serializes the volume back to a host file, byte-for-byte.
    pub fn save_image(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        log::info!("saving image to {}", path.display());
        fs::write(path, &self.buf)?;
        Ok(())
    }

    /// The raw image, byte-for-byte identical to what `save_image` writes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    // ---- cluster and FAT access --------------------------------------

    /// True when `cluster` addresses a slot inside the data region.
    fn cluster_in_use(&self, cluster: u16) -> bool {
        cluster >= CLUSTER_MIN && cluster < self.cluster_limit
    }

    fn cluster_start(&self, cluster: u16) -> usize {
        self.data_offset + (cluster - CLUSTER_MIN) as usize * self.cluster_size
    }

    /// Bounds-checked cluster accessor. An out-of-range cluster number in a
    /// chain is data corruption, not a recoverable condition.
    fn cluster(&self, cluster: u16) -> Result<&[u8]> {
        if !self.cluster_in_use(cluster) {
            return Err(FsError::corrupted(format!(
                "cluster {} outside the addressable data region",
                cluster
            )));
        }
        let start = self.cluster_start(cluster);
        Ok(&self.buf[start..start + self.cluster_size])
    }

    fn cluster_mut(&mut self, cluster: u16) -> Result<&mut [u8]> {
        if !self.cluster_in_use(cluster) {
            return Err(FsError::corrupted(format!(
                "cluster {} outside the addressable data region",
                cluster
            )));
        }
        let start = self.cluster_start(cluster);
        Ok(&mut self.buf[start..start + self.cluster_size])
    }

    /// Reads a link from the authoritative FAT copy.
    fn fat_entry(&self, cluster: u16) -> u16 {
        let offset = self.fat_offset + cluster as usize * 2;
        if offset + 2 > self.root_offset {
            return CLUSTER_END;
        }
        u16::from_le_bytes([self.buf[offset], self.buf[offset + 1]])
    }

    fn set_fat_entry(&mut self, cluster: u16, value: u16) {
        let offset = self.fat_offset + cluster as usize * 2;
        if offset + 2 > self.root_offset {
            return;
        }
        self.buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Number of free clusters in the allocation range.
    pub fn free_clusters(&self) -> usize {
        (CLUSTER_MIN..self.cluster_limit)
            .filter(|&n| self.fat_entry(n) == CLUSTER_FREE)
            .count()
    }

    // ---- cluster allocator -------------------------------------------

    /// Allocates `count` clusters as one linked chain and returns its head.
    ///
    /// The FAT is scanned linearly from the lowest cluster number; every
    /// allocated cluster's storage is zero-filled. All-or-nothing: when
    /// fewer than `count` free entries exist, everything claimed so far is
    /// rolled back and `NoSpace` is returned.
    fn allocate_chain(&mut self, count: usize) -> Result<u16> {
        debug_assert!(count > 0);
        let mut clusters: Vec<u16> = Vec::with_capacity(count);
        let mut n = CLUSTER_MIN;
        while clusters.len() < count && n < self.cluster_limit {
            if self.fat_entry(n) == CLUSTER_FREE {
                self.set_fat_entry(n, CLUSTER_END);
                clusters.push(n);
            }
            n += 1;
        }

        if clusters.len() < count {
            for &c in &clusters {
                self.set_fat_entry(c, CLUSTER_FREE);
            }
            return Err(FsError::NoSpace);
        }

        for i in 0..clusters.len() - 1 {
            self.set_fat_entry(clusters[i], clusters[i + 1]);
        }
        for &c in &clusters {
            self.cluster_mut(c)?.fill(0);
        }

        Ok(clusters[0])
    }

    /// Walks a chain from `head` and marks every entry free. Iterative, with
    /// a hop cap as a guard against cyclic corruption. No-op when `head` is
    /// not an in-use cluster number.
    fn release_chain(&mut self, head: u16) {
        let mut current = head;
        let mut hops = 0usize;
        while self.cluster_in_use(current) && hops < self.cluster_limit as usize {
            let next = self.fat_entry(current);
            self.set_fat_entry(current, CLUSTER_FREE);
            current = next;
            hops += 1;
        }
    }

    /// Counts the clusters of a chain; 0 when `head` is not in use.
    fn chain_length(&self, head: u16) -> usize {
        let mut count = 0usize;
        let mut current = head;
        while self.cluster_in_use(current) && count < self.cluster_limit as usize {
            count += 1;
            current = self.fat_entry(current);
        }
        count
    }

    /// Grows or shrinks the chain owned by the entry at `entry_off` to
    /// exactly `new_count` clusters. On allocation failure the chain keeps
    /// its prior length.
    fn resize_chain(&mut self, entry_off: usize, new_count: usize) -> Result<()> {
        let head = entry::first_cluster(self.entry(entry_off));
        let old_count = self.chain_length(head);
        if new_count == old_count {
            return Ok(());
        }

        if new_count < old_count {
            if new_count == 0 {
                self.release_chain(head);
                entry::set_first_cluster(self.entry_mut(entry_off), CLUSTER_END);
            } else {
                let mut last = head;
                for _ in 1..new_count {
                    last = self.fat_entry(last);
                }
                let tail = self.fat_entry(last);
                self.set_fat_entry(last, CLUSTER_END);
                self.release_chain(tail);
            }
        } else {
            let grown = self.allocate_chain(new_count - old_count)?;
            if old_count == 0 {
                entry::set_first_cluster(self.entry_mut(entry_off), grown);
            } else {
                let mut last = head;
                while self.cluster_in_use(self.fat_entry(last)) {
                    last = self.fat_entry(last);
                }
                self.set_fat_entry(last, grown);
            }
        }
        Ok(())
    }

    /// Allocates one zeroed cluster and appends it to the entry's chain
    /// (or installs it as the first cluster). Returns the new cluster
    /// number; used to give a full directory room for more entries.
    fn append_cluster(&mut self, entry_off: usize) -> Result<u16> {
        let new = self.allocate_chain(1)?;
        let head = entry::first_cluster(self.entry(entry_off));
        if self.cluster_in_use(head) {
            let mut last = head;
            while self.cluster_in_use(self.fat_entry(last)) {
                last = self.fat_entry(last);
            }
            self.set_fat_entry(last, new);
        } else {
            entry::set_first_cluster(self.entry_mut(entry_off), new);
        }
        Ok(new)
    }

    // ---- directory entries -------------------------------------------

    fn entry(&self, off: usize) -> &[u8] {
        &self.buf[off..off + DIR_ENTRY_SIZE]
    }

    fn entry_mut(&mut self, off: usize) -> &mut [u8] {
        &mut self.buf[off..off + DIR_ENTRY_SIZE]
    }

    fn entries_per_cluster(&self) -> usize {
        self.cluster_size / DIR_ENTRY_SIZE
    }

    /// Finds a live entry named `name` in one directory. For chained
    /// directories the end sentinel short-circuits only the cluster it
    /// appears in; the scan moves on to the next cluster of the chain.
    fn find_in_dir(&self, dir: DirTable, name: &str) -> Option<usize> {
        match dir {
            DirTable::Root => {
                for i in 0..self.root_entries {
                    let off = self.root_offset + i * DIR_ENTRY_SIZE;
                    let e = self.entry(off);
                    if entry::is_end(e) {
                        break;
                    }
                    if entry::exists(e) && entry::name_matches(e, name) {
                        return Some(off);
                    }
                }
                None
            }
            DirTable::Chain(head) => {
                let mut cluster = head;
                let mut hops = 0usize;
                while self.cluster_in_use(cluster) && hops < self.cluster_limit as usize {
                    let base = self.cluster_start(cluster);
                    for i in 0..self.entries_per_cluster() {
                        let off = base + i * DIR_ENTRY_SIZE;
                        let e = self.entry(off);
                        if entry::is_end(e) {
                            break;
                        }
                        if entry::exists(e) && entry::name_matches(e, name) {
                            return Some(off);
                        }
                    }
                    cluster = self.fat_entry(cluster);
                    hops += 1;
                }
                None
            }
        }
    }

    /// First reusable slot of a directory: the end sentinel, a deleted
    /// entry or an unused one, whichever comes first.
    fn find_free_slot(&self, dir: DirTable) -> Option<usize> {
        match dir {
            DirTable::Root => (0..self.root_entries)
                .map(|i| self.root_offset + i * DIR_ENTRY_SIZE)
                .find(|&off| {
                    let e = self.entry(off);
                    entry::is_end(e) || !entry::exists(e)
                }),
            DirTable::Chain(head) => {
                let mut cluster = head;
                let mut hops = 0usize;
                while self.cluster_in_use(cluster) && hops < self.cluster_limit as usize {
                    let base = self.cluster_start(cluster);
                    for i in 0..self.entries_per_cluster() {
                        let off = base + i * DIR_ENTRY_SIZE;
                        let e = self.entry(off);
                        if entry::is_end(e) || !entry::exists(e) {
                            return Some(off);
                        }
                    }
                    cluster = self.fat_entry(cluster);
                    hops += 1;
                }
                None
            }
        }
    }

    /// A free slot in the given parent directory (`None` = root), growing
    /// a chained parent by one cluster when every existing slot is taken.
    /// The root array cannot grow.
    fn free_slot_for(&mut self, parent: Option<usize>) -> Result<usize> {
        match parent {
            None => self
                .find_free_slot(DirTable::Root)
                .ok_or(FsError::DirectoryFull),
            Some(owner) => {
                let head = entry::first_cluster(self.entry(owner));
                if let Some(off) = self.find_free_slot(DirTable::Chain(head)) {
                    return Ok(off);
                }
                let new = self.append_cluster(owner)?;
                Ok(self.cluster_start(new))
            }
        }
    }

    /// Releases the entry's cluster chain and marks the slot deleted.
    fn remove_entry(&mut self, off: usize) {
        let head = entry::first_cluster(self.entry(off));
        self.release_chain(head);
        entry::mark_deleted(self.entry_mut(off));
    }

    /// A directory counts as empty when nothing but removed/unused slots
    /// and the `.`/`..` pseudo-entries remain.
    fn dir_is_empty(&self, head: u16) -> bool {
        let mut cluster = head;
        let mut hops = 0usize;
        while self.cluster_in_use(cluster) && hops < self.cluster_limit as usize {
            let base = self.cluster_start(cluster);
            for i in 0..self.entries_per_cluster() {
                let e = self.entry(base + i * DIR_ENTRY_SIZE);
                if entry::is_end(e) {
                    return true;
                }
                if !entry::exists(e) {
                    continue;
                }
                let name = entry::display_name(e);
                if name != "." && name != ".." {
                    return false;
                }
            }
            cluster = self.fat_entry(cluster);
            hops += 1;
        }
        true
    }

    // ---- path resolution ---------------------------------------------

    /// Resolves path components to the byte offset of the matched entry.
    /// The root itself has no entry; callers special-case root paths
    /// before coming here.
    fn resolve_components(&self, parts: &[&str], full_path: &str) -> Result<usize> {
        debug_assert!(!parts.is_empty());
        let mut dir = DirTable::Root;
        let mut matched = 0usize;
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                let e = self.entry(matched);
                if !entry::is_directory(e) {
                    return Err(FsError::not_a_directory(full_path));
                }
                dir = DirTable::Chain(entry::first_cluster(e));
            }
            matched = self
                .find_in_dir(dir, part)
                .ok_or_else(|| FsError::not_found(full_path))?;
        }
        Ok(matched)
    }

    fn resolve(&self, path: &str) -> Result<usize> {
        self.resolve_components(&path::components(path), path)
    }

    /// Resolves the parent directory of a leaf: `None` for the root array,
    /// otherwise the entry offset of a directory.
    fn resolve_parent(&self, parent_parts: &[&str], full_path: &str) -> Result<Option<usize>> {
        if parent_parts.is_empty() {
            return Ok(None);
        }
        let off = self.resolve_components(parent_parts, full_path)?;
        if !entry::is_directory(self.entry(off)) {
            return Err(FsError::not_a_directory(full_path));
        }
        Ok(Some(off))
    }

    // ---- file I/O ----------------------------------------------------

    /// Reads up to `length` bytes starting at byte `offset` of the entry's
    /// content, clamped to the recorded file size.
    fn read_at(&self, entry_off: usize, offset: u32, length: u32) -> Result<Vec<u8>> {
        let e = self.entry(entry_off);
        let size = entry::size(e);

        offset
            .checked_add(length)
            .ok_or_else(|| FsError::invalid_argument("offset + length overflows"))?;
        if length == 0 || offset >= size {
            return Ok(Vec::new());
        }
        let length = length.min(size - offset);

        let (mut cluster, intra) = self.seek_chain(entry::first_cluster(e), offset)?;

        let mut out = Vec::with_capacity(length as usize);
        let mut remaining = length as usize;
        let mut intra = intra;
        loop {
            let data = self.cluster(cluster)?;
            let take = remaining.min(self.cluster_size - intra);
            out.extend_from_slice(&data[intra..intra + take]);
            remaining -= take;
            if remaining == 0 {
                break;
            }
            intra = 0;
            cluster = self.fat_entry(cluster);
        }
        Ok(out)
    }

    /// Writes `data` at byte `offset`, growing the chain first when the
    /// resulting end lies beyond it. A failed growth leaves prior content
    /// untouched. The recorded size only ever grows here; overwrites
    /// within the existing bounds keep it.
    fn write_at(&mut self, entry_off: usize, offset: u32, data: &[u8]) -> Result<usize> {
        if data.len() > u32::MAX as usize {
            return Err(FsError::invalid_argument("write length exceeds u32 range"));
        }
        let end = offset
            .checked_add(data.len() as u32)
            .ok_or_else(|| FsError::invalid_argument("offset + length overflows"))?;
        if data.is_empty() {
            return Ok(0);
        }

        let needed = end.div_ceil(self.cluster_size as u32) as usize;
        let head = entry::first_cluster(self.entry(entry_off));
        if needed > self.chain_length(head) {
            self.resize_chain(entry_off, needed)?;
        }

        let head = entry::first_cluster(self.entry(entry_off));
        let (mut cluster, mut intra) = self.seek_chain(head, offset)?;

        let mut pos = 0usize;
        loop {
            let take = (data.len() - pos).min(self.cluster_size - intra);
            let dst = self.cluster_mut(cluster)?;
            dst[intra..intra + take].copy_from_slice(&data[pos..pos + take]);
            pos += take;
            if pos == data.len() {
                break;
            }
            intra = 0;
            cluster = self.fat_entry(cluster);
        }

        if end > entry::size(self.entry(entry_off)) {
            entry::set_size(self.entry_mut(entry_off), end);
        }
        Ok(data.len())
    }

    /// Walks `offset / cluster_size` hops from `head` and returns the
    /// cluster holding that byte together with the intra-cluster offset.
    /// A chain that runs out before the hop count is a consistency fault.
    fn seek_chain(&self, head: u16, offset: u32) -> Result<(u16, usize)> {
        let cs = self.cluster_size as u32;
        let mut cluster = head;
        let mut skip = offset;
        loop {
            if !self.cluster_in_use(cluster) {
                log::warn!("cluster chain shorter than the recorded file size");
                return Err(FsError::corrupted(
                    "cluster chain shorter than the recorded file size",
                ));
            }
            if skip < cs {
                return Ok((cluster, skip as usize));
            }
            cluster = self.fat_entry(cluster);
            skip -= cs;
        }
    }

    /// Adjusts the entry's content to exactly `new_size` bytes. Growth
    /// zero-fills the newly exposed range through the write path, since
    /// clusters retained across an earlier shrink may hold stale bytes past
    /// the old end. The size field is updated last.
    fn truncate_entry(&mut self, entry_off: usize, new_size: u64) -> Result<()> {
        if new_size > u32::MAX as u64 {
            return Err(FsError::TooLarge);
        }
        let new_size = new_size as u32;
        let old_size = entry::size(self.entry(entry_off));

        if new_size > old_size {
            let zeros = vec![0u8; (new_size - old_size) as usize];
            self.write_at(entry_off, old_size, &zeros)?;
        } else if new_size < old_size {
            let clusters = new_size.div_ceil(self.cluster_size as u32) as usize;
            self.resize_chain(entry_off, clusters)?;
            entry::set_size(self.entry_mut(entry_off), new_size);
        }
        Ok(())
    }

    // ---- adapter-facing operations -----------------------------------

    /// Entry kind and size for a path. The root is always a directory.
    /// Volume-label entries are reported not-found, though the resolver
    /// itself matches them by name.
    pub fn stat(&self, path: &str) -> Result<Metadata> {
        log::debug!("stat: {}", path);
        if path::is_root(path) {
            return Ok(Metadata {
                is_directory: true,
                size: 0,
            });
        }
        let off = self.resolve(path)?;
        let e = self.entry(off);
        if entry::is_volume_label(e) {
            return Err(FsError::not_found(path));
        }
        Ok(Metadata {
            is_directory: entry::is_directory(e),
            size: entry::size(e),
        })
    }

    /// Children of a directory, rescanned from the volume on every call.
    /// Volume-label entries are skipped.
    pub fn list_dir(&self, path: &str) -> Result<Vec<FileEntry>> {
        log::debug!("list_dir: {}", path);
        let table = if path::is_root(path) {
            DirTable::Root
        } else {
            let off = self.resolve(path)?;
            let e = self.entry(off);
            if entry::is_volume_label(e) {
                return Err(FsError::not_found(path));
            }
            if !entry::is_directory(e) {
                return Err(FsError::not_a_directory(path));
            }
            DirTable::Chain(entry::first_cluster(e))
        };

        let mut out = Vec::new();
        match table {
            DirTable::Root => {
                for i in 0..self.root_entries {
                    let e = self.entry(self.root_offset + i * DIR_ENTRY_SIZE);
                    if entry::is_end(e) {
                        break;
                    }
                    if entry::exists(e) && !entry::is_volume_label(e) {
                        out.push(FileEntry {
                            name: entry::display_name(e),
                            first_cluster: entry::first_cluster(e),
                            size: entry::size(e),
                            is_directory: entry::is_directory(e),
                        });
                    }
                }
            }
            DirTable::Chain(head) => {
                let mut cluster = head;
                let mut hops = 0usize;
                while self.cluster_in_use(cluster) && hops < self.cluster_limit as usize {
                    let base = self.cluster_start(cluster);
                    for i in 0..self.entries_per_cluster() {
                        let e = self.entry(base + i * DIR_ENTRY_SIZE);
                        if entry::is_end(e) {
                            break;
                        }
                        if entry::exists(e) && !entry::is_volume_label(e) {
                            out.push(FileEntry {
                                name: entry::display_name(e),
                                first_cluster: entry::first_cluster(e),
                                size: entry::size(e),
                                is_directory: entry::is_directory(e),
                            });
                        }
                    }
                    cluster = self.fat_entry(cluster);
                    hops += 1;
                }
            }
        }
        Ok(out)
    }

    /// Checks that a path is openable. With `truncate` the content is cut
    /// to zero bytes, the one explicit truncation side effect of the open
    /// path; plain writes never truncate.
    pub fn open(&mut self, path: &str, truncate: bool) -> Result<()> {
        log::debug!("open: {} (truncate: {})", path, truncate);
        if path::is_root(path) {
            return if truncate {
                Err(FsError::is_a_directory(path))
            } else {
                Ok(())
            };
        }
        let off = self.resolve(path)?;
        let e = self.entry(off);
        if entry::is_volume_label(e) {
            return Err(FsError::not_found(path));
        }
        if truncate {
            if entry::is_directory(e) {
                return Err(FsError::is_a_directory(path));
            }
            self.truncate_entry(off, 0)?;
        }
        Ok(())
    }

    /// Creates an empty file.
    pub fn create(&mut self, path: &str) -> Result<()> {
        log::debug!("create: {}", path);
        self.create_entry(path, false)
    }

    /// Creates a directory with one cluster seeded with the `.` and `..`
    /// pseudo-entries.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        log::debug!("mkdir: {}", path);
        self.create_entry(path, true)
    }

    fn create_entry(&mut self, path_str: &str, directory: bool) -> Result<()> {
        let parts = path::components(path_str);
        let Some(&leaf) = parts.last() else {
            return Err(FsError::invalid_name(path_str));
        };

        match self.resolve_components(&parts, path_str) {
            Ok(_) => return Err(FsError::already_exists(path_str)),
            Err(FsError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let parent = self.resolve_parent(&parts[..parts.len() - 1], path_str)?;
        if !entry::validate_name(leaf) {
            return Err(FsError::invalid_name(leaf));
        }

        let slot = self.free_slot_for(parent)?;
        entry::init(
            self.entry_mut(slot),
            leaf,
            if directory { ATTR_DIRECTORY } else { 0 },
        );

        if directory {
            let parent_first = match parent {
                // Cluster 0 is the on-disk sentinel for "parent is root".
                None => 0,
                Some(off) => entry::first_cluster(self.entry(off)),
            };
            match self.allocate_chain(1) {
                Ok(cluster) => {
                    entry::set_first_cluster(self.entry_mut(slot), cluster);
                    self.seed_dot_entries(cluster, parent_first)?;
                }
                Err(e) => {
                    entry::mark_deleted(self.entry_mut(slot));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn seed_dot_entries(&mut self, cluster: u16, parent_first: u16) -> Result<()> {
        // The cluster arrives zero-filled from the allocator, so every
        // slot past these two already reads as the end sentinel.
        let base = self.cluster_start(cluster);
        let dot = self.entry_mut(base);
        entry::init(dot, ".", ATTR_DIRECTORY);
        entry::set_first_cluster(dot, cluster);

        let dotdot = self.entry_mut(base + DIR_ENTRY_SIZE);
        entry::init(dotdot, "..", ATTR_DIRECTORY);
        entry::set_first_cluster(dotdot, parent_first);
        Ok(())
    }

    /// Removes a file: releases its chain and marks the slot deleted.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        log::debug!("unlink: {}", path);
        if path::is_root(path) {
            return Err(FsError::is_a_directory(path));
        }
        let off = self.resolve(path)?;
        let e = self.entry(off);
        if entry::is_volume_label(e) {
            return Err(FsError::not_found(path));
        }
        if entry::is_directory(e) {
            return Err(FsError::is_a_directory(path));
        }
        self.remove_entry(off);
        Ok(())
    }

    /// Removes an empty directory.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        log::debug!("rmdir: {}", path);
        if path::is_root(path) {
            return Err(FsError::invalid_argument("cannot remove the root directory"));
        }
        let off = self.resolve(path)?;
        let e = self.entry(off);
        if entry::is_volume_label(e) {
            return Err(FsError::not_found(path));
        }
        if !entry::is_directory(e) {
            return Err(FsError::not_a_directory(path));
        }
        if !self.dir_is_empty(entry::first_cluster(e)) {
            return Err(FsError::not_empty(path));
        }
        self.remove_entry(off);
        Ok(())
    }

    /// Reads up to `length` bytes of a file starting at `offset`.
    pub fn read(&self, path: &str, offset: u32, length: u32) -> Result<Vec<u8>> {
        log::debug!("read: {} offset={} length={}", path, offset, length);
        if path::is_root(path) {
            return Err(FsError::is_a_directory(path));
        }
        let off = self.resolve(path)?;
        let e = self.entry(off);
        if entry::is_volume_label(e) {
            return Err(FsError::not_found(path));
        }
        if entry::is_directory(e) {
            return Err(FsError::is_a_directory(path));
        }
        self.read_at(off, offset, length)
    }

    /// Writes `data` to a file at `offset`; returns the number of bytes
    /// written. Always an overwrite at the given offset, never an implicit
    /// truncation or append.
    pub fn write(&mut self, path: &str, offset: u32, data: &[u8]) -> Result<usize> {
        log::debug!("write: {} offset={} length={}", path, offset, data.len());
        if path::is_root(path) {
            return Err(FsError::is_a_directory(path));
        }
        let off = self.resolve(path)?;
        let e = self.entry(off);
        if entry::is_volume_label(e) {
            return Err(FsError::not_found(path));
        }
        if entry::is_directory(e) {
            return Err(FsError::is_a_directory(path));
        }
        self.write_at(off, offset, data)
    }

    /// Sets a file's size to exactly `new_size` bytes.
    pub fn truncate(&mut self, path: &str, new_size: u64) -> Result<()> {
        log::debug!("truncate: {} to {}", path, new_size);
        if path::is_root(path) {
            return Err(FsError::is_a_directory(path));
        }
        let off = self.resolve(path)?;
        let e = self.entry(off);
        if entry::is_volume_label(e) {
            return Err(FsError::not_found(path));
        }
        if entry::is_directory(e) {
            return Err(FsError::is_a_directory(path));
        }
        self.truncate_entry(off, new_size)
    }

    /// Moves the directory-entry record from `old_path` to `new_path`.
    /// Only the record (with its first-cluster pointer) moves; cluster
    /// content is never copied. An existing destination file is replaced;
    /// an existing destination directory must be empty.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        log::debug!("rename: {} -> {}", old_path, new_path);
        if path::is_root(old_path) || path::is_root(new_path) {
            return Err(FsError::invalid_name("/"));
        }
        let src = self.resolve(old_path)?;
        let src_is_dir = entry::is_directory(self.entry(src));

        // A directory must not move beneath itself; the record move would
        // leave the subtree reachable only through its own chain.
        if src_is_dir {
            let old_parts = path::components(old_path);
            let new_parts = path::components(new_path);
            if new_parts.len() > old_parts.len() && new_parts[..old_parts.len()] == old_parts[..] {
                return Err(FsError::invalid_argument(
                    "cannot move a directory beneath itself",
                ));
            }
        }

        match self.resolve(new_path) {
            Ok(dst) => {
                if dst == src {
                    return Ok(());
                }
                let dst_e = self.entry(dst);
                if src_is_dir {
                    if !entry::is_directory(dst_e) {
                        return Err(FsError::not_a_directory(new_path));
                    }
                    if !self.dir_is_empty(entry::first_cluster(dst_e)) {
                        return Err(FsError::not_empty(new_path));
                    }
                } else if entry::is_directory(dst_e) {
                    return Err(FsError::is_a_directory(new_path));
                }

                let parts = path::components(new_path);
                let parent = self.resolve_parent(&parts[..parts.len() - 1], new_path)?;
                let parent_first = match parent {
                    None => 0,
                    Some(off) => entry::first_cluster(self.entry(off)),
                };

                // The destination slot keeps its own name bytes and takes
                // over the source record, chain pointer included. The old
                // destination chain is released first, the source slot is
                // marked deleted without touching the chain it gave away.
                let mut record = [0u8; DIR_ENTRY_SIZE];
                record.copy_from_slice(self.entry(src));
                let mut dst_name = [0u8; entry::NAME_LEN];
                dst_name.copy_from_slice(&self.entry(dst)[..entry::NAME_LEN]);

                self.release_chain(entry::first_cluster(self.entry(dst)));
                let d = self.entry_mut(dst);
                d.copy_from_slice(&record);
                d[..entry::NAME_LEN].copy_from_slice(&dst_name);
                entry::mark_deleted(self.entry_mut(src));

                if src_is_dir {
                    self.update_dotdot(entry::first_cluster(&record), parent_first);
                }
                Ok(())
            }
            Err(FsError::NotFound { .. }) => {
                let parts = path::components(new_path);
                let leaf = *parts.last().expect("non-root path has a leaf");
                if !entry::validate_name(leaf) {
                    return Err(FsError::invalid_name(leaf));
                }
                let parent = self.resolve_parent(&parts[..parts.len() - 1], new_path)?;
                let parent_first = match parent {
                    None => 0,
                    Some(off) => entry::first_cluster(self.entry(off)),
                };

                let slot = self.free_slot_for(parent)?;
                let mut record = [0u8; DIR_ENTRY_SIZE];
                record.copy_from_slice(self.entry(src));
                let d = self.entry_mut(slot);
                d.copy_from_slice(&record);
                d[..entry::NAME_LEN].fill(b' ');
                d[..leaf.len()].copy_from_slice(leaf.as_bytes());
                entry::mark_deleted(self.entry_mut(src));

                if src_is_dir {
                    self.update_dotdot(entry::first_cluster(&record), parent_first);
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Re-points a moved directory's `..` pseudo-entry at its new parent.
    fn update_dotdot(&mut self, dir_head: u16, parent_first: u16) {
        if !self.cluster_in_use(dir_head) {
            return;
        }
        let off = self.cluster_start(dir_head) + DIR_ENTRY_SIZE;
        let e = self.entry(off);
        if entry::exists(e) && entry::display_name(e) == ".." {
            entry::set_first_cluster(self.entry_mut(off), parent_first);
        }
    }

    /// Clusters currently allocated to the file or directory at `path`.
    pub fn allocated_clusters(&self, path: &str) -> Result<usize> {
        let off = self.resolve(path)?;
        let e = self.entry(off);
        if entry::is_volume_label(e) {
            return Err(FsError::not_found(path));
        }
        Ok(self.chain_length(entry::first_cluster(e)))
    }

    /// Volume usage in cluster-sized blocks.
    pub fn statfs(&self) -> StatFs {
        StatFs {
            block_size: self.cluster_size as u32,
            total_blocks: (self.cluster_limit - CLUSTER_MIN) as u64,
            free_blocks: self.free_clusters() as u64,
            name_max: entry::NAME_LEN as u32,
        }
    }
}
