//! Directory-entry codec.
//!
//! One entry is a 32-byte record: name[0..8], extension[8..11] (reserved,
//! unused by the naming logic), attributes[11], reserved[12..22], modify
//! time[22..24] and date[24..26], first cluster[26..28], size[28..32].
//! Byte 0 of the name doubles as the slot state: 0x00 ends the valid region
//! of an entry array, 0xE5 marks a deleted (reusable) slot, and a leading
//! space also denotes an unused slot.

use crate::fat16::{ATTR_DIRECTORY, ATTR_VOLUME_LABEL, CLUSTER_END, DIR_ENTRY_SIZE};

pub(crate) const NAME_LEN: usize = 8;
pub(crate) const END_MARKER: u8 = 0x00;
pub(crate) const DELETED_MARKER: u8 = 0xE5;

const ATTR_OFFSET: usize = 11;
const FIRST_CLUSTER_OFFSET: usize = 26;
const SIZE_OFFSET: usize = 28;

/// True when this slot terminates the valid region of its entry array.
/// Every slot after it is unused as well.
pub(crate) fn is_end(entry: &[u8]) -> bool {
    entry[0] == END_MARKER
}

/// True when this slot holds a live entry (not end, deleted or unused).
pub(crate) fn exists(entry: &[u8]) -> bool {
    entry[0] != END_MARKER && entry[0] != DELETED_MARKER && entry[0] != b' '
}

pub(crate) fn attr(entry: &[u8]) -> u8 {
    entry[ATTR_OFFSET]
}

pub(crate) fn is_directory(entry: &[u8]) -> bool {
    attr(entry) & ATTR_DIRECTORY != 0
}

pub(crate) fn is_volume_label(entry: &[u8]) -> bool {
    attr(entry) & ATTR_VOLUME_LABEL != 0
}

pub(crate) fn first_cluster(entry: &[u8]) -> u16 {
    u16::from_le_bytes([entry[FIRST_CLUSTER_OFFSET], entry[FIRST_CLUSTER_OFFSET + 1]])
}

pub(crate) fn set_first_cluster(entry: &mut [u8], cluster: u16) {
    entry[FIRST_CLUSTER_OFFSET..FIRST_CLUSTER_OFFSET + 2].copy_from_slice(&cluster.to_le_bytes());
}

pub(crate) fn size(entry: &[u8]) -> u32 {
    u32::from_le_bytes([
        entry[SIZE_OFFSET],
        entry[SIZE_OFFSET + 1],
        entry[SIZE_OFFSET + 2],
        entry[SIZE_OFFSET + 3],
    ])
}

pub(crate) fn set_size(entry: &mut [u8], size: u32) {
    entry[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&size.to_le_bytes());
}

/// Renders the stored name: the 8 name bytes truncated at the first space.
/// The reserved extension field takes no part in this.
pub(crate) fn display_name(entry: &[u8]) -> String {
    let name = &entry[..NAME_LEN];
    let len = name.iter().position(|&b| b == b' ').unwrap_or(NAME_LEN);
    String::from_utf8_lossy(&name[..len]).into_owned()
}

/// Compares a stored name against one path component.
///
/// Only the 8 name bytes participate. A stored name shorter than 8
/// characters must match the component exactly; a full 8-character name
/// matches on the component's first 8 bytes.
pub(crate) fn name_matches(entry: &[u8], component: &str) -> bool {
    let name = &entry[..NAME_LEN];
    let len = name.iter().position(|&b| b == b' ').unwrap_or(NAME_LEN);
    if len == NAME_LEN {
        component.as_bytes().get(..NAME_LEN) == Some(&name[..NAME_LEN])
    } else {
        component.as_bytes() == &name[..len]
    }
}

/// Marks the slot deleted. The record body is left in place; later scans
/// skip the slot, they do not stop at it.
pub(crate) fn mark_deleted(entry: &mut [u8]) {
    entry[0] = DELETED_MARKER;
}

/// Writes a fresh entry into a slot: cleared metadata, space-padded name,
/// no cluster chain yet (first cluster holds the end sentinel).
pub(crate) fn init(entry: &mut [u8], name: &str, attributes: u8) {
    debug_assert!(name.len() <= NAME_LEN);
    entry[..DIR_ENTRY_SIZE].fill(0);
    entry[..NAME_LEN].fill(b' ');
    entry[..name.len()].copy_from_slice(name.as_bytes());
    entry[ATTR_OFFSET] = attributes;
    set_first_cluster(entry, CLUSTER_END);
}

/// Checks a candidate file or directory name: 1 to 8 characters, each one
/// of `[A-Za-z0-9_]`. No dots, no slashes, nothing else.
pub fn validate_name(name: &str) -> bool {
    if name.is_empty() || name.len() > NAME_LEN {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
