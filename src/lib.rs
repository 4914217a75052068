//! fat16-mem: a minimal FAT16 filesystem engine over a single in-memory disk image
//!
//! The whole volume lives in one byte buffer owned by [`Volume`]. The buffer is
//! either formatted fresh or loaded byte-for-byte from a host file, mutated in
//! place by the filesystem operations, and serialized back out at unmount time.
//!
//! The engine performs no internal synchronization: every mutating operation
//! takes `&mut self`. An adapter that dispatches requests from multiple worker
//! threads must hold the volume behind a single `Mutex` (or an equivalent
//! serializing discipline) for the duration of each operation.

pub mod error;
pub mod fat16;

// Re-export main types
pub use error::{FsError, Result};
pub use fat16::layout::DEFAULT_IMAGE_SIZE;
pub use fat16::volume::Volume;
pub use fat16::{Fat16Params, FileEntry, Metadata, StatFs};
