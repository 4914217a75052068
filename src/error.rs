//! Error types for the fat16-mem engine

use std::fmt;
use std::io;

/// Result type for fat16-mem operations
pub type Result<T> = std::result::Result<T, FsError>;

/// Main error type for fat16-mem operations
#[derive(Debug)]
pub enum FsError {
    /// I/O error from loading or saving the backing image
    Io(io::Error),

    /// Image fails BPB validation at mount time
    InvalidImage { message: String },

    /// A path component does not resolve to any entry
    NotFound { path: String },

    /// A non-leaf path component resolves to a non-directory entry
    NotADirectory { path: String },

    /// A file-only operation targets a directory
    IsADirectory { path: String },

    /// Create/mkdir target already has an entry
    AlreadyExists { path: String },

    /// Leaf name fails the character/length rule, or the path is the root
    InvalidName { name: String },

    /// No free directory slot and chain growth found none either
    DirectoryFull,

    /// Cluster allocation could not satisfy a request
    NoSpace,

    /// rmdir/rename target directory has children beyond `.`/`..`
    NotEmpty { path: String },

    /// Requested size exceeds the 32-bit size field
    TooLarge,

    /// Offset/length arithmetic would overflow
    InvalidArgument { message: String },

    /// Detected structural inconsistency in the volume; not recoverable,
    /// the engine does not attempt repair
    Corrupted { message: String },
}

impl FsError {
    /// POSIX errno the adapter layer surfaces for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io(_) => 5,                   // EIO
            Self::InvalidImage { .. } => 22,    // EINVAL
            Self::NotFound { .. } => 2,         // ENOENT
            Self::NotADirectory { .. } => 20,   // ENOTDIR
            Self::IsADirectory { .. } => 21,    // EISDIR
            Self::AlreadyExists { .. } => 17,   // EEXIST
            Self::InvalidName { .. } => 22,     // EINVAL
            Self::DirectoryFull => 23,          // ENFILE
            Self::NoSpace => 28,                // ENOSPC
            Self::NotEmpty { .. } => 39,        // ENOTEMPTY
            Self::TooLarge => 27,               // EFBIG
            Self::InvalidArgument { .. } => 22, // EINVAL
            Self::Corrupted { .. } => 5,        // EIO
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::InvalidImage { message } => write!(f, "Invalid image: {}", message),
            Self::NotFound { path } => write!(f, "Not found: {}", path),
            Self::NotADirectory { path } => write!(f, "Not a directory: {}", path),
            Self::IsADirectory { path } => write!(f, "Is a directory: {}", path),
            Self::AlreadyExists { path } => write!(f, "Already exists: {}", path),
            Self::InvalidName { name } => write!(f, "Invalid name '{}'", name),
            Self::DirectoryFull => write!(f, "Directory is full"),
            Self::NoSpace => write!(f, "No free clusters available"),
            Self::NotEmpty { path } => write!(f, "Directory not empty: {}", path),
            Self::TooLarge => write!(f, "File too large"),
            Self::InvalidArgument { message } => write!(f, "Invalid argument: {}", message),
            Self::Corrupted { message } => write!(f, "Volume corrupted: {}", message),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

// Convenience constructors
impl FsError {
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage {
            message: message.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory { path: path.into() }
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    pub fn not_empty(path: impl Into<String>) -> Self {
        Self::NotEmpty { path: path.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}
