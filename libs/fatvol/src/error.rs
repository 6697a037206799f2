use core::fmt;
use std::io;

/// Everything that can go wrong while reading or mutating a FAT volume.
///
/// None of these are retried internally. A multi-slot write that fails half
/// way (e.g. inside `mkfile`) is not rolled back.
#[derive(Debug)]
pub enum Error {
    /// The backing device failed.
    Io(io::Error),

    /// Boot sector does not start with a 0xE9 / 0xEB jump.
    BadJump(u8),
    /// Bytes per sector is not a power of two in 512..=4096.
    BadSectorSize(u16),
    /// Sectors per cluster is zero, not a power of two, or above 128.
    BadClusterSize(u8),
    /// The remaining BPB fields describe an impossible layout.
    BadGeometry(&'static str),

    /// Cluster number outside `[0, max]`.
    ClusterIndex { cluster: u32, max: u32 },
    /// Value cannot be stored in a FAT entry of this width.
    ClusterValue { value: u32, bits: u8 },
    /// `find`/`allocate` could not collect enough free clusters.
    NoSpace { wanted: usize, found: usize },

    /// Read or write past the last cluster of a chain.
    ChainBounds { offset: u64, len: usize, capacity: u64 },
    /// A link inside a chain is free, bad, reserved or out of range.
    BrokenChain { cluster: u32, value: u32 },
    /// `truncate` was asked to make a chain shorter.
    ShrinkUnsupported { length: u32, requested: u32 },

    /// No run of free slots is long enough and the directory cannot grow.
    DirectoryFull { wanted: usize },
    InvalidName(String),
    /// Creation options that contradict each other or cannot be honoured.
    BadOptions(&'static str),
    NotFound(String),
    NotADirectory(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "device I/O failed: {e}"),
            Error::BadJump(b) => write!(f, "invalid boot sector jump byte {b:#04x}"),
            Error::BadSectorSize(n) => write!(f, "invalid bytes per sector: {n}"),
            Error::BadClusterSize(n) => write!(f, "invalid sectors per cluster: {n}"),
            Error::BadGeometry(what) => write!(f, "invalid volume geometry: {what}"),
            Error::ClusterIndex { cluster, max } => {
                write!(f, "cluster {cluster} outside FAT range [0, {max}]")
            }
            Error::ClusterValue { value, bits } => {
                write!(f, "value {value:#x} does not fit a {bits}-bit FAT entry")
            }
            Error::NoSpace { wanted, found } => {
                write!(f, "wanted {wanted} free clusters, only {found} available")
            }
            Error::ChainBounds { offset, len, capacity } => write!(
                f,
                "access of {len} bytes at offset {offset} runs past chain end ({capacity} bytes)"
            ),
            Error::BrokenChain { cluster, value } => {
                write!(f, "cluster {cluster} links to invalid value {value:#x}")
            }
            Error::ShrinkUnsupported { length, requested } => write!(
                f,
                "shrinking a chain from {length} to {requested} bytes is not supported"
            ),
            Error::DirectoryFull { wanted } => {
                write!(f, "no run of {wanted} free directory slots and directory cannot grow")
            }
            Error::InvalidName(name) => write!(f, "invalid file name {name:?}"),
            Error::BadOptions(why) => write!(f, "invalid creation options: {why}"),
            Error::NotFound(path) => write!(f, "{path}: not found"),
            Error::NotADirectory(path) => write!(f, "{path}: not a directory"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
