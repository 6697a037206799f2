//! Read and mutate FAT12/16/32 volume images.
//!
//! Open an image with [`Volume::open`], do the work inside
//! [`Volume::session`] (or finish with [`Volume::close`]) so the FAT cache is
//! written back, and reach files through [`Volume::root`] and
//! [`Volume::lookup`].

pub mod boot;
pub mod chain;
mod cluster;
pub mod device;
pub mod diag;
pub mod dir;
pub mod dirent;
pub mod error;
pub mod fat;
pub mod fsinfo;
pub mod name;
pub mod volume;

#[cfg(test)]
pub(crate) mod testutil;

pub use boot::{BootSector, FatType, Geometry};
pub use chain::Chain;
pub use device::BlockDev;
pub use diag::{FragReport, Usage, chain_extents, free_bad, mark_bad_every, sync_free_count};
pub use dir::{DirItem, DirLocation, DirOptions, Directory, FileOptions, FixedRootDir, SlotRef};
pub use dirent::{Attr, CaseFlags, DosStamp, LongEntry, ShortEntry};
pub use error::{Error, Result};
pub use fat::{CLUST_BAD, CLUST_EOF, CLUST_EOFS, CLUST_FREE, CLUST_RSRVD, FatTable};
pub use fsinfo::FsInfo;
pub use name::{fat_checksum, make_long_dirent};
pub use volume::Volume;
