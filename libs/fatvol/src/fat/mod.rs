//! File Allocation Table access.
//!
//! Every variant exposes the same logical value space: `CLUST_FREE` for an
//! unused cluster, the next cluster number for a link, and the 32-bit
//! sentinels `CLUST_RSRVD..=CLUST_EOF` for reserved/bad/end-of-chain entries
//! regardless of how wide the on-disk entry is. Writes are cached; nothing
//! reaches the device until `flush`.

mod fat12;
mod fat16;
mod fat32;
mod sector;

pub use fat12::{Fat12, pack_pair, unpack_pair};
pub use fat16::Fat16;
pub use fat32::Fat32;

use crate::boot::{FatType, Geometry};
use crate::device::BlockDev;
use crate::error::{Error, Result};

pub const CLUST_FREE: u32 = 0;
/// First data cluster. Entries 0 and 1 hold the media byte and status flags.
pub const CLUST_FIRST: u32 = 2;
pub const CLUST_RSRVD: u32 = 0xFFFF_FFF0;
pub const CLUST_BAD: u32 = 0xFFFF_FFF7;
/// Lowest end-of-chain marker.
pub const CLUST_EOFS: u32 = 0xFFFF_FFF8;
pub const CLUST_EOF: u32 = 0xFFFF_FFFF;

/// True for any value that ends a chain.
pub fn is_eoc(value: u32) -> bool {
    value >= CLUST_EOFS
}

/// True for reserved and bad markers (but not end-of-chain).
pub fn is_reserved(value: u32) -> bool {
    (CLUST_RSRVD..CLUST_EOFS).contains(&value)
}

/// Widen a raw on-disk entry into the logical value space.
pub(crate) fn decode(raw: u32, ty: FatType) -> u32 {
    let mask = ty.mask();
    let raw = raw & mask;
    if raw >= mask - 0xF { raw | !mask } else { raw }
}

/// Narrow a logical value to the on-disk entry width.
pub(crate) fn encode(value: u32, ty: FatType) -> Result<u32> {
    let mask = ty.mask();
    if value >= CLUST_RSRVD {
        Ok(value & mask)
    } else if value <= mask {
        Ok(value)
    } else {
        Err(Error::ClusterValue { value, bits: ty.entry_bits() as u8 })
    }
}

pub trait FatTable {
    fn fat_type(&self) -> FatType;

    fn max_cluster(&self) -> u32;

    /// Logical value of `cluster`'s entry.
    fn get(&mut self, dev: &mut dyn BlockDev, cluster: u32) -> Result<u32>;

    /// Store `value` in `cluster`'s entry. Only marks the cache dirty.
    fn set(&mut self, dev: &mut dyn BlockDev, cluster: u32, value: u32) -> Result<()>;

    fn is_dirty(&self) -> bool;

    /// Write the cached region back to every FAT copy if it is dirty.
    fn flush(&mut self, dev: &mut dyn BlockDev) -> Result<()>;

    fn check_index(&self, cluster: u32) -> Result<()> {
        if cluster > self.max_cluster() {
            return Err(Error::ClusterIndex { cluster, max: self.max_cluster() });
        }
        Ok(())
    }

    /// Linear scan for `count` free clusters at or above `start`.
    ///
    /// The scan does not wrap around to the start of the table.
    fn find(&mut self, dev: &mut dyn BlockDev, count: usize, start: u32) -> Result<Vec<u32>> {
        let mut found = Vec::with_capacity(count);
        if count == 0 {
            return Ok(found);
        }
        for cluster in start.max(CLUST_FIRST)..=self.max_cluster() {
            if self.get(dev, cluster)? == CLUST_FREE {
                found.push(cluster);
                if found.len() == count {
                    return Ok(found);
                }
            }
        }
        Err(Error::NoSpace { wanted: count, found: found.len() })
    }

    /// Link `clusters` in order, terminate the last one with `terminal`, and
    /// return the head (`CLUST_FREE` for an empty list).
    fn chain(&mut self, dev: &mut dyn BlockDev, clusters: &[u32], terminal: u32) -> Result<u32> {
        if let Some(&bad) = clusters.iter().find(|&&c| c < CLUST_FIRST) {
            return Err(Error::ClusterIndex { cluster: bad, max: self.max_cluster() });
        }
        for pair in clusters.windows(2) {
            self.set(dev, pair[0], pair[1])?;
        }
        if let Some(&last) = clusters.last() {
            self.set(dev, last, terminal)?;
        }
        Ok(clusters.first().copied().unwrap_or(CLUST_FREE))
    }

    fn allocate(
        &mut self,
        dev: &mut dyn BlockDev,
        count: usize,
        start: u32,
        terminal: u32,
    ) -> Result<u32> {
        let clusters = self.find(dev, count, start)?;
        self.chain(dev, &clusters, terminal)
    }
}

/// Build the FAT variant matching `geo.fat_type`.
pub fn load(dev: &mut dyn BlockDev, geo: &Geometry) -> Result<Box<dyn FatTable>> {
    Ok(match geo.fat_type {
        FatType::Fat12 => Box::new(Fat12::load(dev, geo)?),
        FatType::Fat16 => Box::new(Fat16::new(geo)),
        FatType::Fat32 => Box::new(Fat32::new(geo)),
    })
}
