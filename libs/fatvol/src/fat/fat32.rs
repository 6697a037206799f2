use crate::boot::{FatType, Geometry};
use crate::device::BlockDev;
use crate::error::Result;

use super::sector::SectorCache;
use super::{FatTable, decode, encode};

/// The top nibble of every entry is reserved and must survive writes.
const RESERVED_BITS: u32 = 0xF000_0000;

pub struct Fat32 {
    max_cluster: u32,
    cache: SectorCache,
}

impl Fat32 {
    pub fn new(geo: &Geometry) -> Self {
        Fat32 { max_cluster: geo.max_cluster, cache: SectorCache::new(geo) }
    }
}

impl FatTable for Fat32 {
    fn fat_type(&self) -> FatType {
        FatType::Fat32
    }

    fn max_cluster(&self) -> u32 {
        self.max_cluster
    }

    fn get(&mut self, dev: &mut dyn BlockDev, cluster: u32) -> Result<u32> {
        self.check_index(cluster)?;
        let raw = self.cache.read_u32(dev, cluster as u64 * 4)?;
        Ok(decode(raw, FatType::Fat32))
    }

    fn set(&mut self, dev: &mut dyn BlockDev, cluster: u32, value: u32) -> Result<()> {
        self.check_index(cluster)?;
        let raw = encode(value, FatType::Fat32)?;
        let offset = cluster as u64 * 4;
        let old = self.cache.read_u32(dev, offset)?;
        self.cache.write_u32(dev, offset, (old & RESERVED_BITS) | raw)
    }

    fn is_dirty(&self) -> bool {
        self.cache.is_dirty()
    }

    fn flush(&mut self, dev: &mut dyn BlockDev) -> Result<()> {
        self.cache.flush(dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat::CLUST_EOF;
    use crate::testutil::ImageSpec;

    #[test]
    fn set_preserves_top_nibble() {
        let spec = ImageSpec::fat32();
        let geo = spec.geometry();
        let mut disk = spec.build();
        let at = geo.fat_offset() as usize + 4 * 12;
        disk.get_mut()[at..at + 4].copy_from_slice(&0xA000_0000u32.to_le_bytes());

        let mut fat = Fat32::new(&geo);
        assert_eq!(fat.get(&mut disk, 12).unwrap(), 0);
        fat.set(&mut disk, 12, CLUST_EOF).unwrap();
        fat.flush(&mut disk).unwrap();

        let stored = u32::from_le_bytes(disk.get_ref()[at..at + 4].try_into().unwrap());
        assert_eq!(stored, 0xAFFF_FFFF);
        assert_eq!(fat.get(&mut disk, 12).unwrap(), CLUST_EOF);
    }

    #[test]
    fn cache_moves_between_sectors() {
        let spec = ImageSpec::fat32();
        let geo = spec.geometry();
        let mut disk = spec.build();
        let mut fat = Fat32::new(&geo);
        // 128 entries per 512-byte sector; these land in different sectors.
        fat.set(&mut disk, 5, 6).unwrap();
        fat.set(&mut disk, 300, 301).unwrap();
        fat.set(&mut disk, 1000, CLUST_EOF).unwrap();
        fat.flush(&mut disk).unwrap();

        let mut fresh = Fat32::new(&geo);
        assert_eq!(fresh.get(&mut disk, 5).unwrap(), 6);
        assert_eq!(fresh.get(&mut disk, 300).unwrap(), 301);
        assert_eq!(fresh.get(&mut disk, 1000).unwrap(), CLUST_EOF);
    }
}
