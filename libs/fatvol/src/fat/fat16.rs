use crate::boot::{FatType, Geometry};
use crate::device::BlockDev;
use crate::error::Result;

use super::sector::SectorCache;
use super::{FatTable, decode, encode};

pub struct Fat16 {
    max_cluster: u32,
    cache: SectorCache,
}

impl Fat16 {
    pub fn new(geo: &Geometry) -> Self {
        Fat16 { max_cluster: geo.max_cluster, cache: SectorCache::new(geo) }
    }
}

impl FatTable for Fat16 {
    fn fat_type(&self) -> FatType {
        FatType::Fat16
    }

    fn max_cluster(&self) -> u32 {
        self.max_cluster
    }

    fn get(&mut self, dev: &mut dyn BlockDev, cluster: u32) -> Result<u32> {
        self.check_index(cluster)?;
        let raw = self.cache.read_u16(dev, cluster as u64 * 2)?;
        Ok(decode(raw as u32, FatType::Fat16))
    }

    fn set(&mut self, dev: &mut dyn BlockDev, cluster: u32, value: u32) -> Result<()> {
        self.check_index(cluster)?;
        let raw = encode(value, FatType::Fat16)?;
        self.cache.write_u16(dev, cluster as u64 * 2, raw as u16)
    }

    fn is_dirty(&self) -> bool {
        self.cache.is_dirty()
    }

    fn flush(&mut self, dev: &mut dyn BlockDev) -> Result<()> {
        self.cache.flush(dev)
    }
}
