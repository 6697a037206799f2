use crate::boot::{FatType, Geometry};
use crate::device::BlockDev;
use crate::error::{Error, Result};

use super::{FatTable, decode, encode};

/// Split 3 packed bytes into two 12-bit entries.
///
/// The even entry is the low 12 bits of the little-endian 24-bit group, the
/// odd entry the high 12 bits.
pub fn unpack_pair(b: [u8; 3]) -> (u16, u16) {
    let even = b[0] as u16 | ((b[1] as u16 & 0x0F) << 8);
    let odd = (b[1] as u16 >> 4) | ((b[2] as u16) << 4);
    (even, odd)
}

/// Inverse of `unpack_pair`. Bits above 12 are dropped.
pub fn pack_pair(even: u16, odd: u16) -> [u8; 3] {
    [
        even as u8,
        ((even >> 8) as u8 & 0x0F) | ((odd as u8 & 0x0F) << 4),
        (odd >> 4) as u8,
    ]
}

/// FAT12 keeps the whole table decoded in memory: odd entries straddle byte
/// (and therefore sector) boundaries, so a one-sector cache does not fit.
pub struct Fat12 {
    fat_offset: u64,
    fat_bytes: u64,
    copies: u32,
    max_cluster: u32,
    /// On-disk image of one FAT copy. Bytes past the last full 3-byte group
    /// are carried through unchanged.
    raw: Vec<u8>,
    entries: Vec<u16>,
    dirty: bool,
}

impl Fat12 {
    pub fn load(dev: &mut dyn BlockDev, geo: &Geometry) -> Result<Self> {
        let mut raw = vec![0u8; geo.fat_bytes() as usize];
        dev.read_at(geo.fat_offset(), &mut raw)?;
        let mut entries = Vec::with_capacity(raw.len() / 3 * 2);
        for group in raw.chunks_exact(3) {
            let (even, odd) = unpack_pair([group[0], group[1], group[2]]);
            entries.push(even);
            entries.push(odd);
        }
        log::trace!("fat12: loaded {} entries", entries.len());
        Ok(Fat12 {
            fat_offset: geo.fat_offset(),
            fat_bytes: geo.fat_bytes(),
            copies: geo.num_fats,
            max_cluster: geo.max_cluster,
            raw,
            entries,
            dirty: false,
        })
    }

    fn slot(&mut self, cluster: u32) -> Result<&mut u16> {
        self.check_index(cluster)?;
        let max = self.max_cluster;
        self.entries
            .get_mut(cluster as usize)
            .ok_or(Error::ClusterIndex { cluster, max })
    }
}

impl FatTable for Fat12 {
    fn fat_type(&self) -> FatType {
        FatType::Fat12
    }

    fn max_cluster(&self) -> u32 {
        self.max_cluster
    }

    fn get(&mut self, _dev: &mut dyn BlockDev, cluster: u32) -> Result<u32> {
        let raw = *self.slot(cluster)?;
        Ok(decode(raw as u32, FatType::Fat12))
    }

    fn set(&mut self, _dev: &mut dyn BlockDev, cluster: u32, value: u32) -> Result<()> {
        let raw = encode(value, FatType::Fat12)?;
        *self.slot(cluster)? = raw as u16;
        self.dirty = true;
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn flush(&mut self, dev: &mut dyn BlockDev) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        for (i, pair) in self.entries.chunks_exact(2).enumerate() {
            self.raw[i * 3..i * 3 + 3].copy_from_slice(&pack_pair(pair[0], pair[1]));
        }
        for copy in 0..self.copies as u64 {
            dev.write_at(self.fat_offset + copy * self.fat_bytes, &self.raw)?;
        }
        log::trace!("fat12: wrote table to {} copies", self.copies);
        self.dirty = false;
        Ok(())
    }
}
