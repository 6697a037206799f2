//! FAT32 FSInfo sector: an advisory free-cluster counter.
//!
//! The counter is only a hint. It is adjusted on every allocation and written
//! back lazily on `flush`.

use crate::device::BlockDev;
use crate::error::Result;

pub const LEAD_SIG: u32 = 0x4161_5252;
pub const STRUCT_SIG: u32 = 0x6141_7272;
pub const TRAIL_SIG: u32 = 0xAA55_0000;
/// Free count / next free value meaning "not known".
pub const UNKNOWN: u32 = 0xFFFF_FFFF;

const LEAD_SIG_AT: usize = 0;
const STRUCT_SIG_AT: usize = 484;
const FREE_COUNT_AT: usize = 488;
const NEXT_FREE_AT: usize = 492;
const TRAIL_SIG_AT: usize = 508;

fn le32(sec: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([sec[at], sec[at + 1], sec[at + 2], sec[at + 3]])
}

#[derive(Debug, Clone)]
pub struct FsInfo {
    /// Absolute byte offset of the FSInfo sector.
    offset: u64,
    free_count: u32,
    next_free: u32,
    dirty: bool,
}

impl FsInfo {
    /// Read the FSInfo sector. `Ok(None)` when the volume has none or its
    /// signatures do not match.
    pub fn load(dev: &mut dyn BlockDev, sector: u32, bytes_per_sector: u32) -> Result<Option<Self>> {
        if sector == 0 || sector == 0xFFFF {
            return Ok(None);
        }
        let offset = sector as u64 * bytes_per_sector as u64;
        let mut sec = [0u8; 512];
        dev.read_at(offset, &mut sec)?;

        if le32(&sec, LEAD_SIG_AT) != LEAD_SIG
            || le32(&sec, STRUCT_SIG_AT) != STRUCT_SIG
            || le32(&sec, TRAIL_SIG_AT) != TRAIL_SIG
        {
            log::warn!("fsinfo: bad signature in sector {}, ignoring", sector);
            return Ok(None);
        }

        Ok(Some(FsInfo {
            offset,
            free_count: le32(&sec, FREE_COUNT_AT),
            next_free: le32(&sec, NEXT_FREE_AT),
            dirty: false,
        }))
    }

    /// Cached free clusters, or `None` if the count is unknown.
    pub fn free_count(&self) -> Option<u32> {
        (self.free_count != UNKNOWN).then_some(self.free_count)
    }

    pub fn next_free(&self) -> Option<u32> {
        (self.next_free != UNKNOWN).then_some(self.next_free)
    }

    /// Record that `count` clusters were allocated, the last being `last`.
    pub fn consume(&mut self, count: u32, last: u32) {
        if count == 0 {
            return;
        }
        if self.free_count != UNKNOWN {
            self.free_count = self.free_count.saturating_sub(count);
        }
        self.next_free = last.saturating_add(1);
        self.dirty = true;
    }

    /// Take `count` clusters out of the free pool without moving the
    /// next-free hint (used when clusters are marked bad).
    pub fn withdraw(&mut self, count: u32) {
        if count == 0 || self.free_count == UNKNOWN {
            return;
        }
        self.free_count = self.free_count.saturating_sub(count);
        self.dirty = true;
    }

    /// Record that `count` clusters were returned to the free pool.
    pub fn release(&mut self, count: u32) {
        if count == 0 || self.free_count == UNKNOWN {
            return;
        }
        self.free_count = self.free_count.saturating_add(count);
        self.dirty = true;
    }

    /// Overwrite the counter with a freshly scanned value.
    pub fn set_free_count(&mut self, count: u32) {
        if self.free_count != count {
            self.free_count = count;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn flush(&mut self, dev: &mut dyn BlockDev) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        dev.write_at(self.offset + FREE_COUNT_AT as u64, &self.free_count.to_le_bytes())?;
        dev.write_at(self.offset + NEXT_FREE_AT as u64, &self.next_free.to_le_bytes())?;
        log::debug!("fsinfo: free count now {}", self.free_count);
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ImageSpec;

    fn load_fat32() -> (std::io::Cursor<Vec<u8>>, FsInfo, u32) {
        let spec = ImageSpec::fat32();
        let clusters = spec.clusters;
        let mut disk = spec.build();
        let info = FsInfo::load(&mut disk, 1, 512).unwrap().unwrap();
        (disk, info, clusters)
    }

    #[test]
    fn load_reads_counter() {
        let (_, info, clusters) = load_fat32();
        // The root directory occupies one cluster.
        assert_eq!(info.free_count(), Some(clusters - 1));
        assert_eq!(info.next_free(), Some(3));
    }

    #[test]
    fn missing_sector_is_none() {
        let mut disk = ImageSpec::fat32().build();
        assert!(FsInfo::load(&mut disk, 0, 512).unwrap().is_none());
        assert!(FsInfo::load(&mut disk, 0xFFFF, 512).unwrap().is_none());
        // Sector 2 holds no signatures.
        assert!(FsInfo::load(&mut disk, 2, 512).unwrap().is_none());
    }

    #[test]
    fn consume_and_flush_persist() {
        let (mut disk, mut info, clusters) = load_fat32();
        info.consume(10, 12);
        assert!(info.is_dirty());
        info.flush(&mut disk).unwrap();
        assert!(!info.is_dirty());

        let reread = FsInfo::load(&mut disk, 1, 512).unwrap().unwrap();
        assert_eq!(reread.free_count(), Some(clusters - 11));
        assert_eq!(reread.next_free(), Some(13));
    }

    #[test]
    fn unknown_count_is_left_alone() {
        let (mut disk, mut info, _) = load_fat32();
        info.set_free_count(UNKNOWN);
        info.consume(3, 5);
        info.release(1);
        assert_eq!(info.free_count(), None);
        info.flush(&mut disk).unwrap();
        let reread = FsInfo::load(&mut disk, 1, 512).unwrap().unwrap();
        assert_eq!(reread.free_count(), None);
    }
}
