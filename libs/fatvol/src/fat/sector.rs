use crate::boot::Geometry;
use crate::device::BlockDev;
use crate::error::Result;

/// One-sector write-back window over the FAT region, shared by the 16- and
/// 32-bit tables. Entries of those widths never straddle a sector.
pub(crate) struct SectorCache {
    fat_offset: u64,
    fat_bytes: u64,
    copies: u32,
    sector_size: u64,
    /// Sector index relative to the start of the FAT.
    loaded: Option<u64>,
    buf: Vec<u8>,
    dirty: bool,
}

impl SectorCache {
    pub(crate) fn new(geo: &Geometry) -> Self {
        SectorCache {
            fat_offset: geo.fat_offset(),
            fat_bytes: geo.fat_bytes(),
            copies: geo.num_fats,
            sector_size: geo.bytes_per_sector as u64,
            loaded: None,
            buf: vec![0u8; geo.bytes_per_sector as usize],
            dirty: false,
        }
    }

    /// Make sure the sector containing FAT byte `offset` is resident and
    /// return the position of that byte inside `buf`.
    fn window(&mut self, dev: &mut dyn BlockDev, offset: u64) -> Result<usize> {
        let sector = offset / self.sector_size;
        if self.loaded != Some(sector) {
            self.flush(dev)?;
            dev.read_at(self.fat_offset + sector * self.sector_size, &mut self.buf)?;
            log::trace!("fat: cached sector {}", sector);
            self.loaded = Some(sector);
        }
        Ok((offset % self.sector_size) as usize)
    }

    pub(crate) fn read_u16(&mut self, dev: &mut dyn BlockDev, offset: u64) -> Result<u16> {
        let at = self.window(dev, offset)?;
        Ok(u16::from_le_bytes([self.buf[at], self.buf[at + 1]]))
    }

    pub(crate) fn write_u16(&mut self, dev: &mut dyn BlockDev, offset: u64, value: u16) -> Result<()> {
        let at = self.window(dev, offset)?;
        self.buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn read_u32(&mut self, dev: &mut dyn BlockDev, offset: u64) -> Result<u32> {
        let at = self.window(dev, offset)?;
        let b = &self.buf[at..at + 4];
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn write_u32(&mut self, dev: &mut dyn BlockDev, offset: u64, value: u32) -> Result<()> {
        let at = self.window(dev, offset)?;
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn flush(&mut self, dev: &mut dyn BlockDev) -> Result<()> {
        let Some(sector) = self.loaded else { return Ok(()) };
        if !self.dirty {
            return Ok(());
        }
        for copy in 0..self.copies as u64 {
            let at = self.fat_offset + copy * self.fat_bytes + sector * self.sector_size;
            dev.write_at(at, &self.buf)?;
        }
        log::trace!("fat: wrote back sector {} to {} copies", sector, self.copies);
        self.dirty = false;
        Ok(())
    }
}
