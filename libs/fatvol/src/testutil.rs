//! In-memory volume images for unit tests.

use std::io::Cursor;

use crate::boot::{BootSector, FatType, Geometry};
use crate::fsinfo::{LEAD_SIG, STRUCT_SIG, TRAIL_SIG};
use crate::volume::Volume;

pub type MemDisk = Cursor<Vec<u8>>;

/// Layout of a freshly formatted test image. The FAT type follows from
/// `clusters` alone.
#[derive(Debug, Clone, Copy)]
pub struct ImageSpec {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub fat_sectors: u32,
    pub root_entry_count: u16,
    pub clusters: u32,
}

impl ImageSpec {
    pub fn fat12() -> Self {
        ImageSpec {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            num_fats: 2,
            fat_sectors: 6,
            root_entry_count: 224,
            clusters: 2000,
        }
    }

    pub fn fat16() -> Self {
        ImageSpec {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            num_fats: 2,
            fat_sectors: 20,
            root_entry_count: 512,
            clusters: 5000,
        }
    }

    pub fn fat32() -> Self {
        ImageSpec {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            num_fats: 2,
            fat_sectors: 516,
            root_entry_count: 0,
            clusters: 66000,
        }
    }

    pub fn fat_type(&self) -> FatType {
        FatType::from_clusters(self.clusters)
    }

    fn root_sectors(&self) -> u32 {
        (self.root_entry_count as u32 * 32).div_ceil(self.bytes_per_sector as u32)
    }

    fn total_sectors(&self) -> u32 {
        self.reserved_sectors as u32
            + self.num_fats as u32 * self.fat_sectors
            + self.root_sectors()
            + self.clusters * self.sectors_per_cluster as u32
    }

    pub fn boot_sector(&self) -> [u8; 512] {
        let fat32 = self.fat_type() == FatType::Fat32;
        let total = self.total_sectors();
        let mut sec = [0u8; 512];
        sec[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        sec[3..11].copy_from_slice(b"FATVOL  ");
        sec[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        sec[13] = self.sectors_per_cluster;
        sec[14..16].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        sec[16] = self.num_fats;
        sec[17..19].copy_from_slice(&self.root_entry_count.to_le_bytes());
        if total < 0x1_0000 && !fat32 {
            sec[19..21].copy_from_slice(&(total as u16).to_le_bytes());
        } else {
            sec[32..36].copy_from_slice(&total.to_le_bytes());
        }
        sec[21] = 0xF8;
        if fat32 {
            sec[36..40].copy_from_slice(&self.fat_sectors.to_le_bytes());
            sec[44..48].copy_from_slice(&2u32.to_le_bytes());
            sec[48..50].copy_from_slice(&1u16.to_le_bytes());
        } else {
            sec[22..24].copy_from_slice(&(self.fat_sectors as u16).to_le_bytes());
        }
        sec[510] = 0x55;
        sec[511] = 0xAA;
        sec
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::from_boot(&BootSector::parse(&self.boot_sector()).unwrap()).unwrap()
    }

    /// A zeroed image with boot sector, FATs (media + EOF in entries 0/1)
    /// and, for FAT32, a one-cluster root directory and FSInfo sector.
    pub fn build(&self) -> MemDisk {
        let bps = self.bytes_per_sector as usize;
        let mut img = vec![0u8; self.total_sectors() as usize * bps];
        img[..512].copy_from_slice(&self.boot_sector());

        let head: &[u8] = match self.fat_type() {
            FatType::Fat12 => &[0xF8, 0xFF, 0xFF],
            FatType::Fat16 => &[0xF8, 0xFF, 0xFF, 0xFF],
            FatType::Fat32 => &[
                0xF8, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF, 0xFF, 0x0F,
            ],
        };
        let fat_bytes = self.fat_sectors as usize * bps;
        for copy in 0..self.num_fats as usize {
            let at = self.reserved_sectors as usize * bps + copy * fat_bytes;
            img[at..at + head.len()].copy_from_slice(head);
        }

        if self.fat_type() == FatType::Fat32 {
            let fsi = &mut img[bps..bps + 512];
            fsi[0..4].copy_from_slice(&LEAD_SIG.to_le_bytes());
            fsi[484..488].copy_from_slice(&STRUCT_SIG.to_le_bytes());
            fsi[488..492].copy_from_slice(&(self.clusters - 1).to_le_bytes());
            fsi[492..496].copy_from_slice(&3u32.to_le_bytes());
            fsi[508..512].copy_from_slice(&TRAIL_SIG.to_le_bytes());
        }
        Cursor::new(img)
    }

    pub fn open(&self) -> Volume<MemDisk> {
        Volume::open(self.build()).unwrap()
    }
}
