//! Boot sector (BPB) parsing and the volume geometry derived from it.
//!
//! # Boot Sector Layout (little-endian)
//! - 0:      jump instruction (0xEB xx 90 or 0xE9 xx xx)
//! - 11..13: bytes per sector
//! - 13:     sectors per cluster
//! - 14..16: reserved sectors
//! - 16:     number of FATs
//! - 17..19: root directory entries (0 for FAT32)
//! - 19..21: total sectors, 16-bit (0 means use 32..36)
//! - 22..24: sectors per FAT, 16-bit (0 means use 36..40)
//! - 44..48: root cluster (FAT32)
//! - 48..50: FSInfo sector (FAT32)

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{Error, Result};

/// Clusters below this count make a FAT12 volume.
pub const FAT12_MAX_CLUSTERS: u32 = 4085;
/// Clusters below this count (and at least `FAT12_MAX_CLUSTERS`) make FAT16.
pub const FAT16_MAX_CLUSTERS: u32 = 65525;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
pub enum FatType {
    Fat12 = 12,
    Fat16 = 16,
    Fat32 = 32,
}

impl FatType {
    /// Selects the variant purely from the data cluster count.
    pub fn from_clusters(clusters: u32) -> Self {
        if clusters < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if clusters < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// Significant bits per entry (28 for FAT32).
    pub fn entry_bits(self) -> u32 {
        match self {
            FatType::Fat12 => 12,
            FatType::Fat16 => 16,
            FatType::Fat32 => 28,
        }
    }

    pub fn mask(self) -> u32 {
        (1u32 << self.entry_bits()) - 1
    }
}

/// The raw BPB fields this crate cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSector {
    pub jump: u8,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors: u32,
    pub fat_sectors: u32,
    // FAT32 extension; meaningless on FAT12/16.
    pub root_cluster: u32,
    pub fsinfo_sector: u16,
}

fn le16(sec: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([sec[at], sec[at + 1]])
}

fn le32(sec: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([sec[at], sec[at + 1], sec[at + 2], sec[at + 3]])
}

impl BootSector {
    pub const SIZE: usize = 512;

    /// Parse and validate sector 0. `sec` must hold at least 512 bytes.
    pub fn parse(sec: &[u8]) -> Result<Self> {
        if sec.len() < Self::SIZE {
            return Err(Error::BadGeometry("boot sector shorter than 512 bytes"));
        }

        let jump = sec[0];
        if jump != 0xE9 && jump != 0xEB {
            return Err(Error::BadJump(jump));
        }

        let bytes_per_sector = le16(sec, 11);
        if !bytes_per_sector.is_power_of_two() || !(512..=4096).contains(&bytes_per_sector) {
            return Err(Error::BadSectorSize(bytes_per_sector));
        }

        let sectors_per_cluster = sec[13];
        if !sectors_per_cluster.is_power_of_two() || sectors_per_cluster > 128 {
            return Err(Error::BadClusterSize(sectors_per_cluster));
        }

        let total_16 = le16(sec, 19) as u32;
        let total_sectors = if total_16 != 0 { total_16 } else { le32(sec, 32) };
        let fat_16 = le16(sec, 22) as u32;
        let fat_sectors = if fat_16 != 0 { fat_16 } else { le32(sec, 36) };

        let bs = BootSector {
            jump,
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors: le16(sec, 14),
            num_fats: sec[16],
            root_entry_count: le16(sec, 17),
            total_sectors,
            fat_sectors,
            root_cluster: le32(sec, 44),
            fsinfo_sector: le16(sec, 48),
        };

        if bs.num_fats == 0 {
            return Err(Error::BadGeometry("no FAT copies"));
        }
        if bs.fat_sectors == 0 {
            return Err(Error::BadGeometry("zero sectors per FAT"));
        }
        if bs.reserved_sectors == 0 {
            return Err(Error::BadGeometry("zero reserved sectors"));
        }
        Ok(bs)
    }
}

/// Layout constants computed once per opened volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub bytes_per_cluster: u32,
    pub reserved_sectors: u32,
    pub num_fats: u32,
    pub root_entry_count: u32,
    pub total_sectors: u32,
    pub fat_sectors: u32,
    pub root_sectors: u32,
    /// First sector of the data region (cluster 2).
    pub cluster_start: u32,
    /// Number of data clusters.
    pub clusters: u32,
    /// Highest valid cluster number.
    pub max_cluster: u32,
    pub fat_type: FatType,
    /// 0 on FAT12/16.
    pub root_cluster: u32,
    pub fsinfo_sector: u32,
}

impl Geometry {
    pub fn from_boot(bs: &BootSector) -> Result<Self> {
        let bps = bs.bytes_per_sector as u32;
        let spc = bs.sectors_per_cluster as u32;
        let root_sectors = (bs.root_entry_count as u32 * 32).div_ceil(bps);
        let cluster_start = bs.reserved_sectors as u64
            + bs.num_fats as u64 * bs.fat_sectors as u64
            + root_sectors as u64;
        if cluster_start >= bs.total_sectors as u64 {
            return Err(Error::BadGeometry("data region starts past end of volume"));
        }
        // Below total_sectors, so it fits.
        let cluster_start = cluster_start as u32;
        let clusters = (bs.total_sectors - cluster_start) / spc;
        if clusters == 0 {
            return Err(Error::BadGeometry("no data clusters"));
        }
        let fat_type = FatType::from_clusters(clusters);

        let mut max_cluster = clusters + 1;
        let fat_bytes = bs.fat_sectors as u64 * bps as u64;
        let addressable = match fat_type {
            // Only whole 3-byte groups are decoded.
            FatType::Fat12 => fat_bytes / 3 * 2,
            FatType::Fat16 => fat_bytes / 2,
            FatType::Fat32 => fat_bytes / 4,
        };
        if (max_cluster as u64) >= addressable {
            let clamped = (addressable - 1) as u32;
            log::warn!(
                "FAT region indexes clusters up to {} but volume has {}; clamping",
                clamped,
                max_cluster
            );
            max_cluster = clamped;
        }

        let (root_cluster, fsinfo_sector) = match fat_type {
            FatType::Fat32 => (bs.root_cluster, bs.fsinfo_sector as u32),
            _ => (0, 0),
        };
        if fat_type == FatType::Fat32 && !(2..=max_cluster).contains(&root_cluster) {
            return Err(Error::BadGeometry("FAT32 root cluster out of range"));
        }

        Ok(Geometry {
            bytes_per_sector: bps,
            sectors_per_cluster: spc,
            bytes_per_cluster: bps * spc,
            reserved_sectors: bs.reserved_sectors as u32,
            num_fats: bs.num_fats as u32,
            root_entry_count: bs.root_entry_count as u32,
            total_sectors: bs.total_sectors,
            fat_sectors: bs.fat_sectors,
            root_sectors,
            cluster_start,
            clusters,
            max_cluster,
            fat_type,
            root_cluster,
            fsinfo_sector,
        })
    }

    /// Byte offset of the first FAT copy.
    pub fn fat_offset(&self) -> u64 {
        self.reserved_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Size in bytes of one FAT copy.
    pub fn fat_bytes(&self) -> u64 {
        self.fat_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Byte offset of the fixed FAT12/16 root directory.
    pub fn root_dir_offset(&self) -> u64 {
        (self.reserved_sectors as u64 + self.num_fats as u64 * self.fat_sectors as u64)
            * self.bytes_per_sector as u64
    }

    pub fn root_dir_bytes(&self) -> u64 {
        self.root_sectors as u64 * self.bytes_per_sector as u64
    }
}
