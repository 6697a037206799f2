//! On-disk directory entries (32 bytes each).
//!
//! A directory is a flat array of slots. A file is one short (8.3) entry,
//! optionally preceded by a run of long-name (VFAT) entries stored
//! highest-sequence-first.

use bitflags::bitflags;

use crate::error::{Error, Result};

pub const DIRENT_SIZE: usize = 32;

/// First name byte of a slot that has never been used. All later slots are
/// unused too.
pub const SLOT_END: u8 = 0x00;
/// First name byte of a deleted slot.
pub const SLOT_DELETED: u8 = 0xE5;
/// Stored in place of a real leading 0xE5 name byte.
pub const SLOT_KANJI: u8 = 0x05;

/// Order byte flag on the first-stored (last-in-name) long entry.
pub const LFN_LAST: u8 = 0x40;
pub const LFN_SEQ_MASK: u8 = 0x1F;
pub const LFN_CHARS: usize = 13;
pub const LFN_MAX_ENTRIES: usize = 20;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attr: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
        const LONG_NAME = Self::READ_ONLY.bits() | Self::HIDDEN.bits()
            | Self::SYSTEM.bits() | Self::VOLUME_ID.bits();

        // Bits 6-7 are reserved but may be set on disk.
        const _ = !0;
    }
}

bitflags! {
    /// The `ntres` byte: which halves of an 8.3 name were all-lowercase.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CaseFlags: u8 {
        const LOWER_BASE = 0x08;
        const LOWER_EXT  = 0x10;

        const _ = !0;
    }
}

/// A DOS date/time triple as stored in a short entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosStamp {
    pub date: u16,
    pub time: u16,
    /// 10 ms units, 0..=199 (creation time only).
    pub tenths: u8,
}

impl DosStamp {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub const EPOCH: DosStamp = DosStamp { date: (1 << 5) | 1, time: 0, tenths: 0 };

    /// Pack a calendar date, or `None` if it is outside 1980..=2107 or not a
    /// valid time of day. Odd seconds carry into `tenths`.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<Self> {
        if !(1980..=2107).contains(&year)
            || !(1..=12).contains(&month)
            || !(1..=31).contains(&day)
            || hour > 23
            || minute > 59
            || second > 59
        {
            return None;
        }
        Some(DosStamp {
            date: ((year - 1980) << 9) | ((month as u16) << 5) | day as u16,
            time: ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2),
            tenths: (second % 2) * 100,
        })
    }

    pub fn year(&self) -> u16 {
        1980 + (self.date >> 9)
    }

    pub fn month(&self) -> u8 {
        ((self.date >> 5) & 0x0F) as u8
    }

    pub fn day(&self) -> u8 {
        (self.date & 0x1F) as u8
    }
}

impl Default for DosStamp {
    fn default() -> Self {
        DosStamp::EPOCH
    }
}

/// What a raw slot holds, judged from its first byte and attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    End,
    Deleted,
    Long,
    Short,
}

impl SlotKind {
    pub fn of(raw: &[u8]) -> SlotKind {
        match raw[0] {
            SLOT_END => SlotKind::End,
            SLOT_DELETED => SlotKind::Deleted,
            _ if raw[11] & Attr::LONG_NAME.bits() == Attr::LONG_NAME.bits() => SlotKind::Long,
            _ => SlotKind::Short,
        }
    }

    pub fn is_free(self) -> bool {
        matches!(self, SlotKind::End | SlotKind::Deleted)
    }
}

// ─── Short entry ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortEntry {
    /// 8 base + 3 extension bytes, space padded.
    pub name: [u8; 11],
    pub attr: Attr,
    pub ntres: CaseFlags,
    pub created: DosStamp,
    pub access_date: u16,
    pub modified: DosStamp,
    /// First cluster, split across two 16-bit fields on disk.
    pub cluster: u32,
    pub length: u32,
}

impl ShortEntry {
    pub fn new(name: [u8; 11], attr: Attr, cluster: u32, length: u32) -> Result<Self> {
        if name[0] == SLOT_END || name[0] == b' ' {
            return Err(Error::InvalidName(String::from_utf8_lossy(&name).into_owned()));
        }
        Ok(ShortEntry {
            name,
            attr,
            ntres: CaseFlags::empty(),
            created: DosStamp::EPOCH,
            access_date: DosStamp::EPOCH.date,
            modified: DosStamp::EPOCH,
            cluster,
            length,
        })
    }

    /// Set creation, access and modification times to the same instant.
    pub fn stamped(mut self, stamp: DosStamp) -> Self {
        self.created = stamp;
        self.access_date = stamp.date;
        self.modified = DosStamp { tenths: 0, ..stamp };
        self
    }

    pub fn parse(raw: &[u8; DIRENT_SIZE]) -> Self {
        let le16 = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[0..11]);
        ShortEntry {
            name,
            attr: Attr::from_bits_retain(raw[11]),
            ntres: CaseFlags::from_bits_retain(raw[12]),
            created: DosStamp { date: le16(16), time: le16(14), tenths: raw[13] },
            access_date: le16(18),
            modified: DosStamp { date: le16(24), time: le16(22), tenths: 0 },
            cluster: ((le16(20) as u32) << 16) | le16(26) as u32,
            length: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; DIRENT_SIZE] {
        let mut raw = [0u8; DIRENT_SIZE];
        raw[0..11].copy_from_slice(&self.name);
        raw[11] = self.attr.bits();
        raw[12] = self.ntres.bits();
        raw[13] = self.created.tenths;
        raw[14..16].copy_from_slice(&self.created.time.to_le_bytes());
        raw[16..18].copy_from_slice(&self.created.date.to_le_bytes());
        raw[18..20].copy_from_slice(&self.access_date.to_le_bytes());
        raw[20..22].copy_from_slice(&((self.cluster >> 16) as u16).to_le_bytes());
        raw[22..24].copy_from_slice(&self.modified.time.to_le_bytes());
        raw[24..26].copy_from_slice(&self.modified.date.to_le_bytes());
        raw[26..28].copy_from_slice(&(self.cluster as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&self.length.to_le_bytes());
        raw
    }

    pub fn is_dir(&self) -> bool {
        self.attr.contains(Attr::DIRECTORY)
    }

    pub fn is_volume_id(&self) -> bool {
        self.attr.contains(Attr::VOLUME_ID) && !self.attr.contains(Attr::LONG_NAME)
    }

    /// The 8.3 name as it would be typed, e.g. `"HELLO   TXT"` → `"HELLO.TXT"`.
    /// The `ntres` case flags are applied.
    pub fn display_name(&self) -> String {
        let base_end = self.name[..8].iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
        let ext_end = self.name[8..].iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);

        let mut base: Vec<u8> = self.name[..base_end].to_vec();
        if base.first() == Some(&SLOT_KANJI) {
            base[0] = SLOT_DELETED;
        }
        if self.ntres.contains(CaseFlags::LOWER_BASE) {
            base.make_ascii_lowercase();
        }
        let mut ext: Vec<u8> = self.name[8..8 + ext_end].to_vec();
        if self.ntres.contains(CaseFlags::LOWER_EXT) {
            ext.make_ascii_lowercase();
        }

        let mut out: String = base.iter().map(|&b| b as char).collect();
        if !ext.is_empty() {
            out.push('.');
            out.extend(ext.iter().map(|&b| b as char));
        }
        out
    }
}

// ─── Long (VFAT) entry ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongEntry {
    pub order: u8,
    /// 13 UTF-16 code units (5 + 6 + 2 on disk).
    pub units: [u16; LFN_CHARS],
    pub checksum: u8,
}

const LFN_RUNS: [(usize, usize); 3] = [(1, 5), (14, 6), (28, 2)];

impl LongEntry {
    pub fn new(sequence: u8, last: bool, units: [u16; LFN_CHARS], checksum: u8) -> Result<Self> {
        if sequence == 0 || sequence as usize > LFN_MAX_ENTRIES {
            return Err(Error::InvalidName(format!("long-name sequence {sequence}")));
        }
        let order = if last { sequence | LFN_LAST } else { sequence };
        Ok(LongEntry { order, units, checksum })
    }

    pub fn sequence(&self) -> u8 {
        self.order & LFN_SEQ_MASK
    }

    pub fn is_last(&self) -> bool {
        self.order & LFN_LAST != 0
    }

    pub fn parse(raw: &[u8; DIRENT_SIZE]) -> Self {
        let mut units = [0u16; LFN_CHARS];
        let mut i = 0;
        for (start, count) in LFN_RUNS {
            for k in 0..count {
                let at = start + k * 2;
                units[i] = u16::from_le_bytes([raw[at], raw[at + 1]]);
                i += 1;
            }
        }
        LongEntry { order: raw[0], units, checksum: raw[13] }
    }

    pub fn to_bytes(&self) -> [u8; DIRENT_SIZE] {
        let mut raw = [0u8; DIRENT_SIZE];
        raw[0] = self.order;
        raw[11] = Attr::LONG_NAME.bits();
        raw[12] = 0;
        raw[13] = self.checksum;
        let mut i = 0;
        for (start, count) in LFN_RUNS {
            for k in 0..count {
                let at = start + k * 2;
                raw[at..at + 2].copy_from_slice(&self.units[i].to_le_bytes());
                i += 1;
            }
        }
        // 26..28 is the always-zero cluster field.
        raw
    }

    /// Name units with the NUL terminator and 0xFFFF filler stripped.
    pub fn name_units(&self) -> &[u16] {
        let end = self.units.iter().position(|&u| u == 0x0000 || u == 0xFFFF).unwrap_or(LFN_CHARS);
        &self.units[..end]
    }
}
