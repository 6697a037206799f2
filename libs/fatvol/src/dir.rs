//! Directories: 32-byte slot management over a chain or the fixed root.
//!
//! A directory never grows. When no run of free slots is long enough the
//! operation fails with `DirectoryFull`.

use crate::boot::Geometry;
use crate::chain::Chain;
use crate::device::BlockDev;
use crate::dirent::{
    Attr, DIRENT_SIZE, DosStamp, LongEntry, SLOT_DELETED, SLOT_END, ShortEntry, SlotKind,
};
use crate::error::{Error, Result};
use crate::fat::CLUST_EOF;
use crate::name::{EntryTemplate, fat_checksum, join_long_name, make_long_dirent};
use crate::volume::Volume;

/// Where a directory's slots live. Used to find the directory again from a
/// [`SlotRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLocation {
    /// The fixed FAT12/16 root region.
    FixedRoot,
    /// A chain-backed directory with this head cluster.
    Cluster(u32),
}

/// A directory slot, by directory and slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub dir: DirLocation,
    pub slot: usize,
}

/// The FAT12/16 root directory: a fixed sector range after the FATs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRootDir {
    offset: u64,
    length: u64,
}

impl FixedRootDir {
    pub fn new(geo: &Geometry) -> Self {
        FixedRootDir { offset: geo.root_dir_offset(), length: geo.root_dir_bytes() }
    }

    pub fn capacity(&self) -> u64 {
        self.length
    }

    fn check(&self, offset: u64, len: usize) -> Result<()> {
        if offset + len as u64 > self.length {
            return Err(Error::ChainBounds { offset, len, capacity: self.length });
        }
        Ok(())
    }

    pub fn pread<D: BlockDev>(&self, vol: &mut Volume<D>, offset: u64, count: usize) -> Result<Vec<u8>> {
        self.check(offset, count)?;
        let mut buf = vec![0u8; count];
        vol.read_at(self.offset + offset, &mut buf)?;
        Ok(buf)
    }

    pub fn pwrite<D: BlockDev>(&self, vol: &mut Volume<D>, offset: u64, data: &[u8]) -> Result<()> {
        self.check(offset, data.len())?;
        vol.write_at(self.offset + offset, data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    Chain(Chain),
    FixedRoot(FixedRootDir),
}

/// A directory handle. Cheap to copy; every operation borrows the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directory {
    storage: Storage,
}

/// One live entry, with its long name reassembled when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirItem {
    pub name: String,
    pub entry: ShortEntry,
    /// Slot of the short entry.
    pub slot: SlotRef,
}

impl DirItem {
    pub fn short_name(&self) -> String {
        self.entry.display_name()
    }
}

pub fn names_match(name: &str, query: &str) -> bool {
    name.eq_ignore_ascii_case(query)
}

/// Options for [`Directory::mkfile`].
#[derive(Debug, Clone, Copy)]
pub struct FileOptions<'a> {
    pub attr: Attr,
    /// Recorded length; `content.len()` when `None`.
    pub length: Option<u32>,
    /// Written at offset 0 once the entry exists.
    pub content: &'a [u8],
    /// Use these clusters (linked in order) instead of allocating.
    pub clusters: Option<&'a [u32]>,
    /// Point the entry at an existing chain. Nothing is allocated or linked.
    /// Cannot be combined with `clusters`.
    pub head: Option<u32>,
    /// Write every record with the deleted marker, leaving an inert
    /// placeholder.
    pub deleted: bool,
    pub tail: Option<&'a str>,
    pub stamp: DosStamp,
}

impl Default for FileOptions<'_> {
    fn default() -> Self {
        FileOptions {
            attr: Attr::ARCHIVE,
            length: None,
            content: &[],
            clusters: None,
            head: None,
            deleted: false,
            tail: None,
            stamp: DosStamp::EPOCH,
        }
    }
}

/// Options for [`Directory::mkdir`].
#[derive(Debug, Clone, Copy)]
pub struct DirOptions<'a> {
    pub attr: Attr,
    /// Use these clusters (linked in order) instead of allocating `count`.
    pub clusters: Option<&'a [u32]>,
    pub count: usize,
    /// Write the `.` and `..` entries.
    pub dots: bool,
    pub deleted: bool,
    pub tail: Option<&'a str>,
    pub stamp: DosStamp,
}

impl Default for DirOptions<'_> {
    fn default() -> Self {
        DirOptions {
            attr: Attr::DIRECTORY,
            clusters: None,
            count: 1,
            dots: true,
            deleted: false,
            tail: None,
            stamp: DosStamp::EPOCH,
        }
    }
}

fn record(chunk: &[u8]) -> [u8; DIRENT_SIZE] {
    let mut rec = [0u8; DIRENT_SIZE];
    rec.copy_from_slice(chunk);
    rec
}

impl Directory {
    /// Open the directory stored at `location`.
    pub fn at<D: BlockDev>(vol: &mut Volume<D>, location: DirLocation) -> Result<Self> {
        let storage = match location {
            DirLocation::FixedRoot => Storage::FixedRoot(FixedRootDir::new(vol.geometry())),
            DirLocation::Cluster(head) => {
                let clusters = vol.clusters_of(head)?.len() as u32;
                Storage::Chain(Chain::new(head, clusters * vol.bytes_per_cluster()))
            }
        };
        Ok(Directory { storage })
    }

    pub fn location(&self) -> DirLocation {
        match self.storage {
            Storage::Chain(chain) => DirLocation::Cluster(chain.head),
            Storage::FixedRoot(_) => DirLocation::FixedRoot,
        }
    }

    pub fn capacity(&self) -> u64 {
        match self.storage {
            Storage::Chain(chain) => chain.length as u64,
            Storage::FixedRoot(root) => root.capacity(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.capacity() as usize / DIRENT_SIZE
    }

    fn pread<D: BlockDev>(&self, vol: &mut Volume<D>, offset: u64, count: usize) -> Result<Vec<u8>> {
        match &self.storage {
            Storage::Chain(chain) => chain.pread(vol, offset, Some(count)),
            Storage::FixedRoot(root) => root.pread(vol, offset, count),
        }
    }

    fn pwrite<D: BlockDev>(&self, vol: &mut Volume<D>, offset: u64, data: &[u8]) -> Result<()> {
        match &self.storage {
            Storage::Chain(chain) => chain.pwrite(vol, offset, data),
            Storage::FixedRoot(root) => root.pwrite(vol, offset, data),
        }
    }

    // ─── Slots ─────────────────────────────────────────────────────────────────

    pub fn read_slots<D: BlockDev>(&self, vol: &mut Volume<D>, slot: usize, count: usize) -> Result<Vec<u8>> {
        self.pread(vol, (slot * DIRENT_SIZE) as u64, count * DIRENT_SIZE)
    }

    /// Write raw records starting at `slot`. `data` should be a whole number
    /// of 32-byte records.
    pub fn write_slots<D: BlockDev>(&self, vol: &mut Volume<D>, slot: usize, data: &[u8]) -> Result<()> {
        log::debug!(
            "fatvol: dir {:?} writing {} slots at {}",
            self.location(),
            data.len() / DIRENT_SIZE,
            slot
        );
        self.pwrite(vol, (slot * DIRENT_SIZE) as u64, data)
    }

    /// Index of the first slot of the earliest run of `count` free slots.
    pub fn find_slots<D: BlockDev>(&self, vol: &mut Volume<D>, count: usize) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        let raw = self.read_slots(vol, 0, self.slot_count())?;
        let mut run = 0;
        for (slot, chunk) in raw.chunks_exact(DIRENT_SIZE).enumerate() {
            if SlotKind::of(chunk).is_free() {
                run += 1;
                if run == count {
                    return Ok(slot + 1 - count);
                }
            } else {
                run = 0;
            }
        }
        Err(Error::DirectoryFull { wanted: count })
    }

    /// Turn every never-used slot below `slot` into a deleted one, so that
    /// records written at `slot` are not hidden behind an end marker.
    pub fn fill_slots<D: BlockDev>(&self, vol: &mut Volume<D>, slot: usize) -> Result<()> {
        if slot == 0 {
            return Ok(());
        }
        let mut raw = self.read_slots(vol, 0, slot)?;
        let mut changed = false;
        for chunk in raw.chunks_exact_mut(DIRENT_SIZE) {
            if chunk[0] == SLOT_END {
                chunk[0] = SLOT_DELETED;
                changed = true;
            }
        }
        if changed {
            self.write_slots(vol, 0, &raw)?;
        }
        Ok(())
    }

    /// Read the short entry at `slot`, let `f` modify it and write it back.
    pub fn update_entry<D: BlockDev>(
        &self,
        vol: &mut Volume<D>,
        slot: usize,
        f: impl FnOnce(&mut ShortEntry),
    ) -> Result<()> {
        let rec = record(&self.read_slots(vol, slot, 1)?);
        if SlotKind::of(&rec) != SlotKind::Short {
            return Err(Error::NotFound(format!("short entry in slot {slot}")));
        }
        let mut entry = ShortEntry::parse(&rec);
        f(&mut entry);
        self.write_slots(vol, slot, &entry.to_bytes())
    }

    fn store<D: BlockDev>(
        &self,
        vol: &mut Volume<D>,
        slot: usize,
        mut records: Vec<[u8; DIRENT_SIZE]>,
        deleted: bool,
    ) -> Result<SlotRef> {
        if deleted {
            for rec in records.iter_mut() {
                rec[0] = SLOT_DELETED;
            }
        }
        self.fill_slots(vol, slot)?;
        self.write_slots(vol, slot, &records.concat())?;
        Ok(SlotRef { dir: self.location(), slot: slot + records.len() - 1 })
    }

    // ─── Entries ───────────────────────────────────────────────────────────────

    /// Every live entry up to the end marker, skipping volume labels.
    ///
    /// Long names are used only when their run is complete and matches the
    /// short entry's checksum; otherwise the 8.3 name is reported.
    pub fn entries<D: BlockDev>(&self, vol: &mut Volume<D>) -> Result<Vec<DirItem>> {
        let raw = self.read_slots(vol, 0, self.slot_count())?;
        let mut items = Vec::new();
        let mut longs: Vec<LongEntry> = Vec::new();
        for (slot, chunk) in raw.chunks_exact(DIRENT_SIZE).enumerate() {
            let rec = record(chunk);
            match SlotKind::of(&rec) {
                SlotKind::End => break,
                SlotKind::Deleted => longs.clear(),
                SlotKind::Long => {
                    let long = LongEntry::parse(&rec);
                    if long.is_last() {
                        longs.clear();
                    }
                    longs.push(long);
                }
                SlotKind::Short => {
                    let entry = ShortEntry::parse(&rec);
                    let run = std::mem::take(&mut longs);
                    if entry.is_volume_id() {
                        continue;
                    }
                    let name = join_long_name(&run, fat_checksum(&entry.name))
                        .unwrap_or_else(|| entry.display_name());
                    items.push(DirItem { name, entry, slot: SlotRef { dir: self.location(), slot } });
                }
            }
        }
        Ok(items)
    }

    pub fn lookup<D: BlockDev>(&self, vol: &mut Volume<D>, name: &str) -> Result<Option<DirItem>> {
        Ok(self
            .entries(vol)?
            .into_iter()
            .find(|item| names_match(&item.name, name) || names_match(&item.short_name(), name)))
    }

    // ─── Creation ──────────────────────────────────────────────────────────────

    /// Create a file entry and return a chain over its data.
    ///
    /// Without an explicit `head` or `clusters`, a non-empty file gets
    /// `(length + bytes_per_cluster + 1) / bytes_per_cluster` fresh clusters.
    /// The name is validated and a slot run found before anything is written.
    pub fn mkfile<D: BlockDev>(&self, vol: &mut Volume<D>, name: &str, opts: &FileOptions) -> Result<Chain> {
        let length = opts.length.unwrap_or(opts.content.len() as u32);
        let bpc = vol.bytes_per_cluster() as u64;

        let clusters = match (opts.head, opts.clusters) {
            (Some(_), Some(_)) => return Err(Error::BadOptions("both head and clusters given")),
            (Some(_), None) => Vec::new(),
            (None, Some(list)) => list.to_vec(),
            (None, None) if length > 0 => {
                let count = (length as u64 + bpc + 1) / bpc;
                vol.find_free(count as usize, 2)?
            }
            (None, None) => Vec::new(),
        };
        let head = opts.head.unwrap_or_else(|| clusters.first().copied().unwrap_or(0));

        let tpl = EntryTemplate { attr: opts.attr, cluster: head, length, stamp: opts.stamp, tail: opts.tail };
        let records = make_long_dirent(name, &tpl)?;
        let slot = self.find_slots(vol, records.len())?;

        vol.claim(&clusters, CLUST_EOF)?;
        let slot = self.store(vol, slot, records, opts.deleted)?;
        let chain = Chain::with_slot(head, length, slot);
        if !opts.content.is_empty() {
            chain.pwrite(vol, 0, opts.content)?;
        }
        log::debug!("fatvol: created file {:?} at head {} ({} bytes)", name, head, length);
        Ok(chain)
    }

    /// Create a subdirectory. `None` when it was written as a deleted
    /// placeholder.
    pub fn mkdir<D: BlockDev>(
        &self,
        vol: &mut Volume<D>,
        name: &str,
        opts: &DirOptions,
    ) -> Result<Option<Directory>> {
        let clusters = match opts.clusters {
            Some(list) => list.to_vec(),
            None => vol.find_free(opts.count, 2)?,
        };
        let Some(&head) = clusters.first() else {
            return Err(Error::BadOptions("directory needs at least one cluster"));
        };

        let tpl = EntryTemplate {
            attr: opts.attr | Attr::DIRECTORY,
            cluster: head,
            length: 0,
            stamp: opts.stamp,
            tail: opts.tail,
        };
        let records = make_long_dirent(name, &tpl)?;
        let slot = self.find_slots(vol, records.len())?;

        for &cluster in &clusters {
            vol.zero_cluster(cluster)?;
        }
        vol.claim(&clusters, CLUST_EOF)?;
        self.store(vol, slot, records, opts.deleted)?;

        let length = clusters.len() as u32 * vol.bytes_per_cluster();
        let dir = Directory { storage: Storage::Chain(Chain::new(head, length)) };
        if opts.dots {
            let parent = match self.storage {
                Storage::Chain(chain) if chain.head != vol.root_cluster() => chain.head,
                _ => 0,
            };
            let dot = ShortEntry::new(*b".          ", Attr::DIRECTORY, head, 0)?.stamped(opts.stamp);
            let dotdot =
                ShortEntry::new(*b"..         ", Attr::DIRECTORY, parent, 0)?.stamped(opts.stamp);
            dir.write_slots(vol, 0, &[dot.to_bytes(), dotdot.to_bytes()].concat())?;
        }
        log::debug!("fatvol: created directory {:?} at head {}", name, head);
        Ok((!opts.deleted).then_some(dir))
    }
}
