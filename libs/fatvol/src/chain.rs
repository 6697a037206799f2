//! Byte-addressed access to a cluster chain.

use crate::device::BlockDev;
use crate::dir::{Directory, SlotRef};
use crate::error::{Error, Result};
use crate::fat::{CLUST_EOF, CLUST_FREE, is_eoc};
use crate::volume::Volume;

/// A file's or directory's storage: `head` plus every cluster reachable from
/// it through the FAT.
///
/// `slot` names the directory entry describing this chain. It is only used to
/// rewrite that entry's cluster and length fields after `truncate` grows the
/// chain; the directory is looked up again each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain {
    pub head: u32,
    pub length: u32,
    pub slot: Option<SlotRef>,
}

impl Chain {
    pub fn new(head: u32, length: u32) -> Self {
        Chain { head, length, slot: None }
    }

    pub fn with_slot(head: u32, length: u32, slot: SlotRef) -> Self {
        Chain { head, length, slot: Some(slot) }
    }

    pub fn clusters<D: BlockDev>(&self, vol: &mut Volume<D>) -> Result<Vec<u32>> {
        vol.clusters_of(self.head)
    }

    /// The cluster holding byte `offset`, or `None` if the chain ends first.
    pub fn cmap<D: BlockDev>(&self, vol: &mut Volume<D>, offset: u64) -> Result<Option<u32>> {
        if self.head == CLUST_FREE {
            return Ok(None);
        }
        let mut steps = offset / vol.bytes_per_cluster() as u64;
        let mut cur = self.head;
        while steps > 0 {
            let next = vol.fat_get(cur)?;
            if is_eoc(next) {
                return Ok(None);
            }
            cur = next;
            steps -= 1;
        }
        Ok(Some(cur))
    }

    /// Clusters covering `[offset, offset + len)`, with the byte position of
    /// `offset` inside the first of them.
    fn span<D: BlockDev>(
        &self,
        vol: &mut Volume<D>,
        offset: u64,
        len: usize,
    ) -> Result<(Vec<u32>, usize)> {
        let clusters = self.clusters(vol)?;
        let bpc = vol.bytes_per_cluster() as u64;
        let capacity = clusters.len() as u64 * bpc;
        if offset + len as u64 > capacity {
            return Err(Error::ChainBounds { offset, len, capacity });
        }
        if len == 0 {
            return Ok((Vec::new(), 0));
        }
        let first = (offset / bpc) as usize;
        let last = ((offset + len as u64 - 1) / bpc) as usize;
        Ok((clusters[first..=last].to_vec(), (offset % bpc) as usize))
    }

    /// Read `count` bytes at `offset`, or everything up to `length` when
    /// `count` is `None`.
    pub fn pread<D: BlockDev>(
        &self,
        vol: &mut Volume<D>,
        offset: u64,
        count: Option<usize>,
    ) -> Result<Vec<u8>> {
        let count = count.unwrap_or_else(|| (self.length as u64).saturating_sub(offset) as usize);
        let (clusters, mut within) = self.span(vol, offset, count)?;
        let bpc = vol.bytes_per_cluster() as usize;

        let mut out = vec![0u8; count];
        let mut pos = 0;
        let mut bounce = Vec::new();
        for cluster in clusters {
            let take = (bpc - within).min(count - pos);
            if take == bpc {
                vol.read_cluster(cluster, &mut out[pos..pos + bpc])?;
            } else {
                bounce.resize(bpc, 0);
                vol.read_cluster(cluster, &mut bounce)?;
                out[pos..pos + take].copy_from_slice(&bounce[within..within + take]);
            }
            pos += take;
            within = 0;
        }
        Ok(out)
    }

    /// Write `data` at `offset`. The chain never grows here; writing past its
    /// last cluster is an error.
    pub fn pwrite<D: BlockDev>(&self, vol: &mut Volume<D>, offset: u64, data: &[u8]) -> Result<()> {
        let (clusters, mut within) = self.span(vol, offset, data.len())?;
        let bpc = vol.bytes_per_cluster() as usize;

        let mut pos = 0;
        let mut bounce = Vec::new();
        for cluster in clusters {
            let take = (bpc - within).min(data.len() - pos);
            if take == bpc {
                vol.write_cluster(cluster, &data[pos..pos + bpc])?;
            } else {
                bounce.resize(bpc, 0);
                vol.read_cluster(cluster, &mut bounce)?;
                bounce[within..within + take].copy_from_slice(&data[pos..pos + take]);
                vol.write_cluster(cluster, &bounce)?;
            }
            pos += take;
            within = 0;
        }
        Ok(())
    }

    /// Grow the chain to `length` bytes.
    ///
    /// New clusters are linked after the current tail (or become the head of
    /// an empty chain) and are not zeroed. If the chain has a slot, that
    /// directory entry is rewritten with the new head and length.
    pub fn truncate<D: BlockDev>(&mut self, vol: &mut Volume<D>, length: u32) -> Result<()> {
        if length < self.length {
            return Err(Error::ShrinkUnsupported { length: self.length, requested: length });
        }
        let bpc = vol.bytes_per_cluster() as u64;
        let existing = self.clusters(vol)?;
        let wanted = (length as u64).div_ceil(bpc) as usize;
        let extra = wanted.saturating_sub(existing.len());

        if extra > 0 {
            let fresh = vol.find_free(extra, 2)?;
            let head = vol.claim(&fresh, CLUST_EOF)?;
            match existing.last() {
                Some(&tail) => vol.fat_set(tail, head)?,
                None => self.head = head,
            }
            log::debug!("fatvol: chain {} grew by {} clusters", self.head, extra);
        }
        self.length = length;

        if let Some(slot) = self.slot {
            let dir = Directory::at(vol, slot.dir)?;
            let (head, length) = (self.head, self.length);
            dir.update_entry(vol, slot.slot, |entry| {
                entry.cluster = head;
                entry.length = length;
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::FileOptions;
    use crate::testutil::{ImageSpec, MemDisk};

    fn file_chain(vol: &mut Volume<MemDisk>, clusters: usize) -> Chain {
        let bpc = vol.bytes_per_cluster();
        let head = vol.allocate(clusters, 2, CLUST_EOF).unwrap();
        Chain::new(head, clusters as u32 * bpc)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    // ── cmap ─────────────────────────────────────────────────────────────────

    #[test]
    fn cmap_walks_links() {
        let mut vol = ImageSpec::fat16().open();
        vol.claim(&[40, 12, 90], CLUST_EOF).unwrap();
        let chain = Chain::new(40, 3 * 512);
        assert_eq!(chain.cmap(&mut vol, 0).unwrap(), Some(40));
        assert_eq!(chain.cmap(&mut vol, 511).unwrap(), Some(40));
        assert_eq!(chain.cmap(&mut vol, 512).unwrap(), Some(12));
        assert_eq!(chain.cmap(&mut vol, 1535).unwrap(), Some(90));
        assert_eq!(chain.cmap(&mut vol, 1536).unwrap(), None);
        assert_eq!(Chain::new(0, 0).cmap(&mut vol, 0).unwrap(), None);
    }

    // ── pread / pwrite ───────────────────────────────────────────────────────

    #[test]
    fn unaligned_write_spans_clusters() {
        let mut vol = ImageSpec { sectors_per_cluster: 2, ..ImageSpec::fat16() }.open();
        let chain = file_chain(&mut vol, 4);
        let data = pattern(3000);
        chain.pwrite(&mut vol, 700, &data).unwrap();

        assert_eq!(chain.pread(&mut vol, 700, Some(3000)).unwrap(), data);
        // Bytes around the write are untouched.
        assert!(chain.pread(&mut vol, 0, Some(700)).unwrap().iter().all(|&b| b == 0));
        assert!(chain.pread(&mut vol, 3700, Some(396)).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn partial_write_preserves_neighbours() {
        let mut vol = ImageSpec::fat12().open();
        let chain = file_chain(&mut vol, 2);
        chain.pwrite(&mut vol, 0, &[0x11; 1024]).unwrap();
        chain.pwrite(&mut vol, 510, b"abcd").unwrap();
        let back = chain.pread(&mut vol, 508, Some(8)).unwrap();
        assert_eq!(back, [0x11, 0x11, b'a', b'b', b'c', b'd', 0x11, 0x11]);
    }

    #[test]
    fn write_past_tail_fails() {
        let mut vol = ImageSpec::fat16().open();
        let chain = file_chain(&mut vol, 2);
        match chain.pwrite(&mut vol, 1000, &[0u8; 100]) {
            Err(Error::ChainBounds { offset: 1000, len: 100, capacity: 1024 }) => {}
            other => panic!("expected ChainBounds, got {other:?}"),
        }
        assert!(chain.pread(&mut vol, 1024, Some(1)).is_err());
        assert!(chain.pread(&mut vol, 1024, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn unbounded_read_stops_at_length() {
        let mut vol = ImageSpec::fat16().open();
        let mut chain = file_chain(&mut vol, 1);
        chain.pwrite(&mut vol, 0, b"hello world").unwrap();
        chain.length = 5;
        assert_eq!(chain.pread(&mut vol, 0, None).unwrap(), b"hello");
        assert_eq!(chain.pread(&mut vol, 2, None).unwrap(), b"llo");
        assert!(chain.pread(&mut vol, 9, None).unwrap().is_empty());
    }

    // ── truncate ─────────────────────────────────────────────────────────────

    #[test]
    fn truncate_grows_empty_chain() {
        let mut vol = ImageSpec::fat16().open();
        let mut chain = Chain::new(0, 0);
        chain.truncate(&mut vol, 1500).unwrap();
        assert_ne!(chain.head, 0);
        assert_eq!(chain.clusters(&mut vol).unwrap().len(), 3);
        assert_eq!(chain.length, 1500);
    }

    #[test]
    fn truncate_links_after_tail() {
        let mut vol = ImageSpec::fat32().open();
        let mut chain = file_chain(&mut vol, 2);
        let before = chain.clusters(&mut vol).unwrap();
        chain.truncate(&mut vol, 1025).unwrap();
        let after = chain.clusters(&mut vol).unwrap();
        assert_eq!(after.len(), 3);
        assert_eq!(&after[..2], &before[..]);

        // Growth within the last cluster allocates nothing.
        chain.truncate(&mut vol, 1536).unwrap();
        assert_eq!(chain.clusters(&mut vol).unwrap(), after);
    }

    #[test]
    fn truncate_refuses_to_shrink() {
        let mut vol = ImageSpec::fat16().open();
        let mut chain = file_chain(&mut vol, 2);
        assert!(matches!(
            chain.truncate(&mut vol, 10),
            Err(Error::ShrinkUnsupported { length: 1024, requested: 10 })
        ));
    }

    #[test]
    fn truncate_rewrites_directory_slot() {
        let mut vol = ImageSpec::fat16().open();
        let root = vol.root().unwrap();
        let mut chain = root.mkfile(&mut vol, "empty.bin", &FileOptions::default()).unwrap();
        assert_eq!(chain.head, 0);

        chain.truncate(&mut vol, 2000).unwrap();
        let item = vol.lookup("EMPTY.BIN").unwrap();
        assert_eq!(item.entry.cluster, chain.head);
        assert_eq!(item.entry.length, 2000);
    }
}
