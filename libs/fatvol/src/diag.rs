//! Whole-volume diagnostics and maintenance scans.
//!
//! Every scan here is O(volume size).

use crate::device::BlockDev;
use crate::error::Result;
use crate::fat::{CLUST_BAD, CLUST_FIRST, CLUST_FREE, is_eoc, is_reserved};
use crate::volume::Volume;

/// Contiguous `(start, count)` runs of an ordered cluster sequence.
///
/// Consumes its input; it cannot be restarted.
pub struct Extents<I> {
    iter: I,
    pending: Option<(u32, u32)>,
}

pub fn chain_extents<I: IntoIterator<Item = u32>>(clusters: I) -> Extents<I::IntoIter> {
    Extents { iter: clusters.into_iter(), pending: None }
}

impl<I: Iterator<Item = u32>> Iterator for Extents<I> {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<(u32, u32)> {
        for cluster in self.iter.by_ref() {
            match self.pending {
                Some((start, count)) if start.checked_add(count) == Some(cluster) => {
                    self.pending = Some((start, count + 1));
                }
                Some(run) => {
                    self.pending = Some((cluster, 1));
                    return Some(run);
                }
                None => self.pending = Some((cluster, 1)),
            }
        }
        self.pending.take()
    }
}

/// True if `value` links to another data cluster.
fn is_link(value: u32, max: u32) -> bool {
    (CLUST_FIRST..=max).contains(&value)
}

/// Fragmentation of every chain on the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragReport {
    pub chains: u32,
    /// Links between consecutive clusters of a chain.
    pub links: u32,
    /// Links whose target is not the physically next cluster.
    pub fragments: u32,
    pub longest_extent: u32,
    pub shortest_extent: u32,
}

impl FragReport {
    /// Build the report from a full table, where `table[c]` is cluster `c`'s
    /// logical FAT value.
    ///
    /// The table must not contain cycles reachable from a chain head; a
    /// cycle makes this loop forever.
    pub fn from_table(table: &[u32]) -> Self {
        let max = table.len().saturating_sub(1) as u32;
        let mut referenced = vec![false; table.len()];
        for &value in table.iter().skip(CLUST_FIRST as usize) {
            if is_link(value, max) {
                referenced[value as usize] = true;
            }
        }

        let mut report = FragReport::default();
        for head in CLUST_FIRST..=max {
            let value = table[head as usize];
            let allocated = is_eoc(value) || is_link(value, max);
            if !allocated || referenced[head as usize] {
                continue;
            }
            report.chains += 1;

            let mut cluster = head;
            let walk = std::iter::from_fn(|| {
                let current = cluster;
                if current == 0 {
                    return None;
                }
                let next = table[current as usize];
                cluster = if is_link(next, max) { next } else { 0 };
                Some(current)
            });
            let mut previous: Option<(u32, u32)> = None;
            for extent in chain_extents(walk) {
                if previous.is_some() {
                    report.fragments += 1;
                }
                report.links += extent.1 - 1;
                report.longest_extent = report.longest_extent.max(extent.1);
                report.shortest_extent = match report.shortest_extent {
                    0 => extent.1,
                    n => n.min(extent.1),
                };
                previous = Some(extent);
            }
        }
        report.links += report.fragments;
        report
    }

    /// Read the whole FAT and report on it.
    pub fn scan<D: BlockDev>(vol: &mut Volume<D>) -> Result<Self> {
        let table = read_table(vol)?;
        let report = Self::from_table(&table);
        log::debug!("fatvol: fragmentation scan found {} chains", report.chains);
        Ok(report)
    }

    /// Share of links that jump, as a percentage.
    pub fn percent(&self) -> f64 {
        if self.links == 0 {
            0.0
        } else {
            self.fragments as f64 * 100.0 / self.links as f64
        }
    }
}

fn read_table<D: BlockDev>(vol: &mut Volume<D>) -> Result<Vec<u32>> {
    (0..=vol.max_cluster()).map(|cluster| vol.fat_get(cluster)).collect()
}

/// Cluster counts by state over `[2, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub free: u32,
    pub used: u32,
    pub bad: u32,
    pub reserved: u32,
}

impl Usage {
    pub fn scan<D: BlockDev>(vol: &mut Volume<D>) -> Result<Self> {
        let mut usage = Usage::default();
        for cluster in CLUST_FIRST..=vol.max_cluster() {
            match vol.fat_get(cluster)? {
                CLUST_FREE => usage.free += 1,
                CLUST_BAD => usage.bad += 1,
                v if is_reserved(v) => usage.reserved += 1,
                _ => usage.used += 1,
            }
        }
        Ok(usage)
    }

    pub fn total(&self) -> u32 {
        self.free + self.used + self.bad + self.reserved
    }
}

/// Reset the FSInfo free count to the number of free clusters in `usage`.
/// Returns the stale count when it was wrong (`None` inside for "unknown"),
/// or `None` when there is nothing to correct.
pub fn sync_free_count<D: BlockDev>(vol: &mut Volume<D>, usage: &Usage) -> Option<Option<u32>> {
    let info = vol.fsinfo_mut()?;
    let stale = info.free_count();
    if stale == Some(usage.free) {
        return None;
    }
    log::info!("fatvol: FSInfo free count {:?} corrected to {}", stale, usage.free);
    info.set_free_count(usage.free);
    Some(stale)
}

/// Mark every `interval`-th free cluster bad, scattering the free space so
/// later allocations fragment. Returns how many clusters were marked.
pub fn mark_bad_every<D: BlockDev>(vol: &mut Volume<D>, interval: u32) -> Result<u32> {
    if interval == 0 {
        return Ok(0);
    }
    let mut seen = 0u32;
    let mut marked = 0u32;
    for cluster in CLUST_FIRST..=vol.max_cluster() {
        if vol.fat_get(cluster)? != CLUST_FREE {
            continue;
        }
        seen += 1;
        if seen % interval == 0 {
            vol.fat_set(cluster, CLUST_BAD)?;
            marked += 1;
        }
    }
    if let Some(info) = vol.fsinfo_mut() {
        info.withdraw(marked);
    }
    log::info!("fatvol: marked {} free clusters bad (every {})", marked, interval);
    Ok(marked)
}

/// Return every bad cluster to the free pool.
pub fn free_bad<D: BlockDev>(vol: &mut Volume<D>) -> Result<u32> {
    let mut freed = 0u32;
    for cluster in CLUST_FIRST..=vol.max_cluster() {
        if vol.fat_get(cluster)? == CLUST_BAD {
            vol.fat_set(cluster, CLUST_FREE)?;
            freed += 1;
        }
    }
    if let Some(info) = vol.fsinfo_mut() {
        info.release(freed);
    }
    log::info!("fatvol: freed {} bad clusters", freed);
    Ok(freed)
}
