//! An opened FAT volume.
//!
//! `Volume` owns the device, the FAT cache and the FSInfo counter. Chains and
//! directories are plain value handles that borrow the volume for the
//! duration of each call, so a volume outlives every handle by construction.
//!
//! FAT writes are cached. Callers must run their work inside
//! [`Volume::session`] or end with [`Volume::close`]; nothing is flushed on
//! drop.

use crate::boot::{BootSector, FatType, Geometry};
use crate::chain::Chain;
use crate::device::BlockDev;
use crate::dir::{DirItem, DirLocation, Directory};
use crate::error::{Error, Result};
use crate::fat::{self, CLUST_FIRST, CLUST_FREE, FatTable, is_eoc, is_reserved};
use crate::fsinfo::FsInfo;

pub struct Volume<D: BlockDev> {
    pub(crate) dev: D,
    pub(crate) geo: Geometry,
    pub(crate) fat: Box<dyn FatTable>,
    pub(crate) fsinfo: Option<FsInfo>,
}

impl<D: BlockDev> Volume<D> {
    /// Parse the boot sector of `dev` and set up the matching FAT variant.
    pub fn open(mut dev: D) -> Result<Self> {
        let mut sec = [0u8; BootSector::SIZE];
        dev.read_at(0, &mut sec)?;
        let bs = BootSector::parse(&sec)?;
        let geo = Geometry::from_boot(&bs)?;

        let fat = fat::load(&mut dev, &geo)?;
        let fsinfo = match geo.fat_type {
            FatType::Fat32 => FsInfo::load(&mut dev, geo.fsinfo_sector, geo.bytes_per_sector)?,
            _ => None,
        };

        log::info!(
            "fatvol: FAT{} volume, {} clusters of {} bytes",
            u8::from(geo.fat_type),
            geo.clusters,
            geo.bytes_per_cluster
        );
        Ok(Volume { dev, geo, fat, fsinfo })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }

    pub fn fat_type(&self) -> FatType {
        self.geo.fat_type
    }

    /// Root directory cluster (FAT32), or 0 when the root is a fixed region.
    pub fn root_cluster(&self) -> u32 {
        self.geo.root_cluster
    }

    pub fn max_cluster(&self) -> u32 {
        self.geo.max_cluster
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.geo.bytes_per_cluster
    }

    pub fn fsinfo(&self) -> Option<&FsInfo> {
        self.fsinfo.as_ref()
    }

    pub(crate) fn fsinfo_mut(&mut self) -> Option<&mut FsInfo> {
        self.fsinfo.as_mut()
    }

    pub(crate) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        Ok(self.dev.read_at(offset, buf)?)
    }

    pub(crate) fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        Ok(self.dev.write_at(offset, buf)?)
    }

    // ─── FAT ───────────────────────────────────────────────────────────────────

    pub fn fat_get(&mut self, cluster: u32) -> Result<u32> {
        self.fat.get(&mut self.dev, cluster)
    }

    pub fn fat_set(&mut self, cluster: u32, value: u32) -> Result<()> {
        self.fat.set(&mut self.dev, cluster, value)
    }

    pub fn find_free(&mut self, count: usize, start: u32) -> Result<Vec<u32>> {
        self.fat.find(&mut self.dev, count, start)
    }

    /// Link `clusters` into a chain ending in `terminal` and charge them
    /// against the FSInfo free count. Returns the head.
    pub fn claim(&mut self, clusters: &[u32], terminal: u32) -> Result<u32> {
        let head = self.fat.chain(&mut self.dev, clusters, terminal)?;
        if let (Some(info), Some(&last)) = (self.fsinfo.as_mut(), clusters.last()) {
            info.consume(clusters.len() as u32, last);
        }
        log::debug!("fatvol: claimed {} clusters at head {}", clusters.len(), head);
        Ok(head)
    }

    /// `claim(find_free(count, start), terminal)`.
    pub fn allocate(&mut self, count: usize, start: u32, terminal: u32) -> Result<u32> {
        let clusters = self.find_free(count, start)?;
        self.claim(&clusters, terminal)
    }

    /// Follow the chain starting at `head` to its end-of-chain marker.
    ///
    /// A head of 0 is the empty chain.
    pub fn clusters_of(&mut self, head: u32) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        if head == CLUST_FREE {
            return Ok(out);
        }
        let max = self.geo.max_cluster;
        let mut cur = head;
        loop {
            if cur < CLUST_FIRST || cur > max {
                let from = out.last().copied().unwrap_or(head);
                return Err(Error::BrokenChain { cluster: from, value: cur });
            }
            out.push(cur);
            if out.len() as u32 > max {
                return Err(Error::BrokenChain { cluster: cur, value: cur });
            }
            let next = self.fat_get(cur)?;
            if is_eoc(next) {
                return Ok(out);
            }
            if next == CLUST_FREE || is_reserved(next) {
                return Err(Error::BrokenChain { cluster: cur, value: next });
            }
            cur = next;
        }
    }

    // ─── Directories ───────────────────────────────────────────────────────────

    pub fn root(&mut self) -> Result<Directory> {
        match self.geo.fat_type {
            FatType::Fat32 => Directory::at(self, DirLocation::Cluster(self.geo.root_cluster)),
            _ => Directory::at(self, DirLocation::FixedRoot),
        }
    }

    /// Resolve a `/`-separated path from the root, matching each component
    /// case-insensitively against long and short names.
    pub fn lookup(&mut self, path: &str) -> Result<DirItem> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(Error::NotFound(String::from("/")));
        }
        let mut dir = self.root()?;
        let mut remaining = path;
        loop {
            let (component, rest) = match remaining.find('/') {
                Some(i) => (&remaining[..i], remaining[i + 1..].trim_matches('/')),
                None => (remaining, ""),
            };
            let item = dir
                .lookup(self, component)?
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
            if rest.is_empty() {
                return Ok(item);
            }
            dir = self.directory(&item)?;
            remaining = rest;
        }
    }

    /// Open the directory at `path`; empty or `/` is the root.
    pub fn open_dir(&mut self, path: &str) -> Result<Directory> {
        if path.trim_matches('/').is_empty() {
            return self.root();
        }
        let item = self.lookup(path)?;
        self.directory(&item)
    }

    pub fn directory(&mut self, item: &DirItem) -> Result<Directory> {
        if !item.entry.is_dir() {
            return Err(Error::NotADirectory(item.name.clone()));
        }
        // ".." entries of first-level directories point at cluster 0.
        if item.entry.cluster == CLUST_FREE {
            return self.root();
        }
        Directory::at(self, DirLocation::Cluster(item.entry.cluster))
    }

    /// A chain over `item`'s data that rewrites `item`'s slot when grown.
    pub fn open_file(&self, item: &DirItem) -> Chain {
        Chain::with_slot(item.entry.cluster, item.entry.length, item.slot)
    }

    // ─── Release ───────────────────────────────────────────────────────────────

    /// Write back the FAT cache and the FSInfo counter.
    pub fn flush(&mut self) -> Result<()> {
        self.fat.flush(&mut self.dev)?;
        if let Some(info) = self.fsinfo.as_mut() {
            info.flush(&mut self.dev)?;
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.fat.is_dirty() || self.fsinfo.as_ref().is_some_and(FsInfo::is_dirty)
    }

    /// Run `f` and flush afterwards, whether `f` succeeds, fails or panics.
    ///
    /// An error from `f` takes precedence over a flush error.
    pub fn session<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        struct Guard<'a, D: BlockDev> {
            vol: &'a mut Volume<D>,
            armed: bool,
        }

        impl<D: BlockDev> Drop for Guard<'_, D> {
            fn drop(&mut self) {
                if self.armed {
                    log::warn!("fatvol: session unwinding, flushing FAT");
                    if let Err(e) = self.vol.flush() {
                        log::error!("fatvol: flush during unwind failed: {}", e);
                    }
                }
            }
        }

        let mut guard = Guard { vol: self, armed: true };
        let result = f(&mut *guard.vol);
        guard.armed = false;
        let flushed = guard.vol.flush();
        match (result, flushed) {
            (Err(e), Err(flush_err)) => {
                log::error!("fatvol: flush after failed session also failed: {}", flush_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(v), Ok(())) => Ok(v),
        }
    }

    /// Flush and hand the device back.
    pub fn close(mut self) -> Result<D> {
        self.flush()?;
        log::info!("fatvol: volume closed");
        Ok(self.dev)
    }
}
