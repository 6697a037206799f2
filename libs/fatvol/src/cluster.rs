use crate::device::BlockDev;
use crate::error::{Error, Result};
use crate::fat::CLUST_FIRST;
use crate::volume::Volume;

/// Cluster-granular device access.
impl<D: BlockDev> Volume<D> {
    /// Absolute byte offset of data cluster `cluster`.
    pub fn cluster_offset(&self, cluster: u32) -> Result<u64> {
        if cluster < CLUST_FIRST || cluster > self.geo.max_cluster {
            return Err(Error::ClusterIndex { cluster, max: self.geo.max_cluster });
        }
        let sector = self.geo.cluster_start as u64
            + (cluster - CLUST_FIRST) as u64 * self.geo.sectors_per_cluster as u64;
        Ok(sector * self.geo.bytes_per_sector as u64)
    }

    fn check_cluster_len(&self, cluster: u32, len: usize) -> Result<()> {
        let bpc = self.geo.bytes_per_cluster as u64;
        if len as u64 > bpc {
            return Err(Error::ChainBounds { offset: 0, len, capacity: bpc });
        }
        log::trace!("fatvol: cluster {} io of {} bytes", cluster, len);
        Ok(())
    }

    /// Read the first `buf.len()` bytes of `cluster`.
    pub fn read_cluster(&mut self, cluster: u32, buf: &mut [u8]) -> Result<()> {
        let offset = self.cluster_offset(cluster)?;
        self.check_cluster_len(cluster, buf.len())?;
        Ok(self.dev.read_at(offset, buf)?)
    }

    /// Write `buf` at the start of `cluster`.
    pub fn write_cluster(&mut self, cluster: u32, buf: &[u8]) -> Result<()> {
        let offset = self.cluster_offset(cluster)?;
        self.check_cluster_len(cluster, buf.len())?;
        Ok(self.dev.write_at(offset, buf)?)
    }

    pub fn zero_cluster(&mut self, cluster: u32) -> Result<()> {
        let zeros = vec![0u8; self.geo.bytes_per_cluster as usize];
        self.write_cluster(cluster, &zeros)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::testutil::ImageSpec;

    #[test]
    fn offset_of_first_cluster_is_data_start() {
        let spec = ImageSpec::fat16();
        let geo = spec.geometry();
        let vol = spec.open();
        assert_eq!(vol.cluster_offset(2).unwrap(), geo.cluster_start as u64 * 512);
        assert_eq!(vol.cluster_offset(3).unwrap(), (geo.cluster_start as u64 + 1) * 512);
    }

    #[test]
    fn offset_honours_sectors_per_cluster() {
        let spec = ImageSpec { sectors_per_cluster: 4, ..ImageSpec::fat16() };
        let geo = spec.geometry();
        let vol = spec.open();
        assert_eq!(vol.bytes_per_cluster(), 2048);
        assert_eq!(vol.cluster_offset(5).unwrap(), (geo.cluster_start as u64 + 12) * 512);
    }

    #[test]
    fn reserved_clusters_have_no_offset() {
        let vol = ImageSpec::fat12().open();
        assert!(matches!(vol.cluster_offset(0), Err(Error::ClusterIndex { cluster: 0, .. })));
        assert!(matches!(vol.cluster_offset(1), Err(Error::ClusterIndex { cluster: 1, .. })));
        assert!(vol.cluster_offset(vol.max_cluster() + 1).is_err());
    }

    #[test]
    fn write_read_zero() {
        let mut vol = ImageSpec::fat16().open();
        vol.write_cluster(7, &[0xAB; 512]).unwrap();
        let mut buf = [0u8; 512];
        vol.read_cluster(7, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xAB));

        vol.zero_cluster(7).unwrap();
        vol.read_cluster(7, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        assert!(vol.write_cluster(7, &[0u8; 513]).is_err());
    }
}
