//! Byte-addressed block device abstraction.
//!
//! Everything the volume does to its backing store goes through these two
//! calls, so an in-memory `Cursor<Vec<u8>>` is as good a disk as a raw image
//! file or a block special device.

use std::io::{self, Read, Seek, SeekFrom, Write};

pub trait BlockDev {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;
}

impl<T: Read + Write + Seek> BlockDev for T {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_read_at_offset() {
        let mut disk = Cursor::new(vec![0u8; 1024]);
        disk.write_at(600, b"sector two").unwrap();
        let mut buf = [0u8; 10];
        disk.read_at(600, &mut buf).unwrap();
        assert_eq!(&buf, b"sector two");
    }

    #[test]
    fn read_past_end_fails() {
        let mut disk = Cursor::new(vec![0u8; 512]);
        let mut buf = [0u8; 16];
        assert!(disk.read_at(508, &mut buf).is_err());
    }
}
