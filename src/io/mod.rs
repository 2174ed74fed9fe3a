mod local;

pub use local::LocalFileReader;

use std::io::{Read, Seek, SeekFrom};

/// Trait for random access reading from a data source.
///
/// Every read names its own absolute offset, so callers never depend on a
/// cursor position left behind by an earlier read.
pub trait ReadAt {
    /// Fill `buf` completely with the bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;

    /// Get the total size of the data source
    fn size(&mut self) -> std::io::Result<u64>;
}

impl<T: Read + Seek> ReadAt for T {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }

    fn size(&mut self) -> std::io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cursor_reads_at_absolute_offsets() {
        let mut src = Cursor::new(b"0123456789".to_vec());
        assert_eq!(src.size().unwrap(), 10);

        let mut buf = [0u8; 3];
        src.read_at(7, &mut buf).unwrap();
        assert_eq!(&buf, b"789");
        src.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"012");
    }

    #[test]
    fn cursor_short_read_is_an_error() {
        let mut src = Cursor::new(b"abc".to_vec());
        let mut buf = [0u8; 4];
        let err = src.read_at(1, &mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
