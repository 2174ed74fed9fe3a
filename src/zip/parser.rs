//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) near the file's end
//! 2. Read the Central Directory records it points to, one after another
//! 3. For extraction, read each file's Local File Header and data
//!
//! Every read names an absolute offset and is bounds-checked against the
//! archive size first, so a lying length field surfaces as a format error
//! instead of a huge allocation or a short read.

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::observer::ReadObserver;
use super::structures::*;

/// Low-level ZIP file parser.
///
/// This struct handles reading and parsing ZIP structures from
/// a data source. It's generic over the reader type to support
/// local files, in-memory buffers and anything else that is `Read + Seek`.
///
/// ## Usage
///
/// Typically used through [`ZipExtractor`](super::ZipExtractor)
/// rather than directly.
///
/// ## Example
///
/// ```ignore
/// let mut parser = ZipParser::new(reader)?;
/// let offset = parser.find_eocd()?;
/// let eocd = parser.read_eocd(offset)?;
/// let entries = parser.read_central_directory(&eocd, &mut ())?;
/// ```
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: R,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    /// Create a new parser for the given reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The archive bytes, as any source implementing [`ReadAt`]
    ///
    /// # Returns
    ///
    /// A parser bound to the reader. The source size is queried once here;
    /// no other I/O happens.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the size cannot be determined.
    pub fn new(mut reader: R) -> Result<Self> {
        let size = reader.size()?;
        Ok(Self { reader, size })
    }

    /// Total size of the archive in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read exactly `len` bytes at `offset`.
    ///
    /// # Arguments
    ///
    /// * `offset` - Absolute position in the archive
    /// * `len` - Number of bytes wanted
    /// * `what` - Name of the structure being read, used in error messages
    ///
    /// # Errors
    ///
    /// Returns a format error if the range runs past the end of the archive,
    /// before anything is allocated or read.
    pub fn read_exact_at(&mut self, offset: u64, len: usize, what: &str) -> Result<Vec<u8>> {
        let end = offset.checked_add(len as u64);
        if end.is_none_or(|end| end > self.size) {
            return Err(Error::format(format!(
                "{what} at offset {offset} ({len} bytes) extends past the end of the archive ({} bytes)",
                self.size
            )));
        }

        let mut buf = vec![0u8; len];
        self.reader.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Find the offset of the End of Central Directory record.
    ///
    /// The EOCD is followed only by its comment, which is at most 65535
    /// bytes, so the record must start inside the last
    /// `22 + 65535` bytes. That window is read in one go and searched for
    /// the *last* occurrence of the signature, so signature bytes inside
    /// entry data or the central directory are passed over. An archive
    /// comment containing the signature is not supported: the match inside
    /// the comment wins and the archive is misread.
    ///
    /// # Returns
    ///
    /// The absolute offset of the EOCD signature.
    ///
    /// # Errors
    ///
    /// Returns a format error if the file is smaller than an empty EOCD
    /// or no signature is found in the window.
    pub fn find_eocd(&mut self) -> Result<u64> {
        let min_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < min_size {
            return Err(Error::format(format!(
                "file too small ({} bytes, need at least {min_size})",
                self.size
            )));
        }

        let search_start = self
            .size
            .saturating_sub(min_size + EndOfCentralDirectory::MAX_COMMENT_SIZE as u64);
        let search_size = (self.size - search_start) as usize;
        let buf = self.read_exact_at(
            search_start,
            search_size,
            "end of central directory search window",
        )?;

        buf.windows(EndOfCentralDirectory::SIGNATURE.len())
            .rposition(|w| w == EndOfCentralDirectory::SIGNATURE)
            .map(|pos| search_start + pos as u64)
            .ok_or_else(|| Error::format("end of central directory signature not found"))
    }

    /// Decode the EOCD record (and its comment) starting at `offset`.
    ///
    /// # Arguments
    ///
    /// * `offset` - Position returned by [`find_eocd`](Self::find_eocd)
    ///
    /// # Errors
    ///
    /// Returns a format error if the 22-byte record runs past the end of the
    /// file or its signature is wrong, and an unsupported error if it
    /// describes a multi-disk archive.
    pub fn read_eocd(&mut self, offset: u64) -> Result<EndOfCentralDirectory> {
        let tail = self.size.saturating_sub(offset) as usize;
        if tail < EndOfCentralDirectory::SIZE {
            return Err(Error::format("end of central directory record is truncated"));
        }
        let len = tail.min(EndOfCentralDirectory::SIZE + EndOfCentralDirectory::MAX_COMMENT_SIZE);
        let buf = self.read_exact_at(offset, len, "end of central directory")?;
        let eocd = EndOfCentralDirectory::from_bytes(&buf)?;

        if eocd.disk_number != 0 || eocd.disk_with_cd != 0 {
            return Err(Error::Unsupported(format!(
                "multi-disk archive (disk {}, central directory on disk {})",
                eocd.disk_number, eocd.disk_with_cd
            )));
        }

        Ok(eocd)
    }

    /// Read every Central Directory File Header the EOCD declares.
    ///
    /// Records are read strictly in sequence from `cd_offset`; each next
    /// offset is the current one plus the fixed 46 bytes and the three
    /// declared variable lengths. Exactly `total_entries` records are read,
    /// and the last one is not required to end where the EOCD begins.
    ///
    /// Nothing beyond structure is checked here: no CRC, no decompression.
    ///
    /// # Arguments
    ///
    /// * `eocd` - The decoded End of Central Directory record
    /// * `observer` - Notified once per record; pass `&mut ()` to ignore
    ///
    /// # Returns
    ///
    /// One [`ZipFileEntry`] per record, in directory order.
    ///
    /// # Errors
    ///
    /// Returns a format error if the directory offset lies beyond the file,
    /// a record has the wrong signature, or a record runs past the end of
    /// the file. The first bad record aborts the whole read.
    pub fn read_central_directory<O: ReadObserver + ?Sized>(
        &mut self,
        eocd: &EndOfCentralDirectory,
        observer: &mut O,
    ) -> Result<Vec<ZipFileEntry>> {
        let mut offset = eocd.cd_offset as u64;
        if offset > self.size {
            return Err(Error::format(format!(
                "central directory offset {offset} is beyond the end of the archive ({} bytes)",
                self.size
            )));
        }

        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        for _ in 0..eocd.total_entries {
            let (entry, next) = self.read_cdfh(offset)?;
            observer.directory_entry(offset, &entry);
            entries.push(entry);
            offset = next;
        }

        Ok(entries)
    }

    /// Parse one Central Directory File Header at `offset`, returning the
    /// entry and the offset of the record that follows it.
    fn read_cdfh(&mut self, offset: u64) -> Result<(ZipFileEntry, u64)> {
        let fixed = self.read_exact_at(
            offset,
            CentralDirectoryHeader::SIZE,
            "central directory file header",
        )?;
        let mut cdfh = CentralDirectoryHeader::from_bytes(&fixed)?;

        let var_offset = offset + CentralDirectoryHeader::SIZE as u64;
        let variable =
            self.read_exact_at(var_offset, cdfh.variable_size(), "central directory file name")?;
        cdfh.set_variable(&variable)?;

        let next = var_offset + cdfh.variable_size() as u64;
        Ok((ZipFileEntry::from(cdfh), next))
    }

    /// Read the Local File Header referenced by `entry`.
    ///
    /// # Returns
    ///
    /// The decoded header (including name and extra field) and the byte
    /// offset where the entry's payload begins.
    ///
    /// # Errors
    ///
    /// Returns a format error if the signature is wrong or the header runs
    /// past the end of the file.
    pub fn read_local_header(&mut self, entry: &ZipFileEntry) -> Result<(LocalFileHeader, u64)> {
        let offset = entry.lfh_offset as u64;
        let fixed = self.read_exact_at(offset, LocalFileHeader::SIZE, "local file header")?;
        let mut lfh = LocalFileHeader::from_bytes(&fixed)?;

        let var_offset = offset + LocalFileHeader::SIZE as u64;
        let variable = self.read_exact_at(var_offset, lfh.variable_size(), "local file name")?;
        lfh.set_variable(&variable)?;

        let data_offset = var_offset + lfh.variable_size() as u64;
        Ok((lfh, data_offset))
    }

    /// List all files in the ZIP archive.
    ///
    /// Finds and decodes the EOCD, then reads the whole Central Directory.
    ///
    /// # Returns
    ///
    /// The EOCD record and a vector of [`ZipFileEntry`] structures, one for
    /// each file or directory in the archive.
    ///
    /// # Errors
    ///
    /// Any error from [`find_eocd`](Self::find_eocd),
    /// [`read_eocd`](Self::read_eocd) or
    /// [`read_central_directory`](Self::read_central_directory).
    pub fn list_files<O: ReadObserver + ?Sized>(
        &mut self,
        observer: &mut O,
    ) -> Result<(EndOfCentralDirectory, Vec<ZipFileEntry>)> {
        let eocd_offset = self.find_eocd()?;
        let eocd = self.read_eocd(eocd_offset)?;
        observer.trailer_found(eocd_offset, &eocd);
        let entries = self.read_central_directory(&eocd, observer)?;
        Ok((eocd, entries))
    }
}
