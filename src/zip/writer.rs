//! Streaming ZIP archive writer.
//!
//! Entries are written front to back as they are added: a Local File
//! Header followed directly by the payload. Only per-entry metadata is kept
//! in memory; on [`ZipWriter::close`] it is replayed as the Central Directory,
//! followed by the End of Central Directory record.

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

use crate::error::{Error, Result};

use super::structures::*;

/// Largest number of entries the 16-bit EOCD count fields can describe.
const MAX_ENTRIES: usize = MAX_U16_FIELD;

/// Settings for a [`ZipWriter`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// How payloads are encoded. Only `Stored` and `Deflate` are accepted.
    pub method: CompressionMethod,
    /// Deflate level, 0-9.
    pub level: u32,
    /// Archive comment stored after the EOCD record.
    pub comment: Vec<u8>,
    /// Timestamp stamped on every entry; `None` uses the wall clock at the
    /// moment each entry is added.
    pub modified: Option<DosDateTime>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Stored,
            level: 6,
            comment: Vec::new(),
            modified: None,
        }
    }
}

/// Metadata kept for one written entry until the central directory is
/// emitted.
#[derive(Debug, Clone)]
struct FileRecord {
    name: Vec<u8>,
    flags: u16,
    compression_method: u16,
    last_modified: DosDateTime,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    lfh_offset: u32,
}

impl FileRecord {
    fn central_directory_header(&self) -> CentralDirectoryHeader {
        CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY_UNIX,
            version_needed: VERSION_NEEDED,
            flags: self.flags,
            compression_method: self.compression_method,
            last_modified: self.last_modified,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            file_name_length: self.name.len() as u16,
            extra_field_length: 0,
            file_comment_length: 0,
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: UNIX_REGULAR_FILE_0644,
            lfh_offset: self.lfh_offset,
            file_name: self.name.clone(),
            extra_field: Vec::new(),
            file_comment: Vec::new(),
        }
    }
}

/// Writes a ZIP archive to any [`Write`] sink in a single forward pass.
///
/// ```
/// use zipkit::ZipWriter;
///
/// let mut writer = ZipWriter::new(Vec::new());
/// writer.add_entry("hello.txt", b"Hello, World!")?;
/// let bytes = writer.close()?;
/// assert_eq!(&bytes[0..4], b"PK\x03\x04");
/// # Ok::<(), zipkit::Error>(())
/// ```
pub struct ZipWriter<W: Write> {
    sink: W,
    options: WriterOptions,
    files: Vec<FileRecord>,
    /// Bytes written to `sink` so far.
    offset: u64,
    /// Set once a write to the sink has failed; the sink's contents no
    /// longer match `offset`/`files`.
    poisoned: bool,
}

impl<W: Write> ZipWriter<W> {
    /// Bind a writer to `sink` with default options (store, wall clock).
    pub fn new(sink: W) -> Self {
        Self::with_options(sink, WriterOptions::default())
    }

    pub fn with_options(sink: W, options: WriterOptions) -> Self {
        Self {
            sink,
            options,
            files: Vec::new(),
            offset: 0,
            poisoned: false,
        }
    }

    /// Number of bytes emitted so far.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Add an entry named `name` holding `data`.
    ///
    /// `name` is stored byte for byte; the UTF-8 flag is set when it is
    /// valid UTF-8. An empty `data` produces a zero-length entry.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the name is empty or longer than 65535 bytes,
    ///   if a size or offset does not fit a 32-bit field, if the archive
    ///   already holds 65535 entries, or if an earlier write failed.
    /// - `Io` if the sink fails. The writer is unusable afterwards.
    pub fn add_entry(&mut self, name: impl AsRef<[u8]>, data: &[u8]) -> Result<()> {
        let modified = self.options.modified.unwrap_or_else(DosDateTime::now);
        self.add_entry_with_time(name, data, modified)
    }

    /// Like [`add_entry`](Self::add_entry) with an explicit timestamp.
    pub fn add_entry_with_time(
        &mut self,
        name: impl AsRef<[u8]>,
        data: &[u8],
        modified: DosDateTime,
    ) -> Result<()> {
        let name = name.as_ref();
        self.check_usable()?;
        if name.is_empty() {
            return Err(Error::invalid("zip file name is empty"));
        }
        if name.len() > MAX_U16_FIELD {
            return Err(Error::invalid(format!(
                "zip file name is too long ({} bytes, max 65535)",
                name.len()
            )));
        }
        if self.files.len() >= MAX_ENTRIES {
            return Err(Error::invalid("too many entries (max 65535)"));
        }
        let uncompressed_size = u32::try_from(data.len()).map_err(|_| {
            Error::invalid(format!("entry data is too large ({} bytes)", data.len()))
        })?;
        let lfh_offset = u32::try_from(self.offset)
            .map_err(|_| Error::invalid("archive is too large for a 32-bit local header offset"))?;

        let crc32 = crc32fast::hash(data);
        let compressed = match self.options.method {
            CompressionMethod::Stored => None,
            CompressionMethod::Deflate => Some(self.deflate(data)?),
            CompressionMethod::Unknown(code) => {
                return Err(Error::Unsupported(format!("compression method {code} for writing")));
            }
        };
        let payload = compressed.as_deref().unwrap_or(data);
        let compressed_size = u32::try_from(payload.len()).map_err(|_| {
            Error::invalid(format!("compressed data is too large ({} bytes)", payload.len()))
        })?;

        let mut flags = 0;
        if std::str::from_utf8(name).is_ok() {
            flags |= FLAG_UTF8;
        }

        let lfh = LocalFileHeader {
            version_needed: VERSION_NEEDED,
            flags,
            compression_method: self.options.method.as_u16(),
            last_modified: modified,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length: name.len() as u16,
            extra_field_length: 0,
            file_name: name.to_vec(),
            extra_field: Vec::new(),
        };

        let written = (lfh.encoded_len() + payload.len()) as u64;
        if self.offset + written > u32::MAX as u64 {
            return Err(Error::invalid("archive would exceed 4 GiB without ZIP64"));
        }

        self.emit(|sink| {
            lfh.write_to(sink)?;
            sink.write_all(payload)?;
            Ok(())
        })?;

        self.files.push(FileRecord {
            name: lfh.file_name,
            flags,
            compression_method: lfh.compression_method,
            last_modified: modified,
            crc32,
            compressed_size,
            uncompressed_size,
            lfh_offset,
        });
        self.offset += written;

        Ok(())
    }

    /// Write the Central Directory and the End of Central Directory record,
    /// flush, and return the sink.
    ///
    /// An archive with no entries is still valid: it consists of the EOCD
    /// record alone.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the comment is longer than 65535 bytes or
    ///   contains the EOCD signature, which readers would mistake for the
    ///   record itself. Nothing is written in that case.
    /// - `Io` if the sink fails.
    pub fn close(mut self) -> Result<W> {
        self.check_usable()?;
        let comment_len = u16::try_from(self.options.comment.len()).map_err(|_| {
            Error::invalid(format!(
                "archive comment is too long ({} bytes, max 65535)",
                self.options.comment.len()
            ))
        })?;
        if self
            .options
            .comment
            .windows(EndOfCentralDirectory::SIGNATURE.len())
            .any(|w| w == EndOfCentralDirectory::SIGNATURE)
        {
            return Err(Error::invalid(
                "archive comment contains the end of central directory signature",
            ));
        }

        let cd_offset = self.offset;
        let headers: Vec<_> = self
            .files
            .iter()
            .map(FileRecord::central_directory_header)
            .collect();
        let cd_size: u64 = headers.iter().map(|h| h.encoded_len() as u64).sum();
        if cd_offset + cd_size > u32::MAX as u64 {
            return Err(Error::invalid("central directory would exceed 4 GiB without ZIP64"));
        }

        for header in &headers {
            self.emit(|sink| header.write_to(sink))?;
            self.offset += header.encoded_len() as u64;
        }

        let entries = self.files.len() as u16;
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size: (self.offset - cd_offset) as u32,
            cd_offset: cd_offset as u32,
            comment_len,
            comment: std::mem::take(&mut self.options.comment),
        };
        self.emit(|sink| {
            eocd.write_to(sink)?;
            sink.flush()?;
            Ok(())
        })?;
        self.offset += eocd.encoded_len() as u64;

        Ok(self.sink)
    }

    fn deflate(&self, data: &[u8]) -> Result<Vec<u8>> {
        let level = Compression::new(self.options.level.min(9));
        let mut encoder = DeflateEncoder::new(Vec::new(), level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::invalid("writer is unusable after a failed write"));
        }
        Ok(())
    }

    /// Run `f` against the sink, poisoning the writer if it fails.
    fn emit(&mut self, f: impl FnOnce(&mut W) -> Result<()>) -> Result<()> {
        let result = f(&mut self.sink);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    const FIXED_TIME: DosDateTime = DosDateTime { time: 0x7000, date: 0x5799 };

    fn fixed_options() -> WriterOptions {
        WriterOptions {
            modified: Some(FIXED_TIME),
            ..Default::default()
        }
    }

    #[test]
    fn new_writer_is_empty() {
        let writer = ZipWriter::new(Vec::new());
        assert!(writer.is_empty());
        assert_eq!(writer.bytes_written(), 0);
    }

    #[test]
    fn add_entry_advances_offset_by_header_name_and_data() {
        let mut writer = ZipWriter::with_options(Vec::new(), fixed_options());
        writer.add_entry("test.txt", b"Hello, World!").unwrap();
        assert_eq!(writer.bytes_written(), 4 + 26 + 8 + 13);
        writer.add_entry("b", b"").unwrap();
        assert_eq!(writer.bytes_written(), 51 + 4 + 26 + 1);
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn empty_archive_is_a_bare_eocd() {
        let bytes = ZipWriter::new(Vec::new()).close().unwrap();
        assert_eq!(
            bytes,
            [0x50, 0x4b, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn single_entry_layout_is_byte_exact() {
        let mut writer = ZipWriter::with_options(Vec::new(), fixed_options());
        writer.add_entry("a", b"xy").unwrap();
        let bytes = writer.close().unwrap();

        let crc = crc32fast::hash(b"xy").to_le_bytes();
        let mut expected = vec![
            0x50, 0x4b, 0x03, 0x04, // signature
            20, 0, // version needed
            0x00, 0x08, // flags: UTF-8
            0, 0, // stored
            0x00, 0x70, 0x99, 0x57, // time, date
        ];
        expected.extend_from_slice(&crc);
        expected.extend_from_slice(&[2, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0]);
        expected.extend_from_slice(b"axy");

        expected.extend_from_slice(&[
            0x50, 0x4b, 0x01, 0x02, // signature
            0x14, 0x03, // made by Unix 2.0
            20, 0, 0x00, 0x08, 0, 0, 0x00, 0x70, 0x99, 0x57,
        ]);
        expected.extend_from_slice(&crc);
        expected.extend_from_slice(&[
            2, 0, 0, 0, 2, 0, 0, 0, // sizes
            1, 0, 0, 0, 0, 0, // name, extra, comment lengths
            0, 0, 0, 0, // disk start, internal attrs
            0x00, 0x00, 0xA4, 0x81, // external attrs
            0, 0, 0, 0, // local header offset
        ]);
        expected.push(b'a');

        expected.extend_from_slice(&[
            0x50, 0x4b, 0x05, 0x06, 0, 0, 0, 0, 1, 0, 1, 0, // counts
            47, 0, 0, 0, // directory size
            33, 0, 0, 0, // directory offset
            0, 0,
        ]);

        assert_eq!(bytes, expected);
    }

    #[test]
    fn non_utf8_name_clears_flag() {
        let mut writer = ZipWriter::with_options(Vec::new(), fixed_options());
        writer.add_entry([0xFFu8, 0xFE], b"x").unwrap();
        let bytes = writer.close().unwrap();
        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        assert_eq!(flags & FLAG_UTF8, 0);
    }

    #[test]
    fn rejects_empty_name() {
        let mut writer = ZipWriter::new(Vec::new());
        assert!(matches!(writer.add_entry("", b"x"), Err(Error::InvalidArgument(_))));
        assert_eq!(writer.bytes_written(), 0);
    }

    #[test]
    fn rejects_oversized_name() {
        let mut writer = ZipWriter::new(Vec::new());
        let name = vec![b'a'; 65536];
        assert!(matches!(writer.add_entry(&name, b"x"), Err(Error::InvalidArgument(_))));

        let name = vec![b'a'; 65535];
        writer.add_entry(&name, b"x").unwrap();
    }

    #[test]
    fn rejects_oversized_comment() {
        let options = WriterOptions {
            comment: vec![b'c'; 65536],
            ..Default::default()
        };
        let writer = ZipWriter::with_options(Vec::new(), options);
        assert!(matches!(writer.close(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn rejects_comment_holding_eocd_signature() {
        let mut comment = b"PK\x05\x06".to_vec();
        comment.extend_from_slice(&[0; 18]);
        let options = WriterOptions {
            comment,
            ..fixed_options()
        };

        let mut out = Vec::new();
        let mut writer = ZipWriter::with_options(&mut out, options);
        writer.add_entry("a.txt", b"alpha").unwrap();
        writer.add_entry("b.txt", b"beta").unwrap();
        let entries_end = writer.bytes_written();
        match writer.close() {
            Err(Error::InvalidArgument(msg)) => {
                assert_eq!(msg, "archive comment contains the end of central directory signature")
            }
            Err(other) => panic!("expected invalid argument, got {other}"),
            Ok(_) => panic!("expected invalid argument, got an archive"),
        }
        // No central directory or trailer reached the sink.
        assert_eq!(out.len() as u64, entries_end);
    }

    #[test]
    fn comment_with_partial_signature_is_accepted() {
        let options = WriterOptions {
            comment: b"PK\x05 and PK\x06".to_vec(),
            ..fixed_options()
        };
        let writer = ZipWriter::with_options(Vec::new(), options);
        let bytes = writer.close().unwrap();
        assert_eq!(bytes.len(), 22 + 11);
    }

    #[test]
    fn deflate_option_records_distinct_sizes() {
        let options = WriterOptions {
            method: CompressionMethod::Deflate,
            ..fixed_options()
        };
        let mut writer = ZipWriter::with_options(Vec::new(), options);
        let data = vec![b'z'; 10_000];
        writer.add_entry("z.txt", &data).unwrap();
        let bytes = writer.close().unwrap();

        let lfh = LocalFileHeader::from_bytes(&bytes).unwrap();
        assert_eq!(lfh.compression_method, 8);
        assert_eq!(lfh.uncompressed_size, 10_000);
        assert!(lfh.compressed_size < 1_000);
        assert_eq!(lfh.crc32, crc32fast::hash(&data));
    }

    struct FailingSink {
        budget: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_poisons_the_writer() {
        let mut writer = ZipWriter::new(FailingSink { budget: 10 });
        assert!(matches!(writer.add_entry("a.txt", b"data"), Err(Error::Io(_))));
        assert!(matches!(writer.add_entry("b.txt", b"data"), Err(Error::InvalidArgument(_))));
        assert!(matches!(writer.close(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn close_failure_propagates() {
        let mut writer = ZipWriter::new(FailingSink { budget: 40 });
        writer.add_entry("a.txt", b"data").unwrap();
        assert!(matches!(writer.close(), Err(Error::Io(_))));
    }
}
