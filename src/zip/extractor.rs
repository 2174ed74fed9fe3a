use flate2::read::DeflateDecoder;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::observer::ReadObserver;
use super::parser::ZipParser;
use super::structures::{
    CompressionMethod, EndOfCentralDirectory, FLAG_DATA_DESCRIPTOR, ZipFileEntry,
};

/// Settings for reading an archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Fail an entry whose recovered bytes do not match the CRC-32 recorded
    /// in the central directory.
    pub verify_crc: bool,
    /// Leave `__MACOSX/` entries out of [`ZipExtractor::extract_all`].
    pub skip_macos_metadata: bool,
}

/// Outcome of materializing one entry during [`ZipExtractor::extract_all`].
#[derive(Debug)]
pub struct ExtractedEntry {
    pub entry: ZipFileEntry,
    pub data: Result<Vec<u8>>,
}

/// ZIP file extractor
///
/// Opening an extractor locates the EOCD and reads the whole central
/// directory; a structural problem there fails [`ZipExtractor::new`]. Entry
/// payloads are read on demand.
pub struct ZipExtractor<R: ReadAt, O: ReadObserver = ()> {
    parser: ZipParser<R>,
    eocd: EndOfCentralDirectory,
    entries: Vec<ZipFileEntry>,
    options: ReadOptions,
    observer: O,
}

impl<R: ReadAt> ZipExtractor<R> {
    /// Open an archive with default [`ReadOptions`] and no observer.
    ///
    /// # Errors
    ///
    /// See [`with_options`](ZipExtractor::with_options).
    pub fn new(reader: R) -> Result<Self> {
        Self::with_options(reader, ReadOptions::default(), ())
    }
}

impl<R: ReadAt, O: ReadObserver> ZipExtractor<R, O> {
    /// Open an archive, reading its EOCD and Central Directory.
    ///
    /// # Arguments
    ///
    /// * `reader` - The archive bytes
    /// * `options` - CRC verification and `__MACOSX/` handling
    /// * `observer` - Receives diagnostics for every read, e.g. [`LogObserver`](super::LogObserver)
    ///
    /// # Errors
    ///
    /// Returns a format error if the EOCD cannot be found or the Central
    /// Directory is malformed, an unsupported error for multi-disk
    /// archives, and an I/O error if the reader fails.
    pub fn with_options(reader: R, options: ReadOptions, mut observer: O) -> Result<Self> {
        let mut parser = ZipParser::new(reader)?;
        let (eocd, entries) = parser.list_files(&mut observer)?;
        Ok(Self {
            parser,
            eocd,
            entries,
            options,
            observer,
        })
    }

    /// List all files in the archive, in central directory order.
    pub fn list_files(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    /// The parsed End of Central Directory record.
    pub fn eocd(&self) -> &EndOfCentralDirectory {
        &self.eocd
    }

    /// The archive comment.
    pub fn comment(&self) -> &[u8] {
        &self.eocd.comment
    }

    /// The observer passed at construction.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.parser.into_inner()
    }

    /// Extract file data to memory
    ///
    /// Reads the entry's Local File Header, then its payload, and decodes
    /// it according to the local compression method.
    ///
    /// The local header's sizes are used unless they are zero with the data
    /// descriptor flag set: such entries were streamed before their size was
    /// known, and only the central directory holds the real values.
    ///
    /// # Errors
    ///
    /// - `Format` on a bad local signature, a payload running past the end of
    ///   the archive, a corrupt deflate stream, a decoded size that differs
    ///   from the declared one, or (when enabled) a CRC-32 mismatch.
    /// - `Unsupported` for methods other than stored and deflate.
    pub fn extract_to_memory(&mut self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        let (lfh, data_offset) = self.parser.read_local_header(entry)?;
        self.observer.local_header(entry, &lfh);

        let deflated = match CompressionMethod::from_u16(lfh.compression_method) {
            CompressionMethod::Stored => false,
            CompressionMethod::Deflate => true,
            CompressionMethod::Unknown(code) => {
                return Err(Error::Unsupported(format!(
                    "compression method {code} for {}",
                    entry.file_name
                )));
            }
        };

        let (compressed_size, uncompressed_size) =
            if lfh.compressed_size == 0 && lfh.flags & FLAG_DATA_DESCRIPTOR != 0 {
                self.observer.sizes_from_directory(entry);
                (entry.compressed_size, entry.uncompressed_size)
            } else {
                (lfh.compressed_size, lfh.uncompressed_size)
            };

        let raw = self
            .parser
            .read_exact_at(data_offset, compressed_size as usize, "entry data")?;

        let data = if deflated {
            inflate(&raw, uncompressed_size)?
        } else {
            raw
        };

        if self.options.verify_crc {
            let actual = crc32fast::hash(&data);
            if actual != entry.crc32 {
                return Err(Error::format(format!(
                    "crc32 mismatch for {}: expected {:08x}, got {actual:08x}",
                    entry.file_name, entry.crc32
                )));
            }
        }

        Ok(data)
    }

    /// Materialize every entry in central directory order.
    ///
    /// A failing entry does not stop the walk: its error is reported to the
    /// observer and returned in its [`ExtractedEntry`].
    ///
    /// # Returns
    ///
    /// One [`ExtractedEntry`] per directory record, minus `__MACOSX/` entries
    /// when [`ReadOptions::skip_macos_metadata`] is set.
    pub fn extract_all(&mut self) -> Vec<ExtractedEntry> {
        let entries = self.entries.clone();
        let mut results = Vec::with_capacity(entries.len());

        for entry in entries {
            if self.options.skip_macos_metadata && entry.is_macos_metadata() {
                self.observer.entry_skipped(&entry);
                continue;
            }

            let data = self.extract_to_memory(&entry);
            match &data {
                Ok(bytes) => self.observer.entry_extracted(&entry, bytes.len()),
                Err(e) => self.observer.entry_failed(&entry, e),
            }
            results.push(ExtractedEntry { entry, data });
        }

        results
    }

    /// Extract file to disk, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Any error from [`extract_to_memory`](Self::extract_to_memory), or an
    /// I/O error if the directories or the file cannot be written.
    pub fn extract_to_file(&mut self, entry: &ZipFileEntry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let data = self.extract_to_memory(entry)?;
        std::fs::write(output_path, &data)?;
        Ok(())
    }

    /// Extract file into any writer, e.g. stdout.
    pub fn extract_to_writer<W: Write>(&mut self, entry: &ZipFileEntry, out: &mut W) -> Result<()> {
        let data = self.extract_to_memory(entry)?;
        out.write_all(&data)?;
        Ok(())
    }
}

/// Inflate a raw deflate stream that must decode to exactly `expected` bytes.
fn inflate(raw: &[u8], expected: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    // One byte of slack is enough to notice an overlong stream without
    // decoding all of it.
    DeflateDecoder::new(raw)
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::format(format!("corrupt deflate stream: {e}")))?;

    if out.len() != expected as usize {
        return Err(Error::format(format!(
            "size mismatch: got {}, expected {expected}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::structures::{DosDateTime, LocalFileHeader};
    use crate::zip::{WriterOptions, ZipWriter};
    use std::io::Cursor;

    fn stored(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Vec::new());
        for (name, data) in entries {
            writer.add_entry(name, data.as_bytes()).unwrap();
        }
        writer.close().unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        skipped: Vec<String>,
        failed: Vec<String>,
        extracted: Vec<String>,
        deferred: usize,
    }

    impl ReadObserver for Recorder {
        fn sizes_from_directory(&mut self, _entry: &ZipFileEntry) {
            self.deferred += 1;
        }

        fn entry_extracted(&mut self, entry: &ZipFileEntry, _len: usize) {
            self.extracted.push(entry.file_name.clone());
        }

        fn entry_skipped(&mut self, entry: &ZipFileEntry) {
            self.skipped.push(entry.file_name.clone());
        }

        fn entry_failed(&mut self, entry: &ZipFileEntry, _error: &Error) {
            self.failed.push(entry.file_name.clone());
        }
    }

    #[test]
    fn extracts_stored_entries() {
        let bytes = stored(&[("hello.txt", "Hello, World!"), ("data.txt", "Some data here")]);
        let mut zip = ZipExtractor::new(Cursor::new(bytes)).unwrap();
        let entries = zip.list_files().to_vec();

        assert_eq!(zip.extract_to_memory(&entries[0]).unwrap(), b"Hello, World!");
        assert_eq!(zip.extract_to_memory(&entries[1]).unwrap(), b"Some data here");
    }

    #[test]
    fn unknown_method_is_unsupported() {
        let mut bytes = stored(&[("a.txt", "abc")]);
        // Local header method field.
        bytes[8..10].copy_from_slice(&12u16.to_le_bytes());

        let mut zip = ZipExtractor::new(Cursor::new(bytes)).unwrap();
        let entry = zip.list_files()[0].clone();
        assert!(matches!(zip.extract_to_memory(&entry), Err(Error::Unsupported(_))));
    }

    #[test]
    fn bad_local_signature_is_a_format_error() {
        let mut bytes = stored(&[("a.txt", "abc")]);
        bytes[0] = b'X';

        let mut zip = ZipExtractor::new(Cursor::new(bytes)).unwrap();
        let entry = zip.list_files()[0].clone();
        assert!(matches!(zip.extract_to_memory(&entry), Err(Error::Format(_))));
    }

    #[test]
    fn crc_is_only_checked_when_enabled() {
        let mut bytes = stored(&[("a.txt", "abc")]);
        // Flip a payload byte: local header (30) + name (5).
        bytes[35] = b'X';

        let mut lenient = ZipExtractor::new(Cursor::new(bytes.clone())).unwrap();
        let entry = lenient.list_files()[0].clone();
        assert_eq!(lenient.extract_to_memory(&entry).unwrap(), b"Xbc");

        let options = ReadOptions {
            verify_crc: true,
            ..Default::default()
        };
        let mut strict = ZipExtractor::with_options(Cursor::new(bytes), options, ()).unwrap();
        assert!(matches!(strict.extract_to_memory(&entry), Err(Error::Format(_))));
    }

    #[test]
    fn deflate_entries_round_trip() {
        let options = WriterOptions {
            method: CompressionMethod::Deflate,
            ..Default::default()
        };
        let mut writer = ZipWriter::with_options(Vec::new(), options);
        let text = "deflate me ".repeat(500);
        writer.add_entry("d.txt", text.as_bytes()).unwrap();
        let bytes = writer.close().unwrap();

        let mut zip = ZipExtractor::new(Cursor::new(bytes)).unwrap();
        let entry = zip.list_files()[0].clone();
        assert_eq!(entry.compression_method, CompressionMethod::Deflate);
        assert_eq!(zip.extract_to_memory(&entry).unwrap(), text.as_bytes());
    }

    #[test]
    fn deflate_size_mismatch_is_a_format_error() {
        let options = WriterOptions {
            method: CompressionMethod::Deflate,
            modified: Some(DosDateTime::default()),
            ..Default::default()
        };
        let mut writer = ZipWriter::with_options(Vec::new(), options);
        writer.add_entry("d.txt", &[7u8; 300]).unwrap();
        let mut bytes = writer.close().unwrap();
        // Local uncompressed size claims one byte more than the stream holds.
        bytes[22..26].copy_from_slice(&301u32.to_le_bytes());

        let mut zip = ZipExtractor::new(Cursor::new(bytes)).unwrap();
        let entry = zip.list_files()[0].clone();
        assert!(matches!(zip.extract_to_memory(&entry), Err(Error::Format(_))));
    }

    #[test]
    fn deferred_sizes_come_from_central_directory() {
        let mut bytes = stored(&[("s.txt", "streamed")]);
        let mut lfh = LocalFileHeader::from_bytes(&bytes).unwrap();
        lfh.flags |= FLAG_DATA_DESCRIPTOR;
        lfh.compressed_size = 0;
        lfh.uncompressed_size = 0;
        lfh.file_name = b"s.txt".to_vec();
        let mut header = Vec::new();
        lfh.write_to(&mut header).unwrap();
        bytes[..header.len()].copy_from_slice(&header);

        let mut zip = ZipExtractor::with_options(
            Cursor::new(bytes),
            ReadOptions::default(),
            Recorder::default(),
        )
        .unwrap();
        let entry = zip.list_files()[0].clone();
        assert_eq!(zip.extract_to_memory(&entry).unwrap(), b"streamed");
        assert_eq!(zip.observer().deferred, 1);
    }

    #[test]
    fn zero_local_size_without_flag_is_trusted() {
        let mut bytes = stored(&[("s.txt", "streamed")]);
        bytes[18..26].copy_from_slice(&[0; 8]);

        let mut zip = ZipExtractor::new(Cursor::new(bytes)).unwrap();
        let entry = zip.list_files()[0].clone();
        assert_eq!(zip.extract_to_memory(&entry).unwrap(), b"");
    }

    #[test]
    fn extract_all_continues_past_a_broken_entry() {
        let mut bytes = stored(&[("a.txt", "one"), ("b.txt", "two"), ("c.txt", "three")]);
        // Break the second local header signature: first entry is 30 + 5 + 3.
        bytes[38] = b'X';

        let mut zip = ZipExtractor::with_options(
            Cursor::new(bytes),
            ReadOptions::default(),
            Recorder::default(),
        )
        .unwrap();
        let results = zip.extract_all();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].data.as_ref().unwrap(), b"one");
        assert!(matches!(results[1].data, Err(Error::Format(_))));
        assert_eq!(results[2].data.as_ref().unwrap(), b"three");
        assert_eq!(zip.observer().failed, vec!["b.txt"]);
        assert_eq!(zip.observer().extracted, vec!["a.txt", "c.txt"]);
    }

    #[test]
    fn extract_all_skips_macos_metadata_when_asked() {
        let bytes = stored(&[("a.txt", "one"), ("__MACOSX/._a.txt", "fork")]);

        let mut all = ZipExtractor::new(Cursor::new(bytes.clone())).unwrap();
        assert_eq!(all.extract_all().len(), 2);

        let options = ReadOptions {
            skip_macos_metadata: true,
            ..Default::default()
        };
        let mut zip =
            ZipExtractor::with_options(Cursor::new(bytes), options, Recorder::default()).unwrap();
        let results = zip.extract_all();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.file_name, "a.txt");
        assert_eq!(zip.observer().skipped, vec!["__MACOSX/._a.txt"]);
    }

    #[test]
    fn extract_to_file_creates_parent_directories() {
        let bytes = stored(&[("nested/dir/f.txt", "content")]);
        let mut zip = ZipExtractor::new(Cursor::new(bytes)).unwrap();
        let entry = zip.list_files()[0].clone();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(&entry.file_name);
        zip.extract_to_file(&entry, &out).unwrap();
        assert_eq!(std::fs::read(out).unwrap(), b"content");
    }
}
