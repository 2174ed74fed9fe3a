//! Optional diagnostics for the read path.
//!
//! The parser and extractor never print. Anything worth reporting is handed
//! to a [`ReadObserver`]; the default `()` observer drops everything and
//! [`LogObserver`] forwards to the `log` facade.

use crate::error::Error;

use super::structures::{EndOfCentralDirectory, LocalFileHeader, ZipFileEntry};

/// Receives events while an archive is parsed and extracted.
///
/// All methods have empty default bodies.
pub trait ReadObserver {
    fn trailer_found(&mut self, _offset: u64, _eocd: &EndOfCentralDirectory) {}

    fn directory_entry(&mut self, _offset: u64, _entry: &ZipFileEntry) {}

    fn local_header(&mut self, _entry: &ZipFileEntry, _lfh: &LocalFileHeader) {}

    fn sizes_from_directory(&mut self, _entry: &ZipFileEntry) {}

    fn entry_extracted(&mut self, _entry: &ZipFileEntry, _len: usize) {}

    fn entry_skipped(&mut self, _entry: &ZipFileEntry) {}

    fn entry_failed(&mut self, _entry: &ZipFileEntry, _error: &Error) {}
}

impl ReadObserver for () {}

/// Forwards read events to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ReadObserver for LogObserver {
    fn trailer_found(&mut self, offset: u64, eocd: &EndOfCentralDirectory) {
        log::debug!(
            "end of central directory at {offset}: {} entries, directory {} bytes at {}, comment {} bytes",
            eocd.total_entries,
            eocd.cd_size,
            eocd.cd_offset,
            eocd.comment_len
        );
    }

    fn directory_entry(&mut self, offset: u64, entry: &ZipFileEntry) {
        log::debug!(
            "central directory record at {offset}: {} (method {}, {} -> {} bytes, local header at {})",
            entry.file_name,
            entry.compression_method.as_u16(),
            entry.compressed_size,
            entry.uncompressed_size,
            entry.lfh_offset
        );
    }

    fn local_header(&mut self, entry: &ZipFileEntry, lfh: &LocalFileHeader) {
        log::debug!(
            "local header for {}: flags {:04x}, method {}, crc {:08x}, sizes {}/{}, extra {} bytes",
            entry.file_name,
            lfh.flags,
            lfh.compression_method,
            lfh.crc32,
            lfh.compressed_size,
            lfh.uncompressed_size,
            lfh.extra_field_length
        );
    }

    fn sizes_from_directory(&mut self, entry: &ZipFileEntry) {
        log::debug!(
            "{}: local sizes deferred to data descriptor, using central directory sizes",
            entry.file_name
        );
    }

    fn entry_extracted(&mut self, entry: &ZipFileEntry, len: usize) {
        log::debug!("extracted {} ({len} bytes)", entry.file_name);
    }

    fn entry_skipped(&mut self, entry: &ZipFileEntry) {
        log::debug!("skipping {}", entry.file_name);
    }

    fn entry_failed(&mut self, entry: &ZipFileEntry, error: &Error) {
        log::warn!("error extracting {}: {error}", entry.file_name);
    }
}
