//! # zipkit
//!
//! A ZIP archive writer and reader implemented directly against the PKWARE
//! APPNOTE layout.
//!
//! The writer streams entries to any [`std::io::Write`] sink and keeps only
//! per-entry metadata in memory. The reader works on any source that
//! implements [`ReadAt`]: every `Read + Seek` type does, and
//! [`LocalFileReader`] uses positional reads on a file.
//!
//! ## Features
//!
//! - Single-pass writing with STORED (default) or DEFLATE entries
//! - Backward EOCD scan that copes with archive comments
//! - STORED and DEFLATE extraction, including entries with deferred sizes
//! - UTF-8 file names and archive comments
//! - Optional CRC-32 verification and a pluggable diagnostics observer
//!
//! ## Example
//!
//! ```
//! use std::io::Cursor;
//! use zipkit::{ZipExtractor, ZipWriter};
//!
//! let mut writer = ZipWriter::new(Vec::new());
//! writer.add_entry("hello.txt", b"Hello, World!")?;
//! writer.add_entry("data.txt", b"Some data here")?;
//! let bytes = writer.close()?;
//!
//! let mut zip = ZipExtractor::new(Cursor::new(bytes))?;
//! let entries = zip.list_files().to_vec();
//! assert_eq!(entries.len(), 2);
//! assert_eq!(zip.extract_to_memory(&entries[0])?, b"Hello, World!");
//! # Ok::<(), zipkit::Error>(())
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{LocalFileReader, ReadAt};
pub use zip::{
    CompressionMethod, DosDateTime, ExtractedEntry, LogObserver, ReadObserver, ReadOptions,
    WriterOptions, ZipExtractor, ZipFileEntry, ZipWriter,
};
