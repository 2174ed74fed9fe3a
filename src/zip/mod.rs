//! ZIP archive writing, parsing and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: record layouts shared by both directions (EOCD, central
//!   and local headers, DOS timestamps)
//! - [`writer`]: single-pass archive writer
//! - [`parser`]: locating the EOCD and reading the central directory
//! - [`extractor`]: turning a directory entry back into its bytes
//! - [`observer`]: optional diagnostics hook for the read path
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and (possibly compressed) data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The writer produces them in that order. The reader goes the other way:
//! it finds the EOCD by scanning backwards, follows it to the Central
//! Directory, and only touches local headers when an entry is extracted.
//!
//! ## Supported Features
//!
//! - STORED and DEFLATE entries on read; STORED (default) or DEFLATE on write
//! - UTF-8 file names (general purpose flag bit 11)
//! - Entries whose local sizes were deferred to a data descriptor (bit 3)
//! - Archive comments
//!
//! ## Limitations
//!
//! - No ZIP64, so entries, offsets and the archive itself stay below 4 GiB
//! - No encryption
//! - No multi-disk archives
//! - Archives are written once; entries cannot be appended or removed later

pub mod extractor;
pub mod observer;
pub mod parser;
pub mod structures;
pub mod writer;

pub use extractor::{ExtractedEntry, ReadOptions, ZipExtractor};
pub use observer::{LogObserver, ReadObserver};
pub use parser::ZipParser;
pub use structures::*;
pub use writer::{WriterOptions, ZipWriter};
