use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::error::{Error, Result};

/// General purpose flag: sizes and CRC follow the payload in a data
/// descriptor, so the local header values are not authoritative.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// General purpose flag: the file name is encoded as UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Version needed to extract: 2.0 (deflate, folders).
pub const VERSION_NEEDED: u16 = 20;

/// Version made by: host Unix (3), APPNOTE version 2.0.
pub const VERSION_MADE_BY_UNIX: u16 = 0x0314;

/// External attributes: Unix regular file with mode 0644.
pub const UNIX_REGULAR_FILE_0644: u32 = 0x81A4_0000;

/// Prefix of the resource-fork entries macOS Finder adds to archives.
pub const MACOS_METADATA_PREFIX: &[u8] = b"__MACOSX/";

/// Largest value any 16-bit length or count field can hold.
pub const MAX_U16_FIELD: usize = u16::MAX as usize;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Last-modified timestamp in the MS-DOS packed representation.
///
/// Date: `(year - 1980) << 9 | month << 5 | day`.
/// Time: `hour << 11 | minute << 5 | second / 2`.
///
/// Odd seconds are truncated; years outside 1980..=2107 are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    pub fn from_parts(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let year = (year - 1980).clamp(0, 127) as u16;
        let date = year << 9 | (month as u16 & 0x0F) << 5 | (day as u16 & 0x1F);
        let time = (hour as u16 & 0x1F) << 11 | (minute as u16 & 0x3F) << 5 | (second as u16 / 2);
        Self { time, date }
    }

    pub fn from_datetime(dt: time::PrimitiveDateTime) -> Self {
        Self::from_parts(
            dt.year(),
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
        )
    }

    /// Current wall-clock time, in the local offset when the platform can
    /// report it and UTC otherwise.
    pub fn now() -> Self {
        let now = time::OffsetDateTime::now_local()
            .unwrap_or_else(|_| time::OffsetDateTime::now_utc());
        Self::from_datetime(time::PrimitiveDateTime::new(now.date(), now.time()))
    }

    /// Parse modification date to (year, month, day)
    pub fn date_parts(&self) -> (u16, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn time_parts(&self) -> (u8, u8, u8) {
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

fn check_signature(data: &[u8], signature: &[u8], what: &str) -> Result<()> {
    if &data[0..4] != signature {
        return Err(Error::format(format!(
            "invalid {what} signature: {:02x?}",
            &data[0..4]
        )));
    }
    Ok(())
}

fn field_len(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| Error::invalid(format!("{what} is too long ({len} bytes, max 65535)")))
}

/// Local File Header (LFH) - 30 bytes + name + extra field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIGNATURE_U32: u32 = 0x0403_4b50;
    /// Width of the fields between the signature and the file name.
    pub const FIXED_SIZE: usize = 26;
    pub const SIZE: usize = 4 + Self::FIXED_SIZE;

    /// Decode the signature and fixed fields. The variable-length name and
    /// extra field are left empty; their declared lengths are returned in
    /// `file_name_length` and `extra_field_length`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::format("truncated local file header"));
        }
        check_signature(data, Self::SIGNATURE, "local file header")?;

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: cursor.read_u16::<LittleEndian>()?,
            last_modified: DosDateTime {
                time: cursor.read_u16::<LittleEndian>()?,
                date: cursor.read_u16::<LittleEndian>()?,
            },
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
            file_name: Vec::new(),
            extra_field: Vec::new(),
        })
    }

    /// Number of name and extra-field bytes that follow the fixed fields.
    pub fn variable_size(&self) -> usize {
        self.file_name_length as usize + self.extra_field_length as usize
    }

    /// Fill in the variable-length fields from the bytes that follow the
    /// fixed part; `data` must be exactly [`variable_size`](Self::variable_size) long.
    pub fn set_variable(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != self.variable_size() {
            return Err(Error::format("local file header name/extra length mismatch"));
        }
        let (name, extra) = data.split_at(self.file_name_length as usize);
        self.file_name = name.to_vec();
        self.extra_field = extra.to_vec();
        Ok(())
    }

    /// Total encoded size of the header, excluding the payload.
    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.file_name.len() + self.extra_field.len()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let name_len = field_len(self.file_name.len(), "file name")?;
        let extra_len = field_len(self.extra_field.len(), "extra field")?;
        if name_len != self.file_name_length || extra_len != self.extra_field_length {
            return Err(Error::invalid("declared name/extra lengths do not match the data"));
        }

        w.write_u32::<LittleEndian>(Self::SIGNATURE_U32)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.compression_method)?;
        w.write_u16::<LittleEndian>(self.last_modified.time)?;
        w.write_u16::<LittleEndian>(self.last_modified.date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u16::<LittleEndian>(self.file_name_length)?;
        w.write_u16::<LittleEndian>(self.extra_field_length)?;
        w.write_all(&self.file_name)?;
        w.write_all(&self.extra_field)?;
        Ok(())
    }
}

/// Central Directory File Header (CDFH) - 46 bytes + name + extra + comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub lfh_offset: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
    pub file_comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const SIGNATURE_U32: u32 = 0x0201_4b50;
    pub const FIXED_SIZE: usize = 42;
    pub const SIZE: usize = 4 + Self::FIXED_SIZE;

    /// Decode the signature and fixed fields; variable-length fields are
    /// filled in afterwards with [`set_variable`](Self::set_variable).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::format("truncated central directory file header"));
        }
        check_signature(data, Self::SIGNATURE, "central directory file header")?;

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: cursor.read_u16::<LittleEndian>()?,
            last_modified: DosDateTime {
                time: cursor.read_u16::<LittleEndian>()?,
                date: cursor.read_u16::<LittleEndian>()?,
            },
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
            file_comment_length: cursor.read_u16::<LittleEndian>()?,
            disk_number_start: cursor.read_u16::<LittleEndian>()?,
            internal_attrs: cursor.read_u16::<LittleEndian>()?,
            external_attrs: cursor.read_u32::<LittleEndian>()?,
            lfh_offset: cursor.read_u32::<LittleEndian>()?,
            file_name: Vec::new(),
            extra_field: Vec::new(),
            file_comment: Vec::new(),
        })
    }

    pub fn variable_size(&self) -> usize {
        self.file_name_length as usize
            + self.extra_field_length as usize
            + self.file_comment_length as usize
    }

    pub fn set_variable(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != self.variable_size() {
            return Err(Error::format("central directory name/extra/comment length mismatch"));
        }
        let (name, rest) = data.split_at(self.file_name_length as usize);
        let (extra, comment) = rest.split_at(self.extra_field_length as usize);
        self.file_name = name.to_vec();
        self.extra_field = extra.to_vec();
        self.file_comment = comment.to_vec();
        Ok(())
    }

    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.file_name.len() + self.extra_field.len() + self.file_comment.len()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let name_len = field_len(self.file_name.len(), "file name")?;
        let extra_len = field_len(self.extra_field.len(), "extra field")?;
        let comment_len = field_len(self.file_comment.len(), "file comment")?;
        if name_len != self.file_name_length
            || extra_len != self.extra_field_length
            || comment_len != self.file_comment_length
        {
            return Err(Error::invalid("declared name/extra/comment lengths do not match the data"));
        }

        w.write_u32::<LittleEndian>(Self::SIGNATURE_U32)?;
        w.write_u16::<LittleEndian>(self.version_made_by)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.compression_method)?;
        w.write_u16::<LittleEndian>(self.last_modified.time)?;
        w.write_u16::<LittleEndian>(self.last_modified.date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u16::<LittleEndian>(self.file_name_length)?;
        w.write_u16::<LittleEndian>(self.extra_field_length)?;
        w.write_u16::<LittleEndian>(self.file_comment_length)?;
        w.write_u16::<LittleEndian>(self.disk_number_start)?;
        w.write_u16::<LittleEndian>(self.internal_attrs)?;
        w.write_u32::<LittleEndian>(self.external_attrs)?;
        w.write_u32::<LittleEndian>(self.lfh_offset)?;
        w.write_all(&self.file_name)?;
        w.write_all(&self.extra_field)?;
        w.write_all(&self.file_comment)?;
        Ok(())
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIGNATURE_U32: u32 = 0x0605_4b50;
    pub const FIXED_SIZE: usize = 18;
    pub const SIZE: usize = 4 + Self::FIXED_SIZE;

    /// Maximum ZIP comment size allowed by the format (65535 bytes).
    pub const MAX_COMMENT_SIZE: usize = MAX_U16_FIELD;

    /// Decode a trailer. `data` starts at the signature; the comment is
    /// taken from the bytes after the fixed part, truncated to what is
    /// available.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::format("truncated end of central directory record"));
        }
        check_signature(data, Self::SIGNATURE, "end of central directory")?;

        let mut cursor = Cursor::new(&data[4..]);

        let mut eocd = Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
            comment: Vec::new(),
        };

        let rest = &data[Self::SIZE..];
        let available = rest.len().min(eocd.comment_len as usize);
        eocd.comment = rest[..available].to_vec();
        Ok(eocd)
    }

    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.comment.len()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let comment_len = field_len(self.comment.len(), "archive comment")?;
        if comment_len != self.comment_len {
            return Err(Error::invalid("declared comment length does not match the data"));
        }

        w.write_u32::<LittleEndian>(Self::SIGNATURE_U32)?;
        w.write_u16::<LittleEndian>(self.disk_number)?;
        w.write_u16::<LittleEndian>(self.disk_with_cd)?;
        w.write_u16::<LittleEndian>(self.disk_entries)?;
        w.write_u16::<LittleEndian>(self.total_entries)?;
        w.write_u32::<LittleEndian>(self.cd_size)?;
        w.write_u32::<LittleEndian>(self.cd_offset)?;
        w.write_u16::<LittleEndian>(self.comment_len)?;
        w.write_all(&self.comment)?;
        Ok(())
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipFileEntry {
    /// Name decoded for display; invalid UTF-8 is replaced.
    pub file_name: String,
    /// Name exactly as stored in the central directory.
    pub raw_name: Vec<u8>,
    pub compression_method: CompressionMethod,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub crc32: u32,
    pub lfh_offset: u32,
    pub last_modified: DosDateTime,
    pub flags: u16,
    pub version_made_by: u16,
    pub external_attrs: u32,
    pub comment: Vec<u8>,
    pub is_directory: bool,
}

impl ZipFileEntry {
    pub fn is_utf8(&self) -> bool {
        self.flags & FLAG_UTF8 != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Whether this is one of the `__MACOSX/` entries Finder adds.
    pub fn is_macos_metadata(&self) -> bool {
        self.raw_name.starts_with(MACOS_METADATA_PREFIX)
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        self.last_modified.date_parts()
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        self.last_modified.time_parts()
    }
}

impl From<CentralDirectoryHeader> for ZipFileEntry {
    fn from(cdfh: CentralDirectoryHeader) -> Self {
        let file_name = String::from_utf8_lossy(&cdfh.file_name).into_owned();
        // Directory entries end with '/'
        let is_directory = file_name.ends_with('/');

        Self {
            file_name,
            raw_name: cdfh.file_name,
            compression_method: CompressionMethod::from_u16(cdfh.compression_method),
            compressed_size: cdfh.compressed_size,
            uncompressed_size: cdfh.uncompressed_size,
            crc32: cdfh.crc32,
            lfh_offset: cdfh.lfh_offset,
            last_modified: cdfh.last_modified,
            flags: cdfh.flags,
            version_made_by: cdfh.version_made_by,
            external_attrs: cdfh.external_attrs,
            comment: cdfh.file_comment,
            is_directory,
        }
    }
}
