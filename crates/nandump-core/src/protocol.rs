//! NAND dump protocol constants and types
//!
//! The device firmware answers single-byte commands with CRLF-terminated
//! text. A dump (`D`) is framed by the `DUMP_START` and `DUMP_END` lines;
//! between them every NAND page is sent as a 7-byte binary header followed
//! by the raw page bytes, and a `BLK=` progress line is emitted every 64
//! blocks.

/// Start a full dump
pub const CMD_DUMP: u8 = b'D';
/// Query the FPGA design version
pub const CMD_VERSION: u8 = b'V';
/// Reset the NAND device
pub const CMD_RESET: u8 = b'R';
/// Read the NAND ID
pub const CMD_READ_ID: u8 = b'I';
/// Read the NAND status register
pub const CMD_STATUS: u8 = b'S';
/// Read a single page at the current address
pub const CMD_GET_PAGE: u8 = b'G';
/// Set the column/row address (followed by 5 address bytes)
pub const CMD_SET_ADDR: u8 = b'A';
/// Set the read byte count (followed by 2 count bytes)
pub const CMD_SET_COUNT: u8 = b'C';

/// Line announcing the start of the binary dump
pub const DUMP_START: &str = "DUMP_START";
/// Line terminating the dump
pub const DUMP_END: &str = "DUMP_END";
/// Prefix of the progress lines interleaved with page records
pub const PROGRESS_MARKER: &str = "BLK=";
/// Prefix of the (trimmed) geometry line following `DUMP_START`
pub const GEOMETRY_PREFIX: &str = "page_data=";
/// Prefix of the version query answer
pub const VERSION_PREFIX: &str = "VERSION=";

/// Expected answer to the version query (ASCII "NAND")
pub const FPGA_VERSION: u32 = 0x4E41_4E44;

/// Size of a binary page header: 4-byte length + 3-byte row address
pub const HEADER_LEN: usize = 7;
/// Marker replacing the row address in an error record
pub const ERROR_MARKER: [u8; 3] = *b"ERR";
/// Largest page (data + spare) the firmware can send
pub const MAX_PAGE_BYTES: u32 = 32768;
/// Largest row address representable in the 24-bit header field
pub const MAX_ROW_ADDRESS: u32 = 0x00FF_FFFF;

/// Binary page header
///
/// For an error record (`is_error`), `payload_length` holds the raw
/// diagnostic word sent by the device instead of a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Number of page bytes that follow (or the diagnostic word)
    pub payload_length: u32,
    /// NAND row address of the page (24 bits)
    pub row_address: u32,
    /// Whether this is an error record
    pub is_error: bool,
}

impl PageHeader {
    /// Create a header for a normal page
    pub fn page(payload_length: u32, row_address: u32) -> Self {
        Self {
            payload_length,
            row_address: row_address & MAX_ROW_ADDRESS,
            is_error: false,
        }
    }

    /// Create an error record header carrying a diagnostic word
    pub fn error(diagnostic: u32) -> Self {
        Self {
            payload_length: diagnostic,
            row_address: 0,
            is_error: true,
        }
    }

    /// Decode a header from its wire representation
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let word = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if raw[4..7] == ERROR_MARKER {
            Self::error(word)
        } else {
            Self::page(word, u24_to_u32(&[raw[4], raw[5], raw[6]]))
        }
    }

    /// Encode the header in wire format
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut raw = [0u8; HEADER_LEN];
        raw[..4].copy_from_slice(&self.payload_length.to_le_bytes());
        if self.is_error {
            raw[4..].copy_from_slice(&ERROR_MARKER);
        } else {
            raw[4..].copy_from_slice(&self.row_address.to_le_bytes()[..3]);
        }
        raw
    }

    /// Diagnostic word of an error record
    pub fn diagnostic(&self) -> Option<u32> {
        self.is_error.then_some(self.payload_length)
    }

    /// Check the declared length against the default page bound
    pub fn is_valid(&self) -> bool {
        self.is_valid_within(MAX_PAGE_BYTES)
    }

    /// Check the declared length against `max_page_bytes`
    ///
    /// Only a header passing this check may be used to size a payload read.
    pub fn is_valid_within(&self, max_page_bytes: u32) -> bool {
        !self.is_error && self.payload_length > 0 && self.payload_length <= max_page_bytes
    }
}

/// A page header together with its fully received payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    /// Header as received
    pub header: PageHeader,
    /// Exactly `header.payload_length` bytes
    pub payload: Vec<u8>,
}

/// A decoded text line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    /// `DUMP_START`
    StartSentinel,
    /// `DUMP_END`
    EndSentinel,
    /// Geometry description following `DUMP_START` (kept verbatim)
    GeometryInfo(String),
    /// `BLK=<hex>` progress line
    ProgressUpdate(u32),
    /// Anything else
    Unrecognized(String),
}

impl ControlLine {
    /// Classify a single line (surrounding whitespace is ignored)
    pub fn classify(line: &str) -> Self {
        let line = line.trim();
        if line.contains(DUMP_END) {
            Self::EndSentinel
        } else if line.starts_with(DUMP_START) {
            Self::StartSentinel
        } else if line.starts_with(GEOMETRY_PREFIX) {
            Self::GeometryInfo(line.to_string())
        } else if let Some(hex) = line.strip_prefix(PROGRESS_MARKER) {
            match u32::from_str_radix(hex.trim(), 16) {
                Ok(block) => Self::ProgressUpdate(block),
                Err(_) => {
                    log::debug!("Ignoring malformed progress value {:?}", hex);
                    Self::Unrecognized(line.to_string())
                }
            }
        } else {
            Self::Unrecognized(line.to_string())
        }
    }
}

/// Extract the version word from a `VERSION=0x...` answer
pub fn parse_version_word(text: &str) -> Option<u32> {
    let start = text.find(VERSION_PREFIX)? + VERSION_PREFIX.len();
    let value = text[start..].trim_start();
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    let digits: &str = &hex[..hex
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(hex.len())];
    u32::from_str_radix(digits, 16).ok()
}

/// Convert a 24-bit little-endian value to u32
fn u24_to_u32(buf: &[u8; 3]) -> u32 {
    (buf[0] as u32) | ((buf[1] as u32) << 8) | ((buf[2] as u32) << 16)
}
