//! nandump-dummy - In-memory dump device emulator for testing
//!
//! [`DummyNand`] behaves like the dump firmware on the other end of the
//! serial link: it echoes every command byte, answers the interactive
//! commands and, on `D`, streams a full dump of a synthetic NAND with the
//! same byte layout as the real device (banner line, `DUMP_START`, geometry
//! line, page records, `ERR` markers, `BLK=` lines sent back to back with
//! binary data, `DUMP_END`, prompt).

use std::time::Duration;

use nandump_core::protocol::{
    PageHeader, CMD_DUMP, CMD_GET_PAGE, CMD_READ_ID, CMD_RESET, CMD_SET_ADDR, CMD_SET_COUNT,
    CMD_STATUS, CMD_VERSION, DUMP_END, DUMP_START, FPGA_VERSION, MAX_ROW_ADDRESS,
};
use nandump_core::{ByteLink, EndOfScript, LinkError, LinkResult, ReplayLink};

/// Blocks between two `BLK=` progress lines
const PROGRESS_INTERVAL: u32 = 64;

/// Configuration for the emulated device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Data bytes per page
    pub page_data: u32,
    /// Spare bytes per page
    pub spare: u32,
    /// Pages per block
    pub pages_per_block: u32,
    /// Blocks in a full dump
    pub blocks: u32,
    /// Rows that fail to read and are sent as `ERR` markers
    pub bad_rows: Vec<u32>,
    /// Largest number of bytes returned by a single read
    pub read_chunk: usize,
    /// Value of the FPGA version register
    pub version: u32,
    /// NAND ID bytes
    pub id: [u8; 5],
    /// Close the link after this many bytes of dump output
    pub cut_after: Option<usize>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            page_data: 2048,
            spare: 64,
            pages_per_block: 4,
            blocks: 2,
            bad_rows: Vec::new(),
            read_chunk: 512,
            version: FPGA_VERSION,
            id: [0xEC, 0xD3, 0x51, 0x95, 0x58], // Samsung K9F8G08
            cut_after: None,
        }
    }
}

impl DummyConfig {
    /// Bytes of a full page (data + spare)
    pub fn page_total(&self) -> u32 {
        self.page_data + self.spare
    }

    /// Number of rows in a full dump
    pub fn rows(&self) -> u32 {
        self.blocks * self.pages_per_block
    }
}

/// Synthetic contents of a page
pub fn page_content(row: u32, len: usize) -> Vec<u8> {
    let seed = row.wrapping_mul(0x9E37_79B9);
    (0..len)
        .map(|i| (seed >> ((i % 4) * 8)) as u8 ^ (i as u8))
        .collect()
}

/// Argument bytes still expected by a command
#[derive(Debug)]
enum Pending {
    Addr(Vec<u8>),
    Count(Vec<u8>),
}

/// Emulated dump device
pub struct DummyNand {
    config: DummyConfig,
    output: ReplayLink,
    pending: Option<Pending>,
    addr_col: u32,
    addr_row: u32,
    rd_count: u32,
    commands: Vec<u8>,
    closed: bool,
}

impl DummyNand {
    /// Create a new emulator with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let output = ReplayLink::new()
            .max_chunk(config.read_chunk)
            .end_with(EndOfScript::Silence);
        let rd_count = config.page_total();
        Self {
            config,
            output,
            pending: None,
            addr_col: 0,
            addr_row: 0,
            rd_count,
            commands: Vec::new(),
            closed: false,
        }
    }

    /// Create a new emulator with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Command bytes received so far
    pub fn commands(&self) -> &[u8] {
        &self.commands
    }

    /// The file contents a complete capture of this device must produce
    pub fn expected_image(&self) -> Vec<u8> {
        let len = self.config.page_total() as usize;
        (0..self.config.rows())
            .filter(|row| !self.config.bad_rows.contains(row))
            .flat_map(|row| page_content(row, len))
            .collect()
    }

    /// Everything the device sends for a full dump, after the echo
    pub fn dump_stream(&self) -> Vec<u8> {
        let cfg = &self.config;
        let page_total = cfg.page_total();
        let mut out = Vec::new();

        out.extend_from_slice(b"Starting full dump. Ensure host receiver is running.\r\n");
        out.extend_from_slice(DUMP_START.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(
            format!(
                "  page_data={:08X} spare={:08X} pages/blk={:08X} blocks={:08X}\r\n",
                cfg.page_data, cfg.spare, cfg.pages_per_block, cfg.blocks
            )
            .as_bytes(),
        );

        for block in 0..cfg.blocks {
            for page in 0..cfg.pages_per_block {
                let row = block * cfg.pages_per_block + page;
                if cfg.bad_rows.contains(&row) {
                    out.extend_from_slice(&PageHeader::error(0xFFFF_FFFF).encode());
                    continue;
                }
                out.extend_from_slice(&PageHeader::page(page_total, row & MAX_ROW_ADDRESS).encode());
                out.extend_from_slice(&page_content(row, page_total as usize));
            }

            if block % PROGRESS_INTERVAL == 0 {
                out.extend_from_slice(format!("\r\nBLK={:08X}\r\n", block).as_bytes());
            }
        }

        out.extend_from_slice(DUMP_END.as_bytes());
        out.extend_from_slice(b"\r\n");
        out
    }

    fn send(&mut self, data: impl Into<Vec<u8>>) {
        self.output.push_data(data);
    }

    fn send_prompt(&mut self) {
        self.send(*b"> ");
    }

    fn handle_command(&mut self, cmd: u8) {
        self.commands.push(cmd);
        self.send(vec![cmd, b'\r', b'\n']);

        match cmd.to_ascii_uppercase() {
            CMD_RESET => self.send(*b"OK:RESET\r\n"),
            CMD_READ_ID => {
                let id = self.config.id;
                let id_lo = u32::from_le_bytes([id[0], id[1], id[2], id[3]]);
                let text = format!(
                    "ID:{:08X} {:08X}\r\n  Maker=0x{:08X} Device=0x{:08X}\r\n  PageSize={:08X} BlockPages={:08X} Spare/512={:08X}\r\n",
                    id_lo,
                    id[4],
                    id[0],
                    id[1],
                    self.config.page_data,
                    self.config.pages_per_block,
                    self.config.spare * 512 / self.config.page_data.max(1)
                );
                self.send(text);
            }
            CMD_STATUS => self.send(*b"NAND_STATUS=0x000000E0\r\n"),
            CMD_GET_PAGE => {
                let len = self.rd_count;
                let mut data = format!("PAGE_OK bytes={:08X}\r\n", len).into_bytes();
                data.extend_from_slice(&len.to_le_bytes());
                let page = page_content(self.addr_row, (self.addr_col + len) as usize);
                data.extend_from_slice(&page[self.addr_col as usize..]);
                self.send(data);
            }
            CMD_DUMP => {
                log::debug!("Emulating dump of {} rows", self.config.rows());
                let mut stream = self.dump_stream();
                if let Some(cut) = self.config.cut_after {
                    stream.truncate(cut);
                    self.send(stream);
                    self.closed = true;
                    return;
                }
                self.send(stream);
            }
            CMD_SET_ADDR => {
                self.send(*b"Send 5 addr bytes (col_lo col_hi row0 row1 row2): ");
                self.pending = Some(Pending::Addr(Vec::with_capacity(5)));
                return;
            }
            CMD_SET_COUNT => {
                self.send(*b"Send 2 count bytes (lo hi): ");
                self.pending = Some(Pending::Count(Vec::with_capacity(2)));
                return;
            }
            CMD_VERSION => {
                let text = format!("VERSION=0x{:08X}\r\n", self.config.version);
                self.send(text);
            }
            b'\r' | b'\n' => {}
            _ => self.send(
                *b"Unknown command. R=Reset I=ID S=Status G=GetPage D=DumpAll A=SetAddr C=SetCount V=Version\r\n",
            ),
        }

        self.send_prompt();
    }

    fn handle_argument(&mut self, byte: u8) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        match pending {
            Pending::Addr(bytes) => {
                bytes.push(byte);
                if bytes.len() < 5 {
                    return;
                }
                self.addr_col = u32::from(bytes[0]) | (u32::from(bytes[1]) << 8);
                self.addr_row =
                    u32::from(bytes[2]) | (u32::from(bytes[3]) << 8) | (u32::from(bytes[4]) << 16);
                let text = format!(
                    "ADDR_COL=0x{:08X} ADDR_ROW=0x{:08X}\r\n",
                    self.addr_col, self.addr_row
                );
                self.send(text);
            }
            Pending::Count(bytes) => {
                bytes.push(byte);
                if bytes.len() < 2 {
                    return;
                }
                self.rd_count = u32::from(bytes[0]) | (u32::from(bytes[1]) << 8);
                let text = format!("RD_COUNT=0x{:08X}\r\n", self.rd_count);
                self.send(text);
            }
        }

        self.pending = None;
        self.send_prompt();
    }
}

impl ByteLink for DummyNand {
    fn write(&mut self, data: &[u8]) -> LinkResult<()> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        for &byte in data {
            if self.pending.is_some() {
                self.handle_argument(byte);
            } else {
                self.handle_command(byte);
            }
            if self.closed {
                break;
            }
        }
        Ok(())
    }

    fn read_up_to(&mut self, buf: &mut [u8], timeout: Duration) -> LinkResult<usize> {
        if self.closed && self.output.remaining() == 0 {
            return Err(LinkError::Closed);
        }
        self.output.read_up_to(buf, timeout)
    }

    fn description(&self) -> String {
        String::from("dummy")
    }
}
