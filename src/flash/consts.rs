/// Total memory bytes (16 Mbit).
pub const SIZE: u32 = 2_097_152;

pub const BLOCKS: u32 = 32;
pub const BLOCK_SIZE: u32 = SIZE / BLOCKS; // 64k

pub const SECTORS: u32 = 512;
pub const SECTOR_SIZE: u32 = SIZE / SECTORS; // 4k

pub const PAGES: u32 = 8192;
pub const PAGE_SIZE: u32 = SIZE / PAGES; // 256

/// Returned by "Read Device ID" (second response byte).
pub const DEVICE_ID: u8 = 0x14;

/// Memory type and capacity from "Read JEDEC ID", combined as `type << 8 | capacity`.
pub const JEDEC_ID: u16 = 0x4015;

/// Spansion / Cypress
pub const MANUFACTURER_ID: u8 = 0x01;

/// Largest address the 3-byte address phase can carry.
pub const ADDRESS_MASK: u32 = 0x00ff_ffff;
