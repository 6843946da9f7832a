use std::fmt;
use std::ops::Range;

use super::consts::{
	BLOCKS,
	BLOCK_SIZE,
	SIZE,
};

// status register bits
const STATUS_WIP:      u8 = 0x01; // read only
const STATUS_WEL:      u8 = 0x02; // read only
const STATUS_BP_MASK:  u8 = 0x3c;
const STATUS_BP_SHIFT: u8 = 2;
const STATUS_RESERVED: u8 = 0x40;
const STATUS_SRP:      u8 = 0x80;

/// Bits the "Write Status" command actually changes.
pub const STATUS_WRITABLE: u8 = STATUS_SRP | STATUS_BP_MASK;

/// Block protect levels (BP[3:0]).
///
/// Upper* protects blocks counting down from block 31, Lower* counting up
/// from block 0; 6 to 9 are not assigned.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u8)]
pub enum BlockProtect {
	None = 0,
	Upper1 = 1,   // 31
	Upper2 = 2,   // 30 - 31
	Upper4 = 3,   // 28 - 31
	Upper8 = 4,   // 24 - 31
	Upper16 = 5,  // 16 - 31
	Lower16 = 10, // 0 - 15
	Lower24 = 11, // 0 - 23
	Lower28 = 12, // 0 - 27
	Lower30 = 13, // 0 - 29
	Lower31 = 14, // 0 - 30
	All = 15,
}

impl BlockProtect {
	pub const ALL_LEVELS: [BlockProtect; 12] = [
		BlockProtect::None,
		BlockProtect::Upper1,
		BlockProtect::Upper2,
		BlockProtect::Upper4,
		BlockProtect::Upper8,
		BlockProtect::Upper16,
		BlockProtect::Lower16,
		BlockProtect::Lower24,
		BlockProtect::Lower28,
		BlockProtect::Lower30,
		BlockProtect::Lower31,
		BlockProtect::All,
	];

	pub fn from_bits(bits: u8) -> Option<Self> {
		Some(match bits {
			0 => BlockProtect::None,
			1 => BlockProtect::Upper1,
			2 => BlockProtect::Upper2,
			3 => BlockProtect::Upper4,
			4 => BlockProtect::Upper8,
			5 => BlockProtect::Upper16,
			10 => BlockProtect::Lower16,
			11 => BlockProtect::Lower24,
			12 => BlockProtect::Lower28,
			13 => BlockProtect::Lower30,
			14 => BlockProtect::Lower31,
			15 => BlockProtect::All,
			_ => return None,
		})
	}

	pub fn bits(self) -> u8 {
		self as u8
	}

	/// Range of protected block numbers (empty for `None`).
	pub fn protected_blocks(self) -> Range<u32> {
		match self {
			BlockProtect::None => 0..0,
			BlockProtect::Upper1 => (BLOCKS - 1)..BLOCKS,
			BlockProtect::Upper2 => (BLOCKS - 2)..BLOCKS,
			BlockProtect::Upper4 => (BLOCKS - 4)..BLOCKS,
			BlockProtect::Upper8 => (BLOCKS - 8)..BLOCKS,
			BlockProtect::Upper16 => (BLOCKS - 16)..BLOCKS,
			BlockProtect::Lower16 => 0..16,
			BlockProtect::Lower24 => 0..24,
			BlockProtect::Lower28 => 0..28,
			BlockProtect::Lower30 => 0..30,
			BlockProtect::Lower31 => 0..31,
			BlockProtect::All => 0..BLOCKS,
		}
	}

	/// Whether the byte at `address` can't be programmed or erased.
	///
	/// Addresses are taken modulo the chip size like the chip does.
	pub fn is_protected(self, address: u32) -> bool {
		let block = (address % SIZE) / BLOCK_SIZE;
		self.protected_blocks().contains(&block)
	}
}

impl fmt::Display for BlockProtect {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let blocks = self.protected_blocks();
		if blocks.start == blocks.end {
			write!(f, "no blocks protected")
		} else {
			write!(f, "blocks {} - {} protected", blocks.start, blocks.end - 1)
		}
	}
}

/// Status register; the raw byte is the canonical representation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Status(pub u8);

impl Status {
	/// Write in progress: chip is busy with program/erase/write status.
	pub fn wip(&self) -> bool {
		0 != self.0 & STATUS_WIP
	}

	/// Write enable latch.
	pub fn wel(&self) -> bool {
		0 != self.0 & STATUS_WEL
	}

	pub fn block_protect_bits(&self) -> u8 {
		(self.0 & STATUS_BP_MASK) >> STATUS_BP_SHIFT
	}

	/// `None` for the unassigned encodings 6 - 9
	pub fn block_protect(&self) -> Option<BlockProtect> {
		BlockProtect::from_bits(self.block_protect_bits())
	}

	pub fn reserved(&self) -> bool {
		0 != self.0 & STATUS_RESERVED
	}

	/// Status register protect.
	pub fn srp(&self) -> bool {
		0 != self.0 & STATUS_SRP
	}

	pub fn with_block_protect_bits(self, bits: u8) -> Self {
		Status((self.0 & !STATUS_BP_MASK) | ((bits << STATUS_BP_SHIFT) & STATUS_BP_MASK))
	}

	pub fn with_block_protect(self, protect: BlockProtect) -> Self {
		self.with_block_protect_bits(protect.bits())
	}

	pub fn with_srp(self, srp: bool) -> Self {
		if srp {
			Status(self.0 | STATUS_SRP)
		} else {
			Status(self.0 & !STATUS_SRP)
		}
	}

	/// only the bits "Write Status" can change (SRP and BP)
	pub fn writable(self) -> Self {
		Status(self.0 & STATUS_WRITABLE)
	}
}

impl From<u8> for Status {
	fn from(v: u8) -> Self {
		Status(v)
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x}", self.0)
	}
}

impl fmt::Debug for Status {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x} (BP: {}", self.0, self.block_protect_bits())?;
		if self.wip() { write!(f, " [WIP]")?; }
		if self.wel() { write!(f, " [WEL]")?; }
		if self.reserved() { write!(f, " [RESERVED]")?; }
		if self.srp() { write!(f, " [SRP]")?; }
		write!(f, ")")
	}
}
