//! Command protocol for the Cypress S25FL216K, a 16-Mbit serial NOR flash
//! (2 MiB in 32 blocks of 64k, 512 sectors of 4k, 8192 pages of 256 bytes).
//!
//! Every command is one chip select bracket: CS low, opcode, optional
//! 3-byte big-endian address (plus one dummy byte for FAST READ), optional
//! data phase, CS high.
//!
//! Opcodes:
//! - 0x06: WREN (write enable, sets WEL)
//! - 0x04: WRDI (write disable, clears WEL)
//! - 0x05: RDSR (read status register), recv 1 byte
//! - 0x01: WRSR (write status register), send 1 byte; only SRP and BP[3:0]
//! - 0x03 @ address: READ, recv data
//! - 0x0B @ address + dummy: FAST READ, recv data
//! - 0x02 @ address: PP (page program), send up to 256 bytes; wraps within page
//! - 0x20 @ address: SE (erase 4k sector)
//! - 0xD8 @ address: BE (erase 64k block)
//! - 0xC7: CE (chip erase)
//! - 0xB9: DP (deep power down)
//! - 0xAB: RES (release from power down)
//! - 0x90 @ 0: REMS (manufacturer / device id), recv 2 bytes
//! - 0x9F: RDID (JEDEC id), recv 3 bytes
//!
//! The chip silently ignores commands it can't execute (missing WEL,
//! protected blocks, still busy); the codec doesn't check any of these.

pub mod consts;
mod error;
mod status;

use crate::transport::{
	ChipSelect,
	Transport,
};

pub use self::error::FlashError;
pub use self::status::{
	BlockProtect,
	Status,
	STATUS_WRITABLE,
};

use self::consts::*;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u8)]
pub enum Command {
	WriteEnable = 0x06,
	WriteDisable = 0x04,
	ReadStatus = 0x05,
	WriteStatus = 0x01,
	ReadData = 0x03,
	FastRead = 0x0B,
	PageProgram = 0x02,
	SectorErase = 0x20,
	BlockErase = 0xD8,
	ChipErase = 0xC7,
	PowerDown = 0xB9,
	ReleasePowerDown = 0xAB,
	DeviceId = 0x90,
	JedecId = 0x9F,
}

impl Command {
	pub fn opcode(self) -> u8 {
		self as u8
	}

	pub fn from_opcode(opcode: u8) -> Option<Self> {
		Some(match opcode {
			0x06 => Command::WriteEnable,
			0x04 => Command::WriteDisable,
			0x05 => Command::ReadStatus,
			0x01 => Command::WriteStatus,
			0x03 => Command::ReadData,
			0x0B => Command::FastRead,
			0x02 => Command::PageProgram,
			0x20 => Command::SectorErase,
			0xD8 => Command::BlockErase,
			0xC7 => Command::ChipErase,
			0xB9 => Command::PowerDown,
			0xAB => Command::ReleasePowerDown,
			0x90 => Command::DeviceId,
			0x9F => Command::JedecId,
			_ => return None,
		})
	}
}

/// Opcode followed by the 24-bit address, MSB first.
pub fn address_frame(command: Command, address: u32) -> [u8; 4] {
	[
		command.opcode(),
		(address >> 16) as u8,
		(address >> 8) as u8,
		address as u8,
	]
}

/// Like `address_frame`, with the trailing dummy byte FAST READ needs.
pub fn fast_read_frame(address: u32) -> [u8; 5] {
	let [opcode, hi, mid, lo] = address_frame(Command::FastRead, address);
	[opcode, hi, mid, lo, 0x00]
}

fn check_address(address: u32) -> crate::AResult<()> {
	if address > ADDRESS_MASK {
		return Err(FlashError::AddressOutOfRange { address }.into());
	}
	Ok(())
}

/// Result of "Read JEDEC ID".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct JedecId {
	pub manufacturer: u8,
	pub memory_type: u8,
	pub capacity: u8,
}

impl JedecId {
	/// `memory_type << 8 | capacity`, compare with `consts::JEDEC_ID`
	pub fn id(&self) -> u16 {
		(u16::from(self.memory_type) << 8) | u16::from(self.capacity)
	}
}

// one chip select bracket: selects on creation, deselects on drop
struct Transaction<'a, T: ?Sized + Transport + 'a>(&'a mut T);

impl<'a, T: ?Sized + Transport> Transaction<'a, T> {
	fn start(transport: &'a mut T) -> Self {
		transport.select(ChipSelect::Low);
		Transaction(transport)
	}

	fn write(&mut self, data: &[u8]) -> crate::AResult<()> {
		if data.is_empty() {
			return Ok(());
		}
		let actual = self.0.write(data);
		if actual != data.len() {
			return Err(FlashError::TransportIncomplete { expected: data.len(), actual }.into());
		}
		Ok(())
	}

	fn read(&mut self, data: &mut [u8]) -> crate::AResult<()> {
		if data.is_empty() {
			return Ok(());
		}
		let actual = self.0.read(data);
		if actual != data.len() {
			return Err(FlashError::TransportIncomplete { expected: data.len(), actual }.into());
		}
		Ok(())
	}
}

impl<'a, T: ?Sized + Transport> Drop for Transaction<'a, T> {
	fn drop(&mut self) {
		self.0.select(ChipSelect::High);
	}
}

/// S25FL216K command codec over a `Transport`.
///
/// Holds no state besides the transport; pass `&mut transport` to keep
/// ownership outside.
pub struct Flash<T: Transport> {
	transport: T,
}

impl<T: Transport> Flash<T> {
	pub fn new(transport: T) -> Self {
		Flash { transport }
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn into_inner(self) -> T {
		self.transport
	}

	fn command(&mut self, frame: &[u8]) -> crate::AResult<()> {
		trace!("S25FL216K: {:02x?}", frame);
		Transaction::start(&mut self.transport).write(frame)
	}

	fn command_read(&mut self, frame: &[u8], response: &mut [u8]) -> crate::AResult<()> {
		trace!("S25FL216K: {:02x?}, reading {} bytes", frame, response.len());
		let mut tx = Transaction::start(&mut self.transport);
		tx.write(frame)?;
		tx.read(response)
	}

	fn command_write(&mut self, frame: &[u8], data: &[u8]) -> crate::AResult<()> {
		trace!("S25FL216K: {:02x?}, writing {} bytes", frame, data.len());
		let mut tx = Transaction::start(&mut self.transport);
		tx.write(frame)?;
		tx.write(data)
	}

	/// Sets WEL; needed before every write status, program and erase command.
	pub fn write_enable(&mut self) -> crate::AResult<()> {
		self.command(&[Command::WriteEnable.opcode()])
	}

	/// Clears WEL; the chip also clears it after every completed write command.
	pub fn write_disable(&mut self) -> crate::AResult<()> {
		self.command(&[Command::WriteDisable.opcode()])
	}

	/// Can be read at any time, even while the chip is busy (WIP).
	pub fn read_status(&mut self) -> crate::AResult<Status> {
		let mut status = [0u8; 1];
		self.command_read(&[Command::ReadStatus.opcode()], &mut status)?;
		Ok(Status(status[0]))
	}

	/// Needs WEL. The chip only takes SRP and BP[3:0] from `status`; the
	/// byte is sent unmodified.
	pub fn write_status(&mut self, status: Status) -> crate::AResult<()> {
		self.command(&[Command::WriteStatus.opcode(), status.0])
	}

	/// Sequential read of `data.len()` bytes; ignored by the chip while WIP is set.
	pub fn read_data(&mut self, address: u32, data: &mut [u8]) -> crate::AResult<()> {
		check_address(address)?;
		self.command_read(&address_frame(Command::ReadData, address), data)
	}

	/// Same as `read_data`, but works at higher clock rates.
	pub fn fast_read(&mut self, address: u32, data: &mut [u8]) -> crate::AResult<()> {
		check_address(address)?;
		self.command_read(&fast_read_frame(address), data)
	}

	/// Program up to one page into erased (0xff) memory; needs WEL.
	///
	/// The address counter wraps at the end of the page: bytes beyond the
	/// remaining page length land at the start of the same page, not in the
	/// next one. Callers have to split writes at page boundaries.
	pub fn page_program(&mut self, address: u32, data: &[u8]) -> crate::AResult<()> {
		check_address(address)?;
		if data.len() > PAGE_SIZE as usize {
			return Err(FlashError::ProgramTooLong { len: data.len(), page_size: PAGE_SIZE }.into());
		}
		self.command_write(&address_frame(Command::PageProgram, address), data)
	}

	/// Erase the 4k sector containing `address`; needs WEL.
	pub fn sector_erase(&mut self, address: u32) -> crate::AResult<()> {
		check_address(address)?;
		self.command(&address_frame(Command::SectorErase, address))
	}

	/// Erase the 64k block containing `address`; needs WEL.
	pub fn block_erase(&mut self, address: u32) -> crate::AResult<()> {
		check_address(address)?;
		self.command(&address_frame(Command::BlockErase, address))
	}

	/// Needs WEL; not executed if any block is protected.
	pub fn chip_erase(&mut self) -> crate::AResult<()> {
		self.command(&[Command::ChipErase.opcode()])
	}

	/// After this the chip only listens to `release_power_down`.
	pub fn power_down(&mut self) -> crate::AResult<()> {
		self.command(&[Command::PowerDown.opcode()])
	}

	pub fn release_power_down(&mut self) -> crate::AResult<()> {
		self.command(&[Command::ReleasePowerDown.opcode()])
	}

	/// Returns (manufacturer id, device id)
	pub fn read_manufacturer_device_id(&mut self) -> crate::AResult<(u8, u8)> {
		let mut id = [0u8; 2];
		self.command_read(&address_frame(Command::DeviceId, 0), &mut id)?;
		Ok((id[0], id[1]))
	}

	/// Device id, should equal `consts::DEVICE_ID`
	pub fn read_device_id(&mut self) -> crate::AResult<u8> {
		Ok(self.read_manufacturer_device_id()?.1)
	}

	pub fn read_jedec_id_raw(&mut self) -> crate::AResult<JedecId> {
		let mut id = [0u8; 3];
		self.command_read(&[Command::JedecId.opcode()], &mut id)?;
		Ok(JedecId {
			manufacturer: id[0],
			memory_type: id[1],
			capacity: id[2],
		})
	}

	/// Memory type and capacity, should equal `consts::JEDEC_ID`
	pub fn read_jedec_id(&mut self) -> crate::AResult<u16> {
		Ok(self.read_jedec_id_raw()?.id())
	}
}
