use crate::flash::consts::*;
use crate::flash::{
	Command,
	Status,
	STATUS_WRITABLE,
};
use crate::transport::{
	ChipSelect,
	Transport,
};

const WIP: u8 = 0x01;
const WEL: u8 = 0x02;

/// Transport call as seen by the emulated chip.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BusEvent {
	Select(ChipSelect),
	Write(Vec<u8>),
	Read(usize),
}

const JEDEC_RESPONSE: [u8; 3] = [MANUFACTURER_ID, (JEDEC_ID >> 8) as u8, JEDEC_ID as u8];

/// In-memory S25FL216K behind a `Transport`.
///
/// Reads are answered while chip select is low; program, erase and write
/// status commands take effect when chip select goes high again, like on the
/// real chip. Commands the chip would ignore (no WEL, protected blocks, busy,
/// powered down) are ignored.
///
/// After a write command WIP stays set for `busy_polls` status reads
/// (0: the chip is done immediately).
pub struct EmulatedChip {
	memory: Vec<u8>,
	status: u8,
	powered_down: bool,
	busy_polls: u32,
	busy_remaining: u32,
	selected: bool,
	incoming: Vec<u8>,
	read_offset: usize,
	frames: Vec<Vec<u8>>,
	events: Vec<BusEvent>,
}

impl Default for EmulatedChip {
	fn default() -> Self {
		Self::new()
	}
}

impl EmulatedChip {
	/// Completely erased chip without protection.
	pub fn new() -> Self {
		EmulatedChip {
			memory: vec![0xff; SIZE as usize],
			status: 0,
			powered_down: false,
			busy_polls: 0,
			busy_remaining: 0,
			selected: false,
			incoming: Vec::new(),
			read_offset: 0,
			frames: Vec::new(),
			events: Vec::new(),
		}
	}

	pub fn from_image(image: Vec<u8>) -> crate::AResult<Self> {
		ensure!(image.len() == SIZE as usize, "image has {} bytes, chip has {}", image.len(), SIZE);
		Ok(EmulatedChip {
			memory: image,
			..Self::new()
		})
	}

	pub fn with_busy_polls(mut self, busy_polls: u32) -> Self {
		self.busy_polls = busy_polls;
		self
	}

	pub fn image(&self) -> &[u8] {
		&self.memory
	}

	pub fn into_image(self) -> Vec<u8> {
		self.memory
	}

	pub fn status(&self) -> Status {
		Status(self.status)
	}

	/// Set the status register directly, bypassing write enable and masks.
	pub fn set_status(&mut self, status: Status) {
		self.status = status.0;
	}

	pub fn is_powered_down(&self) -> bool {
		self.powered_down
	}

	/// Bytes written during each completed chip select bracket.
	pub fn frames(&self) -> &[Vec<u8>] {
		&self.frames
	}

	/// Every transport call in order, for checking chip select discipline.
	pub fn events(&self) -> &[BusEvent] {
		&self.events
	}

	/// Forget recorded frames and events.
	pub fn clear_frames(&mut self) {
		self.frames.clear();
		self.events.clear();
	}

	fn is_busy(&self) -> bool {
		0 != self.status & WIP
	}

	fn is_protected(&self, address: u32) -> bool {
		match self.status().block_protect() {
			Some(bp) => bp.is_protected(address),
			// unassigned BP encodings: don't touch anything
			None => true,
		}
	}

	fn address(&self) -> Option<u32> {
		if self.incoming.len() < 4 {
			return None;
		}
		let address = (u32::from(self.incoming[1]) << 16)
			| (u32::from(self.incoming[2]) << 8)
			| u32::from(self.incoming[3]);
		Some(address % SIZE)
	}

	fn response_byte(&self, command: Option<Command>, index: usize) -> u8 {
		match command {
			Some(Command::ReadStatus) => self.status,
			Some(Command::ReadData) | Some(Command::FastRead) => {
				let address_len = if command == Some(Command::FastRead) { 5 } else { 4 };
				match self.address() {
					Some(address) if self.incoming.len() >= address_len => {
						self.memory[(address as usize + index) % SIZE as usize]
					},
					_ => 0xff,
				}
			},
			Some(Command::DeviceId) if self.incoming.len() >= 4 => {
				if 0 == index % 2 { MANUFACTURER_ID } else { DEVICE_ID }
			},
			Some(Command::JedecId) => JEDEC_RESPONSE.get(index).cloned().unwrap_or(0xff),
			_ => 0xff,
		}
	}

	fn finish_write(&mut self) {
		self.status &= !WEL;
		if self.busy_polls > 0 {
			self.status |= WIP;
			self.busy_remaining = self.busy_polls;
		}
	}

	fn erase(&mut self, start: u32, len: u32) {
		let start = start as usize;
		for b in &mut self.memory[start..start + len as usize] {
			*b = 0xff;
		}
	}

	fn program(&mut self, address: u32, data: &[u8]) {
		let page = (address & !(PAGE_SIZE - 1)) as usize;
		let offset = (address & (PAGE_SIZE - 1)) as usize;
		// only the last page worth of data stays in the page buffer
		let skip = data.len().saturating_sub(PAGE_SIZE as usize);
		for (i, b) in data.iter().enumerate().skip(skip) {
			let target = page + (offset + i) % PAGE_SIZE as usize;
			// programming can only clear bits
			self.memory[target] &= *b;
		}
	}

	fn execute(&mut self) {
		let opcode = match self.incoming.first() {
			Some(&opcode) => opcode,
			None => return,
		};
		let command = Command::from_opcode(opcode);

		if self.powered_down {
			if command == Some(Command::ReleasePowerDown) {
				self.powered_down = false;
			} else {
				debug!("emulator: ignoring 0x{:02x} while powered down", opcode);
			}
			return;
		}
		if self.is_busy() {
			debug!("emulator: ignoring 0x{:02x} while busy", opcode);
			return;
		}

		let write_enabled = 0 != self.status & WEL;
		let address = self.address();

		match command {
			Some(Command::WriteEnable) => self.status |= WEL,
			Some(Command::WriteDisable) => self.status &= !WEL,
			Some(Command::WriteStatus) if self.incoming.len() >= 2 && write_enabled => {
				self.status = (self.status & !STATUS_WRITABLE) | (self.incoming[1] & STATUS_WRITABLE);
				self.finish_write();
			},
			Some(Command::PageProgram) if write_enabled => {
				if let Some(address) = address {
					if self.is_protected(address) {
						debug!("emulator: page program at 0x{:06x} protected", address);
					} else {
						let data = self.incoming[4..].to_vec();
						self.program(address, &data);
						self.finish_write();
					}
				}
			},
			Some(Command::SectorErase) if write_enabled => {
				if let Some(address) = address {
					if self.is_protected(address) {
						debug!("emulator: sector erase at 0x{:06x} protected", address);
					} else {
						self.erase(address & !(SECTOR_SIZE - 1), SECTOR_SIZE);
						self.finish_write();
					}
				}
			},
			Some(Command::BlockErase) if write_enabled => {
				if let Some(address) = address {
					if self.is_protected(address) {
						debug!("emulator: block erase at 0x{:06x} protected", address);
					} else {
						self.erase(address & !(BLOCK_SIZE - 1), BLOCK_SIZE);
						self.finish_write();
					}
				}
			},
			Some(Command::ChipErase) if write_enabled => {
				if 0 != self.status().block_protect_bits() {
					debug!("emulator: chip erase with protected blocks");
				} else {
					self.erase(0, SIZE);
					self.finish_write();
				}
			},
			Some(Command::PowerDown) => self.powered_down = true,
			Some(Command::WriteStatus) | Some(Command::PageProgram) | Some(Command::SectorErase)
			| Some(Command::BlockErase) | Some(Command::ChipErase) => {
				debug!("emulator: ignoring 0x{:02x} without write enable", opcode);
			},
			Some(_) => (), // read commands are done once deselected
			None => warn!("emulator: unknown command 0x{:02x}", opcode),
		}
	}
}

impl Transport for EmulatedChip {
	fn write(&mut self, buffer: &[u8]) -> usize {
		self.events.push(BusEvent::Write(buffer.to_vec()));
		if self.selected {
			self.incoming.extend_from_slice(buffer);
		}
		buffer.len()
	}

	fn read(&mut self, buffer: &mut [u8]) -> usize {
		self.events.push(BusEvent::Read(buffer.len()));
		let command = match self.incoming.first() {
			Some(&opcode) if self.selected && !self.powered_down => Command::from_opcode(opcode),
			_ => None,
		};
		// while busy only the status register answers
		let command = match command {
			Some(Command::ReadStatus) => command,
			_ if self.is_busy() => None,
			_ => command,
		};

		for (i, b) in buffer.iter_mut().enumerate() {
			*b = self.response_byte(command, self.read_offset + i);
		}
		self.read_offset += buffer.len();

		if command == Some(Command::ReadStatus) && self.is_busy() {
			self.busy_remaining = self.busy_remaining.saturating_sub(1);
			if 0 == self.busy_remaining {
				self.status &= !WIP;
			}
		}

		buffer.len()
	}

	fn select(&mut self, level: ChipSelect) {
		self.events.push(BusEvent::Select(level));
		match level {
			ChipSelect::Low => {
				self.selected = true;
				self.incoming.clear();
				self.read_offset = 0;
			},
			ChipSelect::High => {
				if self.selected {
					self.execute();
					self.frames.push(std::mem::replace(&mut self.incoming, Vec::new()));
				}
				self.selected = false;
			},
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::flash::{
		BlockProtect,
		Flash,
	};

	fn erased_page_with(offset: usize, data: &[u8]) -> Vec<u8> {
		let mut page = vec![0xff; PAGE_SIZE as usize];
		page[offset..offset + data.len()].copy_from_slice(data);
		page
	}

	#[test]
	fn identifies() {
		let mut flash = Flash::new(EmulatedChip::new());
		assert_eq!(flash.read_device_id().unwrap(), DEVICE_ID);
		assert_eq!(flash.read_manufacturer_device_id().unwrap(), (MANUFACTURER_ID, DEVICE_ID));
		assert_eq!(flash.read_jedec_id().unwrap(), JEDEC_ID);
		assert_eq!(flash.read_jedec_id_raw().unwrap().manufacturer, MANUFACTURER_ID);
	}

	#[test]
	fn write_enable_latch() {
		let mut flash = Flash::new(EmulatedChip::new());
		assert!(!flash.read_status().unwrap().wel());
		flash.write_enable().unwrap();
		assert!(flash.read_status().unwrap().wel());
		flash.write_disable().unwrap();
		assert!(!flash.read_status().unwrap().wel());
	}

	#[test]
	fn status_roundtrip() {
		let mut flash = Flash::new(EmulatedChip::new());
		for &bp in BlockProtect::ALL_LEVELS.iter() {
			for &srp in &[false, true] {
				let status = Status(0).with_block_protect(bp).with_srp(srp);
				flash.write_enable().unwrap();
				// WIP / WEL / reserved in the written byte are ignored
				flash.write_status(Status(status.0 | 0x43)).unwrap();
				let read = flash.read_status().unwrap();
				assert_eq!(read.block_protect(), Some(bp));
				assert_eq!(read.srp(), srp);
				assert!(!read.wip());
				assert!(!read.wel());
				assert!(!read.reserved());
			}
		}
	}

	#[test]
	fn write_status_needs_write_enable() {
		let mut flash = Flash::new(EmulatedChip::new());
		flash.write_status(Status(0).with_block_protect(BlockProtect::All)).unwrap();
		assert_eq!(flash.read_status().unwrap(), Status(0));
	}

	#[test]
	fn write_status_keeps_reserved_bit() {
		let mut chip = EmulatedChip::new();
		chip.set_status(Status(0x40));
		let mut flash = Flash::new(chip);
		flash.write_enable().unwrap();
		flash.write_status(Status(0x04)).unwrap();
		assert_eq!(flash.read_status().unwrap(), Status(0x44));
	}

	#[test]
	fn page_program_wraps() {
		let mut flash = Flash::new(EmulatedChip::new());
		let data: Vec<u8> = (0..10).collect();
		flash.write_enable().unwrap();
		flash.page_program(0x000100 + 250, &data).unwrap();

		let mut page = vec![0u8; PAGE_SIZE as usize];
		flash.read_data(0x000100, &mut page).unwrap();
		let mut expected = erased_page_with(250, &data[..6]);
		expected[..4].copy_from_slice(&data[6..]);
		assert_eq!(page, expected);

		// next page untouched
		let mut next = vec![0u8; PAGE_SIZE as usize];
		flash.read_data(0x000200, &mut next).unwrap();
		assert!(next.iter().all(|&b| b == 0xff));
	}

	#[test]
	fn program_needs_write_enable_and_clears_it() {
		let mut flash = Flash::new(EmulatedChip::new());
		flash.page_program(0, &[0x00]).unwrap();
		assert_eq!(flash.transport().image()[0], 0xff);

		flash.write_enable().unwrap();
		flash.page_program(0, &[0x00]).unwrap();
		assert_eq!(flash.transport().image()[0], 0x00);
		assert!(!flash.read_status().unwrap().wel());
	}

	#[test]
	fn program_only_clears_bits() {
		let mut flash = Flash::new(EmulatedChip::new());
		flash.write_enable().unwrap();
		flash.page_program(0x10, &[0xf0]).unwrap();
		flash.write_enable().unwrap();
		flash.page_program(0x10, &[0x3c]).unwrap();
		let mut buf = [0u8; 1];
		flash.fast_read(0x10, &mut buf).unwrap();
		assert_eq!(buf, [0x30]);
	}

	#[test]
	fn erase_sector_and_block() {
		let mut flash = Flash::new(EmulatedChip::from_image(vec![0u8; SIZE as usize]).unwrap());
		flash.write_enable().unwrap();
		flash.sector_erase(SECTOR_SIZE + 17).unwrap();
		flash.write_enable().unwrap();
		flash.block_erase(3 * BLOCK_SIZE + 5).unwrap();

		let image = flash.transport().image();
		assert_eq!(image[SECTOR_SIZE as usize - 1], 0x00);
		assert!(image[SECTOR_SIZE as usize..2 * SECTOR_SIZE as usize].iter().all(|&b| b == 0xff));
		assert_eq!(image[2 * SECTOR_SIZE as usize], 0x00);
		assert_eq!(image[3 * BLOCK_SIZE as usize - 1], 0x00);
		assert!(image[3 * BLOCK_SIZE as usize..4 * BLOCK_SIZE as usize].iter().all(|&b| b == 0xff));
		assert_eq!(image[4 * BLOCK_SIZE as usize], 0x00);
	}

	#[test]
	fn protected_blocks_are_kept() {
		let mut chip = EmulatedChip::from_image(vec![0u8; SIZE as usize]).unwrap();
		chip.set_status(Status(0).with_block_protect(BlockProtect::Upper1));
		let mut flash = Flash::new(chip);
		let last_block = SIZE - BLOCK_SIZE;

		flash.write_enable().unwrap();
		flash.sector_erase(last_block).unwrap();
		flash.write_enable().unwrap();
		flash.block_erase(last_block).unwrap();
		flash.write_enable().unwrap();
		flash.chip_erase().unwrap();
		assert!(flash.transport().image().iter().all(|&b| b == 0x00));

		// unprotected part still works
		flash.write_enable().unwrap();
		flash.sector_erase(0).unwrap();
		assert_eq!(flash.transport().image()[0], 0xff);
	}

	#[test]
	fn chip_erase() {
		let mut flash = Flash::new(EmulatedChip::from_image(vec![0x5a; SIZE as usize]).unwrap());
		flash.write_enable().unwrap();
		flash.chip_erase().unwrap();
		assert!(flash.transport().image().iter().all(|&b| b == 0xff));
	}

	#[test]
	fn busy_chip_ignores_commands() {
		let mut flash = Flash::new(EmulatedChip::new().with_busy_polls(2));
		flash.write_enable().unwrap();
		flash.page_program(0, &[0x12]).unwrap();

		let mut buf = [0u8; 1];
		flash.read_data(0, &mut buf).unwrap();
		assert_eq!(buf, [0xff]);
		flash.power_down().unwrap();
		assert!(!flash.transport().is_powered_down());

		assert!(flash.read_status().unwrap().wip());
		assert!(flash.read_status().unwrap().wip());
		assert!(!flash.read_status().unwrap().wip());

		flash.read_data(0, &mut buf).unwrap();
		assert_eq!(buf, [0x12]);
	}

	#[test]
	fn power_down() {
		let mut flash = Flash::new(EmulatedChip::new());
		flash.power_down().unwrap();
		assert!(flash.transport().is_powered_down());

		flash.write_enable().unwrap();
		flash.chip_erase().unwrap();
		assert_eq!(flash.read_jedec_id().unwrap(), 0xffff);

		flash.release_power_down().unwrap();
		assert!(!flash.transport().is_powered_down());
		assert_eq!(flash.read_jedec_id().unwrap(), JEDEC_ID);
		assert!(!flash.read_status().unwrap().wel());
	}

	#[test]
	fn records_frames() {
		let mut chip = EmulatedChip::new();
		{
			let mut flash = Flash::new(&mut chip);
			flash.write_enable().unwrap();
			flash.page_program(0xabcdef, &[1, 2]).unwrap();
		}
		assert_eq!(chip.frames(), &[vec![0x06u8], vec![0x02u8, 0xab, 0xcd, 0xef, 1, 2]][..]);
		chip.clear_frames();
		assert!(chip.frames().is_empty());
		assert!(chip.events().is_empty());
	}

	#[test]
	fn records_events() {
		let mut chip = EmulatedChip::new();
		{
			let mut flash = Flash::new(&mut chip);
			flash.write_enable().unwrap();
			flash.read_status().unwrap();
		}
		assert_eq!(chip.events(), &[
			BusEvent::Select(ChipSelect::Low),
			BusEvent::Write(vec![0x06]),
			BusEvent::Select(ChipSelect::High),
			BusEvent::Select(ChipSelect::Low),
			BusEvent::Write(vec![0x05]),
			BusEvent::Read(1),
			BusEvent::Select(ChipSelect::High),
		][..]);
	}

	#[test]
	fn rejects_wrong_image_size() {
		assert!(EmulatedChip::from_image(vec![0xff; 1024]).is_err());
	}
}
