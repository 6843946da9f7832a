//! Multi-command sequences on top of the `Flash` codec.
//!
//! The codec only issues single commands; polling WIP, splitting writes at
//! page boundaries and checking the identification is done here.

use crate::flash::consts::*;
use crate::flash::{
	BlockProtect,
	Flash,
	Status,
};
use crate::transport::Transport;

/// Status polls before giving up on a program/erase (chip erase is the slowest).
pub const MAX_POLLS: usize = 0x00ff_ffff;

fn check_range(address: u32, len: usize) -> crate::AResult<()> {
	ensure!(
		u64::from(address) + len as u64 <= u64::from(SIZE),
		"range 0x{:06x} + 0x{:x} exceeds flash size 0x{:06x}", address, len, SIZE
	);
	Ok(())
}

/// Poll the status register until WIP is cleared; returns the final status.
pub fn wait_ready<T: Transport>(flash: &mut Flash<T>, max_polls: usize) -> crate::AResult<Status> {
	for _ in 0..max_polls {
		let status = flash.read_status()?;
		if !status.wip() {
			return Ok(status);
		}
	}
	bail!("Flash timeout error - still busy after {} status polls", max_polls);
}

/// Make sure we're talking to a S25FL216K.
pub fn verify_identity<T: Transport>(flash: &mut Flash<T>) -> crate::AResult<()> {
	let device_id = flash.read_device_id()?;
	ensure!(device_id == DEVICE_ID, "Unexpected device ID: 0x{:02x} (expected: 0x{:02x})", device_id, DEVICE_ID);
	let jedec_id = flash.read_jedec_id()?;
	ensure!(jedec_id == JEDEC_ID, "Unexpected JEDEC ID: 0x{:04x} (expected: 0x{:04x})", jedec_id, JEDEC_ID);
	debug!("S25FL216K identified (device ID 0x{:02x}, JEDEC ID 0x{:04x})", device_id, jedec_id);
	Ok(())
}

pub fn read<T: Transport>(flash: &mut Flash<T>, address: u32, len: usize) -> crate::AResult<Vec<u8>> {
	check_range(address, len)?;
	let mut buf = vec![0u8; len];
	flash.read_data(address, &mut buf)?;
	Ok(buf)
}

/// Program `data` (into erased memory) starting at `address`, one page
/// program per page touched.
pub fn write<T: Transport>(flash: &mut Flash<T>, address: u32, data: &[u8]) -> crate::AResult<()> {
	check_range(address, data.len())?;
	wait_ready(flash, MAX_POLLS)?;

	let mut address = address;
	let mut data = data;
	while !data.is_empty() {
		let page_remaining = (PAGE_SIZE - address % PAGE_SIZE) as usize;
		let (chunk, rest) = data.split_at(page_remaining.min(data.len()));

		with_context!(("program page at 0x{:06x}", address), {
			flash.write_enable()?;
			flash.page_program(address, chunk)?;
			wait_ready(flash, MAX_POLLS)?;
			Ok(())
		})?;

		address += chunk.len() as u32;
		data = rest;
	}
	Ok(())
}

/// Erase a sector aligned range; whole aligned blocks use block erase.
pub fn erase<T: Transport>(flash: &mut Flash<T>, address: u32, len: u32) -> crate::AResult<()> {
	ensure!(
		0 == address % SECTOR_SIZE && 0 == len % SECTOR_SIZE,
		"erase range 0x{:06x} + 0x{:x} not aligned to sector size 0x{:x}", address, len, SECTOR_SIZE
	);
	check_range(address, len as usize)?;
	wait_ready(flash, MAX_POLLS)?;

	let end = address + len;
	let mut address = address;
	while address < end {
		flash.write_enable()?;
		if 0 == address % BLOCK_SIZE && end - address >= BLOCK_SIZE {
			debug!("erasing block at 0x{:06x}", address);
			flash.block_erase(address)?;
			address += BLOCK_SIZE;
		} else {
			debug!("erasing sector at 0x{:06x}", address);
			flash.sector_erase(address)?;
			address += SECTOR_SIZE;
		}
		wait_ready(flash, MAX_POLLS)?;
	}
	Ok(())
}

pub fn erase_chip<T: Transport>(flash: &mut Flash<T>) -> crate::AResult<()> {
	wait_ready(flash, MAX_POLLS)?;
	flash.write_enable()?;
	flash.chip_erase()?;
	wait_ready(flash, MAX_POLLS)?;
	Ok(())
}

/// Change BP[3:0], keeping SRP; fails if the chip didn't take the new value.
pub fn set_block_protect<T: Transport>(flash: &mut Flash<T>, protect: BlockProtect) -> crate::AResult<()> {
	let status = wait_ready(flash, MAX_POLLS)?;
	flash.write_enable()?;
	flash.write_status(status.with_block_protect(protect).writable())?;
	let status = wait_ready(flash, MAX_POLLS)?;
	ensure!(
		status.block_protect() == Some(protect),
		"Block protection not applied, status register: {:?}", status
	);
	info!("S25FL216K: {}", protect);
	Ok(())
}

/// Erase the sectors covering `image`, program and verify it.
///
/// The remainder of the last sector is left erased.
pub fn program_image<T: Transport>(flash: &mut Flash<T>, address: u32, image: &[u8]) -> crate::AResult<()> {
	check_range(address, image.len())?;
	let erase_len = (image.len() as u32 + SECTOR_SIZE - 1) / SECTOR_SIZE * SECTOR_SIZE;
	erase(flash, address, erase_len)?;
	write(flash, address, image)?;

	// verify
	let flash_data = read(flash, address, image.len())?;
	for (offset, (&expected, &actual)) in image.iter().zip(flash_data.iter()).enumerate() {
		ensure!(expected == actual,
			"Verify failed at {:06x}: expected {:02x}, flash is {:02x}", address as usize + offset, expected, actual
		);
	}
	info!("S25FL216K: programmed and verified {} bytes at 0x{:06x}", image.len(), address);

	Ok(())
}
