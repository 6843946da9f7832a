/// Level to drive the chip select line to.
///
/// The chip select is active low: `Low` starts a command, `High` ends it
/// (and is the moment the chip starts executing program/erase commands).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ChipSelect {
	Low,
	High,
}

/// Bus primitives the flash codec drives.
///
/// Implementations only move bytes; framing is done by `Flash`. If multiple
/// threads share one bus the implementation has to serialize complete
/// `Low` .. `High` brackets itself.
pub trait Transport {
	/// transmit all bytes from `buffer`, returns number of bytes written
	fn write(&mut self, buffer: &[u8]) -> usize;

	/// fill `buffer` from the bus, returns number of bytes read
	fn read(&mut self, buffer: &mut [u8]) -> usize;

	fn select(&mut self, level: ChipSelect);
}

impl<'a, T: ?Sized + Transport> Transport for &'a mut T {
	fn write(&mut self, buffer: &[u8]) -> usize {
		T::write(*self, buffer)
	}

	fn read(&mut self, buffer: &mut [u8]) -> usize {
		T::read(*self, buffer)
	}

	fn select(&mut self, level: ChipSelect) {
		T::select(*self, level)
	}
}
