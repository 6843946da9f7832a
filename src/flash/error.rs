/// Conditions the codec itself detects.
///
/// Everything else (missing write enable, protected regions, busy chip) is
/// silently ignored by the chip and can only be observed through the status
/// register.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
pub enum FlashError {
	#[fail(display = "transport incomplete: transferred {} of {} bytes", actual, expected)]
	TransportIncomplete {
		expected: usize,
		actual: usize,
	},
	#[fail(display = "address 0x{:08x} doesn't fit into 24 bits", address)]
	AddressOutOfRange {
		address: u32,
	},
	#[fail(display = "can't program {} bytes in one page (page size: {})", len, page_size)]
	ProgramTooLong {
		len: usize,
		page_size: u32,
	},
}
