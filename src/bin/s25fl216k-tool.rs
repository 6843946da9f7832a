#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate s25fl216k_flash;
use s25fl216k_flash::*;

use std::fs;
use std::io::{
	self,
	Write,
};
use std::path::Path;
use std::process::exit;

use s25fl216k_flash::emulator::EmulatedChip;
use s25fl216k_flash::flash::consts::*;

fn parse_number(s: &str) -> AResult<u32> {
	let value = if s.starts_with("0x") || s.starts_with("0X") {
		u32::from_str_radix(&s[2..], 16)?
	} else {
		s.parse::<u32>()?
	};
	Ok(value)
}

fn get_number(matches: &clap::ArgMatches, name: &str) -> AResult<u32> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	parse_number(param).map_err(|e| {
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn open_chip(image_path: &Path, create: bool) -> AResult<EmulatedChip> {
	if !image_path.exists() {
		ensure!(create, "image {:?} doesn't exist (use --create to start with an erased chip)", image_path);
		info!("Starting with erased flash, will be saved to {:?}", image_path);
		return Ok(EmulatedChip::new());
	}
	let image = fs::read(image_path).map_err(|e| format_err!("load image {:?}: {}", image_path, e))?;
	EmulatedChip::from_image(image)
}

fn save_chip(image_path: &Path, chip: &EmulatedChip) -> AResult<()> {
	fs::write(image_path, chip.image()).map_err(|e| format_err!("save image {:?}: {}", image_path, e))?;
	Ok(())
}

fn hexdump(address: u32, data: &[u8]) {
	for (i, b) in data.iter().enumerate() {
		if 0 == i % 16 {
			print!("{:06x} ", address as usize + i);
		} else if 0 == i % 8 {
			print!(" ");
		}
		print!(" {:02x}", b);
		if 15 == i % 16 {
			println!();
		}
	}
	if 0 != data.len() % 16 {
		println!();
	}
}

fn info(flash: &mut Flash<&mut EmulatedChip>) -> AResult<()> {
	let (manufacturer, device_id) = flash.read_manufacturer_device_id()?;
	let jedec = flash.read_jedec_id_raw()?;
	let status = flash.read_status()?;

	println!("Manufacturer ID: 0x{:02x}", manufacturer);
	println!("Device ID:       0x{:02x} (expected: 0x{:02x})", device_id, DEVICE_ID);
	println!("JEDEC ID:        0x{:04x} (expected: 0x{:04x})", jedec.id(), JEDEC_ID);
	println!("Status:          {:?}", status);
	match status.block_protect() {
		Some(bp) => println!("Protection:      {}", bp),
		None => println!("Protection:      unknown BP encoding {}", status.block_protect_bits()),
	}
	println!("Size:            {} bytes", SIZE);
	println!("Blocks:          {} x {} bytes", BLOCKS, BLOCK_SIZE);
	println!("Sectors:         {} x {} bytes", SECTORS, SECTOR_SIZE);
	println!("Pages:           {} x {} bytes", PAGES, PAGE_SIZE);

	if let Err(e) = operations::verify_identity(flash) {
		warn!("{}", e);
	}
	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg IMAGE: -i --image +takes_value +required "flash image file backing the emulated chip")
		(@arg create: --create "start with an erased chip if the image file doesn't exist")
		(@subcommand info =>
			(about: "show identification, status and geometry")
		)
		(@subcommand status =>
			(about: "show status register")
		)
		(@subcommand read =>
			(about: "read flash data as binary to stdout")
			(@arg ADDRESS: +required "start address (decimal or 0x-prefixed hex)")
			(@arg LENGTH: +required "number of bytes")
		)
		(@subcommand dump =>
			(about: "hexdump flash data")
			(@arg ADDRESS: +required "start address (decimal or 0x-prefixed hex)")
			(@arg LENGTH: +required "number of bytes")
		)
		(@subcommand write =>
			(about: "erase, program and verify file contents at a sector aligned address")
			(@arg ADDRESS: +required "start address (decimal or 0x-prefixed hex)")
			(@arg FILE: +required "file to program")
		)
		(@subcommand erase =>
			(about: "erase sector aligned range")
			(@arg ADDRESS: +required "start address (decimal or 0x-prefixed hex)")
			(@arg LENGTH: +required "number of bytes (multiple of the sector size)")
		)
		(@subcommand erase_chip =>
			(about: "erase the whole chip")
		)
	).get_matches();

	let image_path = Path::new(matches.value_of("IMAGE").unwrap_or_default());
	let mut chip = open_chip(image_path, matches.is_present("create"))?;
	let mut modified = false;

	{
		let mut flash = Flash::new(&mut chip);
		match matches.subcommand() {
			("info", _) => {
				info(&mut flash)?;
			},
			("status", _) => {
				println!("{:?}", flash.read_status()?);
			},
			("read", Some(sub_m)) => {
				let address = get_number(sub_m, "ADDRESS")?;
				let length = get_number(sub_m, "LENGTH")?;
				let data = operations::read(&mut flash, address, length as usize)?;
				io::stdout().write_all(&data)?;
			},
			("dump", Some(sub_m)) => {
				let address = get_number(sub_m, "ADDRESS")?;
				let length = get_number(sub_m, "LENGTH")?;
				let data = operations::read(&mut flash, address, length as usize)?;
				hexdump(address, &data);
			},
			("write", Some(sub_m)) => {
				let address = get_number(sub_m, "ADDRESS")?;
				let file = sub_m.value_of("FILE").unwrap_or_default();
				let data = fs::read(file).map_err(|e| format_err!("read {:?}: {}", file, e))?;
				operations::verify_identity(&mut flash)?;
				operations::program_image(&mut flash, address, &data)?;
				modified = true;
			},
			("erase", Some(sub_m)) => {
				let address = get_number(sub_m, "ADDRESS")?;
				let length = get_number(sub_m, "LENGTH")?;
				operations::verify_identity(&mut flash)?;
				operations::erase(&mut flash, address, length)?;
				modified = true;
			},
			("erase_chip", _) => {
				operations::verify_identity(&mut flash)?;
				operations::erase_chip(&mut flash)?;
				modified = true;
			},
			("", _) => bail!("no subcommand"),
			(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
		}
	}

	if modified || !image_path.exists() {
		save_chip(image_path, &chip)?;
	}

	Ok(())
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
