//! TIFF-flavored LZW: MSB-first bit packing, clear code 256, end-of-information
//! code 257, table entries starting at 258, and the "early change" convention
//! where the code width grows one code before the table would actually
//! overflow it (libtiff's `LZWDecode`/`LZWEncode` behavior).

use std::collections::HashMap;

use super::expect_len;
use crate::{
	error::{Error, Result},
	geometry::RasterGeometry,
};

const CLEAR: u32 = 256;
const EOI: u32 = 257;
const FIRST_CODE: u32 = 258;
const MAX_CODE_WIDTH: u32 = 12;

struct BitReader<'a> {
	data: &'a [u8],
	byte_pos: usize,
	bit_pos: u8,
}

impl<'a> BitReader<'a> {
	fn new(data: &'a [u8]) -> Self { Self { data, byte_pos: 0, bit_pos: 0 } }

	fn read_bits(&mut self, n: u32) -> Result<u32> {
		let mut value = 0u32;
		for _ in 0..n {
			if self.byte_pos >= self.data.len() {
				return Err(Error::Corrupt("lzw: truncated stream".into()));
			}
			let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
			value = (value << 1) | bit as u32;
			self.bit_pos += 1;
			if self.bit_pos == 8 {
				self.bit_pos = 0;
				self.byte_pos += 1;
			}
		}
		Ok(value)
	}
}

struct BitWriter {
	out: Vec<u8>,
	cur: u8,
	bit_pos: u8,
}

impl BitWriter {
	fn new() -> Self { Self { out: Vec::new(), cur: 0, bit_pos: 0 } }

	fn write_bits(&mut self, value: u32, n: u32) {
		for i in (0..n).rev() {
			let bit = (value >> i) & 1;
			self.cur = (self.cur << 1) | bit as u8;
			self.bit_pos += 1;
			if self.bit_pos == 8 {
				self.out.push(self.cur);
				self.cur = 0;
				self.bit_pos = 0;
			}
		}
	}

	fn finish(mut self) -> Vec<u8> {
		if self.bit_pos > 0 {
			self.cur <<= 8 - self.bit_pos;
			self.out.push(self.cur);
		}
		self.out
	}
}

fn width_for(next_code: u32) -> u32 {
	match next_code {
		n if n >= 2047 => MAX_CODE_WIDTH,
		n if n >= 1023 => 11,
		n if n >= 511 => 10,
		_ => 9,
	}
}

pub fn decode(geometry: &RasterGeometry, bytes: &[u8]) -> Result<Vec<u8>> {
	let want = geometry.row_bytes() * geometry.height as usize;
	let mut out = Vec::with_capacity(want);
	let mut reader = BitReader::new(bytes);
	let mut table: Vec<Vec<u8>> = Vec::new();
	let mut code_width = 9u32;
	let mut prev: Option<Vec<u8>> = None;

	loop {
		let code = reader.read_bits(code_width)?;
		if code == CLEAR {
			table.clear();
			code_width = 9;
			prev = None;
			continue;
		}
		if code == EOI {
			break;
		}

		let entry = if code < 256 {
			vec![code as u8]
		} else {
			let idx = (code - FIRST_CODE) as usize;
			if idx < table.len() {
				table[idx].clone()
			} else if idx == table.len() {
				let mut e = prev.clone().ok_or_else(|| Error::Corrupt("lzw: invalid code sequence".into()))?;
				let first = e[0];
				e.push(first);
				e
			} else {
				return Err(Error::Corrupt("lzw: code out of range".into()));
			}
		};

		out.extend_from_slice(&entry);
		if let Some(p) = &prev {
			let mut new_entry = p.clone();
			new_entry.push(entry[0]);
			table.push(new_entry);
		}
		prev = Some(entry);
		// `table` lags the encoder's code counter by one entry: the encoder widens
		// as soon as it assigns the code that would overflow the current width,
		// but the decoder only learns that code's pattern (and grows its own table)
		// on the *next* iteration. Add the pending entry back in so both sides
		// widen on the same code.
		code_width = width_for(FIRST_CODE + table.len() as u32 + 1);
	}

	expect_len(geometry, out.len())?;
	Ok(out)
}

pub fn encode(geometry: &RasterGeometry, pixels: &[u8]) -> Result<Vec<u8>> {
	expect_len(geometry, pixels.len())?;
	let mut writer = BitWriter::new();
	let mut code_width = 9u32;
	let mut next_code = FIRST_CODE;
	let mut table: HashMap<Vec<u8>, u32> = HashMap::new();
	writer.write_bits(CLEAR, code_width);

	let mut w: Vec<u8> = Vec::new();
	for &byte in pixels {
		let mut wc = w.clone();
		wc.push(byte);
		if w.is_empty() || table.contains_key(&wc) {
			w = wc;
			continue;
		}

		let code = if w.len() == 1 { w[0] as u32 } else { table[&w] };
		writer.write_bits(code, code_width);

		table.insert(wc, next_code);
		next_code += 1;
		code_width = width_for(next_code);
		if next_code >= 4094 {
			writer.write_bits(CLEAR, code_width);
			table.clear();
			next_code = FIRST_CODE;
			code_width = 9;
		}
		w = vec![byte];
	}
	if !w.is_empty() {
		let code = if w.len() == 1 { w[0] as u32 } else { table[&w] };
		writer.write_bits(code, code_width);
	}
	writer.write_bits(EOI, code_width);

	Ok(writer.finish())
}
