//! TIFF-flavored PackBits: a one-byte-header run-length scheme.
//!
//! Header byte `n` (signed):
//! - `0..=127`: copy the next `n + 1` bytes literally.
//! - `-127..=-1`: repeat the following byte `1 - n` times.
//! - `-128`: no-op (used as inter-packet padding; never emitted by `encode`).

use super::expect_len;
use crate::{
	error::{Error, Result},
	geometry::RasterGeometry,
};

pub fn decode(geometry: &RasterGeometry, bytes: &[u8]) -> Result<Vec<u8>> {
	let want = geometry.row_bytes() * geometry.height as usize;
	let mut out = Vec::with_capacity(want);
	let mut i = 0usize;
	while i < bytes.len() && out.len() < want {
		let n = bytes[i] as i8;
		i += 1;
		if n >= 0 {
			let count = n as usize + 1;
			let end = i + count;
			if end > bytes.len() {
				return Err(Error::Corrupt("packbits: literal run past end of payload".into()));
			}
			out.extend_from_slice(&bytes[i..end]);
			i = end;
		} else if n != -128 {
			let count = (1 - n as i32) as usize;
			if i >= bytes.len() {
				return Err(Error::Corrupt("packbits: repeat packet missing byte".into()));
			}
			let value = bytes[i];
			i += 1;
			out.resize(out.len() + count, value);
		}
	}
	expect_len(geometry, out.len())?;
	Ok(out)
}

pub fn encode(geometry: &RasterGeometry, pixels: &[u8]) -> Result<Vec<u8>> {
	expect_len(geometry, pixels.len())?;
	let mut out = Vec::new();
	let mut i = 0usize;
	while i < pixels.len() {
		let run_len = run_length(pixels, i);
		if run_len >= 2 {
			let count = run_len.min(128);
			out.push((1 - count as i32) as u8);
			out.push(pixels[i]);
			i += count;
		} else {
			let start = i;
			while i < pixels.len() && i - start < 128 {
				if run_length(pixels, i) >= 2 {
					break;
				}
				i += 1;
			}
			let literal = &pixels[start..i];
			out.push((literal.len() - 1) as u8);
			out.extend_from_slice(literal);
		}
	}
	Ok(out)
}

fn run_length(data: &[u8], at: usize) -> usize {
	let value = data[at];
	let mut n = 1;
	while at + n < data.len() && data[at + n] == value && n < 128 {
		n += 1;
	}
	n
}
