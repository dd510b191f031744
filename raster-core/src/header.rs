//! `HeaderSynthesizer`: builds a standalone file header for a tile payload
//! that lives packed inside a container, so the raw bytes can be forwarded
//! to a client without ever being decoded. Assembles a fixed-size header
//! buffer the same way the rest of this crate writes one: one buffer, one
//! `write_all`.

use crate::{
	codec::Encoding,
	error::{Error, Result},
	geometry::{Photometric, RasterGeometry},
	palette::Palette,
};

const DIR_ENTRY_SIZE: usize = 12;

enum Value {
	Inline(u32),
	External(Vec<u8>),
}

struct Entry {
	tag: u16,
	field_type: u16,
	count: u32,
	value: Value,
}

/// Packs a SHORT array the way a little-endian TIFF expects it: inline,
/// low-to-high in the 4-byte value field, when it's one or two entries;
/// externally placed, little-endian bytes in file order, otherwise.
fn short_array_value(values: &[u16]) -> Value {
	if values.len() * 2 <= 4 {
		let packed = values.iter().enumerate().fold(0u32, |acc, (i, &v)| acc | (v as u32) << (i * 16));
		Value::Inline(packed)
	} else {
		Value::External(values.iter().flat_map(|v| v.to_le_bytes()).collect())
	}
}

/// Builds a minimal single-IFD, single-strip TIFF header whose `StripOffsets`
/// equals the header's own length and whose `StripByteCounts` equals
/// `payload_length`, so `header ++ payload` is a complete, valid TIFF file.
pub fn synthesize_tiff(geometry: &RasterGeometry, payload_length: u64, encoding: Encoding, palette: Option<&Palette>) -> Result<Vec<u8>> {
	let channels = geometry.channels as u32;
	let compression: u32 = match encoding {
		Encoding::Raw => 1,
		Encoding::Deflate => 8,
		Encoding::Packbits => 32773,
		Encoding::Lzw => 5,
		Encoding::Jpeg => 7,
		Encoding::Png => return Err(Error::UnsupportedCombination("a PNG payload cannot be wrapped in a synthesized TIFF header".into())),
	};
	let photometric: u32 = match geometry.photometric {
		Photometric::Gray | Photometric::Mask => 1,
		Photometric::Rgb => 2,
		Photometric::PaletteIndexed => 3,
	};
	let sample_format: u16 = match geometry.sample_kind {
		crate::geometry::SampleKind::UnsignedInt => 1,
		crate::geometry::SampleKind::SignedInt => 2,
		crate::geometry::SampleKind::Float => 3,
	};

	// A SHORT array of up to two entries fits inline in the IFD's 4-byte value
	// field (TIFF 6.0 §2, "Value/Offset"); only three or more entries need an
	// external placement. `short_array_value` picks whichever form fits.
	let bits_per_sample = short_array_value(&vec![geometry.sample_bits as u16; channels as usize]);
	let sample_format_array = short_array_value(&vec![sample_format; channels as usize]);

	let mut entries = vec![
		Entry { tag: 256, field_type: 4, count: 1, value: Value::Inline(geometry.width) },
		Entry { tag: 257, field_type: 4, count: 1, value: Value::Inline(geometry.height) },
		Entry { tag: 258, field_type: 3, count: channels, value: bits_per_sample },
		Entry { tag: 259, field_type: 3, count: 1, value: Value::Inline(compression) },
		Entry { tag: 262, field_type: 3, count: 1, value: Value::Inline(photometric) },
		// StripOffsets (273) is filled in once the header's total length is known.
		Entry { tag: 273, field_type: 4, count: 1, value: Value::Inline(0) },
		Entry { tag: 277, field_type: 3, count: 1, value: Value::Inline(channels) },
		Entry { tag: 278, field_type: 4, count: 1, value: Value::Inline(geometry.height) },
		Entry { tag: 279, field_type: 4, count: 1, value: Value::Inline(payload_length as u32) },
		Entry { tag: 339, field_type: 3, count: channels, value: sample_format_array },
	];

	if geometry.photometric == Photometric::PaletteIndexed {
		let palette = palette.ok_or_else(|| Error::UnsupportedCombination("palette-indexed geometry requires a palette".into()))?;
		let mut color_map = Vec::with_capacity(256 * 3 * 2);
		// TIFF ColorMap is three parallel 256-entry 16-bit tables (R, then G, then B).
		for channel in 0..3 {
			for index in 0..256u16 {
				let value = palette.entries().get(index as usize).map(|rgba| rgba[channel]).unwrap_or(0);
				color_map.extend_from_slice(&(value as u16 * 257).to_le_bytes());
			}
		}
		entries.push(Entry { tag: 320, field_type: 3, count: 768, value: Value::External(color_map) });
	}

	entries.sort_by_key(|e| e.tag);

	let ifd_offset = 8u64;
	let ifd_size = 2 + entries.len() as u64 * DIR_ENTRY_SIZE as u64 + 4;
	let mut external_offset = ifd_offset + ifd_size;
	let mut external_placements = Vec::with_capacity(entries.len());
	for entry in &entries {
		match &entry.value {
			Value::Inline(_) => external_placements.push(None),
			Value::External(bytes) => {
				external_placements.push(Some(external_offset));
				external_offset += bytes.len() as u64;
			},
		}
	}
	let strip_offset = external_offset;

	let mut header = Vec::with_capacity(strip_offset as usize);
	header.extend_from_slice(b"II");
	header.extend_from_slice(&42u16.to_le_bytes());
	header.extend_from_slice(&(ifd_offset as u32).to_le_bytes());

	header.extend_from_slice(&(entries.len() as u16).to_le_bytes());
	for (entry, placement) in entries.iter().zip(&external_placements) {
		header.extend_from_slice(&entry.tag.to_le_bytes());
		header.extend_from_slice(&entry.field_type.to_le_bytes());
		header.extend_from_slice(&entry.count.to_le_bytes());
		let value = match (&entry.value, placement) {
			(Value::Inline(v), _) if entry.tag == 273 => {
				let _ = v;
				strip_offset as u32
			},
			(Value::Inline(v), _) => *v,
			(Value::External(_), Some(offset)) => *offset as u32,
			(Value::External(_), None) => unreachable!("external value missing its placement"),
		};
		header.extend_from_slice(&value.to_le_bytes());
	}
	header.extend_from_slice(&0u32.to_le_bytes()); // no next IFD

	for (entry, placement) in entries.iter().zip(&external_placements) {
		if let (Value::External(bytes), Some(_)) = (&entry.value, placement) {
			header.extend_from_slice(bytes);
		}
	}

	debug_assert_eq!(header.len() as u64, strip_offset);
	Ok(header)
}

fn crc32(data: &[u8]) -> u32 {
	const POLY: u32 = 0xEDB8_8320;
	let mut crc = 0xFFFF_FFFFu32;
	for &byte in data {
		crc ^= byte as u32;
		for _ in 0..8 {
			crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
		}
	}
	!crc
}

fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
	let mut chunk = Vec::with_capacity(4 + 4 + data.len() + 4);
	chunk.extend_from_slice(&(data.len() as u32).to_be_bytes());
	chunk.extend_from_slice(kind);
	chunk.extend_from_slice(data);
	let mut crc_input = Vec::with_capacity(4 + data.len());
	crc_input.extend_from_slice(kind);
	crc_input.extend_from_slice(data);
	chunk.extend_from_slice(&crc32(&crc_input).to_be_bytes());
	chunk
}

/// Builds the PNG signature + `IHDR` + `PLTE` prefix for an indexed-color
/// tile. Exactly `33 + plte_chunk.len()` bytes (8-byte signature + 25-byte
/// `IHDR` chunk + the complete `PLTE` chunk, framing included); the caller
/// appends the matching encoder's `IDAT`+`IEND` bytes.
pub fn synthesize_png_with_palette(geometry: &RasterGeometry, palette: &Palette) -> Result<Vec<u8>> {
	if geometry.photometric != Photometric::PaletteIndexed {
		return Err(Error::UnsupportedCombination("synthesize_png_with_palette requires palette-indexed geometry".into()));
	}
	if geometry.sample_bits != 8 {
		return Err(Error::UnsupportedCombination("PNG palette headers require 8-bit samples".into()));
	}

	let mut header = Vec::new();
	header.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);

	let mut ihdr_data = Vec::with_capacity(13);
	ihdr_data.extend_from_slice(&geometry.width.to_be_bytes());
	ihdr_data.extend_from_slice(&geometry.height.to_be_bytes());
	ihdr_data.push(8); // bit depth
	ihdr_data.push(3); // color type: indexed
	ihdr_data.push(0); // compression method
	ihdr_data.push(0); // filter method
	ihdr_data.push(0); // interlace method
	header.extend_from_slice(&png_chunk(b"IHDR", &ihdr_data));

	let rgb: Vec<u8> = palette.entries().iter().flat_map(|rgba| [rgba[0], rgba[1], rgba[2]]).collect();
	header.extend_from_slice(&png_chunk(b"PLTE", &rgb));

	Ok(header)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::geometry::SampleKind;

	#[test]
	fn tiff_header_strip_offset_matches_header_length() {
		let geometry = RasterGeometry::new(256, 256, 3, 8, SampleKind::UnsignedInt, Photometric::Rgb).unwrap();
		let header = synthesize_tiff(&geometry, 4096, Encoding::Raw, None).unwrap();
		let strip_offset_entry = header.windows(2).position(|w| w == 273u16.to_le_bytes()).unwrap();
		let value = u32::from_le_bytes(header[strip_offset_entry + 8..strip_offset_entry + 12].try_into().unwrap());
		assert_eq!(value as usize, header.len());
	}

	#[test]
	fn png_palette_header_is_33_plus_plte_chunk_bytes() {
		let geometry = RasterGeometry::new(4, 4, 1, 8, SampleKind::UnsignedInt, Photometric::PaletteIndexed).unwrap();
		let palette = Palette::new(vec![[255, 0, 0, 255], [0, 255, 0, 255]]).unwrap();
		let header = synthesize_png_with_palette(&geometry, &palette).unwrap();
		let plte_len = 12 + palette.len() * 3;
		assert_eq!(header.len(), 33 + plte_len);
		assert_eq!(&header[0..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
	}
}
