//! `FileImage`: a `RasterNode` backed by a whole standalone file, read or
//! written. The reader probes magic bytes then parses the matching header;
//! the writer assembles a header buffer and persists it with one `write_all`
//! before streaming encoded rows behind it.

use std::{
	fs,
	path::{Path, PathBuf},
};

use crate::{
	codec::{self, Encoding},
	error::{Error, Result},
	geometry::{Photometric, RasterGeometry, SampleKind},
	header,
	node::{RasterNode, RawRasterNode},
	palette::Palette,
};

const TIFF_HEADER_SIZE: usize = 8;

struct IfdEntry {
	tag: u16,
	field_type: u16,
	count: u32,
	value_or_offset: u32,
}

fn read_u16(bytes: &[u8], at: usize, little_endian: bool) -> u16 {
	let b: [u8; 2] = bytes[at..at + 2].try_into().unwrap();
	if little_endian { u16::from_le_bytes(b) } else { u16::from_be_bytes(b) }
}

fn read_u32(bytes: &[u8], at: usize, little_endian: bool) -> u32 {
	let b: [u8; 4] = bytes[at..at + 4].try_into().unwrap();
	if little_endian { u32::from_le_bytes(b) } else { u32::from_be_bytes(b) }
}

fn read_ifd(bytes: &[u8]) -> Result<(bool, Vec<IfdEntry>)> {
	if bytes.len() < TIFF_HEADER_SIZE {
		return Err(Error::Corrupt("tiff: file shorter than header".into()));
	}
	let little_endian = match &bytes[0..2] {
		b"II" => true,
		b"MM" => false,
		_ => return Err(Error::Corrupt("tiff: bad byte-order mark".into())),
	};
	if read_u16(bytes, 2, little_endian) != 42 {
		return Err(Error::Corrupt("tiff: bad magic number".into()));
	}
	let ifd_offset = read_u32(bytes, 4, little_endian) as usize;
	if ifd_offset + 2 > bytes.len() {
		return Err(Error::Corrupt("tiff: ifd offset past end of file".into()));
	}
	let count = read_u16(bytes, ifd_offset, little_endian) as usize;
	let mut entries = Vec::with_capacity(count);
	let mut pos = ifd_offset + 2;
	for _ in 0..count {
		if pos + 12 > bytes.len() {
			return Err(Error::Corrupt("tiff: truncated ifd".into()));
		}
		entries.push(IfdEntry {
			tag: read_u16(bytes, pos, little_endian),
			field_type: read_u16(bytes, pos + 2, little_endian),
			count: read_u32(bytes, pos + 4, little_endian),
			value_or_offset: read_u32(bytes, pos + 8, little_endian),
		});
		pos += 12;
	}
	Ok((little_endian, entries))
}

fn find_tag(entries: &[IfdEntry], tag: u16) -> Option<&IfdEntry> { entries.iter().find(|e| e.tag == tag) }

fn short_array(bytes: &[u8], entry: &IfdEntry, little_endian: bool) -> Result<Vec<u16>> {
	let count = entry.count as usize;
	let byte_len = count * 2;
	if byte_len <= 4 {
		Ok((0..count).map(|i| (entry.value_or_offset >> (i * 16)) as u16).collect())
	} else {
		let offset = entry.value_or_offset as usize;
		if offset + byte_len > bytes.len() {
			return Err(Error::Corrupt("tiff: short array offset past end of file".into()));
		}
		Ok((0..count).map(|i| read_u16(bytes, offset + i * 2, little_endian)).collect())
	}
}

/// Parses a standalone single-strip TIFF file produced by this crate's own
/// writer (or anything laid out the same way): one IFD, one strip covering
/// the whole image.
fn read_tiff(bytes: &[u8]) -> Result<(RasterGeometry, Encoding, Vec<u8>, Option<Palette>)> {
	let (little_endian, entries) = read_ifd(bytes)?;

	let width = find_tag(&entries, 256).ok_or_else(|| Error::Corrupt("tiff: missing ImageWidth".into()))?.value_or_offset;
	let height = find_tag(&entries, 257).ok_or_else(|| Error::Corrupt("tiff: missing ImageLength".into()))?.value_or_offset;
	let channels = find_tag(&entries, 277).map(|e| e.value_or_offset as u8).unwrap_or(1);
	let bits_per_sample = find_tag(&entries, 258)
		.map(|e| short_array(bytes, e, little_endian))
		.transpose()?
		.and_then(|v| v.first().copied())
		.unwrap_or(8) as u8;
	let compression = find_tag(&entries, 259).map(|e| e.value_or_offset).unwrap_or(1);
	let photometric_tag = find_tag(&entries, 262).map(|e| e.value_or_offset).unwrap_or(1);
	let sample_format = find_tag(&entries, 339)
		.map(|e| short_array(bytes, e, little_endian))
		.transpose()?
		.and_then(|v| v.first().copied())
		.unwrap_or(1);

	let sample_kind = match sample_format {
		1 => SampleKind::UnsignedInt,
		2 => SampleKind::SignedInt,
		3 => SampleKind::Float,
		other => return Err(Error::UnsupportedCombination(format!("tiff: unsupported SampleFormat {other}"))),
	};
	let photometric = match photometric_tag {
		1 => Photometric::Gray,
		2 => Photometric::Rgb,
		3 => Photometric::PaletteIndexed,
		other => return Err(Error::UnsupportedCombination(format!("tiff: unsupported PhotometricInterpretation {other}"))),
	};
	let encoding = match compression {
		1 => Encoding::Raw,
		5 => Encoding::Lzw,
		7 => Encoding::Jpeg,
		8 | 32946 => Encoding::Deflate,
		32773 => Encoding::Packbits,
		other => return Err(Error::UnsupportedCombination(format!("tiff: unsupported Compression {other}"))),
	};

	let strip_offset =
		find_tag(&entries, 273).ok_or_else(|| Error::Corrupt("tiff: missing StripOffsets".into()))?.value_or_offset as usize;
	let strip_bytes =
		find_tag(&entries, 279).ok_or_else(|| Error::Corrupt("tiff: missing StripByteCounts".into()))?.value_or_offset as usize;
	if strip_offset + strip_bytes > bytes.len() {
		return Err(Error::Corrupt("tiff: strip data past end of file".into()));
	}
	let payload = bytes[strip_offset..strip_offset + strip_bytes].to_vec();

	let palette = if photometric == Photometric::PaletteIndexed {
		find_tag(&entries, 320)
			.map(|e| -> Result<Palette> {
				let table = short_array(bytes, e, little_endian)?;
				let n = table.len() / 3;
				let entries = (0..n)
					.map(|i| [(table[i] >> 8) as u8, (table[n + i] >> 8) as u8, (table[2 * n + i] >> 8) as u8, 255])
					.collect();
				Palette::new(entries)
			})
			.transpose()?
	} else {
		None
	};

	let geometry = RasterGeometry::new(width, height, channels, bits_per_sample, sample_kind, photometric)?;
	Ok((geometry, encoding, payload, palette))
}

fn read_png_file(bytes: &[u8]) -> Result<RasterNode> {
	let mut decoder = png::Decoder::new(std::io::Cursor::new(bytes));
	decoder.set_transformations(png::Transformations::IDENTITY);
	let mut reader = decoder.read_info().map_err(|e| Error::Corrupt(format!("png: {e}")))?;
	let mut buf = vec![0u8; reader.output_buffer_size()];
	let info = reader.next_frame(&mut buf).map_err(|e| Error::Corrupt(format!("png: {e}")))?;
	buf.truncate(info.buffer_size());

	let channels = match info.color_type {
		png::ColorType::Grayscale => 1,
		png::ColorType::GrayscaleAlpha => 2,
		png::ColorType::Rgb => 3,
		png::ColorType::Rgba => 4,
		png::ColorType::Indexed => 1,
	};
	let photometric = if info.color_type == png::ColorType::Indexed { Photometric::PaletteIndexed } else { Photometric::Rgb };
	let geometry = RasterGeometry::new(info.width, info.height, channels, 8, SampleKind::UnsignedInt, photometric)?;
	Ok(RasterNode::Raw(Box::new(RawRasterNode::new(geometry, buf)?)))
}

/// Opens `path`, probes its magic bytes, and returns a `RasterNode` over its
/// contents. Mandatory formats: TIFF (all six container encodings) and PNG.
pub fn open(path: &Path) -> Result<RasterNode> {
	let bytes = fs::read(path)?;
	if bytes.len() >= 2 && (&bytes[0..2] == b"II" || &bytes[0..2] == b"MM") {
		let (geometry, encoding, payload, _palette) = read_tiff(&bytes)?;
		Ok(RasterNode::File(crate::node::FileRasterNode::new(geometry, encoding, payload)))
	} else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
		read_png_file(&bytes)
	} else {
		Err(Error::Corrupt(format!("{}: unrecognized magic bytes", path.display())))
	}
}

/// Writer side: declares the target file's shape up front and pulls every
/// row out of a source node to persist it.
pub struct FileImageWriter {
	path: PathBuf,
	geometry: RasterGeometry,
	encoding: Encoding,
	mask: Option<RasterNode>,
}

impl FileImageWriter {
	pub fn new(path: impl Into<PathBuf>, geometry: RasterGeometry, encoding: Encoding) -> Self {
		Self { path: path.into(), geometry, encoding, mask: None }
	}

	/// Validates `mask_node` against this writer's declared geometry and
	/// attaches it. Mirrors [`RasterNode::set_mask`] for a writer that wants
	/// the same early validation before persisting a mask of its own;
	/// neither container format here embeds a mask channel, so actual
	/// persistence is a second `FileImageWriter` over a mask-shaped geometry
	/// writing to its own path, the way `overlay`'s data+mask dual output
	/// does it.
	pub fn set_mask(&mut self, mask_node: RasterNode) -> Result<()> {
		let mask_geometry = mask_node.geometry();
		if mask_geometry.width != self.geometry.width || mask_geometry.height != self.geometry.height || !mask_geometry.is_mask_shaped()
		{
			return Err(Error::MaskMismatch(format!(
				"mask must be {}x{} 1-channel 8-bit unsigned mask-photometric, got {}x{} {} channels",
				self.geometry.width, self.geometry.height, mask_geometry.width, mask_geometry.height, mask_geometry.channels
			)));
		}
		self.mask = Some(mask_node);
		Ok(())
	}

	/// The attached mask, if any, set by [`Self::set_mask`].
	pub fn mask(&self) -> Option<&RasterNode> { self.mask.as_ref() }

	pub fn geometry(&self) -> RasterGeometry { self.geometry }

	/// Pulls every row from `source`, encodes it, and persists it to `path`.
	/// Any partial file left behind by a failed write is removed before the
	/// error is returned.
	pub fn write(&self, mut source: RasterNode) -> Result<()> {
		let source_geometry = source.geometry();
		if source_geometry.width != self.geometry.width
			|| source_geometry.height != self.geometry.height
			|| source_geometry.sample_bits != self.geometry.sample_bits
			|| source_geometry.sample_kind != self.geometry.sample_kind
		{
			return Err(Error::GeometryMismatch(format!(
				"source is {}x{} ({} bit {:?}), writer declared {}x{} ({} bit {:?})",
				source_geometry.width,
				source_geometry.height,
				source_geometry.sample_bits,
				source_geometry.sample_kind,
				self.geometry.width,
				self.geometry.height,
				self.geometry.sample_bits,
				self.geometry.sample_kind
			)));
		}

		let row_bytes = self.geometry.row_bytes();
		let mut pixels = vec![0u8; row_bytes * self.geometry.height as usize];
		for y in 0..self.geometry.height {
			let start = y as usize * row_bytes;
			source.read_row(y, &mut pixels[start..start + row_bytes])?;
		}

		let encoded = codec::encode(self.encoding, &self.geometry, &pixels)?;
		let file_bytes = match self.encoding {
			Encoding::Png => encoded,
			_ => {
				let mut out = header::synthesize_tiff(&self.geometry, encoded.len() as u64, self.encoding, None)?;
				out.extend_from_slice(&encoded);
				out
			},
		};

		self.write_atomically(&file_bytes)
	}

	fn write_atomically(&self, bytes: &[u8]) -> Result<()> {
		let tmp_path = self.path.with_extension("tmp");
		let result = fs::write(&tmp_path, bytes).and_then(|_| fs::rename(&tmp_path, &self.path));
		if let Err(e) = result {
			let _ = fs::remove_file(&tmp_path);
			return Err(Error::Io(e));
		}
		Ok(())
	}
}
