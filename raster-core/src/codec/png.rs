use std::io::Cursor;

use png::{BitDepth, ColorType as PngColorType, Decoder, Encoder, Transformations};

use super::expect_len;
use crate::{
	channels::convert_channels_u8,
	error::{Error, Result},
	geometry::{Photometric, RasterGeometry, SampleKind},
};

fn require_8bit_unsigned(geometry: &RasterGeometry) -> Result<()> {
	if geometry.sample_bits != 8 || geometry.sample_kind != SampleKind::UnsignedInt {
		Err(Error::UnsupportedCombination("png is restricted to 8-bit unsigned samples".into()))
	} else {
		Ok(())
	}
}

pub fn decode(geometry: &RasterGeometry, bytes: &[u8]) -> Result<Vec<u8>> {
	require_8bit_unsigned(geometry)?;

	let mut decoder = Decoder::new(Cursor::new(bytes));
	// A palette-indexed geometry wants the raw indices, not an expanded RGB
	// buffer, so the same index bytes the container stores can travel on.
	decoder.set_transformations(Transformations::IDENTITY);
	let mut reader = decoder.read_info().map_err(|e| Error::Corrupt(format!("png: {e}")))?;
	let mut buf = vec![0u8; reader.output_buffer_size()];
	let info = reader.next_frame(&mut buf).map_err(|e| Error::Corrupt(format!("png: {e}")))?;
	buf.truncate(info.buffer_size());

	if info.bit_depth != BitDepth::Eight {
		return Err(Error::UnsupportedCombination("png bit depth must be 8".into()));
	}

	if geometry.photometric == Photometric::PaletteIndexed {
		if info.color_type != PngColorType::Indexed {
			return Err(Error::Corrupt("png: expected indexed color type for palette-indexed geometry".into()));
		}
		expect_len(geometry, buf.len())?;
		return Ok(buf);
	}

	let decoded_channels = match info.color_type {
		PngColorType::Grayscale => 1,
		PngColorType::GrayscaleAlpha => 2,
		PngColorType::Rgb => 3,
		PngColorType::Rgba => 4,
		PngColorType::Indexed => return Err(Error::Corrupt("png: unexpected indexed data for non-palette geometry".into())),
	};

	let pixels = convert_channels_u8(&buf, decoded_channels, geometry.channels);
	expect_len(geometry, pixels.len())?;
	Ok(pixels)
}

pub fn encode(geometry: &RasterGeometry, pixels: &[u8]) -> Result<Vec<u8>> {
	require_8bit_unsigned(geometry)?;
	expect_len(geometry, pixels.len())?;

	let color_type = match (geometry.photometric, geometry.channels) {
		(Photometric::PaletteIndexed, _) => {
			// Full re-encode of indexed data needs a palette table, which this
			// generic encoder has no source for; the served-tile fast path goes
			// through `HeaderSynthesizer` instead, which does carry one.
			return Err(Error::UnsupportedCombination(
				"png encode of palette-indexed geometry needs HeaderSynthesizer, not the generic encoder".into(),
			));
		},
		(_, 1) => PngColorType::Grayscale,
		(_, 2) => PngColorType::GrayscaleAlpha,
		(_, 3) => PngColorType::Rgb,
		(_, 4) => PngColorType::Rgba,
		(_, n) => return Err(Error::UnsupportedCombination(format!("png does not support {n} channels"))),
	};

	let mut out = Vec::new();
	{
		let mut encoder = Encoder::new(&mut out, geometry.width, geometry.height);
		encoder.set_color(color_type);
		encoder.set_depth(BitDepth::Eight);
		let mut writer = encoder.write_header().map_err(|e| Error::Corrupt(format!("png encode: {e}")))?;
		writer.write_image_data(pixels).map_err(|e| Error::Corrupt(format!("png encode: {e}")))?;
	}
	Ok(out)
}
