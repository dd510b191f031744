use std::io::Cursor;

use jpeg_decoder::PixelFormat;
use jpeg_encoder::ColorType;

use super::expect_len;
use crate::{
	channels::convert_channels_u8,
	error::{Error, Result},
	geometry::{RasterGeometry, SampleKind},
};

fn require_8bit_unsigned(geometry: &RasterGeometry) -> Result<()> {
	if geometry.sample_bits != 8 || geometry.sample_kind != SampleKind::UnsignedInt {
		Err(Error::UnsupportedCombination("jpeg is restricted to 8-bit unsigned samples".into()))
	} else {
		Ok(())
	}
}

pub fn decode(geometry: &RasterGeometry, bytes: &[u8]) -> Result<Vec<u8>> {
	require_8bit_unsigned(geometry)?;

	let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(bytes));
	let pixels = decoder.decode().map_err(|e| Error::Corrupt(format!("jpeg: {e}")))?;
	let info = decoder.info().ok_or_else(|| Error::Corrupt("jpeg: missing frame info".into()))?;

	let decoded_channels = match info.pixel_format {
		PixelFormat::L8 => 1,
		PixelFormat::RGB24 => 3,
		PixelFormat::CMYK32 => 4,
		other => return Err(Error::UnsupportedCombination(format!("unsupported jpeg pixel format {other:?}"))),
	};

	let pixels = convert_channels_u8(&pixels, decoded_channels, geometry.channels);
	expect_len(geometry, pixels.len())?;
	Ok(pixels)
}

pub fn encode(geometry: &RasterGeometry, pixels: &[u8]) -> Result<Vec<u8>> {
	require_8bit_unsigned(geometry)?;
	expect_len(geometry, pixels.len())?;

	let color_type = match geometry.channels {
		1 => ColorType::Luma,
		3 => ColorType::Rgb,
		4 => ColorType::Rgba,
		n => return Err(Error::UnsupportedCombination(format!("jpeg does not support {n} channels"))),
	};

	let mut out = Vec::new();
	let encoder = jpeg_encoder::Encoder::new(&mut out, 90);
	encoder
		.encode(pixels, geometry.width as u16, geometry.height as u16, color_type)
		.map_err(|e| Error::Corrupt(format!("jpeg encode: {e}")))?;
	Ok(out)
}
