use super::expect_len;
use crate::{error::Result, geometry::RasterGeometry};

pub fn decode(geometry: &RasterGeometry, bytes: &[u8]) -> Result<Vec<u8>> {
	expect_len(geometry, bytes.len())?;
	Ok(bytes.to_vec())
}

pub fn encode(geometry: &RasterGeometry, pixels: &[u8]) -> Result<Vec<u8>> {
	expect_len(geometry, pixels.len())?;
	Ok(pixels.to_vec())
}
