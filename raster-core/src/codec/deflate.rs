use std::io::{Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

use super::expect_len;
use crate::{
	error::{Error, Result},
	geometry::RasterGeometry,
};

pub fn decode(geometry: &RasterGeometry, bytes: &[u8]) -> Result<Vec<u8>> {
	let mut out = Vec::with_capacity(geometry.row_bytes() * geometry.height as usize);
	ZlibDecoder::new(bytes).read_to_end(&mut out).map_err(|e| Error::Corrupt(format!("deflate: {e}")))?;
	expect_len(geometry, out.len())?;
	Ok(out)
}

pub fn encode(geometry: &RasterGeometry, pixels: &[u8]) -> Result<Vec<u8>> {
	expect_len(geometry, pixels.len())?;
	let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(pixels)?;
	Ok(encoder.finish()?)
}
