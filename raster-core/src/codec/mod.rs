//! Codec table: pure functions between encoded bytes and a row-major pixel
//! buffer matching a [`RasterGeometry`]. Every codec here is required by the
//! container format; there is no registry or plugin mechanism, matching the
//! closed, fixed encoding set the tile pyramid format declares.

mod deflate;
mod jpeg;
mod lzw;
mod packbits;
mod png;
mod raw;

use crate::{
	error::{Error, Result},
	geometry::RasterGeometry,
};

/// One of the six encodings a container tile cell may be stored as.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Encoding {
	Raw,
	Deflate,
	Packbits,
	Lzw,
	Jpeg,
	Png,
}

impl Encoding {
	pub fn mime_type(self) -> &'static str {
		match self {
			Encoding::Raw | Encoding::Deflate | Encoding::Packbits | Encoding::Lzw => "image/tiff",
			Encoding::Jpeg => "image/jpeg",
			Encoding::Png => "image/png",
		}
	}

	/// Parses the `-c` flag's encoding names.
	pub fn from_flag(flag: &str) -> Result<Self> {
		match flag {
			"raw" | "none" => Ok(Encoding::Raw),
			"zip" => Ok(Encoding::Deflate),
			"pkb" => Ok(Encoding::Packbits),
			"lzw" => Ok(Encoding::Lzw),
			"jpg" => Ok(Encoding::Jpeg),
			"png" => Ok(Encoding::Png),
			other => Err(Error::Config(format!("unknown encoding '{other}'"))),
		}
	}
}

/// Decodes `bytes` (one tile cell payload) into a row-major pixel buffer of
/// exactly `geometry.row_bytes() * geometry.height` bytes.
pub fn decode(encoding: Encoding, geometry: &RasterGeometry, bytes: &[u8]) -> Result<Vec<u8>> {
	match encoding {
		Encoding::Raw => raw::decode(geometry, bytes),
		Encoding::Deflate => deflate::decode(geometry, bytes),
		Encoding::Packbits => packbits::decode(geometry, bytes),
		Encoding::Lzw => lzw::decode(geometry, bytes),
		Encoding::Jpeg => jpeg::decode(geometry, bytes),
		Encoding::Png => png::decode(geometry, bytes),
	}
}

/// Encodes a row-major pixel buffer matching `geometry` into the wire bytes
/// for one tile cell.
pub fn encode(encoding: Encoding, geometry: &RasterGeometry, pixels: &[u8]) -> Result<Vec<u8>> {
	match encoding {
		Encoding::Raw => raw::encode(geometry, pixels),
		Encoding::Deflate => deflate::encode(geometry, pixels),
		Encoding::Packbits => packbits::encode(geometry, pixels),
		Encoding::Lzw => lzw::encode(geometry, pixels),
		Encoding::Jpeg => jpeg::encode(geometry, pixels),
		Encoding::Png => png::encode(geometry, pixels),
	}
}

fn expect_len(geometry: &RasterGeometry, got: usize) -> Result<()> {
	let want = geometry.row_bytes() * geometry.height as usize;
	if got != want {
		Err(Error::Corrupt(format!("decoded {got} bytes, expected {want} for {}x{}", geometry.width, geometry.height)))
	} else {
		Ok(())
	}
}
