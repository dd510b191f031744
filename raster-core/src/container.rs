//! `TiledContainer`: a TIFF-flavored sharded tile container with a 2048-byte
//! fixed prefix followed by a `W × H` tile offset table and a same-shaped
//! bytecount table.
//!
//! Positional reads (`read_exact_at`) rather than a shared cursor: many
//! readers may call `locate`/`read_raw` concurrently and the container holds
//! no mutable state beyond the open file handle.

use std::{
	fs::File,
	os::unix::fs::FileExt,
	path::Path,
};

use crate::{
	codec::Encoding,
	error::{Error, Result},
	geometry::RasterGeometry,
	node::{FileRasterNode, RasterNode},
};

/// Fixed size of the header + IFD prefix before the tile offset table.
pub const HEADER_SIZE: u64 = 2048;

/// Computes the byte offsets of the offset-table and bytecount-table slots
/// for local tile coordinates `(tile_x, tile_y)` within a `W × H` container:
/// `n = (tile_y mod H) * W + (tile_x mod W)`,
/// `posoff = 2048 + 4n`, `possize = 2048 + 4(n + W*H)`.
pub fn tile_table_slot(tile_x: u32, tile_y: u32, tiles_per_width: u32, tiles_per_height: u32) -> (u64, u64) {
	let n = (tile_y % tiles_per_height) as u64 * tiles_per_width as u64 + (tile_x % tiles_per_width) as u64;
	let tile_count = tiles_per_width as u64 * tiles_per_height as u64;
	let posoff = HEADER_SIZE + 4 * n;
	let possize = HEADER_SIZE + 4 * (n + tile_count);
	(posoff, possize)
}

pub struct TiledContainer {
	file: File,
	file_len: u64,
	tiles_per_width: u32,
	tiles_per_height: u32,
	tile_geometry: RasterGeometry,
	encoding: Encoding,
}

impl TiledContainer {
	pub fn open(path: &Path, tiles_per_width: u32, tiles_per_height: u32, tile_geometry: RasterGeometry, encoding: Encoding) -> Result<Self> {
		let file = File::open(path)?;
		let file_len = file.metadata()?.len();
		Ok(Self { file, file_len, tiles_per_width, tiles_per_height, tile_geometry, encoding })
	}

	pub fn tile_geometry(&self) -> RasterGeometry { self.tile_geometry }

	pub fn encoding(&self) -> Encoding { self.encoding }

	pub fn tiles_per_width(&self) -> u32 { self.tiles_per_width }

	pub fn tiles_per_height(&self) -> u32 { self.tiles_per_height }

	fn require_in_grid(&self, tile_x: u32, tile_y: u32) -> Result<()> {
		if tile_x >= self.tiles_per_width || tile_y >= self.tiles_per_height {
			Err(Error::NotFound(format!(
				"tile ({tile_x}, {tile_y}) outside {}x{} container grid",
				self.tiles_per_width, self.tiles_per_height
			)))
		} else {
			Ok(())
		}
	}

	fn read_u32_le_at(&self, offset: u64) -> Result<u32> {
		let mut buf = [0u8; 4];
		self.file.read_exact_at(&mut buf, offset)?;
		Ok(u32::from_le_bytes(buf))
	}

	/// Reads the two 32-bit table slots at `posoff`/`possize` and validates
	/// the resulting payload range against the file's actual size.
	pub fn locate_at_table_slot(&self, posoff: u64, possize: u64) -> Result<(u64, u64, &'static str, Encoding)> {
		let payload_offset = self.read_u32_le_at(posoff)? as u64;
		let payload_length = self.read_u32_le_at(possize)? as u64;
		let end = payload_offset
			.checked_add(payload_length)
			.ok_or_else(|| Error::Corrupt("tile payload range overflows".into()))?;
		if end > self.file_len {
			return Err(Error::Corrupt(format!("tile payload [{payload_offset}, +{payload_length}) exceeds container size {}", self.file_len)));
		}
		Ok((payload_offset, payload_length, self.encoding.mime_type(), self.encoding))
	}

	pub fn locate(&self, tile_x: u32, tile_y: u32) -> Result<(u64, u64, &'static str, Encoding)> {
		self.require_in_grid(tile_x, tile_y)?;
		let (posoff, possize) = tile_table_slot(tile_x, tile_y, self.tiles_per_width, self.tiles_per_height);
		self.locate_at_table_slot(posoff, possize)
	}

	fn read_payload(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
		let mut buf = vec![0u8; length as usize];
		self.file.read_exact_at(&mut buf, offset)?;
		Ok(buf)
	}

	/// Returns exactly the encoded tile cell's bytes, for direct forwarding
	/// behind a synthesized header.
	pub fn read_raw(&self, tile_x: u32, tile_y: u32) -> Result<Vec<u8>> {
		let (offset, length, _, _) = self.locate(tile_x, tile_y)?;
		self.read_payload(offset, length)
	}

	/// Same as [`Self::read_raw`] but reading a tile whose table-slot
	/// location was already resolved by `Pyramid::resolve` (a
	/// [`crate::pyramid::TileReference`]), avoiding a second coordinate ->
	/// table-slot computation.
	pub fn read_raw_at_table_slot(&self, posoff: u64, possize: u64) -> Result<Vec<u8>> {
		let (offset, length, _, _) = self.locate_at_table_slot(posoff, possize)?;
		self.read_payload(offset, length)
	}

	pub fn decode(&self, tile_x: u32, tile_y: u32) -> Result<RasterNode> {
		let (offset, length, _, encoding) = self.locate(tile_x, tile_y)?;
		let payload = self.read_payload(offset, length)?;
		Ok(RasterNode::File(FileRasterNode::new(self.tile_geometry, encoding, payload)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn table_slot_matches_worked_example() {
		let (posoff, possize) = tile_table_slot(6424, 50233, 16, 16);
		assert_eq!(posoff, 2656);
		assert_eq!(possize, 3680);
	}
}
