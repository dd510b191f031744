//! `Pyramid`: a family of levels at different resolutions covering one
//! layer, each a grid of [`crate::container::TiledContainer`] files plus a
//! per-level nodata tile.
//!
//! `resolve`/`nodata_tile` take an explicit `requested_resolution` rather
//! than deriving one from a `tile_matrix_id` that might not name a level in
//! this pyramid: translating a TileMatrixSet id into a resolution is a
//! request-parsing concern handled upstream, which already has the
//! requested resolution in hand before it ever calls into this crate.

use std::path::PathBuf;

use crate::{
	container::tile_table_slot,
	error::{Error, Result},
	geometry::SampleKind,
};
pub use crate::container::HEADER_SIZE;
use crate::codec::Encoding;

/// A WMTS-style grid descriptor at one resolution.
#[derive(Clone, Debug)]
pub struct TileMatrix {
	pub origin: (f64, f64),
	pub resolution: (f64, f64),
	pub tile_size: (u32, u32),
	pub grid_size: (u32, u32),
}

/// One pyramid level: a grid of containers sharing an encoding and pixel
/// format. Invariant: all levels of one pyramid share channels, sample_bits,
/// sample_kind, and encoding.
pub struct Level {
	pub tile_matrix_id: String,
	pub tile_matrix: TileMatrix,
	pub tiles_per_container_w: u32,
	pub tiles_per_container_h: u32,
	pub container_path_resolver: Box<dyn Fn(u32, u32) -> PathBuf + Send + Sync>,
	pub nodata_tile_path: PathBuf,
	pub encoding: Encoding,
	pub channels: u8,
	pub sample_bits: u8,
	pub sample_kind: SampleKind,
}

impl Level {
	fn resolution_scalar(&self) -> f64 { self.tile_matrix.resolution.0 }
}

/// The not-yet-dereferenced address of a tile: where in which container file
/// the two 32-bit offset/size table slots live. A reader dereferences them
/// via [`crate::container::TiledContainer::locate_at_table_slot`] or
/// [`crate::container::TiledContainer::read_raw_at_table_slot`].
pub struct TileReference {
	pub container_path: PathBuf,
	pub byte_offset_of_offset_field: u64,
	pub byte_offset_of_size_field: u64,
	pub tile_width: u32,
	pub tile_height: u32,
	pub channels: u8,
	pub mime_type: &'static str,
	pub encoding: Encoding,
	pub pixel_format: (u8, SampleKind),
}

pub struct Pyramid {
	levels: Vec<Level>,
}

impl Pyramid {
	pub fn new(levels: Vec<Level>) -> Result<Self> {
		if levels.is_empty() {
			return Err(Error::Config("pyramid must have at least one level".into()));
		}
		let first = &levels[0];
		for level in &levels[1..] {
			if level.channels != first.channels || level.sample_bits != first.sample_bits || level.sample_kind != first.sample_kind || level.encoding != first.encoding
			{
				return Err(Error::GeometryMismatch("all pyramid levels must share channels, sample format, and encoding".into()));
			}
		}
		Ok(Self { levels })
	}

	fn find_level(&self, tile_matrix_id: &str) -> Option<&Level> { self.levels.iter().find(|l| l.tile_matrix_id == tile_matrix_id) }

	/// Exact id match if present; otherwise the coarsest level if
	/// `requested_resolution` is coarser than the pyramid's coarsest level,
	/// else the finest level. Intentional nodata-fallback rule, not an error.
	fn resolve_level(&self, tile_matrix_id: &str, requested_resolution: f64) -> &Level {
		if let Some(level) = self.find_level(tile_matrix_id) {
			return level;
		}
		let coarsest = self.levels.iter().max_by(|a, b| a.resolution_scalar().total_cmp(&b.resolution_scalar())).unwrap();
		let finest = self.levels.iter().min_by(|a, b| a.resolution_scalar().total_cmp(&b.resolution_scalar())).unwrap();
		if requested_resolution > coarsest.resolution_scalar() {
			coarsest
		} else {
			finest
		}
	}

	pub fn resolve(&self, tile_matrix_id: &str, requested_resolution: f64, x: u32, y: u32) -> Result<TileReference> {
		let level = self.resolve_level(tile_matrix_id, requested_resolution);
		let w = level.tiles_per_container_w;
		let h = level.tiles_per_container_h;
		let container_path = (level.container_path_resolver)(x / w, y / h);
		let (posoff, possize) = tile_table_slot(x % w, y % h, w, h);
		Ok(TileReference {
			container_path,
			byte_offset_of_offset_field: posoff,
			byte_offset_of_size_field: possize,
			tile_width: level.tile_matrix.tile_size.0,
			tile_height: level.tile_matrix.tile_size.1,
			channels: level.channels,
			mime_type: level.encoding.mime_type(),
			encoding: level.encoding,
			pixel_format: (level.sample_bits, level.sample_kind),
		})
	}

	pub fn nodata_tile(&self, tile_matrix_id: &str, requested_resolution: f64) -> Result<TileReference> {
		let level = self.resolve_level(tile_matrix_id, requested_resolution);
		Ok(TileReference {
			container_path: level.nodata_tile_path.clone(),
			byte_offset_of_offset_field: HEADER_SIZE,
			byte_offset_of_size_field: HEADER_SIZE + 4,
			tile_width: level.tile_matrix.tile_size.0,
			tile_height: level.tile_matrix.tile_size.1,
			channels: level.channels,
			mime_type: level.encoding.mime_type(),
			encoding: level.encoding,
			pixel_format: (level.sample_bits, level.sample_kind),
		})
	}
}
