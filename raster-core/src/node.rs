//! `RasterNode`: the pull-based pixel producer every other module composes.
//!
//! Modeled as a tagged variant over `{File, Merge, Mask, Warped, Raw}`
//! rather than a `dyn Trait` hierarchy, since there is no virtual-inheritance
//! tower to replace, just five concrete shapes dispatched through one
//! `match`.
//!
//! Node graphs are built per-request (one `MergeNode` tree per tile request
//! or per offline write) and never shared across threads, so every node
//! carries its decode/compose cache directly and `read_row` takes `&mut
//! self` rather than reaching for interior mutability.

use crate::{
	codec::{self, Encoding},
	error::{Error, Result},
	geometry::RasterGeometry,
	merge::MergeRasterNode,
};

/// A pixel producer: advertises its shape and streams rows on demand.
pub enum RasterNode {
	File(FileRasterNode),
	Merge(Box<MergeRasterNode>),
	Mask(Box<MaskRasterNode>),
	Warped(Box<WarpedRasterNode>),
	Raw(Box<RawRasterNode>),
}

impl RasterNode {
	pub fn geometry(&self) -> RasterGeometry {
		match self {
			RasterNode::File(n) => n.geometry,
			RasterNode::Merge(n) => n.geometry(),
			RasterNode::Mask(n) => n.geometry,
			RasterNode::Warped(n) => n.geometry,
			RasterNode::Raw(n) => n.geometry,
		}
	}

	/// Writes row `y` into `buf`. `buf` must be at least `geometry().row_bytes()`.
	/// May be called out of order, but implementations are optimized for
	/// monotonically non-decreasing `y`.
	pub fn read_row(&mut self, y: u32, buf: &mut [u8]) -> Result<()> {
		match self {
			RasterNode::File(n) => n.read_row(y, buf),
			RasterNode::Merge(n) => n.read_row(y, buf),
			RasterNode::Mask(n) => n.read_row(y, buf),
			RasterNode::Warped(n) => n.read_row(y, buf),
			RasterNode::Raw(n) => n.read_row(y, buf),
		}
	}

	/// The attached validity mask, if any. Never recurses into the mask's
	/// own mask.
	pub fn mask(&self) -> Option<&RasterNode> {
		match self {
			RasterNode::File(n) => n.mask.as_deref(),
			RasterNode::Merge(n) => n.mask(),
			RasterNode::Mask(_) => None,
			RasterNode::Warped(n) => n.mask.as_deref(),
			RasterNode::Raw(n) => n.mask.as_deref(),
		}
	}

	/// Takes ownership of the attached mask, leaving `self` with none. Used
	/// by a writer that needs to persist a derived mask (e.g. `MergeMask`)
	/// to its own output file once the data row stream has been consumed.
	pub fn take_mask(&mut self) -> Option<RasterNode> {
		match self {
			RasterNode::File(n) => n.mask.take().map(|b| *b),
			RasterNode::Merge(n) => n.take_mask(),
			RasterNode::Mask(_) => None,
			RasterNode::Warped(n) => n.mask.take().map(|b| *b),
			RasterNode::Raw(n) => n.mask.take().map(|b| *b),
		}
	}

	pub fn mask_mut(&mut self) -> Option<&mut RasterNode> {
		match self {
			RasterNode::File(n) => n.mask.as_deref_mut(),
			RasterNode::Merge(n) => n.mask_mut(),
			RasterNode::Mask(_) => None,
			RasterNode::Warped(n) => n.mask.as_deref_mut(),
			RasterNode::Raw(n) => n.mask.as_deref_mut(),
		}
	}

	/// Attaches `mask` to this node, validating its geometry first.
	pub fn set_mask(&mut self, mask: RasterNode) -> Result<()> {
		let own = self.geometry();
		let mask_node = MaskRasterNode::new(mask, own.width, own.height)?;
		let boxed = Some(Box::new(RasterNode::Mask(Box::new(mask_node))));
		match self {
			RasterNode::File(n) => n.mask = boxed,
			RasterNode::Merge(n) => n.set_external_mask(boxed),
			RasterNode::Mask(_) => return Err(Error::MaskMismatch("a mask cannot itself carry a mask".into())),
			RasterNode::Warped(n) => n.mask = boxed,
			RasterNode::Raw(n) => n.mask = boxed,
		}
		Ok(())
	}

	fn out_of_range(geometry: &RasterGeometry, y: u32) -> Error {
		Error::OutOfRange(format!("row {y} out of range for height {}", geometry.height))
	}
}

/// A node backed by one encoded payload (a whole tile cell, or a whole
/// standalone file): decoded lazily, once, on first `read_row`.
pub struct FileRasterNode {
	geometry: RasterGeometry,
	encoding: Encoding,
	payload: Vec<u8>,
	decoded: Option<Vec<u8>>,
	mask: Option<Box<RasterNode>>,
}

impl FileRasterNode {
	pub fn new(geometry: RasterGeometry, encoding: Encoding, payload: Vec<u8>) -> Self {
		Self { geometry, encoding, payload, decoded: None, mask: None }
	}

	fn ensure_decoded(&mut self) -> Result<&[u8]> {
		if self.decoded.is_none() {
			self.decoded = Some(codec::decode(self.encoding, &self.geometry, &self.payload)?);
		}
		Ok(self.decoded.as_deref().unwrap())
	}

	pub fn read_row(&mut self, y: u32, buf: &mut [u8]) -> Result<()> {
		if y >= self.geometry.height {
			return Err(RasterNode::out_of_range(&self.geometry, y));
		}
		let row_bytes = self.geometry.row_bytes();
		let decoded = self.ensure_decoded()?;
		let start = y as usize * row_bytes;
		buf[..row_bytes].copy_from_slice(&decoded[start..start + row_bytes]);
		Ok(())
	}
}

/// A node backed by a pixel buffer already resident in memory: the
/// background-filled accumulator row source, a freshly-decoded write-side
/// source, or a nodata tile's constant fill.
pub struct RawRasterNode {
	geometry: RasterGeometry,
	pixels: Vec<u8>,
	mask: Option<Box<RasterNode>>,
}

impl RawRasterNode {
	pub fn new(geometry: RasterGeometry, pixels: Vec<u8>) -> Result<Self> {
		let want = geometry.row_bytes() * geometry.height as usize;
		if pixels.len() != want {
			return Err(Error::GeometryMismatch(format!("raw buffer is {} bytes, expected {want}", pixels.len())));
		}
		Ok(Self { geometry, pixels, mask: None })
	}

	pub fn read_row(&mut self, y: u32, buf: &mut [u8]) -> Result<()> {
		if y >= self.geometry.height {
			return Err(RasterNode::out_of_range(&self.geometry, y));
		}
		let row_bytes = self.geometry.row_bytes();
		let start = y as usize * row_bytes;
		buf[..row_bytes].copy_from_slice(&self.pixels[start..start + row_bytes]);
		Ok(())
	}
}

/// A node produced by an external reprojector: CRS math stays out of this
/// crate, but the resulting already-warped pixel stream still needs to slot
/// into the same node graph as everything else, so it is a thin
/// geometry-carrying delegate.
pub struct WarpedRasterNode {
	geometry: RasterGeometry,
	inner: Box<RasterNode>,
	mask: Option<Box<RasterNode>>,
}

impl WarpedRasterNode {
	pub fn new(geometry: RasterGeometry, inner: RasterNode) -> Self {
		Self { geometry, inner: Box::new(inner), mask: None }
	}

	pub fn read_row(&mut self, y: u32, buf: &mut [u8]) -> Result<()> { self.inner.read_row(y, buf) }
}

/// A `RasterNode` known to be mask-shaped: `channels=1`, `sample_bits=8`,
/// unsigned, `photometric=mask`. Wraps any other node kind (file-backed mask
/// file, in-memory constant-255 fill, or a derived merge mask).
pub struct MaskRasterNode {
	geometry: RasterGeometry,
	inner: Box<RasterNode>,
}

impl MaskRasterNode {
	pub fn new(inner: RasterNode, expect_width: u32, expect_height: u32) -> Result<Self> {
		let geometry = inner.geometry();
		if !geometry.is_mask_shaped() {
			return Err(Error::MaskMismatch(format!(
				"mask must be 1-channel 8-bit unsigned mask-photometric, got {} channels / {} bits / {:?}",
				geometry.channels, geometry.sample_bits, geometry.photometric
			)));
		}
		if geometry.width != expect_width || geometry.height != expect_height {
			return Err(Error::MaskMismatch(format!(
				"mask is {}x{}, expected {}x{}",
				geometry.width, geometry.height, expect_width, expect_height
			)));
		}
		Ok(Self { geometry, inner: Box::new(inner) })
	}

	pub fn read_row(&mut self, y: u32, buf: &mut [u8]) -> Result<()> { self.inner.read_row(y, buf) }

	/// Whether pixel `x` in row `y` reads nonzero (data present).
	pub fn is_present(&mut self, y: u32, x: usize) -> Result<bool> {
		let mut row = vec![0u8; self.geometry.row_bytes()];
		self.read_row(y, &mut row)?;
		Ok(row[x] != 0)
	}
}

/// An all-255 mask of the given shape, the implicit default when a node
/// has no explicit mask attached.
pub fn implicit_mask(width: u32, height: u32) -> Result<RasterNode> {
	use crate::geometry::{Photometric, SampleKind};
	let mut geometry = RasterGeometry::new(width, height, 1, 8, SampleKind::UnsignedInt, Photometric::Mask)?;
	geometry.bbox = None;
	let pixels = vec![255u8; width as usize * height as usize];
	Ok(RasterNode::Raw(Box::new(RawRasterNode::new(geometry, pixels)?)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::geometry::{Photometric, SampleKind};

	fn gray(width: u32, height: u32, fill: u8) -> RasterNode {
		let geometry = RasterGeometry::new(width, height, 1, 8, SampleKind::UnsignedInt, Photometric::Gray).unwrap();
		RasterNode::Raw(Box::new(RawRasterNode::new(geometry, vec![fill; (width * height) as usize]).unwrap()))
	}

	#[test]
	fn read_row_rejects_out_of_range_y() {
		let mut node = gray(4, 4, 1);
		let mut buf = vec![0u8; 4];
		assert!(node.read_row(4, &mut buf).is_err());
	}

	#[test]
	fn set_mask_then_mask_then_take_mask() {
		let mut node = gray(4, 4, 9);
		assert!(node.mask().is_none());

		let mask_geometry = RasterGeometry::new(4, 4, 1, 8, SampleKind::UnsignedInt, Photometric::Mask).unwrap();
		let mask = RasterNode::Raw(Box::new(RawRasterNode::new(mask_geometry, vec![255u8; 16]).unwrap()));
		node.set_mask(mask).unwrap();
		assert!(node.mask().is_some());

		let taken = node.take_mask();
		assert!(taken.is_some());
		assert!(node.mask().is_none());
	}

	#[test]
	fn set_mask_rejects_wrong_dimensions() {
		let mut node = gray(4, 4, 9);
		let mask_geometry = RasterGeometry::new(2, 2, 1, 8, SampleKind::UnsignedInt, Photometric::Mask).unwrap();
		let mask = RasterNode::Raw(Box::new(RawRasterNode::new(mask_geometry, vec![255u8; 4]).unwrap()));
		assert!(node.set_mask(mask).is_err());
	}

	#[test]
	fn implicit_mask_is_all_present() {
		let mut mask = implicit_mask(3, 2).unwrap();
		let mut row = vec![0u8; 3];
		mask.read_row(0, &mut row).unwrap();
		assert_eq!(row, vec![255, 255, 255]);
	}
}
