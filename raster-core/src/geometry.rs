use crate::error::{Error, Result};

/// How a sample value is to be interpreted; see [`RasterGeometry::sample_kind`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SampleKind {
	UnsignedInt,
	SignedInt,
	Float,
}

/// What the channels of a raster mean.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Photometric {
	Gray,
	Rgb,
	Mask,
	PaletteIndexed,
}

/// Geographic placement of a raster node, used only by the pyramid read path.
/// The merge engine uses [`Bbox::EMPTY`] as a sentinel.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Bbox {
	pub x_min: f64,
	pub y_min: f64,
	pub x_max: f64,
	pub y_max: f64,
}

impl Bbox {
	pub const EMPTY: Bbox = Bbox { x_min: 0.0, y_min: 0.0, x_max: 0.0, y_max: 0.0 };
}

/// Immutable descriptor of any raster node's shape.
///
/// Invariant: a row buffer for this geometry is exactly
/// `width * channels * (sample_bits / 8)` bytes.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct RasterGeometry {
	pub width: u32,
	pub height: u32,
	pub channels: u8,
	pub sample_bits: u8,
	pub sample_kind: SampleKind,
	pub photometric: Photometric,
	pub bbox: Option<Bbox>,
	/// (x resolution, y resolution), pyramid use only.
	pub resolution: Option<(f64, f64)>,
}

impl RasterGeometry {
	pub fn new(
		width: u32, height: u32, channels: u8, sample_bits: u8, sample_kind: SampleKind, photometric: Photometric,
	) -> Result<Self> {
		if !(1..=4).contains(&channels) {
			return Err(Error::GeometryMismatch(format!("channels {channels} out of {{1,2,3,4}}")));
		}
		if sample_bits != 8 && sample_bits != 32 {
			return Err(Error::GeometryMismatch(format!("sample_bits {sample_bits} not in {{8,32}}")));
		}
		if width == 0 || height == 0 {
			return Err(Error::GeometryMismatch("width and height must be positive".into()));
		}
		Ok(Self {
			width,
			height,
			channels,
			sample_bits,
			sample_kind,
			photometric,
			bbox: None,
			resolution: None,
		})
	}

	pub fn bytes_per_sample(&self) -> usize { (self.sample_bits / 8) as usize }

	pub fn bytes_per_pixel(&self) -> usize { self.channels as usize * self.bytes_per_sample() }

	pub fn row_bytes(&self) -> usize { self.width as usize * self.bytes_per_pixel() }

	/// Whether `(sample_bits, sample_kind)` is one of the two combinations the
	/// merge engine accepts; codecs may read other combinations and convert.
	pub fn is_merge_legal_sample_format(&self) -> bool {
		matches!(
			(self.sample_bits, self.sample_kind),
			(8, SampleKind::UnsignedInt) | (32, SampleKind::Float)
		)
	}

	/// `true` when `self` and `other` agree on everything the merge engine
	/// and `FileImage::write` require inputs to agree on.
	pub fn matches_for_merge(&self, other: &RasterGeometry) -> bool {
		self.width == other.width
			&& self.height == other.height
			&& self.sample_bits == other.sample_bits
			&& self.sample_kind == other.sample_kind
	}

	pub fn is_mask_shaped(&self) -> bool {
		self.channels == 1 && self.sample_bits == 8 && self.sample_kind == SampleKind::UnsignedInt && self.photometric == Photometric::Mask
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_zero_dimensions() {
		assert!(RasterGeometry::new(0, 4, 3, 8, SampleKind::UnsignedInt, Photometric::Rgb).is_err());
		assert!(RasterGeometry::new(4, 0, 3, 8, SampleKind::UnsignedInt, Photometric::Rgb).is_err());
	}

	#[test]
	fn rejects_out_of_range_channels() {
		assert!(RasterGeometry::new(4, 4, 0, 8, SampleKind::UnsignedInt, Photometric::Gray).is_err());
		assert!(RasterGeometry::new(4, 4, 5, 8, SampleKind::UnsignedInt, Photometric::Rgb).is_err());
	}

	#[test]
	fn rejects_unsupported_sample_bits() {
		assert!(RasterGeometry::new(4, 4, 3, 16, SampleKind::UnsignedInt, Photometric::Rgb).is_err());
	}

	#[test]
	fn row_bytes_accounts_for_channels_and_sample_width() {
		let geometry = RasterGeometry::new(10, 4, 3, 8, SampleKind::UnsignedInt, Photometric::Rgb).unwrap();
		assert_eq!(geometry.row_bytes(), 30);
		let float_geometry = RasterGeometry::new(10, 4, 1, 32, SampleKind::Float, Photometric::Gray).unwrap();
		assert_eq!(float_geometry.row_bytes(), 40);
	}

	#[test]
	fn matches_for_merge_ignores_channels_and_photometric() {
		let a = RasterGeometry::new(10, 10, 3, 8, SampleKind::UnsignedInt, Photometric::Rgb).unwrap();
		let b = RasterGeometry::new(10, 10, 4, 8, SampleKind::UnsignedInt, Photometric::Rgb).unwrap();
		assert!(a.matches_for_merge(&b));
		let c = RasterGeometry::new(11, 10, 3, 8, SampleKind::UnsignedInt, Photometric::Rgb).unwrap();
		assert!(!a.matches_for_merge(&c));
	}

	#[test]
	fn is_mask_shaped_requires_single_8bit_unsigned_mask_channel() {
		let mask = RasterGeometry::new(4, 4, 1, 8, SampleKind::UnsignedInt, Photometric::Mask).unwrap();
		assert!(mask.is_mask_shaped());
		let not_mask = RasterGeometry::new(4, 4, 1, 8, SampleKind::UnsignedInt, Photometric::Gray).unwrap();
		assert!(!not_mask.is_mask_shaped());
	}
}
