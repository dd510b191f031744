//! `Palette` is carried as an opaque value type: style/palette definitions
//! are loaded elsewhere, but `HeaderSynthesizer`'s PNG-with-palette path
//! needs the value itself to build a `PLTE` chunk.

use crate::error::{Error, Result};

/// Up to 256 RGBA entries, as used by a PNG `PLTE`(+`tRNS`) pair.
#[derive(Clone, Debug, Default)]
pub struct Palette {
	entries: Vec<[u8; 4]>,
}

impl Palette {
	pub fn new(entries: Vec<[u8; 4]>) -> Result<Self> {
		if entries.len() > 256 {
			return Err(Error::OutOfRange(format!("palette has {} entries, max 256", entries.len())));
		}
		Ok(Self { entries })
	}

	pub fn len(&self) -> usize { self.entries.len() }

	pub fn is_empty(&self) -> bool { self.entries.is_empty() }

	pub fn entries(&self) -> &[[u8; 4]] { &self.entries }

	pub fn lookup(&self, index: u8) -> Result<[u8; 4]> {
		self.entries
			.get(index as usize)
			.copied()
			.ok_or_else(|| Error::OutOfRange(format!("palette index {index} out of range ({} entries)", self.entries.len())))
	}
}
