//! The image pipeline core: a compositional graph of pixel-producing nodes
//! that stream raster rows on demand, the tile pyramid read path, and the
//! N-image merge engine. Capabilities XML, request parsing, HTTP transport,
//! CRS reprojection, and style/palette loading live outside this crate; it
//! exposes the seams those concerns plug into (`pyramid::TileReference`, the
//! `Reprojector`-shaped `node::WarpedRasterNode`, the opaque `palette::Palette`
//! value) without implementing them itself.

pub mod channels;
pub mod codec;
pub mod container;
pub mod context;
pub mod error;
pub mod file_image;
pub mod geometry;
pub mod header;
pub mod merge;
pub mod node;
pub mod palette;
pub mod pyramid;
