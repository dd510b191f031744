//! `tile-server`: a WMTS/WMS-shaped serving front end. No capabilities XML,
//! no full KVP request parsing, no CRS math, just a worker-pool HTTP loop
//! that turns an already-identified `(layer, tile_matrix, x, y)` into a
//! `raster-core` lookup and forwards whatever comes back.

mod config;

use std::{collections::HashMap, error::Error as StdError, num::NonZeroUsize, path::PathBuf, sync::Arc};

use dashmap::DashMap;
use log::{debug, info, warn};
use raster_core::{
	codec::{self, Encoding},
	container::TiledContainer,
	context::Context,
	error::Error,
	geometry::{Photometric, RasterGeometry},
	header,
	pyramid::{Pyramid, TileReference},
};
use rouille::{Request, Response};
use url::Url;

use crate::config::Config;

/// Read-only, process-wide state shared by reference across every worker
/// thread: the per-layer pyramids, each level's own declared resolution
/// (used only for `Pyramid::resolve`'s unknown-matrix fallback), and a
/// cache of already-opened container file handles. Nothing here is mutated
/// per request except the container cache, which is a `DashMap` so lookups
/// and insertions never block the whole pool on one writer.
struct State {
	context: Context,
	pyramids: HashMap<String, Pyramid>,
	level_resolutions: HashMap<(String, String), f64>,
	containers: DashMap<PathBuf, Arc<TiledContainer>>,
}

impl State {
	fn container(&self, path: &std::path::Path) -> Result<Arc<TiledContainer>, Error> {
		if let Some(existing) = self.containers.get(path) {
			return Ok(existing.clone());
		}
		// Geometry and encoding are carried on the reference and only needed
		// by `TiledContainer::decode`, which this server never calls (it
		// resolves raw byte ranges itself); placeholder values are fine here.
		let placeholder = RasterGeometry::new(1, 1, 1, 8, raster_core::geometry::SampleKind::UnsignedInt, Photometric::Gray)?;
		let container = Arc::new(TiledContainer::open(path, 1, 1, placeholder, Encoding::Raw)?);
		self.containers.insert(path.to_path_buf(), container.clone());
		Ok(container)
	}

	fn tile_reference(&self, layer: &str, matrix: &str, x: u32, y: u32) -> Result<TileReference, Error> {
		let pyramid = self.pyramids.get(layer).ok_or_else(|| Error::NotFound(format!("unknown layer '{layer}'")))?;
		let resolution = self.level_resolutions.get(&(layer.to_string(), matrix.to_string())).copied().unwrap_or(0.0);
		pyramid.resolve(matrix, resolution, x, y)
	}

	fn nodata_reference(&self, layer: &str, matrix: &str) -> Result<TileReference, Error> {
		let pyramid = self.pyramids.get(layer).ok_or_else(|| Error::NotFound(format!("unknown layer '{layer}'")))?;
		let resolution = self.level_resolutions.get(&(layer.to_string(), matrix.to_string())).copied().unwrap_or(0.0);
		pyramid.nodata_tile(matrix, resolution)
	}
}

/// `true` when the error class means "this tile doesn't exist, fall back to
/// the nodata tile" (`NotFound` and a missing container file both mean "out
/// of the pyramid's declared extent"), as opposed to a fatal class that
/// should become an error response.
fn is_nodata_fallback(error: &Error) -> bool {
	match error {
		Error::NotFound(_) => true,
		Error::Io(io_err) => io_err.kind() == std::io::ErrorKind::NotFound,
		_ => false,
	}
}

fn tile_geometry_for(reference: &TileReference) -> Result<RasterGeometry, Error> {
	let photometric = if reference.channels == 1 { Photometric::Gray } else { Photometric::Rgb };
	RasterGeometry::new(reference.tile_width, reference.tile_height, reference.channels, reference.pixel_format.0, reference.pixel_format.1, photometric)
}

/// Reads the payload a `TileReference` points at through the (possibly
/// cached) container.
fn read_payload(state: &State, reference: &TileReference) -> Result<Vec<u8>, Error> {
	let container = state.container(&reference.container_path)?;
	container.read_raw_at_table_slot(reference.byte_offset_of_offset_field, reference.byte_offset_of_size_field)
}

/// Builds the response body for a tile payload already known to be encoded
/// as `reference.encoding`: a TIFF-flavored encoding gets wrapped in a
/// synthesized standalone header; a PNG payload is already a complete file
/// (this crate's own PNG encoder always emits a full file), matching the
/// same split `FileImageWriter::write` uses for its own output.
fn raw_response(geometry: &RasterGeometry, encoding: Encoding, payload: Vec<u8>) -> Result<Response, Error> {
	match encoding {
		Encoding::Png => Ok(Response::from_data(encoding.mime_type(), payload)),
		_ => {
			let mut body = header::synthesize_tiff(geometry, payload.len() as u64, encoding, None)?;
			body.extend_from_slice(&payload);
			Ok(Response::from_data("image/tiff", body))
		},
	}
}

/// Decodes the payload and re-encodes it as `target`, for a client that
/// doesn't accept the container's native encoding.
fn transcoded_response(geometry: &RasterGeometry, stored: Encoding, payload: &[u8], target: Encoding) -> Result<Response, Error> {
	let pixels = codec::decode(stored, geometry, payload)?;
	let encoded = codec::encode(target, geometry, &pixels)?;
	match target {
		Encoding::Png => Ok(Response::from_data(target.mime_type(), encoded)),
		_ => {
			let mut body = header::synthesize_tiff(geometry, encoded.len() as u64, target, None)?;
			body.extend_from_slice(&encoded);
			Ok(Response::from_data("image/tiff", body))
		},
	}
}

fn handle(state: &State, request: &Request) -> Result<Response, Box<dyn StdError>> {
	let url = Url::parse(&format!("http://127.0.0.1{}", request.raw_url()))?;
	let mut segments = url.path_segments().ok_or("invalid path")?;
	if segments.next() != Some("tile") {
		return Ok(Response::empty_404());
	}
	let layer = segments.next().ok_or("missing layer")?.to_string();
	let matrix = segments.next().ok_or("missing tile matrix id")?.to_string();
	let x: u32 = segments.next().ok_or("missing x")?.parse()?;
	let y: u32 = segments.next().ok_or("missing y")?.parse()?;

	let mut requested_format: Option<Encoding> = None;
	for (key, value) in url.query_pairs() {
		if key == "format" {
			requested_format = Some(Encoding::from_flag(&value)?);
		}
	}

	let reference = match state.tile_reference(&layer, &matrix, x, y) {
		Ok(reference) => reference,
		Err(e) if is_nodata_fallback(&e) => {
			if state.context.log_nodata_fallback {
				warn!("tile ({layer}, {matrix}, {x}, {y}) not found, falling back to nodata: {e}");
			} else {
				debug!("tile ({layer}, {matrix}, {x}, {y}) not found, falling back to nodata: {e}");
			}
			state.nodata_reference(&layer, &matrix)?
		},
		Err(e) => return Err(Box::new(e)),
	};

	let geometry = tile_geometry_for(&reference)?;
	let payload = read_payload(state, &reference)?;

	match requested_format {
		Some(target) if target != reference.encoding => Ok(transcoded_response(&geometry, reference.encoding, &payload, target)?),
		_ => Ok(raw_response(&geometry, reference.encoding, payload)?),
	}
}

fn main() {
	env_logger::init();

	let config_path = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| {
		eprintln!("usage: {} <config.toml>", std::env::args().next().unwrap_or_else(|| "tile-server".into()));
		std::process::exit(1);
	}));

	let config = match Config::load(&config_path) {
		Ok(c) => c,
		Err(e) => {
			eprintln!("{e}");
			std::process::exit(1);
		},
	};

	let (pyramids, level_resolutions) = match config.build_pyramids() {
		Ok(p) => p,
		Err(e) => {
			eprintln!("{e}");
			std::process::exit(1);
		},
	};

	let context = Context::new(config.data_root.clone()).with_log_nodata_fallback(true);
	let state = Arc::new(State { context, pyramids, level_resolutions, containers: DashMap::new() });
	let worker_threads = config.worker_threads.or_else(|| std::thread::available_parallelism().ok().map(NonZeroUsize::get));

	info!("listening on {} with {} layer(s)", config.listen_addr, state.pyramids.len());
	rouille::start_server_with_pool(config.listen_addr.clone(), worker_threads, move |request| {
		match handle(&state, request) {
			Ok(response) => response,
			Err(e) => {
				warn!("request {} failed: {e}", request.raw_url());
				Response::text(e.to_string()).with_status_code(500)
			},
		}
	});
}
