//! Startup configuration for `tile-server`: listen address, worker-pool
//! size, data root, and the pyramid levels for each layer. This is the
//! server's own ambient startup config (how to boot), not a WMTS/WMS
//! capabilities document. This struct never appears in a capabilities
//! response, it only tells this process where its container files live.
//!
//! A plain `serde`-derived struct with `deny_unknown_fields` so a typo in
//! the config file is a startup error, not a silently ignored field.

use std::{collections::HashMap, path::PathBuf};

use raster_core::{
	codec::Encoding,
	error::{Error, Result},
	geometry::SampleKind,
	pyramid::{Level, Pyramid, TileMatrix},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	pub listen_addr: String,
	pub data_root: PathBuf,
	#[serde(default)]
	pub worker_threads: Option<usize>,
	pub layers: HashMap<String, LayerConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
	pub channels: u8,
	pub sample_bits: u8,
	pub sample_kind: String,
	pub encoding: String,
	pub tiles_per_container_w: u32,
	pub tiles_per_container_h: u32,
	pub tile_width: u32,
	pub tile_height: u32,
	pub levels: Vec<LevelConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelConfig {
	pub tile_matrix_id: String,
	pub origin: (f64, f64),
	pub resolution: (f64, f64),
	pub grid_size: (u32, u32),
	pub container_dir: String,
	pub nodata_tile_path: String,
}

fn parse_sample_kind(s: &str) -> Result<SampleKind> {
	match s {
		"unsigned" => Ok(SampleKind::UnsignedInt),
		"signed" => Ok(SampleKind::SignedInt),
		"float" => Ok(SampleKind::Float),
		other => Err(Error::Config(format!("unknown sample_kind '{other}'"))),
	}
}

impl Config {
	pub fn load(path: &std::path::Path) -> Result<Self> {
		let text = std::fs::read_to_string(path)?;
		toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
	}

	/// Builds one [`Pyramid`] per configured layer, plus a side table of
	/// each level's own declared resolution (keyed by `(layer, tile_matrix_id)`)
	/// for the fallback-resolution argument `Pyramid::resolve` needs when a
	/// request names a `tile_matrix_id` the pyramid doesn't have.
	pub fn build_pyramids(&self) -> Result<(HashMap<String, Pyramid>, HashMap<(String, String), f64>)> {
		let mut pyramids = HashMap::with_capacity(self.layers.len());
		let mut resolutions = HashMap::new();

		for (name, layer) in &self.layers {
			let sample_kind = parse_sample_kind(&layer.sample_kind)?;
			let encoding = Encoding::from_flag(&layer.encoding)?;
			let mut levels = Vec::with_capacity(layer.levels.len());

			for level in &layer.levels {
				resolutions.insert((name.clone(), level.tile_matrix_id.clone()), level.resolution.0);

				let data_root = self.data_root.clone();
				let container_dir = level.container_dir.clone();
				let container_path_resolver: Box<dyn Fn(u32, u32) -> PathBuf + Send + Sync> =
					Box::new(move |cx, cy| data_root.join(&container_dir).join(format!("{cx}_{cy}.tif")));

				levels.push(Level {
					tile_matrix_id: level.tile_matrix_id.clone(),
					tile_matrix: TileMatrix {
						origin: level.origin,
						resolution: level.resolution,
						tile_size: (layer.tile_width, layer.tile_height),
						grid_size: level.grid_size,
					},
					tiles_per_container_w: layer.tiles_per_container_w,
					tiles_per_container_h: layer.tiles_per_container_h,
					container_path_resolver,
					nodata_tile_path: self.data_root.join(&level.nodata_tile_path),
					encoding,
					channels: layer.channels,
					sample_bits: layer.sample_bits,
					sample_kind,
				});
			}

			pyramids.insert(name.clone(), Pyramid::new(levels)?);
		}

		Ok((pyramids, resolutions))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
listen_addr = "0.0.0.0:8080"
data_root = "/data"

[layers.ortho]
channels = 3
sample_bits = 8
sample_kind = "unsigned"
encoding = "raw"
tiles_per_container_w = 16
tiles_per_container_h = 16
tile_width = 256
tile_height = 256

[[layers.ortho.levels]]
tile_matrix_id = "19"
origin = [0.0, 0.0]
resolution = [1.0, 1.0]
grid_size = [1024, 1024]
container_dir = "ortho/19"
nodata_tile_path = "ortho/19/nodata.tif"
"#;

	#[test]
	fn parses_minimal_config() {
		let config: Config = toml::from_str(MINIMAL).unwrap();
		assert_eq!(config.listen_addr, "0.0.0.0:8080");
		assert_eq!(config.worker_threads, None);
		assert_eq!(config.layers.len(), 1);
	}

	#[test]
	fn rejects_unknown_fields() {
		let with_typo = MINIMAL.replace("listen_addr", "listenadr");
		assert!(toml::from_str::<Config>(&with_typo).is_err());
	}

	#[test]
	fn builds_one_pyramid_per_layer_and_a_resolution_side_table() {
		let config: Config = toml::from_str(MINIMAL).unwrap();
		let (pyramids, resolutions) = config.build_pyramids().unwrap();
		assert!(pyramids.contains_key("ortho"));
		assert_eq!(resolutions.get(&("ortho".to_string(), "19".to_string())), Some(&1.0));

		let reference = pyramids["ortho"].resolve("19", 1.0, 0, 0).unwrap();
		assert_eq!(reference.container_path, PathBuf::from("/data/ortho/19/0_0.tif"));
	}

	#[test]
	fn rejects_unknown_sample_kind() {
		let bad = MINIMAL.replace("\"unsigned\"", "\"fixed-point\"");
		let config: Config = toml::from_str(&bad).unwrap();
		assert!(config.build_pyramids().is_err());
	}
}
