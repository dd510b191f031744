//! End-to-end coverage of the `overlay` CLI surface (`spec.md` §6, §8): a
//! config file naming a bottom and top image merges into one output file
//! through the real binary, not just the library's `MergeRasterNode`.

use std::{fs, io::Write};

use assert_cmd::Command;
use raster_core::{
	file_image::{self, FileImageWriter},
	geometry::{Photometric, RasterGeometry, SampleKind},
	node::{RasterNode, RawRasterNode},
};

fn write_uniform_rgba_tiff(path: &std::path::Path, value: [u8; 4]) {
	let geometry = RasterGeometry::new(2, 2, 4, 8, SampleKind::UnsignedInt, Photometric::Rgb).unwrap();
	let mut pixels = Vec::with_capacity(16);
	for _ in 0..4 {
		pixels.extend_from_slice(&value);
	}
	let source = RasterNode::Raw(Box::new(RawRasterNode::new(geometry, pixels).unwrap()));
	FileImageWriter::new(path, geometry, raster_core::codec::Encoding::Raw).write(source).unwrap();
}

#[test]
fn top_operator_matches_spec_scenario_1() {
	let dir = tempfile::tempdir().unwrap();
	let bottom_path = dir.path().join("bottom.tif");
	let top_path = dir.path().join("top.tif");
	let output_path = dir.path().join("out.tif");
	write_uniform_rgba_tiff(&bottom_path, [0, 0, 0, 255]);
	write_uniform_rgba_tiff(&top_path, [255, 0, 0, 128]);

	let config_path = dir.path().join("config.txt");
	let mut config = fs::File::create(&config_path).unwrap();
	writeln!(config, "{}", output_path.display()).unwrap();
	writeln!(config, "{}", bottom_path.display()).unwrap();
	writeln!(config, "{}", top_path.display()).unwrap();
	drop(config);

	Command::cargo_bin("overlay")
		.unwrap()
		.args(["-f", config_path.to_str().unwrap(), "-m", "TOP", "-c", "raw", "-s", "4", "-p", "rgb", "-b", "0,0,0,0"])
		.assert()
		.success();

	let mut output = file_image::open(&output_path).unwrap();
	let mut row = vec![0u8; output.geometry().row_bytes()];
	output.read_row(0, &mut row).unwrap();
	assert_eq!(&row[0..4], &[255, 0, 0, 128]);
}

#[test]
fn rejects_transparent_flag_without_alphatop() {
	let dir = tempfile::tempdir().unwrap();
	let input_path = dir.path().join("in.tif");
	let output_path = dir.path().join("out.tif");
	write_uniform_rgba_tiff(&input_path, [1, 2, 3, 255]);

	let config_path = dir.path().join("config.txt");
	let mut config = fs::File::create(&config_path).unwrap();
	writeln!(config, "{}", output_path.display()).unwrap();
	writeln!(config, "{}", input_path.display()).unwrap();
	drop(config);

	Command::cargo_bin("overlay")
		.unwrap()
		.args([
			"-f",
			config_path.to_str().unwrap(),
			"-m",
			"TOP",
			"-c",
			"raw",
			"-s",
			"4",
			"-p",
			"rgb",
			"-t",
			"1,2,3",
			"-b",
			"0,0,0,0",
		])
		.assert()
		.failure();
	assert!(!output_path.exists());
}
