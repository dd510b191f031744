//! `overlay`: the offline N-image compositing tool. A flat `clap::Parser`
//! struct with short flags, no subcommands, since there's only one thing
//! this binary does.

mod config;

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use log::{error, info};
use raster_core::{
	codec::Encoding,
	error::{Error, Result},
	file_image::{self, FileImageWriter},
	geometry::{Photometric, RasterGeometry, SampleKind},
	merge::{MergeConfig, MergeRasterNode, Operator},
};

use crate::config::ConfigFile;

/// Create one output image from several same-dimension source images, per
/// one of three merge methods.
#[derive(Parser)]
#[clap(name = "overlay")]
struct Options {
	/// Configuration file: list of output and source images and masks.
	#[clap(short = 'f', long = "file")]
	file: PathBuf,

	/// Merge method: ALPHATOP, MULTIPLY, or TOP.
	#[clap(short = 'm', long = "merge")]
	merge: String,

	/// Output compression: raw, none, jpg, lzw, pkb, zip.
	#[clap(short = 'c', long = "compression")]
	compression: String,

	/// Samples per pixel in the output image: 1, 2, 3, or 4.
	#[clap(short = 's', long = "samples")]
	samples: u8,

	/// Output photometric interpretation: gray or rgb.
	#[clap(short = 'p', long = "photometric")]
	photometric: String,

	/// Color to treat as transparent, "R,G,B". Only legal with `-m ALPHATOP`
	/// on 8-bit unsigned inputs.
	#[clap(short = 't', long = "transparent")]
	transparent: Option<String>,

	/// Background value, one per output sample, comma-separated.
	#[clap(short = 'b', long = "background")]
	background: String,

	/// Enable debug-level logging.
	#[clap(short = 'd', long = "debug")]
	debug: bool,
}

fn parse_csv_u8(s: &str) -> Result<Vec<u8>> {
	s.split(',')
		.map(|v| v.trim().parse::<u8>().map_err(|e| Error::Config(format!("'{v}' is not a byte: {e}"))))
		.collect()
}

fn parse_csv_f64(s: &str) -> Result<Vec<f64>> {
	s.split(',')
		.map(|v| v.trim().parse::<f64>().map_err(|e| Error::Config(format!("'{v}' is not a number: {e}"))))
		.collect()
}

fn parse_transparent(s: &str) -> Result<[u8; 3]> {
	let values = parse_csv_u8(s)?;
	match values[..] {
		[r, g, b] => Ok([r, g, b]),
		_ => Err(Error::Config("-t requires exactly 3 comma-separated values".into())),
	}
}

fn photometric_for(flag: &str, channels: u8) -> Result<Photometric> {
	match flag {
		"gray" => Ok(Photometric::Gray),
		"rgb" => Ok(Photometric::Rgb),
		other => Err(Error::Config(format!("unknown photometric '{other}', expected gray or rgb (channels={channels})"))),
	}
}

fn run(options: Options) -> Result<()> {
	let operator = Operator::from_flag(&options.merge)?;
	let encoding = Encoding::from_flag(&options.compression)?;
	let photometric = photometric_for(&options.photometric, options.samples)?;
	if !(1..=4).contains(&options.samples) {
		return Err(Error::Config(format!("-s must be 1, 2, 3, or 4, got {}", options.samples)));
	}
	let background = parse_csv_f64(&options.background)?;
	if background.len() != options.samples as usize {
		return Err(Error::Config(format!(
			"-b has {} values, expected {} (-s)",
			background.len(),
			options.samples
		)));
	}
	let transparent = options.transparent.as_deref().map(parse_transparent).transpose()?;
	if transparent.is_some() && operator != Operator::AlphaTop {
		return Err(Error::Config("-t is only legal with -m ALPHATOP".into()));
	}

	let config = ConfigFile::load(&options.file)?;
	info!("loaded {} input image(s) from {}", config.inputs.len(), options.file.display());

	let mut inputs = Vec::with_capacity(config.inputs.len());
	let mut common_geometry: Option<RasterGeometry> = None;
	for entry in &config.inputs {
		let mut image = file_image::open(&entry.image)?;
		let geometry = image.geometry();
		match common_geometry {
			None => common_geometry = Some(geometry),
			Some(expect) => {
				if !geometry.matches_for_merge(&expect) {
					return Err(Error::GeometryMismatch(format!(
						"{}: {}x{} ({} bit {:?}) disagrees with the first input's {}x{} ({} bit {:?})",
						entry.image.display(),
						geometry.width,
						geometry.height,
						geometry.sample_bits,
						geometry.sample_kind,
						expect.width,
						expect.height,
						expect.sample_bits,
						expect.sample_kind
					)));
				}
			},
		}
		if let Some(mask_path) = &entry.mask {
			let mask = file_image::open(mask_path)?;
			image.set_mask(mask)?;
		}
		inputs.push(image);
	}

	if transparent.is_some() && common_geometry.map(|g| g.sample_kind) != Some(SampleKind::UnsignedInt) {
		return Err(Error::Config("-t is only legal when inputs are 8-bit unsigned".into()));
	}

	let merge_config = MergeConfig { operator, output_channels: options.samples, background, transparent };
	let mut merged = MergeRasterNode::new(inputs, merge_config)?;

	let input_geometry = common_geometry.ok_or_else(|| Error::Config("configuration file has no input images".into()))?;
	let mut output_geometry = RasterGeometry::new(
		input_geometry.width,
		input_geometry.height,
		options.samples,
		input_geometry.sample_bits,
		input_geometry.sample_kind,
		photometric,
	)?;
	output_geometry.bbox = None;

	// The mask is taken out before the data node is consumed by `write`: a
	// `MergeRasterNode`'s mask shares the same underlying accumulator state
	// as the data node (see `merge.rs`), so it stays valid to read on its
	// own afterwards.
	let mask_node = merged.take_mask();

	let writer = FileImageWriter::new(config.output.image.clone(), output_geometry, encoding);
	writer.write(merged)?;
	info!("wrote {}", config.output.image.display());

	if let Some(mask_path) = &config.output.mask {
		match mask_node {
			Some(mask_node) => {
				let mut mask_geometry =
					RasterGeometry::new(input_geometry.width, input_geometry.height, 1, 8, SampleKind::UnsignedInt, Photometric::Mask)?;
				mask_geometry.bbox = None;
				let mask_writer = FileImageWriter::new(mask_path.clone(), mask_geometry, Encoding::Deflate);
				mask_writer.write(mask_node)?;
				info!("wrote {}", mask_path.display());
			},
			None => error!("output mask path {} given but the merged image has no mask", mask_path.display()),
		}
	}

	Ok(())
}

fn main() -> ExitCode {
	let options = Options::parse();
	let mut builder = env_logger::Builder::from_default_env();
	if options.debug {
		builder.filter_level(log::LevelFilter::Debug);
	}
	builder.init();

	match run(options) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("{e}");
			ExitCode::from(255)
		},
	}
}
