//! `MergeNode`: composites an ordered stack of same-geometry inputs with one
//! of three operators, producing a paired derived mask.
//!
//! The merge node and its mask share one `MergeShared` behind an `Rc<RefCell<_>>`,
//! a tiny two-member arena, so that computing a mask row for `y` reuses the
//! exact same per-input reads and presence decisions as computing the data row
//! for `y`, rather than walking the input stack twice with two independent
//! (and potentially divergent) implementations.

use std::{cell::RefCell, rc::Rc};

use crate::{
	channels::convert_pixel,
	error::{Error, Result},
	geometry::{Bbox, Photometric, RasterGeometry, SampleKind},
	node::RasterNode,
};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Operator {
	AlphaTop,
	Multiply,
	Top,
}

impl Operator {
	pub fn from_flag(flag: &str) -> Result<Self> {
		match flag {
			"ALPHATOP" => Ok(Operator::AlphaTop),
			"MULTIPLY" => Ok(Operator::Multiply),
			"TOP" => Ok(Operator::Top),
			other => Err(Error::Config(format!("unknown merge operator '{other}'"))),
		}
	}
}

#[derive(Clone, Debug)]
pub struct MergeConfig {
	pub operator: Operator,
	pub output_channels: u8,
	pub background: Vec<f64>,
	/// Meaningful only for `ALPHATOP` with 8-bit unsigned inputs.
	pub transparent: Option<[u8; 3]>,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum Output {
	Data,
	Mask,
}

struct MergeShared {
	inputs: Vec<RasterNode>,
	input_geometry: RasterGeometry,
	working_channels: u8,
	sample_max: f64,
	config: MergeConfig,
	last_row: Option<(u32, Vec<u8>, Vec<u8>)>,
}

/// The compositing `RasterNode`. `MergeRasterNode::new` returns the data node
/// with its companion mask already wired up behind `.mask()`; the mask is
/// itself a `MergeRasterNode` in `Output::Mask` mode over the same shared
/// input state.
pub struct MergeRasterNode {
	shared: Rc<RefCell<MergeShared>>,
	geometry: RasterGeometry,
	output: Output,
	mask_handle: Option<Box<RasterNode>>,
}

impl MergeRasterNode {
	pub fn new(inputs: Vec<RasterNode>, config: MergeConfig) -> Result<RasterNode> {
		if inputs.is_empty() {
			return Err(Error::Config("merge requires at least one input".into()));
		}
		if !(1..=4).contains(&config.output_channels) {
			return Err(Error::Config(format!("output_channels {} outside {{1,2,3,4}}", config.output_channels)));
		}
		if config.background.len() != config.output_channels as usize {
			return Err(Error::Config(format!(
				"background has {} values, expected {} (output_channels)",
				config.background.len(),
				config.output_channels
			)));
		}

		let input_geometry = inputs[0].geometry();
		for input in &inputs[1..] {
			if !input.geometry().matches_for_merge(&input_geometry) {
				return Err(Error::GeometryMismatch(
					"all merge inputs must share width, height, sample_bits, and sample_kind".into(),
				));
			}
		}
		if !input_geometry.is_merge_legal_sample_format() {
			return Err(Error::UnsupportedCombination(format!(
				"merge only accepts (8-bit, unsigned) or (32-bit, float) samples, got ({}, {:?})",
				input_geometry.sample_bits, input_geometry.sample_kind
			)));
		}
		if config.operator == Operator::AlphaTop && input_geometry.sample_kind == SampleKind::Float {
			return Err(Error::UnsupportedCombination("ALPHATOP is undefined for floating-point inputs".into()));
		}
		if config.transparent.is_some() && (config.operator != Operator::AlphaTop || input_geometry.sample_kind != SampleKind::UnsignedInt) {
			return Err(Error::Config("-t (transparent color) is only legal with ALPHATOP on 8-bit unsigned inputs".into()));
		}

		let working_channels =
			inputs.iter().map(|i| i.geometry().channels).max().unwrap_or(1).max(config.output_channels);
		let sample_max = if input_geometry.sample_bits == 8 { 255.0 } else { 1.0 };

		let mut data_geometry = RasterGeometry::new(
			input_geometry.width,
			input_geometry.height,
			config.output_channels,
			input_geometry.sample_bits,
			input_geometry.sample_kind,
			if config.output_channels <= 2 { Photometric::Gray } else { Photometric::Rgb },
		)?;
		data_geometry.bbox = Some(Bbox::EMPTY);

		let mut mask_geometry =
			RasterGeometry::new(input_geometry.width, input_geometry.height, 1, 8, SampleKind::UnsignedInt, Photometric::Mask)?;
		mask_geometry.bbox = Some(Bbox::EMPTY);

		let shared = Rc::new(RefCell::new(MergeShared {
			inputs,
			input_geometry,
			working_channels,
			sample_max,
			config,
			last_row: None,
		}));

		let mask_node = MergeRasterNode { shared: shared.clone(), geometry: mask_geometry, output: Output::Mask, mask_handle: None };
		let data_node = MergeRasterNode {
			shared,
			geometry: data_geometry,
			output: Output::Data,
			mask_handle: Some(Box::new(RasterNode::Merge(Box::new(mask_node)))),
		};

		Ok(RasterNode::Merge(Box::new(data_node)))
	}

	pub fn geometry(&self) -> RasterGeometry { self.geometry }

	pub fn mask(&self) -> Option<&RasterNode> { self.mask_handle.as_deref() }

	pub fn mask_mut(&mut self) -> Option<&mut RasterNode> { self.mask_handle.as_deref_mut() }

	pub fn take_mask(&mut self) -> Option<RasterNode> { self.mask_handle.take().map(|b| *b) }

	pub fn set_external_mask(&mut self, mask: Option<Box<RasterNode>>) { self.mask_handle = mask; }

	pub fn read_row(&mut self, y: u32, buf: &mut [u8]) -> Result<()> {
		let mut shared = self.shared.borrow_mut();
		let (data, mask) = compute_row(&mut shared, y)?;
		match self.output {
			Output::Data => buf[..data.len()].copy_from_slice(&data),
			Output::Mask => buf[..mask.len()].copy_from_slice(&mask),
		}
		Ok(())
	}
}

fn read_sample(row: &[u8], pixel: usize, channel: usize, channels: usize, bytes_per_sample: usize, kind: SampleKind) -> f64 {
	let offset = (pixel * channels + channel) * bytes_per_sample;
	match (bytes_per_sample, kind) {
		(4, SampleKind::Float) => f32::from_le_bytes(row[offset..offset + 4].try_into().unwrap()) as f64,
		_ => row[offset] as f64,
	}
}

fn write_sample(row: &mut [u8], pixel: usize, channel: usize, channels: usize, bytes_per_sample: usize, kind: SampleKind, value: f64) {
	let offset = (pixel * channels + channel) * bytes_per_sample;
	match (bytes_per_sample, kind) {
		(4, SampleKind::Float) => row[offset..offset + 4].copy_from_slice(&(value as f32).to_le_bytes()),
		_ => row[offset] = value.round().clamp(0.0, 255.0) as u8,
	}
}

fn compute_row(shared: &mut MergeShared, y: u32) -> Result<(Vec<u8>, Vec<u8>)> {
	if let Some((cached_y, data, mask)) = &shared.last_row {
		if *cached_y == y {
			return Ok((data.clone(), mask.clone()));
		}
	}

	let width = shared.input_geometry.width as usize;
	let working = shared.working_channels as usize;
	let out_channels = shared.config.output_channels as usize;
	let sample_max = shared.sample_max;
	let operator = shared.config.operator;
	let transparent = shared.config.transparent;
	let bps = shared.input_geometry.bytes_per_sample();
	let out_kind = shared.input_geometry.sample_kind;

	let background = convert_pixel(&shared.config.background, working as u8, sample_max);
	let mut acc: Vec<Vec<f64>> = vec![background; width];
	let mut present_anywhere = vec![false; width];

	for input in shared.inputs.iter_mut() {
		let input_geometry = input.geometry();
		let ic = input_geometry.channels as usize;
		let mut row_buf = vec![0u8; input_geometry.row_bytes()];
		input.read_row(y, &mut row_buf)?;

		let mask_row: Option<Vec<u8>> = match input.mask_mut() {
			Some(mask_node) => {
				let mut mbuf = vec![0u8; mask_node.geometry().row_bytes()];
				mask_node.read_row(y, &mut mbuf)?;
				Some(mbuf)
			},
			None => None,
		};

		for x in 0..width {
			let present = match &mask_row {
				Some(mrow) => mrow[x] != 0,
				None => match transparent {
					Some(t) if bps == 1 && ic >= 3 => {
						let r = row_buf[x * ic] as u8;
						let g = row_buf[x * ic + 1] as u8;
						let b = row_buf[x * ic + 2] as u8;
						!(r == t[0] && g == t[1] && b == t[2])
					},
					_ => true,
				},
			};
			if !present {
				continue;
			}
			present_anywhere[x] = true;

			let pixel: Vec<f64> = (0..ic).map(|c| read_sample(&row_buf, x, c, ic, bps, input_geometry.sample_kind)).collect();
			let promoted = convert_pixel(&pixel, working as u8, sample_max);

			match operator {
				Operator::Top => acc[x] = promoted,
				Operator::AlphaTop => {
					let alpha = promoted[working - 1] / sample_max;
					for c in 0..working - 1 {
						acc[x][c] = acc[x][c] * (1.0 - alpha) + promoted[c] * alpha;
					}
					let acc_alpha_norm = acc[x][working - 1] / sample_max;
					acc[x][working - 1] = (1.0 - (1.0 - acc_alpha_norm) * (1.0 - alpha)) * sample_max;
				},
				Operator::Multiply => {
					for c in 0..working {
						acc[x][c] = acc[x][c] * promoted[c] / sample_max;
					}
				},
			}
		}
	}

	let mut data = vec![0u8; width * out_channels * bps];
	let mut mask = vec![0u8; width];
	for x in 0..width {
		let demoted = convert_pixel(&acc[x], out_channels as u8, sample_max);
		for (c, value) in demoted.into_iter().enumerate() {
			write_sample(&mut data, x, c, out_channels, bps, out_kind, value);
		}
		mask[x] = if present_anywhere[x] { 255 } else { 0 };
	}

	shared.last_row = Some((y, data.clone(), mask.clone()));
	Ok((data, mask))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{geometry::SampleKind, node::RawRasterNode};

	fn uniform_rgba(value: [u8; 4], width: u32, height: u32) -> RasterNode {
		let geometry = RasterGeometry::new(width, height, 4, 8, SampleKind::UnsignedInt, Photometric::Rgb).unwrap();
		let mut pixels = Vec::with_capacity((width * height) as usize * 4);
		for _ in 0..(width * height) {
			pixels.extend_from_slice(&value);
		}
		RasterNode::Raw(Box::new(RawRasterNode::new(geometry, pixels).unwrap()))
	}

	fn uniform_gray(value: u8, width: u32, height: u32) -> RasterNode {
		let geometry = RasterGeometry::new(width, height, 1, 8, SampleKind::UnsignedInt, Photometric::Gray).unwrap();
		let pixels = vec![value; (width * height) as usize];
		RasterNode::Raw(Box::new(RawRasterNode::new(geometry, pixels).unwrap()))
	}

	fn read_full_row(node: &mut RasterNode, y: u32) -> Vec<u8> {
		let mut buf = vec![0u8; node.geometry().row_bytes()];
		node.read_row(y, &mut buf).unwrap();
		buf
	}

	#[test]
	fn top_operator_picks_topmost() {
		let bottom = uniform_rgba([0, 0, 0, 255], 2, 2);
		let top = uniform_rgba([255, 0, 0, 128], 2, 2);
		let config = MergeConfig { operator: Operator::Top, output_channels: 4, background: vec![0.0, 0.0, 0.0, 0.0], transparent: None };
		let mut merged = MergeRasterNode::new(vec![bottom, top], config).unwrap();
		let row = read_full_row(&mut merged, 0);
		assert_eq!(&row[0..4], &[255, 0, 0, 128]);
	}

	#[test]
	fn alphatop_blends_bottom_to_top() {
		let bottom = uniform_rgba([0, 0, 0, 255], 2, 2);
		let top = uniform_rgba([255, 0, 0, 128], 2, 2);
		let config =
			MergeConfig { operator: Operator::AlphaTop, output_channels: 4, background: vec![0.0, 0.0, 0.0, 0.0], transparent: None };
		let mut merged = MergeRasterNode::new(vec![bottom, top], config).unwrap();
		let row = read_full_row(&mut merged, 0);
		assert_eq!(row[0], 128);
		assert_eq!(row[1], 0);
		assert_eq!(row[2], 0);
		assert_eq!(row[3], 255);
	}

	#[test]
	fn multiply_three_grayscale_inputs() {
		let a = uniform_gray(100, 1, 1);
		let b = uniform_gray(50, 1, 1);
		let c = uniform_gray(200, 1, 1);
		let config = MergeConfig { operator: Operator::Multiply, output_channels: 1, background: vec![255.0], transparent: None };
		let mut merged = MergeRasterNode::new(vec![a, b, c], config).unwrap();
		let row = read_full_row(&mut merged, 0);
		assert_eq!(row[0], 15);
	}

	#[test]
	fn alphatop_transparent_color_suppresses_input_and_mask() {
		let input = uniform_rgba([255, 255, 255, 255], 1, 1);
		let config = MergeConfig {
			operator: Operator::AlphaTop,
			output_channels: 4,
			background: vec![0.0, 0.0, 0.0, 0.0],
			transparent: Some([255, 255, 255]),
		};
		let mut merged = MergeRasterNode::new(vec![input], config).unwrap();
		let row = read_full_row(&mut merged, 0);
		assert_eq!(row, vec![0, 0, 0, 0]);

		let mask = merged.mask_mut().unwrap();
		let mut mbuf = vec![0u8; mask.geometry().row_bytes()];
		mask.read_row(0, &mut mbuf).unwrap();
		assert_eq!(mbuf, vec![0]);
	}

	#[test]
	fn alphatop_rejects_floating_point_inputs() {
		let geometry = RasterGeometry::new(1, 1, 1, 32, SampleKind::Float, Photometric::Gray).unwrap();
		let input = RasterNode::Raw(Box::new(RawRasterNode::new(geometry, vec![0, 0, 0, 0]).unwrap()));
		let config = MergeConfig { operator: Operator::AlphaTop, output_channels: 1, background: vec![0.0], transparent: None };
		let err = MergeRasterNode::new(vec![input], config).unwrap_err();
		assert!(matches!(err, Error::UnsupportedCombination(_)));
	}

	#[test]
	fn mergemask_is_255_only_where_something_is_present() {
		let a = uniform_gray(0, 1, 1);
		let config = MergeConfig { operator: Operator::Top, output_channels: 1, background: vec![9.0], transparent: None };
		let mut merged = MergeRasterNode::new(vec![a], config).unwrap();
		let mask = merged.mask_mut().unwrap();
		let mut mbuf = vec![0u8; 1];
		mask.read_row(0, &mut mbuf).unwrap();
		assert_eq!(mbuf[0], 255);
	}
}
