//! Channel promotion/demotion: the fixed per-channel-count conversion used to
//! bring every merge input, and any mismatched codec output, into a common
//! channel shape. Every conversion routes through a canonical `(r, g, b, a)`
//! pivot (luminance of a promoted `(g, g, g)` triple is `g` itself, since the
//! weights sum to 1.0, so the 2→1 "drop alpha" case is just luminance
//! applied uniformly too).
//!
//! This is part of the wire contract: the coefficients must not change.

const LUM_R: f64 = 0.2125;
const LUM_G: f64 = 0.7154;
const LUM_B: f64 = 0.0721;

fn luminance(r: f64, g: f64, b: f64) -> f64 { LUM_R * r + LUM_G * g + LUM_B * b }

/// Widens a pixel of `from_channels` samples into the canonical `(r, g, b, a)`
/// pivot, defaulting missing alpha to `sample_max`.
fn to_pivot(pixel: &[f64], sample_max: f64) -> [f64; 4] {
	match pixel.len() {
		1 => [pixel[0], pixel[0], pixel[0], sample_max],
		2 => [pixel[0], pixel[0], pixel[0], pixel[1]],
		3 => [pixel[0], pixel[1], pixel[2], sample_max],
		4 => [pixel[0], pixel[1], pixel[2], pixel[3]],
		n => unreachable!("channel count {n} outside {{1,2,3,4}}"),
	}
}

/// Narrows the canonical pivot down to `to_channels` samples.
fn from_pivot(pivot: [f64; 4], to_channels: u8) -> Vec<f64> {
	let [r, g, b, a] = pivot;
	match to_channels {
		1 => vec![luminance(r, g, b)],
		2 => vec![luminance(r, g, b), a],
		3 => vec![r, g, b],
		4 => vec![r, g, b, a],
		n => unreachable!("channel count {n} outside {{1,2,3,4}}"),
	}
}

/// Converts one pixel's worth of samples (in raw sample units, 0..=255 for
/// 8-bit unsigned, 0.0..=1.0-ish for float) from `pixel.len()` channels to
/// `to_channels` channels, using `sample_max` as the default alpha / opaque
/// value (255.0 for 8-bit unsigned, 1.0 for floating point).
pub fn convert_pixel(pixel: &[f64], to_channels: u8, sample_max: f64) -> Vec<f64> {
	if pixel.len() == to_channels as usize {
		return pixel.to_vec();
	}
	from_pivot(to_pivot(pixel, sample_max), to_channels)
}

/// Converts a whole row-major 8-bit-unsigned pixel buffer from
/// `from_channels` to `to_channels`. Used to reconcile a codec's native
/// decoded channel count (e.g. JPEG's `L8`/`RGB24`) with the container's
/// declared geometry.
pub fn convert_channels_u8(pixels: &[u8], from_channels: u8, to_channels: u8) -> Vec<u8> {
	if from_channels == to_channels {
		return pixels.to_vec();
	}
	let from = from_channels as usize;
	let mut out = Vec::with_capacity(pixels.len() / from * to_channels as usize);
	for pixel in pixels.chunks_exact(from) {
		let floats: Vec<f64> = pixel.iter().map(|&b| b as f64).collect();
		let converted = convert_pixel(&floats, to_channels, 255.0);
		out.extend(converted.into_iter().map(|v| v.round().clamp(0.0, 255.0) as u8));
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn gray_to_rgba_defaults_alpha_opaque() {
		let out = convert_pixel(&[42.0], 4, 255.0);
		assert_eq!(out, vec![42.0, 42.0, 42.0, 255.0]);
	}

	#[test]
	fn rgb_to_gray_is_weighted_luminance() {
		let out = convert_pixel(&[255.0, 0.0, 0.0], 1, 255.0);
		assert!((out[0] - 255.0 * LUM_R).abs() < 1e-9);
	}

	#[test]
	fn gray_alpha_to_gray_drops_alpha_via_luminance_identity() {
		let out = convert_pixel(&[77.0, 10.0], 1, 255.0);
		assert!((out[0] - 77.0).abs() < 1e-9);
	}

	#[test]
	fn rgba_to_rgb_drops_alpha() {
		let out = convert_pixel(&[1.0, 2.0, 3.0, 4.0], 3, 255.0);
		assert_eq!(out, vec![1.0, 2.0, 3.0]);
	}
}
