//! Parses the `overlay` configuration file: first line is the output,
//! remaining lines are inputs in bottom-to-top order, each either
//! `<image-path>` or `<image-path> <mask-path>`.
//!
//! A line with more than two whitespace-separated tokens is rejected as a
//! configuration error rather than silently discarding the tail. A line
//! with stray extra tokens is far more likely to be a typo than an
//! intentional comment, and a hard error surfaces that at load time instead
//! of compositing from the wrong file.

use std::{fs, path::PathBuf};

use raster_core::error::{Error, Result};

pub struct ImageEntry {
	pub image: PathBuf,
	pub mask: Option<PathBuf>,
}

pub struct ConfigFile {
	pub output: ImageEntry,
	pub inputs: Vec<ImageEntry>,
}

fn parse_line(line: &str) -> Result<ImageEntry> {
	let mut tokens = line.split_whitespace();
	let image = tokens.next().ok_or_else(|| Error::Config("empty configuration line".into()))?;
	let mask = tokens.next();
	if tokens.next().is_some() {
		return Err(Error::Config(format!("configuration line has more than two tokens: '{line}'")));
	}
	Ok(ImageEntry { image: PathBuf::from(image), mask: mask.map(PathBuf::from) })
}

impl ConfigFile {
	pub fn load(path: &std::path::Path) -> Result<Self> {
		let text = fs::read_to_string(path)?;
		let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

		let output = lines
			.next()
			.ok_or_else(|| Error::Config(format!("{}: configuration file is empty", path.display())))
			.and_then(parse_line)?;

		let inputs = lines.map(parse_line).collect::<Result<Vec<_>>>()?;
		if inputs.is_empty() {
			return Err(Error::Config(format!("{}: configuration file has no input images", path.display())));
		}

		Ok(Self { output, inputs })
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	fn write_config(contents: &str) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(contents.as_bytes()).unwrap();
		file
	}

	#[test]
	fn parses_output_and_inputs_with_optional_masks() {
		let file = write_config("OUT.tif OUT_MASK.tif\nsources/a.tif sources/a_mask.tif\nsources/b.png\n");
		let config = ConfigFile::load(file.path()).unwrap();
		assert_eq!(config.output.image, PathBuf::from("OUT.tif"));
		assert_eq!(config.output.mask, Some(PathBuf::from("OUT_MASK.tif")));
		assert_eq!(config.inputs.len(), 2);
		assert_eq!(config.inputs[0].mask, Some(PathBuf::from("sources/a_mask.tif")));
		assert_eq!(config.inputs[1].mask, None);
	}

	#[test]
	fn skips_blank_lines() {
		let file = write_config("OUT.tif\n\nsources/a.tif\n\n\nsources/b.tif\n");
		let config = ConfigFile::load(file.path()).unwrap();
		assert_eq!(config.inputs.len(), 2);
	}

	#[test]
	fn rejects_lines_with_more_than_two_tokens() {
		let file = write_config("OUT.tif\nsources/a.tif mask.tif extra.tif\n");
		let err = ConfigFile::load(file.path()).unwrap_err();
		assert!(matches!(err, Error::Config(_)));
	}

	#[test]
	fn rejects_empty_file() {
		let file = write_config("");
		let err = ConfigFile::load(file.path()).unwrap_err();
		assert!(matches!(err, Error::Config(_)));
	}
}
