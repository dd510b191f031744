use thiserror::Error;

/// Every fallible operation in this crate returns one of these kinds.
///
/// Callers that need to decide between "fatal" and "fall back to nodata"
/// (the pyramid read path) or between "fatal" and "exit -1" (the offline
/// merge tool) match on the variant rather than downcasting an opaque error.
#[derive(Error, Debug)]
pub enum Error {
	#[error("configuration error: {0}")]
	Config(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("tile not found: {0}")]
	NotFound(String),

	#[error("corrupt data: {0}")]
	Corrupt(String),

	#[error("geometry mismatch: {0}")]
	GeometryMismatch(String),

	#[error("mask mismatch: {0}")]
	MaskMismatch(String),

	#[error("unsupported combination: {0}")]
	UnsupportedCombination(String),

	#[error("out of range: {0}")]
	OutOfRange(String),
}

pub type Result<T> = std::result::Result<T, Error>;
