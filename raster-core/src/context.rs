//! `Context`: process-wide settings built once at startup and passed by
//! reference to every entry point, instead of living behind global mutable
//! state. `tile-server` builds one from its startup config file; `overlay`
//! has no pyramid to resolve and no nodata fallback to log, so it has no use
//! for one and sticks to its parsed CLI flags directly.

use std::path::PathBuf;

/// Read-only, process-wide settings threaded through every call instead of
/// living behind a global.
#[derive(Clone, Debug)]
pub struct Context {
	/// Root directory nodata tiles and container paths are resolved relative
	/// to, when a `Level`'s path resolver needs a base.
	pub data_root: PathBuf,
	/// Whether a read that falls back to a nodata tile should log at `warn`
	/// (serving traffic, where nodata is routine) or stay silent (batch
	/// tooling, where every fallback is worth a line).
	pub log_nodata_fallback: bool,
}

impl Context {
	pub fn new(data_root: impl Into<PathBuf>) -> Self { Self { data_root: data_root.into(), log_nodata_fallback: true } }

	pub fn with_log_nodata_fallback(mut self, log: bool) -> Self {
		self.log_nodata_fallback = log;
		self
	}
}

impl Default for Context {
	fn default() -> Self { Self::new(".") }
}
