//! Scheduler configuration.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when parsing scheduler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The TOML source could not be parsed or has the wrong shape.
	#[error("invalid scheduler config: {0}")]
	Toml(#[from] toml::de::Error),
}

/// Tunables for [`AnalysisScheduler`](crate::AnalysisScheduler).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerCfg {
	/// Run typecheck tasks on the calling thread instead of the worker pool.
	///
	/// Used by tests and verification tools that need deterministic ordering.
	pub inline_typecheck: bool,
	/// Order the last edited definition ahead of the rest of the file.
	pub fast_path: bool,
	/// Cancel an in-flight resolution pass when a new edit arrives.
	pub cancel_on_edit: bool,
	/// Number of finished task reports retained per scheduler.
	pub report_history: usize,
}

impl Default for SchedulerCfg {
	fn default() -> Self {
		Self {
			inline_typecheck: false,
			fast_path: true,
			cancel_on_edit: true,
			report_history: 256,
		}
	}
}

impl SchedulerCfg {
	/// Parses a configuration table; missing keys keep their defaults.
	pub fn from_toml(src: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(src)?)
	}
}
